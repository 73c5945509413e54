// SPDX-License-Identifier: MIT

//! Shutdown-time retention sweep: prune event and workflow history older
//! than the configured retention window. Run once, at graceful shutdown,
//! rather than on a timer.

use ame_core::Clock;
use ame_storage::{Store, StoreError};
use tracing::info;

/// Days-to-milliseconds retention window applied against a workflow's
/// `completed_at`.
pub struct RetentionCollector<C: Clock> {
    clock: C,
    retention_days: u64,
}

impl<C: Clock> RetentionCollector<C> {
    pub fn new(clock: C, retention_days: u64) -> Self {
        Self { clock, retention_days }
    }

    /// Delete expired events, then any workflow left with none, returning
    /// `(events_deleted, workflows_deleted)`.
    pub fn cleanup_on_shutdown(&self, store: &Store) -> Result<(usize, usize), StoreError> {
        let window_ms = self.retention_days.saturating_mul(24 * 60 * 60 * 1000);
        let cutoff = self.clock.epoch_ms().saturating_sub(window_ms);

        let events_deleted = store.prune_events_before(cutoff)?;
        let workflows_deleted = store.prune_orphan_workflows(cutoff)?;

        info!(events_deleted, workflows_deleted, retention_days = self.retention_days, "retention sweep complete");
        Ok((events_deleted, workflows_deleted))
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
