// SPDX-License-Identifier: MIT

//! Top-level daemon error taxonomy, chaining the lower layers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to create directory {0}: {1}")]
    CreateDir(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] ame_storage::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
