// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ame-storage: durable, append-only persistence for the `workflows` and
//! `events` relations, plus retention pruning.

pub mod error;
pub mod store;
pub mod wal;

pub use error::StoreError;
pub use store::Store;
pub use wal::{Wal, WalEntry};
