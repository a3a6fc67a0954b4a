//! ledgerdo-core library.
//!
//! Rebuilds a task list from a ledger's event log and layers optimistic
//! edits on top of it.
//!
//! - [`reconstruct`] replays `Created`/`Updated`/`Deleted` events into a
//!   [`reconstruct::Snapshot`].
//! - [`board`] holds the visible list and speculative edits.
//! - [`session`] drives both against a [`ledger::Ledger`].
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per module, each mapping to an
//!   [`error::ErrorCode`]; `anyhow::Result` for config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`) with
//!   structured fields.

pub mod board;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod model;
pub mod reconstruct;
pub mod session;
pub mod stats;
pub mod view;

pub use board::TaskBoard;
pub use config::LedgerdoConfig;
pub use error::ErrorCode;
pub use ledger::{Ledger, LedgerError, MemoryLedger};
pub use model::{Address, Priority, Task, TaskId};
pub use reconstruct::{Reconstruction, Reconstructor, Snapshot, SnapshotRequest};
pub use session::{Notice, TaskSession};
