//! Durable email outbox: the state machine, the MySQL repository, and an
//! in-memory backend for tests and development.
//!
//! Every email is one row advancing through the status DAG in
//! [`status::EmailStatus`]. Transitions are optimistic: an `UPDATE` is
//! guarded by the expected predecessor status, and zero affected rows
//! surfaces as [`error::OutboxError::LockNotAcquired`] so contending
//! workers never double-process a row.

pub mod email;
pub mod error;
pub mod memory;
pub mod mysql;
pub mod status;
pub mod store;

mod retry;

pub use email::{Email, HistoryEntry};
pub use error::{BackendError, BackendErrorKind, OutboxError};
pub use memory::MemoryOutbox;
pub use mysql::MySqlOutbox;
pub use status::EmailStatus;
pub use store::OutboxStore;
