use async_trait::async_trait;
use courier_common::Shutdown;

use crate::{email::Email, error::OutboxError, status::EmailStatus};

/// The repository surface the pipeline workers run against.
///
/// Implemented by [`crate::MySqlOutbox`] in production and
/// [`crate::MemoryOutbox`] in tests. Every write appends a history row
/// in the same transaction as the email mutation.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` rows currently in `status`, oldest first, skipping
    /// rows locked by concurrent transactions. An empty result is not an
    /// error.
    async fn query(
        &self,
        cancel: &Shutdown,
        status: EmailStatus,
        limit: i64,
    ) -> Result<Vec<Email>, OutboxError>;

    /// Transition the row into `to`, guarded by `to.expected_from()`.
    ///
    /// # Errors
    ///
    /// [`OutboxError::LockNotAcquired`] when the row is not in the
    /// expected predecessor status (another worker won, or the row is
    /// terminal).
    async fn update(
        &self,
        cancel: &Shutdown,
        id: &str,
        to: EmailStatus,
        reason: &str,
        ttl: Option<i64>,
    ) -> Result<(), OutboxError>;

    /// The specialised `INTAKING -> READY` transition, which also
    /// records where the rendered message was stored.
    async fn ready(
        &self,
        cancel: &Shutdown,
        id: &str,
        eml_file_path: &str,
        ttl: Option<i64>,
    ) -> Result<(), OutboxError>;

    /// Return a throttled row from `PROCESSING` to `READY` so the next
    /// sender iteration picks it up again. Clears the reason.
    async fn requeue(&self, cancel: &Shutdown, id: &str) -> Result<(), OutboxError>;
}
