//! MySQL-backed outbox repository.
//!
//! Schema (see `schema.sql`):
//!
//! ```sql
//! emails(id PK, status, eml_file_path NULL, payload_file_path,
//!        reason NULL, version, updated_at ON UPDATE CURRENT_TIMESTAMP)
//! email_statuses(id PK AUTO, email_id FK ON DELETE CASCADE,
//!                status, reason NULL, created_at)
//! ```
//!
//! Writes run in a transaction: the guarded `UPDATE` plus the history
//! `INSERT` commit together, so the audit trail can never disagree with
//! the row. Transient backend failures are retried with full-jitter
//! backoff; optimistic-lock conflicts are surfaced immediately.

use chrono::{DateTime, Utc};
use courier_common::Shutdown;
use sqlx::{mysql::MySqlRow, MySqlPool, Row};

use crate::{
    email::Email,
    error::{BackendError, OutboxError},
    retry,
    status::EmailStatus,
    store::OutboxStore,
};
use async_trait::async_trait;

const QUERY_SQL: &str = "\
    SELECT id, status, eml_file_path, payload_file_path, reason, version, updated_at \
    FROM emails \
    WHERE status = ? \
    ORDER BY updated_at ASC \
    LIMIT ? \
    FOR UPDATE SKIP LOCKED";

const UPDATE_SQL: &str = "\
    UPDATE emails \
    SET status = ?, reason = ?, version = version + 1 \
    WHERE id = ? AND status = ?";

const READY_SQL: &str = "\
    UPDATE emails \
    SET status = ?, eml_file_path = ?, version = version + 1 \
    WHERE id = ? AND status = ?";

const REQUEUE_SQL: &str = "\
    UPDATE emails \
    SET status = ?, reason = '', version = version + 1 \
    WHERE id = ? AND status = ?";

const HISTORY_SQL: &str = "\
    INSERT INTO email_statuses (email_id, status, reason) \
    VALUES (?, ?, ?)";

const CREATE_SQL: &str = "\
    INSERT INTO emails (id, status, payload_file_path) \
    VALUES (?, ?, ?)";

const DELETE_SQL: &str = "DELETE FROM emails WHERE id = ?";

pub struct MySqlOutbox {
    pool: MySqlPool,
}

impl MySqlOutbox {
    #[must_use]
    pub const fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Insert a new email together with its initial history row.
    ///
    /// Used by producers and test setup; the pipelines never create
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the insert fails after retries.
    pub async fn create(
        &self,
        cancel: &Shutdown,
        id: &str,
        status: EmailStatus,
        payload_file_path: &str,
    ) -> Result<(), OutboxError> {
        self.with_retries(cancel, || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query(CREATE_SQL)
                .bind(id)
                .bind(status.as_str())
                .bind(payload_file_path)
                .execute(&mut *tx)
                .await?;

            sqlx::query(HISTORY_SQL)
                .bind(id)
                .bind(status.as_str())
                .bind("")
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    /// Remove an email. History rows cascade.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<(), OutboxError> {
        sqlx::query(DELETE_SQL)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(BackendError::from)?;
        Ok(())
    }

    /// Run `op` until it succeeds, fails non-transiently, or the attempt
    /// budget is spent. Sleeps a jittered backoff between attempts and
    /// aborts the wait as soon as `cancel` fires.
    async fn with_retries<T, F, Fut>(
        &self,
        cancel: &Shutdown,
        mut op: F,
    ) -> Result<T, OutboxError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, OutboxError>>,
    {
        let mut last_err = None;

        for attempt in 0..retry::MAX_ATTEMPTS {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    tracing::debug!(attempt, error = %err, "transient backend error, backing off");
                    last_err = Some(err);
                    if attempt + 1 < retry::MAX_ATTEMPTS {
                        let delay = retry::backoff_duration(attempt);
                        tokio::select! {
                            () = cancel.triggered() => return Err(OutboxError::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(OutboxError::LockNotAcquired))
    }

    /// The shared guarded-update-plus-history transaction body.
    async fn transition(
        &self,
        update_sql: &str,
        binds: &[&str],
        id: &str,
        to: EmailStatus,
        history_reason: &str,
    ) -> Result<(), OutboxError> {
        let mut tx = self.pool.begin().await?;

        let mut update = sqlx::query(update_sql);
        for bind in binds {
            update = update.bind(*bind);
        }
        let result = update.execute(&mut *tx).await?;

        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(OutboxError::LockNotAcquired);
        }

        sqlx::query(HISTORY_SQL)
            .bind(id)
            .bind(to.as_str())
            .bind(history_reason)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for MySqlOutbox {
    async fn query(
        &self,
        _cancel: &Shutdown,
        status: EmailStatus,
        limit: i64,
    ) -> Result<Vec<Email>, OutboxError> {
        let rows = sqlx::query(QUERY_SQL)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(BackendError::from)?;

        rows.iter().map(email_from_row).collect()
    }

    async fn update(
        &self,
        cancel: &Shutdown,
        id: &str,
        to: EmailStatus,
        reason: &str,
        _ttl: Option<i64>,
    ) -> Result<(), OutboxError> {
        // TTL is a DynamoDB-era advisory field; the MySQL backend has no
        // column for it.
        let Some(from) = to.expected_from() else {
            return Err(OutboxError::LockNotAcquired);
        };

        self.with_retries(cancel, || async move {
            self.transition(
                UPDATE_SQL,
                &[to.as_str(), reason, id, from.as_str()],
                id,
                to,
                reason,
            )
            .await
        })
        .await
    }

    async fn ready(
        &self,
        cancel: &Shutdown,
        id: &str,
        eml_file_path: &str,
        _ttl: Option<i64>,
    ) -> Result<(), OutboxError> {
        self.with_retries(cancel, || async move {
            self.transition(
                READY_SQL,
                &[
                    EmailStatus::Ready.as_str(),
                    eml_file_path,
                    id,
                    EmailStatus::Intaking.as_str(),
                ],
                id,
                EmailStatus::Ready,
                "",
            )
            .await
        })
        .await
    }

    async fn requeue(&self, cancel: &Shutdown, id: &str) -> Result<(), OutboxError> {
        self.with_retries(cancel, || async move {
            self.transition(
                REQUEUE_SQL,
                &[
                    EmailStatus::Ready.as_str(),
                    id,
                    EmailStatus::Processing.as_str(),
                ],
                id,
                EmailStatus::Ready,
                "",
            )
            .await
        })
        .await
    }
}

fn email_from_row(row: &MySqlRow) -> Result<Email, OutboxError> {
    let status: String = row.try_get("status").map_err(BackendError::from)?;
    let eml_file_path: Option<String> =
        row.try_get("eml_file_path").map_err(BackendError::from)?;
    let reason: Option<String> = row.try_get("reason").map_err(BackendError::from)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(BackendError::from)?;

    Ok(Email {
        id: row.try_get("id").map_err(BackendError::from)?,
        status: status.parse()?,
        version: row.try_get("version").map_err(BackendError::from)?,
        payload_file_path: row
            .try_get("payload_file_path")
            .map_err(BackendError::from)?,
        eml_file_path: eml_file_path.filter(|path| !path.is_empty()),
        reason: reason.filter(|reason| !reason.is_empty()),
        updated_at,
        ttl: None,
    })
}
