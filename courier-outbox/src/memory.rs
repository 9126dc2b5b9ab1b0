//! In-memory outbox for tests and development.
//!
//! Honours the same transition protocol as the MySQL backend: guarded
//! status updates, version bumps, and a history entry per transition.
//! The claim race is exercised for real because contenders mutate a
//! shared map under one lock and only the first sees the expected
//! predecessor status.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use courier_common::Shutdown;

use crate::{
    email::{Email, HistoryEntry},
    error::OutboxError,
    status::EmailStatus,
    store::OutboxStore,
};

#[derive(Debug, Default)]
struct Inner {
    emails: HashMap<String, Email>,
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryOutbox {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row the way a producer would, with its initial history
    /// entry.
    ///
    /// # Panics
    /// Panics if the inner mutex is poisoned.
    pub fn create(&self, id: &str, status: EmailStatus, payload_file_path: &str) {
        let mut inner = self.lock();
        inner.emails.insert(
            id.to_string(),
            Email {
                id: id.to_string(),
                status,
                version: 0,
                payload_file_path: payload_file_path.to_string(),
                eml_file_path: None,
                reason: None,
                updated_at: Utc::now(),
                ttl: None,
            },
        );
        inner.history.push(HistoryEntry {
            email_id: id.to_string(),
            status,
            reason: None,
            created_at: Utc::now(),
        });
    }

    /// Current state of a row.
    ///
    /// # Panics
    /// Panics if the inner mutex is poisoned.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Email> {
        self.lock().emails.get(id).cloned()
    }

    /// Seed helper: set the rendered message path directly, outside the
    /// transition protocol. Returns `None` for an unknown row.
    ///
    /// # Panics
    /// Panics if the inner mutex is poisoned.
    pub fn set_eml_file_path(&self, id: &str, path: &str) -> Option<()> {
        self.lock().emails.get_mut(id).map(|email| {
            email.eml_file_path = Some(path.to_string());
        })
    }

    /// Remove a row and its history, the way the production backend
    /// cascades.
    ///
    /// # Panics
    /// Panics if the inner mutex is poisoned.
    pub fn delete(&self, id: &str) {
        let mut inner = self.lock();
        inner.emails.remove(id);
        inner.history.retain(|entry| entry.email_id != id);
    }

    /// Ordered status history of a row.
    ///
    /// # Panics
    /// Panics if the inner mutex is poisoned.
    #[must_use]
    pub fn history(&self, id: &str) -> Vec<EmailStatus> {
        self.lock()
            .history
            .iter()
            .filter(|entry| entry.email_id == id)
            .map(|entry| entry.status)
            .collect()
    }

    /// Full history entries of a row, including reasons.
    ///
    /// # Panics
    /// Panics if the inner mutex is poisoned.
    #[must_use]
    pub fn history_entries(&self, id: &str) -> Vec<HistoryEntry> {
        self.lock()
            .history
            .iter()
            .filter(|entry| entry.email_id == id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("MemoryOutbox mutex poisoned")
    }

    fn transition(
        &self,
        id: &str,
        from: EmailStatus,
        to: EmailStatus,
        reason: Option<&str>,
        eml_file_path: Option<&str>,
    ) -> Result<(), OutboxError> {
        let mut inner = self.lock();

        let Some(email) = inner.emails.get_mut(id) else {
            return Err(OutboxError::LockNotAcquired);
        };
        if email.status != from {
            return Err(OutboxError::LockNotAcquired);
        }

        email.status = to;
        email.version += 1;
        email.updated_at = Utc::now();
        email.reason = reason.filter(|reason| !reason.is_empty()).map(str::to_string);
        if let Some(path) = eml_file_path {
            email.eml_file_path = Some(path.to_string());
        }

        inner.history.push(HistoryEntry {
            email_id: id.to_string(),
            status: to,
            reason: reason.filter(|reason| !reason.is_empty()).map(str::to_string),
            created_at: Utc::now(),
        });

        Ok(())
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn query(
        &self,
        _cancel: &Shutdown,
        status: EmailStatus,
        limit: i64,
    ) -> Result<Vec<Email>, OutboxError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let mut matching: Vec<Email> = self
            .lock()
            .emails
            .values()
            .filter(|email| email.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|email| email.updated_at);
        matching.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(matching)
    }

    async fn update(
        &self,
        _cancel: &Shutdown,
        id: &str,
        to: EmailStatus,
        reason: &str,
        _ttl: Option<i64>,
    ) -> Result<(), OutboxError> {
        let Some(from) = to.expected_from() else {
            return Err(OutboxError::LockNotAcquired);
        };
        self.transition(id, from, to, Some(reason), None)
    }

    async fn ready(
        &self,
        _cancel: &Shutdown,
        id: &str,
        eml_file_path: &str,
        _ttl: Option<i64>,
    ) -> Result<(), OutboxError> {
        self.transition(
            id,
            EmailStatus::Intaking,
            EmailStatus::Ready,
            None,
            Some(eml_file_path),
        )
    }

    async fn requeue(&self, _cancel: &Shutdown, id: &str) -> Result<(), OutboxError> {
        self.transition(
            id,
            EmailStatus::Processing,
            EmailStatus::Ready,
            None,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> Shutdown {
        Shutdown::new()
    }

    #[tokio::test]
    async fn create_then_walk_the_happy_path() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Accepted, "/tmp/p.json");

        let cancel = cancel();
        outbox
            .update(&cancel, "e1", EmailStatus::Intaking, "", None)
            .await
            .unwrap();
        outbox.ready(&cancel, "e1", "/eml/e1.eml", None).await.unwrap();
        outbox
            .update(&cancel, "e1", EmailStatus::Processing, "", None)
            .await
            .unwrap();
        outbox
            .update(&cancel, "e1", EmailStatus::Sent, "", None)
            .await
            .unwrap();

        let email = outbox.get("e1").unwrap();
        assert_eq!(email.status, EmailStatus::Sent);
        assert_eq!(email.version, 4);
        assert_eq!(email.eml_file_path.as_deref(), Some("/eml/e1.eml"));

        assert_eq!(
            outbox.history("e1"),
            vec![
                EmailStatus::Accepted,
                EmailStatus::Intaking,
                EmailStatus::Ready,
                EmailStatus::Processing,
                EmailStatus::Sent,
            ]
        );
    }

    #[tokio::test]
    async fn update_on_wrong_predecessor_is_lock_not_acquired() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Accepted, "/tmp/p.json");

        let err = outbox
            .update(&cancel(), "e1", EmailStatus::Processing, "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxError::LockNotAcquired));

        // Nothing mutated.
        let email = outbox.get("e1").unwrap();
        assert_eq!(email.status, EmailStatus::Accepted);
        assert_eq!(email.version, 0);
        assert_eq!(outbox.history("e1").len(), 1);
    }

    #[tokio::test]
    async fn update_on_terminal_row_is_lock_not_acquired() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Invalid, "/tmp/p.json");

        for to in [
            EmailStatus::Intaking,
            EmailStatus::Processing,
            EmailStatus::Sent,
            EmailStatus::SentAcknowledged,
        ] {
            let err = outbox
                .update(&cancel(), "e1", to, "", None)
                .await
                .unwrap_err();
            assert!(matches!(err, OutboxError::LockNotAcquired));
        }
    }

    #[tokio::test]
    async fn query_zero_limit_returns_empty() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Accepted, "/tmp/p.json");

        let rows = outbox
            .query(&cancel(), EmailStatus::Accepted, 0)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn query_orders_by_updated_at_and_respects_limit() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Accepted, "/tmp/1.json");
        outbox.create("e2", EmailStatus::Accepted, "/tmp/2.json");
        outbox.create("e3", EmailStatus::Ready, "/tmp/3.json");

        let rows = outbox
            .query(&cancel(), EmailStatus::Accepted, 25)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = outbox
            .query(&cancel(), EmailStatus::Accepted, 1)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn requeue_returns_processing_row_to_ready() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Processing, "/tmp/p.json");

        outbox.requeue(&cancel(), "e1").await.unwrap();

        let email = outbox.get("e1").unwrap();
        assert_eq!(email.status, EmailStatus::Ready);
        assert_eq!(email.version, 1);
        assert!(email.reason.is_none());

        // Requeueing a row that is no longer PROCESSING loses the race.
        let err = outbox.requeue(&cancel(), "e1").await.unwrap_err();
        assert!(matches!(err, OutboxError::LockNotAcquired));
    }

    #[tokio::test]
    async fn delete_removes_the_row_and_its_history() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Accepted, "/tmp/p.json");
        outbox.create("e2", EmailStatus::Accepted, "/tmp/q.json");

        outbox.delete("e1");

        assert!(outbox.get("e1").is_none());
        assert!(outbox.history("e1").is_empty());
        assert_eq!(outbox.history("e2").len(), 1);
    }

    #[tokio::test]
    async fn concurrent_claims_produce_exactly_one_winner() {
        let outbox = MemoryOutbox::new();
        outbox.create("e1", EmailStatus::Ready, "/tmp/p.json");

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let outbox = outbox.clone();
            set.spawn(async move {
                outbox
                    .update(&Shutdown::new(), "e1", EmailStatus::Processing, "", None)
                    .await
            });
        }

        let mut wins = 0;
        let mut losses = 0;
        while let Some(result) = set.join_next().await {
            match result.unwrap() {
                Ok(()) => wins += 1,
                Err(OutboxError::LockNotAcquired) => losses += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(losses, 7);
        assert_eq!(outbox.get("e1").unwrap().version, 1);
    }
}
