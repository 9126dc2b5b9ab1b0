use chrono::{DateTime, Utc};

use crate::status::EmailStatus;

/// One durable outbox row.
#[derive(Debug, Clone)]
pub struct Email {
    /// Globally unique identity, stable across transitions.
    pub id: String,
    pub status: EmailStatus,
    /// Incremented by exactly one on every successful transition.
    pub version: i64,
    /// Input JSON describing the mail to send. Set at creation.
    pub payload_file_path: String,
    /// Written by the intake pipe once the message is rendered.
    pub eml_file_path: Option<String>,
    /// Diagnostic set on error transitions.
    pub reason: Option<String>,
    /// Server-set on each transition.
    pub updated_at: DateTime<Utc>,
    /// Backend eviction hint. Advisory only; never consulted by logic
    /// and ignored by the MySQL backend.
    pub ttl: Option<i64>,
}

/// One append-only audit record, written in the same transaction as the
/// email transition it describes.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub email_id: String,
    pub status: EmailStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
