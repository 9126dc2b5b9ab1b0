//! Typed error handling for outbox operations.
//!
//! The split matters for retry behaviour:
//! - [`OutboxError::LockNotAcquired`] is the optimistic-lock signal and
//!   is never retried;
//! - backend errors carry a [`BackendErrorKind`] whose
//!   [`is_transient`](BackendErrorKind::is_transient) predicate decides
//!   whether the repository retries with backoff;
//! - everything else is returned verbatim.

use core::fmt::{self, Display, Formatter};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    /// The optimistic transition was rejected: the row's current status
    /// was not the expected predecessor. Another worker won the claim.
    #[error("lock not acquired: record was modified by another process")]
    LockNotAcquired,

    /// The operation was abandoned because shutdown was triggered while
    /// waiting to retry a transient backend error.
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// The `status` column held a string outside the state machine.
    #[error("unknown email status: {0}")]
    UnknownStatus(String),

    /// Backend (database) failure, classified for retry.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl OutboxError {
    /// Whether the repository should retry the operation with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Backend(backend) => backend.kind.is_transient(),
            Self::LockNotAcquired | Self::Cancelled | Self::UnknownStatus(_) => false,
        }
    }
}

/// A backend failure with its retry classification.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Classification of backend failures.
///
/// Kept as a standalone enum so the transient predicate can be unit
/// tested against synthesised values, independent of any live
/// connection.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BackendErrorKind {
    /// MySQL 1205: lock wait timeout exceeded.
    LockWaitTimeout,
    /// MySQL 1213: deadlock found when trying to get lock.
    Deadlock,
    /// MySQL 1040: too many connections.
    TooManyConnections,
    /// MySQL 1203: user already has more than max_user_connections.
    MaxUserConnections,
    /// Connection-level I/O or TLS failure.
    ConnectionLost,
    /// The pool could not hand out a connection in time.
    PoolTimeout,
    /// Backend write throughput exhausted.
    ThroughputExceeded,
    /// Serialisable transaction aborted by a conflicting write.
    TransactionConflict,
    /// Backend asked the caller to slow down.
    Throttling,
    /// Backend temporarily unavailable.
    ServiceUnavailable,
    /// Anything else: constraint violations, syntax, missing rows.
    Other,
}

impl BackendErrorKind {
    /// Whether an operation failing with this kind may succeed if simply
    /// tried again.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        match self {
            Self::LockWaitTimeout
            | Self::Deadlock
            | Self::TooManyConnections
            | Self::MaxUserConnections
            | Self::ConnectionLost
            | Self::PoolTimeout
            | Self::ThroughputExceeded
            | Self::TransactionConflict
            | Self::Throttling
            | Self::ServiceUnavailable => true,
            Self::Other => false,
        }
    }
}

impl Display for BackendErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let name = match self {
            Self::LockWaitTimeout => "lock wait timeout",
            Self::Deadlock => "deadlock",
            Self::TooManyConnections => "too many connections",
            Self::MaxUserConnections => "max user connections exceeded",
            Self::ConnectionLost => "connection lost",
            Self::PoolTimeout => "pool timeout",
            Self::ThroughputExceeded => "throughput exceeded",
            Self::TransactionConflict => "transaction conflict",
            Self::Throttling => "throttling",
            Self::ServiceUnavailable => "service unavailable",
            Self::Other => "backend failure",
        };
        write!(fmt, "{name}")
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::Database(db) => db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map_or(BackendErrorKind::Other, |mysql| match mysql.number() {
                    1205 => BackendErrorKind::LockWaitTimeout,
                    1213 => BackendErrorKind::Deadlock,
                    1040 => BackendErrorKind::TooManyConnections,
                    1203 => BackendErrorKind::MaxUserConnections,
                    _ => BackendErrorKind::Other,
                }),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => BackendErrorKind::ConnectionLost,
            sqlx::Error::PoolTimedOut => BackendErrorKind::PoolTimeout,
            _ => BackendErrorKind::Other,
        };

        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for OutboxError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(BackendError::from(err))
    }
}
