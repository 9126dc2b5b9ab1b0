use std::io;

use thiserror::Error;

/// Failures while submitting a message.
///
/// The split drives the sender pipe's terminal decision: throttling
/// replies requeue the row, everything else fails it.
#[derive(Debug, Error)]
pub enum SmtpError {
    /// Network-level failure (connect, read, write).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server sent something that is not an SMTP reply.
    #[error("failed to parse SMTP reply: {0}")]
    Parse(String),

    /// The server rejected a command.
    #[error("SMTP error: {code} {message}")]
    Reply { code: u16, message: String },

    /// TLS negotiation or certificate failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The peer closed the connection mid-session.
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// No parseable `To:` header in the first 256 lines of the message.
    #[error("could not find recipient in message")]
    MissingRecipient,
}

impl SmtpError {
    /// A transient capacity refusal (4xx class, e.g. `454 Throttling
    /// failure`). The row goes back to READY instead of FAILED.
    #[must_use]
    pub const fn is_throttling(&self) -> bool {
        match self {
            Self::Reply { code, .. } => *code >= 400 && *code < 500,
            Self::Io(_)
            | Self::Parse(_)
            | Self::Tls(_)
            | Self::ConnectionClosed
            | Self::MissingRecipient => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_xx_replies_are_throttling() {
        let err = SmtpError::Reply {
            code: 454,
            message: "Throttling failure".to_string(),
        };
        assert!(err.is_throttling());

        let err = SmtpError::Reply {
            code: 421,
            message: "Service not available".to_string(),
        };
        assert!(err.is_throttling());
    }

    #[test]
    fn five_xx_replies_are_permanent() {
        let err = SmtpError::Reply {
            code: 550,
            message: "User unknown".to_string(),
        };
        assert!(!err.is_throttling());
    }

    #[test]
    fn transport_failures_are_not_throttling() {
        assert!(!SmtpError::ConnectionClosed.is_throttling());
        assert!(!SmtpError::MissingRecipient.is_throttling());
        assert!(!SmtpError::Parse("garbage".into()).is_throttling());
        let io_err = SmtpError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(!io_err.is_throttling());
    }

    #[test]
    fn reply_error_display() {
        let err = SmtpError::Reply {
            code: 454,
            message: "Throttling failure".to_string(),
        };
        assert_eq!(err.to_string(), "SMTP error: 454 Throttling failure");
    }
}
