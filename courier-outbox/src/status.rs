use core::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::OutboxError;

/// Position of an email in the processing state machine.
///
/// The allowed transitions form a DAG:
///
/// ```text
/// ACCEPTED -> INTAKING -> READY -> PROCESSING -> SENT   -> CALLING-SENT-CALLBACK   -> SENT-ACKNOWLEDGED
///                |                     |        FAILED -> CALLING-FAILED-CALLBACK -> FAILED-ACKNOWLEDGED
///                +-> INVALID           +-> READY (requeue on throttling)
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EmailStatus {
    Accepted,
    Intaking,
    Ready,
    Processing,
    Sent,
    Failed,
    Invalid,
    CallingSentCallback,
    CallingFailedCallback,
    SentAcknowledged,
    FailedAcknowledged,
}

impl EmailStatus {
    /// The wire representation stored in the `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::Intaking => "INTAKING",
            Self::Ready => "READY",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Invalid => "INVALID",
            Self::CallingSentCallback => "CALLING-SENT-CALLBACK",
            Self::CallingFailedCallback => "CALLING-FAILED-CALLBACK",
            Self::SentAcknowledged => "SENT-ACKNOWLEDGED",
            Self::FailedAcknowledged => "FAILED-ACKNOWLEDGED",
        }
    }

    /// The status a row must currently hold for a transition into `self`
    /// to be legal. `None` for [`Self::Accepted`], which is only ever set
    /// at creation.
    #[must_use]
    pub const fn expected_from(self) -> Option<Self> {
        match self {
            Self::Accepted => None,
            Self::Intaking => Some(Self::Accepted),
            Self::Ready => Some(Self::Intaking),
            Self::Processing => Some(Self::Ready),
            Self::Sent | Self::Failed => Some(Self::Processing),
            Self::Invalid => Some(Self::Intaking),
            Self::CallingSentCallback => Some(Self::Sent),
            Self::CallingFailedCallback => Some(Self::Failed),
            Self::SentAcknowledged => Some(Self::CallingSentCallback),
            Self::FailedAcknowledged => Some(Self::CallingFailedCallback),
        }
    }

    /// Whether no further transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::SentAcknowledged | Self::FailedAcknowledged
        )
    }
}

impl Display for EmailStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = OutboxError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACCEPTED" => Ok(Self::Accepted),
            "INTAKING" => Ok(Self::Intaking),
            "READY" => Ok(Self::Ready),
            "PROCESSING" => Ok(Self::Processing),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            "INVALID" => Ok(Self::Invalid),
            "CALLING-SENT-CALLBACK" => Ok(Self::CallingSentCallback),
            "CALLING-FAILED-CALLBACK" => Ok(Self::CallingFailedCallback),
            "SENT-ACKNOWLEDGED" => Ok(Self::SentAcknowledged),
            "FAILED-ACKNOWLEDGED" => Ok(Self::FailedAcknowledged),
            other => Err(OutboxError::UnknownStatus(other.to_string())),
        }
    }
}
