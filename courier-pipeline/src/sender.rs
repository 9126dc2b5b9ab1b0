//! Sender pipe: SMTP submission of a rendered message.

use std::sync::Arc;

use async_trait::async_trait;
use courier_outbox::{Email, EmailStatus};
use courier_smtp::{Mailer, SmtpError};
use tracing::{error, info, warn};

use crate::worker::{Disposition, Pipe, Transition};

/// Seam over [`Mailer`] so pipeline behaviour is testable without a
/// relay.
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send(&self, eml_file_path: &str) -> Result<(), SmtpError>;
}

#[async_trait]
impl MessageSender for Mailer {
    async fn send(&self, eml_file_path: &str) -> Result<(), SmtpError> {
        Self::send(self, eml_file_path).await
    }
}

pub struct SenderPipe {
    sender: Arc<dyn MessageSender>,
}

impl SenderPipe {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Pipe for SenderPipe {
    fn transition(&self) -> Transition {
        Transition {
            pipe: "sender",
            start: EmailStatus::Ready,
            processing: EmailStatus::Processing,
        }
    }

    async fn run(&self, email: &Email) -> Disposition {
        let Some(eml_file_path) = email.eml_file_path.as_deref() else {
            error!(pipe = "sender", email_id = %email.id, "row has no eml_file_path");
            return Disposition::Advance {
                to: EmailStatus::Failed,
                reason: "missing eml_file_path".to_string(),
            };
        };

        match self.sender.send(eml_file_path).await {
            Ok(()) => {
                info!(pipe = "sender", email_id = %email.id, "successfully sent");
                Disposition::Advance {
                    to: EmailStatus::Sent,
                    reason: String::new(),
                }
            }
            Err(err) if err.is_throttling() => {
                warn!(
                    pipe = "sender",
                    email_id = %email.id,
                    "smtp throttling, requeueing: {err}"
                );
                Disposition::Requeue
            }
            Err(err) => {
                error!(pipe = "sender", email_id = %email.id, "failed to send, error: {err}");
                Disposition::Advance {
                    to: EmailStatus::Failed,
                    reason: err.to_string(),
                }
            }
        }
    }
}
