//! Intake pipe: payload file to stored EML.

use async_trait::async_trait;
use chrono::Utc;
use courier_eml::{EmlError, EmlStorage, MessageBuilder, Payload};
use courier_outbox::{Email, EmailStatus};
use tracing::{error, info};

use crate::worker::{Disposition, Pipe, Transition};

/// Validates the payload, renders the MIME message, and persists it.
/// Any failure invalidates the row with a diagnostic reason.
pub struct IntakePipe {
    builder: MessageBuilder,
    storage: EmlStorage,
}

impl IntakePipe {
    #[must_use]
    pub fn new(storage: EmlStorage, attachments_base_path: impl Into<String>) -> Self {
        Self {
            builder: MessageBuilder::new(attachments_base_path),
            storage,
        }
    }

    async fn create_and_store(&self, email: &Email) -> Result<String, EmlError> {
        let payload = Payload::load(&email.payload_file_path)?;
        let message = self.builder.build(&payload, Utc::now()).await?;
        let path = self.storage.store(&message).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl Pipe for IntakePipe {
    fn transition(&self) -> Transition {
        Transition {
            pipe: "intake",
            start: EmailStatus::Accepted,
            processing: EmailStatus::Intaking,
        }
    }

    async fn run(&self, email: &Email) -> Disposition {
        match self.create_and_store(email).await {
            Ok(eml_file_path) => {
                info!(pipe = "intake", email_id = %email.id, "successfully intaken");
                Disposition::Ready { eml_file_path }
            }
            Err(err) => {
                error!(
                    pipe = "intake",
                    email_id = %email.id,
                    error = %err,
                    "failed to create and store EML"
                );
                Disposition::Advance {
                    to: EmailStatus::Invalid,
                    reason: err.to_string(),
                }
            }
        }
    }
}
