//! Callback pipes: webhook notification of terminal outcomes.
//!
//! The notification itself is best-effort: only HTTP 409 Conflict is
//! retried, and whatever the final outcome, the row advances to its
//! acknowledged status. Losing a callback is logged; losing the audit
//! advance would wedge the row forever.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_outbox::{Email, EmailStatus};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::worker::{Disposition, Pipe, Transition};

/// Fixed timeout for each callback POST.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies this processor to the webhook peer.
const SOURCE_HEADER: (&str, &str) = ("X-MTRAX-SOURCE", "MULTIDIALOGO");

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    pub url: String,
    /// Attempts permitted while the peer answers 409 Conflict.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds slept between 409 retries.
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
}

/// The JSON document POSTed to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackBody {
    pub code: &'static str,
    pub reached_at: String,
    pub message_ids: Vec<String>,
    pub reason: String,
}

/// Shared, concurrency-safe HTTP client for both callback pipes.
pub struct CallbackClient {
    http: reqwest::Client,
    config: CallbackConfig,
}

impl CallbackClient {
    /// # Errors
    ///
    /// If the underlying HTTP client cannot be constructed.
    pub fn new(config: CallbackConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    /// POST the notification, retrying only on 409 Conflict. Every other
    /// response, and any transport error, ends the loop.
    ///
    /// # Errors
    ///
    /// Transport-level failure of the last request sent.
    pub async fn notify(&self, body: &CallbackBody) -> Result<StatusCode, reqwest::Error> {
        let mut attempt = 0;

        loop {
            let response = self
                .http
                .post(&self.config.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(SOURCE_HEADER.0, SOURCE_HEADER.1)
                .json(body)
                .send()
                .await?;

            let status = response.status();
            if status != StatusCode::CONFLICT {
                return Ok(status);
            }

            attempt += 1;
            if attempt >= self.config.max_retries {
                error!(
                    url = %self.config.url,
                    attempts = attempt,
                    "max retries exceeded for callback"
                );
                return Ok(status);
            }

            warn!(
                url = %self.config.url,
                attempt,
                max_retries = self.config.max_retries,
                retry_in_secs = self.config.retry_interval,
                "callback returned 409 Conflict, retrying"
            );
            tokio::time::sleep(Duration::from_secs(self.config.retry_interval)).await;
        }
    }
}

/// The two callback variants share everything but their transition
/// tuple, code, and reason policy.
pub struct CallbackPipe {
    transition: Transition,
    acknowledged: EmailStatus,
    code: &'static str,
    fixed_reason: Option<&'static str>,
    client: Arc<CallbackClient>,
}

impl CallbackPipe {
    /// Notifies the webhook that a message reached the mail server.
    #[must_use]
    pub fn sent(client: Arc<CallbackClient>) -> Self {
        Self {
            transition: Transition {
                pipe: "sent-callback",
                start: EmailStatus::Sent,
                processing: EmailStatus::CallingSentCallback,
            },
            acknowledged: EmailStatus::SentAcknowledged,
            code: "TRAVELING",
            fixed_reason: Some("Consegnato al server di posta"),
            client,
        }
    }

    /// Notifies the webhook that a message failed permanently.
    #[must_use]
    pub fn failed(client: Arc<CallbackClient>) -> Self {
        Self {
            transition: Transition {
                pipe: "failed-callback",
                start: EmailStatus::Failed,
                processing: EmailStatus::CallingFailedCallback,
            },
            acknowledged: EmailStatus::FailedAcknowledged,
            code: "DISPATCH-ERROR",
            fixed_reason: None,
            client,
        }
    }

    fn body_for(&self, email: &Email) -> CallbackBody {
        let reason = self.fixed_reason.map_or_else(
            || email.reason.clone().unwrap_or_default(),
            str::to_string,
        );

        CallbackBody {
            code: self.code,
            reached_at: email.updated_at.to_rfc3339(),
            message_ids: vec![email.id.clone()],
            reason,
        }
    }
}

#[async_trait]
impl Pipe for CallbackPipe {
    fn transition(&self) -> Transition {
        self.transition
    }

    async fn run(&self, email: &Email) -> Disposition {
        let pipe = self.transition.pipe;
        let body = self.body_for(email);

        match self.client.notify(&body).await {
            Ok(status) if status.is_success() => {
                info!(pipe, email_id = %email.id, "callback successfully processed");
            }
            Ok(status) => {
                error!(pipe, email_id = %email.id, %status, "error on callback");
            }
            Err(err) => {
                error!(pipe, email_id = %email.id, error = %err, "callback request failed");
            }
        }

        // The audit advance is mandatory even if the peer never accepted.
        Disposition::Advance {
            to: self.acknowledged,
            reason: email.reason.clone().unwrap_or_default(),
        }
    }
}
