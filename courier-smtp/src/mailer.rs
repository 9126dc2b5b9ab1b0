//! Submission of a stored EML file: one session per message.

use crate::{client::SmtpClient, config::SmtpConfig, error::SmtpError, reply::Reply};

/// How many header lines are scanned for the recipient.
const RECIPIENT_SCAN_LINES: usize = 256;

/// Submits rendered messages to the configured relay.
///
/// Session shape: greeting, `EHLO`, `STARTTLS` when advertised (and then
/// `EHLO` again), `AUTH PLAIN` when credentials are configured, then
/// `MAIL FROM` / `RCPT TO` / `DATA`. The recipient comes from the
/// message itself, the envelope sender from configuration.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Submit the message stored at `eml_file_path`.
    ///
    /// # Errors
    ///
    /// [`SmtpError`] describing the first failing step; check
    /// [`SmtpError::is_throttling`] to decide between requeue and
    /// failure.
    pub async fn send(&self, eml_file_path: &str) -> Result<(), SmtpError> {
        let message = tokio::fs::read(eml_file_path).await?;
        let recipient = extract_recipient(&message)?;

        let mut client = SmtpClient::connect(&self.config.address(), self.config.host.clone())
            .await?
            .accept_invalid_certs(self.config.allow_insecure_tls);

        let greeting = client.read_greeting().await?;
        expect(greeting, &[220])?;

        let mut ehlo = expect(client.ehlo("localhost").await?, &[250])?;

        if ehlo.advertises("STARTTLS") {
            expect(client.starttls().await?, &[220])?;
            ehlo = expect(client.ehlo("localhost").await?, &[250])?;
        }

        if !self.config.user.is_empty() {
            if !ehlo.advertises("AUTH") {
                tracing::debug!("server does not advertise AUTH, attempting anyway");
            }
            expect(
                client
                    .auth_plain(&self.config.user, &self.config.password)
                    .await?,
                &[235],
            )?;
        }

        expect(client.mail_from(&self.config.from).await?, &[250])?;
        expect(client.rcpt_to(&recipient).await?, &[250, 251])?;
        expect(client.data().await?, &[354])?;
        expect(client.send_data(&message).await?, &[250])?;

        // The message is accepted at this point; a failed QUIT is noise.
        if let Err(err) = client.quit().await {
            tracing::debug!(error = %err, "QUIT after successful submission failed");
        }

        Ok(())
    }
}

fn expect(reply: Reply, accepted: &[u16]) -> Result<Reply, SmtpError> {
    if accepted.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(SmtpError::Reply {
            code: reply.code,
            message: reply.message(),
        })
    }
}

/// Find the first `To:` header within the leading lines of the message
/// and return its address.
///
/// # Errors
///
/// [`SmtpError::MissingRecipient`] when no parseable `To:` line exists
/// in the first 256 lines.
pub fn extract_recipient(message: &[u8]) -> Result<String, SmtpError> {
    for line in message.split(|&byte| byte == b'\n').take(RECIPIENT_SCAN_LINES) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Ok(text) = std::str::from_utf8(line) else {
            continue;
        };
        let Some(value) = text.strip_prefix("To:") else {
            continue;
        };

        let parsed = mailparse::addrparse(value.trim())
            .map_err(|_| SmtpError::MissingRecipient)?;
        for addr in parsed.iter() {
            if let mailparse::MailAddr::Single(single) = addr {
                return Ok(single.addr.clone());
            }
        }
        return Err(SmtpError::MissingRecipient);
    }

    Err(SmtpError::MissingRecipient)
}
