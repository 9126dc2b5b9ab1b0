use std::{collections::HashMap, path::Path};

use serde::Deserialize;

use crate::error::EmlError;

/// The on-disk JSON document describing one email to send.
///
/// One file per email, referenced by the outbox row's
/// `payload_file_path`. Either `body_text` or `body_html` must be
/// non-empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    pub id: String,
    pub from: String,
    pub reply_to: String,
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub body_html: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

impl Payload {
    /// Read, parse and validate the payload file.
    ///
    /// # Errors
    ///
    /// [`EmlError::InvalidPayload`] on a missing file, malformed JSON,
    /// or any failed schema check. The message names the offending
    /// field.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EmlError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| {
            EmlError::InvalidPayload(format!(
                "failed to read payload file {}: {err}",
                path.display()
            ))
        })?;

        let payload: Self = serde_json::from_slice(&data)
            .map_err(|err| EmlError::InvalidPayload(format!("failed to parse payload: {err}")))?;

        payload.validate()?;
        Ok(payload)
    }

    /// Schema validation, separate from parsing so synthesised payloads
    /// in tests go through the same checks.
    ///
    /// # Errors
    ///
    /// [`EmlError::InvalidPayload`] naming the first failing field.
    pub fn validate(&self) -> Result<(), EmlError> {
        if uuid::Uuid::parse_str(&self.id).is_err() {
            return Err(EmlError::InvalidPayload(format!(
                "id is not a valid uuid: {:?}",
                self.id
            )));
        }

        validate_address("from", &self.from)?;
        validate_address("reply_to", &self.reply_to)?;
        validate_address("to", &self.to)?;

        if self.subject.is_empty() {
            return Err(EmlError::InvalidPayload("subject must not be empty".into()));
        }

        if self.body_html.is_empty() && self.body_text.is_empty() {
            return Err(EmlError::InvalidPayload(
                "one of body_html or body_text must be non-empty".into(),
            ));
        }

        for attachment in &self.attachments {
            if attachment.is_empty()
                || attachment
                    .bytes()
                    .any(|byte| byte.is_ascii_whitespace() || byte.is_ascii_control())
            {
                return Err(EmlError::InvalidPayload(format!(
                    "attachment is not a valid uri: {attachment:?}"
                )));
            }
        }

        Ok(())
    }
}

/// A field must hold exactly one well-formed address.
fn validate_address(field: &str, value: &str) -> Result<(), EmlError> {
    let invalid =
        || EmlError::InvalidPayload(format!("{field} is not a valid email address: {value:?}"));

    let parsed = mailparse::addrparse(value).map_err(|_| invalid())?;
    if parsed.len() != 1 {
        return Err(invalid());
    }

    let addr = match &parsed[0] {
        mailparse::MailAddr::Single(single) => &single.addr,
        mailparse::MailAddr::Group(_) => return Err(invalid()),
    };

    match addr.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}
