//! RFC 5322 / MIME message rendering.
//!
//! Output discipline:
//! - headers are emitted in a fixed order, with the multipart boundary
//!   set to the payload id;
//! - address-list and MIME-structured headers are never folded (they are
//!   truncated at the 998 hard limit instead); every other header folds
//!   at the 76 soft limit, breaking at the last space and continuing
//!   with a single leading space;
//! - bodies are quoted-printable, attachments base64 wrapped at 76
//!   columns, all lines CRLF-terminated.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::{error::EmlError, payload::Payload};

/// Hard ceiling for any single header line (RFC 5322 section 2.1.1).
const MAX_LINE: usize = 998;
/// Soft limit at which foldable headers wrap.
const FOLD_AT: usize = 76;
/// Column width for base64 attachment bodies.
const BASE64_WRAP: usize = 76;

/// Headers emitted by the builder itself, in this order.
const STANDARD_HEADERS: &[&str] = &["From", "Reply-To", "To", "Date", "Subject", "Content-Type"];

/// Headers that must stay on one line: folding inside an address list or
/// a MIME parameter list breaks lenient parsers.
const UNFOLDABLE_HEADERS: &[&str] = &[
    "From",
    "To",
    "Cc",
    "Bcc",
    "Reply-To",
    "Sender",
    "Resent-From",
    "Resent-To",
    "Resent-Cc",
    "Resent-Bcc",
    "Resent-Sender",
    "Content-Type",
    "Content-Disposition",
    "Content-Transfer-Encoding",
    "Content-ID",
    "Content-Description",
];

/// An attachment resolved to its bytes.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub path: PathBuf,
    pub data: Vec<u8>,
}

impl Attachment {
    fn filename(&self) -> String {
        self.path
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned())
    }

    /// Content sniffing first, extension allow-list as fallback.
    fn mime_type(&self) -> &'static str {
        if let Some(kind) = infer::get(&self.data) {
            return kind.mime_type();
        }

        let extension = self
            .path
            .extension()
            .map_or_else(String::new, |ext| ext.to_string_lossy().to_ascii_lowercase());

        match extension.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

pub struct MessageBuilder {
    attachments_base_path: String,
}

impl MessageBuilder {
    #[must_use]
    pub fn new(attachments_base_path: impl Into<String>) -> Self {
        Self {
            attachments_base_path: attachments_base_path.into(),
        }
    }

    /// Read the payload's attachments and render the complete message.
    ///
    /// # Errors
    ///
    /// [`EmlError::Attachment`] when a named attachment cannot be read.
    pub async fn build(
        &self,
        payload: &Payload,
        date: DateTime<Utc>,
    ) -> Result<Vec<u8>, EmlError> {
        let mut attachments = Vec::with_capacity(payload.attachments.len());
        for uri in &payload.attachments {
            let path = format!("{}{uri}", self.attachments_base_path);
            let data = tokio::fs::read(&path)
                .await
                .map_err(|source| EmlError::Attachment {
                    path: path.clone(),
                    source,
                })?;
            attachments.push(Attachment {
                path: PathBuf::from(path),
                data,
            });
        }

        Ok(render(payload, &attachments, date))
    }
}

/// Pure rendering core. Identical inputs yield byte-identical output.
#[must_use]
pub fn render(payload: &Payload, attachments: &[Attachment], date: DateTime<Utc>) -> Vec<u8> {
    let mut out = Vec::with_capacity(2048);
    let boundary = payload.id.as_str();

    write_header(&mut out, "From", &payload.from);
    if payload.reply_to != payload.from {
        write_header(&mut out, "Reply-To", &payload.reply_to);
    }
    write_header(&mut out, "To", &payload.to);
    write_header(
        &mut out,
        "Date",
        &date.format("%a, %d %b %Y %H:%M:%S %z").to_string(),
    );
    write_header(&mut out, "Subject", &payload.subject);
    write_header(
        &mut out,
        "Content-Type",
        &format!("multipart/mixed; boundary=\"{boundary}\""),
    );

    let mut custom: Vec<(&String, &String)> = payload.custom_headers.iter().collect();
    custom.sort();
    for (key, value) in custom {
        if STANDARD_HEADERS
            .iter()
            .any(|standard| standard.eq_ignore_ascii_case(key))
        {
            continue;
        }
        write_header(&mut out, key, value);
    }

    out.extend_from_slice(b"\r\n");

    if !payload.body_text.is_empty() {
        write_body_part(&mut out, boundary, "text/plain", &payload.body_text);
    }
    if !payload.body_html.is_empty() {
        write_body_part(&mut out, boundary, "text/html", &payload.body_html);
    }

    for attachment in attachments {
        write_attachment(&mut out, boundary, attachment);
    }

    out.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    out
}

fn write_body_part(out: &mut Vec<u8>, boundary: &str, content_type: &str, body: &str) {
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    write_header(
        out,
        "Content-Type",
        &format!("{content_type}; charset=utf-8"),
    );
    write_header(out, "Content-Transfer-Encoding", "quoted-printable");
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(encode_quoted_printable(body).as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn write_attachment(out: &mut Vec<u8>, boundary: &str, attachment: &Attachment) {
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    write_header(
        out,
        "Content-Disposition",
        &format!("attachment; filename=\"{}\"", attachment.filename()),
    );
    write_header(out, "Content-Type", attachment.mime_type());
    write_header(out, "Content-Transfer-Encoding", "base64");
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(encode_base64_wrapped(&attachment.data).as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn can_fold(key: &str) -> bool {
    !UNFOLDABLE_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(key))
}

/// Emit one header line, folding or truncating per the rules above.
///
/// Operates on bytes: a fold or truncation point may land inside a
/// multi-byte sequence, exactly as the wire format allows.
fn write_header(out: &mut Vec<u8>, key: &str, value: &str) {
    let mut content = format!("{key}: {value}").into_bytes();

    // Hard limit counts the terminating CRLF.
    if content.len() + 2 > MAX_LINE {
        content.truncate(MAX_LINE - 2);
    }

    if !can_fold(key) || content.len() <= FOLD_AT {
        out.extend_from_slice(&content);
        out.extend_from_slice(b"\r\n");
        return;
    }

    // Break the first line at the last space before the limit, as long
    // as that space sits inside the value.
    let mut first_end = FOLD_AT.min(content.len());
    if let Some(last_space) = content[..first_end].iter().rposition(|&byte| byte == b' ') {
        if last_space > key.len() + 2 {
            first_end = last_space;
        }
    }
    out.extend_from_slice(&content[..first_end]);
    out.extend_from_slice(b"\r\n");

    let mut remaining = &content[first_end..];
    loop {
        // The continuation prefix space accounts for the off-by-one.
        if remaining.len() <= FOLD_AT - 1 {
            out.push(b' ');
            out.extend_from_slice(remaining);
            out.extend_from_slice(b"\r\n");
            return;
        }

        let mut break_point = (FOLD_AT - 2).min(remaining.len());
        if let Some(last_space) = remaining[..break_point]
            .iter()
            .rposition(|&byte| byte == b' ')
        {
            if last_space > 0 {
                break_point = last_space;
            }
        }

        out.push(b' ');
        out.extend_from_slice(&remaining[..break_point]);
        out.extend_from_slice(b"\r\n");
        remaining = &remaining[break_point..];
    }
}

/// Quoted-printable per RFC 2045: printable ASCII passes through, `=`
/// and everything else becomes `=XX`, soft breaks keep lines within 76
/// columns, and trailing whitespace before a line break is encoded.
fn encode_quoted_printable(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    let mut column = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let byte = bytes[i];

        if byte == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            out.push_str("\r\n");
            column = 0;
            i += 2;
            continue;
        }
        if byte == b'\n' {
            out.push_str("\r\n");
            column = 0;
            i += 1;
            continue;
        }

        let printable = (33..=126).contains(&byte) && byte != b'=';
        let whitespace = byte == b' ' || byte == b'\t';
        let at_line_end = match bytes.get(i + 1) {
            None | Some(&b'\n') => true,
            Some(&b'\r') => bytes.get(i + 2) == Some(&b'\n'),
            Some(_) => false,
        };
        let escape = !(printable || whitespace) || (whitespace && at_line_end);

        let width = if escape { 3 } else { 1 };
        if column + width > FOLD_AT - 1 {
            out.push_str("=\r\n");
            column = 0;
        }

        if escape {
            out.push('=');
            out.push_str(&format!("{byte:02X}"));
        } else {
            out.push(byte as char);
        }
        column += width;
        i += 1;
    }

    out
}

/// Standard base64, broken into 76-column lines joined by CRLF. No
/// trailing break; the caller terminates the part.
fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_WRAP * 2);

    for (index, chunk) in encoded.as_bytes().chunks(BASE64_WRAP).enumerate() {
        if index > 0 {
            out.push_str("\r\n");
        }
        out.extend(chunk.iter().map(|&byte| byte as char));
    }

    out
}

/// Content sniffing for a path that may not exist yet in tests.
#[must_use]
pub fn detect_mime(path: &Path, data: &[u8]) -> &'static str {
    Attachment {
        path: path.to_path_buf(),
        data: data.to_vec(),
    }
    .mime_type()
}
