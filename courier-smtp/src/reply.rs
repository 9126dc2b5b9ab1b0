//! SMTP reply parsing.

use crate::error::SmtpError;

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// All text lines joined for diagnostics.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// Whether the EHLO reply advertises the given extension keyword.
    #[must_use]
    pub fn advertises(&self, extension: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case(extension))
        })
    }

    /// Try to parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None` if
    /// more data is needed.
    ///
    /// # Errors
    ///
    /// [`SmtpError::Parse`] on malformed lines or a code change inside a
    /// multi-line reply.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>, SmtpError> {
        let mut consumed = 0;
        let mut lines = Vec::new();
        let mut code = None;

        loop {
            let rest = &buffer[consumed..];
            let Some(newline) = rest.iter().position(|&byte| byte == b'\n') else {
                return Ok(None);
            };

            let raw = &rest[..newline];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            consumed += newline + 1;

            let text = std::str::from_utf8(raw)
                .map_err(|_| SmtpError::Parse("reply is not valid UTF-8".to_string()))?;
            if text.is_empty() {
                continue;
            }

            let (line_code, is_last, message) = parse_line(text)?;
            match code {
                None => code = Some(line_code),
                Some(expected) if expected != line_code => {
                    return Err(SmtpError::Parse(format!(
                        "code changed mid-reply: {expected} then {line_code}"
                    )));
                }
                Some(_) => {}
            }
            lines.push(message.to_string());

            if is_last {
                return Ok(Some((
                    Self {
                        code: line_code,
                        lines,
                    },
                    consumed,
                )));
            }
        }
    }
}

/// `250-rest` continues a reply, `250 rest` (or a bare `250`) ends it.
fn parse_line(line: &str) -> Result<(u16, bool, &str), SmtpError> {
    if line.len() < 3 {
        return Err(SmtpError::Parse(format!("reply line too short: {line:?}")));
    }

    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| SmtpError::Parse(format!("invalid reply code in {line:?}")))?;

    match line.as_bytes().get(3) {
        None => Ok((code, true, "")),
        Some(b' ') => Ok((code, true, &line[4..])),
        Some(b'-') => Ok((code, false, &line[4..])),
        Some(_) => Err(SmtpError::Parse(format!(
            "invalid separator after code in {line:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_line_reply() {
        let (reply, consumed) = Reply::parse(b"220 mail.example.com ESMTP\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.lines, vec!["mail.example.com ESMTP"]);
        assert_eq!(consumed, 28);
    }

    #[test]
    fn parses_a_multi_line_reply() {
        let data = b"250-mail.example.com\r\n250-STARTTLS\r\n250 SIZE 10485760\r\n";
        let (reply, consumed) = Reply::parse(data).unwrap().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(
            reply.lines,
            vec!["mail.example.com", "STARTTLS", "SIZE 10485760"]
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn bare_code_is_a_complete_reply() {
        let (reply, _) = Reply::parse(b"250\r\n").unwrap().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec![""]);
    }

    #[test]
    fn incomplete_replies_ask_for_more_data() {
        assert!(Reply::parse(b"250-mail.example.com\r\n250-SIZ")
            .unwrap()
            .is_none());
        assert!(Reply::parse(b"25").unwrap().is_none());
    }

    #[test]
    fn rejects_code_changes_mid_reply() {
        let err = Reply::parse(b"250-first\r\n500 second\r\n").unwrap_err();
        assert!(matches!(err, SmtpError::Parse(_)));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(Reply::parse(b"2x0 hello\r\n").is_err());
        assert!(Reply::parse(b"250#oops\r\n").is_err());
    }

    #[test]
    fn extension_advertisement() {
        let data = b"250-mail.example.com\r\n250-STARTTLS\r\n250 SIZE 1000\r\n";
        let (reply, _) = Reply::parse(data).unwrap().unwrap();
        assert!(reply.advertises("starttls"));
        assert!(reply.advertises("SIZE"));
        assert!(!reply.advertises("AUTH"));
    }

    #[test]
    fn consumes_only_one_reply() {
        let data = b"250 first\r\n354 second\r\n";
        let (reply, consumed) = Reply::parse(data).unwrap().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(consumed, 11);

        let (next, _) = Reply::parse(&data[consumed..]).unwrap().unwrap();
        assert_eq!(next.code, 354);
    }
}
