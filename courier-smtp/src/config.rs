use serde::Deserialize;

/// SMTP transport settings.
///
/// An empty `user` disables authentication. `allow_insecure_tls`
/// disables certificate verification and exists for development against
/// self-signed relays only.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub from: String,
    #[serde(default)]
    pub allow_insecure_tls: bool,
}

impl SmtpConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
