//! SMTP submission: a thin async client speaking the wire protocol and a
//! [`Mailer`] facade that submits a stored EML file in one session.
//!
//! The client supports plain TCP and STARTTLS upgrade, `AUTH PLAIN`, and
//! multi-line reply parsing. One connection per message; no pooling.

pub mod client;
pub mod config;
pub mod error;
pub mod mailer;
pub mod reply;

pub use client::SmtpClient;
pub use config::SmtpConfig;
pub use error::SmtpError;
pub use mailer::Mailer;
pub use reply::Reply;
