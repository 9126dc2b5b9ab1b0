//! Async SMTP client over plain TCP or TLS.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::SmtpError;
use crate::reply::Reply;

const READ_CHUNK: usize = 4096;

/// Cap on buffered reply bytes; a server reply should never come close.
const MAX_REPLY_SIZE: usize = 1024 * 1024;

enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn send(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SmtpError> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(SmtpError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(
        self,
        domain: &str,
        accept_invalid_certs: bool,
    ) -> Result<Self, SmtpError> {
        let Self::Plain(stream) = self else {
            return Err(SmtpError::Tls("connection is already TLS".to_string()));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            root_store
                .add(cert)
                .map_err(|err| SmtpError::Tls(format!("failed to add certificate: {err}")))?;
        }
        if !certs.errors.is_empty() {
            tracing::warn!(errors = ?certs.errors, "some system certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|err| SmtpError::Tls(format!("invalid server name: {err}")))?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|err| SmtpError::Tls(err.to_string()))?;

        Ok(Self::Tls(Box::new(tls_stream)))
    }
}

/// Accepts any certificate. Guarded behind `allow_insecure_tls`.
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> Result<
        tokio_rustls::rustls::client::danger::ServerCertVerified,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

/// One SMTP session. Stateless across messages: create, drive, drop.
pub struct SmtpClient {
    connection: Option<Connection>,
    pending: Vec<u8>,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Open a TCP connection to `addr`. `server_domain` is the name
    /// verified during a later STARTTLS upgrade.
    ///
    /// # Errors
    ///
    /// Connection failures.
    pub async fn connect(addr: &str, server_domain: String) -> Result<Self, SmtpError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            connection: Some(Connection::Plain(stream)),
            pending: Vec::with_capacity(READ_CHUNK),
            server_domain,
            accept_invalid_certs: false,
        })
    }

    /// Accept invalid TLS certificates (development relays only).
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Read the `220` greeting the server sends on connect.
    ///
    /// # Errors
    ///
    /// Read or parse failures.
    pub async fn read_greeting(&mut self) -> Result<Reply, SmtpError> {
        self.read_reply().await
    }

    /// Send one command line and read the reply.
    ///
    /// # Errors
    ///
    /// Write, read, or parse failures.
    pub async fn command(&mut self, command: &str) -> Result<Reply, SmtpError> {
        let line = format!("{command}\r\n");
        self.connection_mut()?.send(line.as_bytes()).await?;
        self.read_reply().await
    }

    /// # Errors
    ///
    /// See [`Self::command`].
    pub async fn ehlo(&mut self, domain: &str) -> Result<Reply, SmtpError> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// `AUTH PLAIN` with the RFC 4616 initial response.
    ///
    /// # Errors
    ///
    /// See [`Self::command`].
    pub async fn auth_plain(&mut self, user: &str, password: &str) -> Result<Reply, SmtpError> {
        let token = STANDARD.encode(format!("\0{user}\0{password}"));
        self.command(&format!("AUTH PLAIN {token}")).await
    }

    /// # Errors
    ///
    /// See [`Self::command`].
    pub async fn mail_from(&mut self, from: &str) -> Result<Reply, SmtpError> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// See [`Self::command`].
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Reply, SmtpError> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// See [`Self::command`].
    pub async fn data(&mut self) -> Result<Reply, SmtpError> {
        self.command("DATA").await
    }

    /// Send the message bytes after a `354`, dot-stuffed and terminated
    /// with `CRLF.CRLF`, and read the final reply.
    ///
    /// # Errors
    ///
    /// Write, read, or parse failures.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<Reply, SmtpError> {
        let stuffed = dot_stuff(data);
        let connection = self.connection_mut()?;
        connection.send(&stuffed).await?;

        if !stuffed.ends_with(b"\r\n") {
            connection.send(b"\r\n").await?;
        }
        connection.send(b".\r\n").await?;

        self.read_reply().await
    }

    /// # Errors
    ///
    /// See [`Self::command`].
    pub async fn quit(&mut self) -> Result<Reply, SmtpError> {
        self.command("QUIT").await
    }

    /// Issue `STARTTLS` and, on success, upgrade the connection.
    ///
    /// # Errors
    ///
    /// Command failures or a failed TLS handshake.
    pub async fn starttls(&mut self) -> Result<Reply, SmtpError> {
        let reply = self.command("STARTTLS").await?;

        if (200..300).contains(&reply.code) {
            let connection = self
                .connection
                .take()
                .ok_or(SmtpError::ConnectionClosed)?;
            self.connection = Some(
                connection
                    .upgrade_to_tls(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
        }

        Ok(reply)
    }

    fn connection_mut(&mut self) -> Result<&mut Connection, SmtpError> {
        self.connection.as_mut().ok_or(SmtpError::ConnectionClosed)
    }

    async fn read_reply(&mut self) -> Result<Reply, SmtpError> {
        loop {
            if let Some((reply, consumed)) = Reply::parse(&self.pending)? {
                self.pending.drain(..consumed);
                return Ok(reply);
            }

            if self.pending.len() >= MAX_REPLY_SIZE {
                return Err(SmtpError::Parse(format!(
                    "reply exceeds {MAX_REPLY_SIZE} bytes"
                )));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.connection_mut()?.read(&mut chunk).await?;
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Double any dot that starts a line (RFC 5321 section 4.5.2).
fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    let mut at_line_start = true;

    for &byte in data {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }

    out
}
