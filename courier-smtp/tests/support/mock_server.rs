//! Scripted SMTP server for exercising submission sessions.
//!
//! Serves a single connection: sends the greeting, answers each command
//! from its response table, and records everything the client sent for
//! later assertions.

#![allow(dead_code)] // Not every helper is used by every test file.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub code: u16,
    pub text: String,
}

impl ScriptedReply {
    pub fn new(code: u16, text: &str) -> Self {
        Self {
            code,
            text: text.to_string(),
        }
    }

    fn wire(&self) -> String {
        format!("{} {}\r\n", self.code, self.text)
    }
}

/// Per-command response table. Defaults to a fully successful session
/// that does not advertise STARTTLS or AUTH.
#[derive(Debug, Clone)]
pub struct Script {
    pub greeting: ScriptedReply,
    pub ehlo_lines: Vec<String>,
    /// Reply to a STARTTLS command. The mock cannot actually negotiate
    /// TLS, so scripts advertising STARTTLS should reject it here.
    pub starttls: ScriptedReply,
    pub auth: ScriptedReply,
    pub mail_from: ScriptedReply,
    pub rcpt_to: ScriptedReply,
    pub data: ScriptedReply,
    pub message_accepted: ScriptedReply,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: ScriptedReply::new(220, "mock.example.com ESMTP ready"),
            ehlo_lines: vec!["mock.example.com".to_string(), "SIZE 10485760".to_string()],
            starttls: ScriptedReply::new(454, "TLS not available due to temporary reason"),
            auth: ScriptedReply::new(235, "Authentication succeeded"),
            mail_from: ScriptedReply::new(250, "OK"),
            rcpt_to: ScriptedReply::new(250, "OK"),
            data: ScriptedReply::new(354, "End data with <CR><LF>.<CR><LF>"),
            message_accepted: ScriptedReply::new(250, "OK queued"),
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
    message: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MockSmtpServer {
    /// Bind to an ephemeral port and serve one scripted session in the
    /// background.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");

        let commands = Arc::new(Mutex::new(Vec::new()));
        let message = Arc::new(Mutex::new(None));

        let task_commands = Arc::clone(&commands);
        let task_message = Arc::clone(&message);
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let _ = serve(stream, &script, &task_commands, &task_message).await;
            }
        });

        Self {
            addr,
            commands,
            message,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands mutex poisoned").clone()
    }

    pub fn received_message(&self) -> Option<Vec<u8>> {
        self.message.lock().expect("message mutex poisoned").clone()
    }
}

async fn serve(
    stream: TcpStream,
    script: &Script,
    commands: &Arc<Mutex<Vec<String>>>,
    message: &Arc<Mutex<Option<Vec<u8>>>>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(script.greeting.wire().as_bytes()).await?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_string();
        commands
            .lock()
            .expect("commands mutex poisoned")
            .push(command.clone());

        let upper = command.to_ascii_uppercase();
        if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            let mut reply = String::new();
            for (index, text) in script.ehlo_lines.iter().enumerate() {
                let separator = if index + 1 == script.ehlo_lines.len() {
                    ' '
                } else {
                    '-'
                };
                reply.push_str(&format!("250{separator}{text}\r\n"));
            }
            write_half.write_all(reply.as_bytes()).await?;
        } else if upper.starts_with("STARTTLS") {
            write_half.write_all(script.starttls.wire().as_bytes()).await?;
        } else if upper.starts_with("AUTH") {
            write_half.write_all(script.auth.wire().as_bytes()).await?;
        } else if upper.starts_with("MAIL FROM") {
            write_half.write_all(script.mail_from.wire().as_bytes()).await?;
        } else if upper.starts_with("RCPT TO") {
            write_half.write_all(script.rcpt_to.wire().as_bytes()).await?;
        } else if upper.starts_with("DATA") {
            write_half.write_all(script.data.wire().as_bytes()).await?;
            if script.data.code == 354 {
                let mut body = Vec::new();
                let mut body_line = String::new();
                loop {
                    body_line.clear();
                    if reader.read_line(&mut body_line).await? == 0 {
                        return Ok(());
                    }
                    if body_line == ".\r\n" || body_line == ".\n" {
                        break;
                    }
                    body.extend_from_slice(body_line.as_bytes());
                }
                *message.lock().expect("message mutex poisoned") = Some(body);
                write_half
                    .write_all(script.message_accepted.wire().as_bytes())
                    .await?;
            }
        } else if upper.starts_with("QUIT") {
            write_half.write_all(b"221 Bye\r\n").await?;
            return Ok(());
        } else {
            write_half.write_all(b"502 Command not implemented\r\n").await?;
        }
    }
}
