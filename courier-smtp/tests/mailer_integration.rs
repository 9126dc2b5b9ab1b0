//! Mailer sessions against a scripted SMTP server.

mod support;

use courier_smtp::{Mailer, SmtpConfig, SmtpError};
use support::mock_server::{MockSmtpServer, Script, ScriptedReply};

const EML: &[u8] = b"From: sender@example.com\r\n\
To: recipient@example.com\r\n\
Subject: Hello\r\n\
\r\n\
A short body.\r\n";

fn config_for(server: &MockSmtpServer) -> SmtpConfig {
    SmtpConfig {
        host: "127.0.0.1".to_string(),
        port: server.addr().port(),
        user: String::new(),
        password: String::new(),
        from: "sender@example.com".to_string(),
        allow_insecure_tls: false,
    }
}

fn write_eml(dir: &tempfile::TempDir, data: &[u8]) -> String {
    let path = dir.path().join("message.eml");
    std::fs::write(&path, data).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn submits_a_message_end_to_end() {
    let server = MockSmtpServer::start(Script::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(&dir, EML);

    Mailer::new(config_for(&server)).send(&eml_path).await.unwrap();

    let commands = server.commands();
    assert!(commands.iter().any(|c| c.starts_with("EHLO")));
    assert!(commands.contains(&"MAIL FROM:<sender@example.com>".to_string()));
    assert!(commands.contains(&"RCPT TO:<recipient@example.com>".to_string()));
    assert!(commands.contains(&"DATA".to_string()));
    assert!(commands.contains(&"QUIT".to_string()));

    let message = server.received_message().unwrap();
    let text = String::from_utf8_lossy(&message);
    assert!(text.contains("Subject: Hello"));
    assert!(text.contains("A short body."));
}

#[tokio::test]
async fn throttling_reply_is_classified_for_requeue() {
    let script = Script {
        mail_from: ScriptedReply::new(454, "Throttling failure"),
        ..Script::default()
    };
    let server = MockSmtpServer::start(script).await;
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(&dir, EML);

    let err = Mailer::new(config_for(&server))
        .send(&eml_path)
        .await
        .unwrap_err();

    assert!(err.is_throttling(), "expected throttling, got: {err}");
    assert_eq!(err.to_string(), "SMTP error: 454 Throttling failure");
}

#[tokio::test]
async fn permanent_rejection_is_not_throttling() {
    let script = Script {
        rcpt_to: ScriptedReply::new(550, "User unknown"),
        ..Script::default()
    };
    let server = MockSmtpServer::start(script).await;
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(&dir, EML);

    let err = Mailer::new(config_for(&server))
        .send(&eml_path)
        .await
        .unwrap_err();

    assert!(!err.is_throttling());
    assert!(err.to_string().contains("550"));
}

#[tokio::test]
async fn message_without_recipient_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(&dir, b"From: a@x.example\r\nSubject: S\r\n\r\nbody\r\n");

    // Port 9 is discard; nothing should ever connect to it because the
    // recipient check happens first.
    let config = SmtpConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        user: String::new(),
        password: String::new(),
        from: "a@x.example".to_string(),
        allow_insecure_tls: false,
    };

    let err = Mailer::new(config).send(&eml_path).await.unwrap_err();
    assert!(matches!(err, SmtpError::MissingRecipient));
}

#[tokio::test]
async fn authenticates_when_credentials_are_configured() {
    let script = Script {
        ehlo_lines: vec![
            "mock.example.com".to_string(),
            "AUTH PLAIN LOGIN".to_string(),
        ],
        ..Script::default()
    };
    let server = MockSmtpServer::start(script).await;
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(&dir, EML);

    let mut config = config_for(&server);
    config.user = "mailer".to_string();
    config.password = "hunter2".to_string();

    Mailer::new(config).send(&eml_path).await.unwrap();

    let commands = server.commands();
    let auth = commands
        .iter()
        .find(|c| c.starts_with("AUTH PLAIN "))
        .expect("AUTH PLAIN command sent");
    // RFC 4616 initial response: base64("\0mailer\0hunter2").
    assert_eq!(auth, "AUTH PLAIN AG1haWxlcgBodW50ZXIy");
}

#[tokio::test]
async fn rejected_credentials_fail_the_session() {
    let script = Script {
        ehlo_lines: vec!["mock.example.com".to_string(), "AUTH PLAIN".to_string()],
        auth: ScriptedReply::new(535, "Authentication credentials invalid"),
        ..Script::default()
    };
    let server = MockSmtpServer::start(script).await;
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(&dir, EML);

    let mut config = config_for(&server);
    config.user = "mailer".to_string();
    config.password = "wrong".to_string();

    let err = Mailer::new(config).send(&eml_path).await.unwrap_err();
    assert!(!err.is_throttling());
    assert!(err.to_string().contains("535"));

    // The session never reached the envelope.
    assert!(!server.commands().iter().any(|c| c.starts_with("MAIL FROM")));
}

#[tokio::test]
async fn advertised_starttls_must_succeed() {
    // The relay advertises STARTTLS but refuses the upgrade; submission
    // must not continue in the clear.
    let script = Script {
        ehlo_lines: vec!["mock.example.com".to_string(), "STARTTLS".to_string()],
        ..Script::default()
    };
    let server = MockSmtpServer::start(script).await;
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(&dir, EML);

    let err = Mailer::new(config_for(&server))
        .send(&eml_path)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("454"));
    assert!(!server.commands().iter().any(|c| c.starts_with("MAIL FROM")));
}

#[tokio::test]
async fn dotted_lines_survive_submission() {
    let server = MockSmtpServer::start(Script::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let eml_path = write_eml(
        &dir,
        b"From: a@x.example\r\nTo: b@y.example\r\n\r\n.leading dot\r\n",
    );

    Mailer::new(config_for(&server)).send(&eml_path).await.unwrap();

    // The server strips the transparency dot on receipt the way a real
    // one would not, so the stuffed form is what it recorded.
    let message = server.received_message().unwrap();
    let text = String::from_utf8_lossy(&message);
    assert!(text.contains("..leading dot"));
}
