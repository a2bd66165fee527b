//! End-to-end tests against an in-process SMTP relay and a scripted transport.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use outbox::{
    Attachment, Email, Envelope, Error, Outbox, Rejection, RelayConfig, Security, Session,
    Transport,
};
use outbox_mime::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn parse(wire: &[u8]) -> Message {
    Message::parse(std::str::from_utf8(wire).unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// Fake relay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Behaviour {
    reject_auth: bool,
    refuse: Vec<&'static str>,
}

#[derive(Debug, Default)]
struct Transcript {
    commands: Vec<String>,
    data: Option<String>,
}

impl Transcript {
    fn verbs(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|c| c.split([' ', ':']).next().unwrap_or_default().to_string())
            .collect()
    }
}

async fn spawn_relay(behaviour: Behaviour) -> (u16, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        serve(socket, behaviour).await
    });
    (port, handle)
}

async fn serve(socket: TcpStream, behaviour: Behaviour) -> Transcript {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut transcript = Transcript::default();

    let _ = write.write_all(b"220 relay.test ESMTP\r\n").await;
    while let Ok(Some(line)) = lines.next_line().await {
        transcript.commands.push(line.clone());
        let upper = line.to_ascii_uppercase();

        let reply: &[u8] = if upper.starts_with("EHLO") {
            b"250-relay.test\r\n250-SIZE 10485760\r\n250 AUTH PLAIN LOGIN\r\n"
        } else if upper.starts_with("AUTH") {
            if behaviour.reject_auth {
                b"535 5.7.8 Authentication credentials invalid\r\n"
            } else {
                b"235 2.7.0 Authentication successful\r\n"
            }
        } else if upper.starts_with("MAIL FROM") {
            b"250 2.1.0 OK\r\n"
        } else if upper.starts_with("RCPT TO") {
            if behaviour.refuse.iter().any(|r| line.contains(r)) {
                b"550 5.1.1 No such user\r\n"
            } else {
                b"250 2.1.5 OK\r\n"
            }
        } else if upper == "DATA" {
            let _ = write.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await;
            let mut data = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if line == "." {
                    break;
                }
                data.push_str(line.strip_prefix('.').unwrap_or(&line));
                data.push_str("\r\n");
            }
            transcript.data = Some(data);
            b"250 2.0.0 Queued as 4F2A\r\n"
        } else if upper == "QUIT" {
            let _ = write.write_all(b"221 2.0.0 Bye\r\n").await;
            break;
        } else {
            b"502 5.5.2 Command not recognized\r\n"
        };

        if write.write_all(reply).await.is_err() {
            break;
        }
    }

    transcript
}

fn relay_outbox(port: u16) -> Outbox {
    Outbox::from_config(
        "me@x.com",
        "secret",
        RelayConfig::new("127.0.0.1", port, Security::None),
    )
}

#[tokio::test]
async fn test_send_through_relay() {
    init_tracing();
    let (port, relay) = spawn_relay(Behaviour::default()).await;

    let email = Email::new(["a@x.com", "b@x.com"], "Hi", "Body text\n.leading dot").unwrap();
    let report = Attachment::from_bytes("report.pdf", b"%PDF-1.4...".to_vec());
    let delivery = relay_outbox(port).send(&email, &[report]).await.unwrap();

    assert_eq!(delivery.accepted, ["a@x.com", "b@x.com"]);
    assert!(delivery.is_complete());

    let transcript = relay.await.unwrap();
    assert_eq!(
        transcript.verbs(),
        ["EHLO", "AUTH", "MAIL", "RCPT", "RCPT", "DATA", "QUIT"]
    );
    assert_eq!(transcript.commands[0], "EHLO localhost");
    assert!(transcript.commands[1].starts_with("AUTH PLAIN "));
    assert!(transcript.commands[2].starts_with("MAIL FROM:<me@x.com>"));
    assert_eq!(transcript.commands[3], "RCPT TO:<a@x.com>");
    assert_eq!(transcript.commands[4], "RCPT TO:<b@x.com>");

    let message = parse(transcript.data.unwrap().as_bytes());
    assert_eq!(message.from(), Some("me@x.com"));
    assert_eq!(message.to(), Some("a@x.com, b@x.com"));
    assert_eq!(message.subject(), Some("Hi"));
    assert!(message.date().is_some());
    assert_eq!(message.text_part().unwrap(), "Body text\r\n.leading dot");

    let attachment = message.attachments().next().unwrap();
    assert_eq!(attachment.filename().as_deref(), Some("report.pdf"));
    assert_eq!(attachment.decode_body().unwrap(), b"%PDF-1.4...");
}

#[tokio::test]
async fn test_partial_refusal_is_reported() {
    init_tracing();
    let behaviour = Behaviour {
        refuse: vec!["b@x.com"],
        ..Behaviour::default()
    };
    let (port, relay) = spawn_relay(behaviour).await;

    let email = Email::new(["a@x.com", "b@x.com"], "Hi", "Body text").unwrap();
    let delivery = relay_outbox(port).send(&email, &[]).await.unwrap();

    assert_eq!(delivery.accepted, ["a@x.com"]);
    assert_eq!(delivery.refused.len(), 1);
    assert_eq!(delivery.refused[0].address.as_str(), "b@x.com");
    assert_eq!(delivery.refused[0].code.as_u16(), 550);
    assert!(!delivery.is_complete());

    let transcript = relay.await.unwrap();
    assert!(transcript.data.is_some());
    assert_eq!(transcript.verbs().last().map(String::as_str), Some("QUIT"));
}

#[tokio::test]
async fn test_all_recipients_refused() {
    init_tracing();
    let behaviour = Behaviour {
        refuse: vec!["a@x.com", "b@x.com"],
        ..Behaviour::default()
    };
    let (port, relay) = spawn_relay(behaviour).await;

    let email = Email::new(["a@x.com", "b@x.com"], "Hi", "Body text").unwrap();
    let err = relay_outbox(port).send(&email, &[]).await.unwrap_err();

    match &err {
        Error::RecipientsRefused(rejections) => {
            let refused: Vec<_> = rejections.iter().map(|r| r.address.as_str()).collect();
            assert_eq!(refused, ["a@x.com", "b@x.com"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(err.is_transport());

    let transcript = relay.await.unwrap();
    assert!(transcript.data.is_none());
    assert!(!transcript.verbs().contains(&"DATA".to_string()));
}

#[tokio::test]
async fn test_rejected_credentials() {
    init_tracing();
    let behaviour = Behaviour {
        reject_auth: true,
        ..Behaviour::default()
    };
    let (port, relay) = spawn_relay(behaviour).await;

    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();
    let err = relay_outbox(port).send(&email, &[]).await.unwrap_err();

    match err {
        Error::Authentication(source) => assert_eq!(source.code(), Some(535)),
        other => panic!("unexpected: {other:?}"),
    }

    // The connection is dropped right after the refusal
    let transcript = relay.await.unwrap();
    assert_eq!(transcript.verbs(), ["EHLO", "AUTH"]);
}

#[tokio::test]
async fn test_starttls_not_offered() {
    init_tracing();
    let (port, relay) = spawn_relay(Behaviour::default()).await;

    let outbox = Outbox::new("me@x.com", "secret", "127.0.0.1", port, true);
    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();
    let err = outbox.send(&email, &[]).await.unwrap_err();

    assert!(matches!(err, Error::Tls(outbox_smtp::Error::NotSupported(_))));
    assert_eq!(relay.await.unwrap().verbs(), ["EHLO"]);
}

#[tokio::test]
async fn test_relay_unreachable() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();
    let err = relay_outbox(port).send(&email, &[]).await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
}

#[test]
fn test_send_blocking() {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (port, relay) = runtime.block_on(spawn_relay(Behaviour::default()));

    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();
    let delivery = relay_outbox(port).send_blocking(&email, &[]).unwrap();
    assert_eq!(delivery.accepted, ["a@x.com"]);

    let transcript = runtime.block_on(relay).unwrap();
    assert_eq!(transcript.verbs().last().map(String::as_str), Some("QUIT"));
}

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Script {
    fail_auth: bool,
    fail_quit: bool,
}

#[derive(Debug, Default)]
struct Calls {
    connects: AtomicUsize,
    upgrades: AtomicUsize,
    auths: AtomicUsize,
    submits: AtomicUsize,
    dropped: AtomicUsize,
    message: Mutex<Option<Vec<u8>>>,
}

impl Calls {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
struct ScriptedTransport {
    script: Script,
    calls: Arc<Calls>,
}

#[derive(Debug)]
struct ScriptedSession {
    script: Script,
    calls: Arc<Calls>,
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.calls.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl Transport for ScriptedTransport {
    type Session = ScriptedSession;

    async fn connect(&self, _relay: &RelayConfig) -> outbox::Result<ScriptedSession> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            script: self.script.clone(),
            calls: Arc::clone(&self.calls),
        })
    }
}

impl Session for ScriptedSession {
    async fn upgrade_to_tls(self) -> outbox::Result<Self> {
        self.calls.upgrades.fetch_add(1, Ordering::SeqCst);
        Ok(self)
    }

    async fn authenticate(self, _username: &str, _password: &str) -> outbox::Result<Self> {
        self.calls.auths.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_auth {
            return Err(Error::Authentication(outbox_smtp::Error::smtp_error(
                535,
                "5.7.8 bad credentials",
            )));
        }
        Ok(self)
    }

    async fn submit(
        self,
        _envelope: &Envelope,
        message: &[u8],
    ) -> outbox::Result<(Self, Vec<Rejection>)> {
        self.calls.submits.fetch_add(1, Ordering::SeqCst);
        *self.calls.message.lock().unwrap() = Some(message.to_vec());
        Ok((self, Vec::new()))
    }

    async fn close(self) -> outbox::Result<()> {
        if self.script.fail_quit {
            return Err(Error::Connection(outbox_smtp::Error::ConnectionClosed));
        }
        Ok(())
    }
}

fn scripted(script: Script, security: Security) -> (Outbox<ScriptedTransport>, Arc<Calls>) {
    let transport = ScriptedTransport {
        script,
        calls: Arc::default(),
    };
    let calls = Arc::clone(&transport.calls);
    let outbox = Outbox::from_config(
        "me@x.com",
        "secret",
        RelayConfig::new("relay.test", 587, security),
    )
    .with_transport(transport);
    (outbox, calls)
}

#[tokio::test]
async fn test_assembled_message_without_attachments() {
    let (outbox, calls) = scripted(Script::default(), Security::None);
    let email = Email::new(["a@x.com", "b@x.com"], "Hi", "Body text").unwrap();

    outbox.send(&email, &[]).await.unwrap();

    let wire = calls.message.lock().unwrap().take().unwrap();
    let message = parse(&wire);
    assert_eq!(message.to(), Some("a@x.com, b@x.com"));
    assert_eq!(message.subject(), Some("Hi"));
    assert_eq!(message.parts.len(), 1);
    assert_eq!(message.text_part().unwrap(), "Body text");
}

#[tokio::test]
async fn test_authentication_failure_is_not_retried() {
    let script = Script {
        fail_auth: true,
        ..Script::default()
    };
    let (outbox, calls) = scripted(script, Security::StartTls);
    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();

    let err = outbox.send(&email, &[]).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Authentication failed: SMTP error 535: 5.7.8 bad credentials"
    );
    assert_eq!(Calls::count(&calls.connects), 1);
    assert_eq!(Calls::count(&calls.upgrades), 1);
    assert_eq!(Calls::count(&calls.auths), 1);
    assert_eq!(Calls::count(&calls.submits), 0);
    assert_eq!(Calls::count(&calls.dropped), 1);
}

#[tokio::test]
async fn test_unreadable_attachment_stops_before_connecting() {
    let (outbox, calls) = scripted(Script::default(), Security::StartTls);
    let file = tempfile::NamedTempFile::new().unwrap();
    let attachment = Attachment::from_file("notes.txt", file.path()).unwrap();
    file.close().unwrap();

    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();
    let err = outbox.send(&email, &[attachment]).await.unwrap_err();

    assert!(matches!(err, Error::Io(_)));
    assert_eq!(Calls::count(&calls.connects), 0);
}

#[tokio::test]
async fn test_invalid_recipient_stops_before_connecting() {
    let (outbox, calls) = scripted(Script::default(), Security::None);
    let email = Email::new(["a@x.com", "not an address"], "Hi", "Body text").unwrap();

    let err = outbox.send(&email, &[]).await.unwrap_err();

    assert!(matches!(err, Error::InvalidAddress(_)));
    assert!(err.is_validation());
    assert_eq!(Calls::count(&calls.connects), 0);
}

#[tokio::test]
async fn test_login_that_is_not_an_address_stops_before_connecting() {
    let calls = Arc::new(Calls::default());
    let transport = ScriptedTransport {
        script: Script::default(),
        calls: Arc::clone(&calls),
    };
    let outbox = Outbox::from_config(
        "apikey",
        "secret",
        RelayConfig::new("relay.test", 587, Security::StartTls),
    )
    .with_transport(transport);
    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();

    let err = outbox.send(&email, &[]).await.unwrap_err();

    assert!(matches!(err, Error::InvalidAddress(_)));
    assert_eq!(Calls::count(&calls.connects), 0);
    assert_eq!(Calls::count(&calls.auths), 0);
}

#[tokio::test]
async fn test_file_attachment_is_sent() {
    let (outbox, calls) = scripted(Script::default(), Security::None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.txt");
    std::fs::write(&path, b"hello").unwrap();

    let attachment = Attachment::from_file(path.to_string_lossy(), &path).unwrap();
    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();
    outbox.send(&email, &[attachment]).await.unwrap();

    let wire = calls.message.lock().unwrap().take().unwrap();
    let message = parse(&wire);
    let part = message.attachments().next().unwrap();
    assert_eq!(
        part.headers.get("Content-Disposition"),
        Some(r#"attachment; filename="hello.txt""#)
    );
    assert_eq!(part.decode_body().unwrap(), b"hello");
}

#[tokio::test]
async fn test_quit_failure_after_delivery_is_ignored() {
    let script = Script {
        fail_quit: true,
        ..Script::default()
    };
    let (outbox, calls) = scripted(script, Security::None);
    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();

    let delivery = outbox.send(&email, &[]).await.unwrap();

    assert_eq!(delivery.accepted, ["a@x.com"]);
    assert_eq!(Calls::count(&calls.upgrades), 0);
    assert_eq!(Calls::count(&calls.dropped), 1);
}

#[tokio::test]
async fn test_outbox_is_reusable() {
    let (outbox, calls) = scripted(Script::default(), Security::None);
    let email = Email::new(["a@x.com"], "Hi", "Body text").unwrap();

    outbox.send(&email, &[]).await.unwrap();
    outbox.send(&email, &[]).await.unwrap();

    assert_eq!(Calls::count(&calls.connects), 2);
    assert_eq!(Calls::count(&calls.dropped), 2);
}
