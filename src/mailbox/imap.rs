//! Generic IMAP/SMTP mailbox gateway.
//!
//! Inbound: raw IMAP4 over rustls TLS with a persistent session held for
//! the process lifetime (connected at startup, LOGOUT at shutdown).
//! Outbound: SMTP via lettre. All blocking socket work runs inside
//! `spawn_blocking`.
//!
//! Fetching uses `UID` commands so message ids stay stable for the life
//! of the message, and `BODY.PEEK[]` so fetching never flips the `\Seen`
//! flag — only `mark_read` does.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::ImapConfig;
use crate::error::MailboxError;
use crate::mailbox::{message_id_header, reply_subject};
use crate::pipeline::types::{EmailRecord, MailboxGateway};

/// Socket read timeout for IMAP commands.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

// ── IMAP session ────────────────────────────────────────────────────

/// One authenticated IMAP connection with its tag counter.
struct ImapSession {
    stream: TlsStream,
    tag: u32,
}

impl ImapSession {
    /// Open a TLS connection, read the greeting, and LOGIN.
    fn open(config: &ImapConfig, username: &str) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((&*config.host, config.port)).map_err(|e| {
            MailboxError::ConnectFailed {
                host: config.host.clone(),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name: rustls::pki_types::ServerName<'_> =
            rustls::pki_types::ServerName::try_from(config.host.clone()).map_err(|e| {
                MailboxError::ConnectFailed {
                    host: config.host.clone(),
                    reason: format!("invalid server name: {e}"),
                }
            })?;
        let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(|e| {
            MailboxError::ConnectFailed {
                host: config.host.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };

        let _greeting = session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            username,
            config.password.expose_secret()
        ))?;
        if !last_line_ok(&login) {
            return Err(MailboxError::AuthFailed {
                account: username.to_string(),
                reason: "IMAP LOGIN rejected".into(),
            });
        }

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match std::io::Read::read(&mut self.stream, &mut byte) {
                Ok(0) => return Err(MailboxError::Protocol("IMAP connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send one tagged command and collect all response lines up to and
    /// including the tagged completion line.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MailboxError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");
        IoWrite::write_all(&mut self.stream, full.as_bytes())?;
        IoWrite::flush(&mut self.stream)?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = is_tagged_completion(&line, &tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }
}

fn last_line_ok(lines: &[String]) -> bool {
    lines
        .last()
        .is_some_and(|l| l.split_whitespace().nth(1) == Some("OK"))
}

/// The completion line is `{tag} OK|NO|BAD ...`. Requiring the status
/// token keeps a message body line that happens to start with the tag
/// from truncating response collection.
fn is_tagged_completion(line: &str, tag: &str) -> bool {
    line.strip_prefix(tag)
        .and_then(|rest| rest.strip_prefix(' '))
        .is_some_and(|rest| matches!(rest.split_whitespace().next(), Some("OK" | "NO" | "BAD")))
}

// ── Gateway ─────────────────────────────────────────────────────────

/// IMAP/SMTP mailbox gateway.
pub struct ImapMailbox {
    config: ImapConfig,
    own_address: String,
    session: Arc<Mutex<Option<ImapSession>>>,
}

impl ImapMailbox {
    /// Connect and authenticate. Fatal to startup on failure.
    pub async fn connect(config: ImapConfig, own_address: String) -> Result<Self, MailboxError> {
        let open_config = config.clone();
        let username = own_address.clone();
        let session =
            tokio::task::spawn_blocking(move || ImapSession::open(&open_config, &username))
                .await
                .map_err(|e| MailboxError::Protocol(format!("connect task panicked: {e}")))??;

        info!(host = %config.host, account = %own_address, "Connected to IMAP server");
        Ok(Self {
            config,
            own_address,
            session: Arc::new(Mutex::new(Some(session))),
        })
    }

    /// Send an SMTP message, blocking. Transport is built per send, as a
    /// held SMTP connection would idle out between polls anyway.
    fn send_smtp(&self, email: &EmailRecord, body: &str) -> Result<(), MailboxError> {
        let creds = Credentials::new(
            self.own_address.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| MailboxError::SendFailed {
                recipient: email.sender.clone(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let message = build_smtp_reply(&self.own_address, email, body)?;

        transport
            .send(&message)
            .map_err(|e| MailboxError::SendFailed {
                recipient: email.sender.clone(),
                reason: format!("SMTP send failed: {e}"),
            })?;
        Ok(())
    }

    /// Run a closure against the held IMAP session on the blocking pool.
    async fn with_session<T, F>(&self, f: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailboxError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| MailboxError::Protocol("session lock poisoned".into()))?;
            let session = guard
                .as_mut()
                .ok_or_else(|| MailboxError::Protocol("IMAP session closed".into()))?;
            f(session)
        })
        .await
        .map_err(|e| MailboxError::Protocol(format!("IMAP task panicked: {e}")))?
    }
}

#[async_trait]
impl MailboxGateway for ImapMailbox {
    fn name(&self) -> &str {
        "imap"
    }

    async fn fetch_latest_unread(&self) -> Result<Option<EmailRecord>, MailboxError> {
        let own_address = self.own_address.clone();
        self.with_session(move |session| {
            let select = session.command("SELECT \"INBOX\"")?;
            if !last_line_ok(&select) {
                return Err(MailboxError::FetchFailed("SELECT INBOX failed".into()));
            }

            let search = session.command("UID SEARCH UNSEEN")?;
            let Some(uid) = latest_search_uid(&search) else {
                debug!("No unread emails found");
                return Ok(None);
            };

            // BODY.PEEK keeps the message unread; mark_read flips the flag.
            let fetch = session.command(&format!("UID FETCH {uid} (BODY.PEEK[])"))?;
            if !last_line_ok(&fetch) {
                return Err(MailboxError::FetchFailed(format!(
                    "UID FETCH {uid} failed"
                )));
            }

            let raw = rfc822_from_fetch(&fetch);
            let parsed = MessageParser::default()
                .parse(raw.as_bytes())
                .ok_or_else(|| MailboxError::FetchFailed("unparseable RFC822 body".into()))?;

            Ok(Some(record_from_message(&uid, &own_address, &parsed)))
        })
        .await
    }

    async fn send_reply(&self, email: &EmailRecord, text: &str) -> Result<(), MailboxError> {
        let recipient = email.sender.clone();
        let this = self.clone_for_blocking();
        let email = email.clone();
        let body = text.to_string();
        tokio::task::spawn_blocking(move || this.send_smtp(&email, &body))
            .await
            .map_err(|e| MailboxError::Protocol(format!("SMTP task panicked: {e}")))??;
        info!(recipient = %recipient, "Reply sent via SMTP");
        Ok(())
    }

    async fn mark_read(&self, email: &EmailRecord) -> Result<(), MailboxError> {
        let uid = email.id.clone();
        self.with_session(move |session| {
            let resp = session.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
            if last_line_ok(&resp) {
                Ok(())
            } else {
                Err(MailboxError::MarkReadFailed {
                    id: uid,
                    reason: "UID STORE rejected".into(),
                })
            }
        })
        .await
    }

    async fn disconnect(&self) {
        let session = Arc::clone(&self.session);
        let result = tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = session.lock()
                && let Some(mut session) = guard.take()
            {
                session.logout();
            }
        })
        .await;
        if let Err(e) = result {
            warn!(error = %e, "IMAP logout task failed");
        } else {
            info!("Disconnected from IMAP server");
        }
    }
}

impl ImapMailbox {
    /// Cheap clone of the SMTP-relevant parts for use in spawn_blocking.
    fn clone_for_blocking(&self) -> Self {
        Self {
            config: self.config.clone(),
            own_address: self.own_address.clone(),
            session: Arc::clone(&self.session),
        }
    }
}

// ── Message assembly & parsing ──────────────────────────────────────

/// Build the outbound SMTP reply: addressed to the original sender, a
/// `Re: ` subject, and In-Reply-To/References pointing at the original
/// Message-ID when it is known.
fn build_smtp_reply(
    own_address: &str,
    email: &EmailRecord,
    body: &str,
) -> Result<Message, MailboxError> {
    let mut builder = Message::builder()
        .from(
            own_address
                .parse()
                .map_err(|e| MailboxError::SendFailed {
                    recipient: email.sender.clone(),
                    reason: format!("invalid from address: {e}"),
                })?,
        )
        .to(email
            .sender
            .parse()
            .map_err(|e| MailboxError::SendFailed {
                recipient: email.sender.clone(),
                reason: format!("invalid to address: {e}"),
            })?)
        .subject(reply_subject(&email.subject));

    if let Some(message_id) = &email.message_id {
        let header = message_id_header(message_id);
        builder = builder.in_reply_to(header.clone()).references(header);
    }

    builder
        .body(body.to_string())
        .map_err(|e| MailboxError::SendFailed {
            recipient: email.sender.clone(),
            reason: format!("failed to build message: {e}"),
        })
}

/// Reassemble the RFC822 text from a `UID FETCH (BODY.PEEK[])` response:
/// drop the untagged FETCH announcement, the closing `)` line, and the
/// tagged completion line.
fn rfc822_from_fetch(lines: &[String]) -> String {
    let mut body = lines.get(1..lines.len().saturating_sub(1)).unwrap_or(&[]);
    if body.last().is_some_and(|l| l.trim() == ")") {
        body = &body[..body.len() - 1];
    }
    body.concat()
}

/// Extract the highest (latest) uid from `* SEARCH` response lines.
fn latest_search_uid(lines: &[String]) -> Option<String> {
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            if let Some(uid) = rest.split_whitespace().last() {
                return Some(uid.to_string());
            }
        }
    }
    None
}

/// Build a normalized record from a parsed RFC822 message.
fn record_from_message(
    uid: &str,
    own_address: &str,
    parsed: &mail_parser::Message,
) -> EmailRecord {
    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());

    let subject = parsed.subject().unwrap_or("").to_string();
    let body = extract_text(parsed);
    let date = parsed.date().map(|d| d.to_rfc3339()).unwrap_or_default();
    let list_id = parsed
        .header_raw("List-Id")
        .map(|s| s.trim().to_string());
    let message_id = parsed.message_id().map(|s| s.to_string());

    EmailRecord {
        id: uid.to_string(),
        // No threading concept on IMAP: thread_id equals id.
        thread_id: uid.to_string(),
        sender,
        recipient: own_address.to_string(),
        subject,
        body,
        date,
        list_id,
        message_id,
    }
}

/// Best-effort plain-text extraction; empty string when nothing readable.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Strip HTML tags and collapse whitespace (basic).
fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
