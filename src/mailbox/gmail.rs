//! Gmail mailbox gateway over the REST API (v1).
//!
//! Uses an OAuth2 bearer token with the `gmail.modify` scope. Replies
//! are sent with the original `threadId` so Gmail threads them; the
//! UNREAD label is removed only by `mark_read`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use lettre::Message;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::GmailConfig;
use crate::error::MailboxError;
use crate::mailbox::{message_id_header, reply_subject};
use crate::pipeline::types::{EmailRecord, MailboxGateway};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail REST API mailbox gateway. Stateless: no held connection.
pub struct GmailMailbox {
    http: reqwest::Client,
    token: SecretString,
    own_address: String,
}

impl GmailMailbox {
    pub fn new(config: GmailConfig, own_address: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: config.access_token,
            own_address,
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, MailboxError> {
        let resp = self
            .http
            .get(format!("{API_BASE}{path}"))
            .query(query)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| MailboxError::Http(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| MailboxError::Http(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| MailboxError::Http(e.to_string()))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, MailboxError> {
        let resp = self
            .http
            .post(format!("{API_BASE}{path}"))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| MailboxError::Http(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| MailboxError::Http(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| MailboxError::Http(e.to_string()))
    }
}

#[async_trait]
impl MailboxGateway for GmailMailbox {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn fetch_latest_unread(&self) -> Result<Option<EmailRecord>, MailboxError> {
        let listing = self
            .get(
                "/messages",
                &[
                    ("labelIds", "INBOX"),
                    ("labelIds", "UNREAD"),
                    ("maxResults", "1"),
                ],
            )
            .await?;

        let Some(id) = listing
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
        else {
            debug!("No unread emails found");
            return Ok(None);
        };

        let message = self
            .get(&format!("/messages/{id}"), &[("format", "full")])
            .await?;

        record_from_json(&message, &self.own_address)
            .map(Some)
            .ok_or_else(|| MailboxError::FetchFailed(format!("malformed message {id}")))
    }

    async fn send_reply(&self, email: &EmailRecord, text: &str) -> Result<(), MailboxError> {
        let raw = build_raw_reply(&self.own_address, email, text)?;
        self.post(
            "/messages/send",
            json!({ "raw": raw, "threadId": email.thread_id }),
        )
        .await?;
        info!(recipient = %email.sender, thread = %email.thread_id, "Reply sent via Gmail API");
        Ok(())
    }

    async fn mark_read(&self, email: &EmailRecord) -> Result<(), MailboxError> {
        self.post(
            &format!("/messages/{}/modify", email.id),
            json!({ "removeLabelIds": ["UNREAD"] }),
        )
        .await
        .map_err(|e| MailboxError::MarkReadFailed {
            id: email.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn disconnect(&self) {
        // Stateless HTTP client: nothing to release.
    }
}

// ── Message assembly & parsing ──────────────────────────────────────

/// Build the base64url-encoded MIME reply the `messages.send` endpoint
/// expects in its `raw` field.
fn build_raw_reply(
    own_address: &str,
    email: &EmailRecord,
    text: &str,
) -> Result<String, MailboxError> {
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

    // threadId alone threads within Gmail; the headers keep the reply
    // threaded for recipients on other providers.
    if let Some(message_id) = &email.message_id {
        let header = message_id_header(message_id);
        builder = builder.in_reply_to(header.clone()).references(header);
    }

    let message = builder
        .body(text.to_string())
        .map_err(|e| MailboxError::SendFailed {
            recipient: email.sender.clone(),
            reason: format!("failed to build message: {e}"),
        })?;

    Ok(URL_SAFE.encode(message.formatted()))
}

/// Build a normalized record from a `messages.get` (format=full) payload.
fn record_from_json(message: &Value, own_address: &str) -> Option<EmailRecord> {
    let id = message.get("id")?.as_str()?.to_string();
    let thread_id = message
        .get("threadId")
        .and_then(Value::as_str)
        .unwrap_or(&id)
        .to_string();

    let payload = message.get("payload")?;
    let headers = payload.get("headers").and_then(Value::as_array);
    let header = |name: &str| headers.and_then(|h| header_value(h, name));

    Some(EmailRecord {
        id,
        thread_id,
        sender: header("From").unwrap_or_default(),
        recipient: own_address.to_string(),
        subject: header("Subject").unwrap_or_default(),
        body: extract_body(payload),
        date: header("Date").unwrap_or_default(),
        list_id: header("List-Id"),
        message_id: header("Message-ID"),
    })
}

/// Case-insensitive header lookup in a Gmail headers array.
fn header_value(headers: &[Value], name: &str) -> Option<String> {
    headers.iter().find_map(|h| {
        let hname = h.get("name")?.as_str()?;
        if hname.eq_ignore_ascii_case(name) {
            Some(h.get("value")?.as_str()?.to_string())
        } else {
            None
        }
    })
}

/// Best-effort plain-text body: first text/plain part, else the top-level
/// body, else empty string.
fn extract_body(payload: &Value) -> String {
    if let Some(parts) = payload.get("parts").and_then(Value::as_array) {
        for part in parts {
            if part.get("mimeType").and_then(Value::as_str) == Some("text/plain")
                && let Some(data) = part
                    .get("body")
                    .and_then(|b| b.get("data"))
                    .and_then(Value::as_str)
                && let Some(text) = decode_body(data)
            {
                return text;
            }
        }
    }
    payload
        .get("body")
        .and_then(|b| b.get("data"))
        .and_then(Value::as_str)
        .and_then(decode_body)
        .unwrap_or_default()
}

/// Decode a base64url body segment, tolerating present or absent padding.
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(text: &str) -> String {
        URL_SAFE.encode(text.as_bytes())
    }

    #[test]
    fn decode_body_roundtrip() {
        assert_eq!(
            decode_body(&encoded("When is the report due?")).as_deref(),
            Some("When is the report due?")
        );
    }

    #[test]
    fn decode_body_without_padding() {
        let unpadded = URL_SAFE_NO_PAD.encode("hello".as_bytes());
        assert_eq!(decode_body(&unpadded).as_deref(), Some("hello"));
    }

    #[test]
    fn decode_body_invalid_is_none() {
        assert_eq!(decode_body("!!not base64!!"), None);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = vec![
            json!({"name": "FROM", "value": "alice@example.com"}),
            json!({"name": "Subject", "value": "Hi"}),
        ];
        assert_eq!(
            header_value(&headers, "From").as_deref(),
            Some("alice@example.com")
        );
        assert_eq!(header_value(&headers, "subject").as_deref(), Some("Hi"));
        assert_eq!(header_value(&headers, "List-Id"), None);
    }

    #[test]
    fn record_from_full_message() {
        let message = json!({
            "id": "18f0a",
            "threadId": "18f0a-thread",
            "payload": {
                "headers": [
                    {"name": "From", "value": "Boss <boss@co.com>"},
                    {"name": "Subject", "value": "Question"},
                    {"name": "Date", "value": "Mon, 3 Mar 2025 10:00:00 +0000"},
                    {"name": "Message-ID", "value": "<orig-abc@mail.gmail.com>"}
                ],
                "parts": [
                    {
                        "mimeType": "text/plain",
                        "body": {"data": encoded("When is the report due?")}
                    }
                ]
            }
        });
        let record = record_from_json(&message, "assistant@co.com").unwrap();
        assert_eq!(record.id, "18f0a");
        assert_eq!(record.thread_id, "18f0a-thread");
        assert_eq!(record.sender, "Boss <boss@co.com>");
        assert_eq!(record.recipient, "assistant@co.com");
        assert_eq!(record.body, "When is the report due?");
        assert_eq!(record.list_id, None);
        assert_eq!(
            record.message_id.as_deref(),
            Some("<orig-abc@mail.gmail.com>")
        );
    }

    #[test]
    fn record_falls_back_to_top_level_body() {
        let message = json!({
            "id": "x1",
            "threadId": "x1",
            "payload": {
                "headers": [{"name": "From", "value": "a@b.com"}],
                "body": {"data": encoded("plain body")}
            }
        });
        let record = record_from_json(&message, "me@co.com").unwrap();
        assert_eq!(record.body, "plain body");
    }

    #[test]
    fn record_missing_body_is_empty() {
        let message = json!({
            "id": "x2",
            "threadId": "x2",
            "payload": {
                "headers": [{"name": "From", "value": "a@b.com"}]
            }
        });
        let record = record_from_json(&message, "me@co.com").unwrap();
        assert_eq!(record.body, "");
    }

    #[test]
    fn record_captures_list_id() {
        let message = json!({
            "id": "x3",
            "threadId": "x3",
            "payload": {
                "headers": [
                    {"name": "From", "value": "news@co.com"},
                    {"name": "List-Id", "value": "<digest.co.com>"}
                ]
            }
        });
        let record = record_from_json(&message, "me@co.com").unwrap();
        assert_eq!(record.list_id.as_deref(), Some("<digest.co.com>"));
    }

    fn reply_target(message_id: Option<&str>) -> EmailRecord {
        EmailRecord {
            id: "1".into(),
            thread_id: "t1".into(),
            sender: "Boss <boss@co.com>".into(),
            recipient: "assistant@co.com".into(),
            subject: "Question".into(),
            body: "".into(),
            date: "".into(),
            list_id: None,
            message_id: message_id.map(String::from),
        }
    }

    #[test]
    fn raw_reply_is_base64url() {
        let email = reply_target(None);
        let raw = build_raw_reply("assistant@co.com", &email, "Thursday EOD").unwrap();
        let decoded = URL_SAFE.decode(raw).unwrap();
        let text = String::from_utf8_lossy(&decoded);
        assert!(text.contains("Subject: Re: Question"));
        assert!(text.contains("Thursday EOD"));
        assert!(!text.contains("In-Reply-To:"));
    }

    #[test]
    fn raw_reply_threads_to_original_message_id() {
        let email = reply_target(Some("<orig-abc@mail.gmail.com>"));
        let raw = build_raw_reply("assistant@co.com", &email, "Thursday EOD").unwrap();
        let decoded = URL_SAFE.decode(raw).unwrap();
        let text = String::from_utf8_lossy(&decoded);
        assert!(text.contains("In-Reply-To: <orig-abc@mail.gmail.com>"));
        assert!(text.contains("References: <orig-abc@mail.gmail.com>"));
    }
}
