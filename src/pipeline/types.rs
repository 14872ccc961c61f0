//! Shared types for the reply pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LogError, MailboxError};

/// Maximum snippet length for logged body/reply excerpts.
const SNIPPET_MAX_CHARS: usize = 200;

// ── Email record ────────────────────────────────────────────────────

/// Normalized inbound email from any mailbox provider.
///
/// Immutable once constructed. `id` is provider-scoped, stable for the
/// lifetime of the message, and the sole key for idempotence tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Provider-scoped unique identifier.
    pub id: String,
    /// Conversation identifier; equals `id` when the provider has no
    /// threading concept.
    pub thread_id: String,
    /// Sender address.
    pub sender: String,
    /// Recipient address (our own mailbox).
    pub recipient: String,
    /// Subject line ("" when absent).
    pub subject: String,
    /// Best-effort plain-text body ("" when no readable part exists).
    pub body: String,
    /// Provider-supplied timestamp string, not parsed.
    pub date: String,
    /// List-Id header value; presence indicates mailing-list traffic.
    pub list_id: Option<String>,
    /// RFC 5322 Message-ID of the original, used for the reply's
    /// In-Reply-To/References headers when present.
    pub message_id: Option<String>,
}

// ── Interaction log entry ───────────────────────────────────────────

/// Write-once record of one completed interaction.
///
/// Constructed only after a successful send; appended to the interaction
/// log and never read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLogEntry {
    /// When the cycle completed the send.
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    /// First 200 characters of the original body.
    pub body_snippet: String,
    /// First 200 characters of the generated reply.
    pub reply_snippet: String,
    /// Full generated summary of the interaction.
    pub summary: String,
}

impl InteractionLogEntry {
    /// Build an entry from the email, the reply that was sent, and the
    /// generated summary, stamped with the current time.
    pub fn new(email: &EmailRecord, reply: &str, summary: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            sender: email.sender.clone(),
            recipient: email.recipient.clone(),
            subject: email.subject.clone(),
            body_snippet: snippet(&email.body),
            reply_snippet: snippet(reply),
            summary: summary.to_string(),
        }
    }
}

/// Truncate text to a loggable excerpt, appending "..." when cut.
fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
        format!("{cut}...")
    }
}

// ── Cycle result ────────────────────────────────────────────────────

/// Pipeline stage at which a cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Fetch,
    Send,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Send => write!(f, "send"),
        }
    }
}

/// Outcome of one processing cycle.
#[derive(Debug, Clone)]
pub enum CycleResult {
    /// A reply was sent. `logged` is false when the interaction log sink
    /// rejected the entry — the reply still went out, which is the
    /// primary success criterion.
    Processed { logged: bool },
    /// No unread email, or the top unread email was already handled.
    NoWork,
    /// The email was rejected by the eligibility filter and memoized so
    /// it is not re-examined while it stays unread.
    Filtered(crate::pipeline::eligibility::RejectReason),
    /// A collaborator failed before the send completed. The email stays
    /// unprocessed and is retried on a later cycle.
    Failed { stage: CycleStage, cause: String },
}

impl CycleResult {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "processed",
            Self::NoWork => "no_work",
            Self::Filtered(_) => "filtered",
            Self::Failed { .. } => "failed",
        }
    }
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Mailbox provider gateway — pure I/O, no policy.
///
/// Variants (IMAP, Gmail) are selected by configuration at startup; the
/// orchestrator only ever sees this trait.
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Provider name (e.g. "imap", "gmail").
    fn name(&self) -> &str;

    /// Fetch the single most recent unread message, or `None`.
    ///
    /// Must not alter read/unread state — only `mark_read` does that.
    async fn fetch_latest_unread(&self) -> Result<Option<EmailRecord>, MailboxError>;

    /// Send `text` as a reply threaded to `email` where the provider
    /// supports threading, else a plain addressed reply with a
    /// `Re: `-prefixed subject.
    async fn send_reply(&self, email: &EmailRecord, text: &str) -> Result<(), MailboxError>;

    /// Mark the message read. Best-effort: the orchestrator reports but
    /// never fails a cycle on this.
    async fn mark_read(&self, email: &EmailRecord) -> Result<(), MailboxError>;

    /// Release any held connection. Invoked once at shutdown.
    async fn disconnect(&self);
}

/// Drafts replies and summaries.
///
/// Both methods are infallible at this boundary: implementations must
/// substitute fallback text on internal failure rather than propagate it.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Draft a reply to the email.
    async fn draft_reply(&self, email: &EmailRecord) -> String;

    /// Summarize the interaction after the reply was sent.
    async fn draft_summary(&self, email: &EmailRecord, reply: &str) -> String;
}

/// Append-only interaction log sink.
#[async_trait]
pub trait InteractionLog: Send + Sync {
    /// Append one entry. Must not reorder or deduplicate.
    async fn record(&self, entry: &InteractionLogEntry) -> Result<(), LogError>;
}
