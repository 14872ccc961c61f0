//! Mailbox provider gateways.
//!
//! Each variant implements [`MailboxGateway`]; the orchestrator never
//! sees a concrete provider. Selection happens here from configuration.

pub mod gmail;
pub mod imap;

use std::sync::Arc;

pub use gmail::GmailMailbox;
pub use imap::ImapMailbox;

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use crate::pipeline::types::MailboxGateway;

/// Build the configured mailbox gateway, connecting where the provider
/// holds a session. A connection failure here is fatal to startup.
pub async fn create_mailbox(
    config: MailboxConfig,
    own_address: &str,
) -> Result<Arc<dyn MailboxGateway>, MailboxError> {
    match config {
        MailboxConfig::Imap(imap) => {
            let mailbox = ImapMailbox::connect(imap, own_address.to_string()).await?;
            Ok(Arc::new(mailbox))
        }
        MailboxConfig::Gmail(gmail) => {
            Ok(Arc::new(GmailMailbox::new(gmail, own_address.to_string())))
        }
    }
}

/// Reply subject for an outbound response: prefix `Re: ` unless the
/// original subject already carries one.
pub(crate) fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.to_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

/// Message-ID value for In-Reply-To/References headers. mail-parser
/// strips the angle brackets; raw Gmail headers keep them.
pub(crate) fn message_id_header(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        trimmed.to_string()
    } else {
        format!("<{trimmed}>")
    }
}
