//! Cycle orchestrator — one fetch → filter → reply → log unit of work.
//!
//! State machine per cycle:
//! `IDLE → FETCHED → FILTERED_OUT | ELIGIBLE → REPLIED → LOGGED → DONE`,
//! with `FAILED` reachable from fetch and send.
//!
//! Key ordering decision: the message id is marked processed immediately
//! after a successful send, before summarizing and logging. A missed log
//! row is recoverable; a duplicate reply is not.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::pipeline::eligibility::EligibilityFilter;
use crate::pipeline::processed::ProcessedSet;
use crate::pipeline::types::{
    CycleResult, CycleStage, InteractionLog, InteractionLogEntry, MailboxGateway, ReplyGenerator,
};

/// Composes the mailbox gateway, reply generator, and interaction log
/// into one sequential processing cycle.
///
/// `run_cycle` takes `&mut self`: there is never more than one cycle in
/// flight, and the processed set is exclusive state.
pub struct CycleOrchestrator {
    mailbox: Arc<dyn MailboxGateway>,
    generator: Arc<dyn ReplyGenerator>,
    log: Arc<dyn InteractionLog>,
    filter: EligibilityFilter,
    processed: ProcessedSet,
}

impl CycleOrchestrator {
    pub fn new(
        mailbox: Arc<dyn MailboxGateway>,
        generator: Arc<dyn ReplyGenerator>,
        log: Arc<dyn InteractionLog>,
        filter: EligibilityFilter,
    ) -> Self {
        Self {
            mailbox,
            generator,
            log,
            filter,
            processed: ProcessedSet::new(),
        }
    }

    /// Run one processing cycle: at most one email, at most one reply.
    ///
    /// All collaborator failures are contained here — this never returns
    /// an error, only a [`CycleResult`].
    pub async fn run_cycle(&mut self) -> CycleResult {
        let email = match self.mailbox.fetch_latest_unread().await {
            Ok(Some(email)) => email,
            Ok(None) => return CycleResult::NoWork,
            Err(e) => {
                error!(error = %e, "Fetch failed");
                return CycleResult::Failed {
                    stage: CycleStage::Fetch,
                    cause: e.to_string(),
                };
            }
        };

        if self.processed.is_processed(&email.id) {
            // Still unread on the provider but already handled (or
            // rejected) this lifetime — nothing to do.
            return CycleResult::NoWork;
        }

        info!(
            id = %email.id,
            sender = %email.sender,
            subject = %email.subject,
            "Processing email"
        );

        if let Some(reason) = self.filter.evaluate(&email) {
            // Memoize the rejection so the same unread email is not
            // re-fetched and re-rejected every cycle.
            self.processed.mark_processed(&email.id);
            info!(id = %email.id, reason = %reason, "Email filtered out");
            return CycleResult::Filtered(reason);
        }

        // The generator never fails past this boundary — on internal
        // failure it returns fallback text.
        let reply = self.generator.draft_reply(&email).await;

        if let Err(e) = self.mailbox.send_reply(&email, &reply).await {
            // Not marked processed: the email stays unread and the send
            // is retried on a later cycle.
            error!(id = %email.id, error = %e, "Send failed, will retry next cycle");
            return CycleResult::Failed {
                stage: CycleStage::Send,
                cause: e.to_string(),
            };
        }

        // The reply is out. Mark processed before anything else can fail
        // so a reply loop is impossible from here on.
        self.processed.mark_processed(&email.id);
        info!(id = %email.id, recipient = %email.sender, "Reply sent");

        if let Err(e) = self.mailbox.mark_read(&email).await {
            warn!(id = %email.id, error = %e, "Failed to mark email read");
        }

        let summary = self.generator.draft_summary(&email, &reply).await;
        let entry = InteractionLogEntry::new(&email, &reply, &summary);

        let logged = match self.log.record(&entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %email.id, error = %e, "Failed to record interaction");
                false
            }
        };

        CycleResult::Processed { logged }
    }

    /// Number of ids handled this process lifetime.
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }
}
