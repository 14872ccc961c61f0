//! Top-level run loop: drives the orchestrator on a fixed interval
//! until Ctrl-C, or runs a single cycle and exits.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::pipeline::orchestrator::CycleOrchestrator;
use crate::pipeline::types::{CycleResult, MailboxGateway};

/// Owns the orchestrator and the mailbox handle for shutdown.
pub struct Agent {
    orchestrator: CycleOrchestrator,
    mailbox: Arc<dyn MailboxGateway>,
    interval: Duration,
}

impl Agent {
    pub fn new(
        orchestrator: CycleOrchestrator,
        mailbox: Arc<dyn MailboxGateway>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            mailbox,
            interval,
        }
    }

    /// Run one cycle, then disconnect.
    pub async fn run_once(mut self) {
        let result = self.orchestrator.run_cycle().await;
        report(&result);
        self.mailbox.disconnect().await;
    }

    /// Poll on the configured interval until Ctrl-C.
    ///
    /// The first cycle runs immediately; the mailbox is disconnected on
    /// the way out.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            mailbox = self.mailbox.name(),
            "Agent started"
        );

        loop {
            let result = self.orchestrator.run_cycle().await;
            report(&result);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(
            processed = self.orchestrator.processed_count(),
            "Agent stopping"
        );
        self.mailbox.disconnect().await;
    }
}

fn report(result: &CycleResult) {
    match result {
        CycleResult::Processed { logged: true } => {
            info!(outcome = result.label(), "Cycle complete");
        }
        CycleResult::Processed { logged: false } => {
            warn!(
                outcome = result.label(),
                "Cycle complete but interaction was not logged"
            );
        }
        CycleResult::NoWork => {
            info!(outcome = result.label(), "Cycle complete, nothing to do");
        }
        CycleResult::Filtered(reason) => {
            info!(outcome = result.label(), reason = %reason, "Cycle complete");
        }
        CycleResult::Failed { stage, cause } => {
            error!(outcome = result.label(), stage = %stage, cause = %cause, "Cycle failed");
        }
    }
}
