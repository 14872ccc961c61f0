//! The reply pipeline — eligibility policy, idempotence tracking, and the
//! cycle orchestrator that ties fetch → draft → send → log together.

pub mod eligibility;
pub mod orchestrator;
pub mod processed;
pub mod types;

pub use eligibility::{EligibilityFilter, RejectReason};
pub use orchestrator::CycleOrchestrator;
pub use processed::ProcessedSet;
pub use types::{
    CycleResult, CycleStage, EmailRecord, InteractionLog, InteractionLogEntry, MailboxGateway,
    ReplyGenerator,
};
