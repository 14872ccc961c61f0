//! Interaction log sinks — durable, append-only records of every
//! reply the agent sends.

pub mod csv;
pub mod jsonl;

use std::sync::Arc;

pub use csv::CsvLog;
pub use jsonl::JsonlLog;

use crate::config::LogConfig;
use crate::error::LogError;
use crate::pipeline::types::InteractionLog;

/// Build the configured log sink, creating the file (and CSV header)
/// when it does not exist yet.
pub async fn create_log(config: &LogConfig) -> Result<Arc<dyn InteractionLog>, LogError> {
    match config {
        LogConfig::Csv { path } => Ok(Arc::new(CsvLog::create(path).await?)),
        LogConfig::Jsonl { path } => Ok(Arc::new(JsonlLog::create(path).await?)),
    }
}
