//! CSV interaction log — one row per sent reply.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::LogError;
use crate::pipeline::types::{InteractionLog, InteractionLogEntry};

const HEADERS: [&str; 7] = [
    "Timestamp",
    "Sender",
    "Recipient",
    "Subject",
    "Original Email Snippet",
    "Generated Reply Snippet",
    "Full Summary of Interaction",
];

/// Append-only CSV sink. The header row is written once, when the file
/// is first created.
pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    /// Open (or create with headers) the CSV file at `path`.
    pub async fn create(path: &str) -> Result<Self, LogError> {
        let path_buf = PathBuf::from(path);
        if !path_buf.exists() {
            if let Some(parent) = path_buf.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| LogError::CreateFailed {
                        path: path.to_string(),
                        reason: e.to_string(),
                    })?;
            }
            let header_row = format!("{}\n", HEADERS.join(","));
            tokio::fs::write(&path_buf, header_row)
                .await
                .map_err(|e| LogError::CreateFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
            info!(path = %path, "Created CSV interaction log");
        }
        Ok(Self { path: path_buf })
    }
}

#[async_trait]
impl InteractionLog for CsvLog {
    async fn record(&self, entry: &InteractionLogEntry) -> Result<(), LogError> {
        let row = format_row(entry);
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LogError::AppendFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        file.write_all(row.as_bytes())
            .await
            .map_err(|e| LogError::AppendFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        file.flush().await.map_err(|e| LogError::AppendFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn format_row(entry: &InteractionLogEntry) -> String {
    let fields = [
        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        entry.sender.clone(),
        entry.recipient.clone(),
        entry.subject.clone(),
        entry.body_snippet.clone(),
        entry.reply_snippet.clone(),
        entry.summary.clone(),
    ];
    let mut row = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

/// Quote a field when it contains a delimiter, quote, or newline;
/// embedded quotes are doubled per RFC 4180.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
