//! JSON-lines interaction log — one serialized entry per line.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::LogError;
use crate::pipeline::types::{InteractionLog, InteractionLogEntry};

/// Append-only JSONL sink.
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    /// Ensure the file (and its parent directory) exists at `path`.
    pub async fn create(path: &str) -> Result<Self, LogError> {
        let path_buf = PathBuf::from(path);
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
        if !path_buf.exists() {
            tokio::fs::write(&path_buf, b"")
                .await
                .map_err(|e| LogError::CreateFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
            info!(path = %path, "Created JSONL interaction log");
        }
        Ok(Self { path: path_buf })
    }
}

#[async_trait]
impl InteractionLog for JsonlLog {
    async fn record(&self, entry: &InteractionLogEntry) -> Result<(), LogError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LogError::AppendFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        file.write_all(line.as_bytes())
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

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn make_entry(subject: &str) -> InteractionLogEntry {
        InteractionLogEntry {
            timestamp: Utc::now(),
            sender: "boss@co.com".into(),
            recipient: "assistant@co.com".into(),
            subject: subject.into(),
            body_snippet: "body".into(),
            reply_snippet: "reply".into(),
            summary: "summary".into(),
        }
    }

    #[tokio::test]
    async fn appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = JsonlLog::create(path.to_str().unwrap()).await.unwrap();

        log.record(&make_entry("first")).await.unwrap();
        log.record(&make_entry("second")).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: InteractionLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.subject, "first");
        let second: InteractionLogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.subject, "second");
    }

    #[tokio::test]
    async fn creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/log.jsonl");
        let log = JsonlLog::create(path.to_str().unwrap()).await.unwrap();
        log.record(&make_entry("x")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reopening_preserves_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let path_str = path.to_str().unwrap();

        let log = JsonlLog::create(path_str).await.unwrap();
        log.record(&make_entry("kept")).await.unwrap();

        let log = JsonlLog::create(path_str).await.unwrap();
        log.record(&make_entry("appended")).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("kept"));
    }
}
