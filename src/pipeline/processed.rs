//! Idempotence guard — the set of message ids this process has handled.
//!
//! Prevents duplicate replies and reply loops, and memoizes filter
//! rejections so an unread-but-rejected email is not re-examined every
//! cycle. In-memory only: empty at process start, grows monotonically,
//! discarded at exit. The provider's read/unread state is the durable
//! signal across restarts.

use std::collections::HashSet;

/// Set of message ids already handled in this process lifetime.
///
/// Owned exclusively by the cycle orchestrator; never shared.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    ids: HashSet<String>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Has this id already been handled (replied to or filtered out)?
    pub fn is_processed(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record an id as handled.
    pub fn mark_processed(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    /// Number of ids tracked so far.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
