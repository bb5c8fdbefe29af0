//! Append-only conversation journal.

use super::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal row. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub user_id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: String,
}

#[async_trait]
pub trait MessageJournal: Send + Sync {
    async fn append(&self, entry: &JournalEntry) -> Result<(), StoreError>;
}

/// In-process journal, optionally failing every append.
#[derive(Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
    failing: bool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A journal whose appends always fail with `StoreError::Unavailable`.
    pub fn failing() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessageJournal for MemoryJournal {
    async fn append(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Unavailable("journal offline".to_string()));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}
