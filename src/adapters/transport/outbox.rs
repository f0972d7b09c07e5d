//! Implements MessageTransport as a local outbox: one JSONL file per chat.
//!
//! Each delivery appends `{"chat_id":..,"sent_at":..,"content":..}` to `{base_dir}/{chat_id}.jsonl`.
//! Chats listed as blocked fail permanently, mirroring a revoked posting right.

use crate::domain::{ChatId, TransportError};
use crate::ports::MessageTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub chat_id: ChatId,
    pub sent_at: DateTime<Utc>,
    pub content: String,
}

pub struct OutboxTransport {
    base_dir: PathBuf,
    blocked: HashSet<ChatId>,
}

impl OutboxTransport {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            blocked: HashSet::new(),
        }
    }

    pub fn with_blocked(mut self, chat_ids: impl IntoIterator<Item = ChatId>) -> Self {
        self.blocked.extend(chat_ids);
        self
    }

    fn chat_path(&self, chat_id: ChatId) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", chat_id))
    }
}

#[async_trait]
impl MessageTransport for OutboxTransport {
    async fn send(&self, chat_id: ChatId, content: &str) -> Result<(), TransportError> {
        if self.blocked.contains(&chat_id) {
            return Err(TransportError::Permanent(format!(
                "chat {} is blocked",
                chat_id
            )));
        }
        let entry = OutboxEntry {
            chat_id,
            sent_at: Utc::now(),
            content: content.to_string(),
        };
        let mut line =
            serde_json::to_string(&entry).map_err(|e| TransportError::Permanent(e.to_string()))?;
        line.push('\n');

        // I/O errors (full disk, locked file) may clear up: report them as transient.
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| TransportError::Transient(format!("create outbox dir: {}", e)))?;
        let path = self.chat_path(chat_id);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| TransportError::Transient(format!("open outbox: {}", e)))?;
        f.write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Transient(format!("write outbox: {}", e)))?;
        f.flush()
            .await
            .map_err(|e| TransportError::Transient(format!("flush outbox: {}", e)))?;
        debug!(chat_id, path = %path.display(), "outbox entry written");
        Ok(())
    }
}
