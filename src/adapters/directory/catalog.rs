//! Chat catalog adapters. Implement ChatDirectory from a fixed list or a JSON file.
//!
//! The catalog file is an array of chats:
//! `[{"id": 1, "name": "Tech News Channel", "type": "channel", "member_count": 1234, "can_post": true, "is_admin": true}]`

use crate::domain::{Chat, DomainError, Identity};
use crate::ports::ChatDirectory;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixed in-memory chat list. Same answer for every identity.
pub struct StaticChatDirectory {
    chats: Vec<Chat>,
}

impl StaticChatDirectory {
    pub fn new(chats: Vec<Chat>) -> Self {
        Self { chats }
    }
}

#[async_trait]
impl ChatDirectory for StaticChatDirectory {
    async fn list_chats(&self, _identity: &Identity) -> Result<Vec<Chat>, DomainError> {
        Ok(self.chats.clone())
    }
}

/// Reads the chat list from a JSON catalog on every call. Wrap in `CachedChatDirectory`.
pub struct JsonChatDirectory {
    path: PathBuf,
}

impl JsonChatDirectory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ChatDirectory for JsonChatDirectory {
    async fn list_chats(&self, _identity: &Identity) -> Result<Vec<Chat>, DomainError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DomainError::Directory(format!("read {}: {}", self.path.display(), e))
        })?;
        let chats: Vec<Chat> = serde_json::from_str(&raw).map_err(|e| {
            DomainError::Directory(format!("parse {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), count = chats.len(), "chat catalog read");
        Ok(chats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatKind;

    #[tokio::test]
    async fn test_json_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.json");
        tokio::fs::write(
            &path,
            r#"[
                {"id": 1, "name": "Tech News Channel", "type": "channel", "description": "Latest tech news", "member_count": 1234, "can_post": true, "is_admin": true},
                {"id": 3, "name": "Product Updates", "type": "channel", "member_count": 890, "can_post": false, "is_admin": false},
                {"id": 2, "name": "Marketing Team", "type": "group", "member_count": 45, "can_post": true, "is_admin": true}
            ]"#,
        )
        .await
        .unwrap();

        let chats = JsonChatDirectory::new(&path)
            .list_chats(&Identity::new("t"))
            .await
            .unwrap();
        assert_eq!(chats.len(), 3);
        assert_eq!(chats[2].kind, ChatKind::Group);
        assert!(!chats[1].can_post);
    }

    #[tokio::test]
    async fn test_missing_catalog_is_directory_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonChatDirectory::new(dir.path().join("missing.json"))
            .list_chats(&Identity::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Directory(_)));
    }
}
