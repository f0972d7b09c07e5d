//! TTL cache in front of any ChatDirectory.
//!
//! Cache chat listings per identity so dispatches and dashboard reads don't hit the source each time.

use crate::domain::{Chat, DomainError, Identity};
use crate::ports::ChatDirectory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub struct CachedChatDirectory {
    inner: Arc<dyn ChatDirectory>,
    ttl: Duration,
    cache: Mutex<HashMap<Identity, (Instant, Vec<Chat>)>>,
}

impl CachedChatDirectory {
    pub fn new(inner: Arc<dyn ChatDirectory>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChatDirectory for CachedChatDirectory {
    async fn list_chats(&self, identity: &Identity) -> Result<Vec<Chat>, DomainError> {
        {
            let cache = self.cache.lock().await;
            if let Some((fetched_at, chats)) = cache.get(identity) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(chats.clone());
                }
            }
        }
        let chats = self.inner.list_chats(identity).await?;
        debug!(count = chats.len(), "chat directory refreshed");
        self.cache
            .lock()
            .await
            .insert(identity.clone(), (Instant::now(), chats.clone()));
        Ok(chats)
    }

    async fn invalidate(&self) {
        self.cache.lock().await.clear();
        self.inner.invalidate().await;
    }
}
