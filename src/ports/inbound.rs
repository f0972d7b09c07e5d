//! Inbound port. The presentation layer calls into the application.

use crate::domain::{
    Broadcast, BroadcastId, BroadcastSpec, BroadcastStatus, Chat, ChatId, ChatQuery, DomainError,
    Identity, Outcome, Overview, ScheduledEntry,
};

/// Dashboard port: commands and read views over the broadcast engine.
///
/// Mutating commands require an authorized `Identity`; reads of broadcast
/// records do not. Returned records are snapshots, never live references.
#[async_trait::async_trait]
pub trait DashboardPort: Send + Sync {
    /// Create a broadcast. Immediate broadcasts are dispatched before returning.
    async fn create(&self, identity: &Identity, spec: BroadcastSpec)
    -> Result<Broadcast, DomainError>;

    /// Dispatch now, outside the schedule. Also retries a failed one-off broadcast.
    async fn send_now(&self, identity: &Identity, id: BroadcastId) -> Result<Outcome, DomainError>;

    async fn pause(&self, identity: &Identity, id: BroadcastId) -> Result<Broadcast, DomainError>;

    async fn resume(&self, identity: &Identity, id: BroadcastId) -> Result<Broadcast, DomainError>;

    async fn delete(&self, identity: &Identity, id: BroadcastId) -> Result<(), DomainError>;

    async fn add_target(
        &self,
        identity: &Identity,
        id: BroadcastId,
        chat_id: ChatId,
    ) -> Result<Broadcast, DomainError>;

    async fn remove_target(
        &self,
        identity: &Identity,
        id: BroadcastId,
        chat_id: ChatId,
    ) -> Result<Broadcast, DomainError>;

    async fn get(&self, id: BroadcastId) -> Result<Broadcast, DomainError>;

    /// History view: newest first, optional free-text query and status filter.
    async fn history(
        &self,
        query: Option<&str>,
        statuses: &[BroadcastStatus],
    ) -> Result<Vec<Broadcast>, DomainError>;

    /// Activity feed: the `limit` most recently dispatched broadcasts, latest run first.
    async fn recent_activity(&self, limit: usize) -> Result<Vec<Broadcast>, DomainError>;

    /// Scheduled view: active and paused scheduled broadcasts, earliest next run first.
    async fn scheduled(&self) -> Result<Vec<ScheduledEntry>, DomainError>;

    async fn overview(&self, identity: &Identity) -> Result<Overview, DomainError>;

    async fn chats(&self, identity: &Identity, query: &ChatQuery) -> Result<Vec<Chat>, DomainError>;

    /// Re-read the chat directory on the next `chats` call.
    async fn refresh_chats(&self, identity: &Identity) -> Result<(), DomainError>;

    /// Sum of member counts over `targets` (unknown chats count as zero).
    async fn estimate_recipients(
        &self,
        identity: &Identity,
        targets: &[ChatId],
    ) -> Result<u64, DomainError>;
}
