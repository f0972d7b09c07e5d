//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{Broadcast, Chat, ChatId, DomainError, Identity, TransportError};
use chrono::{DateTime, Utc};

/// Message transport. The sole channel through which content leaves the system.
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publish `content` to one chat. Errors carry the retry classification.
    async fn send(&self, chat_id: ChatId, content: &str) -> Result<(), TransportError>;
}

/// Chat directory. Read-only list of destinations visible to an identity.
#[async_trait::async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn list_chats(&self, identity: &Identity) -> Result<Vec<Chat>, DomainError>;

    /// Drop any cached listing so the next call hits the source. No-op by default.
    async fn invalidate(&self) {}
}

/// Authenticated-identity collaborator. Treats the token as a capability.
#[async_trait::async_trait]
pub trait AuthPort: Send + Sync {
    /// Ok when `identity` may issue mutating commands; `DomainError::Unauthorized` otherwise.
    async fn authorize(&self, identity: &Identity) -> Result<(), DomainError>;
}

/// Snapshot port. Persist the full broadcast set after each store mutation.
#[async_trait::async_trait]
pub trait SnapshotPort: Send + Sync {
    /// Load the last saved snapshot. Returns an empty list when none exists.
    async fn load(&self) -> Result<Vec<Broadcast>, DomainError>;

    async fn save(&self, broadcasts: &[Broadcast]) -> Result<(), DomainError>;
}

/// Time source. Injected so validation and scheduling can be driven from tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
