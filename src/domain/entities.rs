//! Domain entities. Pure data structures for the core business.
//!
//! No transport/IO types here; adapters map into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identifier of an external chat (channel or group).
pub type ChatId = i64;

/// Identifier of a broadcast record.
pub type BroadcastId = Uuid;

/// Maximum number of per-run records kept on a broadcast.
pub const MAX_RUN_HISTORY: usize = 50;

/// A Telegram destination (channel or group) as seen by the authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(default)]
    pub description: Option<String>,
    pub member_count: u64,
    /// Whether the authenticated identity may publish to this chat.
    pub can_post: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Channel,
    Group,
}

/// How a broadcast is released: right away, or at `scheduled_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Immediate,
    Scheduled,
}

/// Repetition rule of a scheduled broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn is_recurring(self) -> bool {
        !matches!(self, Recurrence::Once)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    Draft,
    Active,
    Paused,
    Sending,
    Completed,
    Failed,
}

impl BroadcastStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BroadcastStatus::Draft => "draft",
            BroadcastStatus::Active => "active",
            BroadcastStatus::Paused => "paused",
            BroadcastStatus::Sending => "sending",
            BroadcastStatus::Completed => "completed",
            BroadcastStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate delivery counters. Member-weighted: a chat contributes its member count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub recipients_count: u64,
    pub delivered_count: u64,
    pub failed_count: u64,
}

impl DeliveryStats {
    /// `delivered + failed <= recipients`.
    pub fn is_consistent(&self) -> bool {
        self.delivered_count
            .checked_add(self.failed_count)
            .is_some_and(|sum| sum <= self.recipients_count)
    }

    /// Delivered share of recipients in percent (0.0 when there were no recipients).
    pub fn success_rate(&self) -> f64 {
        if self.recipients_count == 0 {
            return 0.0;
        }
        self.delivered_count as f64 / self.recipients_count as f64 * 100.0
    }
}

/// Why a single chat did not receive the broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFailure {
    pub chat_id: ChatId,
    pub reason: String,
}

/// Result of one dispatch attempt, produced by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub stats: DeliveryStats,
    pub chats_delivered: usize,
    pub chats_failed: usize,
    pub failures: Vec<ChatFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Outcome {
    /// A run succeeds when at least one recipient got the content.
    pub fn run_status(&self) -> RunStatus {
        if self.stats.delivered_count > 0 {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// One entry of a broadcast's run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: DeliveryStats,
    pub chats_delivered: usize,
    pub chats_failed: usize,
    pub status: RunStatus,
    #[serde(default)]
    pub failures: Vec<ChatFailure>,
}

impl From<&Outcome> for RunRecord {
    fn from(o: &Outcome) -> Self {
        Self {
            started_at: o.started_at,
            finished_at: o.finished_at,
            stats: o.stats,
            chats_delivered: o.chats_delivered,
            chats_failed: o.chats_failed,
            status: o.run_status(),
            failures: o.failures.clone(),
        }
    }
}

/// Request to create a broadcast. Validated by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSpec {
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    pub target_chat_ids: BTreeSet<ChatId>,
    pub mode: DeliveryMode,
    #[serde(default = "default_recurrence")]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

fn default_recurrence() -> Recurrence {
    Recurrence::Once
}

impl BroadcastSpec {
    pub fn immediate(body: impl Into<String>, targets: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            title: None,
            body: body.into(),
            target_chat_ids: targets.into_iter().collect(),
            mode: DeliveryMode::Immediate,
            recurrence: Recurrence::Once,
            scheduled_at: None,
        }
    }

    pub fn scheduled(
        body: impl Into<String>,
        targets: impl IntoIterator<Item = ChatId>,
        at: DateTime<Utc>,
        recurrence: Recurrence,
    ) -> Self {
        Self {
            title: None,
            body: body.into(),
            target_chat_ids: targets.into_iter().collect(),
            mode: DeliveryMode::Scheduled,
            recurrence,
            scheduled_at: Some(at),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A unit of outbound content and its delivery plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: BroadcastId,
    pub title: Option<String>,
    pub body: String,
    pub target_chat_ids: BTreeSet<ChatId>,
    pub mode: DeliveryMode,
    pub recurrence: Recurrence,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub status: BroadcastStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// Counters of the latest run; `runs` keeps the per-run history.
    #[serde(default)]
    pub stats: DeliveryStats,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
}

impl Broadcast {
    pub fn is_recurring(&self) -> bool {
        self.mode == DeliveryMode::Scheduled && self.recurrence.is_recurring()
    }

    /// Outbound payload: the title (when set) as a bold heading over the body.
    pub fn content(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => format!("*{}*\n\n{}", t, self.body),
            _ => self.body.clone(),
        }
    }

    /// Case-insensitive substring match over title and body.
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }
        self.body.to_lowercase().contains(&q)
            || self
                .title
                .as_ref()
                .is_some_and(|t| t.to_lowercase().contains(&q))
    }
}

/// Opaque token supplied by the external login flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}
