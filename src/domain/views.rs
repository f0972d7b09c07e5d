//! Read-side query and view types handed to the presentation layer.

use crate::domain::entities::{Broadcast, BroadcastStatus, Chat, ChatKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort order for `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    /// Newest first (history view).
    #[default]
    CreatedDesc,
    /// Earliest next run first, ties by id (scheduled view). Records without a next run sort last.
    NextRunAsc,
    /// Most recently dispatched first; never-dispatched records sort last (activity feed).
    LastRunDesc,
}

/// Composable broadcast filter. Empty `statuses` means any status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub statuses: Vec<BroadcastStatus>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub order: ListOrder,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: BroadcastStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn ordered(mut self, order: ListOrder) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, b: &Broadcast) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&b.status);
        let query_ok = self.query.as_deref().is_none_or(|q| b.matches_query(q));
        status_ok && query_ok
    }

    pub fn compare(&self, a: &Broadcast, b: &Broadcast) -> Ordering {
        match self.order {
            ListOrder::CreatedDesc => b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)),
            ListOrder::NextRunAsc => cmp_option_last(a.next_run_at, b.next_run_at, false)
                .then(a.id.cmp(&b.id)),
            ListOrder::LastRunDesc => cmp_option_last(a.last_run_at, b.last_run_at, true)
                .then(a.id.cmp(&b.id)),
        }
    }
}

/// Orders `Some` before `None`; `desc` flips the order among `Some` values.
fn cmp_option_last(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    desc: bool,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if desc => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Entry of the scheduled view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledEntry {
    pub broadcast: Broadcast,
    /// Active and its next run has already passed.
    pub overdue: bool,
}

/// Numbers shown on the dashboard overview.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    /// Chats the identity may post to.
    pub postable_chats: usize,
    /// Runs that finished since UTC midnight.
    pub runs_today: usize,
    /// Recipients delivered by runs that finished since UTC midnight.
    pub delivered_today: u64,
    pub active_scheduled: usize,
    pub paused_scheduled: usize,
    /// Scheduled broadcasts (active or paused) whose next run falls on the current UTC day.
    pub due_today: usize,
    /// Delivered share over every recorded run, in percent.
    pub success_rate: f64,
}

/// Chat list search: name/description substring and optional kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub kind: Option<ChatKind>,
}

impl ChatQuery {
    pub fn matches(&self, chat: &Chat) -> bool {
        if self.kind.is_some_and(|k| k != chat.kind) {
            return false;
        }
        let Some(q) = self.search.as_deref().map(|s| s.trim().to_lowercase()) else {
            return true;
        };
        q.is_empty()
            || chat.name.to_lowercase().contains(&q)
            || chat
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(&q))
    }
}
