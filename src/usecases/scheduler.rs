//! Scheduler use case: recurrence arithmetic and due-broadcast selection.
//!
//! Read-only over the store; never changes a broadcast's state.

use crate::domain::{
    Broadcast, BroadcastStatus, ListFilter, ListOrder, Recurrence, compute_next_run,
};
use crate::usecases::broadcast_store::BroadcastStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Scheduler {
    store: Arc<BroadcastStore>,
}

impl Scheduler {
    pub fn new(store: Arc<BroadcastStore>) -> Self {
        Self { store }
    }

    /// See [`crate::domain::compute_next_run`].
    pub fn compute_next_run(
        previous: DateTime<Utc>,
        recurrence: Recurrence,
    ) -> Option<DateTime<Utc>> {
        compute_next_run(previous, recurrence)
    }

    /// Active broadcasts whose next run is at or before `now`, earliest first, ties by id.
    ///
    /// Overdue broadcasts stay in this set until they are dispatched.
    pub async fn due_broadcasts(&self, now: DateTime<Utc>) -> Vec<Broadcast> {
        let filter = ListFilter::new()
            .with_status(BroadcastStatus::Active)
            .ordered(ListOrder::NextRunAsc);
        self.store
            .list(&filter)
            .await
            .into_iter()
            .filter(|b| b.next_run_at.is_some_and(|t| t <= now))
            .collect()
    }
}

/// Active with a next run already in the past. Presentation labels these distinctly.
pub fn is_overdue(broadcast: &Broadcast, now: DateTime<Utc>) -> bool {
    broadcast.status == BroadcastStatus::Active && broadcast.next_run_at.is_some_and(|t| t < now)
}
