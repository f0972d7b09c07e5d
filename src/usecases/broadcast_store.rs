//! Broadcast store: single source of truth for broadcast records.
//!
//! - Enforces the lifecycle state machine (draft/active/paused/sending/completed/failed)
//! - Serializes every mutation behind one write lock, so at most one dispatch per id is in flight
//! - Optionally writes a snapshot after each mutation (SnapshotPort)

use crate::domain::{
    Broadcast, BroadcastId, BroadcastSpec, BroadcastStatus, ChatId, DeliveryMode, DomainError,
    ListFilter, MAX_RUN_HISTORY, Outcome, Recurrence, RunRecord, RunStatus, next_run_after,
};
use crate::ports::{Clock, SnapshotPort};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// In-memory broadcast store.
pub struct BroadcastStore {
    records: RwLock<HashMap<BroadcastId, Broadcast>>,
    clock: Arc<dyn Clock>,
    snapshot: Option<Arc<dyn SnapshotPort>>,
}

impl BroadcastStore {
    /// Empty store without persistence.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
            snapshot: None,
        }
    }

    /// Load records from `snapshot` and persist every later mutation through it.
    ///
    /// Records caught mid-dispatch (a crash while `sending`) are recovered:
    /// recurring ones go back to `active`, one-off ones end as `failed`.
    pub async fn open(
        clock: Arc<dyn Clock>,
        snapshot: Arc<dyn SnapshotPort>,
    ) -> Result<Self, DomainError> {
        let loaded = snapshot.load().await?;
        let mut records = HashMap::with_capacity(loaded.len());
        for mut b in loaded {
            if b.status == BroadcastStatus::Sending {
                let recovered = if b.is_recurring() {
                    BroadcastStatus::Active
                } else {
                    BroadcastStatus::Failed
                };
                warn!(
                    id = %b.id,
                    status = %recovered,
                    "recovered broadcast interrupted mid-dispatch"
                );
                b.status = recovered;
            }
            records.insert(b.id, b);
        }
        info!(count = records.len(), "broadcast store loaded");
        Ok(Self {
            records: RwLock::new(records),
            clock,
            snapshot: Some(snapshot),
        })
    }

    /// Validate `spec` and insert a new record.
    ///
    /// Scheduled broadcasts start `active` with `next_run_at = scheduled_at`; immediate ones start
    /// in `draft` and are handed to the dispatcher by the caller.
    pub async fn create(&self, spec: BroadcastSpec) -> Result<Broadcast, DomainError> {
        let now = self.clock.now();
        if spec.body.trim().is_empty() {
            return Err(DomainError::Validation("message body must not be empty".into()));
        }
        if spec.target_chat_ids.is_empty() {
            return Err(DomainError::Validation(
                "select at least one target chat".into(),
            ));
        }

        let (status, recurrence, scheduled_at, next_run_at) = match spec.mode {
            DeliveryMode::Scheduled => {
                let at = spec.scheduled_at.ok_or_else(|| {
                    DomainError::Validation("scheduled broadcast requires scheduled_at".into())
                })?;
                if at <= now {
                    return Err(DomainError::Validation(format!(
                        "scheduled_at {} is not in the future",
                        at.to_rfc3339()
                    )));
                }
                (BroadcastStatus::Active, spec.recurrence, Some(at), Some(at))
            }
            DeliveryMode::Immediate => (BroadcastStatus::Draft, Recurrence::Once, None, None),
        };

        let broadcast = Broadcast {
            id: Uuid::new_v4(),
            title: spec
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            body: spec.body,
            target_chat_ids: spec.target_chat_ids,
            mode: spec.mode,
            recurrence,
            scheduled_at,
            next_run_at,
            status,
            created_at: now,
            last_run_at: None,
            stats: Default::default(),
            runs: Vec::new(),
        };

        let mut records = self.records.write().await;
        records.insert(broadcast.id, broadcast.clone());
        self.persist(&records).await;
        info!(
            id = %broadcast.id,
            status = %broadcast.status,
            targets = broadcast.target_chat_ids.len(),
            recurrence = ?broadcast.recurrence,
            "broadcast created"
        );
        Ok(broadcast)
    }

    pub async fn get(&self, id: BroadcastId) -> Result<Broadcast, DomainError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DomainError::NotFound(id))
    }

    /// Records matching `filter`, sorted by its order.
    pub async fn list(&self, filter: &ListFilter) -> Vec<Broadcast> {
        let records = self.records.read().await;
        let mut out: Vec<Broadcast> = records
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        out.sort_by(|a, b| filter.compare(a, b));
        out
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn pause(&self, id: BroadcastId) -> Result<Broadcast, DomainError> {
        self.update(id, |b| match b.status {
            BroadcastStatus::Active => {
                b.status = BroadcastStatus::Paused;
                Ok(b.clone())
            }
            BroadcastStatus::Sending => Err(DomainError::Busy(id)),
            from => Err(DomainError::InvalidTransition {
                from,
                action: "pause",
            }),
        })
        .await
    }

    /// Back to `active`; `next_run_at` is left as it was, so a missed run becomes due at once.
    pub async fn resume(&self, id: BroadcastId) -> Result<Broadcast, DomainError> {
        self.update(id, |b| match b.status {
            BroadcastStatus::Paused => {
                b.status = BroadcastStatus::Active;
                Ok(b.clone())
            }
            BroadcastStatus::Sending => Err(DomainError::Busy(id)),
            from => Err(DomainError::InvalidTransition {
                from,
                action: "resume",
            }),
        })
        .await
    }

    pub async fn delete(&self, id: BroadcastId) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        match records.get(&id).map(|b| b.status) {
            None => return Err(DomainError::NotFound(id)),
            Some(BroadcastStatus::Sending) => return Err(DomainError::Busy(id)),
            Some(_) => {
                records.remove(&id);
            }
        }
        self.persist(&records).await;
        info!(%id, "broadcast deleted");
        Ok(())
    }

    pub async fn add_target(
        &self,
        id: BroadcastId,
        chat_id: ChatId,
    ) -> Result<Broadcast, DomainError> {
        self.update(id, |b| {
            ensure_editable(b, "add a target to")?;
            b.target_chat_ids.insert(chat_id);
            Ok(b.clone())
        })
        .await
    }

    /// Removing the last target is only allowed while the broadcast is still a draft.
    pub async fn remove_target(
        &self,
        id: BroadcastId,
        chat_id: ChatId,
    ) -> Result<Broadcast, DomainError> {
        self.update(id, |b| {
            ensure_editable(b, "remove a target from")?;
            let last = b.target_chat_ids.len() == 1 && b.target_chat_ids.contains(&chat_id);
            if last && b.status != BroadcastStatus::Draft {
                return Err(DomainError::Validation(
                    "a scheduled broadcast needs at least one target chat".into(),
                ));
            }
            b.target_chat_ids.remove(&chat_id);
            Ok(b.clone())
        })
        .await
    }

    /// Claim the broadcast for one dispatch: moves it to `sending` and returns the record to send.
    ///
    /// Fails with `Busy` when a dispatch is already in flight. A failed one-off broadcast may be
    /// claimed again (retry).
    pub async fn begin_dispatch(&self, id: BroadcastId) -> Result<Broadcast, DomainError> {
        self.claim(id, None).await
    }

    /// Claim for the scheduled run at `due_at`. Succeeds only while the record is still `active`
    /// with `next_run_at == due_at`; a slot consumed by another run yields `NotDue`.
    pub async fn begin_scheduled_dispatch(
        &self,
        id: BroadcastId,
        due_at: DateTime<Utc>,
    ) -> Result<Broadcast, DomainError> {
        self.claim(id, Some(due_at)).await
    }

    async fn claim(
        &self,
        id: BroadcastId,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Broadcast, DomainError> {
        self.update(id, |b| {
            match (b.status, due_at) {
                (BroadcastStatus::Sending, _) => return Err(DomainError::Busy(id)),
                (BroadcastStatus::Active, Some(at)) if b.next_run_at == Some(at) => {}
                (_, Some(_)) => return Err(DomainError::NotDue(id)),
                (BroadcastStatus::Draft | BroadcastStatus::Active, None) => {}
                (BroadcastStatus::Failed, None) if !b.is_recurring() => {}
                (from, None) => {
                    return Err(DomainError::InvalidTransition {
                        from,
                        action: "dispatch",
                    });
                }
            }
            if b.target_chat_ids.is_empty() {
                return Err(DomainError::Validation(
                    "broadcast has no target chats".into(),
                ));
            }
            b.status = BroadcastStatus::Sending;
            Ok(b.clone())
        })
        .await
    }

    /// Fold a dispatch outcome into the record. Only valid while `sending`.
    ///
    /// One-off broadcasts end `completed` (at least one recipient delivered) or `failed`. Recurring
    /// broadcasts return to `active` with the next run strictly after now.
    pub async fn record_outcome(
        &self,
        id: BroadcastId,
        outcome: Outcome,
    ) -> Result<Broadcast, DomainError> {
        let now = self.clock.now();
        self.update(id, |b| {
            if b.status != BroadcastStatus::Sending {
                return Err(DomainError::InvalidTransition {
                    from: b.status,
                    action: "record an outcome for",
                });
            }
            if !outcome.stats.is_consistent() {
                return Err(DomainError::Validation(format!(
                    "outcome counters exceed recipients: {:?}",
                    outcome.stats
                )));
            }

            b.stats = outcome.stats;
            b.last_run_at = Some(outcome.finished_at);
            b.runs.push(RunRecord::from(&outcome));
            if b.runs.len() > MAX_RUN_HISTORY {
                let excess = b.runs.len() - MAX_RUN_HISTORY;
                b.runs.drain(..excess);
            }

            let run_status = outcome.run_status();
            let next = if b.is_recurring() {
                let previous = b.next_run_at.or(b.scheduled_at).unwrap_or(now);
                next_run_after(previous, b.recurrence, now)
            } else {
                None
            };
            b.next_run_at = next;
            b.status = match (next, run_status) {
                (Some(_), _) => BroadcastStatus::Active,
                (None, RunStatus::Completed) => BroadcastStatus::Completed,
                (None, RunStatus::Failed) => BroadcastStatus::Failed,
            };

            info!(
                %id,
                status = %b.status,
                recipients = b.stats.recipients_count,
                delivered = b.stats.delivered_count,
                failed = b.stats.failed_count,
                next_run_at = ?b.next_run_at,
                "dispatch outcome recorded"
            );
            Ok(b.clone())
        })
        .await
    }

    /// Apply `f` to one record under the write lock; persist only when `f` succeeds.
    /// `f` must leave the record untouched when it returns an error.
    async fn update<T>(
        &self,
        id: BroadcastId,
        f: impl FnOnce(&mut Broadcast) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let mut records = self.records.write().await;
        let b = records.get_mut(&id).ok_or(DomainError::NotFound(id))?;
        let out = f(b)?;
        self.persist(&records).await;
        Ok(out)
    }

    /// Write the snapshot while the caller still holds the write lock, so saves stay ordered.
    async fn persist(&self, records: &HashMap<BroadcastId, Broadcast>) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let mut all: Vec<Broadcast> = records.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        match snapshot.save(&all).await {
            Ok(()) => debug!(count = all.len(), "snapshot saved"),
            Err(e) => warn!(error = %e, "snapshot save failed; keeping in-memory state"),
        }
    }
}

fn ensure_editable(b: &Broadcast, action: &'static str) -> Result<(), DomainError> {
    match b.status {
        BroadcastStatus::Draft | BroadcastStatus::Active | BroadcastStatus::Paused => Ok(()),
        BroadcastStatus::Sending => Err(DomainError::Busy(b.id)),
        from => Err(DomainError::InvalidTransition { from, action }),
    }
}
