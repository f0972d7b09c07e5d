//! Dispatcher use case: one send attempt of a broadcast to all of its target chats.
//!
//! - Claims the broadcast in the store (`sending`); a second concurrent claim gets `Busy`
//! - Runs claim to outcome on a spawned task, so a cancelled caller cannot strand `sending`
//! - Snapshots member counts from the chat directory at dispatch time
//! - Fans out per chat behind a semaphore, waits for every chat (no early return)
//! - Retries transient failures with backoff; permanent failures are counted at once

use crate::domain::{
    Broadcast, BroadcastId, Chat, ChatFailure, ChatId, DeliveryStats, DomainError, Identity,
    Outcome, TransportError,
};
use crate::ports::{ChatDirectory, Clock, MessageTransport};
use crate::usecases::broadcast_store::BroadcastStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Limits applied to each dispatch.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Maximum per-chat sends in flight for one dispatch.
    pub max_concurrent_sends: usize,
    /// Attempts per chat, first one included.
    pub max_attempts: u32,
    /// Deadline of a single send attempt. Exceeding it is a transient failure.
    pub send_timeout: Duration,
    /// Backoff before the second attempt; doubled for each further attempt.
    pub backoff_base: Duration,
    /// Upper bound for any wait between attempts, rate-limit waits included.
    pub max_backoff: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_concurrent_sends: 5,
            max_attempts: 3,
            send_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl DispatchPolicy {
    fn backoff_for(&self, attempt: u32, err: &TransportError) -> Duration {
        let wait = match err {
            TransportError::RateLimited { retry_after_secs } => {
                Duration::from_secs(*retry_after_secs)
            }
            _ => self
                .backoff_base
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        };
        wait.min(self.max_backoff)
    }
}

/// Per-chat result before aggregation.
struct ChatResult {
    chat_id: ChatId,
    member_count: u64,
    error: Option<String>,
}

pub struct Dispatcher {
    store: Arc<BroadcastStore>,
    directory: Arc<dyn ChatDirectory>,
    transport: Arc<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    /// Identity the engine acts as when reading the chat directory.
    identity: Identity,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(
        store: Arc<BroadcastStore>,
        directory: Arc<dyn ChatDirectory>,
        transport: Arc<dyn MessageTransport>,
        clock: Arc<dyn Clock>,
        identity: Identity,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            transport,
            clock,
            identity,
            policy,
        }
    }

    /// Send broadcast `id` to its target chats and record the outcome in the store.
    ///
    /// Errors come only from claiming (`NotFound`, `Busy`, `InvalidTransition`, `Validation`)
    /// or from recording; per-chat failures are part of the returned `Outcome`.
    pub async fn dispatch(self: &Arc<Self>, id: BroadcastId) -> Result<Outcome, DomainError> {
        self.spawn_run(id, None).await
    }

    /// Scheduler path: dispatch the run due at `due_at`. Returns `NotDue` when that slot was
    /// already consumed (send-now or an overlapping cycle), so no slot is sent twice.
    pub async fn dispatch_scheduled(
        self: &Arc<Self>,
        id: BroadcastId,
        due_at: DateTime<Utc>,
    ) -> Result<Outcome, DomainError> {
        self.spawn_run(id, Some(due_at)).await
    }

    /// Claim, fan-out and record run on their own task. Dropping the caller's future never
    /// leaves the record in `sending`; the run still finishes and records its outcome.
    async fn spawn_run(
        self: &Arc<Self>,
        id: BroadcastId,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome, DomainError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.claim_and_run(id, due_at).await })
            .await
            .map_err(|e| DomainError::Dispatch(format!("dispatch task for {}: {}", id, e)))?
    }

    async fn claim_and_run(
        self: Arc<Self>,
        id: BroadcastId,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome, DomainError> {
        let broadcast = match due_at {
            Some(at) => self.store.begin_scheduled_dispatch(id, at).await?,
            None => self.store.begin_dispatch(id).await?,
        };
        let targets: Vec<ChatId> = broadcast.target_chat_ids.iter().copied().collect();
        let started_at = self.clock.now();
        info!(%id, targets = targets.len(), "dispatch started");

        let runner = Arc::clone(&self);
        let run = tokio::spawn(async move { runner.fan_out(broadcast, started_at).await });
        let outcome = match run.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                // Claimed records always get an outcome, even when the fan-out itself dies.
                error!(%id, error = %join_err, "dispatch run failed");
                let reason = format!("dispatch run failed: {}", join_err);
                let results = targets
                    .into_iter()
                    .map(|chat_id| ChatResult {
                        chat_id,
                        member_count: 0,
                        error: Some(reason.clone()),
                    })
                    .collect();
                aggregate(results, started_at, self.clock.now())
            }
        };

        info!(
            %id,
            recipients = outcome.stats.recipients_count,
            delivered = outcome.stats.delivered_count,
            failed = outcome.stats.failed_count,
            chats_delivered = outcome.chats_delivered,
            chats_failed = outcome.chats_failed,
            "dispatch finished"
        );
        self.store.record_outcome(id, outcome.clone()).await?;
        Ok(outcome)
    }

    /// Send to every target and wait for all of them.
    async fn fan_out(&self, broadcast: Broadcast, started_at: DateTime<Utc>) -> Outcome {
        let id = broadcast.id;
        let chats: HashMap<ChatId, Chat> = match self.directory.list_chats(&self.identity).await {
            Ok(list) => list.into_iter().map(|c| (c.id, c)).collect(),
            Err(e) => {
                warn!(%id, error = %e, "chat directory unavailable; targets treated as unknown");
                HashMap::new()
            }
        };

        let content: Arc<str> = Arc::from(broadcast.content());
        let semaphore = Arc::new(Semaphore::new(self.policy.max_concurrent_sends.max(1)));
        let mut results: Vec<ChatResult> = Vec::with_capacity(broadcast.target_chat_ids.len());
        let mut in_flight: JoinSet<ChatResult> = JoinSet::new();
        let mut task_chats = HashMap::new();

        for &chat_id in &broadcast.target_chat_ids {
            let chat = match chats.get(&chat_id) {
                None => {
                    results.push(ChatResult {
                        chat_id,
                        member_count: 0,
                        error: Some("chat not found in directory".into()),
                    });
                    continue;
                }
                Some(c) if !c.can_post => {
                    results.push(ChatResult {
                        chat_id,
                        member_count: c.member_count,
                        error: Some("posting not permitted".into()),
                    });
                    continue;
                }
                Some(c) => c,
            };

            let member_count = chat.member_count;
            let sem = Arc::clone(&semaphore);
            let transport = Arc::clone(&self.transport);
            let content = Arc::clone(&content);
            let policy = self.policy.clone();

            let handle = in_flight.spawn(async move {
                let error = match sem.acquire_owned().await {
                    Ok(_permit) => send_with_retry(&*transport, chat_id, &content, &policy)
                        .await
                        .err()
                        .map(|e| e.to_string()),
                    Err(_) => Some("dispatcher shut down".to_string()),
                };
                ChatResult {
                    chat_id,
                    member_count,
                    error,
                }
            });
            task_chats.insert(handle.id(), (chat_id, member_count));
        }

        // Barrier: every per-chat task resolves before the outcome is built.
        while let Some(joined) = in_flight.join_next_with_id().await {
            match joined {
                Ok((_, result)) => results.push(result),
                Err(join_err) => {
                    let Some(&(chat_id, member_count)) = task_chats.get(&join_err.id()) else {
                        error!(%id, error = %join_err, "send task lost");
                        continue;
                    };
                    error!(%id, chat_id, error = %join_err, "send task panicked");
                    results.push(ChatResult {
                        chat_id,
                        member_count,
                        error: Some(format!("send task failed: {}", join_err)),
                    });
                }
            }
        }

        aggregate(results, started_at, self.clock.now())
    }
}

/// One chat, with timeout per attempt and retries for retryable failures.
async fn send_with_retry(
    transport: &dyn MessageTransport,
    chat_id: ChatId,
    content: &str,
    policy: &DispatchPolicy,
) -> Result<(), TransportError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let send = transport.send(chat_id, content);
        let result = match tokio::time::timeout(policy.send_timeout, send).await {
            Ok(r) => r,
            Err(_) => Err(TransportError::Timeout(policy.send_timeout.as_millis() as u64)),
        };
        match result {
            Ok(()) => {
                debug!(chat_id, attempt, "delivered");
                return Ok(());
            }
            Err(e) if !e.is_retryable() || attempt >= max_attempts => {
                warn!(chat_id, attempt, error = %e, "send failed");
                return Err(e);
            }
            Err(e) => {
                let wait = policy.backoff_for(attempt, &e);
                warn!(
                    chat_id,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "send failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

fn aggregate(
    results: Vec<ChatResult>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> Outcome {
    let mut stats = DeliveryStats::default();
    let mut chats_delivered = 0;
    let mut failures = Vec::new();
    for r in results {
        stats.recipients_count = stats.recipients_count.saturating_add(r.member_count);
        match r.error {
            None => {
                stats.delivered_count = stats.delivered_count.saturating_add(r.member_count);
                chats_delivered += 1;
            }
            Some(reason) => {
                stats.failed_count = stats.failed_count.saturating_add(r.member_count);
                failures.push(ChatFailure {
                    chat_id: r.chat_id,
                    reason,
                });
            }
        }
    }
    failures.sort_by_key(|f| f.chat_id);
    Outcome {
        stats,
        chats_delivered,
        chats_failed: failures.len(),
        failures,
        started_at,
        finished_at,
    }
}
