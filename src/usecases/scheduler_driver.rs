//! Periodic driver: every poll interval, hand each due broadcast to the dispatcher.
//!
//! Does not block the timer on sends: each cycle runs on its own task. Each dispatch claims the
//! exact slot it saw as due, so overlapping cycles or a concurrent send-now never send a slot
//! twice: the loser gets `Busy` (still sending) or `NotDue` (slot already consumed).

use crate::domain::DomainError;
use crate::ports::Clock;
use crate::usecases::dispatcher::Dispatcher;
use crate::usecases::scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counters of one poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub dispatched: usize,
    pub skipped_busy: usize,
    /// Slot consumed by another run between listing and claiming.
    pub skipped_stale: usize,
    pub errors: usize,
}

pub struct SchedulerDriver {
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl SchedulerDriver {
    pub fn new(
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            dispatcher,
            clock,
            poll_interval,
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped). In-flight cycles are awaited
    /// before returning so no dispatch is left half-recorded.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            "scheduler driver started"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles: JoinSet<CycleReport> = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    cycles.spawn(async move { this.dispatch_due().await });
                }
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "poll cycle task failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = cycles.len(), "scheduler driver stopping");
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "poll cycle task failed");
            }
        }
        info!("scheduler driver stopped");
    }

    /// One poll cycle: dispatch every broadcast due now, concurrently, and wait for all of them.
    /// A failure or panic in one dispatch never stops the others.
    pub async fn dispatch_due(&self) -> CycleReport {
        let now = self.clock.now();
        let due = self.scheduler.due_broadcasts(now).await;
        let mut report = CycleReport {
            due: due.len(),
            ..CycleReport::default()
        };
        if due.is_empty() {
            debug!("no broadcasts due");
            return report;
        }

        let mut set = JoinSet::new();
        for b in due {
            let Some(due_at) = b.next_run_at else {
                continue;
            };
            let dispatcher = Arc::clone(&self.dispatcher);
            set.spawn(async move { (b.id, dispatcher.dispatch_scheduled(b.id, due_at).await) });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.dispatched += 1,
                Ok((id, Err(DomainError::Busy(_)))) => {
                    debug!(%id, "already sending; skipped");
                    report.skipped_busy += 1;
                }
                Ok((id, Err(DomainError::NotDue(_)))) => {
                    debug!(%id, "slot already consumed; skipped");
                    report.skipped_stale += 1;
                }
                Ok((id, Err(e))) => {
                    warn!(%id, error = %e, "dispatch failed");
                    report.errors += 1;
                }
                Err(e) => {
                    error!(error = %e, "dispatch task panicked");
                    report.errors += 1;
                }
            }
        }

        info!(
            due = report.due,
            dispatched = report.dispatched,
            skipped_busy = report.skipped_busy,
            skipped_stale = report.skipped_stale,
            errors = report.errors,
            "poll cycle complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::directory::StaticChatDirectory;
    use crate::adapters::transport::{ScriptedTransport, SendScript};
    use crate::domain::{BroadcastSpec, BroadcastStatus, Chat, ChatKind, Identity, Recurrence};
    use crate::usecases::broadcast_store::BroadcastStore;
    use crate::usecases::dispatcher::DispatchPolicy;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn chats() -> Vec<Chat> {
        (1..=3)
            .map(|id| Chat {
                id,
                name: format!("chat-{id}"),
                kind: ChatKind::Channel,
                description: None,
                member_count: 10,
                can_post: true,
                is_admin: true,
            })
            .collect()
    }

    fn driver(
        transport: ScriptedTransport,
    ) -> (Arc<SchedulerDriver>, Arc<BroadcastStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(BroadcastStore::new(clock.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(StaticChatDirectory::new(chats())),
            Arc::new(transport),
            clock.clone(),
            Identity::new("service"),
            DispatchPolicy {
                backoff_base: Duration::from_millis(1),
                send_timeout: Duration::from_millis(200),
                ..DispatchPolicy::default()
            },
        ));
        let scheduler = Arc::new(Scheduler::new(store.clone()));
        let driver = Arc::new(SchedulerDriver::new(
            scheduler,
            dispatcher,
            clock.clone(),
            Duration::from_millis(10),
        ));
        (driver, store, clock)
    }

    #[tokio::test]
    async fn test_cycle_dispatches_only_due() {
        let (driver, store, clock) = driver(ScriptedTransport::new());
        let due = store
            .create(BroadcastSpec::scheduled(
                "a",
                [1, 2],
                t0() + chrono::Duration::minutes(5),
                Recurrence::Once,
            ))
            .await
            .unwrap();
        let later = store
            .create(BroadcastSpec::scheduled(
                "b",
                [3],
                t0() + chrono::Duration::hours(5),
                Recurrence::Daily,
            ))
            .await
            .unwrap();
        let paused = store
            .create(BroadcastSpec::scheduled(
                "c",
                [3],
                t0() + chrono::Duration::minutes(1),
                Recurrence::Daily,
            ))
            .await
            .unwrap();
        store.pause(paused.id).await.unwrap();

        clock.set(t0() + chrono::Duration::minutes(10));
        let report = driver.dispatch_due().await;
        assert_eq!(report.due, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(store.get(due.id).await.unwrap().status, BroadcastStatus::Completed);
        assert_eq!(store.get(later.id).await.unwrap().status, BroadcastStatus::Active);
        assert_eq!(store.get(paused.id).await.unwrap().status, BroadcastStatus::Paused);

        // Completed broadcasts are not picked up again.
        assert_eq!(driver.dispatch_due().await, CycleReport::default());
    }

    #[tokio::test]
    async fn test_one_failing_broadcast_does_not_stop_others() {
        let transport = ScriptedTransport::new().with_script(1, SendScript::Panic);
        let (driver, store, clock) = driver(transport);
        let at = t0() + chrono::Duration::minutes(1);
        let broken = store
            .create(BroadcastSpec::scheduled("a", [1], at, Recurrence::Once))
            .await
            .unwrap();
        let healthy = store
            .create(BroadcastSpec::scheduled("b", [2, 3], at, Recurrence::Once))
            .await
            .unwrap();

        clock.set(at);
        let report = driver.dispatch_due().await;
        assert_eq!(report.dispatched, 2);
        assert_eq!(store.get(broken.id).await.unwrap().status, BroadcastStatus::Failed);
        assert_eq!(store.get(healthy.id).await.unwrap().status, BroadcastStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let (driver, store, clock) = driver(ScriptedTransport::new());
        let at = t0() + chrono::Duration::minutes(1);
        let b = store
            .create(BroadcastSpec::scheduled("a", [1], at, Recurrence::Once))
            .await
            .unwrap();
        clock.set(at);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&driver).run_loop(rx));
        for _ in 0..100 {
            if store.get(b.id).await.unwrap().status == BroadcastStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(store.get(b.id).await.unwrap().status, BroadcastStatus::Completed);
    }

    #[tokio::test]
    async fn test_overlapping_cycles_send_each_slot_once() {
        let transport = ScriptedTransport::new().with_latency(Duration::from_millis(30));
        let (driver, store, clock) = driver(transport);
        let at = t0() + chrono::Duration::minutes(1);
        let daily = store
            .create(BroadcastSpec::scheduled("a", [1], at, Recurrence::Daily))
            .await
            .unwrap();
        let once = store
            .create(BroadcastSpec::scheduled("b", [2], at, Recurrence::Once))
            .await
            .unwrap();
        clock.set(at);

        let (first, second) = tokio::join!(driver.dispatch_due(), driver.dispatch_due());
        assert_eq!(first.dispatched + second.dispatched, 2);
        assert_eq!(first.errors + second.errors, 0);

        let daily = store.get(daily.id).await.unwrap();
        assert_eq!(daily.runs.len(), 1);
        assert_eq!(daily.next_run_at, Some(at + chrono::Duration::hours(24)));
        let once = store.get(once.id).await.unwrap();
        assert_eq!(once.status, BroadcastStatus::Completed);
        assert_eq!(once.runs.len(), 1);

        // Later cycles at the same instant find nothing due.
        assert_eq!(driver.dispatch_due().await.dispatched, 0);
    }
}
