//! Dashboard facade. Implements the inbound DashboardPort over store, dispatcher and directory.
//!
//! Mutating commands are authorized through AuthPort first; reads are not.

use crate::domain::{
    Broadcast, BroadcastId, BroadcastSpec, BroadcastStatus, Chat, ChatId, ChatQuery,
    DeliveryMode, DomainError, Identity, ListFilter, ListOrder, Outcome, Overview,
    ScheduledEntry,
};
use crate::ports::{AuthPort, ChatDirectory, Clock, DashboardPort};
use crate::usecases::broadcast_store::BroadcastStore;
use crate::usecases::dispatcher::Dispatcher;
use crate::usecases::scheduler::is_overdue;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

pub struct BroadcastService {
    store: Arc<BroadcastStore>,
    dispatcher: Arc<Dispatcher>,
    directory: Arc<dyn ChatDirectory>,
    auth: Arc<dyn AuthPort>,
    clock: Arc<dyn Clock>,
}

impl BroadcastService {
    pub fn new(
        store: Arc<BroadcastStore>,
        dispatcher: Arc<Dispatcher>,
        directory: Arc<dyn ChatDirectory>,
        auth: Arc<dyn AuthPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            directory,
            auth,
            clock,
        }
    }
}

#[async_trait]
impl DashboardPort for BroadcastService {
    async fn create(
        &self,
        identity: &Identity,
        spec: BroadcastSpec,
    ) -> Result<Broadcast, DomainError> {
        self.auth.authorize(identity).await?;
        let created = self.store.create(spec).await?;
        if created.mode == DeliveryMode::Immediate {
            self.dispatcher.dispatch(created.id).await?;
            return self.store.get(created.id).await;
        }
        Ok(created)
    }

    async fn send_now(&self, identity: &Identity, id: BroadcastId) -> Result<Outcome, DomainError> {
        self.auth.authorize(identity).await?;
        info!(%id, "send now requested");
        self.dispatcher.dispatch(id).await
    }

    async fn pause(&self, identity: &Identity, id: BroadcastId) -> Result<Broadcast, DomainError> {
        self.auth.authorize(identity).await?;
        self.store.pause(id).await
    }

    async fn resume(&self, identity: &Identity, id: BroadcastId) -> Result<Broadcast, DomainError> {
        self.auth.authorize(identity).await?;
        self.store.resume(id).await
    }

    async fn delete(&self, identity: &Identity, id: BroadcastId) -> Result<(), DomainError> {
        self.auth.authorize(identity).await?;
        self.store.delete(id).await
    }

    async fn add_target(
        &self,
        identity: &Identity,
        id: BroadcastId,
        chat_id: ChatId,
    ) -> Result<Broadcast, DomainError> {
        self.auth.authorize(identity).await?;
        self.store.add_target(id, chat_id).await
    }

    async fn remove_target(
        &self,
        identity: &Identity,
        id: BroadcastId,
        chat_id: ChatId,
    ) -> Result<Broadcast, DomainError> {
        self.auth.authorize(identity).await?;
        self.store.remove_target(id, chat_id).await
    }

    async fn get(&self, id: BroadcastId) -> Result<Broadcast, DomainError> {
        self.store.get(id).await
    }

    async fn history(
        &self,
        query: Option<&str>,
        statuses: &[BroadcastStatus],
    ) -> Result<Vec<Broadcast>, DomainError> {
        let filter = ListFilter {
            statuses: statuses.to_vec(),
            query: query.map(str::to_string),
            order: ListOrder::CreatedDesc,
        };
        Ok(self.store.list(&filter).await)
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<Broadcast>, DomainError> {
        let filter = ListFilter::new().ordered(ListOrder::LastRunDesc);
        Ok(self
            .store
            .list(&filter)
            .await
            .into_iter()
            .filter(|b| b.last_run_at.is_some())
            .take(limit)
            .collect())
    }

    async fn scheduled(&self) -> Result<Vec<ScheduledEntry>, DomainError> {
        let now = self.clock.now();
        let filter = ListFilter {
            statuses: vec![
                BroadcastStatus::Active,
                BroadcastStatus::Paused,
                BroadcastStatus::Sending,
            ],
            query: None,
            order: ListOrder::NextRunAsc,
        };
        Ok(self
            .store
            .list(&filter)
            .await
            .into_iter()
            .filter(|b| b.mode == DeliveryMode::Scheduled)
            .map(|b| ScheduledEntry {
                overdue: is_overdue(&b, now),
                broadcast: b,
            })
            .collect())
    }

    async fn overview(&self, identity: &Identity) -> Result<Overview, DomainError> {
        let now = self.clock.now();
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);

        let chats = self.directory.list_chats(identity).await?;
        let all = self.store.list(&ListFilter::new()).await;

        let mut overview = Overview {
            postable_chats: chats.iter().filter(|c| c.can_post).count(),
            ..Overview::default()
        };
        let (mut delivered, mut recipients) = (0u64, 0u64);
        let today = now.date_naive();
        for b in &all {
            match b.status {
                BroadcastStatus::Active if b.mode == DeliveryMode::Scheduled => {
                    overview.active_scheduled += 1
                }
                BroadcastStatus::Paused => overview.paused_scheduled += 1,
                _ => {}
            }
            let waiting = matches!(b.status, BroadcastStatus::Active | BroadcastStatus::Paused);
            if waiting && b.next_run_at.is_some_and(|t| t.date_naive() == today) {
                overview.due_today += 1;
            }
            for run in &b.runs {
                delivered = delivered.saturating_add(run.stats.delivered_count);
                recipients = recipients.saturating_add(run.stats.recipients_count);
                if run.finished_at >= midnight {
                    overview.runs_today += 1;
                    overview.delivered_today =
                        overview.delivered_today.saturating_add(run.stats.delivered_count);
                }
            }
        }
        if recipients > 0 {
            overview.success_rate = delivered as f64 / recipients as f64 * 100.0;
        }
        Ok(overview)
    }

    async fn chats(
        &self,
        identity: &Identity,
        query: &ChatQuery,
    ) -> Result<Vec<Chat>, DomainError> {
        let chats = self.directory.list_chats(identity).await?;
        Ok(chats.into_iter().filter(|c| query.matches(c)).collect())
    }

    async fn refresh_chats(&self, identity: &Identity) -> Result<(), DomainError> {
        self.auth.authorize(identity).await?;
        self.directory.invalidate().await;
        Ok(())
    }

    async fn estimate_recipients(
        &self,
        identity: &Identity,
        targets: &[ChatId],
    ) -> Result<u64, DomainError> {
        let members: HashMap<ChatId, u64> = self
            .directory
            .list_chats(identity)
            .await?
            .into_iter()
            .map(|c| (c.id, c.member_count))
            .collect();
        let unique: BTreeSet<ChatId> = targets.iter().copied().collect();
        Ok(unique
            .iter()
            .filter_map(|id| members.get(id))
            .fold(0u64, |acc, n| acc.saturating_add(*n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::StaticTokenAuth;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::directory::StaticChatDirectory;
    use crate::adapters::transport::{ScriptedTransport, SendScript};
    use crate::domain::{ChatKind, Recurrence};
    use crate::usecases::dispatcher::DispatchPolicy;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const TOKEN: &str = "session-token";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    fn catalog() -> Vec<Chat> {
        let chat = |id, name: &str, kind, members, can_post| Chat {
            id,
            name: name.to_string(),
            kind,
            description: None,
            member_count: members,
            can_post,
            is_admin: can_post,
        };
        vec![
            chat(1, "Tech News Channel", ChatKind::Channel, 1234, true),
            chat(2, "Marketing Team", ChatKind::Group, 45, true),
            chat(3, "Product Updates", ChatKind::Channel, 890, false),
            chat(4, "Customer Support", ChatKind::Group, 23, true),
        ]
    }

    fn service(transport: ScriptedTransport) -> (BroadcastService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(BroadcastStore::new(clock.clone()));
        let directory: Arc<dyn ChatDirectory> = Arc::new(StaticChatDirectory::new(catalog()));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            directory.clone(),
            Arc::new(transport),
            clock.clone(),
            Identity::new("service"),
            DispatchPolicy {
                backoff_base: std::time::Duration::from_millis(1),
                ..DispatchPolicy::default()
            },
        ));
        let auth = Arc::new(StaticTokenAuth::new(vec![TOKEN.to_string()]));
        (
            BroadcastService::new(store, dispatcher, directory, auth, clock.clone()),
            clock,
        )
    }

    fn me() -> Identity {
        Identity::new(TOKEN)
    }

    #[tokio::test]
    async fn test_unauthorized_commands_rejected() {
        let (svc, _) = service(ScriptedTransport::new());
        let stranger = Identity::new("nope");
        let err = svc
            .create(&stranger, BroadcastSpec::immediate("hi", [1]))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
        assert!(svc.history(None, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_create_dispatches() {
        let (svc, _) = service(ScriptedTransport::new());
        let b = svc
            .create(&me(), BroadcastSpec::immediate("Daily tech news", [1, 2]))
            .await
            .unwrap();
        assert_eq!(b.status, BroadcastStatus::Completed);
        assert_eq!(b.stats.recipients_count, 1234 + 45);
        assert_eq!(b.stats.delivered_count, 1234 + 45);
        assert_eq!(b.last_run_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_retry_failed_broadcast() {
        let transport =
            ScriptedTransport::new().with_script(4, SendScript::TransientThenOk(3));
        let (svc, _) = service(transport);
        let b = svc
            .create(&me(), BroadcastSpec::immediate("Maintenance notice", [4]))
            .await
            .unwrap();
        assert_eq!(b.status, BroadcastStatus::Failed);

        let outcome = svc.send_now(&me(), b.id).await.unwrap();
        assert_eq!(outcome.stats.delivered_count, 23);
        let b = svc.get(b.id).await.unwrap();
        assert_eq!(b.status, BroadcastStatus::Completed);
        assert_eq!(b.runs.len(), 2);
    }

    #[tokio::test]
    async fn test_send_now_paused_is_invalid() {
        let (svc, _) = service(ScriptedTransport::new());
        let b = svc
            .create(
                &me(),
                BroadcastSpec::scheduled("x", [1], t0() + Duration::days(1), Recurrence::Monthly),
            )
            .await
            .unwrap();
        svc.pause(&me(), b.id).await.unwrap();
        assert!(matches!(
            svc.send_now(&me(), b.id).await,
            Err(DomainError::InvalidTransition { from: BroadcastStatus::Paused, .. })
        ));
    }

    #[tokio::test]
    async fn test_scheduled_view_flags_overdue() {
        let (svc, clock) = service(ScriptedTransport::new());
        let soon = svc
            .create(
                &me(),
                BroadcastSpec::scheduled(
                    "Evening digest",
                    [1],
                    t0() + Duration::hours(1),
                    Recurrence::Daily,
                ),
            )
            .await
            .unwrap();
        let later = svc
            .create(
                &me(),
                BroadcastSpec::scheduled(
                    "Monthly report",
                    [2],
                    t0() + Duration::days(10),
                    Recurrence::Monthly,
                ),
            )
            .await
            .unwrap();
        svc.pause(&me(), later.id).await.unwrap();
        svc.create(&me(), BroadcastSpec::immediate("sent already", [1]))
            .await
            .unwrap();

        clock.advance(Duration::hours(2));
        let view = svc.scheduled().await.unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].broadcast.id, soon.id);
        assert!(view[0].overdue);
        assert!(!view[1].overdue);
    }

    #[tokio::test]
    async fn test_history_search_and_status() {
        let (svc, clock) = service(
            ScriptedTransport::new().with_script(2, SendScript::Permanent("left".into())),
        );
        svc.create(&me(), BroadcastSpec::immediate("Promo: 50% off", [1]).with_title("Promo"))
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        svc.create(&me(), BroadcastSpec::immediate("System notice", [2]))
            .await
            .unwrap();

        let promo = svc.history(Some("PROMO"), &[]).await.unwrap();
        assert_eq!(promo.len(), 1);
        let failed = svc.history(None, &[BroadcastStatus::Failed]).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].body, "System notice");
        let all = svc.history(None, &[]).await.unwrap();
        assert_eq!(all[0].body, "System notice");
    }

    #[tokio::test]
    async fn test_overview_counts() {
        let (svc, clock) = service(
            ScriptedTransport::new().with_script(2, SendScript::Permanent("left".into())),
        );
        svc.create(&me(), BroadcastSpec::immediate("a", [1, 2])).await.unwrap();
        svc.create(
            &me(),
            BroadcastSpec::scheduled("b", [1], t0() + Duration::hours(3), Recurrence::Daily),
        )
        .await
        .unwrap();

        let tomorrow = svc
            .create(
                &me(),
                BroadcastSpec::scheduled("c", [2], t0() + Duration::days(1), Recurrence::Weekly),
            )
            .await
            .unwrap();
        svc.pause(&me(), tomorrow.id).await.unwrap();

        let o = svc.overview(&me()).await.unwrap();
        assert_eq!(o.postable_chats, 3);
        assert_eq!(o.runs_today, 1);
        assert_eq!(o.delivered_today, 1234);
        assert_eq!(o.active_scheduled, 1);
        assert_eq!(o.paused_scheduled, 1);
        assert_eq!(o.due_today, 1);
        assert!((o.success_rate - 1234.0 / 1279.0 * 100.0).abs() < 1e-9);

        clock.advance(Duration::days(1));
        let o = svc.overview(&me()).await.unwrap();
        assert_eq!(o.runs_today, 0);
        // Daily run is overdue from yesterday; the paused weekly one is due today.
        assert_eq!(o.due_today, 1);
    }

    #[tokio::test]
    async fn test_chats_and_estimate() {
        let (svc, _) = service(ScriptedTransport::new());
        let channels = svc
            .chats(
                &me(),
                &ChatQuery {
                    search: None,
                    kind: Some(ChatKind::Channel),
                },
            )
            .await
            .unwrap();
        assert_eq!(channels.len(), 2);
        let found = svc
            .chats(
                &me(),
                &ChatQuery {
                    search: Some("team".into()),
                    kind: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(found[0].id, 2);

        let total = svc.estimate_recipients(&me(), &[1, 2, 2, 99]).await.unwrap();
        assert_eq!(total, 1234 + 45);
        svc.refresh_chats(&me()).await.unwrap();
    }

    #[tokio::test]
    async fn test_target_editing_through_service() {
        let (svc, _) = service(ScriptedTransport::new());
        let b = svc
            .create(
                &me(),
                BroadcastSpec::scheduled("x", [1], t0() + Duration::hours(1), Recurrence::Weekly),
            )
            .await
            .unwrap();
        let b = svc.add_target(&me(), b.id, 4).await.unwrap();
        assert!(b.target_chat_ids.contains(&4));
        let b = svc.remove_target(&me(), b.id, 1).await.unwrap();
        assert_eq!(b.target_chat_ids.len(), 1);
        svc.delete(&me(), b.id).await.unwrap();
        assert!(matches!(svc.get(b.id).await, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_recent_activity_latest_run_first() {
        let (svc, clock) = service(ScriptedTransport::new());
        let first = svc
            .create(&me(), BroadcastSpec::immediate("first", [1]))
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));
        let second = svc
            .create(&me(), BroadcastSpec::immediate("second", [2]))
            .await
            .unwrap();
        svc.create(
            &me(),
            BroadcastSpec::scheduled("never run", [1], t0() + Duration::days(2), Recurrence::Once),
        )
        .await
        .unwrap();

        let feed = svc.recent_activity(10).await.unwrap();
        assert_eq!(
            feed.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert_eq!(svc.recent_activity(1).await.unwrap()[0].id, second.id);
    }
}
