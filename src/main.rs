//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run the scheduler driver.
//! No business logic here; the dashboard talks to the library through `DashboardPort`.

use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tg_broadcaster::adapters::auth::StaticTokenAuth;
use tg_broadcaster::adapters::clock::SystemClock;
use tg_broadcaster::adapters::directory::{CachedChatDirectory, JsonChatDirectory};
use tg_broadcaster::adapters::persistence::JsonSnapshot;
use tg_broadcaster::adapters::transport::{OutboxTransport, ScriptedTransport};
use tg_broadcaster::domain::Identity;
use tg_broadcaster::ports::{
    AuthPort, ChatDirectory, Clock, DashboardPort, MessageTransport, SnapshotPort,
};
use tg_broadcaster::shared::config::AppConfig;
use tg_broadcaster::usecases::{
    BroadcastService, BroadcastStore, Dispatcher, Scheduler, SchedulerDriver,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    let cfg = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config load failed; using defaults");
        AppConfig::default()
    });

    let data_dir = cfg.data_dir_or_default();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("create data dir {}: {}", data_dir.display(), e))?;
    info!(path = %data_dir.display(), "data directory");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // --- Store (snapshot-backed) ---
    let snapshot: Arc<dyn SnapshotPort> =
        Arc::new(JsonSnapshot::new(cfg.snapshot_path_or_default()));
    let store = Arc::new(
        BroadcastStore::open(Arc::clone(&clock), snapshot)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?,
    );

    // --- Chat directory (catalog file behind a TTL cache) ---
    let chats_path = cfg.chats_path_or_default();
    if !chats_path.exists() {
        warn!(path = %chats_path.display(), "chat catalog missing; every target will be unknown");
    }
    let directory: Arc<dyn ChatDirectory> = Arc::new(CachedChatDirectory::new(
        Arc::new(JsonChatDirectory::new(&chats_path)),
        cfg.directory_ttl(),
    ));

    // --- Transport ---
    let transport: Arc<dyn MessageTransport> = if cfg.is_scripted_transport() {
        warn!("scripted transport selected: nothing leaves the process");
        Arc::new(ScriptedTransport::new())
    } else {
        let outbox = cfg.outbox_dir_or_default();
        info!(path = %outbox.display(), "outbox transport");
        Arc::new(OutboxTransport::new(outbox).with_blocked(cfg.blocked_chats()))
    };

    // --- Use cases ---
    let policy = cfg.dispatch_policy();
    info!(
        max_concurrent_sends = policy.max_concurrent_sends,
        max_attempts = policy.max_attempts,
        send_timeout_ms = policy.send_timeout.as_millis() as u64,
        "dispatch policy"
    );
    let service_identity = Identity::new(cfg.service_token_or_default());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        transport,
        Arc::clone(&clock),
        service_identity.clone(),
        policy,
    ));
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&store)));

    // --- Dashboard facade (the presentation layer embeds the library and talks to this port) ---
    let auth_tokens = cfg.auth_tokens();
    if auth_tokens.is_empty() {
        warn!("TG_BROADCAST_AUTH_TOKENS not set; every dashboard command will be rejected");
    }
    let auth: Arc<dyn AuthPort> = Arc::new(StaticTokenAuth::new(auth_tokens));
    let dashboard: Arc<dyn DashboardPort> = Arc::new(BroadcastService::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        Arc::clone(&directory),
        auth,
        Arc::clone(&clock),
    ));
    log_startup_summary(&*dashboard, &service_identity).await;

    let driver = Arc::new(SchedulerDriver::new(
        scheduler,
        dispatcher,
        Arc::clone(&clock),
        cfg.poll_interval(),
    ));

    // --- Run until Ctrl-C ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver_task = tokio::spawn(Arc::clone(&driver).run_loop(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("listen for ctrl-c: {}", e))?;
    info!("shutdown requested; waiting for in-flight dispatches");
    let _ = shutdown_tx.send(true);
    driver_task
        .await
        .map_err(|e| anyhow::anyhow!("scheduler driver task: {}", e))?;

    Ok(())
}

/// One line with the dashboard numbers, plus a warning per overdue broadcast.
async fn log_startup_summary(dashboard: &dyn DashboardPort, identity: &Identity) {
    match dashboard.overview(identity).await {
        Ok(o) => info!(
            postable_chats = o.postable_chats,
            active_scheduled = o.active_scheduled,
            paused_scheduled = o.paused_scheduled,
            success_rate = %format!("{:.1}", o.success_rate),
            "overview"
        ),
        Err(e) => warn!(error = %e, "overview unavailable"),
    }
    if let Ok(entries) = dashboard.scheduled().await {
        for entry in entries.iter().filter(|e| e.overdue) {
            warn!(
                id = %entry.broadcast.id,
                next_run_at = ?entry.broadcast.next_run_at,
                "overdue broadcast; will dispatch on the first poll"
            );
        }
    }
}
