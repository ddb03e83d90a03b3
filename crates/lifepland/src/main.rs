//! Periodic driver (C19): runs the due-soon scanner and the outbox
//! dispatcher on their own intervals until told to shut down.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use lifeplan_core::config::AppConfig;
use lifeplan_core::notifications::BrevoEmailProvider;
use lifeplan_core::services::{OutboxDispatcher, ProfileService, ReminderScanner};
use lifeplan_state::connection::connect_from_env;
use lifeplan_state::{SurrealNotificationStore, SurrealPlanStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    lifeplan_core::init_tracing(&config);
    info!(version = lifeplan_core::VERSION, "lifepland starting");

    let db = connect_from_env(config.auto_create_schema).await?;
    let plan_store: Arc<dyn lifeplan_state::PlanStore> = Arc::new(SurrealPlanStore::new(db.clone()));
    let notification_store: Arc<dyn lifeplan_state::NotificationStore> =
        Arc::new(SurrealNotificationStore::new(db));

    let profiles = Arc::new(ProfileService::new(
        notification_store.clone(),
        config.notification_token_secret.clone(),
    ));
    let scanner = ReminderScanner::new(notification_store.clone(), profiles, config.clone());

    let provider: Arc<dyn lifeplan_core::notifications::EmailProvider> =
        Arc::new(BrevoEmailProvider::new(config.clone()));
    let dispatcher = OutboxDispatcher::new(notification_store, provider, config.outbox_batch_size);

    let scan_task = tokio::spawn(run_scan_loop(scanner, plan_store, config.scan_interval_secs));
    let dispatch_task = tokio::spawn(run_dispatch_loop(dispatcher, config.dispatch_interval_secs));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping loops");
    scan_task.abort();
    dispatch_task.abort();

    Ok(())
}

async fn run_scan_loop(
    scanner: ReminderScanner,
    plan_store: Arc<dyn lifeplan_state::PlanStore>,
    interval_secs: u64,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;
        let plan_ids = match plan_store.list_active_plan_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to list active plans");
                continue;
            }
        };
        let summary = scanner.scan_due_soon(&plan_ids).await;
        info!(?summary, "reminder scan complete");
    }
}

async fn run_dispatch_loop(dispatcher: OutboxDispatcher, interval_secs: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;
        let summary = dispatcher.dispatch_pending_outbox().await;
        info!(?summary, "outbox dispatch complete");
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
