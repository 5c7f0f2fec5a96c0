pub mod control;
pub mod cookies;
pub mod error;
pub mod orchestrator;
pub mod panel;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod timer;
pub mod upsert;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::shared::{ConfigStore, FileConfigStore};
use cookies::SystemBrowser;
use orchestrator::{default_jar_factory, SyncOrchestrator};
use scheduler::Scheduler;
use service::SyncService;
use status::{SharedBadge, StatusReporter};
use timer::TokioTimer;

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Wire the daemon together and run until Ctrl-C.
pub async fn run(store: Arc<FileConfigStore>) -> anyhow::Result<()> {
    let http = panel::build_http_client()?;
    let badge = Arc::new(SharedBadge::default());
    let orchestrator = SyncOrchestrator::new(
        http,
        store.clone(),
        default_jar_factory(),
        Arc::new(SystemBrowser),
    );
    let service = Arc::new(SyncService::new(
        orchestrator,
        store.clone(),
        StatusReporter::new(badge.clone()),
    ));
    let mut scheduler = Scheduler::new(Box::new(TokioTimer::new()), service.tick_handler());

    // Subscribe before the first sync so its timestamp write is not missed.
    let mut changes = store.subscribe();
    let mut current = store.get().await;

    let listener = tokio::net::TcpListener::bind(&current.control_addr)
        .await
        .with_context(|| format!("bind control API on {}", current.control_addr))?;
    let control_state = control::ControlState {
        service: service.clone(),
        badge,
    };
    tokio::spawn(async move {
        if let Err(err) = control::serve(listener, control_state).await {
            error!(?err, "control API stopped");
        }
    });

    let watcher = store.clone().spawn_watcher(CONFIG_POLL_INTERVAL);

    if let Err(err) = current.validate() {
        warn!(error = %err, "configuration is incomplete; syncs will fail until it is fixed");
    }
    scheduler.initialize(&current).await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            change = changes.recv() => match change {
                Ok(change) => {
                    let outcome = scheduler.reconcile(&current, &change.new);
                    info!(?outcome, "configuration change reconciled");
                    current = change.new;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed configuration changes; resynchronizing");
                    let latest = store.get().await;
                    let outcome = scheduler.reconcile(&current, &latest);
                    info!(?outcome, "configuration change reconciled");
                    current = latest;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    scheduler.shutdown();
    watcher.abort();
    Ok(())
}
