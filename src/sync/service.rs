use std::sync::Arc;

use tracing::{error, info, warn};

use super::error::SyncError;
use super::orchestrator::SyncOrchestrator;
use super::status::StatusReporter;
use super::timer::TickHandler;
use crate::shared::models::SyncResponse;
use crate::shared::ConfigStore;

/// What started a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Tick,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Startup => write!(f, "startup"),
            Trigger::Tick => write!(f, "timer"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Runs syncs against the current configuration and reports each outcome on
/// the status badge.
pub struct SyncService {
    orchestrator: SyncOrchestrator,
    store: Arc<dyn ConfigStore>,
    reporter: StatusReporter,
}

impl SyncService {
    pub fn new(
        orchestrator: SyncOrchestrator,
        store: Arc<dyn ConfigStore>,
        reporter: StatusReporter,
    ) -> Self {
        Self {
            orchestrator,
            store,
            reporter,
        }
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub async fn run(&self, trigger: Trigger) -> SyncResponse {
        let config = self.store.get().await;
        match self.orchestrator.sync(&config).await {
            Ok(at) => {
                info!(%trigger, last_sync_at = %at, "sync succeeded");
                self.reporter.report(true);
                SyncResponse::succeeded(at)
            }
            // The attempt already running owns the badge.
            Err(SyncError::InProgress) => {
                warn!(%trigger, "sync skipped; another sync is in progress");
                SyncResponse::failed(SyncError::InProgress.to_string())
            }
            Err(err) => {
                error!(%trigger, error = %err, "sync failed");
                self.reporter.report(false);
                SyncResponse::failed(err.to_string())
            }
        }
    }

    /// Handler the scheduler fires on every timer tick.
    pub fn tick_handler(self: &Arc<Self>) -> TickHandler {
        let service = Arc::clone(self);
        Arc::new(move || {
            let service = service.clone();
            Box::pin(async move {
                service.run(Trigger::Tick).await;
            })
        })
    }
}
