use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use tracing::{debug, info};

use super::cookies::{cookie_jar_for, CookieExtractor, CookieJar, LoginOpener};
use super::error::{Result, SyncError};
use super::panel::PanelClient;
use super::upsert::{upsert_env, UpsertPolicy};
use crate::shared::logging::mask_secret;
use crate::shared::{ConfigStore, Configuration, CookieSource};

pub type JarFactory = Arc<dyn Fn(&CookieSource) -> Arc<dyn CookieJar> + Send + Sync>;

pub fn default_jar_factory() -> JarFactory {
    Arc::new(cookie_jar_for)
}

/// Runs one sync attempt: cookies → token → upsert → persist `last_sync_at`.
/// Overlapping attempts are rejected with [`SyncError::InProgress`].
pub struct SyncOrchestrator {
    http: Client,
    store: Arc<dyn ConfigStore>,
    jar_for: JarFactory,
    opener: Arc<dyn LoginOpener>,
    in_flight: tokio::sync::Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        http: Client,
        store: Arc<dyn ConfigStore>,
        jar_for: JarFactory,
        opener: Arc<dyn LoginOpener>,
    ) -> Self {
        Self {
            http,
            store,
            jar_for,
            opener,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub async fn sync(&self, config: &Configuration) -> Result<DateTime<Utc>> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::InProgress)?;

        config
            .validate_for_sync()
            .map_err(|e| SyncError::Misconfigured(e.to_string()))?;

        info!(
            panel = %config.panel_base(),
            variable = %config.variable_name,
            "starting cookie sync"
        );

        let jar = (self.jar_for)(&config.cookie_source);
        let extractor = CookieExtractor::new(jar, self.opener.clone());
        let cookie = extractor.extract(&config.target_url).await?;
        debug!("session cookies extracted");

        let panel = PanelClient::new(self.http.clone(), config.panel_base());
        let token = panel
            .fetch_token(&config.client_id, &config.client_secret)
            .await?;
        debug!(token = %mask_secret(&token), "panel token acquired");

        let outcome = upsert_env(
            &panel,
            &token,
            &config.variable_name,
            &cookie,
            UpsertPolicy::from_flag(config.allow_implicit_create),
        )
        .await?;
        debug!(?outcome, "environment variable upserted");

        self.persist_timestamp().await
    }

    async fn persist_timestamp(&self) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let updated = self
            .store
            .update(Box::new(move |cfg| {
                let at = match cfg.last_sync_at {
                    Some(previous) if previous >= now => previous + Duration::milliseconds(1),
                    _ => now,
                };
                cfg.last_sync_at = Some(at);
            }))
            .await
            .map_err(|e| SyncError::Storage(format!("{e:#}")))?;

        updated
            .last_sync_at
            .ok_or_else(|| SyncError::Storage("last sync time was not recorded".to_string()))
    }
}
