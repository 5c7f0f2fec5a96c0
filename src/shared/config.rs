use std::env;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::models::constants::{
    DEFAULT_CONTROL_ADDR, DEFAULT_SYNC_INTERVAL_MINUTES, DEFAULT_TARGET_URL, DEFAULT_VARIABLE_NAME,
    MAX_SYNC_INTERVAL_MINUTES,
};

const CONFIG_RELATIVE_DIR: &str = ".config/qlsync";
const LOG_SUBDIR: &str = "logs";
const CONFIG_FILE: &str = "config.json";
const COOKIES_FILE: &str = "cookies.txt";

/// Where the session cookies are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CookieSource {
    /// A Netscape `cookies.txt` export.
    Netscape { path: PathBuf },
    /// A Firefox profile `cookies.sqlite`.
    Firefox { path: PathBuf },
}

impl Default for CookieSource {
    fn default() -> Self {
        CookieSource::Netscape {
            path: config_dir().join(COOKIES_FILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub panel_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub variable_name: String,
    pub target_url: String,
    pub auto_sync: bool,
    pub sync_interval_minutes: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Create the variable when the panel does not have it yet. When off the
    /// variable must already exist and is explicitly enabled after each update.
    pub allow_implicit_create: bool,
    pub cookie_source: CookieSource,
    pub control_addr: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            panel_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            variable_name: DEFAULT_VARIABLE_NAME.to_string(),
            target_url: DEFAULT_TARGET_URL.to_string(),
            auto_sync: true,
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            last_sync_at: None,
            allow_implicit_create: true,
            cookie_source: CookieSource::default(),
            control_addr: DEFAULT_CONTROL_ADDR.to_string(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("invalid panel URL '{0}'")]
    InvalidPanelUrl(String),

    #[error("invalid target URL '{0}'")]
    InvalidTargetUrl(String),

    #[error("sync interval must be between 1 and {max} minutes (got {0})", max = MAX_SYNC_INTERVAL_MINUTES)]
    InvalidInterval(i64),
}

impl Configuration {
    /// Interval used to arm the timer, clamped to one minute .. one week.
    pub fn effective_interval_minutes(&self) -> u64 {
        self.sync_interval_minutes
            .clamp(1, MAX_SYNC_INTERVAL_MINUTES) as u64
    }

    pub fn panel_base(&self) -> &str {
        self.panel_url.trim().trim_end_matches('/')
    }

    /// Full settings-surface validation.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.auto_sync
            && !(1..=MAX_SYNC_INTERVAL_MINUTES).contains(&self.sync_interval_minutes)
        {
            return Err(ConfigError::InvalidInterval(self.sync_interval_minutes));
        }
        self.validate_for_sync()
    }

    /// What a sync attempt needs: credentials, variable name and usable URLs.
    pub fn validate_for_sync(&self) -> std::result::Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.panel_url.trim().is_empty() {
            missing.push("panel URL");
        }
        if self.client_id.trim().is_empty() {
            missing.push("client ID");
        }
        if self.client_secret.trim().is_empty() {
            missing.push("client secret");
        }
        if self.variable_name.trim().is_empty() {
            missing.push("variable name");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        if !is_http_url(self.panel_url.trim()) {
            return Err(ConfigError::InvalidPanelUrl(self.panel_url.clone()));
        }
        if !is_http_url(self.target_url.trim()) {
            return Err(ConfigError::InvalidTargetUrl(self.target_url.clone()));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.panel_url = self.panel_url.trim().to_string();
        self.client_id = self.client_id.trim().to_string();
        self.client_secret = self.client_secret.trim().to_string();
        self.variable_name = self.variable_name.trim().to_string();
        self.target_url = self.target_url.trim().to_string();
        if self.target_url.is_empty() {
            self.target_url = DEFAULT_TARGET_URL.to_string();
        }
        if self.control_addr.trim().is_empty() {
            self.control_addr = DEFAULT_CONTROL_ADDR.to_string();
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

pub fn load_from_path(path: &Path) -> Result<Configuration> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: Configuration =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.normalize();
    Ok(cfg)
}

pub fn load_or_default(path: &Path) -> Result<Configuration> {
    if !path.exists() {
        return Ok(Configuration::default());
    }
    load_from_path(path)
}

pub fn save(path: &Path, cfg: &Configuration) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).ok();

    let json = serde_json::to_string_pretty(cfg)?;
    // Unique temp file per writer; the CLI and the daemon may save at once.
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())
        .with_context(|| format!("write {}", tmp.path().display()))?;
    #[cfg(unix)]
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600)).ok();
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("persist {}", path.display()))?;
    Ok(())
}

pub fn config_dir() -> PathBuf {
    home_dir().join(CONFIG_RELATIVE_DIR)
}

pub fn logs_dir() -> PathBuf {
    config_dir().join(LOG_SUBDIR)
}

pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("QLSYNC_CONFIG_PATH") {
        return expand_path(path);
    }
    config_dir().join(CONFIG_FILE)
}

pub fn expand_path(input: String) -> PathBuf {
    if let Some(stripped) = input.strip_prefix("~/") {
        return home_dir().join(stripped);
    }
    PathBuf::from(input)
}

fn home_dir() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub old: Configuration,
    pub new: Configuration,
}

pub type ConfigEdit = Box<dyn FnOnce(&mut Configuration) + Send>;

/// Owner of the single configuration record.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self) -> Configuration;

    async fn set(&self, config: Configuration) -> Result<()>;

    /// Read-modify-write of the whole record; fields the edit leaves alone are kept.
    async fn update(&self, edit: ConfigEdit) -> Result<Configuration>;

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange>;
}

/// JSON file backed store. Edits made by other processes (the CLI) are picked
/// up by [`FileConfigStore::spawn_watcher`] and before every `update`.
pub struct FileConfigStore {
    path: PathBuf,
    current: RwLock<Configuration>,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<ConfigChange>,
}

impl FileConfigStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let existed = path.exists();
        let config = load_or_default(&path)?;
        if !existed {
            save(&path, &config)?;
            info!(path = %path.display(), "created default configuration");
        }
        let (changes, _) = broadcast::channel(16);
        Ok(Self {
            path,
            current: RwLock::new(config),
            write_lock: Mutex::new(()),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file; returns true when it differed from the cached record.
    pub async fn reload(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        self.reload_locked().await
    }

    async fn reload_locked(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let on_disk = load_from_path(&self.path)?;
        Ok(self.replace(on_disk).await)
    }

    async fn replace(&self, new: Configuration) -> bool {
        let mut current = self.current.write().await;
        if *current == new {
            return false;
        }
        let old = std::mem::replace(&mut *current, new.clone());
        drop(current);
        debug!("configuration changed");
        let _ = self.changes.send(ConfigChange { old, new });
        true
    }

    pub fn spawn_watcher(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.reload().await {
                    Ok(true) => info!(path = %self.path.display(), "configuration reloaded"),
                    Ok(false) => {}
                    Err(err) => warn!(?err, "failed to reload configuration"),
                }
            }
        })
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self) -> Configuration {
        self.current.read().await.clone()
    }

    async fn set(&self, mut config: Configuration) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        config.normalize();
        save(&self.path, &config)?;
        self.replace(config).await;
        Ok(())
    }

    async fn update(&self, edit: ConfigEdit) -> Result<Configuration> {
        let _guard = self.write_lock.lock().await;
        if let Err(err) = self.reload_locked().await {
            warn!(?err, "using cached configuration for update");
        }
        let mut config = self.current.read().await.clone();
        edit(&mut config);
        config.normalize();
        save(&self.path, &config)?;
        self.replace(config.clone()).await;
        Ok(config)
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Configuration {
        Configuration {
            panel_url: "https://ql.example".to_string(),
            client_id: "a".to_string(),
            client_secret: "b".to_string(),
            ..Configuration::default()
        }
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"panel_url":" https://ql.example/ ","auto_sync":false}"#).unwrap();

        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.panel_url, "https://ql.example/");
        assert_eq!(cfg.panel_base(), "https://ql.example");
        assert!(!cfg.auto_sync);
        assert_eq!(cfg.variable_name, DEFAULT_VARIABLE_NAME);
        assert_eq!(cfg.sync_interval_minutes, DEFAULT_SYNC_INTERVAL_MINUTES);
        assert!(cfg.allow_implicit_create);
        assert!(cfg.last_sync_at.is_none());
    }

    #[test]
    fn cookie_source_is_tagged_by_kind() {
        let cfg: Configuration =
            serde_json::from_str(r#"{"cookie_source":{"kind":"firefox","path":"/tmp/c.sqlite"}}"#)
                .unwrap();
        assert_eq!(
            cfg.cookie_source,
            CookieSource::Firefox {
                path: PathBuf::from("/tmp/c.sqlite")
            }
        );
    }

    #[test]
    fn interval_is_clamped_to_supported_range() {
        let mut cfg = complete();
        cfg.sync_interval_minutes = 0;
        assert_eq!(cfg.effective_interval_minutes(), 1);
        cfg.sync_interval_minutes = -5;
        assert_eq!(cfg.effective_interval_minutes(), 1);
        cfg.sync_interval_minutes = 30;
        assert_eq!(cfg.effective_interval_minutes(), 30);
        cfg.sync_interval_minutes = i64::MAX;
        assert_eq!(
            cfg.effective_interval_minutes(),
            MAX_SYNC_INTERVAL_MINUTES as u64
        );
    }

    #[test]
    fn validate_lists_every_missing_field() {
        let cfg = Configuration {
            variable_name: " ".to_string(),
            ..Configuration::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingFields(vec![
                "panel URL",
                "client ID",
                "client secret",
                "variable name"
            ])
        );
        assert_eq!(
            err.to_string(),
            "missing required settings: panel URL, client ID, client secret, variable name"
        );
    }

    #[test]
    fn validate_rejects_bad_url_and_interval() {
        let mut cfg = complete();
        assert!(cfg.validate().is_ok());

        cfg.panel_url = "ql.example".to_string();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidPanelUrl("ql.example".to_string()))
        );

        let mut cfg = complete();
        cfg.sync_interval_minutes = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidInterval(0)));
        cfg.sync_interval_minutes = i64::MAX;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidInterval(i64::MAX)));
        cfg.auto_sync = false;
        assert!(cfg.validate().is_ok());
    }

    #[tokio::test]
    async fn open_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::open(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(store.get().await, Configuration::default());
    }

    #[tokio::test]
    async fn update_preserves_other_fields_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save(&path, &complete()).unwrap();
        let store = FileConfigStore::open(path.clone()).unwrap();
        let mut changes = store.subscribe();

        let at = Utc::now();
        let updated = store
            .update(Box::new(move |cfg| cfg.last_sync_at = Some(at)))
            .await
            .unwrap();
        assert_eq!(updated.last_sync_at, Some(at));
        assert_eq!(updated.client_secret, "b");

        let change = changes.recv().await.unwrap();
        assert!(change.old.last_sync_at.is_none());
        assert_eq!(change.new.last_sync_at, Some(at));

        let on_disk = load_from_path(&path).unwrap();
        assert_eq!(on_disk, updated);
    }

    #[tokio::test]
    async fn update_merges_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save(&path, &complete()).unwrap();
        let store = FileConfigStore::open(path.clone()).unwrap();

        let mut edited = complete();
        edited.sync_interval_minutes = 15;
        save(&path, &edited).unwrap();

        let at = Utc::now();
        let updated = store
            .update(Box::new(move |cfg| cfg.last_sync_at = Some(at)))
            .await
            .unwrap();
        assert_eq!(updated.sync_interval_minutes, 15);
        assert_eq!(updated.last_sync_at, Some(at));
    }

    #[tokio::test]
    async fn reload_detects_only_real_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save(&path, &complete()).unwrap();
        let store = FileConfigStore::open(path.clone()).unwrap();
        let mut changes = store.subscribe();

        assert!(!store.reload().await.unwrap());

        let mut edited = complete();
        edited.auto_sync = false;
        save(&path, &edited).unwrap();
        assert!(store.reload().await.unwrap());

        let change = changes.recv().await.unwrap();
        assert!(change.old.auto_sync);
        assert!(!change.new.auto_sync);
    }

    #[test]
    fn concurrent_saves_never_leave_a_torn_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut cfg = complete();
                    cfg.sync_interval_minutes = n + 1;
                    for _ in 0..25 {
                        save(&path, &cfg).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let cfg = load_from_path(&path).unwrap();
        assert!((1..=8).contains(&cfg.sync_interval_minutes));
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("config.json")]);
    }

    #[tokio::test]
    async fn set_normalizes_persists_and_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save(&path, &complete()).unwrap();
        let store = FileConfigStore::open(path.clone()).unwrap();
        let mut changes = store.subscribe();

        let mut edited = complete();
        edited.panel_url = "  https://ql.example/ ".to_string();
        edited.client_id = " a2 ".to_string();
        store.set(edited).await.unwrap();

        let stored = store.get().await;
        assert_eq!(stored.panel_url, "https://ql.example/");
        assert_eq!(stored.client_id, "a2");
        assert_eq!(load_from_path(&path).unwrap(), stored);

        let change = changes.recv().await.unwrap();
        assert_eq!(change.old.client_id, "a");
        assert_eq!(change.new, stored);
        assert!(changes.try_recv().is_err());

        store.set(stored.clone()).await.unwrap();
        assert!(matches!(
            changes.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
