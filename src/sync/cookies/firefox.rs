use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::{debug, warn};
use url::Url;

use super::{normalize_domain, select_cookie, Cookie, CookieJar};

// Expiry values above this are milliseconds (newer Firefox releases).
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Cookie jar backed by a Firefox profile's `cookies.sqlite`.
pub struct FirefoxCookieDb {
    path: PathBuf,
}

impl FirefoxCookieDb {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CookieJar for FirefoxCookieDb {
    async fn get_cookie(&self, url: &Url, name: &str) -> Result<Option<Cookie>> {
        let path = self.path.clone();
        let lookup = name.to_string();
        let cookies = tokio::task::spawn_blocking(move || read_cookies(&path, &lookup))
            .await
            .map_err(|e| anyhow!("cookie reader task failed: {e}"))??;
        Ok(select_cookie(cookies, url, name, chrono::Utc::now().timestamp()))
    }
}

/// The browser keeps the database locked while running, so a snapshot
/// (plus its write-ahead log) is copied aside and read from there.
fn read_cookies(db_path: &Path, name: &str) -> Result<Vec<Cookie>> {
    if !db_path.exists() {
        warn!(path = %db_path.display(), "firefox cookie database not found");
        return Ok(Vec::new());
    }

    let snapshot_dir = tempfile::tempdir().context("create snapshot directory")?;
    let snapshot = snapshot_dir.path().join("cookies.sqlite");
    std::fs::copy(db_path, &snapshot)
        .with_context(|| format!("copy {}", db_path.display()))?;

    let wal = with_suffix(db_path, "-wal");
    if wal.exists() {
        std::fs::copy(&wal, with_suffix(&snapshot, "-wal"))
            .with_context(|| format!("copy {}", wal.display()))?;
    }

    let conn = Connection::open(&snapshot)
        .with_context(|| format!("open snapshot of {}", db_path.display()))?;
    let mut stmt = conn
        .prepare(
            "SELECT name, value, host, path, isSecure, expiry FROM moz_cookies WHERE name = ?1",
        )
        .context("query moz_cookies")?;

    let rows = stmt
        .query_map(params![name], |row| {
            let host: String = row.get(2)?;
            let expiry: i64 = row.get(5)?;
            Ok(Cookie {
                name: row.get(0)?,
                value: row.get(1)?,
                host_only: !host.starts_with('.'),
                domain: normalize_domain(&host),
                path: row.get(3)?,
                secure: row.get::<_, i64>(4)? != 0,
                expires_at: normalize_expiry(expiry),
            })
        })
        .context("read moz_cookies")?;

    let cookies = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    debug!(count = cookies.len(), name, "read firefox cookies");
    Ok(cookies)
}

fn normalize_expiry(raw: i64) -> Option<i64> {
    match raw {
        value if value <= 0 => None,
        value if value > MILLIS_THRESHOLD => Some(value / 1000),
        value => Some(value),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}
