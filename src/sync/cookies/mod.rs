//! Session cookie lookup against the browser's cookie store.

mod firefox;
mod netscape;

pub use firefox::FirefoxCookieDb;
pub use netscape::NetscapeCookieFile;

use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{Result, SyncError};
use crate::shared::models::constants::{SESSION_KEY_COOKIE, SESSION_PIN_COOKIE};
use crate::shared::CookieSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercase, without the leading dot.
    pub domain: String,
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    /// Unix seconds; `None` for session cookies.
    pub expires_at: Option<i64>,
}

impl Cookie {
    /// Whether a browser would send this cookie with a request to `url` at `now`.
    pub fn matches(&self, url: &Url, now: i64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.secure && url.scheme() != "https" {
            return false;
        }
        if self.expires_at.is_some_and(|expiry| expiry <= now) {
            return false;
        }
        domain_matches(&host.to_ascii_lowercase(), &self.domain, self.host_only)
            && path_matches(url.path(), &self.path)
    }
}

fn domain_matches(host: &str, domain: &str, host_only: bool) -> bool {
    if host == domain {
        return true;
    }
    !host_only && host.ends_with(domain) && host[..host.len() - domain.len()].ends_with('.')
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if cookie_path.is_empty() || cookie_path == "/" || request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Picks the cookie a browser would send for `url`; the most specific path wins.
pub fn select_cookie(
    cookies: impl IntoIterator<Item = Cookie>,
    url: &Url,
    name: &str,
    now: i64,
) -> Option<Cookie> {
    cookies
        .into_iter()
        .filter(|cookie| cookie.name == name && cookie.matches(url, now))
        .max_by_key(|cookie| cookie.path.len())
}

pub(crate) fn normalize_domain(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[async_trait]
pub trait CookieJar: Send + Sync {
    async fn get_cookie(&self, url: &Url, name: &str) -> anyhow::Result<Option<Cookie>>;
}

pub trait LoginOpener: Send + Sync {
    fn open_url(&self, url: &Url);
}

pub fn cookie_jar_for(source: &CookieSource) -> Arc<dyn CookieJar> {
    match source {
        CookieSource::Netscape { path } => Arc::new(NetscapeCookieFile::new(path.clone())),
        CookieSource::Firefox { path } => Arc::new(FirefoxCookieDb::new(path.clone())),
    }
}

/// Opens pages in the desktop's default browser.
pub struct SystemBrowser;

impl LoginOpener for SystemBrowser {
    fn open_url(&self, url: &Url) {
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]);
            cmd
        } else {
            Command::new("xdg-open")
        };

        match command.arg(url.as_str()).spawn() {
            Ok(mut child) => {
                info!(%url, "opened login page");
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(err) => warn!(%url, ?err, "failed to open login page"),
        }
    }
}

pub struct CookieExtractor {
    jar: Arc<dyn CookieJar>,
    opener: Arc<dyn LoginOpener>,
}

impl CookieExtractor {
    pub fn new(jar: Arc<dyn CookieJar>, opener: Arc<dyn LoginOpener>) -> Self {
        Self { jar, opener }
    }

    /// Returns `pt_key=…;pt_pin=…;` or fails with `Unauthenticated` after
    /// opening the login page.
    pub async fn extract(&self, target_url: &str) -> Result<String> {
        let url = Url::parse(target_url)
            .map_err(|e| SyncError::Misconfigured(format!("invalid target URL '{target_url}': {e}")))?;

        let key = self.lookup(&url, SESSION_KEY_COOKIE).await?;
        let pin = self.lookup(&url, SESSION_PIN_COOKIE).await?;

        match (key, pin) {
            (Some(key), Some(pin)) => {
                debug!(pin = %pin, "session cookies found");
                Ok(format!(
                    "{SESSION_KEY_COOKIE}={key};{SESSION_PIN_COOKIE}={pin};"
                ))
            }
            _ => {
                self.opener.open_url(&url);
                Err(SyncError::Unauthenticated(format!(
                    "{SESSION_KEY_COOKIE}/{SESSION_PIN_COOKIE} cookies are missing or empty; log in at {url} first"
                )))
            }
        }
    }

    async fn lookup(&self, url: &Url, name: &str) -> Result<Option<String>> {
        let cookie = self
            .jar
            .get_cookie(url, name)
            .await
            .map_err(|e| SyncError::Cookie(format!("{e:#}")))?;
        Ok(cookie.map(|c| c.value).filter(|value| !value.is_empty()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct StaticJar {
        cookies: HashMap<String, String>,
    }

    impl StaticJar {
        pub(crate) fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                cookies: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl CookieJar for StaticJar {
        async fn get_cookie(&self, url: &Url, name: &str) -> anyhow::Result<Option<Cookie>> {
            Ok(self.cookies.get(name).map(|value| Cookie {
                name: name.to_string(),
                value: value.clone(),
                domain: url.host_str().unwrap_or_default().to_string(),
                host_only: true,
                path: "/".to_string(),
                secure: false,
                expires_at: None,
            }))
        }
    }

    #[derive(Default)]
    pub(crate) struct CountingOpener {
        pub(crate) opened: AtomicUsize,
    }

    impl CountingOpener {
        pub(crate) fn count(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    impl LoginOpener for CountingOpener {
        fn open_url(&self, _url: &Url) {
            self.opened.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct BrokenJar;

    #[async_trait]
    impl CookieJar for BrokenJar {
        async fn get_cookie(&self, _url: &Url, _name: &str) -> anyhow::Result<Option<Cookie>> {
            Err(anyhow::anyhow!("database is locked"))
        }
    }

    const TARGET: &str = "https://bean.m.jd.com/bean/signIndex.action";

    fn cookie(domain: &str, host_only: bool, path: &str) -> Cookie {
        Cookie {
            name: "pt_key".to_string(),
            value: "v".to_string(),
            domain: domain.to_string(),
            host_only,
            path: path.to_string(),
            secure: false,
            expires_at: None,
        }
    }

    #[test]
    fn domain_cookie_matches_subdomains_only_on_label_boundary() {
        let url = Url::parse(TARGET).unwrap();
        assert!(cookie("jd.com", false, "/").matches(&url, 0));
        assert!(!cookie("jd.com", true, "/").matches(&url, 0));
        assert!(!cookie("d.com", false, "/").matches(&url, 0));
        assert!(cookie("bean.m.jd.com", true, "/").matches(&url, 0));
    }

    #[test]
    fn path_secure_and_expiry_rules() {
        let url = Url::parse(TARGET).unwrap();
        assert!(cookie("jd.com", false, "/bean").matches(&url, 0));
        assert!(!cookie("jd.com", false, "/be").matches(&url, 0));
        assert!(!cookie("jd.com", false, "/other").matches(&url, 0));

        let http = Url::parse("http://bean.m.jd.com/").unwrap();
        let mut secure = cookie("jd.com", false, "/");
        secure.secure = true;
        assert!(secure.matches(&url, 0));
        assert!(!secure.matches(&http, 0));

        let mut expired = cookie("jd.com", false, "/");
        expired.expires_at = Some(100);
        assert!(expired.matches(&url, 99));
        assert!(!expired.matches(&url, 100));
    }

    #[test]
    fn select_prefers_longest_path() {
        let url = Url::parse(TARGET).unwrap();
        let mut specific = cookie("jd.com", false, "/bean/");
        specific.value = "specific".to_string();
        let picked = select_cookie(vec![cookie("jd.com", false, "/"), specific], &url, "pt_key", 0)
            .unwrap();
        assert_eq!(picked.value, "specific");
    }

    #[tokio::test]
    async fn extract_formats_key_then_pin() {
        let opener = Arc::new(CountingOpener::default());
        let extractor = CookieExtractor::new(
            Arc::new(StaticJar::new(&[("pt_pin", "123"), ("pt_key", "XYZ")])),
            opener.clone(),
        );
        let value = extractor.extract(TARGET).await.unwrap();
        assert_eq!(value, "pt_key=XYZ;pt_pin=123;");
        assert_eq!(opener.count(), 0);
    }

    #[tokio::test]
    async fn empty_cookie_opens_login_once() {
        let opener = Arc::new(CountingOpener::default());
        let extractor = CookieExtractor::new(
            Arc::new(StaticJar::new(&[("pt_key", ""), ("pt_pin", "123")])),
            opener.clone(),
        );
        let err = extractor.extract(TARGET).await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated(_)));
        assert_eq!(opener.count(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_not_treated_as_logged_out() {
        let opener = Arc::new(CountingOpener::default());
        let extractor = CookieExtractor::new(Arc::new(BrokenJar), opener.clone());
        let err = extractor.extract(TARGET).await.unwrap_err();
        assert!(matches!(err, SyncError::Cookie(msg) if msg.contains("locked")));
        assert_eq!(opener.count(), 0);
    }
}
