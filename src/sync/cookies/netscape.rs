use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{trace, warn};
use url::Url;

use super::{normalize_domain, select_cookie, Cookie, CookieJar};

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Cookie jar backed by a Netscape `cookies.txt` export, re-read on every lookup
/// so a fresh export is picked up without restarting.
pub struct NetscapeCookieFile {
    path: PathBuf,
}

impl NetscapeCookieFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CookieJar for NetscapeCookieFile {
    async fn get_cookie(&self, url: &Url, name: &str) -> Result<Option<Cookie>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "cookie file not found");
                return Ok(None);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", self.path.display()));
            }
        };

        let cookies = parse_cookies_txt(&contents);
        trace!(count = cookies.len(), path = %self.path.display(), "parsed cookie file");
        Ok(select_cookie(cookies, url, name, chrono::Utc::now().timestamp()))
    }
}

pub fn parse_cookies_txt(contents: &str) -> Vec<Cookie> {
    contents
        .lines()
        .filter_map(|raw| {
            let line = raw.trim_end_matches('\r');
            let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
                Some(rest) => rest,
                None if line.starts_with('#') || line.trim().is_empty() => return None,
                None => line,
            };
            parse_line(line)
        })
        .collect()
}

// domain \t include_subdomains \t path \t secure \t expiry \t name \t value
fn parse_line(line: &str) -> Option<Cookie> {
    let fields: Vec<&str> = line.splitn(7, '\t').collect();
    if fields.len() != 7 {
        return None;
    }
    let raw_domain = fields[0].trim();
    let include_subdomains = fields[1].eq_ignore_ascii_case("TRUE");
    let expiry: i64 = fields[4].trim().parse().ok()?;

    Some(Cookie {
        name: fields[5].to_string(),
        value: fields[6].to_string(),
        domain: normalize_domain(raw_domain),
        host_only: !include_subdomains && !raw_domain.starts_with('.'),
        path: fields[2].to_string(),
        secure: fields[3].eq_ignore_ascii_case("TRUE"),
        expires_at: (expiry > 0).then_some(expiry),
    })
}
