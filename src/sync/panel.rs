use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::error::{Result, SyncError};
use crate::shared::models::constants::HTTP_TIMEOUT_SECS;
use crate::shared::models::{ApiEnvelope, CreateEnvRequest, EnvId, RemoteEnv, TokenData, UpdateEnvRequest};

pub fn build_http_client() -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(concat!("qlsync/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .context("failed to build panel reqwest client")
}

/// Client for the panel's `/open` API.
pub struct PanelClient {
    http: Client,
    base_url: String,
}

impl PanelClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange client credentials for a bearer token.
    pub async fn fetch_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let url = self.url("/open/auth/token");
        trace!(%url, "requesting panel token");

        let response = self
            .http
            .get(&url)
            .query(&[("client_id", client_id), ("client_secret", client_secret)])
            .send()
            .await?;
        let envelope: ApiEnvelope<TokenData> = read_envelope(response, "token").await?;

        if !envelope.is_success() {
            return Err(SyncError::RemoteAuth(
                envelope.message_or("failed to obtain panel token"),
            ));
        }
        match envelope.data.map(|data| data.token) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(SyncError::RemoteAuth(
                "panel returned no token".to_string(),
            )),
        }
    }

    pub async fn list_envs(&self, token: &str) -> Result<Vec<RemoteEnv>> {
        let url = self.url("/open/envs");
        trace!(%url, "listing environment variables");

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let envelope: ApiEnvelope<Vec<RemoteEnv>> =
            read_envelope(response, "environment list").await?;
        if !envelope.is_success() {
            return Err(SyncError::RemoteState(
                envelope.message_or("failed to list environment variables"),
            ));
        }
        let envs = envelope.data.unwrap_or_default();
        debug!(count = envs.len(), "fetched environment variables");
        Ok(envs)
    }

    pub async fn create_env(&self, token: &str, env: &CreateEnvRequest) -> Result<()> {
        let response = self
            .http
            .post(self.url("/open/envs"))
            .bearer_auth(token)
            .json(&[env])
            .send()
            .await?;
        expect_success(response, "create", "failed to create environment variable").await
    }

    pub async fn update_env(&self, token: &str, env: &UpdateEnvRequest) -> Result<()> {
        let response = self
            .http
            .put(self.url("/open/envs"))
            .bearer_auth(token)
            .json(env)
            .send()
            .await?;
        expect_success(response, "update", "failed to update environment variable").await
    }

    pub async fn enable_envs(&self, token: &str, ids: &[EnvId]) -> Result<()> {
        let response = self
            .http
            .put(self.url("/open/envs/enable"))
            .bearer_auth(token)
            .json(ids)
            .send()
            .await?;
        expect_success(response, "enable", "failed to enable environment variable").await
    }
}

async fn read_envelope<T: DeserializeOwned>(response: Response, what: &str) -> Result<ApiEnvelope<T>> {
    let status = response.status();
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        SyncError::Transport(format!(
            "unexpected {what} response from panel (HTTP {status}): {e}"
        ))
    })
}

async fn expect_success(response: Response, what: &str, fallback: &str) -> Result<()> {
    let envelope: ApiEnvelope<serde_json::Value> = read_envelope(response, what).await?;
    if envelope.is_success() {
        Ok(())
    } else {
        Err(SyncError::RemoteState(envelope.message_or(fallback)))
    }
}
