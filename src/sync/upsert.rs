use chrono::Local;
use tracing::{debug, info};

use super::error::{Result, SyncError};
use super::panel::PanelClient;
use crate::shared::models::{CreateEnvRequest, EnvId, UpdateEnvRequest};

/// How a missing variable is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPolicy {
    /// Create the variable when absent, otherwise update it.
    CreateOrUpdate,
    /// The variable must exist; update it and then enable it.
    UpdateAndEnable,
}

impl UpsertPolicy {
    pub fn from_flag(allow_implicit_create: bool) -> Self {
        if allow_implicit_create {
            UpsertPolicy::CreateOrUpdate
        } else {
            UpsertPolicy::UpdateAndEnable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated { id: EnvId },
    UpdatedAndEnabled { id: EnvId },
}

fn remarks(action: &str) -> String {
    format!(
        "{action} by qlsync at {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Make the panel hold `name = value`. The id is resolved by name on every
/// call; nothing is cached between syncs.
pub async fn upsert_env(
    panel: &PanelClient,
    token: &str,
    name: &str,
    value: &str,
    policy: UpsertPolicy,
) -> Result<UpsertOutcome> {
    let envs = panel.list_envs(token).await?;
    let existing = envs.into_iter().find(|env| env.name == name);

    match (existing, policy) {
        (None, UpsertPolicy::CreateOrUpdate) => {
            debug!(name, "variable not found; creating");
            panel
                .create_env(
                    token,
                    &CreateEnvRequest {
                        name: name.to_string(),
                        value: value.to_string(),
                        remarks: remarks("Created"),
                    },
                )
                .await?;
            info!(name, "created environment variable");
            Ok(UpsertOutcome::Created)
        }
        (None, UpsertPolicy::UpdateAndEnable) => Err(SyncError::RemoteState(format!(
            "environment variable {name} does not exist; create it in the panel first"
        ))),
        (Some(env), policy) => {
            let id = env.id;
            panel
                .update_env(
                    token,
                    &UpdateEnvRequest {
                        name: name.to_string(),
                        value: value.to_string(),
                        id: id.clone(),
                        remarks: remarks("Updated"),
                    },
                )
                .await?;
            info!(name, %id, "updated environment variable");

            if policy == UpsertPolicy::CreateOrUpdate {
                return Ok(UpsertOutcome::Updated { id });
            }
            panel.enable_envs(token, std::slice::from_ref(&id)).await?;
            debug!(name, %id, "enabled environment variable");
            Ok(UpsertOutcome::UpdatedAndEnabled { id })
        }
    }
}
