use serde::{Deserialize, Serialize};
use std::fmt;

use super::constants::PANEL_SUCCESS_CODE;

/// Response wrapper shared by every panel endpoint: `{ code, data, message }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == PANEL_SUCCESS_CODE
    }

    /// Server supplied message, or `fallback` when the panel sent none.
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    pub token: String,
}

/// Panels before 2.12 key variables by a string `_id`; later ones use a numeric `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvId::Numeric(id) => write!(f, "{id}"),
            EnvId::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEnv {
    #[serde(alias = "_id")]
    pub id: EnvId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateEnvRequest {
    pub name: String,
    pub value: String,
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateEnvRequest {
    pub name: String,
    pub value: String,
    pub id: EnvId,
    pub remarks: String,
}
