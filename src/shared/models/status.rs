use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages accepted by the daemon's control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ControlMessage {
    #[serde(rename = "syncNow")]
    SyncNow,
}

/// Reply to a manual sync: `{ success, timestamp?, error? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    /// Milliseconds since the unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResponse {
    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            timestamp: Some(at.timestamp_millis()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub badge: Badge,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub auto_sync: bool,
    pub sync_interval_minutes: i64,
    pub sync_in_flight: bool,
}
