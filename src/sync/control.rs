use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::service::{SyncService, Trigger};
use super::status::SharedBadge;
use crate::shared::models::{ControlMessage, StatusSnapshot, SyncResponse};

#[derive(Clone)]
pub struct ControlState {
    pub service: Arc<SyncService>,
    pub badge: Arc<SharedBadge>,
}

#[derive(Debug)]
pub enum ControlError {
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ControlError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

pub fn create_router(state: ControlState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/status", get(status))
        .route("/actions", post(actions))
        .with_state(state);

    Router::new()
        .nest("/api/v0", api_routes)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(listener: TcpListener, state: ControlState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("control API listening on http://{}", addr);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn version() -> Json<Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "api": "v0"
    }))
}

async fn status(State(state): State<ControlState>) -> Json<StatusSnapshot> {
    let config = state.service.store().get().await;
    Json(StatusSnapshot {
        badge: state.badge.snapshot(),
        last_sync_at: config.last_sync_at,
        auto_sync: config.auto_sync,
        sync_interval_minutes: config.sync_interval_minutes,
        sync_in_flight: state.service.is_running(),
    })
}

async fn actions(
    State(state): State<ControlState>,
    Json(body): Json<Value>,
) -> Result<Json<SyncResponse>, ControlError> {
    let message: ControlMessage = serde_json::from_value(body)
        .map_err(|e| ControlError::BadRequest(format!("unsupported action: {e}")))?;

    match message {
        ControlMessage::SyncNow => Ok(Json(state.service.run(Trigger::Manual).await)),
    }
}
