//! In-process panel stub used by the sync tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, Clone)]
pub struct StubBehavior {
    pub token_code: i64,
    pub token_message: Option<String>,
    pub token_raw_body: Option<String>,
    pub token_delay: Option<Duration>,
    pub envs: Vec<Value>,
    pub list_code: i64,
    pub write_code: i64,
    pub write_message: Option<String>,
    pub enable_code: i64,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            token_code: 200,
            token_message: None,
            token_raw_body: None,
            token_delay: None,
            envs: Vec::new(),
            list_code: 200,
            write_code: 200,
            write_message: None,
            enable_code: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    behavior: StubBehavior,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

pub struct StubPanel {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubPanel {
    pub async fn spawn(behavior: StubBehavior) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            behavior,
            calls: calls.clone(),
        };
        let app = Router::new()
            .route("/open/auth/token", get(token))
            .route("/open/envs", get(list_envs).post(write_env).put(write_env))
            .route("/open/envs/enable", put(enable_envs))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });

        Self {
            base_url: format!("http://{addr}"),
            calls,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_to(&self, method: &str, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.method == method && call.path == path)
            .collect()
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn record(
    state: &StubState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    query: HashMap<String, String>,
    body: Value,
) {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.calls.lock().await.push(RecordedCall {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body,
    });
}

fn envelope(code: i64, data: Value, message: Option<&str>) -> Json<Value> {
    match message {
        Some(message) => Json(json!({"code": code, "data": data, "message": message})),
        None => Json(json!({"code": code, "data": data})),
    }
}

async fn token(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    record(&state, method, &uri, &headers, query, Value::Null).await;
    if let Some(delay) = state.behavior.token_delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(raw) = state.behavior.token_raw_body.clone() {
        return raw.into_response();
    }
    let behavior = &state.behavior;
    let data = if behavior.token_code == 200 {
        json!({"token": "tok1", "token_type": "Bearer", "expiration": 1_700_000_000})
    } else {
        Value::Null
    };
    envelope(behavior.token_code, data, behavior.token_message.as_deref()).into_response()
}

async fn list_envs(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Json<Value> {
    record(&state, method, &uri, &headers, HashMap::new(), Value::Null).await;
    let behavior = &state.behavior;
    envelope(behavior.list_code, Value::Array(behavior.envs.clone()), None)
}

async fn write_env(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&state, method, &uri, &headers, HashMap::new(), body.clone()).await;
    let behavior = &state.behavior;
    envelope(behavior.write_code, body, behavior.write_message.as_deref())
}

async fn enable_envs(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&state, method, &uri, &headers, HashMap::new(), body).await;
    envelope(state.behavior.enable_code, Value::Null, None)
}

pub fn test_config(panel_url: &str) -> crate::shared::Configuration {
    crate::shared::Configuration {
        panel_url: panel_url.to_string(),
        client_id: "a".to_string(),
        client_secret: "b".to_string(),
        variable_name: "JD_COOKIE".to_string(),
        auto_sync: true,
        sync_interval_minutes: 60,
        ..crate::shared::Configuration::default()
    }
}

/// File-backed store in a temp dir; keep the returned dir alive for the test.
pub fn file_store(
    config: &crate::shared::Configuration,
) -> (tempfile::TempDir, Arc<crate::shared::FileConfigStore>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    crate::shared::config::save(&path, config).unwrap();
    let store = crate::shared::FileConfigStore::open(path).unwrap();
    (dir, Arc::new(store))
}
