//! In-process stand-in for the hub control API, used by tests.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    net::IpAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::config::{HubConfig, ServiceConfig};
use crate::state::AppState;

/// App state wired to a hub at `base_url` with short timeouts. Loopback is a
/// trusted proxy so router tests can pose as forwarded viewers.
pub fn test_state(base_url: &str, admin_token: Option<&str>) -> AppState {
    AppState::new(ServiceConfig {
        hub: HubConfig {
            base_url: base_url.to_string(),
            api_key: None,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
        },
        workspace_url: "https://hub.example/".to_string(),
        notebooks_path: PathBuf::from("/var/lib/ckan/notebook"),
        formats: vec!["ipynb".to_string()],
        home_url: "/".to_string(),
        trusted_proxies: vec![IpAddr::from([127, 0, 0, 1])],
        admin_token: admin_token.map(str::to_string),
    })
    .expect("test state")
}

#[derive(Clone, Copy)]
pub enum LeaseMode {
    Users,
    Exhausted,
    Broken,
    Rejected,
    Slow,
}

#[derive(Clone, Debug)]
pub struct Call {
    pub path: &'static str,
    pub body: Value,
    pub api_key: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Clone)]
struct Shared {
    calls: Arc<Mutex<Vec<Call>>>,
    lease: Arc<Mutex<LeaseMode>>,
    copy_ok: Arc<AtomicBool>,
    update_ok: Arc<AtomicBool>,
    next_user: Arc<AtomicUsize>,
    write_delay_ms: Arc<AtomicU64>,
}

pub struct FakeHub {
    pub base_url: String,
    shared: Shared,
}

impl FakeHub {
    pub async fn start() -> Self {
        let shared = Shared {
            calls: Arc::new(Mutex::new(Vec::new())),
            lease: Arc::new(Mutex::new(LeaseMode::Users)),
            copy_ok: Arc::new(AtomicBool::new(true)),
            update_ok: Arc::new(AtomicBool::new(true)),
            next_user: Arc::new(AtomicUsize::new(1)),
            write_delay_ms: Arc::new(AtomicU64::new(0)),
        };
        let app = Router::new()
            .route("/get_user", get(get_user))
            .route("/copy_notebook", post(copy_notebook))
            .route("/update_env", post(update_env))
            .route("/restart_jupyterhub", post(restart))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake hub");
        let addr = listener.local_addr().expect("fake hub addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            shared,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|call| call.path == path).count()
    }

    pub fn set_lease(&self, mode: LeaseMode) {
        *self.shared.lease.lock().expect("lease lock") = mode;
    }

    pub fn set_copy_ok(&self, ok: bool) {
        self.shared.copy_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_update_ok(&self, ok: bool) {
        self.shared.update_ok.store(ok, Ordering::SeqCst);
    }

    /// Holds copy and update answers back by `delay`.
    pub fn set_write_delay(&self, delay: Duration) {
        self.shared
            .write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

fn record(shared: &Shared, path: &'static str, headers: &HeaderMap, body: &[u8]) -> Value {
    let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    shared.calls.lock().expect("calls lock").push(Call {
        path,
        body: body.clone(),
        api_key: header("x-api-key"),
        content_type: header("content-type"),
    });
    body
}

async fn write_delay(shared: &Shared) {
    let delay = shared.write_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

async fn get_user(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    record(&shared, "get_user", &headers, &[]);
    let mode = *shared.lease.lock().expect("lease lock");
    match mode {
        LeaseMode::Users => {
            let n = shared.next_user.fetch_add(1, Ordering::SeqCst);
            Json(json!({ "success": true, "data": { "username": format!("guest-{n}") } }))
                .into_response()
        }
        LeaseMode::Exhausted => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "no free users" })),
        )
            .into_response(),
        LeaseMode::Broken => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        LeaseMode::Rejected => {
            Json(json!({ "success": false, "error": "pool locked" })).into_response()
        }
        LeaseMode::Slow => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK.into_response()
        }
    }
}

async fn copy_notebook(State(shared): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    record(&shared, "copy_notebook", &headers, &body);
    write_delay(&shared).await;
    if shared.copy_ok.load(Ordering::SeqCst) {
        Json(json!({ "success": true, "data": {} })).into_response()
    } else {
        Json(json!({ "success": false, "error": "notebook not found" })).into_response()
    }
}

async fn update_env(State(shared): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let body = record(&shared, "update_env", &headers, &body);
    write_delay(&shared).await;
    if !shared.update_ok.load(Ordering::SeqCst) {
        return Json(json!({ "success": false, "error": "container not running" }))
            .into_response();
    }
    let updated: Vec<String> = body
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    Json(json!({ "success": true, "data": { "updated": updated } })).into_response()
}

async fn restart(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    record(&shared, "restart_jupyterhub", &headers, &[]);
    Json(json!({ "success": true, "data": null })).into_response()
}
