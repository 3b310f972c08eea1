use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const API_KEY: &str = "test-key";

#[derive(Default)]
pub struct Recorded {
    pub batches: Vec<Vec<String>>,
    pub reports: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct Backend {
    pub recorded: Arc<Mutex<Recorded>>,
    pub reject_reports: bool,
}

pub struct RunningBackend {
    pub addr: SocketAddr,
    pub recorded: Arc<Mutex<Recorded>>,
    handle: JoinHandle<()>,
}

impl RunningBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for RunningBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn verdict(text: &str) -> Value {
    if text.contains("scum") || text.contains("trash") {
        json!({"label": "HATE", "score": 0.91})
    } else {
        json!({"label": "NOT_HATE", "score": 0.04})
    }
}

fn unauthorized(headers: &HeaderMap) -> Option<Response> {
    match headers.get("x-api-key").and_then(|value| value.to_str().ok()) {
        Some(API_KEY) => None,
        _ => Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "missing or invalid api key"})),
            )
                .into_response(),
        ),
    }
}

async fn predict(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(denied) = unauthorized(&headers) {
        return denied;
    }
    let text = body["text"].as_str().unwrap_or_default();
    Json(verdict(text)).into_response()
}

async fn predict_batch(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = unauthorized(&headers) {
        return denied;
    }
    let texts: Vec<String> = body["texts"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let results: Vec<Value> = texts.iter().map(|text| verdict(text)).collect();
    backend.recorded.lock().batches.push(texts);
    Json(json!({ "results": results })).into_response()
}

async fn report(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = unauthorized(&headers) {
        return denied;
    }
    if backend.reject_reports {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "report store offline"})),
        )
            .into_response();
    }
    backend.recorded.lock().reports.push(body);
    Json(json!({"status": "ok"})).into_response()
}

pub async fn spawn_backend(backend: Backend) -> RunningBackend {
    let recorded = backend.recorded.clone();
    let app = Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/report", post(report))
        .with_state(backend);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    RunningBackend {
        addr,
        recorded,
        handle,
    }
}
