//! Integration tests for the agenda HTTP server.
//!
//! Each test starts the router on an ephemeral port in front of an in-process
//! mock of the upstream contacts API and talks to it over real HTTP.

use agenda_core::{AgendaApi, AgendaConfig, StoreBackendKind};
use agenda_rpc::{start_server, ErrorResponse};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncBufReadExt;

// =============================================================================
// Mock upstream
// =============================================================================

struct MockUpstream {
    contacts: Vec<Value>,
    down: AtomicBool,
    requests: AtomicUsize,
}

async fn mock_contacts(
    State(mock): State<Arc<MockUpstream>>,
    Query(query): Query<HashMap<String, u64>>,
) -> impl IntoResponse {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    if mock.down.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new(), Json(json!([])));
    }

    let page = query.get("page").copied().unwrap_or(1).max(1) as usize;
    let size = query.get("pageSize").copied().unwrap_or(1000) as usize;
    let slice: Vec<Value> = mock
        .contacts
        .iter()
        .skip((page - 1) * size)
        .take(size)
        .cloned()
        .collect();

    let mut headers = HeaderMap::new();
    headers.insert(
        "total-count",
        HeaderValue::from(mock.contacts.len() as u64),
    );
    (StatusCode::OK, headers, Json(Value::Array(slice)))
}

async fn start_mock(count: usize) -> (Arc<MockUpstream>, SocketAddr) {
    let contacts = (1..=count)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("Contact {}", i),
                "email": format!("contact{}@example.com", i),
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-01T00:00:00Z"
            })
        })
        .collect();
    let mock = Arc::new(MockUpstream {
        contacts,
        down: AtomicBool::new(false),
        requests: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/api/v1/contacts", get(mock_contacts))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (mock, addr)
}

// =============================================================================
// Helpers
// =============================================================================

fn test_config(upstream: SocketAddr) -> AgendaConfig {
    let mut config = AgendaConfig::default();
    config.upstream.base_url = format!("http://{}", upstream);
    config.upstream.default_page_size = 2;
    config.upstream.request_timeout_ms = 2_000;
    config.resilience.max_attempts = 2;
    config.resilience.base_delay_ms = 1;
    config.resilience.max_delay_ms = 5;
    config.resilience.jitter = false;
    config.store.backend = StoreBackendKind::Memory;
    config
}

struct TestServer {
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(config: AgendaConfig) -> Self {
        let api = AgendaApi::builder(config).ephemeral(true).build().unwrap();
        let addr = start_server(api, "127.0.0.1", 0).await.unwrap();
        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client.post(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.client.put(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).send().await.unwrap()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (_mock, upstream) = start_mock(0).await;
    let server = TestServer::start(test_config(upstream)).await;

    let response = server.get("/health").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_contact_crud() {
    let (_mock, upstream) = start_mock(0).await;
    let server = TestServer::start(test_config(upstream)).await;

    let response = server
        .post(
            "/contacts",
            json!({"id": 10, "name": "Ada Lovelace", "email": "ada@example.com"}),
        )
        .await;
    assert_eq!(response.status(), 201);

    let fetched: Value = server.get("/contacts/10").await.json().await.unwrap();
    assert_eq!(fetched["name"], "Ada Lovelace");
    assert!(fetched["createdAt"].is_string());

    let response = server
        .put(
            "/contacts/10",
            json!({"id": 10, "name": "Countess of Lovelace", "phone": "+44 20 7946 0000"}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let updated: Value = server.get("/contacts/10").await.json().await.unwrap();
    assert_eq!(updated["name"], "Countess of Lovelace");
    assert_eq!(updated["createdAt"], fetched["createdAt"]);

    assert_eq!(server.delete("/contacts/10").await.status(), 204);

    let response = server.get("/contacts/10").await;
    assert_eq!(response.status(), 404);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.status, 404);
    assert_eq!(error.path, "/contacts/10");
}

#[tokio::test]
async fn test_duplicate_and_invalid_contacts() {
    let (_mock, upstream) = start_mock(0).await;
    let server = TestServer::start(test_config(upstream)).await;

    let contact = json!({"id": 1, "name": "Grace", "email": "grace@example.com"});
    assert_eq!(server.post("/contacts", contact.clone()).await.status(), 201);
    assert_eq!(server.post("/contacts", contact).await.status(), 409);

    let response = server
        .post("/contacts", json!({"id": 2, "name": "No Methods"}))
        .await;
    assert_eq!(response.status(), 400);

    let response = server
        .put("/contacts/1", json!({"id": 3, "name": "Grace", "email": "grace@example.com"}))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_get_all_contacts_fetches_two_pages_and_stores_them() {
    let (mock, upstream) = start_mock(4).await;
    let server = TestServer::start(test_config(upstream)).await;

    let contacts: Vec<Value> = server.get("/contacts").await.json().await.unwrap();
    let ids: Vec<u64> = contacts.iter().map(|c| c["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(contacts[0]["source"], "KENECT_LABS");
    assert_eq!(mock.requests.load(Ordering::SeqCst), 2);

    // synchronized contacts are readable one by one
    let third: Value = server.get("/contacts/3").await.json().await.unwrap();
    assert_eq!(third["name"], "Contact 3");

    // pages are cached
    server.get("/contacts").await;
    assert_eq!(mock.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_upstream_down_with_empty_store_is_503() {
    let (mock, upstream) = start_mock(3).await;
    mock.down.store(true, Ordering::SeqCst);
    let server = TestServer::start(test_config(upstream)).await;

    let response = server.get("/contacts").await;
    assert_eq!(response.status(), 503);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(
        error.message,
        "External API is unavailable and no cached data exists"
    );
    assert_eq!(error.path, "/contacts");
}

#[tokio::test]
async fn test_upstream_down_serves_stored_snapshot() {
    let (mock, upstream) = start_mock(2).await;
    let server = TestServer::start(test_config(upstream)).await;

    let synced: Vec<Value> = server.get("/contacts").await.json().await.unwrap();
    assert_eq!(synced.len(), 2);

    mock.down.store(true, Ordering::SeqCst);
    // a different page size bypasses the page cache
    let response = server.get("/contacts?page=1&pageSize=5").await;
    assert_eq!(response.status(), 200);
    let fallback: Vec<Value> = response.json().await.unwrap();
    assert_eq!(fallback.len(), 2);

    let status: Value = server.get("/status").await.json().await.unwrap();
    assert_eq!(status["client"]["fallbacks_served"], 1);
}

#[tokio::test]
async fn test_status_reports_circuits() {
    let (_mock, upstream) = start_mock(0).await;
    let server = TestServer::start(test_config(upstream)).await;

    let status: Value = server.get("/status").await.json().await.unwrap();
    assert_eq!(status["store_circuit"]["state"], "CLOSED");
    assert_eq!(status["upstream_circuit"]["state"], "CLOSED");
    assert_eq!(status["store_backend"], "memory");
    assert_eq!(status["cache_backend"], "memory");

    let response = server.client.post(server.url("/status/reset")).send().await.unwrap();
    assert_eq!(response.status(), 200);
}

// =============================================================================
// Binary
// =============================================================================

fn binary_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_agenda-rpc") {
        return PathBuf::from(path);
    }
    let current_exe = std::env::current_exe().unwrap();
    let mut fallback = current_exe
        .parent()
        .and_then(|p| p.parent())
        .unwrap()
        .join("agenda-rpc");
    if cfg!(target_os = "windows") {
        fallback.set_extension("exe");
    }
    fallback
}

#[tokio::test]
async fn test_binary_serves_health() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("agenda.json");
    std::fs::write(
        &config_path,
        r#"{ "upstream": { "base_url": "http://127.0.0.1:9" } }"#,
    )
    .unwrap();

    let mut child = tokio::process::Command::new(binary_path())
        .arg("--config")
        .arg(&config_path)
        .arg("--port")
        .arg("0")
        .arg("--ephemeral")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn agenda-rpc");

    let stdout = child.stdout.take().unwrap();
    let mut lines = tokio::io::BufReader::new(stdout).lines();

    let port = tokio::time::timeout(Duration::from_secs(20), async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(value) = line.strip_prefix("AGENDA_PORT=") {
                return value.trim().parse::<u16>().ok();
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
    .expect("AGENDA_PORT line not emitted");

    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");

    let _ = child.kill().await;
}
