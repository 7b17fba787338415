use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use session_gate::auth::{LogMailer, MemoryUserDirectory, UserDirectory};
use session_gate::config::{SessionWritePolicy, Settings};
use session_gate::core::SessionManager;
use session_gate::error::{GateError, Result};
use session_gate::handlers::{routes, AppState};
use session_gate::security_logger::SecurityLogger;
use session_gate::storage::{
    ConnectionCache, CredentialStore, RedisCredentialStore, SharedCredentialStore,
};
use warp::http::StatusCode;

/// Store whose backend is down
struct UnavailableStore;

#[async_trait]
impl CredentialStore for UnavailableStore {
    async fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(GateError::StoreUnavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(GateError::StoreUnavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(GateError::StoreUnavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(GateError::StoreUnavailable("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}

async fn state_with(settings: Settings, store: SharedCredentialStore) -> AppState {
    let state = AppState::new(
        settings,
        store,
        Arc::new(MemoryUserDirectory::new()),
        Arc::new(LogMailer),
        Arc::new(SecurityLogger::new()),
    );
    state
        .users
        .create_user("alice", "alice@example.com", "wonderland")
        .await
        .unwrap();
    state
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn login_request() -> warp::test::RequestBuilder {
    warp::test::request()
        .method("POST")
        .path("/users/login")
        .json(&serde_json::json!({ "username": "alice", "password": "wonderland" }))
}

#[tokio::test]
async fn test_validate_reports_unavailable_not_missing() {
    let sessions = SessionManager::new(Arc::new(UnavailableStore), Duration::from_secs(60));
    assert!(matches!(
        sessions.validate("any-token").await,
        Err(GateError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn test_fail_open_login_issues_token() {
    let state = state_with(Settings::for_testing(), Arc::new(UnavailableStore)).await;
    let app = routes(state.clone());

    let response = login_request().reply(&app).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = json(response.body())["token"].as_str().unwrap().to_string();
    assert!(response.headers().get("set-cookie").is_some());

    // The token is genuine but has no session behind it
    assert_eq!(state.gate.codec().verify(&token).unwrap(), "alice");
    let response = warp::test::request()
        .path("/api/whoami")
        .header("cookie", format!("token={}", token))
        .reply(&app)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response.body())["error"], "invalid session");

    let stats = state.gate.security().get_event_stats().await;
    assert!(stats.get("store_unavailable").copied().unwrap_or(0) >= 2);
}

#[tokio::test]
async fn test_fail_closed_login_refused() {
    let mut settings = Settings::for_testing();
    settings.session_write_policy = SessionWritePolicy::FailClosed;
    let state = state_with(settings, Arc::new(UnavailableStore)).await;

    let response = login_request().reply(&routes(state)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(response.body())["error"], "session store unavailable");
    assert!(response.headers().get("set-cookie").is_none());
}

#[tokio::test]
async fn test_logout_succeeds_while_store_down() {
    let state = state_with(Settings::for_testing(), Arc::new(UnavailableStore)).await;
    let token = state.gate.login("alice").await.unwrap().token;

    let response = warp::test::request()
        .method("POST")
        .path("/users/logout")
        .header("authorization", format!("Bearer {}", token))
        .reply(&routes(state))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_page_load_passes_while_store_down() {
    let state = state_with(Settings::for_testing(), Arc::new(UnavailableStore)).await;
    let token = state.gate.login("alice").await.unwrap().token;

    let response = warp::test::request()
        .path("/home")
        .header("accept", "text/html")
        .header("cookie", format!("token={}", token))
        .reply(&routes(state))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(String::from_utf8_lossy(response.body()).contains("/users/to_login"));
}

#[tokio::test]
async fn test_health_reports_store_down() {
    let state = state_with(Settings::for_testing(), Arc::new(UnavailableStore)).await;
    let response = warp::test::request().path("/health").reply(&routes(state)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response.body())["store"]["status"], "unavailable");
}

#[tokio::test]
async fn test_unreachable_redis_answers_within_timeout() {
    let mut settings = Settings::for_testing();
    // Port 1 on loopback refuses connections
    settings.store.host = "127.0.0.1".to_string();
    settings.store.port = Some(1);
    settings.store.connect_timeout = Duration::from_millis(300);
    settings.store.op_timeout = Duration::from_millis(300);

    let cache = Arc::new(ConnectionCache::new(&settings.store));
    cache.start();
    let store = Arc::new(RedisCredentialStore::new(cache.clone(), &settings.store));
    let state = state_with(settings, store).await;
    let token = state.gate.login("alice").await.unwrap().token;

    let started = Instant::now();
    let response = warp::test::request()
        .path("/api/whoami")
        .header("cookie", format!("token={}", token))
        .reply(&routes(state))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response.body())["error"], "invalid session");
    assert!(started.elapsed() < Duration::from_secs(2));

    cache.shutdown().await;
}
