#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use norichat_api::auth::AppStateInner;
use norichat_db::Database;
use norichat_gateway::registry::Registry;
use norichat_server::{app, ServerState};

pub const TEST_SECRET: &str = "integration-test-secret";

/// A full server wired to a throwaway database. The router can be driven
/// in-process (`oneshot`) or served on a loopback port for WebSocket tests;
/// both views share the same state.
pub struct TestServer {
    pub router: Router,
    pub state: ServerState,
    _db_dir: TempDir,
}

pub fn test_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("norichat.db")).unwrap());
    let state = ServerState::new(
        Arc::new(AppStateInner {
            db,
            jwt_secret: TEST_SECRET.to_string(),
        }),
        Registry::new(),
    );
    TestServer {
        router: app(state.clone()),
        state,
        _db_dir: dir,
    }
}

/// Serve the router on an ephemeral loopback port.
pub async fn spawn(server: &TestServer) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

pub async fn post_json_authed(
    router: &Router,
    path: &str,
    token: &str,
    body: Value,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

pub async fn get_authed(router: &Router, path: &str, token: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

pub async fn get_unauthed(router: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Register an account, returning its token and user id.
pub async fn register(router: &Router, username: &str, password: &str) -> (String, i64) {
    let (status, body) = post_json(
        router,
        "/api/register",
        serde_json::json!({ "username": username, "password": password }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user_id"].as_i64().unwrap(),
    )
}
