//! HTTP surface tests, driven in-process against the production router.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::*;

#[tokio::test]
async fn register_seeds_membership_in_default_server() {
    let server = test_server();

    let (token, user_id) = register(&server.router, "alice", "pw1234").await;
    // id 1 is the reserved seed row, so the first account gets 2.
    assert_eq!(user_id, 2);

    let (status, body) = get_authed(&server.router, "/api/servers", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{ "id": 1, "name": "NoriChat HQ", "owner_id": 0 }])
    );
}

#[tokio::test]
async fn register_validates_input() {
    let server = test_server();

    let (status, body) = post_json(&server.router, "/api/register", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username and password required");

    let long_name = "x".repeat(33);
    let (status, body) = post_json(
        &server.router,
        "/api/register",
        json!({ "username": long_name, "password": "pw1234" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username or password too long");
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let server = test_server();
    register(&server.router, "alice", "pw1234").await;

    let (status, body) = post_json(
        &server.router,
        "/api/register",
        json!({ "username": "alice", "password": "other" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already taken");
}

#[tokio::test]
async fn login_checks_credentials() {
    let server = test_server();
    let (_, user_id) = register(&server.router, "alice", "pw1234").await;

    let (status, body) = post_json(
        &server.router,
        "/api/login",
        json!({ "username": "alice", "password": "pw1234" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id);
    assert_eq!(body["username"], "alice");
    assert!(body["token"].as_str().is_some());

    let (status, body) = post_json(
        &server.router,
        "/api/login",
        json!({ "username": "alice", "password": "wrong" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid credentials");

    let (status, _) = post_json(
        &server.router,
        "/api/login",
        json!({ "username": "nobody", "password": "pw1234" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn directory_routes_require_bearer_auth() {
    let server = test_server();

    let (status, _) = get_unauthed(&server.router, "/api/servers").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_authed(&server.router, "/api/servers", "garbage.token.here").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn channels_are_gated_by_membership() {
    let server = test_server();
    let (token, _) = register(&server.router, "alice", "pw1234").await;

    let (status, body) = get_authed(&server.router, "/api/channels?server_id=1", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "general");
    assert_eq!(body[0]["type"], "text");

    let (status, body) = get_authed(&server.router, "/api/channels", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "server_id required");

    // A second server alice is not a member of.
    server.state.app.db.create_server("Other", 0).unwrap();
    let (status, body) = get_authed(&server.router, "/api/channels?server_id=2", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not a member of this server");
}

#[tokio::test]
async fn channel_creation_validates_type() {
    let server = test_server();
    let (token, _) = register(&server.router, "alice", "pw1234").await;

    let (status, body) = post_json_authed(
        &server.router,
        "/api/channels",
        &token,
        json!({ "server_id": 1, "name": "lounge", "type": "voice" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "lounge");
    assert_eq!(body["type"], "voice");
    assert_eq!(body["server_id"], 1);

    let (status, body) = post_json_authed(
        &server.router,
        "/api/channels",
        &token,
        json!({ "server_id": 1, "name": "bad", "type": "video" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid channel type");

    let (_, body) = get_authed(&server.router, "/api/channels?server_id=1", &token).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn members_lists_real_accounts_only() {
    let server = test_server();
    let (token, alice_id) = register(&server.router, "alice", "pw1234").await;
    let (_, bob_id) = register(&server.router, "bob", "pw5678").await;

    let (status, body) = get_authed(&server.router, "/api/members?server_id=1", &token).await;
    assert_eq!(status, StatusCode::OK);
    let members = body.as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0]["id"], alice_id);
    assert_eq!(members[0]["username"], "alice");
    assert_eq!(members[1]["id"], bob_id);
}

#[tokio::test]
async fn history_is_chronological_with_limit_fallback() {
    let server = test_server();
    let (token, alice_id) = register(&server.router, "alice", "pw1234").await;

    let db = &server.state.app.db;
    for i in 0..3 {
        db.add_message(1, alice_id, &format!("msg {i}")).unwrap();
    }

    let (status, body) =
        get_authed(&server.router, "/api/messages?channel_id=1&limit=2", &token).await;
    assert_eq!(status, StatusCode::OK);
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 2);
    // Chronological: the two newest, oldest of them first.
    assert_eq!(page[0]["content"], "msg 1");
    assert_eq!(page[1]["content"], "msg 2");
    assert_eq!(page[1]["author"], "alice");
    assert_eq!(page[1]["author_id"], alice_id);

    // Out-of-range limits fall back to the default instead of erroring.
    for bad in ["0", "500"] {
        let (status, body) = get_authed(
            &server.router,
            &format!("/api/messages?channel_id=1&limit={bad}"),
            &token,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);
    }

    let (status, body) = get_authed(&server.router, "/api/messages", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "channel_id required");
}
