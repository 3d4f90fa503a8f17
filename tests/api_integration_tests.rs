//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use kv_orm::{api::create_router, model::User, AppState};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

// == Helper Functions ==

fn test_state() -> AppState {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(User::CREATE_TABLE).unwrap();
    AppState::new(conn)
}

fn create_test_app() -> Router {
    create_router(test_state())
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn user_body(id: i64) -> Value {
    json!({
        "id": id,
        "name": format!("name{}", id),
        "mailbox": format!("name{}@example.com", id),
        "password": format!("pwd{}", id),
        "sex": id % 2 == 0,
        "age": id,
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn seed(app: &Router, n: i64) {
    for id in 0..n {
        let (status, _) = send(app, "PUT", "/users", Some(user_body(id))).await;
        assert_eq!(status, StatusCode::OK);
    }
}

// == PUT /users ==

#[tokio::test]
async fn test_put_user_success() {
    let app = create_test_app();

    let (status, json) = send(&app, "PUT", "/users", Some(user_body(1))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], 1);
    assert_eq!(json["mailbox"], "name1@example.com");
    assert!(json.get("created_at").is_some());
}

#[tokio::test]
async fn test_put_user_invalid_body() {
    let app = create_test_app();
    let mut body = user_body(1);
    body["mailbox"] = json!("");

    let (status, json) = send(&app, "PUT", "/users", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("mailbox"));
}

#[tokio::test]
async fn test_put_user_unique_collision() {
    let app = create_test_app();
    seed(&app, 1).await;

    let mut clash = user_body(2);
    clash["mailbox"] = json!("name0@example.com");
    clash["password"] = json!("pwd0");
    let (status, json) = send(&app, "PUT", "/users", Some(clash)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_put_user_updates_indexes() {
    let app = create_test_app();
    seed(&app, 4).await;

    let mut moved = user_body(0);
    moved["sex"] = json!(false);
    let (status, _) = send(&app, "PUT", "/users", Some(moved)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, males) = send(&app, "GET", "/users/by-sex/true", None).await;
    assert_eq!(males["total"], 1);
    assert_eq!(males["users"][0]["id"], 2);
}

#[tokio::test]
async fn test_put_after_expiry_moves_indexes() {
    let app = create_test_app();
    let mut body = user_body(4);
    body["ttl"] = json!(1);
    send(&app, "PUT", "/users", Some(body)).await;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let mut moved = user_body(4);
    moved["sex"] = json!(false);
    moved["mailbox"] = json!("moved@example.com");
    let (status, _) = send(&app, "PUT", "/users", Some(moved)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, males) = send(&app, "GET", "/users/by-sex/true", None).await;
    assert_eq!(males["total"], 0);
    let (_, females) = send(&app, "GET", "/users/by-sex/false", None).await;
    assert_eq!(females["users"][0]["mailbox"], "moved@example.com");

    let (status, _) = send(
        &app,
        "GET",
        "/users/unique?mailbox=name4@example.com&password=pwd4",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // the released unique key is free for another user
    let mut heir = user_body(6);
    heir["mailbox"] = json!("name4@example.com");
    heir["password"] = json!("pwd4");
    let (status, _) = send(&app, "PUT", "/users", Some(heir)).await;
    assert_eq!(status, StatusCode::OK);
}

// == GET /users/:id ==

#[tokio::test]
async fn test_get_user_from_cache() {
    let app = create_test_app();
    seed(&app, 2).await;

    let (status, json) = send(&app, "GET", "/users/1", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source"], "cache");
    assert_eq!(json["user"]["name"], "name1");
}

#[tokio::test]
async fn test_get_user_not_found() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/users/404", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not exist"));
}

#[tokio::test]
async fn test_get_user_expired_reads_through() {
    let app = create_test_app();
    let mut body = user_body(5);
    body["ttl"] = json!(1);
    send(&app, "PUT", "/users", Some(body)).await;

    // Wait for the cached record to expire
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (status, json) = send(&app, "GET", "/users/5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source"], "primary");
}

// == DELETE /users/:id ==

#[tokio::test]
async fn test_delete_user_success() {
    let app = create_test_app();
    seed(&app, 1).await;

    let (status, json) = send(&app, "DELETE", "/users/0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("deleted"));

    let (status, _) = send(&app, "GET", "/users/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_user_not_found() {
    let app = create_test_app();

    let (status, _) = send(&app, "DELETE", "/users/77", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == Listings ==

#[tokio::test]
async fn test_users_by_sex_paged() {
    let app = create_test_app();
    seed(&app, 10).await;

    let (status, json) = send(&app, "GET", "/users/by-sex/false?offset=1&limit=2", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 5);
    let ids: Vec<i64> = json["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 5]);
}

#[tokio::test]
async fn test_users_by_sex_negative_offset() {
    let app = create_test_app();

    let (status, _) = send(&app, "GET", "/users/by-sex/true?offset=-1", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_users_by_age_range() {
    let app = create_test_app();
    seed(&app, 20).await;

    let (status, json) = send(&app, "GET", "/users/by-age?begin=5&end=15&limit=3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 10);
    assert_eq!(json["users"].as_array().unwrap().len(), 3);
    assert_eq!(json["users"][0]["age"], 5);

    let (_, json) = send(
        &app,
        "GET",
        "/users/by-age?begin=5&end=15&limit=3&reverse=true",
        None,
    )
    .await;
    assert_eq!(json["users"][0]["age"], 14);
}

#[tokio::test]
async fn test_user_by_unique_key() {
    let app = create_test_app();
    seed(&app, 3).await;

    let (status, json) = send(
        &app,
        "GET",
        "/users/unique?mailbox=name2@example.com&password=pwd2",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"]["id"], 2);

    let (status, _) = send(
        &app,
        "GET",
        "/users/unique?mailbox=name2@example.com&password=wrong",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == Sync Endpoints ==

#[tokio::test]
async fn test_sync_clear_and_load() {
    let app = create_test_app();
    seed(&app, 6).await;

    let (status, json) = send(&app, "POST", "/sync/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["removed"].as_u64().unwrap() > 0);

    let (_, json) = send(&app, "GET", "/users/by-sex/true", None).await;
    assert_eq!(json["total"], 0);

    let (status, json) = send(&app, "POST", "/sync/load", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["records"], 6);

    let (_, json) = send(&app, "GET", "/users/by-sex/true", None).await;
    assert_eq!(json["total"], 3);

    let (status, json) = send(&app, "GET", "/sync/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "idle");
    assert_eq!(json["last_report"]["records"], 6);
}

// == STATS Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint() {
    let app = create_test_app();
    seed(&app, 2).await;
    send(&app, "GET", "/users/1", None).await;

    let (status, json) = send(&app, "GET", "/stats", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["hits"].as_u64().unwrap() >= 1);
    // record, shadow and unique key per user
    assert_eq!(json["total_entries"], 6);
    assert!(json.get("hit_rate").is_some());
    assert!(json.get("total_sets").is_some());
}

// == HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}
