/// HTTP API tests
///
/// Exercises the router in-process with `tower::ServiceExt::oneshot`.
mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::fixtures::{recording_app, RecordingDispatcher, TestApp};
use identity_service::db::IdentityStore;
use identity_service::http::build_router;
use identity_service::models::Role;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

async fn setup() -> (TestApp, Arc<RecordingDispatcher>, Router) {
    let (app, dispatcher) = recording_app().await;
    let router = build_router(app.state());
    (app, dispatcher, router)
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn signup(router: &Router, identifier: &str) -> Value {
    let (status, body) = send(
        router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({ "identifier": identifier, "password": "pw123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
    body
}

async fn login(router: &Router, identifier: &str, password: &str) -> (StatusCode, Value) {
    send(
        router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "identifier": identifier, "password": password })),
    )
    .await
}

fn access_token(outcome: &Value) -> String {
    outcome["tokens"]["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (_, _, router) = setup().await;

    let (status, body) = send(&router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_signup_returns_tokens_and_identity() {
    let (_, _, router) = setup().await;

    let body = signup(&router, "a@example.com").await;
    assert_eq!(body["tokens"]["token_type"], "Bearer");
    assert_eq!(body["identity"]["email"], "a@example.com");
    assert_eq!(body["identity"]["role"], "USER");
    assert!(body["identity"].get("password_hash").is_none());

    let (status, body) = send(
        &router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({ "identifier": "a@example.com", "password": "pw123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ALREADY_EXISTS");
}

#[tokio::test]
async fn test_signup_rejects_malformed_input() {
    let (_, _, router) = setup().await;

    let (status, body) = send(
        &router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({ "identifier": "nobody", "password": "pw123456" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION");
}

#[tokio::test]
async fn test_me_requires_access_token() {
    let (_, _, router) = setup().await;
    let outcome = signup(&router, "a@example.com").await;

    let (status, body) = send(&router, Method::GET, "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHENTICATED");

    let token = access_token(&outcome);
    let (status, body) = send(&router, Method::GET, "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], outcome["identity"]["id"]);

    let refresh = outcome["tokens"]["refresh_token"].as_str().unwrap();
    let (status, _) = send(&router, Method::GET, "/me", Some(refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let (app, _, router) = setup().await;
    let target = signup(&router, "user@example.com").await;
    let admin = signup(&router, "admin@example.com").await;
    let target_id = target["identity"]["id"].as_str().unwrap();
    let uri = format!("/identities/{target_id}/role");

    let user_token = access_token(&target);
    let (status, body) = send(
        &router,
        Method::PUT,
        &uri,
        Some(&user_token),
        Some(json!({ "role": "ADMIN" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let admin_id: Uuid = admin["identity"]["id"].as_str().unwrap().parse().unwrap();
    app.identities
        .update_role(admin_id, Role::Admin)
        .await
        .unwrap();

    // Role is read at token issue time, so log in again
    let (status, outcome) = login(&router, "admin@example.com", "pw123456").await;
    assert_eq!(status, StatusCode::OK);
    let admin_token = access_token(&outcome);

    let (status, body) = send(
        &router,
        Method::PUT,
        &uri,
        Some(&admin_token),
        Some(json!({ "role": "ADMIN" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "ADMIN");

    let own = format!("/identities/{admin_id}");
    let (status, _) = send(&router, Method::DELETE, &own, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let other = format!("/identities/{target_id}");
    let (status, _) = send(&router, Method::DELETE, &other, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = login(&router, "user@example.com", "pw123456").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let (_, _, router) = setup().await;
    signup(&router, "a@example.com").await;

    let (wrong_status, wrong_body) = login(&router, "a@example.com", "wrongpassword").await;
    let (unknown_status, unknown_body) = login(&router, "b@example.com", "wrongpassword").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
}

#[tokio::test]
async fn test_refresh_and_verify_token() {
    let (_, _, router) = setup().await;
    let outcome = signup(&router, "a@example.com").await;
    let refresh = outcome["tokens"]["refresh_token"].as_str().unwrap();

    let (status, pair) = send(
        &router,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, principal) = send(
        &router,
        Method::POST,
        "/auth/verify-token",
        None,
        Some(json!({ "token": pair["access_token"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(principal["subject_id"], outcome["identity"]["id"]);
    assert_eq!(principal["role"], "USER");

    let (status, _) = send(
        &router,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refresh_token": pair["access_token"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verification_round_trip() {
    let (_, dispatcher, router) = setup().await;
    signup(&router, "a@example.com").await;

    let (status, sent) = send(
        &router,
        Method::POST,
        "/verification/request",
        None,
        Some(json!({ "address": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(sent["channel"], "email");
    assert_eq!(sent["resend_after_secs"], 60);

    let code = dispatcher.last_code_for("a@example.com").unwrap();
    let submission = json!({ "address": "a@example.com", "code": code });

    let (status, body) = send(
        &router,
        Method::POST,
        "/verification/submit",
        None,
        Some(submission.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);

    let (status, _) = send(
        &router,
        Method::POST,
        "/verification/submit",
        None,
        Some(submission),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verification_rate_limit_reports_retry_after() {
    let (_, _, router) = setup().await;
    let request = json!({ "address": "+14155551234" });

    let (status, _) = send(
        &router,
        Method::POST,
        "/verification/request",
        None,
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(
        &router,
        Method::POST,
        "/verification/request",
        None,
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "RATE_LIMITED");
    assert_eq!(body["retry_after_secs"], 60);
}
