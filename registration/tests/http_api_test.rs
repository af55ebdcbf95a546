//! HTTP API tests against the full router, in-process.
//!
//! Run with: `cargo test --test http_api_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use common::World;
use registration::{PaymentId, PaymentStatus, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

struct Caller {
    user_id: Uuid,
    role: &'static str,
}

impl Caller {
    fn learner() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            role: "learner",
        }
    }

    fn admin() -> Self {
        Self {
            user_id: Uuid::new_v4(),
            role: "admin",
        }
    }
}

async fn send(app: &Router, method: &str, uri: &str, caller: Option<&Caller>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        request = request
            .header("X-User-Id", caller.user_id.to_string())
            .header("X-User-Role", caller.role);
    }
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_open_and_ready_checks_the_repository() {
    let world = World::new();
    let app = build_router(world.app_state());

    let (status, _) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let world = World::new();
    let cohort = world.cohort(1);
    let app = build_router(world.app_state());

    let (status, body) = send(
        &app,
        "POST",
        "/api/registrations",
        None,
        Some(json!({ "cohort_id": cohort.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn register_pay_and_confirm_over_http() {
    let world = World::new();
    let cohort = world.cohort(1);
    world.save20();
    let app = build_router(world.app_state());
    let alice = Caller::learner();

    let (status, body) = send(
        &app,
        "POST",
        "/api/registrations",
        Some(&alice),
        Some(json!({ "cohort_id": cohort.to_string(), "promo_code": "save20" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["registration"]["status"], "PENDING_PAYMENT");
    assert_eq!(body["registration"]["price"], 80_000);
    let id = body["registration"]["id"].as_str().unwrap().to_string();

    let (status, session) = send(&app, "POST", &format!("/api/registrations/{id}/payment"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let payment_id = session["payment_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/registrations/{id}/confirm"),
        Some(&alice),
        Some(json!({ "payment_id": payment_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PAYMENT_NOT_SETTLED");

    let webhook = json!({ "payment_id": payment_id, "status": "paid" });
    let (status, body) = send(&app, "POST", "/api/payments/webhook", None, Some(webhook.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "acknowledged");

    world
        .gateway
        .settle(&PaymentId::new(payment_id.clone()), PaymentStatus::Paid);
    let (status, body) = send(&app, "POST", "/api/payments/webhook", None, Some(webhook)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "confirmed");

    let (status, body) = send(&app, "GET", &format!("/api/registrations/{id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONFIRMED");

    let (_, body) = send(&app, "GET", "/api/registrations", Some(&alice), None).await;
    assert_eq!(body["registrations"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "GET", &format!("/api/cohorts/{cohort}/availability"), Some(&alice), None).await;
    assert_eq!(body["enrolled"], 1);
    assert_eq!(body["available"], 0);
}

#[tokio::test]
async fn full_cohort_queues_and_leave_works() {
    let world = World::new();
    let cohort = world.cohort(1);
    let app = build_router(world.app_state());
    let (alice, bob) = (Caller::learner(), Caller::learner());

    let create = json!({ "cohort_id": cohort.to_string() });
    let (status, _) = send(&app, "POST", "/api/registrations", Some(&alice), Some(create.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/api/registrations", Some(&bob), Some(create.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["registration"]["status"], "WAITLISTED");
    assert_eq!(body["waitlist_position"], 1);

    let (status, body) = send(&app, "POST", "/api/registrations", Some(&bob), Some(create)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_REGISTRATION");

    let (status, position) = send(
        &app,
        "GET",
        &format!("/api/cohorts/{cohort}/waitlist/position"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(position["status"], "WAITING");
    let entry_id = position["entry_id"].as_str().unwrap().to_string();

    // Alice cannot remove Bob from the queue.
    let (status, _) = send(&app, "DELETE", &format!("/api/waitlist/{entry_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "DELETE", &format!("/api/waitlist/{entry_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "LEFT");

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/cohorts/{cohort}/waitlist/position"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_is_rejected_before_any_change() {
    let world = World::new();
    let cohort = world.cohort(1);
    let app = build_router(world.app_state());
    let alice = Caller::learner();

    let (status, body) = send(
        &app,
        "POST",
        "/api/registrations",
        Some(&alice),
        Some(json!({ "cohort_id": "not-a-uuid" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        &app,
        "POST",
        "/api/registrations",
        Some(&alice),
        Some(json!({ "cohort_id": cohort.to_string(), "promo_code": "SAVE 20!" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, "GET", "/api/registrations/42", Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &app,
        "POST",
        "/api/registrations",
        Some(&alice),
        Some(json!({ "cohort_id": Uuid::new_v4().to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (_, body) = send(&app, "GET", &format!("/api/cohorts/{cohort}/availability"), Some(&alice), None).await;
    assert_eq!(body["held"], 0);
}

#[tokio::test]
async fn webhook_secret_is_enforced_when_configured() {
    let world = World::new();
    let app = build_router(world.app_state().with_webhook_secret("s3cret"));
    let payload = json!({ "payment_id": "pay_1", "status": "paid" });

    let (status, _) = send(&app, "POST", "/api/payments/webhook", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("content-type", "application/json")
        .header("X-Webhook-Secret", "s3cret")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sweep_trigger_requires_admin() {
    let world = World::new();
    let app = build_router(world.app_state());

    let (status, _) = send(&app, "POST", "/api/admin/sweeps", Some(&Caller::learner()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", "/api/admin/sweeps", Some(&Caller::admin()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["report"]["failures"], 0);
}
