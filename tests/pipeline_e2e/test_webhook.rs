//! Webhook reconciliation tests.

use actix_web::test;
use headshot_pipeline_lib::api::webhook::MAX_WEBHOOK_BODY;
use headshot_pipeline_lib::models::ProfileStatus;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::test_helpers::{
    FakeStore, create_test_app, create_test_pool, insert_profile, post_webhook, reload,
    test_service,
};

/// Vendor URL that is never called by webhook tests.
const UNUSED_VENDOR: &str = "http://127.0.0.1:9";

#[actix_rt::test]
async fn test_completed_callback_marks_ready_and_is_idempotent() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    pool.claim_for_training(profile.id).await.unwrap();

    let query = format!("profileId={}", profile.id);
    let body = json!({
        "request_id": "req-123",
        "status": "OK",
        "payload": {"diffusers_lora_file": {"url": "https://cdn.test/w.safetensors"}}
    })
    .to_string();

    let (status, ack) = post_webhook(&app, &query, &body).await;
    assert_eq!(status, 200);
    assert_eq!(ack["message"], "Profile marked ready");
    assert_eq!(ack["status"], "OK");
    assert_eq!(ack["profileId"], profile.id.to_string());

    let first = reload(&pool, profile.id).await;
    assert_eq!(first.status, ProfileStatus::Ready.as_str());
    assert_eq!(
        first.weight_url.as_deref(),
        Some("https://cdn.test/w.safetensors")
    );

    // Redelivery leaves the same status and url.
    let (status, _) = post_webhook(&app, &query, &body).await;
    assert_eq!(status, 200);

    let second = reload(&pool, profile.id).await;
    assert_eq!(second.status, first.status);
    assert_eq!(second.weight_url, first.weight_url);
}

#[actix_rt::test]
async fn test_missing_profile_id_is_rejected_without_writes() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    let body = json!({"status": "COMPLETED", "result": {"output": {"url": "https://cdn.test/w"}}})
        .to_string();

    let (status, resp) = post_webhook(&app, "", &body).await;
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "Missing profileId query parameter");

    let (status, _) = post_webhook(&app, "profileId=", &body).await;
    assert_eq!(status, 400);

    let (status, resp) = post_webhook(&app, "profileId=not-a-uuid", &body).await;
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "Invalid profileId");

    let unchanged = reload(&pool, profile.id).await;
    assert_eq!(unchanged.status, ProfileStatus::NotReady.as_str());
    assert!(unchanged.weight_url.is_none());
}

#[actix_rt::test]
async fn test_invalid_json_is_rejected() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    let (status, resp) =
        post_webhook(&app, &format!("profileId={}", profile.id), "{not json").await;

    assert_eq!(status, 400);
    assert_eq!(resp["error"], "Invalid JSON body");
    assert_eq!(
        reload(&pool, profile.id).await.status,
        ProfileStatus::NotReady.as_str()
    );
}

#[actix_rt::test]
async fn test_completed_without_url_marks_failed() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    pool.claim_for_training(profile.id).await.unwrap();

    let (status, ack) = post_webhook(
        &app,
        &format!("profileId={}", profile.id),
        &json!({"status": "COMPLETED", "result": {}}).to_string(),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(ack["message"], "Profile marked failed");

    let updated = reload(&pool, profile.id).await;
    assert_eq!(updated.status, ProfileStatus::Failed.as_str());
    assert!(updated.weight_url.is_none());
}

#[actix_rt::test]
async fn test_stale_failure_does_not_regress_ready() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    pool.mark_profile_ready(profile.id, "https://cdn.test/w")
        .await
        .unwrap();
    let query = format!("profileId={}", profile.id);

    let (status, ack) = post_webhook(
        &app,
        &query,
        &json!({"status": "ERROR", "error": "late duplicate"}).to_string(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(ack["message"], "Stale failure ignored");

    let (_, ack) = post_webhook(
        &app,
        &query,
        &json!({"status": "ERROR", "timestamp": "2001-01-01T00:00:00Z"}).to_string(),
    )
    .await;
    assert_eq!(ack["message"], "Stale failure ignored");

    let kept = reload(&pool, profile.id).await;
    assert_eq!(kept.status, ProfileStatus::Ready.as_str());
    assert_eq!(kept.weight_url.as_deref(), Some("https://cdn.test/w"));

    // A failure stamped after the last update wins.
    let (_, ack) = post_webhook(
        &app,
        &query,
        &json!({"status": "ERROR", "timestamp": "2099-01-01T00:00:00Z"}).to_string(),
    )
    .await;
    assert_eq!(ack["message"], "Profile marked failed");

    let failed = reload(&pool, profile.id).await;
    assert_eq!(failed.status, ProfileStatus::Failed.as_str());
    assert!(failed.weight_url.is_none());
}

#[actix_rt::test]
async fn test_failure_while_getting_ready_marks_failed() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    pool.claim_for_training(profile.id).await.unwrap();

    let (status, ack) = post_webhook(
        &app,
        &format!("profileId={}", profile.id),
        &json!({"status": "ERROR", "error": "invalid archive"}).to_string(),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(ack["message"], "Profile marked failed");
    assert_eq!(ack["status"], "ERROR");
    assert_eq!(
        reload(&pool, profile.id).await.status,
        ProfileStatus::Failed.as_str()
    );
}

#[actix_rt::test]
async fn test_unknown_status_acknowledged_without_change() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    pool.claim_for_training(profile.id).await.unwrap();
    let before = reload(&pool, profile.id).await;

    for raw in ["IN_PROGRESS", "WEIRD_STATE"] {
        let (status, ack) = post_webhook(
            &app,
            &format!("profileId={}", profile.id),
            &json!({"status": raw}).to_string(),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(ack["message"], "Unhandled status, no action taken");
        assert_eq!(ack["status"], raw);
    }

    let after = reload(&pool, profile.id).await;
    assert_eq!(after, before);
}

#[actix_rt::test]
async fn test_unknown_profile_is_not_found() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let (status, resp) = post_webhook(
        &app,
        &format!("profileId={}", Uuid::new_v4()),
        &json!({"status": "COMPLETED", "result": {"output": {"url": "https://cdn.test/w"}}})
            .to_string(),
    )
    .await;

    assert_eq!(status, 404);
    assert_eq!(resp["error"], "Profile not found");
}

#[actix_rt::test]
async fn test_other_methods_are_not_allowed() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let req = test::TestRequest::get()
        .uri("/api/webhooks/training?profileId=abc")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 405);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Method not allowed");
}

#[actix_rt::test]
async fn test_oversized_body_is_rejected_as_json() {
    let pool = create_test_pool().await;
    let service = test_service(&pool, Arc::new(FakeStore::default()), UNUSED_VENDOR);
    let app = create_test_app(&pool, service).await;

    let profile = insert_profile(&pool).await;
    pool.claim_for_training(profile.id).await.unwrap();

    let filler = "x".repeat(MAX_WEBHOOK_BODY);
    let body = json!({"status": "ERROR", "error": filler}).to_string();
    assert!(body.len() > MAX_WEBHOOK_BODY);

    let (status, resp) = post_webhook(&app, &format!("profileId={}", profile.id), &body).await;
    assert_eq!(status, 413);
    assert_eq!(resp["error"], "Request body too large");
    assert_eq!(
        reload(&pool, profile.id).await.status,
        ProfileStatus::GettingReady.as_str()
    );
}
