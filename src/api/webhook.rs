//! Training webhook: reconciles vendor callbacks into profile state.
//!
//! Every path answers with a JSON body. Writes are keyed overwrites, so a
//! redelivered callback leaves the profile exactly as the first one did.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{CallbackOutcome, CallbackQuery, TrainingCallback, WebhookAck, WebhookErrorBody};

/// Largest callback body accepted, in bytes.
pub const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

/// Configure webhook routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/webhooks/training")
            .route(web::post().to(training_webhook))
            .default_service(web::to(method_not_allowed)),
    );
}

fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(WebhookErrorBody {
        error: message.to_string(),
    })
}

async fn method_not_allowed() -> HttpResponse {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Receive a training status callback.
///
/// The profile id travels in the `profileId` query parameter of the callback
/// URL registered at submission.
#[utoipa::path(
    post,
    path = "/api/webhooks/training",
    tag = "Webhooks",
    params(
        ("profileId" = String, Query, description = "Profile the job was submitted for")
    ),
    request_body(
        content = String,
        content_type = "application/json",
        description = "Vendor callback JSON"
    ),
    responses(
        (status = 200, description = "Callback handled", body = WebhookAck),
        (status = 400, description = "Malformed callback", body = WebhookErrorBody),
        (status = 404, description = "Profile not found", body = WebhookErrorBody),
        (status = 413, description = "Body too large", body = WebhookErrorBody),
        (status = 405, description = "Method not allowed", body = WebhookErrorBody),
        (status = 500, description = "Internal error", body = WebhookErrorBody),
    )
)]
pub async fn training_webhook(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    mut body: web::Payload,
) -> HttpResponse {
    let raw_id = web::Query::<CallbackQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().profile_id)
        .filter(|id| !id.trim().is_empty());

    let Some(raw_id) = raw_id else {
        warn!("Training webhook without profileId");
        return error_body(StatusCode::BAD_REQUEST, "Missing profileId query parameter");
    };

    let Ok(profile_id) = Uuid::parse_str(raw_id.trim()) else {
        warn!(profile_id = %raw_id, "Training webhook with invalid profileId");
        return error_body(StatusCode::BAD_REQUEST, "Invalid profileId");
    };

    let mut bytes = web::BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(profile_id = %profile_id, "Training webhook body read failed: {}", e);
                return error_body(StatusCode::BAD_REQUEST, "Invalid request body");
            }
        };
        if bytes.len() + chunk.len() > MAX_WEBHOOK_BODY {
            warn!(
                profile_id = %profile_id,
                "Training webhook body over {} bytes", MAX_WEBHOOK_BODY
            );
            return error_body(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        bytes.extend_from_slice(&chunk);
    }

    let payload: JsonValue = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(profile_id = %profile_id, "Training webhook with invalid JSON: {}", e);
            return error_body(StatusCode::BAD_REQUEST, "Invalid JSON body");
        }
    };

    let callback = TrainingCallback::parse(&payload);

    match reconcile(&pool, profile_id, &callback).await {
        Ok(Some(message)) => HttpResponse::Ok().json(WebhookAck {
            message,
            status: callback.raw_status,
            profile_id: profile_id.to_string(),
        }),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "Profile not found"),
        Err(e) => {
            error!(profile_id = %profile_id, "Training webhook failed: {}", e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Apply a callback. Returns `None` when the profile does not exist.
async fn reconcile(
    pool: &DbPool,
    profile_id: Uuid,
    callback: &TrainingCallback,
) -> AppResult<Option<String>> {
    if pool.get_profile_by_id(profile_id).await?.is_none() {
        warn!(profile_id = %profile_id, "Training webhook for unknown profile");
        return Ok(None);
    }

    let message = match &callback.outcome {
        CallbackOutcome::Completed { url } => {
            pool.mark_profile_ready(profile_id, url).await?;
            info!(profile_id = %profile_id, "Training completed, profile ready");
            "Profile marked ready"
        }
        CallbackOutcome::Failed { reason } => {
            let updated = pool
                .mark_profile_failed_from_callback(profile_id, callback.sent_at)
                .await?;
            if updated == 0 {
                info!(
                    profile_id = %profile_id,
                    "Ignoring stale failure callback for ready profile"
                );
                "Stale failure ignored"
            } else {
                warn!(profile_id = %profile_id, reason = %reason, "Training failed");
                "Profile marked failed"
            }
        }
        CallbackOutcome::Unknown { raw } => {
            info!(
                profile_id = %profile_id,
                status = %raw,
                "Unhandled training status, no action taken"
            );
            "Unhandled status, no action taken"
        }
    };

    Ok(Some(message.to_string()))
}
