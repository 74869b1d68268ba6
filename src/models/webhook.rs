//! Training webhook payload parsing.
//!
//! Vendor callbacks are only loosely specified, so the body is reduced to one
//! of three outcomes before anything touches the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use super::training::{JobStatus, extract_weight_url};

/// Query string carried on the callback URL.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "profileId")]
    pub profile_id: Option<String>,
}

/// What a callback means for the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Training finished with a usable weight URL.
    Completed { url: String },
    /// Training failed, or reported success without a weight URL.
    Failed { reason: String },
    /// Status we do not act on (still running, or unknown vocabulary).
    Unknown { raw: String },
}

/// A parsed callback.
#[derive(Debug, Clone)]
pub struct TrainingCallback {
    /// Status string exactly as the vendor sent it.
    pub raw_status: String,
    pub outcome: CallbackOutcome,
    /// Event time, when the vendor includes one.
    pub sent_at: Option<DateTime<Utc>>,
}

impl TrainingCallback {
    /// Reduce a callback body to an outcome.
    pub fn parse(body: &JsonValue) -> Self {
        let raw_status = body
            .get("status")
            .and_then(JsonValue::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();

        let result = result_object(body);

        let outcome = match JobStatus::recognize(&raw_status) {
            Some(JobStatus::Succeeded) => match result.and_then(extract_weight_url) {
                Some(url) => CallbackOutcome::Completed { url },
                None => CallbackOutcome::Failed {
                    reason: "completed without a weight url".to_string(),
                },
            },
            Some(JobStatus::Failed) => CallbackOutcome::Failed {
                reason: failure_reason(body, result),
            },
            _ => CallbackOutcome::Unknown {
                raw: raw_status.clone(),
            },
        };

        let sent_at = ["timestamp", "completed_at", "created_at"]
            .iter()
            .filter_map(|key| body.get(*key).and_then(JsonValue::as_str))
            .find_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            raw_status,
            outcome,
            sent_at,
        }
    }
}

/// The vendor has delivered the result under `result` and under `payload`.
fn result_object(body: &JsonValue) -> Option<&JsonValue> {
    ["result", "payload"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find(|value| value.is_object())
}

fn failure_reason(body: &JsonValue, result: Option<&JsonValue>) -> String {
    let from = |node: Option<&JsonValue>, key: &str| {
        node.and_then(|n| n.get(key))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    };

    from(Some(body), "error")
        .or_else(|| from(result, "error"))
        .or_else(|| from(result, "detail"))
        .unwrap_or_else(|| "training failed".to_string())
}

/// Webhook acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub message: String,
    pub status: String,
    pub profile_id: String,
}

/// Webhook error body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookErrorBody {
    pub error: String,
}
