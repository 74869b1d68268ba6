//! Remote training job gateway.
//!
//! Wraps the vendor's queue API: submit a job, poll its status, fetch its
//! result. Vendor status strings are normalized through [`JobStatus`].

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::{VendorSettings, callback_url};
use crate::models::training::{QueueStatus, SubmitAck};
use crate::models::{JobStatus, PollOutcome, TrainingInput, TrainingResult, extract_weight_url};

/// Longest vendor error body carried into an error message.
const MAX_VENDOR_MESSAGE: usize = 300;

/// Vendor interaction failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The vendor answered the submission with a non-success status.
    #[error("Vendor rejected submission ({status}): {message}")]
    Submission { status: u16, message: String },

    /// The request did not complete, or a poll/result call was refused.
    #[error("Vendor request failed: {0}")]
    Transport(String),

    /// The vendor answered with a body we could not interpret.
    #[error("Unexpected vendor response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Message that is safe to return to a client.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Submission { message, .. } => {
                format!("Training submission rejected: {}", message)
            }
            GatewayError::Transport(_) => "Training service is unavailable".to_string(),
            GatewayError::Decode(_) => "Unexpected response from training service".to_string(),
        }
    }
}

/// Client for the vendor's training queue.
#[derive(Clone)]
pub struct TrainingGateway {
    http: reqwest::Client,
    queue_url: String,
    training_app: String,
    api_key: SecretString,
    public_url: String,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl TrainingGateway {
    /// Create a gateway. `public_url` is the base the vendor calls back on.
    pub fn new(http: reqwest::Client, settings: &VendorSettings, public_url: &str) -> Self {
        info!(
            "Training gateway initialized (queue={}, app={}, poll={}s x {})",
            settings.queue_url,
            settings.training_app,
            settings.poll_interval_secs,
            settings.poll_max_attempts
        );

        Self {
            http,
            queue_url: settings.queue_url.trim_end_matches('/').to_string(),
            training_app: settings.training_app.trim_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            public_url: public_url.to_string(),
            poll_interval: settings.poll_interval(),
            poll_max_attempts: settings.poll_max_attempts,
        }
    }

    fn app_url(&self) -> String {
        format!("{}/{}", self.queue_url, self.training_app)
    }

    fn request_url(&self, request_id: &str) -> String {
        format!(
            "{}/requests/{}",
            self.app_url(),
            urlencoding::encode(request_id)
        )
    }

    fn authorization(&self) -> String {
        format!("Key {}", self.api_key.expose_secret())
    }

    /// Queue a training job and return the vendor request id.
    ///
    /// The callback URL carries the profile id so the webhook can correlate
    /// the outcome without relying on the vendor echoing metadata.
    pub async fn submit_training_job(
        &self,
        archive_url: &str,
        trigger_phrase: &str,
        profile_id: &str,
    ) -> Result<String, GatewayError> {
        let callback = callback_url(&self.public_url, profile_id);
        let url = format!(
            "{}?fal_webhook={}",
            self.app_url(),
            urlencoding::encode(&callback)
        );
        let input = TrainingInput::new(archive_url, trigger_phrase, profile_id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.authorization())
            .json(&input)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Submission {
                status: status.as_u16(),
                message: vendor_message(&body),
            });
        }

        let ack: SubmitAck = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("submission acknowledgement: {}", e)))?;

        info!(
            profile_id = %profile_id,
            request_id = %ack.request_id,
            "Training job queued"
        );

        Ok(ack.request_id)
    }

    /// Current normalized status of a job.
    pub async fn poll_status(&self, request_id: &str) -> Result<JobStatus, GatewayError> {
        let url = format!("{}/status", self.request_url(request_id));
        let body: QueueStatus = self.get_json(&url).await?;
        let status = JobStatus::from_vendor(&body.status);

        if JobStatus::recognize(&body.status).is_none() {
            warn!(
                request_id = %request_id,
                vendor_status = %body.status,
                "Unrecognized vendor status, treating as running"
            );
        }

        Ok(status)
    }

    /// Result of a finished job.
    pub async fn fetch_result(&self, request_id: &str) -> Result<TrainingResult, GatewayError> {
        let body: JsonValue = self.get_json(&self.request_url(request_id)).await?;

        let weight_url = extract_weight_url(&body)
            .ok_or_else(|| GatewayError::Decode("result carries no weight url".to_string()))?;

        Ok(TrainingResult { weight_url })
    }

    /// Poll until the job settles or the attempt bound is reached.
    ///
    /// Poll failures are logged and count as an attempt. Running out of
    /// attempts is not an error: the webhook is expected to deliver the
    /// outcome.
    pub async fn poll_until_settled(&self, request_id: &str) -> PollOutcome {
        let mut last = None;

        for attempt in 1..=self.poll_max_attempts {
            match self.poll_status(request_id).await {
                Ok(status) if status.is_terminal() => {
                    debug!(request_id = %request_id, attempt, "Job settled: {}", status.as_str());
                    return PollOutcome::Settled(status);
                }
                Ok(status) => {
                    debug!(request_id = %request_id, attempt, "Job {}", status.as_str());
                    last = Some(status);
                }
                Err(e) => {
                    warn!(request_id = %request_id, attempt, "Status poll failed: {}", e);
                }
            }

            if attempt < self.poll_max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        PollOutcome::PendingCallback { last }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GatewayError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "{} returned {}: {}",
                url,
                status.as_u16(),
                vendor_message(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// Pull a human-readable message out of a vendor error body.
fn vendor_message(body: &str) -> String {
    let from_json = serde_json::from_str::<JsonValue>(body).ok().and_then(|json| {
        ["detail", "message", "error"].iter().find_map(|key| match json.get(*key) {
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(JsonValue::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    });

    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return "no error detail".to_string();
    }

    message.chars().take(MAX_VENDOR_MESSAGE).collect()
}
