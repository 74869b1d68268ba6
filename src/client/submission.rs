//! Upload/submission client.
//!
//! Sends a profile's images to the pipeline server as one multipart request
//! and interprets the synchronous acknowledgement. There is no automatic
//! retry; the caller decides whether to submit again.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use super::ClientConfig;
use super::image_store::{ImageStore, ImageStoreError};
use crate::models::{CreateProfileRequest, MAX_IMAGES, MIN_IMAGES, ProfileResponse};

/// Submission and profile client failures.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("need at least {} images", MIN_IMAGES)]
    TooFewImages { count: usize },

    #[error("at most {} images", MAX_IMAGES)]
    TooManyImages { count: usize },

    /// A local image could not be read.
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// The server answered with a failure; `message` is its error text.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response from server: {0}")]
    Decode(String),

    #[error(transparent)]
    Store(#[from] ImageStoreError),
}

/// Check a profile's image count before submitting.
pub fn check_submittable(count: usize) -> Result<(), SubmitError> {
    if count < MIN_IMAGES {
        return Err(SubmitError::TooFewImages { count });
    }
    if count > MAX_IMAGES {
        return Err(SubmitError::TooManyImages { count });
    }
    Ok(())
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub accepted: bool,
    pub request_id: Option<String>,
    pub error: Option<String>,
}

impl SubmitOutcome {
    fn accepted(request_id: Option<String>) -> Self {
        Self {
            accepted: true,
            request_id,
            error: None,
        }
    }

    fn failed(error: &SubmitError) -> Self {
        Self {
            accepted: false,
            request_id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Client for the prepare endpoint.
#[derive(Clone)]
pub struct SubmissionClient {
    http: reqwest::Client,
    backend_url: String,
}

impl SubmissionClient {
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            backend_url: config.backend_url.clone(),
        }
    }

    fn prepare_url(&self, profile_id: &str) -> String {
        format!(
            "{}/api/profiles/{}/prepare",
            self.backend_url,
            urlencoding::encode(profile_id)
        )
    }

    /// Submit `images` for a profile.
    ///
    /// `on_progress` receives 0.0 first and then the fraction of image parts
    /// prepared so far, ending at 1.0.
    pub async fn submit<F>(
        &self,
        profile_id: &str,
        trigger_phrase: &str,
        images: &[PathBuf],
        on_progress: F,
    ) -> SubmitOutcome
    where
        F: FnMut(f32),
    {
        match self
            .try_submit(profile_id, trigger_phrase, images, on_progress)
            .await
        {
            Ok(request_id) => {
                info!(profile_id = %profile_id, ?request_id, "Submission accepted");
                SubmitOutcome::accepted(request_id)
            }
            Err(e) => {
                warn!(profile_id = %profile_id, "Submission failed: {}", e);
                SubmitOutcome::failed(&e)
            }
        }
    }

    async fn try_submit<F>(
        &self,
        profile_id: &str,
        trigger_phrase: &str,
        images: &[PathBuf],
        mut on_progress: F,
    ) -> Result<Option<String>, SubmitError>
    where
        F: FnMut(f32),
    {
        on_progress(0.0);

        let mut form = Form::new()
            .text("profileId", profile_id.to_string())
            .text("triggerPhrase", trigger_phrase.to_string());

        let total = images.len().max(1) as f32;
        for (index, path) in images.iter().enumerate() {
            form = form.part("images", image_part(path).await?);
            on_progress((index + 1) as f32 / total);
        }
        if images.is_empty() {
            on_progress(1.0);
        }

        let response = self
            .http
            .post(self.prepare_url(profile_id))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        interpret_response(status, &body)
    }
}

async fn image_part(path: &Path) -> Result<Part, SubmitError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| SubmitError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(image_mime(path))
        .map_err(|e| SubmitError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

fn image_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        _ => "image/jpeg",
    }
}

/// Interpret the prepare endpoint's answer.
///
/// Acceptance is a 2xx status with `success: true`. Anything else fails,
/// carrying the server's `error` text verbatim when there is one.
pub fn interpret_response(status: u16, body: &str) -> Result<Option<String>, SubmitError> {
    let json = serde_json::from_str::<JsonValue>(body).ok();
    let success = json
        .as_ref()
        .and_then(|j| j.get("success"))
        .and_then(JsonValue::as_bool);
    let server_error = json.as_ref().and_then(|j| {
        ["error", "message"]
            .iter()
            .find_map(|key| j.get(*key).and_then(JsonValue::as_str))
            .map(str::to_string)
    });

    let is_success = (200..300).contains(&status);
    match (is_success, success) {
        (true, Some(true)) => Ok(json
            .as_ref()
            .and_then(|j| j.get("requestId"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)),
        (true, None) if server_error.is_none() => Err(SubmitError::Decode(
            "missing success flag".to_string(),
        )),
        _ => Err(SubmitError::Rejected {
            status,
            message: server_error
                .unwrap_or_else(|| format!("Request failed with status {}", status)),
        }),
    }
}

/// Client for profile lifecycle calls.
#[derive(Clone)]
pub struct ProfileClient {
    http: reqwest::Client,
    backend_url: String,
}

impl ProfileClient {
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            backend_url: config.backend_url.clone(),
        }
    }

    /// Create a profile on the server.
    pub async fn create_profile(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<ProfileResponse, SubmitError> {
        let response = self
            .http
            .post(format!("{}/api/profiles", self.backend_url))
            .json(&CreateProfileRequest {
                user_id,
                name: name.to_string(),
            })
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejected(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| SubmitError::Decode(e.to_string()))
    }

    /// Delete a profile on the server, then clear its local images.
    ///
    /// A profile the server no longer knows is still cleared locally.
    pub async fn delete_profile(
        &self,
        profile_id: &str,
        store: &ImageStore,
    ) -> Result<(), SubmitError> {
        let response = self
            .http
            .delete(format!(
                "{}/api/profiles/{}",
                self.backend_url,
                urlencoding::encode(profile_id)
            ))
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(rejected(status.as_u16(), &body));
        }

        store.delete_all_images(profile_id).await?;
        info!(profile_id = %profile_id, "Profile deleted");
        Ok(())
    }
}

fn rejected(status: u16, body: &str) -> SubmitError {
    let message = serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|j| {
            ["message", "error"]
                .iter()
                .find_map(|key| j.get(*key).and_then(JsonValue::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("Request failed with status {}", status));
    SubmitError::Rejected { status, message }
}
