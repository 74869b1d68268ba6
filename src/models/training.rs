//! Training job models and vendor status normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Learning rate the headshot workflow is trained with.
pub const LEARNING_RATE: f64 = 0.00009;

/// Training steps per job.
pub const TRAINING_STEPS: u32 = 1000;

/// Normalized training job status.
///
/// Vendor vocabulary differs between the queue status endpoint and webhook
/// deliveries, so everything funnels through [`JobStatus::from_vendor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Enqueued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Map a vendor status string, returning `None` for vocabulary we do not know.
    pub fn recognize(vendor: &str) -> Option<Self> {
        match vendor.trim().to_ascii_uppercase().as_str() {
            "IN_QUEUE" | "QUEUED" | "PENDING" | "ENQUEUED" => Some(Self::Enqueued),
            "IN_PROGRESS" | "RUNNING" | "PROCESSING" | "STARTED" => Some(Self::Running),
            "COMPLETED" | "OK" | "SUCCEEDED" | "SUCCESS" => Some(Self::Succeeded),
            "ERROR" | "FAILED" | "FAILURE" | "CANCELLED" | "CANCELED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Map a vendor status string. Unknown strings count as still running so a
    /// vocabulary change never marks a job failed.
    pub fn from_vendor(vendor: &str) -> Self {
        Self::recognize(vendor).unwrap_or(Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueued => "ENQUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Result of a bounded status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The vendor reported a terminal status within the attempt bound.
    Settled(JobStatus),
    /// Attempts ran out while the job was still queued or running; the webhook
    /// is expected to finish reconciliation.
    PendingCallback { last: Option<JobStatus> },
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settled(status) => status.as_str(),
            Self::PendingCallback { .. } => "PENDING_CALLBACK",
        }
    }
}

/// Metadata attached to a training submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetadata {
    #[serde(rename = "headshotProfileId")]
    pub headshot_profile_id: String,
}

/// Training submission body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingInput {
    pub images_data_url: String,
    pub trigger_phrase: String,
    pub learning_rate: f64,
    pub steps: u32,
    pub multiresolution_training: bool,
    pub subject_crop: bool,
    pub metadata: TrainingMetadata,
}

impl TrainingInput {
    pub fn new(archive_url: &str, trigger_phrase: &str, profile_id: &str) -> Self {
        Self {
            images_data_url: archive_url.to_string(),
            trigger_phrase: trigger_phrase.to_string(),
            learning_rate: LEARNING_RATE,
            steps: TRAINING_STEPS,
            multiresolution_training: true,
            subject_crop: true,
            metadata: TrainingMetadata {
                headshot_profile_id: profile_id.to_string(),
            },
        }
    }
}

/// Queue submission acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAck {
    pub request_id: String,
}

/// Queue status body.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub status: String,
}

/// Result of a finished training job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainingResult {
    pub weight_url: String,
}

/// Status check response for a profile's job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub request_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_url: Option<String>,
}

/// Locate the trained weight URL inside a vendor result object.
///
/// The workflow has reported it as `output.url`, `diffusers_lora_file.url` and
/// a bare `url` across versions.
pub fn extract_weight_url(result: &JsonValue) -> Option<String> {
    const CANDIDATES: &[&[&str]] = &[
        &["output", "url"],
        &["diffusers_lora_file", "url"],
        &["url"],
    ];

    CANDIDATES.iter().find_map(|path| {
        path.iter()
            .try_fold(result, |node, key| node.get(key))
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    })
}
