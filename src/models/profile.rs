//! Headshot profile domain models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::headshot_profile;

/// Images a profile needs before it can be submitted for training.
pub const MIN_IMAGES: usize = 10;

/// Images a profile may hold.
pub const MAX_IMAGES: usize = 30;

/// Prefix of every trigger phrase.
const TRIGGER_PREFIX: &str = "hs";

/// Profile lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    /// Images collected, nothing submitted yet.
    NotReady,
    /// A training job is outstanding.
    GettingReady,
    /// Training finished and `weight_url` is set.
    Ready,
    /// Some pipeline stage failed.
    Failed,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::GettingReady => "getting_ready",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_ready" => Some(Self::NotReady),
            "getting_ready" => Some(Self::GettingReady),
            "ready" => Some(Self::Ready),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the trigger phrase for a profile id.
///
/// The phrase is a lowercase alphanumeric token, so it is safe inside archive
/// entry names and prompts.
pub fn trigger_phrase_for(id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!("{}{}", TRIGGER_PREFIX, &simple[..10])
}

/// Create profile request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProfileRequest {
    /// Owning user.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
}

/// Profile as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: ProfileStatus,
    pub trigger_phrase: String,
    pub total_images: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<headshot_profile::Model> for ProfileResponse {
    fn from(model: headshot_profile::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            // Rows are only ever written through ProfileStatus::as_str.
            status: ProfileStatus::parse(&model.status).unwrap_or(ProfileStatus::Failed),
            trigger_phrase: model.trigger_phrase,
            total_images: model.total_images,
            weight_url: model.weight_url,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Synchronous acknowledgement of a prepare request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PrepareResponse {
    pub fn accepted(request_id: String) -> Self {
        Self {
            success: true,
            request_id: Some(request_id),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: None,
            error: Some(error.into()),
        }
    }
}
