//! Device-side pipeline: the local image store and the submission client.
//!
//! Front-ends link against this module; nothing here runs inside the server.

pub mod image_store;
pub mod submission;

use std::env;
use std::path::PathBuf;

use crate::config::ConfigError;

pub use image_store::{ImageStore, ImageStoreError, ProfileImage, SaveOutcome};
pub use submission::{
    ProfileClient, SubmissionClient, SubmitError, SubmitOutcome, check_submittable,
};

/// Default backend for local development.
const DEV_BACKEND_URL: &str = "http://localhost:8080";

/// Device-side configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the pipeline server
    pub backend_url: String,
    /// Directory holding the image store
    pub storage_root: PathBuf,
}

impl ClientConfig {
    pub fn new(backend_url: impl Into<String>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            storage_root: storage_root.into(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// - `HS_BACKEND_URL`: pipeline server (default: http://localhost:8080)
    /// - `HS_STORAGE_ROOT`: image store directory - REQUIRED
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_url =
            env::var("HS_BACKEND_URL").unwrap_or_else(|_| DEV_BACKEND_URL.to_string());
        let storage_root = env::var("HS_STORAGE_ROOT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("HS_STORAGE_ROOT"))?;

        Ok(Self::new(backend_url, storage_root))
    }
}
