//! Prepare pipeline: claim the profile, archive its images, store the archive
//! and queue a training job.
//!
//! Once the claim has moved the profile to `getting_ready`, any failure marks
//! it `failed` before the error is returned. The vendor outcome itself only
//! ever arrives through the webhook.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::PollOutcome;
use crate::services::archive::{ArchiveBuilder, ImageSource};
use crate::services::storage::Storage;
use crate::services::training::TrainingGateway;

/// Object storage for training archives.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Upload the archive at `path` under `key`.
    async fn put_archive(&self, key: &str, path: &Path) -> AppResult<()>;

    /// A URL the vendor can download `key` from.
    async fn presigned_url(&self, key: &str) -> AppResult<String>;

    /// Delete everything under `prefix`, returning the number of objects removed.
    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize>;
}

#[async_trait]
impl ArchiveStore for Storage {
    async fn put_archive(&self, key: &str, path: &Path) -> AppResult<()> {
        Storage::put_archive(self, key, path).await
    }

    async fn presigned_url(&self, key: &str) -> AppResult<String> {
        Storage::presigned_url(self, key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize> {
        Storage::delete_prefix(self, prefix).await
    }
}

/// Orchestrates a profile's training submission.
#[derive(Clone)]
pub struct PreparationService {
    db: DbPool,
    store: Arc<dyn ArchiveStore>,
    gateway: TrainingGateway,
    archives: ArchiveBuilder,
    advisory_poll: bool,
}

impl PreparationService {
    pub fn new(
        db: DbPool,
        store: Arc<dyn ArchiveStore>,
        gateway: TrainingGateway,
        archives: ArchiveBuilder,
    ) -> Self {
        Self {
            db,
            store,
            gateway,
            archives,
            advisory_poll: true,
        }
    }

    /// Toggle the detached status poll that runs after a submission.
    pub fn with_advisory_poll(mut self, enabled: bool) -> Self {
        self.advisory_poll = enabled;
        self
    }

    pub fn gateway(&self) -> &TrainingGateway {
        &self.gateway
    }

    /// Submit `images` for training and return the vendor request id.
    ///
    /// `trigger_phrase` must match the profile's stored phrase.
    pub async fn prepare(
        &self,
        profile_id: Uuid,
        trigger_phrase: &str,
        images: &[ImageSource],
    ) -> AppResult<String> {
        if images.is_empty() {
            return Err(AppError::InvalidInput("No images uploaded".to_string()));
        }
        if trigger_phrase.trim().is_empty() {
            return Err(AppError::InvalidInput("Trigger phrase is required".to_string()));
        }

        let profile = self
            .db
            .get_profile_by_id(profile_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {}", profile_id)))?;

        if trigger_phrase.trim() != profile.trigger_phrase {
            return Err(AppError::InvalidInput(
                "triggerPhrase does not match the profile".to_string(),
            ));
        }

        let profile = self.db.claim_for_training(profile_id).await?;
        info!(
            profile_id = %profile_id,
            images = images.len(),
            "Profile claimed for training"
        );

        match self.submit(profile_id, &profile.trigger_phrase, images).await {
            Ok(request_id) => {
                if self.advisory_poll {
                    spawn_advisory_poll(self.gateway.clone(), profile_id, request_id.clone());
                }
                Ok(request_id)
            }
            Err(e) => {
                warn!(profile_id = %profile_id, "Prepare failed: {}", e);
                if let Err(mark_err) = self.db.mark_profile_failed(profile_id).await {
                    error!(
                        profile_id = %profile_id,
                        "Failed to mark profile failed: {}", mark_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn submit(
        &self,
        profile_id: Uuid,
        trigger_phrase: &str,
        images: &[ImageSource],
    ) -> AppResult<String> {
        let id = profile_id.to_string();

        let archive = self.archives.build(&id, images, trigger_phrase).await?;
        if archive.manifest.skipped > 0 {
            warn!(
                profile_id = %profile_id,
                skipped = archive.manifest.skipped,
                "Some images were left out of the archive"
            );
        }

        let key = Storage::archive_key(&id, trigger_phrase);
        self.store.put_archive(&key, &archive.path).await?;
        let archive_url = self.store.presigned_url(&key).await?;

        let image_count = i32::try_from(archive.manifest.image_count).unwrap_or(i32::MAX);
        drop(archive);

        self.db.set_total_images(profile_id, image_count).await?;

        let request_id = self
            .gateway
            .submit_training_job(&archive_url, trigger_phrase, &id)
            .await?;

        Ok(request_id)
    }

    /// Delete a profile and, best-effort, its stored archives.
    pub async fn delete_profile(&self, profile_id: Uuid) -> AppResult<()> {
        if !self.db.delete_profile(profile_id).await? {
            return Err(AppError::NotFound(format!("Profile {}", profile_id)));
        }

        let prefix = Storage::archive_prefix(&profile_id.to_string());
        match self.store.delete_prefix(&prefix).await {
            Ok(deleted) => info!(profile_id = %profile_id, deleted, "Profile deleted"),
            Err(e) => warn!(
                profile_id = %profile_id,
                "Profile deleted but archive cleanup failed: {}", e
            ),
        }

        Ok(())
    }
}

/// Run the bounded poll in the background and log what it saw.
///
/// Never writes profile state.
fn spawn_advisory_poll(gateway: TrainingGateway, profile_id: Uuid, request_id: String) {
    tokio::spawn(async move {
        match gateway.poll_until_settled(&request_id).await {
            PollOutcome::Settled(status) => info!(
                profile_id = %profile_id,
                request_id = %request_id,
                "Training job settled: {}", status.as_str()
            ),
            outcome @ PollOutcome::PendingCallback { .. } => info!(
                profile_id = %profile_id,
                request_id = %request_id,
                "Training job still running, awaiting webhook ({})", outcome.as_str()
            ),
        }
    });
}
