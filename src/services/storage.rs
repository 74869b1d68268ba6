//! S3 storage service for training archives.
//!
//! Archives are uploaded once and handed to the training vendor as presigned
//! GET URLs. Supports both AWS S3 and MinIO for development.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StorageSettings;
use crate::error::{AppError, AppResult};

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    url_ttl: Duration,
}

impl Storage {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &StorageSettings) -> AppResult<Self> {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "headshot");

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let storage = Self {
            client,
            bucket: config.bucket.clone(),
            url_ttl: Duration::from_secs(config.archive_url_ttl_secs),
        };

        storage.ensure_bucket_exists().await?;

        info!("S3 storage initialized: bucket={}", config.bucket);

        Ok(storage)
    }

    /// Ensure the bucket exists, creating it if necessary.
    async fn ensure_bucket_exists(&self) -> AppResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    info!("Creating S3 bucket '{}'", self.bucket);
                    self.client
                        .create_bucket()
                        .bucket(&self.bucket)
                        .send()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!("Failed to create bucket: {}", e))
                        })?;
                    Ok(())
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to access bucket '{}': {}",
                        self.bucket, service_error
                    )))
                }
            }
        }
    }

    /// Upload an archive file from disk.
    pub async fn put_archive(&self, key: &str, path: &Path) -> AppResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| AppError::FileSystem(format!("Failed to read archive: {}", e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/zip")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload archive to S3: {}", e)))?;

        Ok(())
    }

    /// Presigned GET URL for an object.
    pub async fn presigned_url(&self, key: &str) -> AppResult<String> {
        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| AppError::Storage(format!("Invalid presign lifetime: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to presign archive URL: {}", e)))?;

        Ok(request.uri().to_string())
    }

    /// Delete every object under a prefix. Returns the number deleted.
    ///
    /// Individual delete failures are logged and skipped.
    pub async fn delete_prefix(&self, prefix: &str) -> AppResult<usize> {
        let mut deleted = 0;
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to list objects: {}", e)))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                match self
                    .client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                {
                    Ok(_) => deleted += 1,
                    Err(e) => warn!(key = %key, "Failed to delete object: {}", e),
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(deleted)
    }

    /// Key prefix holding every archive of a profile.
    pub fn archive_prefix(profile_id: &str) -> String {
        format!("archives/{}/", profile_id)
    }

    /// Collision-resistant archive key that carries the trigger phrase.
    ///
    /// Format: `archives/{profile_id}/{trigger}_{timestamp_ms}_{suffix}.zip`
    pub fn archive_key(profile_id: &str, trigger_phrase: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}{}_{}_{}.zip",
            Self::archive_prefix(profile_id),
            trigger_phrase,
            Utc::now().timestamp_millis(),
            &suffix[..8]
        )
    }
}
