//! Training archive builder.
//!
//! Bundles a profile's images into a single zip. Entries are named
//! `{trigger}_{n}.jpg` where `n` is the 1-based position in the caller's list,
//! so the vendor associates every file with the profile's concept token.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tempfile::TempPath;
use tracing::{info, warn};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Name of the optional manifest entry.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Archive build failures.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// No image could be read or fetched.
    #[error("No usable images for the archive ({skipped} skipped)")]
    Empty { skipped: usize },

    /// Serializing or writing the archive failed.
    #[error("Failed to write archive: {0}")]
    Write(String),
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Write(err.to_string())
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::Write(err.to_string())
    }
}

/// Where an image's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Local(PathBuf),
    Remote(String),
}

impl ImageSource {
    /// Classify a reference: `http(s)://` URLs are fetched, anything else is a
    /// local path (a `file://` prefix is stripped).
    pub fn parse(reference: &str) -> Self {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            Self::Remote(reference.to_string())
        } else {
            let path = reference.strip_prefix("file://").unwrap_or(reference);
            Self::Local(PathBuf::from(path))
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote(url) => url.clone(),
        }
    }
}

/// Manifest embedded in the archive.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveManifest {
    pub profile_id: String,
    pub trigger_phrase: String,
    pub image_count: usize,
    pub skipped: usize,
    pub created_at: DateTime<Utc>,
}

/// A built archive on disk. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct PreparedArchive {
    pub path: TempPath,
    pub manifest: ArchiveManifest,
    /// Image entry names in archive order.
    pub entries: Vec<String>,
    pub size: u64,
}

/// Archive entry name for the image at `index` (0-based).
pub fn entry_name(trigger_phrase: &str, index: usize) -> String {
    format!("{}_{}.jpg", trigger_phrase, index + 1)
}

/// Builds training archives.
#[derive(Clone)]
pub struct ArchiveBuilder {
    http: reqwest::Client,
    include_manifest: bool,
}

impl ArchiveBuilder {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            include_manifest: true,
        }
    }

    /// Toggle the `manifest.json` entry.
    pub fn with_manifest(mut self, include_manifest: bool) -> Self {
        self.include_manifest = include_manifest;
        self
    }

    /// Build an archive from `images` in order.
    ///
    /// Images that cannot be read are logged and skipped; their position is
    /// not reused, so entry numbers always match the caller's ordering.
    pub async fn build(
        &self,
        profile_id: &str,
        images: &[ImageSource],
        trigger_phrase: &str,
    ) -> Result<PreparedArchive, ArchiveError> {
        let resolved = join_all(images.iter().map(|image| self.resolve(image))).await;

        let mut entries = Vec::with_capacity(images.len());
        let mut skipped = 0;
        for (index, (image, bytes)) in images.iter().zip(resolved).enumerate() {
            match bytes {
                Ok(bytes) => entries.push((entry_name(trigger_phrase, index), bytes)),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        profile_id = %profile_id,
                        image = %image.describe(),
                        error = %e,
                        "Skipping unreadable image"
                    );
                }
            }
        }

        if entries.is_empty() {
            return Err(ArchiveError::Empty { skipped });
        }

        let manifest = ArchiveManifest {
            profile_id: profile_id.to_string(),
            trigger_phrase: trigger_phrase.to_string(),
            image_count: entries.len(),
            skipped,
            created_at: Utc::now(),
        };
        let manifest_bytes = if self.include_manifest {
            Some(serde_json::to_vec_pretty(&manifest).map_err(|e| ArchiveError::Write(e.to_string()))?)
        } else {
            None
        };

        let names: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();

        // zip writing is blocking I/O
        let (path, size) =
            tokio::task::spawn_blocking(move || write_archive(entries, manifest_bytes))
                .await
                .map_err(|e| ArchiveError::Write(format!("archive task failed: {}", e)))??;

        info!(
            profile_id = %profile_id,
            images = names.len(),
            skipped,
            size,
            "Training archive built"
        );

        Ok(PreparedArchive {
            path,
            manifest,
            entries: names,
            size,
        })
    }

    async fn resolve(&self, image: &ImageSource) -> Result<Vec<u8>, String> {
        match image {
            ImageSource::Local(path) => tokio::fs::read(path).await.map_err(|e| e.to_string()),
            ImageSource::Remote(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?
                    .error_for_status()
                    .map_err(|e| e.to_string())?;
                let bytes = response.bytes().await.map_err(|e| e.to_string())?;
                Ok(bytes.to_vec())
            }
        }
    }
}

fn write_archive(
    entries: Vec<(String, Vec<u8>)>,
    manifest: Option<Vec<u8>>,
) -> Result<(TempPath, u64), ArchiveError> {
    let file = tempfile::Builder::new()
        .prefix("hs-archive-")
        .suffix(".zip")
        .tempfile()?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(file);

    for (name, bytes) in entries {
        zip.start_file(name, options)?;
        zip.write_all(&bytes)?;
    }
    if let Some(manifest) = manifest {
        zip.start_file(MANIFEST_ENTRY, options)?;
        zip.write_all(&manifest)?;
    }

    let file = zip.finish()?;
    let size = file.as_file().metadata()?.len();

    Ok((file.into_temp_path(), size))
}
