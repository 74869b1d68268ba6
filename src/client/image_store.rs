//! Local image store.
//!
//! Picked images are copied under `{root}/{profile_id}/{id}.jpg` and indexed
//! in an embedded SQLite database at `{root}/metadata.db`. A profile never
//! holds more than [`MAX_IMAGES`] images.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entity::profile_image::{self, ActiveModel, Entity as ProfileImageEntity};
use crate::migration::DeviceMigrator;
use crate::models::MAX_IMAGES;

pub use crate::entity::profile_image::Model as ProfileImage;

/// File name of the index database.
pub const INDEX_FILE: &str = "metadata.db";

/// Largest image the store accepts (10MB).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Image store failures.
#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    /// Reading or writing image files failed.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The metadata index could not be read or written.
    #[error("Image index failure: {0}")]
    Index(String),

    /// The profile id cannot be used as a directory name.
    #[error("Invalid profile id: {0}")]
    InvalidProfile(String),
}

impl From<sea_orm::DbErr> for ImageStoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        ImageStoreError::Index(err.to_string())
    }
}

/// Result of [`ImageStore::save_images`].
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// Records created by this call, in source order.
    pub saved: Vec<ProfileImage>,
    /// Sources rejected because the profile reached its image cap.
    pub dropped: usize,
}

/// Profile-scoped image storage with a SQLite index.
pub struct ImageStore {
    root: PathBuf,
    db: DatabaseConnection,
    write_lock: Mutex<()>,
}

impl ImageStore {
    /// Open (or create) the store under `root`.
    ///
    /// An index that cannot be opened or migrated is moved aside and replaced
    /// with an empty one.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ImageStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ImageStoreError::Storage(format!("Failed to create store root: {}", e)))?;

        let index_path = root.join(INDEX_FILE);
        let db = match open_index(&index_path).await {
            Ok(db) => db,
            Err(e) => {
                let aside = root.join(format!(
                    "{}.corrupt-{}",
                    INDEX_FILE,
                    Utc::now().timestamp_millis()
                ));
                warn!(
                    "Image index at {} is unusable ({}), moving it to {}",
                    index_path.display(),
                    e,
                    aside.display()
                );
                tokio::fs::rename(&index_path, &aside).await.map_err(|e| {
                    ImageStoreError::Index(format!("Failed to move corrupt index aside: {}", e))
                })?;
                open_index(&index_path).await?
            }
        };

        info!("Image store opened at {}", root.display());

        Ok(Self {
            root,
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn profile_dir(&self, profile_id: &str) -> Result<PathBuf, ImageStoreError> {
        let valid = !profile_id.is_empty()
            && profile_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ImageStoreError::InvalidProfile(profile_id.to_string()));
        }
        Ok(self.root.join(profile_id))
    }

    /// Copy `sources` into the profile's storage and index them.
    ///
    /// Sources beyond the profile's remaining capacity are not copied and are
    /// reported in [`SaveOutcome::dropped`]. If any copy fails, every file
    /// written by this call is removed and the index is left untouched.
    pub async fn save_images(
        &self,
        profile_id: &str,
        sources: &[PathBuf],
    ) -> Result<SaveOutcome, ImageStoreError> {
        let dir = self.profile_dir(profile_id)?;
        let _guard = self.write_lock.lock().await;

        let existing = ProfileImageEntity::find()
            .filter(profile_image::Column::ProfileId.eq(profile_id))
            .order_by_desc(profile_image::Column::Position)
            .all(&self.db)
            .await?;
        let capacity = MAX_IMAGES.saturating_sub(existing.len());
        let accepted = &sources[..sources.len().min(capacity)];
        let dropped = sources.len() - accepted.len();
        if dropped > 0 {
            warn!(
                profile_id = %profile_id,
                dropped,
                "Profile image cap reached, dropping images"
            );
        }
        if accepted.is_empty() {
            return Ok(SaveOutcome {
                saved: Vec::new(),
                dropped,
            });
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ImageStoreError::Storage(format!("Failed to create directory: {}", e)))?;

        let mut written: Vec<(String, PathBuf)> = Vec::with_capacity(accepted.len());
        for source in accepted {
            let id = Uuid::new_v4().simple().to_string();
            let target = dir.join(format!("{}.jpg", id));
            if let Err(e) = tokio::fs::copy(source, &target).await {
                remove_files(written.iter().map(|(_, path)| path.as_path())).await;
                return Err(ImageStoreError::Storage(format!(
                    "Failed to copy {}: {}",
                    source.display(),
                    e
                )));
            }
            written.push((id, target));
        }

        let next_position = existing.first().map(|m| m.position + 1).unwrap_or(0);
        match self
            .insert_rows(profile_id, &written, next_position)
            .await
        {
            Ok(saved) => {
                debug!(profile_id = %profile_id, saved = saved.len(), "Images saved");
                Ok(SaveOutcome { saved, dropped })
            }
            Err(e) => {
                remove_files(written.iter().map(|(_, path)| path.as_path())).await;
                Err(e)
            }
        }
    }

    async fn insert_rows(
        &self,
        profile_id: &str,
        written: &[(String, PathBuf)],
        first_position: i64,
    ) -> Result<Vec<ProfileImage>, ImageStoreError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let mut saved = Vec::with_capacity(written.len());

        for (offset, (id, path)) in written.iter().enumerate() {
            let model = ActiveModel {
                id: Set(id.clone()),
                profile_id: Set(profile_id.to_string()),
                image_url: Set(path.to_string_lossy().into_owned()),
                position: Set(first_position + offset as i64),
                created_at: Set(now),
            };
            saved.push(model.insert(&txn).await?);
        }

        txn.commit().await?;
        Ok(saved)
    }

    /// Images of a profile in insertion order. Empty when there are none.
    pub async fn get_images(&self, profile_id: &str) -> Result<Vec<ProfileImage>, ImageStoreError> {
        let images = ProfileImageEntity::find()
            .filter(profile_image::Column::ProfileId.eq(profile_id))
            .order_by_asc(profile_image::Column::Position)
            .all(&self.db)
            .await?;
        Ok(images)
    }

    /// Number of images stored for a profile.
    pub async fn count_images(&self, profile_id: &str) -> Result<u64, ImageStoreError> {
        let count = ProfileImageEntity::find()
            .filter(profile_image::Column::ProfileId.eq(profile_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    /// Remove one image. A file that is already gone is not an error.
    pub async fn delete_image(
        &self,
        profile_id: &str,
        image_id: &str,
        image_path: &Path,
    ) -> Result<(), ImageStoreError> {
        let _guard = self.write_lock.lock().await;

        ProfileImageEntity::delete_many()
            .filter(profile_image::Column::ProfileId.eq(profile_id))
            .filter(profile_image::Column::Id.eq(image_id))
            .exec(&self.db)
            .await?;

        match tokio::fs::remove_file(image_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ImageStoreError::Storage(format!(
                "Failed to delete {}: {}",
                image_path.display(),
                e
            ))),
        }
    }

    /// Remove a profile's storage directory and index entries.
    pub async fn delete_all_images(&self, profile_id: &str) -> Result<(), ImageStoreError> {
        let dir = self.profile_dir(profile_id)?;
        let _guard = self.write_lock.lock().await;

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ImageStoreError::Storage(format!(
                    "Failed to delete {}: {}",
                    dir.display(),
                    e
                )));
            }
        }

        let result = ProfileImageEntity::delete_many()
            .filter(profile_image::Column::ProfileId.eq(profile_id))
            .exec(&self.db)
            .await?;

        info!(
            profile_id = %profile_id,
            removed = result.rows_affected,
            "Profile images cleared"
        );
        Ok(())
    }

    /// True when `path` is an existing file no larger than [`MAX_IMAGE_BYTES`].
    pub async fn validate_image(path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file() && meta.len() <= MAX_IMAGE_BYTES,
            Err(_) => false,
        }
    }
}

async fn open_index(path: &Path) -> Result<DatabaseConnection, ImageStoreError> {
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(1)
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    if let Err(e) = DeviceMigrator::up(&db, None).await {
        let _ = db.close().await;
        return Err(e.into());
    }
    Ok(db)
}

async fn remove_files<'a>(paths: impl Iterator<Item = &'a Path>) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to roll back {}: {}", path.display(), e);
        }
    }
}
