//! Database queries for headshot profiles.
//!
//! Status writes are single conditional UPDATE statements keyed by profile id,
//! so concurrent submissions and repeated webhook deliveries cannot interleave
//! a read and a write.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::headshot_profile::{self as profile, ActiveModel, Entity as Profile};
use crate::error::{AppError, AppResult};
use crate::models::{ProfileStatus, trigger_phrase_for};

use super::DbPool;

impl DbPool {
    /// Insert a new profile with a freshly derived trigger phrase.
    pub async fn insert_profile(&self, user_id: Uuid, name: &str) -> AppResult<profile::Model> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let model = ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            name: Set(name.to_string()),
            status: Set(ProfileStatus::NotReady.as_str().to_string()),
            trigger_phrase: Set(trigger_phrase_for(id)),
            total_images: Set(0),
            weight_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert profile: {}", e)))?;

        Ok(result)
    }

    /// Get a profile by ID.
    pub async fn get_profile_by_id(&self, id: Uuid) -> AppResult<Option<profile::Model>> {
        let result = Profile::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get profile: {}", e)))?;

        Ok(result)
    }

    /// Move a profile to `getting_ready` unless a job is already outstanding.
    ///
    /// Returns the claimed profile. Fails with `Conflict` while another job for
    /// the same profile is running and `NotFound` for unknown ids.
    pub async fn claim_for_training(&self, id: Uuid) -> AppResult<profile::Model> {
        let result = Profile::update_many()
            .col_expr(
                profile::Column::Status,
                Expr::value(ProfileStatus::GettingReady.as_str()),
            )
            .col_expr(profile::Column::WeightUrl, Expr::value(Option::<String>::None))
            .col_expr(profile::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profile::Column::Id.eq(id))
            .filter(profile::Column::Status.ne(ProfileStatus::GettingReady.as_str()))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to claim profile: {}", e)))?;

        let current = self
            .get_profile_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {}", id)))?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "Profile {} already has a training job in progress",
                id
            )));
        }

        Ok(current)
    }

    /// Record how many images were accepted for the current submission.
    pub async fn set_total_images(&self, id: Uuid, total_images: i32) -> AppResult<()> {
        Profile::update_many()
            .col_expr(profile::Column::TotalImages, Expr::value(total_images))
            .col_expr(profile::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profile::Column::Id.eq(id))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update image count: {}", e)))?;

        Ok(())
    }

    /// Mark a profile ready with its trained weight URL.
    ///
    /// Pure overwrite keyed by id; applying it twice yields the same row.
    pub async fn mark_profile_ready(&self, id: Uuid, weight_url: &str) -> AppResult<u64> {
        let result = Profile::update_many()
            .col_expr(
                profile::Column::Status,
                Expr::value(ProfileStatus::Ready.as_str()),
            )
            .col_expr(profile::Column::WeightUrl, Expr::value(weight_url))
            .col_expr(profile::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profile::Column::Id.eq(id))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark profile ready: {}", e)))?;

        Ok(result.rows_affected)
    }

    /// Mark a profile failed after a local pipeline stage failed.
    pub async fn mark_profile_failed(&self, id: Uuid) -> AppResult<u64> {
        self.update_failed(id, Condition::all()).await
    }

    /// Mark a profile failed from a vendor callback.
    ///
    /// A `ready` profile is only regressed when the callback carries its own
    /// timestamp newer than the profile's last update; anything else is a
    /// stale or duplicate delivery.
    pub async fn mark_profile_failed_from_callback(
        &self,
        id: Uuid,
        sent_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        let not_ready = profile::Column::Status.ne(ProfileStatus::Ready.as_str());
        let guard = match sent_at {
            Some(sent_at) => Condition::any()
                .add(not_ready)
                .add(profile::Column::UpdatedAt.lt(sent_at)),
            None => Condition::all().add(not_ready),
        };

        self.update_failed(id, guard).await
    }

    async fn update_failed(&self, id: Uuid, guard: Condition) -> AppResult<u64> {
        let result = Profile::update_many()
            .col_expr(
                profile::Column::Status,
                Expr::value(ProfileStatus::Failed.as_str()),
            )
            .col_expr(profile::Column::WeightUrl, Expr::value(Option::<String>::None))
            .col_expr(profile::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(profile::Column::Id.eq(id))
            .filter(guard)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark profile failed: {}", e)))?;

        Ok(result.rows_affected)
    }

    /// Delete a profile. Returns false when it did not exist.
    pub async fn delete_profile(&self, id: Uuid) -> AppResult<bool> {
        let result = Profile::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete profile: {}", e)))?;

        Ok(result.rows_affected > 0)
    }
}
