//! Migration: Create headshot_profiles table.
//!
//! One row per profile; `status` tracks the training pipeline and
//! `weight_url` is only populated once training succeeded.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HeadshotProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HeadshotProfiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HeadshotProfiles::UserId).uuid().not_null())
                    .col(ColumnDef::new(HeadshotProfiles::Name).string().not_null())
                    .col(
                        ColumnDef::new(HeadshotProfiles::Status)
                            .string_len(20)
                            .not_null()
                            .default("not_ready"),
                    )
                    .col(
                        ColumnDef::new(HeadshotProfiles::TriggerPhrase)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(HeadshotProfiles::TotalImages)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(HeadshotProfiles::WeightUrl).text().null())
                    .col(
                        ColumnDef::new(HeadshotProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(HeadshotProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_headshot_profiles_user_id")
                    .table(HeadshotProfiles::Table)
                    .col(HeadshotProfiles::UserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HeadshotProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum HeadshotProfiles {
    Table,
    Id,
    UserId,
    Name,
    Status,
    TriggerPhrase,
    TotalImages,
    WeightUrl,
    CreatedAt,
    UpdatedAt,
}
