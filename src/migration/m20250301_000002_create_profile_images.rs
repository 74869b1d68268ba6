//! Migration: Create profile_images table (on-device image index).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProfileImages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProfileImages::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProfileImages::ProfileId).string().not_null())
                    .col(ColumnDef::new(ProfileImages::ImageUrl).text().not_null())
                    .col(ColumnDef::new(ProfileImages::Position).big_integer().not_null())
                    .col(
                        ColumnDef::new(ProfileImages::CreatedAt)
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
                    .name("idx_profile_images_profile_id")
                    .table(ProfileImages::Table)
                    .col(ProfileImages::ProfileId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProfileImages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProfileImages {
    Table,
    Id,
    ProfileId,
    ImageUrl,
    Position,
    CreatedAt,
}
