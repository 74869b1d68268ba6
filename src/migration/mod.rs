//! SeaORM database migrations.
//!
//! The server database and the on-device image index are separate databases,
//! each with its own migrator.

pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_headshot_profiles;
mod m20250301_000002_create_profile_images;

/// Server database migrations.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250301_000001_create_headshot_profiles::Migration)]
    }
}

/// On-device image index migrations.
pub struct DeviceMigrator;

#[async_trait::async_trait]
impl MigratorTrait for DeviceMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250301_000002_create_profile_images::Migration)]
    }
}
