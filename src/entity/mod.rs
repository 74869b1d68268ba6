//! SeaORM entity definitions.

pub mod headshot_profile;
pub mod profile_image;
