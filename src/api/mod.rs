//! API endpoint modules.

pub mod health;
pub mod openapi;
pub mod profiles;
pub mod webhook;

pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use profiles::{UploadLimits, configure_routes as configure_profile_routes};
pub use webhook::configure_routes as configure_webhook_routes;
