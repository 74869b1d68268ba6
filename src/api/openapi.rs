//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Headshot Pipeline Server",
        version = "0.1.0",
        description = "Prepares headshot profile photos for remote model training and reconciles training callbacks"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Profile endpoints
        api::profiles::create_profile,
        api::profiles::delete_profile,
        api::profiles::prepare_profile,
        api::profiles::get_job_status,
        // Webhooks
        api::webhook::training_webhook,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Profiles
            models::ProfileStatus,
            models::CreateProfileRequest,
            models::ProfileResponse,
            models::PrepareResponse,
            // Training
            models::JobStatus,
            models::JobStatusResponse,
            // Webhooks
            models::WebhookAck,
            models::WebhookErrorBody,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Profiles", description = "Profile lifecycle and training submission"),
        (name = "Webhooks", description = "Training vendor callbacks")
    )
)]
pub struct ApiDoc;
