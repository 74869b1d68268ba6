//! Domain models for the headshot pipeline.

pub mod profile;
pub mod training;
pub mod webhook;

// Re-export commonly used types
pub use profile::{
    CreateProfileRequest, MAX_IMAGES, MIN_IMAGES, PrepareResponse, ProfileResponse, ProfileStatus,
    trigger_phrase_for,
};
pub use training::{
    JobStatus, JobStatusResponse, PollOutcome, TrainingInput, TrainingResult, extract_weight_url,
};
pub use webhook::{CallbackOutcome, CallbackQuery, TrainingCallback, WebhookAck, WebhookErrorBody};
