//! Business logic services.

pub mod archive;
pub mod preparation;
pub mod storage;
pub mod training;

pub use archive::{ArchiveBuilder, ArchiveError, ImageSource};
pub use preparation::{ArchiveStore, PreparationService};
pub use storage::Storage;
pub use training::{GatewayError, TrainingGateway};
