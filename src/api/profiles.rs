//! Profile endpoints: create, delete, prepare for training, job status.

use std::path::{Path, PathBuf};

use actix_multipart::{Field, Multipart};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateProfileRequest, JobStatus, JobStatusResponse, PrepareResponse, ProfileResponse,
};
use crate::services::archive::{ArchiveError, ImageSource};
use crate::services::preparation::PreparationService;

/// Image extensions (and MIME subtypes) accepted by the prepare endpoint.
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["jpeg", "jpg", "png", "heic", "heif"];

/// Per-request upload limits.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_image_size: usize,
}

impl From<&Config> for UploadLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_files: config.max_files_per_request,
            max_image_size: config.max_image_size,
        }
    }
}

/// Configure profile routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/profiles").route(web::post().to(create_profile)))
        .service(web::resource("/profiles/{profile_id}").route(web::delete().to(delete_profile)))
        .service(
            web::resource("/profiles/{profile_id}/prepare").route(web::post().to(prepare_profile)),
        )
        .service(
            web::resource("/profiles/{profile_id}/jobs/{request_id}")
                .route(web::get().to(get_job_status)),
        );
}

/// Create a profile.
///
/// The trigger phrase is derived from the new id and never changes.
#[utoipa::path(
    post,
    path = "/api/profiles",
    tag = "Profiles",
    request_body = CreateProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = ProfileResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
    )
)]
pub async fn create_profile(
    pool: web::Data<DbPool>,
    body: web::Json<CreateProfileRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("name must not be empty".to_string()));
    }

    let profile = pool.insert_profile(req.user_id, name).await?;
    info!(profile_id = %profile.id, user_id = %profile.user_id, "Profile created");

    Ok(HttpResponse::Created().json(ProfileResponse::from(profile)))
}

/// Delete a profile and its stored training archives.
#[utoipa::path(
    delete,
    path = "/api/profiles/{profile_id}",
    tag = "Profiles",
    params(
        ("profile_id" = Uuid, Path, description = "Profile UUID")
    ),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 404, description = "Profile not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn delete_profile(
    service: web::Data<PreparationService>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    service.delete_profile(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Submit a profile's images for training.
///
/// Multipart fields: `profileId` (optional, must match the path),
/// `triggerPhrase` (must match the profile) and one `images` part per photo.
#[utoipa::path(
    post,
    path = "/api/profiles/{profile_id}/prepare",
    tag = "Profiles",
    params(
        ("profile_id" = Uuid, Path, description = "Profile UUID")
    ),
    responses(
        (status = 200, description = "Training job queued", body = PrepareResponse),
        (status = 400, description = "Invalid upload", body = PrepareResponse),
        (status = 404, description = "Profile not found", body = PrepareResponse),
        (status = 409, description = "A training job is already outstanding", body = PrepareResponse),
        (status = 500, description = "Pipeline failure", body = PrepareResponse),
    )
)]
pub async fn prepare_profile(
    service: web::Data<PreparationService>,
    limits: web::Data<UploadLimits>,
    path: web::Path<String>,
    payload: Multipart,
) -> HttpResponse {
    match handle_prepare(&service, **limits, &path, payload).await {
        Ok(request_id) => HttpResponse::Ok().json(PrepareResponse::accepted(request_id)),
        Err(e) => prepare_error_response(&e),
    }
}

async fn handle_prepare(
    service: &PreparationService,
    limits: UploadLimits,
    raw_id: &str,
    payload: Multipart,
) -> AppResult<String> {
    let profile_id = Uuid::parse_str(raw_id)
        .map_err(|_| AppError::InvalidInput(format!("Invalid profile id: {}", raw_id)))?;

    let scratch = tempfile::Builder::new()
        .prefix("hs-upload-")
        .tempdir()
        .map_err(|e| AppError::FileSystem(format!("Failed to create upload directory: {}", e)))?;

    let form = read_prepare_form(payload, limits, &scratch).await?;

    if let Some(ref form_id) = form.profile_id
        && Uuid::parse_str(form_id).ok() != Some(profile_id)
    {
        return Err(AppError::InvalidInput(
            "profileId does not match the request path".to_string(),
        ));
    }

    let trigger_phrase = form
        .trigger_phrase
        .ok_or_else(|| AppError::InvalidInput("Trigger phrase is required".to_string()))?;

    info!(
        profile_id = %profile_id,
        images = form.images.len(),
        "Prepare request received"
    );

    let images: Vec<ImageSource> = form.images.into_iter().map(ImageSource::Local).collect();
    let result = service
        .prepare(profile_id, &trigger_phrase, &images)
        .await;

    // Uploaded files are removed with the scratch directory on every path.
    drop(scratch);
    result
}

/// Parsed prepare form.
#[derive(Debug, Default)]
struct PrepareForm {
    profile_id: Option<String>,
    trigger_phrase: Option<String>,
    images: Vec<PathBuf>,
}

async fn read_prepare_form(
    mut payload: Multipart,
    limits: UploadLimits,
    scratch: &TempDir,
) -> AppResult<PrepareForm> {
    let mut form = PrepareForm::default();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::InvalidInput("Missing content disposition".to_string()))?;
        let field_name = content_disposition.get_name().map(str::to_string);
        let filename = content_disposition.get_filename().map(str::to_string);

        match field_name.as_deref() {
            Some("profileId") => form.profile_id = read_text_field(&mut field).await?,
            Some("triggerPhrase") => form.trigger_phrase = read_text_field(&mut field).await?,
            Some("images") => {
                if form.images.len() >= limits.max_files {
                    return Err(AppError::InvalidInput(format!(
                        "At most {} images per request",
                        limits.max_files
                    )));
                }

                let content_type = field.content_type().map(|m| m.essence_str().to_string());
                let Some(extension) =
                    accepted_image_extension(filename.as_deref(), content_type.as_deref())
                else {
                    return Err(AppError::InvalidInput(format!(
                        "Only image files are allowed ({})",
                        ACCEPTED_IMAGE_TYPES.join(", ")
                    )));
                };

                let target = scratch
                    .path()
                    .join(format!("{}.{}", form.images.len(), extension));
                write_image_field(&mut field, &target, limits.max_image_size, filename.as_deref())
                    .await?;
                form.images.push(target);
            }
            other => {
                warn!("Ignoring unexpected multipart field {:?}", other);
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
                }
            }
        }
    }

    if form.images.is_empty() {
        return Err(AppError::InvalidInput("No images uploaded".to_string()));
    }

    Ok(form)
}

async fn read_text_field(field: &mut Field) -> AppResult<Option<String>> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
        data.extend_from_slice(&chunk);
        if data.len() > 1024 {
            return Err(AppError::InvalidInput("Form field too large".to_string()));
        }
    }

    let value = String::from_utf8(data)
        .map_err(|_| AppError::InvalidInput("Form field is not valid UTF-8".to_string()))?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

async fn write_image_field(
    field: &mut Field,
    target: &Path,
    max_size: usize,
    filename: Option<&str>,
) -> AppResult<()> {
    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| AppError::FileSystem(format!("Failed to create file: {}", e)))?;

    let mut size: usize = 0;
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
        size += data.len();
        if size > max_size {
            return Err(AppError::InvalidInput(format!(
                "Image {} exceeds the {} byte limit",
                filename.unwrap_or("(unnamed)"),
                max_size
            )));
        }
        file.write_all(&data)
            .await
            .map_err(|e| AppError::FileSystem(format!("Failed to write file: {}", e)))?;
    }

    file.flush()
        .await
        .map_err(|e| AppError::FileSystem(format!("Failed to flush file: {}", e)))?;

    if size == 0 {
        return Err(AppError::InvalidInput(format!(
            "Image {} is empty",
            filename.unwrap_or("(unnamed)")
        )));
    }

    Ok(())
}

/// Validate an uploaded part and return the extension to store it under.
///
/// The filename extension must be an accepted image type; a declared MIME
/// type, when present, must name one too.
pub fn accepted_image_extension(filename: Option<&str>, content_type: Option<&str>) -> Option<String> {
    let extension = Path::new(filename?)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    if !ACCEPTED_IMAGE_TYPES.contains(&extension.as_str()) {
        return None;
    }

    if let Some(mime) = content_type {
        let subtype = mime
            .split_once('/')
            .map(|(_, subtype)| subtype)
            .unwrap_or(mime)
            .to_ascii_lowercase();
        if !ACCEPTED_IMAGE_TYPES.contains(&subtype.as_str()) {
            return None;
        }
    }

    Some(extension)
}

fn prepare_error_response(err: &AppError) -> HttpResponse {
    let status = match err {
        AppError::InvalidInput(_) | AppError::Archive(ArchiveError::Empty { .. }) => {
            StatusCode::BAD_REQUEST
        }
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    HttpResponse::build(status).json(PrepareResponse::rejected(err.public_message()))
}

/// Probe a training job once.
///
/// Advisory only: the profile's status is written by the webhook alone.
#[utoipa::path(
    get,
    path = "/api/profiles/{profile_id}/jobs/{request_id}",
    tag = "Profiles",
    params(
        ("profile_id" = Uuid, Path, description = "Profile UUID"),
        ("request_id" = String, Path, description = "Vendor request id")
    ),
    responses(
        (status = 200, description = "Current job status", body = JobStatusResponse),
        (status = 404, description = "Profile not found", body = crate::error::ErrorResponse),
        (status = 502, description = "Vendor unavailable", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_job_status(
    pool: web::Data<DbPool>,
    service: web::Data<PreparationService>,
    path: web::Path<(Uuid, String)>,
) -> AppResult<HttpResponse> {
    let (profile_id, request_id) = path.into_inner();

    pool.get_profile_by_id(profile_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {}", profile_id)))?;

    let gateway = service.gateway();
    let status = gateway.poll_status(&request_id).await?;

    let weight_url = if status == JobStatus::Succeeded {
        match gateway.fetch_result(&request_id).await {
            Ok(result) => Some(result.weight_url),
            Err(e) => {
                warn!(request_id = %request_id, "Failed to fetch training result: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(HttpResponse::Ok().json(JobStatusResponse {
        request_id,
        status,
        weight_url,
    }))
}
