//! Shared test helpers for pipeline E2E tests.

use actix_web::http::header::CONTENT_TYPE;
use actix_web::{App, HttpServer, dev::ServiceResponse, test, web};
use async_trait::async_trait;
use headshot_pipeline_lib::api::{self, UploadLimits};
use headshot_pipeline_lib::config::VendorSettings;
use headshot_pipeline_lib::db::DbPool;
use headshot_pipeline_lib::entity::headshot_profile;
use headshot_pipeline_lib::error::{AppError, AppResult};
use headshot_pipeline_lib::services::{
    ArchiveBuilder, ArchiveStore, PreparationService, TrainingGateway,
};
use secrecy::SecretString;
use serde_json::Value;
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::mock_vendor::MOCK_APP;

/// Public URL the test server pretends to be reachable at.
pub const TEST_PUBLIC_URL: &str = "https://pipeline.test";

/// Multipart boundary used by [`multipart_body`].
const BOUNDARY: &str = "hs-test-boundary-7f3a";

/// Create a fresh in-memory database with migrations applied.
pub async fn create_test_pool() -> DbPool {
    let pool = DbPool::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to open in-memory database");
    pool.run_migrations()
        .await
        .expect("Failed to run migrations");
    pool
}

/// Insert a profile directly.
pub async fn insert_profile(pool: &DbPool) -> headshot_profile::Model {
    pool.insert_profile(Uuid::new_v4(), "Test profile")
        .await
        .expect("Failed to insert profile")
}

/// Reload a profile.
pub async fn reload(pool: &DbPool, id: Uuid) -> headshot_profile::Model {
    pool.get_profile_by_id(id)
        .await
        .expect("query failed")
        .expect("profile missing")
}

/// An uploaded archive as seen by the fake store.
#[derive(Debug, Clone)]
pub struct StoredArchive {
    pub key: String,
    pub entries: Vec<String>,
}

/// In-memory archive store.
#[derive(Default)]
pub struct FakeStore {
    pub archives: Mutex<Vec<StoredArchive>>,
    pub deleted_prefixes: Mutex<Vec<String>>,
    pub fail_uploads: AtomicBool,
}

impl FakeStore {
    pub fn archives(&self) -> Vec<StoredArchive> {
        self.archives.lock().unwrap().clone()
    }

    pub fn deleted_prefixes(&self) -> Vec<String> {
        self.deleted_prefixes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveStore for FakeStore {
    async fn put_archive(&self, key: &str, path: &Path) -> AppResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Storage("simulated upload failure".to_string()));
        }

        let file = std::fs::File::open(path).map_err(|e| AppError::FileSystem(e.to_string()))?;
        let mut zip =
            zip::ZipArchive::new(file).map_err(|e| AppError::Storage(e.to_string()))?;
        let entries = (0..zip.len())
            .map(|i| zip.by_index(i).map(|f| f.name().to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(e.to_string()))?;

        self.archives.lock().unwrap().push(StoredArchive {
            key: key.to_string(),
            entries,
        });
        Ok(())
    }

    async fn presigned_url(&self, key: &str) -> AppResult<String> {
        Ok(format!("https://archives.test/{}?X-Amz-Signature=abc", key))
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize> {
        self.deleted_prefixes.lock().unwrap().push(prefix.to_string());
        Ok(1)
    }
}

/// Vendor settings pointing at a mock vendor.
pub fn vendor_settings(base_url: &str, poll_max_attempts: u32) -> VendorSettings {
    VendorSettings {
        api_key: SecretString::from("test-vendor-key".to_string()),
        queue_url: base_url.to_string(),
        training_app: MOCK_APP.to_string(),
        poll_interval_secs: 0,
        poll_max_attempts,
    }
}

/// Gateway against a mock vendor.
pub fn test_gateway(base_url: &str, poll_max_attempts: u32) -> TrainingGateway {
    TrainingGateway::new(
        reqwest::Client::new(),
        &vendor_settings(base_url, poll_max_attempts),
        TEST_PUBLIC_URL,
    )
}

/// Preparation service without the background poll.
pub fn test_service(pool: &DbPool, store: Arc<FakeStore>, vendor_url: &str) -> PreparationService {
    PreparationService::new(
        pool.clone(),
        store,
        test_gateway(vendor_url, 1),
        ArchiveBuilder::new(reqwest::Client::new()),
    )
    .with_advisory_poll(false)
}

pub fn test_limits() -> UploadLimits {
    UploadLimits {
        max_files: 30,
        max_image_size: 1024 * 1024,
    }
}

/// Create a test app.
pub async fn create_test_app(
    pool: &DbPool,
    service: PreparationService,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(service))
            .app_data(web::Data::new(test_limits()))
            .service(
                web::scope("/api")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_profile_routes)
                    .configure(api::configure_webhook_routes),
            ),
    )
    .await
}

/// Serve the app on an ephemeral port and return its base URL.
pub async fn spawn_test_server(pool: &DbPool, service: PreparationService) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let port = listener.local_addr().unwrap().port();

    let pool = pool.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(test_limits()))
            .service(
                web::scope("/api")
                    .configure(api::configure_profile_routes)
                    .configure(api::configure_webhook_routes),
            )
    })
    .workers(1)
    .listen(listener)
    .expect("failed to listen")
    .disable_signals()
    .run();

    tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

/// A part of a multipart test body.
pub enum FormPart<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

/// Encode a multipart/form-data body. Returns (content type, body).
pub fn multipart_body(parts: &[FormPart<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

/// One small JPEG `images` part per file name.
pub fn jpeg_parts(names: &[String]) -> Vec<FormPart<'_>> {
    names
        .iter()
        .map(|name| FormPart::File {
            name: "images",
            filename: name,
            content_type: "image/jpeg",
            data: name.as_bytes(),
        })
        .collect()
}

/// A prepare form: the trigger phrase followed by one JPEG part per name.
pub fn prepare_parts<'a>(trigger_phrase: &'a str, names: &'a [String]) -> Vec<FormPart<'a>> {
    let mut parts = vec![FormPart::Text("triggerPhrase", trigger_phrase)];
    parts.extend(jpeg_parts(names));
    parts
}

pub fn photo_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("photo-{}.jpg", i)).collect()
}

/// POST a prepare request and return (status, body).
pub async fn post_prepare<S>(app: &S, profile_id: &str, parts: &[FormPart<'_>]) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let (content_type, body) = multipart_body(parts);
    let req = test::TestRequest::post()
        .uri(&format!("/api/profiles/{}/prepare", profile_id))
        .insert_header((CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();

    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// POST a webhook callback and return (status, body).
pub async fn post_webhook<S>(app: &S, query: &str, body: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let uri = if query.is_empty() {
        "/api/webhooks/training".to_string()
    } else {
        format!("/api/webhooks/training?{}", query)
    };
    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header((CONTENT_TYPE, "application/json"))
        .set_payload(body.to_string())
        .to_request();

    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}
