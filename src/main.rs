//! Headshot pipeline server - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use headshot_pipeline_lib::api::{self, ApiDoc, UploadLimits};
use headshot_pipeline_lib::config::Config;
use headshot_pipeline_lib::db::DbPool;
use headshot_pipeline_lib::middleware::RequestLogger;
use headshot_pipeline_lib::services::{
    ArchiveBuilder, ArchiveStore, PreparationService, Storage, TrainingGateway,
};

/// HTTP timeouts for vendor calls and remote image fetches.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if Config::from_env().is_ok() { 0 } else { 1 });
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - FAL_API_KEY must be set");
            error!("  - In production, DATABASE_URL, HS_PUBLIC_URL and S3 credentials must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Headshot Pipeline Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    // Initialize database
    let pool = DbPool::new(&config)
        .await
        .expect("Failed to initialize database");
    info!("Database connection established");

    pool.run_migrations()
        .await
        .expect("Failed to run migrations");

    // Initialize archive storage
    let storage = Storage::new(&config.storage)
        .await
        .expect("Failed to initialize S3 storage");

    let http = reqwest::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client");

    let gateway = TrainingGateway::new(http.clone(), &config.vendor, &config.public_url);
    let store: Arc<dyn ArchiveStore> = Arc::new(storage);
    let preparation =
        PreparationService::new(pool.clone(), store, gateway, ArchiveBuilder::new(http));

    let limits = UploadLimits::from(&config);
    info!(
        "Upload limits: {} images per request, {}MB per image",
        limits.max_files,
        limits.max_image_size / 1024 / 1024
    );
    info!(
        "Training callbacks will be delivered to {}/api/webhooks/training",
        config.public_url
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        } else {
            // Same-origin only
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(preparation.clone()))
            .app_data(web::Data::new(limits))
            .service(
                SwaggerUi::new("/api/docs/{_:.*}").url("/api/openapi.json", ApiDoc::openapi()),
            )
            .service(
                web::scope("/api")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_profile_routes)
                    .configure(api::configure_webhook_routes),
            )
    });

    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
