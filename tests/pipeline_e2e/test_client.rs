//! Device client tests against a served pipeline.

use headshot_pipeline_lib::client::{
    ClientConfig, ImageStore, ProfileClient, SubmissionClient, check_submittable,
};
use headshot_pipeline_lib::models::ProfileStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use super::mock_vendor::{MOCK_REQUEST_ID, MockVendor, MockVendorState};
use super::test_helpers::{FakeStore, create_test_pool, reload, spawn_test_server, test_service};

/// Write `count` small JPEG files and return their paths.
fn camera_roll(dir: &TempDir, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|i| {
            let path = dir.path().join(format!("IMG_{:04}.jpg", i));
            std::fs::write(&path, format!("jpeg bytes {}", i)).unwrap();
            path
        })
        .collect()
}

#[actix_rt::test]
async fn test_device_flow_creates_saves_and_submits() {
    let vendor = MockVendor::start(MockVendorState::default()).await;
    let pool = create_test_pool().await;
    let store = Arc::new(FakeStore::default());
    let backend = spawn_test_server(&pool, test_service(&pool, store.clone(), &vendor.base_url)).await;

    let device_dir = TempDir::new().unwrap();
    let config = ClientConfig::new(&backend, device_dir.path().join("store"));
    let http = reqwest::Client::new();
    let profiles = ProfileClient::new(http.clone(), &config);
    let submissions = SubmissionClient::new(http, &config);

    let profile = profiles
        .create_profile(Uuid::new_v4(), "Conference")
        .await
        .unwrap();
    assert_eq!(profile.status, ProfileStatus::NotReady);
    let profile_id = profile.id.to_string();

    let images = ImageStore::open(&config.storage_root).await.unwrap();
    let roll_dir = TempDir::new().unwrap();
    let saved = images
        .save_images(&profile_id, &camera_roll(&roll_dir, 12))
        .await
        .unwrap();
    assert_eq!(saved.saved.len(), 12);
    assert_eq!(saved.dropped, 0);

    let count = images.count_images(&profile_id).await.unwrap();
    check_submittable(count as usize).unwrap();

    let paths: Vec<PathBuf> = images
        .get_images(&profile_id)
        .await
        .unwrap()
        .into_iter()
        .map(|image| PathBuf::from(image.image_url))
        .collect();

    let mut progress = Vec::new();
    let outcome = submissions
        .submit(&profile_id, &profile.trigger_phrase, &paths, |p| {
            progress.push(p)
        })
        .await;

    assert!(outcome.accepted, "submission failed: {:?}", outcome.error);
    assert_eq!(outcome.request_id.as_deref(), Some(MOCK_REQUEST_ID));
    assert!(outcome.error.is_none());

    assert_eq!(progress.first().copied(), Some(0.0));
    assert_eq!(progress.last().copied(), Some(1.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let stored = reload(&pool, profile.id).await;
    assert_eq!(stored.status, ProfileStatus::GettingReady.as_str());
    assert_eq!(stored.total_images, 12);
    assert_eq!(store.archives()[0].entries.len(), 13);
}

#[actix_rt::test]
async fn test_server_rejection_is_surfaced_verbatim() {
    let vendor = MockVendor::start(MockVendorState::default()).await;
    let pool = create_test_pool().await;
    let backend = spawn_test_server(
        &pool,
        test_service(&pool, Arc::new(FakeStore::default()), &vendor.base_url),
    )
    .await;

    let device_dir = TempDir::new().unwrap();
    let config = ClientConfig::new(&backend, device_dir.path());
    let submissions = SubmissionClient::new(reqwest::Client::new(), &config);

    let profile = pool.insert_profile(Uuid::new_v4(), "Team").await.unwrap();
    pool.claim_for_training(profile.id).await.unwrap();

    let roll_dir = TempDir::new().unwrap();
    let paths = camera_roll(&roll_dir, 10);
    let outcome = submissions
        .submit(&profile.id.to_string(), &profile.trigger_phrase, &paths, |_| {})
        .await;

    assert!(!outcome.accepted);
    assert!(outcome.request_id.is_none());
    let error = outcome.error.unwrap();
    assert!(error.starts_with("Conflict:"), "unexpected error: {error}");
    assert!(vendor.submissions().is_empty());
}

#[actix_rt::test]
async fn test_unreadable_image_fails_before_upload() {
    let vendor = MockVendor::start(MockVendorState::default()).await;
    let pool = create_test_pool().await;
    let backend = spawn_test_server(
        &pool,
        test_service(&pool, Arc::new(FakeStore::default()), &vendor.base_url),
    )
    .await;

    let device_dir = TempDir::new().unwrap();
    let config = ClientConfig::new(&backend, device_dir.path());
    let submissions = SubmissionClient::new(reqwest::Client::new(), &config);

    let profile = pool.insert_profile(Uuid::new_v4(), "Team").await.unwrap();
    let outcome = submissions
        .submit(
            &profile.id.to_string(),
            &profile.trigger_phrase,
            &[device_dir.path().join("gone.jpg")],
            |_| {},
        )
        .await;

    assert!(!outcome.accepted);
    assert!(outcome.error.unwrap().contains("gone.jpg"));
    assert_eq!(
        reload(&pool, profile.id).await.status,
        ProfileStatus::NotReady.as_str()
    );
}

#[actix_rt::test]
async fn test_unreachable_backend_is_network_error() {
    let device_dir = TempDir::new().unwrap();
    let config = ClientConfig::new("http://127.0.0.1:9", device_dir.path());
    let submissions = SubmissionClient::new(reqwest::Client::new(), &config);

    let roll_dir = TempDir::new().unwrap();
    let paths = camera_roll(&roll_dir, 10);
    let outcome = submissions
        .submit(&Uuid::new_v4().to_string(), "hsabc", &paths, |_| {})
        .await;

    assert!(!outcome.accepted);
    assert!(outcome.error.unwrap().starts_with("Network error"));
}

#[actix_rt::test]
async fn test_delete_profile_clears_server_and_device() {
    let vendor = MockVendor::start(MockVendorState::default()).await;
    let pool = create_test_pool().await;
    let store = Arc::new(FakeStore::default());
    let backend = spawn_test_server(&pool, test_service(&pool, store.clone(), &vendor.base_url)).await;

    let device_dir = TempDir::new().unwrap();
    let config = ClientConfig::new(&backend, device_dir.path().join("store"));
    let profiles = ProfileClient::new(reqwest::Client::new(), &config);
    let images = ImageStore::open(&config.storage_root).await.unwrap();

    let profile = profiles
        .create_profile(Uuid::new_v4(), "Portraits")
        .await
        .unwrap();
    let profile_id = profile.id.to_string();

    let roll_dir = TempDir::new().unwrap();
    images
        .save_images(&profile_id, &camera_roll(&roll_dir, 3))
        .await
        .unwrap();

    profiles.delete_profile(&profile_id, &images).await.unwrap();

    assert!(pool.get_profile_by_id(profile.id).await.unwrap().is_none());
    assert_eq!(images.count_images(&profile_id).await.unwrap(), 0);
    assert!(!config.storage_root.join(&profile_id).exists());
    assert_eq!(
        store.deleted_prefixes(),
        vec![format!("archives/{}/", profile_id)]
    );

    // Already gone on the server: still cleared locally without error.
    profiles.delete_profile(&profile_id, &images).await.unwrap();
}
