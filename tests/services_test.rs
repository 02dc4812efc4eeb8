// End-to-end: real filesystem collaborators wired through the service facade.

use ar_offline_engine::api::{init_tracing, OfflineServices};
use ar_offline_engine::config::OfflineConfig;
use ar_offline_engine::engine::perf::MetricCategory;
use ar_offline_engine::EngineError;

#[tokio::test]
async fn test_open_initialize_and_track_progress() {
    let root = tempfile::tempdir().unwrap();
    let bundle = root.path().join("bundle");
    std::fs::create_dir_all(bundle.join("models")).unwrap();
    std::fs::write(bundle.join("models/house.glb"), vec![7u8; 2048]).unwrap();

    let raw = serde_json::json!({
        "cache_dir": root.path().join("offline_assets"),
        "storage_dir": root.path().join("storage"),
        "bundle_root": bundle,
        "download_max_retries": 0,
        "log_filter": "info,ar_offline_engine=debug",
        "required_assets": [
            { "logical_name": "house.glb", "source_uri": "bundle://models/house.glb" }
        ]
    })
    .to_string();
    let config = OfflineConfig::from_json_str(&raw).unwrap();
    init_tracing(&config);

    let services = OfflineServices::open(&config).unwrap();

    let init = services
        .perf
        .start_metric(MetricCategory::ArInitialization, "startup");
    services.assets.initialize().await.unwrap();
    services.perf.end_metric(&init);

    let path = services.assets.get_asset_path("house.glb").unwrap();
    assert!(path.exists());
    assert_eq!(services.assets.get_cache_size(), 2048);

    let update = services.progress.upsert_completion(0, true).await;
    assert!(update.persisted);
    assert!(root.path().join("storage/construction_progress.json").exists());
    assert!(root.path().join("storage/offline_assets_cache.json").exists());

    // A second process picks up both stores from disk without re-downloading.
    std::fs::remove_file(bundle.join("models/house.glb")).unwrap();
    let reopened = OfflineServices::open(&config).unwrap();
    reopened.assets.initialize().await.unwrap();
    assert_eq!(reopened.assets.get_asset_path("house.glb").unwrap(), path);
    assert!(reopened.progress.get(0).await.unwrap().completed);

    assert_eq!(services.perf.get_metrics().len(), 1);
}

#[tokio::test]
async fn test_missing_bundle_asset_fails_startup() {
    let root = tempfile::tempdir().unwrap();
    let config = OfflineConfig::from_json_str(
        &serde_json::json!({
            "cache_dir": root.path().join("offline_assets"),
            "storage_dir": root.path().join("storage"),
            "bundle_root": root.path().join("bundle"),
            "download_max_retries": 0,
            "required_assets": [
                { "logical_name": "house.glb", "source_uri": "bundle://models/house.glb" }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let services = OfflineServices::open(&config).unwrap();
    let err = services.assets.initialize().await.unwrap_err();
    assert!(matches!(err, EngineError::Initialization { .. }));

    // Progress tracking works regardless.
    assert!(services.progress.upsert_notes(1, "measured site").await.persisted);
}
