use raster_export_sync::{
    app_state::AppState,
    config::AppConfig,
    services::{lister::ArtifactLister, planner::ExportPlan},
};

/// Integration test: storage backend against the live service
///
/// Resolves the configured remote folder and lists it without
/// downloading or deleting anything.
///
/// Note: This requires credentials for the configured backend
/// (STORAGE_BACKEND plus DRIVE_* or S3_* variables).
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_live_folder_listing() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let state = AppState::from_config(&config).expect("Failed to initialize clients");

    let lister = ArtifactLister::new(state.storage.clone());
    let folder = lister
        .resolve_folder(&config.remote_folder)
        .await
        .expect("Remote folder did not resolve to exactly one folder");
    assert_eq!(folder.name, config.remote_folder);

    let artifacts = lister
        .list(&config.remote_folder)
        .await
        .expect("Listing failed");

    let rule = config.classification_rule();
    for artifact in &artifacts {
        assert_eq!(artifact.parent_id, folder.id);
        println!("{} -> {}", artifact.title, rule.classify(&artifact.title));
    }
}

/// Integration test: compute service status lookup
///
/// Asks for an operation that does not exist and expects an error
/// rather than a state.
#[tokio::test]
#[ignore]
async fn test_live_unknown_operation_is_an_error() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let state = AppState::from_config(&config).expect("Failed to initialize clients");

    let result = state
        .compute
        .status(&format!(
            "projects/{}/operations/does-not-exist",
            config.compute_project
        ))
        .await;
    assert!(result.is_err());
}

/// The configured plan should always produce valid descriptors.
#[tokio::test]
#[ignore]
async fn test_live_plan_is_valid() {
    use garde::Validate;

    let config = AppConfig::from_env().expect("Failed to load config");
    let plan: ExportPlan = config.export_plan();
    let descriptors = plan.descriptors();
    assert!(!descriptors.is_empty());
    for descriptor in &descriptors {
        descriptor.validate().expect("Invalid descriptor");
    }
}
