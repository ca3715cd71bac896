mod common;

use axum::http::StatusCode;
use common::{error_code, spawn_app, spawn_app_with, test_config};
use meyden_api::{MemoryMailer, MockStorageService};
use serde_json::json;

#[tokio::test]
async fn issues_presigned_url_for_allowed_type() {
    let app = spawn_app();
    let (_, token) = app.signed_in_user("uploader@example.com").await;

    let (status, body) = app
        .post(
            "/api/v1/upload",
            Some(&token),
            json!({ "filename": "Logo.PNG", "fileType": " Image/PNG " }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let key = body["resourceKey"].as_str().unwrap();
    assert!(key.starts_with("uploads/"));
    assert!(key.ends_with(".png"));
    assert!(body["uploadUrl"].as_str().unwrap().contains(key));
    assert_eq!(body["expiresIn"], 600);
}

#[tokio::test]
async fn rejects_types_outside_the_allow_list() {
    let app = spawn_app();
    let (_, token) = app.signed_in_user("uploader@example.com").await;

    let (status, body) = app
        .post(
            "/api/v1/upload",
            Some(&token),
            json!({ "filename": "run.sh", "fileType": "application/x-sh" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_FILE_TYPE");
}

#[tokio::test]
async fn requires_filename_and_type() {
    let app = spawn_app();
    let (_, token) = app.signed_in_user("uploader@example.com").await;

    let (status, body) = app
        .post(
            "/api/v1/upload",
            Some(&token),
            json!({ "filename": "", "fileType": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn requires_authentication() {
    let app = spawn_app();
    let (status, _) = app
        .post(
            "/api/v1/upload",
            None,
            json!({ "filename": "a.png", "fileType": "image/png" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn storage_outage_is_masked() {
    let app = spawn_app_with(
        test_config(),
        MockStorageService::new_failing(),
        MemoryMailer::new(),
    );
    let (_, token) = app.signed_in_user("uploader@example.com").await;

    let (status, body) = app
        .post(
            "/api/v1/upload",
            Some(&token),
            json!({ "filename": "a.png", "fileType": "image/png" }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "UPLOAD_ERROR");
    assert!(!body["error"].as_str().unwrap().contains("simulated"));
}
