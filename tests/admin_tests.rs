mod common;

use axum::http::StatusCode;
use common::{error_code, spawn_app};
use serde_json::json;

#[tokio::test]
async fn admin_area_requires_admin_role() {
    let app = spawn_app();
    let (_, user) = app.signed_in_user("user@example.com").await;

    let (status, body) = app.get("/api/v1/admin/analytics", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "INSUFFICIENT_PERMISSIONS");

    let (status, _) = app.get("/api/v1/admin/analytics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/users", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn analytics_counts_by_status() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;
    app.active_vendor("owner@example.com").await;

    let (status, body) = app.get("/api/v1/admin/analytics", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let analytics = &body["analytics"];
    assert_eq!(analytics["users"]["total"], 2);
    assert_eq!(analytics["vendors"]["total"], 1);
    assert_eq!(analytics["vendors"]["byStatus"][0]["status"], "ACTIVE");
    assert_eq!(analytics["surveys"]["totalResponses"], 0);
    assert_eq!(analytics["community"]["totalPosts"], 0);
}

#[tokio::test]
async fn settings_split_public_and_private() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;

    let (status, body) = app
        .put(
            "/api/v1/admin/settings/site.name",
            Some(&admin),
            json!({ "value": "Meyden", "description": "<b>Shown</b> in the footer", "isPublic": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["setting"]["description"], "Shown in the footer");

    app.put(
        "/api/v1/admin/settings/billing.secret_plan",
        Some(&admin),
        json!({ "value": "gold" }),
    )
    .await;

    let (_, body) = app.get("/api/v1/settings", None).await;
    let public: Vec<&str> = body["settings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].as_str().unwrap())
        .collect();
    assert_eq!(public, vec!["site.name"]);

    let (_, body) = app.get("/api/v1/admin/settings", Some(&admin)).await;
    assert_eq!(body["settings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn setting_keys_are_restricted() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;

    let long_key = "k".repeat(101);
    let (status, body) = app
        .put(
            &format!("/api/v1/admin/settings/{long_key}"),
            Some(&admin),
            json!({ "value": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "key");
}

#[tokio::test]
async fn suspension_revokes_sessions() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;
    let (user_id, user_token) = app.signed_in_user("user@example.com").await;

    let (status, body) = app
        .put(
            &format!("/api/v1/admin/users/{user_id}/status"),
            Some(&admin),
            json!({ "status": "SUSPENDED" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["status"], "SUSPENDED");

    let (status, _) = app.get("/api/v1/auth/me", Some(&user_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .put(
            &format!("/api/v1/admin/users/{user_id}/status"),
            Some(&admin),
            json!({ "status": "BANNED" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["details"][0]["message"]
            .as_str()
            .unwrap()
            .contains("PENDING_VERIFICATION")
    );
}

#[tokio::test]
async fn admins_cannot_modify_themselves() {
    let app = spawn_app();
    let (admin_id, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;

    let (status, body) = app
        .put(
            &format!("/api/v1/admin/users/{admin_id}/role"),
            Some(&admin),
            json!({ "role": "USER" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "CANNOT_MODIFY_SELF");
}

#[tokio::test]
async fn only_super_admins_manage_admins() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;
    let (other_id, _) = app.signed_in_with_role("other-admin@example.com", "ADMIN").await;
    let (user_id, _) = app.signed_in_user("user@example.com").await;
    let (_, root) = app
        .signed_in_with_role("root@example.com", "SUPER_ADMIN")
        .await;

    let (status, body) = app
        .put(
            &format!("/api/v1/admin/users/{other_id}/status"),
            Some(&admin),
            json!({ "status": "SUSPENDED" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "INSUFFICIENT_PERMISSIONS");

    let (status, _) = app
        .put(
            &format!("/api/v1/admin/users/{user_id}/role"),
            Some(&admin),
            json!({ "role": "SUPER_ADMIN" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(
            &format!("/api/v1/admin/users/{user_id}/role"),
            Some(&admin),
            json!({ "role": "VENDOR" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "VENDOR");

    let (status, body) = app
        .put(
            &format!("/api/v1/admin/users/{other_id}/role"),
            Some(&root),
            json!({ "role": "USER" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "USER");
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;
    let (status, body) = app
        .put(
            &format!("/api/v1/admin/users/{}/status", uuid::Uuid::new_v4()),
            Some(&admin),
            json!({ "status": "ACTIVE" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "USER_NOT_FOUND");
}

#[tokio::test]
async fn vendor_moderation_controls_visibility() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;
    let (_, owner) = app.signed_in_user("owner@example.com").await;
    let (_, body) = app
        .post("/api/v1/vendors", Some(&owner), common::vendor_payload("Queue AI"))
        .await;
    let vendor_id = body["vendor"]["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .get("/api/v1/admin/vendors?status=PENDING_APPROVAL", Some(&admin))
        .await;
    assert_eq!(body["vendors"][0]["id"], vendor_id.as_str());

    let (status, _) = app
        .put(
            &format!("/api/v1/admin/vendors/{vendor_id}/status"),
            Some(&admin),
            json!({ "status": "ACTIVE" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/v1/vendors/{vendor_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    app.put(
        &format!("/api/v1/admin/vendors/{vendor_id}/status"),
        Some(&admin),
        json!({ "status": "SUSPENDED" }),
    )
    .await;
    let (status, _) = app.get(&format!("/api/v1/vendors/{vendor_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_directory_is_paginated() {
    let app = spawn_app();
    let (_, admin) = app.signed_in_with_role("admin@example.com", "ADMIN").await;
    for i in 0..3 {
        app.register(&format!("member{i}@example.com")).await;
    }

    let (status, body) = app.get("/api/v1/users?limit=2&role=USER", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["totalCount"], 3);
    assert_eq!(body["pagination"]["hasNextPage"], true);
}
