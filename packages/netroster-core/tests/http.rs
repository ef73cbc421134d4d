use std::{path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::{self, Body},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use netroster_core::{
    AnnotationStore, DeviceRegistry, DeviceService, Observation, OnlineStatus, api,
};

async fn test_app(dir: &tempfile::TempDir) -> (Router, DeviceService) {
    let store = Arc::new(AnnotationStore::load(dir.path().join("device_data.json")).await);
    let service = DeviceService::new(Arc::new(DeviceRegistry::new()), store);

    (api::router(service.clone()), service)
}

fn observed(address: &str, name: &str, mac: &str) -> Observation {
    Observation {
        address: address.to_string(),
        status: OnlineStatus::Online,
        hardware_address: mac.to_string(),
        display_name: Some(name.to_string()),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("Failed to call router.");
    let status = response.status();
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body.");

    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request =
        Request::builder().uri(uri).body(Body::empty()).expect("Failed to build request.");
    let (status, body) = send(app, request).await;

    (status, serde_json::from_slice(&body).expect("Failed to parse response."))
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("Failed to build request.");
    let (status, body) = send(app, request).await;

    (status, serde_json::from_slice(&body).expect("Failed to parse response."))
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir.");
    let (app, _) = test_app(&dir).await;

    let request =
        Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request.");
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unannotated_address_returns_defaults() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir.");
    let (app, _) = test_app(&dir).await;

    let (status, json) = get_json(&app, "/api/device/10.0.0.200").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "deviceType": "unspecified",
            "owner": "unspecified",
            "location": "unspecified",
            "notes": "",
            "isKnown": false,
        })
    );
}

#[tokio::test]
async fn partial_post_overwrites_with_defaults() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir.");
    let (app, _) = test_app(&dir).await;

    let (status, json) = post_json(
        &app,
        "/api/device/10.0.0.5",
        json!({ "deviceType": "Server", "location": "Rack 2", "notes": "nas" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "status": "success" }));

    let (status, _) =
        post_json(&app, "/api/device/10.0.0.5", json!({ "owner": "Alice", "isKnown": true }))
            .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = get_json(&app, "/api/device/10.0.0.5").await;
    assert_eq!(json["owner"], "Alice");
    assert_eq!(json["isKnown"], true);
    assert_eq!(json["deviceType"], "unspecified");
    assert_eq!(json["location"], "unspecified");
    assert_eq!(json["notes"], "");

    let raw = std::fs::read_to_string(dir.path().join("device_data.json"))
        .expect("Failed to read annotations file.");
    let stored: Value = serde_json::from_str(&raw).expect("Failed to parse annotations file.");
    assert_eq!(stored["10.0.0.5"]["owner"], "Alice");
    assert_eq!(stored["10.0.0.5"]["is_known"], true);
}

#[tokio::test]
async fn failed_write_returns_error_and_keeps_record() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir.");
    let (app, _) = test_app(&dir).await;

    let (status, _) =
        post_json(&app, "/api/device/10.0.0.5", json!({ "owner": "Alice" })).await;
    assert_eq!(status, StatusCode::OK);

    let mut tmp = dir.path().join("device_data.json").into_os_string();
    tmp.push(".tmp");
    std::fs::create_dir(PathBuf::from(tmp)).expect("Failed to block temp path.");

    let (status, json) =
        post_json(&app, "/api/device/10.0.0.5", json!({ "owner": "Mallory" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (_, json) = get_json(&app, "/api/device/10.0.0.5").await;
    assert_eq!(json["owner"], "Alice");
}

#[tokio::test]
async fn device_listing_merges_registry_and_annotations() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir.");
    let (app, service) = test_app(&dir).await;

    service
        .registry()
        .reconcile(
            vec![
                observed("10.0.0.12", "printer.lan", "aa:bb:cc:00:00:12"),
                observed("10.0.0.5", "nas.lan", "aa:bb:cc:00:00:05"),
            ],
            service.store(),
        )
        .await;
    post_json(&app, "/api/device/10.0.0.5", json!({ "owner": "Alice", "isKnown": true })).await;

    let (status, json) = get_json(&app, "/api/devices").await;
    assert_eq!(status, StatusCode::OK);

    let devices = json.as_array().expect("Listing should be an array.");
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["address"], "10.0.0.5");
    assert_eq!(devices[0]["displayName"], "nas.lan");
    assert_eq!(devices[0]["onlineStatus"], "online");
    assert_eq!(devices[0]["isKnown"], true);
    assert_eq!(devices[0]["isNewThisSession"], false);
    assert_eq!(devices[0]["annotation"]["owner"], "Alice");
    assert_eq!(devices[1]["address"], "10.0.0.12");
    assert_eq!(devices[1]["isNewThisSession"], true);
    assert_eq!(devices[1]["annotation"]["owner"], "unspecified");
}

#[tokio::test]
async fn index_page_lists_devices() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir.");
    let (app, service) = test_app(&dir).await;

    service
        .registry()
        .reconcile(vec![observed("10.0.0.5", "nas.lan", "")], service.store())
        .await;

    let request = Request::builder().uri("/").body(Body::empty()).expect("Failed to build request.");
    let (status, body) = send(&app, request).await;
    let html = String::from_utf8(body).expect("Page should be UTF-8.");

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("10.0.0.5"));
    assert!(html.contains("nas.lan"));
}
