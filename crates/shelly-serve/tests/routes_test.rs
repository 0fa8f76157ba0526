// Router smoke tests over an empty fleet: routes exist, JSON renders,
// and fleet-call errors map to status codes.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use shelly_api::TransportConfig;
use shelly_config::DiscoverySettings;
use shelly_core::catalog::DeviceTypes;
use shelly_core::groups::GroupExecutor;
use shelly_core::{
    CapabilityCatalog, DeviceRegistry, DiscoveryService, GroupManager, ParameterEngine,
};

#[path = "../src/handlers.rs"]
mod handlers;
#[path = "../src/routes.rs"]
mod routes;
#[path = "../src/state.rs"]
mod state;

fn test_state(tmp: &std::path::Path) -> state::AppState {
    let transport = TransportConfig::default();
    let catalog = Arc::new(
        CapabilityCatalog::load(
            tmp.join("config/device_capabilities"),
            tmp.join("config/parameter_mappings.yaml"),
        )
        .unwrap(),
    );
    let registry = Arc::new(DeviceRegistry::new(tmp.join("data/devices")).unwrap());
    let discovery = Arc::new(
        DiscoveryService::new(
            Arc::clone(&registry),
            DeviceTypes::default(),
            DiscoverySettings {
                mdns: false,
                http_probe: false,
                ..DiscoverySettings::default()
            },
            &transport,
        )
        .unwrap(),
    );
    let engine = Arc::new(
        ParameterEngine::new(
            &transport,
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Duration::ZERO,
        )
        .unwrap(),
    );
    let groups = Arc::new(GroupManager::new(tmp.join("data/groups")).unwrap());
    let executor = Arc::new(GroupExecutor::new(
        Arc::clone(&registry),
        Arc::clone(&engine),
        Arc::clone(&groups),
        16,
        ["off".to_string(), "reboot".to_string()],
    ));

    state::AppState {
        catalog,
        registry,
        engine,
        groups,
        executor,
        discovery,
    }
}

#[tokio::test]
async fn healthz_answers_ok() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::build(test_state(tmp.path()));

    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_fleet_lists_are_empty_json() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::build(test_state(tmp.path()));

    let response = app
        .clone()
        .oneshot(Request::get("/devices").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/groups").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_device_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::build(test_state(tmp.path()));

    let response = app
        .oneshot(
            Request::get("/devices/AABBCCDDEEFF")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn all_devices_destructive_operate_is_precondition_required() {
    let tmp = tempfile::tempdir().unwrap();
    let app = routes::build(test_state(tmp.path()));

    let response = app
        .oneshot(
            Request::post("/groups/all-devices/operate")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"verb":"off"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PRECONDITION_REQUIRED);
}
