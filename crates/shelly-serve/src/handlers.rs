use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use shelly_core::groups::{ExecuteOptions, Group, GroupRequest};
use shelly_core::{CoreError, MacAddr, SetOptions};

use crate::state::AppState;

/// Map a fleet-call error to a response. Per-device failures never reach
/// here; they ride inside the JSON result bodies.
fn core_error(err: CoreError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        CoreError::DeviceNotFound { .. }
        | CoreError::GroupNotFound { .. }
        | CoreError::CapabilityNotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::GroupExists { .. } | CoreError::ReservedGroupName { .. } => StatusCode::CONFLICT,
        CoreError::ConfirmationRequired { .. } => StatusCode::PRECONDITION_REQUIRED,
        CoreError::Validation { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ── Discovery ───────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct DiscoverBody {
    #[serde(default)]
    networks: Option<Vec<String>>,
    #[serde(default)]
    ips: Vec<String>,
}

pub async fn discover(
    State(app): State<AppState>,
    body: Option<Json<DiscoverBody>>,
) -> impl IntoResponse {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    match app
        .discovery
        .discover(body.networks.as_deref(), &body.ips, &CancellationToken::new())
        .await
    {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => core_error(e).into_response(),
    }
}

// ── Devices ─────────────────────────────────────────────────────────

pub async fn list_devices(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.registry.snapshot())
}

pub async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match app.registry.get(&MacAddr::new(&id)) {
        Some(device) => Json(device).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown device").into_response(),
    }
}

pub async fn delete_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match app.registry.delete(&MacAddr::new(&id)) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "unknown device").into_response(),
        Err(e) => core_error(e).into_response(),
    }
}

pub async fn supported(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match app.registry.get(&MacAddr::new(&id)) {
        Some(device) => Json(app.engine.supported(&device)).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown device").into_response(),
    }
}

// ── Parameters ──────────────────────────────────────────────────────

pub async fn get_parameter(
    State(app): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(device) = app.registry.get(&MacAddr::new(&id)) else {
        return (StatusCode::NOT_FOUND, "unknown device").into_response();
    };
    let result = app
        .engine
        .get(&device, &name, &CancellationToken::new())
        .await;
    Json(result).into_response()
}

#[derive(Deserialize)]
pub struct SetParameterBody {
    value: Value,
    #[serde(default)]
    reboot_if_needed: bool,
}

pub async fn set_parameter(
    State(app): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(body): Json<SetParameterBody>,
) -> impl IntoResponse {
    let Some(device) = app.registry.get(&MacAddr::new(&id)) else {
        return (StatusCode::NOT_FOUND, "unknown device").into_response();
    };
    let result = app
        .engine
        .set(
            &device,
            &name,
            body.value,
            SetOptions {
                reboot_if_needed: body.reboot_if_needed,
            },
            &CancellationToken::new(),
        )
        .await;
    Json(result).into_response()
}

// ── Groups ──────────────────────────────────────────────────────────

pub async fn list_groups(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.groups.list())
}

pub async fn get_group(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match app.groups.get(&name) {
        Some(group) => Json(group).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown group").into_response(),
    }
}

#[derive(Deserialize)]
pub struct CreateGroupBody {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    device_ids: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub async fn create_group(
    State(app): State<AppState>,
    Json(body): Json<CreateGroupBody>,
) -> impl IntoResponse {
    let mut group = Group::new(body.name);
    group.description = body.description;
    group.tags = body.tags;
    for id in body.device_ids {
        group.add_device(MacAddr::new(&id));
    }
    match app.groups.create(group) {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => core_error(e).into_response(),
    }
}

pub async fn delete_group(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match app.groups.delete(&name) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "unknown group").into_response(),
        Err(e) => core_error(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct OperateBody {
    /// Verb, or omitted when `set`/`apply` fields are present.
    #[serde(default)]
    verb: Option<String>,
    #[serde(default)]
    args: BTreeMap<String, Value>,
    #[serde(default)]
    set: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    reboot_if_needed: bool,
    #[serde(default)]
    only_with_updates: bool,
    #[serde(default)]
    confirm: bool,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub async fn operate_group(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<OperateBody>,
) -> impl IntoResponse {
    let request = match (&body.verb, &body.set) {
        (Some(verb), None) if verb == "update_firmware" && body.only_with_updates => {
            GroupRequest::UpdateFirmware {
                only_with_updates: true,
            }
        }
        (Some(verb), None) => GroupRequest::Operate {
            verb: verb.clone(),
            args: body.args.clone(),
        },
        (None, Some(values)) => GroupRequest::ApplyParameters {
            values: values.clone(),
            reboot_if_needed: body.reboot_if_needed,
        },
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "provide exactly one of 'verb' or 'set'",
            )
                .into_response();
        }
    };
    let opts = ExecuteOptions {
        confirm: body.confirm,
        per_device_timeout: body.timeout_secs.map(Duration::from_secs),
        cancel: CancellationToken::new(),
    };
    match app.executor.execute(&name, request, opts).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => core_error(e).into_response(),
    }
}

// ── Capabilities ────────────────────────────────────────────────────

pub async fn list_capabilities(State(app): State<AppState>) -> impl IntoResponse {
    let snapshot = app.catalog.snapshot();
    let types: Vec<String> = snapshot.definitions.keys().cloned().collect();
    Json(types)
}

pub async fn get_capability(
    State(app): State<AppState>,
    Path(device_type): Path<String>,
) -> impl IntoResponse {
    match app.catalog.get(&device_type) {
        Some(definition) => Json(definition).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown device type").into_response(),
    }
}
