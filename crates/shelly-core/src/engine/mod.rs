// ── Parameter / operation engine ──
//
// The semantic heart: one code path that resolves a logical parameter or
// control verb against a device and issues the correct wire call for its
// generation. Gen1 reads and writes are REST; Gen2+ go through RPC with
// the setter/getter pairing and component nesting rules. Within one device
// operations serialize on the registry's per-device lock, held across the
// full wire exchange.

mod coerce;
mod path;
mod verbs;

pub use coerce::{coerce, coerce_read, encode_gen1, CoerceError};
pub use path::{last_key, lookup, nest, parse_path, PathSegment};
pub use verbs::{ControlProfile, Gen1Endpoint, VerbTable};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use shelly_api::{Error as ApiError, Gen1Client, RpcClient, TransportConfig};

use crate::catalog::{rpc_reader_for, CapabilityCatalog, ParameterDescriptor};
use crate::error::CoreError;
use crate::model::{Device, ErrorKind, MacAddr, OperationResult, Warning};
use crate::registry::DeviceRegistry;

// ── Options ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Issue a coordinated reboot after a successful write when the
    /// parameter (or the device's response) calls for one.
    pub reboot_if_needed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OperateOptions {
    /// Verb arguments (`brightness=70`).
    pub args: BTreeMap<String, Value>,

    /// For `update_firmware`: poll until the update flag clears or this
    /// deadline elapses. `None` dispatches and returns immediately.
    pub wait_for_update: Option<Duration>,
}

/// What a device supports: logical parameter names plus control verbs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SupportedSurface {
    pub parameters: Vec<String>,
    pub operations: Vec<String>,
}

// ── Operation lifecycle ─────────────────────────────────────────────

/// States a single operation traverses. Only `Succeeded` may re-enter
/// network I/O (the coordinated reboot); every other terminal state is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Resolving,
    Dispatching,
    AwaitingResponse,
    Succeeded,
    Failed,
    Cancelled,
    MaybeRebooting,
    Finalized,
}

fn advance(state: &mut OperationState, next: OperationState, device: &MacAddr) {
    trace!(device = %device, from = ?state, to = ?next, "operation state");
    *state = next;
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct ParameterEngine {
    gen1: Gen1Client,
    rpc: RpcClient,
    catalog: Arc<CapabilityCatalog>,
    registry: Arc<DeviceRegistry>,
    verbs: VerbTable,
    reboot_grace: Duration,
    update_poll_interval: Duration,
}

impl ParameterEngine {
    pub fn new(
        transport: &TransportConfig,
        catalog: Arc<CapabilityCatalog>,
        registry: Arc<DeviceRegistry>,
        reboot_grace: Duration,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            gen1: Gen1Client::new(transport).map_err(|e| CoreError::Internal(e.to_string()))?,
            rpc: RpcClient::new(transport).map_err(|e| CoreError::Internal(e.to_string()))?,
            catalog,
            registry,
            verbs: VerbTable::default(),
            reboot_grace,
            update_poll_interval: Duration::from_secs(5),
        })
    }

    pub fn verb_table(&self) -> &VerbTable {
        &self.verbs
    }

    // ── Resolution ───────────────────────────────────────────────────

    /// Resolve a logical name to its descriptor for this device: the
    /// capability definition first, then a descriptor synthesized from the
    /// mapping table for the device's generation.
    pub fn describe(&self, device: &Device, name: &str) -> Option<ParameterDescriptor> {
        let snapshot = self.catalog.snapshot();
        if let Some(definition) = snapshot.resolve(device) {
            if let Some(descriptor) =
                self.catalog.parameter_details(&definition.device_type, name)
            {
                return Some(descriptor);
            }
        }
        snapshot.mapping.descriptor_for(name, device.generation)
    }

    /// The parameter names and verbs this device answers to.
    pub fn supported(&self, device: &Device) -> SupportedSurface {
        let snapshot = self.catalog.snapshot();
        let mut parameters: Vec<String> = snapshot
            .resolve(device)
            .map(|def| def.parameters.keys().cloned().collect())
            .unwrap_or_default();
        for name in snapshot.mapping.names_for(device.generation) {
            parameters.push(name.to_string());
        }
        parameters.sort();
        parameters.dedup();

        SupportedSurface {
            parameters,
            operations: self.verbs.verbs().iter().map(|v| v.to_string()).collect(),
        }
    }

    // ── get ─────────────────────────────────────────────────────────

    /// Read the current value of a logical parameter.
    pub async fn get(
        &self,
        device: &Device,
        name: &str,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let start = Instant::now();
        let mut state = OperationState::Pending;
        advance(&mut state, OperationState::Resolving, &device.id);

        let summary = format!("get {name}");
        let Some(descriptor) = self.describe(device, name) else {
            advance(&mut state, OperationState::Failed, &device.id);
            return finish(
                OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::UnsupportedParameter,
                    format!("parameter '{name}' is not known for device type '{}'", device.device_type),
                    summary,
                ),
                start,
            );
        };
        let Some(host) = device.host() else {
            advance(&mut state, OperationState::Failed, &device.id);
            return finish(
                OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::Unreachable,
                    "device has no IP address",
                    summary,
                ),
                start,
            );
        };

        let lock = self.registry.op_lock(&device.id);
        let _guard = lock.lock().await;
        advance(&mut state, OperationState::Dispatching, &device.id);
        advance(&mut state, OperationState::AwaitingResponse, &device.id);

        let outcome = if device.generation.is_gen1() {
            self.read_gen1(host, &descriptor, cancel).await
        } else {
            self.read_rpc(host, &descriptor, cancel).await
        };

        let result = match outcome {
            Ok(value) => {
                advance(&mut state, OperationState::Succeeded, &device.id);
                let mut result = OperationResult::success(device.id.clone(), summary);
                result.value = Some(value);
                result
            }
            Err((kind, message)) => {
                advance(&mut state, terminal_for(kind), &device.id);
                OperationResult::failure(device.id.clone(), kind, message, summary)
            }
        };
        advance(&mut state, OperationState::Finalized, &device.id);
        finish(result, start)
    }

    async fn read_gen1(
        &self,
        host: &str,
        descriptor: &ParameterDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Value, (ErrorKind, String)> {
        let payload = self
            .gen1
            .get(host, &descriptor.api, &[], cancel)
            .await
            .map_err(classify_api_error)?;
        self.extract(descriptor, &payload, None)
    }

    async fn read_rpc(
        &self,
        host: &str,
        descriptor: &ParameterDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Value, (ErrorKind, String)> {
        let reader = rpc_reader_for(&descriptor.api).unwrap_or_else(|| descriptor.api.clone());
        let params = match indexed_component(descriptor) {
            Some((_, id)) => json!({ "id": id }),
            None => json!({}),
        };
        let payload = self
            .rpc
            .call(host, &reader, params, cancel)
            .await
            .map_err(classify_api_error)?;
        let component_key = match indexed_component(descriptor) {
            // Indexed getters answer with the instance config directly.
            Some(_) => None,
            None => descriptor.component.as_deref(),
        };
        self.extract(descriptor, &payload, component_key)
    }

    /// Navigate `component_key` (when set) and the descriptor path, then
    /// coerce the leaf.
    fn extract(
        &self,
        descriptor: &ParameterDescriptor,
        payload: &Value,
        component_key: Option<&str>,
    ) -> Result<Value, (ErrorKind, String)> {
        let root = match component_key {
            Some(key) => payload.get(key).ok_or_else(|| {
                (
                    ErrorKind::PathMissing,
                    format!("component '{key}' not present in response"),
                )
            })?,
            None => payload,
        };
        let segments = parse_path(&descriptor.parameter_path)
            .map_err(|e| (ErrorKind::Internal, e))?;
        let leaf = lookup(root, &segments).ok_or_else(|| {
            (
                ErrorKind::PathMissing,
                format!(
                    "path '{}' not found in response (stale capability data?)",
                    descriptor.parameter_path
                ),
            )
        })?;
        coerce_read(leaf, descriptor)
            .map_err(|e| (ErrorKind::TypeMismatch, e.to_string()))
    }

    // ── set ─────────────────────────────────────────────────────────

    /// Write a logical parameter, optionally coordinating the reboot the
    /// parameter calls for.
    pub async fn set(
        &self,
        device: &Device,
        name: &str,
        value: Value,
        opts: SetOptions,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let start = Instant::now();
        let mut state = OperationState::Pending;
        advance(&mut state, OperationState::Resolving, &device.id);
        let summary = format!("set {name}");

        let Some(descriptor) = self.describe(device, name) else {
            return finish(
                OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::UnsupportedParameter,
                    format!("parameter '{name}' is not known for device type '{}'", device.device_type),
                    summary,
                ),
                start,
            );
        };
        if descriptor.read_only {
            return finish(
                OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::UnsupportedParameter,
                    format!("parameter '{name}' is read-only"),
                    summary,
                ),
                start,
            );
        }
        let coerced = match coerce(&value, &descriptor) {
            Ok(coerced) => coerced,
            Err(e) => {
                return finish(
                    OperationResult::failure(
                        device.id.clone(),
                        ErrorKind::TypeMismatch,
                        e.to_string(),
                        summary,
                    ),
                    start,
                );
            }
        };
        let Some(host) = device.host() else {
            return finish(
                OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::Unreachable,
                    "device has no IP address",
                    summary,
                ),
                start,
            );
        };

        let lock = self.registry.op_lock(&device.id);
        let _guard = lock.lock().await;
        advance(&mut state, OperationState::Dispatching, &device.id);
        advance(&mut state, OperationState::AwaitingResponse, &device.id);

        let outcome = if device.generation.is_gen1() {
            self.write_gen1(host, &descriptor, &coerced, cancel).await
        } else {
            self.write_rpc(host, &descriptor, &coerced, cancel).await
        };

        let mut result = match outcome {
            Ok(write) => {
                advance(&mut state, OperationState::Succeeded, &device.id);
                let mut result = OperationResult::success(device.id.clone(), write.request_summary);
                result.reboot_required = descriptor.requires_restart || write.restart_required;
                result.value = Some(coerced.clone());
                if let Some(echoed) = write.echoed {
                    if values_differ(&coerced, &echoed) {
                        result.warning = Some(Warning::Clamped);
                        result.value = Some(echoed);
                    }
                }
                result
            }
            Err((kind, message)) => {
                advance(&mut state, terminal_for(kind), &device.id);
                let result =
                    OperationResult::failure(device.id.clone(), kind, message, summary);
                advance(&mut state, OperationState::Finalized, &device.id);
                return finish(result, start);
            }
        };

        // Reflect common parameters back into the registry record.
        self.write_back(device, name, result.value.as_ref().unwrap_or(&coerced));

        // Coordinated reboot: only the Succeeded state re-enters I/O, and
        // a reboot failure never invalidates the successful write.
        if opts.reboot_if_needed && result.reboot_required {
            advance(&mut state, OperationState::MaybeRebooting, &device.id);
            if let Err(e) = self.reboot_and_wait(device, host, cancel).await {
                result.secondary_error = Some(e);
            } else {
                result.response_summary = Some("rebooted".to_string());
            }
        }
        advance(&mut state, OperationState::Finalized, &device.id);
        finish(result, start)
    }

    async fn write_gen1(
        &self,
        host: &str,
        descriptor: &ParameterDescriptor,
        value: &Value,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, (ErrorKind, String)> {
        let key = last_key(&descriptor.parameter_path).to_string();
        let encoded = encode_gen1(value);
        let query = vec![(key, encoded.clone())];
        let request_summary = format!(
            "GET http://{host}/{}?{}={}",
            descriptor.api,
            last_key(&descriptor.parameter_path),
            encoded
        );

        let payload = self
            .gen1
            .get(host, &descriptor.api, &query, cancel)
            .await
            .map_err(classify_api_error)?;

        // Gen1 reports structured failures as an "error" field in an
        // otherwise-200 response.
        if let Some(error) = payload.get("error") {
            return Err((ErrorKind::DeviceError, error.to_string()));
        }

        // Gen1 echoes the updated document; a differing echo means the
        // device clamped the value.
        let echoed = parse_path(&descriptor.parameter_path)
            .ok()
            .and_then(|segments| lookup(&payload, &segments).cloned());

        Ok(WriteOutcome {
            request_summary,
            restart_required: false,
            echoed,
        })
    }

    async fn write_rpc(
        &self,
        host: &str,
        descriptor: &ParameterDescriptor,
        value: &Value,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, (ErrorKind, String)> {
        if descriptor.parameter_path.contains('[') {
            return Err((
                ErrorKind::Internal,
                format!(
                    "indexed path '{}' is not writable via config",
                    descriptor.parameter_path
                ),
            ));
        }

        let config = nest(&descriptor.parameter_path, value.clone());
        let params = match indexed_component(descriptor) {
            Some((_, id)) => json!({ "id": id, "config": config }),
            None => match descriptor.component.as_deref() {
                Some(component) => {
                    let mut wrapper = serde_json::Map::new();
                    wrapper.insert(component.to_string(), config);
                    json!({ "config": Value::Object(wrapper) })
                }
                None => json!({ "config": config }),
            },
        };
        let request_summary = format!("POST http://{host}/rpc {} {params}", descriptor.api);

        let result = self
            .rpc
            .call(host, &descriptor.api, params, cancel)
            .await
            .map_err(classify_api_error)?;

        let restart_required = result
            .get("restart_required")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(WriteOutcome {
            request_summary,
            restart_required,
            echoed: None,
        })
    }

    /// Update the registry record for parameters it mirrors.
    fn write_back(&self, device: &Device, name: &str, value: &Value) {
        let canonical = self.catalog.snapshot().mapping.canonicalize(name).to_string();
        let update = match canonical.as_str() {
            "eco_mode" => value.as_bool().map(|enabled| {
                Box::new(move |d: &mut Device| d.eco_mode_enabled = Some(enabled))
                    as Box<dyn FnOnce(&mut Device)>
            }),
            "name" => value.as_str().map(|name| {
                let name = name.to_string();
                Box::new(move |d: &mut Device| d.name = Some(name))
                    as Box<dyn FnOnce(&mut Device)>
            }),
            _ => None,
        };
        if let Some(apply) = update {
            if let Err(e) = self.registry.update_with(&device.id, apply) {
                warn!(device = %device.id, error = %e, "write-back to registry failed");
            }
        }
    }

    /// Issue the generation's reboot call, then hold for the grace period.
    async fn reboot_and_wait(
        &self,
        device: &Device,
        host: &str,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        debug!(device = %device.id, "issuing coordinated reboot");
        let reboot = if device.generation.is_gen1() {
            self.gen1.get(host, "reboot", &[], cancel).await.map(|_| ())
        } else {
            self.rpc
                .call(host, "Shelly.Reboot", json!({}), cancel)
                .await
                .map(|_| ())
        };
        if let Err(e) = reboot {
            return Err(format!("reboot call failed: {e}"));
        }
        // Bounded grace; an abort here leaves the dispatched reboot alone.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("reboot wait cancelled".to_string()),
            _ = tokio::time::sleep(self.reboot_grace) => Ok(()),
        }
    }

    // ── operate ─────────────────────────────────────────────────────

    /// Execute a control verb (`on`, `toggle`, `reboot`, ...).
    ///
    /// An unknown verb or missing argument is a caller contract violation
    /// and comes back as `Err`, never as a per-device failure.
    pub async fn operate(
        &self,
        device: &Device,
        verb: &str,
        opts: &OperateOptions,
        cancel: &CancellationToken,
    ) -> Result<OperationResult, CoreError> {
        let start = Instant::now();
        let mut state = OperationState::Pending;
        advance(&mut state, OperationState::Resolving, &device.id);

        let recipe = self.verbs.get(verb).ok_or_else(|| CoreError::Validation {
            field: "verb".into(),
            reason: format!("unknown operation '{verb}'"),
        })?;
        let profile = self
            .catalog
            .resolve(device)
            .map(|def| ControlProfile::from_definition(&def))
            .unwrap_or(ControlProfile::Relay);

        let Some(host) = device.host() else {
            return Ok(finish(
                OperationResult::failure(
                    device.id.clone(),
                    ErrorKind::Unreachable,
                    "device has no IP address",
                    verb,
                ),
                start,
            ));
        };

        // Build the wire plan up front so argument errors surface as
        // contract violations before any I/O.
        let plan = if device.generation.is_gen1() {
            let endpoint = match recipe.gen1.endpoint {
                Gen1Endpoint::Channel => profile.gen1_channel().to_string(),
                Gen1Endpoint::Fixed(endpoint) => endpoint.to_string(),
            };
            let query = verbs::substitute_query(&recipe.gen1.query, &opts.args).map_err(|e| {
                CoreError::Validation {
                    field: "args".into(),
                    reason: e,
                }
            })?;
            WirePlan::Gen1 { endpoint, query }
        } else {
            let (method, params) = recipe.rpc.for_profile(profile);
            let params = verbs::substitute_params(&params, &opts.args).map_err(|e| {
                CoreError::Validation {
                    field: "args".into(),
                    reason: e,
                }
            })?;
            WirePlan::Rpc {
                method: method.to_string(),
                params,
            }
        };

        let lock = self.registry.op_lock(&device.id);
        let _guard = lock.lock().await;
        advance(&mut state, OperationState::Dispatching, &device.id);
        advance(&mut state, OperationState::AwaitingResponse, &device.id);

        let (summary, outcome) = match &plan {
            WirePlan::Gen1 { endpoint, query } => {
                let summary = format!("GET http://{host}/{endpoint}");
                let outcome = self
                    .gen1
                    .get(host, endpoint, query, cancel)
                    .await
                    .map_err(classify_api_error)
                    .and_then(|payload| match payload.get("error") {
                        Some(error) => Err((ErrorKind::DeviceError, error.to_string())),
                        None => Ok(payload),
                    });
                (summary, outcome)
            }
            WirePlan::Rpc { method, params } => {
                let summary = format!("POST http://{host}/rpc {method}");
                let outcome = self
                    .rpc
                    .call(host, method, params.clone(), cancel)
                    .await
                    .map_err(classify_api_error);
                (summary, outcome)
            }
        };

        let mut result = match outcome {
            Ok(payload) => {
                advance(&mut state, OperationState::Succeeded, &device.id);
                let mut result = OperationResult::success(device.id.clone(), summary);
                result.value = Some(match verb {
                    "check_updates" => update_summary(device, &payload),
                    _ => payload,
                });
                result
            }
            Err((kind, message)) => {
                advance(&mut state, terminal_for(kind), &device.id);
                OperationResult::failure(device.id.clone(), kind, message, summary)
            }
        };

        if verb == "update_firmware" && result.success {
            if let Some(deadline) = opts.wait_for_update {
                result.response_summary =
                    Some(self.poll_update(device, host, deadline, cancel).await);
            }
        }

        advance(&mut state, OperationState::Finalized, &device.id);
        Ok(finish(result, start))
    }

    /// Poll the update status after an `update_firmware` dispatch until
    /// the flag clears or the deadline passes.
    async fn poll_update(
        &self,
        device: &Device,
        host: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> String {
        let started = Instant::now();
        while started.elapsed() < deadline {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return "update poll cancelled".to_string(),
                _ = tokio::time::sleep(self.update_poll_interval) => {}
            }
            let status = if device.generation.is_gen1() {
                self.gen1.get(host, "status", &[], cancel).await
            } else {
                self.rpc
                    .call(host, "Shelly.GetStatus", json!({}), cancel)
                    .await
            };
            if let Ok(payload) = status {
                let summary = update_summary(device, &payload);
                if summary.get("has_update") == Some(&Value::Bool(false)) {
                    return format!("update completed after {:?}", started.elapsed());
                }
            }
            // Mid-update the device reboots and drops connections; keep
            // polling until the deadline.
        }
        "update still in progress at deadline".to_string()
    }

}

// ── Internals ───────────────────────────────────────────────────────

enum WirePlan {
    Gen1 {
        endpoint: String,
        query: Vec<(String, String)>,
    },
    Rpc {
        method: String,
        params: Value,
    },
}

struct WriteOutcome {
    request_summary: String,
    restart_required: bool,
    echoed: Option<Value>,
}

/// Extract the update-availability view of a status payload.
fn update_summary(device: &Device, payload: &Value) -> Value {
    if device.generation.is_gen1() {
        let update = payload.get("update").cloned().unwrap_or(Value::Null);
        let has_update = update
            .get("has_update")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        json!({
            "has_update": has_update,
            "current_version": update.get("old_version").cloned().unwrap_or(Value::Null),
            "new_version": if has_update { update.get("new_version").cloned().unwrap_or(Value::Null) } else { Value::Null },
        })
    } else {
        let stable = payload
            .get("sys")
            .and_then(|sys| sys.get("available_updates"))
            .and_then(|u| u.get("stable"));
        json!({
            "has_update": stable.is_some(),
            "new_version": stable
                .and_then(|s| s.get("version"))
                .cloned()
                .unwrap_or(Value::Null),
        })
    }
}

/// The `(component, id)` pair for an indexed component like `switch:0`.
fn indexed_component(descriptor: &ParameterDescriptor) -> Option<(&str, u64)> {
    let component = descriptor.component.as_deref()?;
    let (name, index) = component.split_once(':')?;
    index.parse().ok().map(|id| (name, id))
}

fn values_differ(written: &Value, echoed: &Value) -> bool {
    match (written.as_f64(), echoed.as_f64()) {
        // Numeric comparison tolerates int/float representation drift.
        (Some(a), Some(b)) => (a - b).abs() > f64::EPSILON,
        _ => written != echoed,
    }
}

fn terminal_for(kind: ErrorKind) -> OperationState {
    match kind {
        ErrorKind::Cancelled => OperationState::Cancelled,
        _ => OperationState::Failed,
    }
}

fn finish(mut result: OperationResult, start: Instant) -> OperationResult {
    result.duration = start.elapsed();
    result
}

fn classify_api_error(error: ApiError) -> (ErrorKind, String) {
    let message = error.to_string();
    let kind = match &error {
        ApiError::Cancelled => ErrorKind::Cancelled,
        ApiError::Rpc(_) => ErrorKind::DeviceError,
        ApiError::Http { .. } => ErrorKind::HttpError,
        ApiError::Deserialization { .. } => ErrorKind::DeviceError,
        ApiError::Transport(_) => {
            if error.is_timeout() {
                ErrorKind::Timeout
            } else if error.is_connect() {
                ErrorKind::Unreachable
            } else {
                ErrorKind::Internal
            }
        }
        ApiError::InvalidUrl(_) => ErrorKind::Internal,
    };
    (kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ParamType, ParameterDescriptor};

    fn switch_descriptor() -> ParameterDescriptor {
        let mut d = ParameterDescriptor::new(ParamType::Enum, "Switch.SetConfig", "in_mode");
        d.component = Some("switch:0".into());
        d
    }

    #[test]
    fn indexed_component_parses_instance() {
        let d = switch_descriptor();
        assert_eq!(indexed_component(&d), Some(("switch", 0)));

        let mut plain = ParameterDescriptor::new(ParamType::Boolean, "Sys.SetConfig", "eco_mode");
        plain.component = Some("device".into());
        assert_eq!(indexed_component(&plain), None);
    }

    #[test]
    fn update_summary_gen1_stable_only() {
        let device = Device::manual(
            MacAddr::new("E868E7EA6333"),
            "SHPLG-S".into(),
            crate::model::DeviceGeneration::Gen1,
        );
        let payload = json!({
            "update": { "has_update": true, "old_version": "1.11.0", "new_version": "1.14.0" }
        });
        let summary = update_summary(&device, &payload);
        assert_eq!(summary["has_update"], json!(true));
        assert_eq!(summary["new_version"], json!("1.14.0"));
    }

    #[test]
    fn update_summary_rpc_reads_sys_available_updates() {
        let device = Device::manual(
            MacAddr::new("A1B2C3D4E5F6"),
            "Plus1PM".into(),
            crate::model::DeviceGeneration::Gen2,
        );
        let payload = json!({
            "sys": { "available_updates": { "stable": { "version": "1.2.0" } } }
        });
        let summary = update_summary(&device, &payload);
        assert_eq!(summary["has_update"], json!(true));
        assert_eq!(summary["new_version"], json!("1.2.0"));

        let none = update_summary(&device, &json!({ "sys": {} }));
        assert_eq!(none["has_update"], json!(false));
    }

    #[test]
    fn values_differ_tolerates_numeric_representation() {
        assert!(!values_differ(&json!(2500), &json!(2500.0)));
        assert!(values_differ(&json!(2800), &json!(2500)));
        assert!(values_differ(&json!("a"), &json!("b")));
    }
}
