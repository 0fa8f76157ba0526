// ── Capability discovery ──
//
// Probes a live device to learn its capability surface: which endpoints or
// RPC methods answer, what shape their responses have, and which parameters
// can be harvested from the config payloads. The result is a
// CapabilityDefinition ready to be cached on disk.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shelly_api::{Gen1Client, RpcClient, TransportConfig};

use crate::catalog::definition::{
    rpc_setter_for, structure_of, ApiDescriptor, CapabilityDefinition, ParamType,
    ParameterDescriptor,
};
use crate::catalog::mapping::ParameterMapping;
use crate::error::CoreError;
use crate::model::Device;

/// Fixed Gen1 probe set: identification, the two root documents, and
/// endpoint-detection probes for the per-peripheral sub-settings.
const GEN1_PROBE_ENDPOINTS: &[&str] = &[
    "shelly",
    "settings",
    "status",
    "settings/relay/0",
    "settings/light/0",
    "settings/roller/0",
    "settings/actions",
    "settings/ap",
    "settings/mqtt",
    "settings/cloud",
    "settings/device",
    "settings/network",
    "settings/login",
    "settings/webhooks",
];

/// Fixed Gen2+ probe set.
const RPC_PROBE_METHODS: &[&str] = &[
    "Shelly.GetDeviceInfo",
    "Shelly.GetConfig",
    "Shelly.GetStatus",
    "Sys.GetStatus",
    "Cloud.GetConfig",
    "MQTT.GetConfig",
    "WiFi.GetConfig",
    "BLE.GetConfig",
    "Script.List",
    "Schedule.List",
];

/// Field names that are read-only no matter which endpoint reported them.
/// Matched against the final path segment; `build_info.` is a prefix match
/// on the full path.
const READ_ONLY_FIELDS: &[&str] = &[
    "mac", "fw", "ssid", "uptime", "ver", "fw_id", "app", "model", "gen", "type", "auth",
    "serial", "time", "unixtime", "has_update", "ram_total", "ram_free", "fs_size", "fs_free",
    "num_outputs", "num_meters",
];

const READ_ONLY_PREFIXES: &[&str] = &["build_info."];

/// How deep parameter harvesting descends into config payloads.
const HARVEST_MAX_DEPTH: usize = 4;

/// Probes devices and produces capability definitions.
pub struct CapabilityScanner {
    gen1: Gen1Client,
    rpc: RpcClient,
}

impl CapabilityScanner {
    pub fn new(transport: &TransportConfig) -> Result<Self, CoreError> {
        Ok(Self {
            gen1: Gen1Client::new(transport)
                .map_err(|e| CoreError::Internal(e.to_string()))?,
            rpc: RpcClient::new(transport)
                .map_err(|e| CoreError::Internal(e.to_string()))?,
        })
    }

    /// Probe `device` and build its capability definition.
    ///
    /// The device record itself is the authority; the returned definition
    /// is a cache of what the probe observed at this moment.
    pub async fn discover(
        &self,
        device: &Device,
        mapping: &ParameterMapping,
        cancel: &CancellationToken,
    ) -> Result<CapabilityDefinition, CoreError> {
        let host = device.host().ok_or_else(|| CoreError::Validation {
            field: "ip_address".into(),
            reason: format!("device {} has no IP address", device.id),
        })?;

        let device_type = type_id_for(device);
        info!(device = %device.id, %device_type, "discovering capabilities");

        let mut definition = CapabilityDefinition::new(
            device_type,
            device
                .name
                .clone()
                .unwrap_or_else(|| format!("Shelly {}", device.device_type)),
            device.generation,
        );
        accumulate_type_mappings(&mut definition, device);

        if device.generation.is_gen1() {
            self.probe_gen1(&host, mapping, &mut definition, cancel).await;
            ensure_gen1_eco_mode(&mut definition);
        } else {
            self.probe_rpc(&host, mapping, &mut definition, cancel).await;
        }

        definition.generated_at = Some(chrono::Utc::now());
        Ok(definition)
    }

    // ── Gen1 ────────────────────────────────────────────────────────

    async fn probe_gen1(
        &self,
        host: &str,
        mapping: &ParameterMapping,
        definition: &mut CapabilityDefinition,
        cancel: &CancellationToken,
    ) {
        for endpoint in GEN1_PROBE_ENDPOINTS {
            if cancel.is_cancelled() {
                return;
            }
            match self.gen1.get(host, endpoint, &[], cancel).await {
                Ok(payload) => {
                    definition.apis.insert(
                        (*endpoint).to_string(),
                        ApiDescriptor {
                            description: format!("Gen1 REST endpoint: /{endpoint}"),
                            response_structure: structure_of(&payload),
                        },
                    );
                    harvest_gen1_parameters(endpoint, &payload, mapping, definition);
                }
                Err(e) => {
                    debug!(endpoint, error = %e, "Gen1 probe endpoint not available");
                }
            }
        }
    }

    // ── Gen2+ ───────────────────────────────────────────────────────

    async fn probe_rpc(
        &self,
        host: &str,
        mapping: &ParameterMapping,
        definition: &mut CapabilityDefinition,
        cancel: &CancellationToken,
    ) {
        for method in RPC_PROBE_METHODS {
            if cancel.is_cancelled() {
                return;
            }
            match self
                .rpc
                .call(host, method, serde_json::json!({}), cancel)
                .await
            {
                Ok(payload) => {
                    definition.apis.insert(
                        (*method).to_string(),
                        ApiDescriptor {
                            description: format!("Gen2+ RPC method: {method}"),
                            response_structure: structure_of(&payload),
                        },
                    );
                    harvest_rpc_parameters(method, &payload, mapping, definition);
                }
                Err(e) => {
                    debug!(method, error = %e, "RPC probe method not available");
                }
            }
        }
    }
}

// ── Type identity ───────────────────────────────────────────────────

/// The primary device-type id a definition is filed under.
fn type_id_for(device: &Device) -> String {
    if device.generation.is_gen1() {
        if let Some(raw_type) = device.raw_type.as_deref().filter(|s| !s.is_empty()) {
            return raw_type.to_string();
        }
    } else if let Some(raw_app) = device.raw_app.as_deref().filter(|s| !s.is_empty()) {
        return raw_app.to_string();
    }
    if !device.device_type.is_empty() && device.device_type != "unknown" {
        return device.device_type.clone();
    }
    format!("unknown_{}", device.id)
}

fn accumulate_type_mappings(definition: &mut CapabilityDefinition, device: &Device) {
    let mut push = |candidate: Option<&str>| {
        if let Some(s) = candidate.filter(|s| !s.is_empty()) {
            if !definition
                .type_mappings
                .iter()
                .any(|m| m.eq_ignore_ascii_case(s))
            {
                definition.type_mappings.push(s.to_string());
            }
        }
    };
    push(device.raw_type.as_deref());
    push(device.raw_app.as_deref());
    // Hostname prefixes like "shellyplug-s" identify the model family as
    // long as they carry no device-specific digits-only tail.
    if let Some(hostname) = device.hostname.as_deref() {
        if let Some(prefix) = hostname.split('-').next() {
            if !prefix.chars().any(|c| c.is_ascii_digit()) {
                push(Some(&prefix.to_lowercase()));
            }
        }
    }
}

// ── Gen1 harvesting ─────────────────────────────────────────────────

fn harvest_gen1_parameters(
    endpoint: &str,
    payload: &Value,
    mapping: &ParameterMapping,
    definition: &mut CapabilityDefinition,
) {
    let read_only = endpoint == "status";
    for (path, leaf) in collect_leaves(payload) {
        let name = mapping.canonicalize(&path).to_string();
        if definition.parameters.contains_key(&name) {
            continue;
        }
        let mut descriptor = ParameterDescriptor::new(ParamType::infer(leaf), endpoint, path.clone());
        descriptor.read_only = read_only || is_forced_read_only(&path);
        definition.parameters.insert(name, descriptor);
    }
}

/// Every Gen1 device carries the eco-mode setting even when the observed
/// settings payload omitted it; keep the fleet-wide logical name working.
fn ensure_gen1_eco_mode(definition: &mut CapabilityDefinition) {
    definition
        .parameters
        .entry("eco_mode".to_string())
        .or_insert_with(|| {
            let mut d = ParameterDescriptor::new(ParamType::Boolean, "settings", "eco_mode_enabled");
            d.description = "Energy saving mode".to_string();
            d
        });
}

// ── Gen2+ harvesting ────────────────────────────────────────────────

fn harvest_rpc_parameters(
    method: &str,
    payload: &Value,
    mapping: &ParameterMapping,
    definition: &mut CapabilityDefinition,
) {
    match method {
        "Shelly.GetConfig" => {
            let Value::Object(components) = payload else {
                return;
            };
            for (component_key, component_value) in components {
                harvest_component(component_key, component_value, mapping, definition);
            }
        }
        _ if method.ends_with(".GetConfig") => {
            let Some(setter) = rpc_setter_for(method) else {
                return;
            };
            let family = method
                .split('.')
                .next()
                .unwrap_or_default()
                .to_lowercase();
            for (path, leaf) in collect_leaves(payload) {
                insert_rpc_parameter(
                    definition,
                    format!("{family}.{path}"),
                    ParamType::infer(leaf),
                    &setter,
                    None,
                    path,
                );
            }
        }
        _ => {}
    }
}

/// Harvest one component of a `Shelly.GetConfig` response.
///
/// The setter method is derived from the component family; the descriptor's
/// `component` is the nesting key *inside* that method's config payload:
/// `sys.device.eco_mode` becomes `{api: Sys.SetConfig, component: device,
/// parameter_path: eco_mode}`, while an indexed family like `switch:0`
/// keeps the instance (its index becomes the RPC `id`).
fn harvest_component(
    component_key: &str,
    component_value: &Value,
    mapping: &ParameterMapping,
    definition: &mut CapabilityDefinition,
) {
    let family = component_key.split(':').next().unwrap_or(component_key);
    let setter = component_setter(family);
    let indexed = component_key.contains(':');

    for (path, leaf) in collect_leaves(component_value) {
        let param_type = ParamType::infer(leaf);
        if family == "sys" {
            // Sys config nests per-topic: device.eco_mode, location.tz, ...
            match path.split_once('.') {
                Some((topic, remainder)) => insert_rpc_parameter(
                    definition,
                    mapping.canonicalize(remainder).to_string(),
                    param_type,
                    &setter,
                    Some(topic.to_string()),
                    remainder.to_string(),
                ),
                None => insert_rpc_parameter(
                    definition,
                    path.clone(),
                    param_type,
                    &setter,
                    None,
                    path,
                ),
            }
        } else if indexed {
            insert_rpc_parameter(
                definition,
                format!("{component_key}.{path}"),
                param_type,
                &setter,
                Some(component_key.to_string()),
                path,
            );
        } else {
            insert_rpc_parameter(
                definition,
                format!("{component_key}.{path}"),
                param_type,
                &setter,
                None,
                path,
            );
        }
    }
}

fn insert_rpc_parameter(
    definition: &mut CapabilityDefinition,
    name: String,
    param_type: ParamType,
    setter: &str,
    component: Option<String>,
    path: String,
) {
    if definition.parameters.contains_key(&name) {
        return;
    }
    let mut descriptor = ParameterDescriptor::new(param_type, setter, path.clone());
    descriptor.component = component;
    descriptor.read_only = is_forced_read_only(&path);
    definition.parameters.insert(name, descriptor);
}

/// `*.SetConfig` method for a component family key.
fn component_setter(family: &str) -> String {
    match family {
        "sys" => "Sys.SetConfig".to_string(),
        "wifi" => "WiFi.SetConfig".to_string(),
        "mqtt" => "MQTT.SetConfig".to_string(),
        "ble" => "BLE.SetConfig".to_string(),
        other => {
            let mut chars = other.chars();
            let capitalized: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
            format!("{capitalized}.SetConfig")
        }
    }
}

// ── Leaf walking ────────────────────────────────────────────────────

/// Collect `(dotted_path, leaf_value)` pairs. Arrays are represented by
/// their first element with a bracketed index (`valves[0].state`).
fn collect_leaves(value: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    walk(value, String::new(), 0, &mut out);
    out
}

fn walk<'a>(value: &'a Value, prefix: String, depth: usize, out: &mut Vec<(String, &'a Value)>) {
    if depth >= HARVEST_MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                walk(child, path, depth + 1, out);
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                if !prefix.is_empty() {
                    walk(first, format!("{prefix}[0]"), depth + 1, out);
                }
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.push((prefix, leaf));
            }
        }
    }
}

fn is_forced_read_only(path: &str) -> bool {
    if READ_ONLY_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return true;
    }
    let last = path.rsplit('.').next().unwrap_or(path);
    let last = last.split('[').next().unwrap_or(last);
    READ_ONLY_FIELDS.contains(&last)
}
