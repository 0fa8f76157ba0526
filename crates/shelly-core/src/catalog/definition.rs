// ── Capability definition types ──
//
// A CapabilityDefinition is the cached knowledge about one device model:
// which APIs it answers and which parameters those APIs carry. Definitions
// are YAML files on disk, rebuildable from a live device, and hand-editable.
// BTreeMaps keep serialization deterministic so re-discovery of an unchanged
// device writes a byte-identical file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::DeviceGeneration;

// ── Parameter value types ───────────────────────────────────────────

/// Declared type of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Boolean,
    Integer,
    Float,
    String,
    Enum,
    Object,
    Array,
    /// Observed as a literal `null`; treated as nullable by the engine.
    Null,
}

impl ParamType {
    /// JSON-type-at-observation inference for response leaves.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Float,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::Null => Self::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Enum => "enum",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        }
    }
}

// ── Response structure descriptors ──────────────────────────────────

/// Nested descriptor of an observed response shape: field names mapped to
/// their JSON types, recursed to a bounded depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseStructure {
    /// Leaf type name (`"boolean"`, `"integer"`, ...) or `"..."` where the
    /// recursion was truncated.
    Leaf(String),
    /// An array, described by its first element.
    Array(Vec<ResponseStructure>),
    Object(BTreeMap<String, ResponseStructure>),
}

/// Depth guard matching what device payloads warrant in practice.
const STRUCTURE_MAX_DEPTH: usize = 3;

/// Describe the shape of an observed JSON payload.
pub fn structure_of(value: &Value) -> ResponseStructure {
    structure_at(value, 0)
}

fn structure_at(value: &Value, depth: usize) -> ResponseStructure {
    if depth >= STRUCTURE_MAX_DEPTH {
        return ResponseStructure::Leaf("...".to_string());
    }
    match value {
        Value::Object(map) => ResponseStructure::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), structure_at(v, depth + 1)))
                .collect(),
        ),
        Value::Array(items) => match items.first() {
            Some(first) => ResponseStructure::Array(vec![structure_at(first, depth + 1)]),
            None => ResponseStructure::Array(Vec::new()),
        },
        leaf => ResponseStructure::Leaf(ParamType::infer(leaf).as_str().to_string()),
    }
}

// ── Descriptors ─────────────────────────────────────────────────────

/// One API a device model answers: a Gen1 REST sub-path (`settings`,
/// `settings/relay/0`) or a Gen2+ RPC method (`Sys.GetConfig`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    #[serde(default)]
    pub description: String,
    pub response_structure: ResponseStructure,
}

/// How one logical parameter is carried by a device model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub read_only: bool,

    /// The API within the same definition that carries this parameter.
    /// For Gen1 a REST sub-path; for Gen2+ an RPC method, usually the
    /// `*.SetConfig` counterpart of the reader it was harvested from.
    pub api: String,

    /// Dotted/indexed path into the API's JSON payload
    /// (`mqtt.enable`, `valves[0].state`).
    pub parameter_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Gen2+ nesting hint: the config key the path nests under (`device`
    /// for `Sys.SetConfig`) or the indexed instance (`switch:0`) whose
    /// index becomes the RPC `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default)]
    pub requires_restart: bool,
}

impl ParameterDescriptor {
    pub fn new(param_type: ParamType, api: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            param_type,
            description: String::new(),
            read_only: false,
            api: api.into(),
            parameter_path: path.into(),
            min: None,
            max: None,
            enum_values: None,
            unit: None,
            default: None,
            component: None,
            requires_restart: false,
        }
    }
}

// ── Definition ──────────────────────────────────────────────────────

/// Cached capability knowledge for one device model, keyed by
/// `device_type`. `type_mappings` lists synonymous SKU strings served by
/// this same definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub device_type: String,

    /// Human-readable model name.
    pub name: String,

    pub generation: DeviceGeneration,

    #[serde(default)]
    pub type_mappings: Vec<String>,

    #[serde(default)]
    pub apis: BTreeMap<String, ApiDescriptor>,

    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDescriptor>,

    /// Set when the file was produced by capability discovery; absent on
    /// hand-written files. `refresh` without `force` only touches files
    /// that carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl CapabilityDefinition {
    pub fn new(
        device_type: impl Into<String>,
        name: impl Into<String>,
        generation: DeviceGeneration,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            name: name.into(),
            generation,
            type_mappings: Vec::new(),
            apis: BTreeMap::new(),
            parameters: BTreeMap::new(),
            generated_at: None,
        }
    }

    pub fn has_api(&self, api: &str) -> bool {
        self.apis.contains_key(api)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.get(name)
    }

    /// Check the invariant that every parameter's `api` is declared, either
    /// directly or through its reader counterpart (`Sys.SetConfig` is
    /// implied by an observed `Sys.GetConfig`). Returns violations.
    pub fn undeclared_apis(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .filter(|(_, p)| {
                !self.has_api(&p.api)
                    && !rpc_reader_for(&p.api).is_some_and(|reader| self.has_api(&reader))
            })
            .map(|(name, p)| (name.clone(), p.api.clone()))
            .collect()
    }
}

// ── Setter / getter pairing ─────────────────────────────────────────

/// The reader RPC corresponding to a writer RPC. Fixed table, extended by
/// the generic `*.SetConfig -> *.GetConfig` rule for component methods.
pub fn rpc_reader_for(setter: &str) -> Option<String> {
    match setter {
        "Shelly.SetConfig" => Some("Shelly.GetConfig".to_string()),
        "Sys.SetConfig" => Some("Sys.GetConfig".to_string()),
        "WiFi.SetConfig" => Some("WiFi.GetConfig".to_string()),
        "MQTT.SetConfig" => Some("MQTT.GetConfig".to_string()),
        "Cloud.SetConfig" => Some("Cloud.GetConfig".to_string()),
        "BLE.SetConfig" => Some("BLE.GetConfig".to_string()),
        "Switch.SetConfig" => Some("Switch.GetConfig".to_string()),
        "Light.SetConfig" => Some("Light.GetConfig".to_string()),
        "Cover.SetConfig" => Some("Cover.GetConfig".to_string()),
        other => other
            .strip_suffix(".SetConfig")
            .map(|prefix| format!("{prefix}.GetConfig")),
    }
}

/// The writer RPC implied by an observed reader, where one exists.
pub fn rpc_setter_for(reader: &str) -> Option<String> {
    reader
        .strip_suffix(".GetConfig")
        .map(|prefix| format!("{prefix}.SetConfig"))
}
