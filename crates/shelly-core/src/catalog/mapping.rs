// ── The process-wide parameter mapping table ──
//
// Two jobs: translate legacy Gen1 field names to the canonical logical
// name (`eco_mode_enabled` -> `eco_mode`), and carry per-generation access
// recipes for the common parameters so they Just Work on unknown SKUs of a
// known generation. The engine consults this table before falling back to
// the per-type capability definition... strictly speaking after: a
// SKU-specific descriptor always wins; the table covers the gap.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::definition::{ParamType, ParameterDescriptor};
use crate::error::CoreError;
use crate::model::DeviceGeneration;

// ── Access recipes ──────────────────────────────────────────────────

/// Gen1 access: REST endpoint plus the query/payload property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gen1Access {
    pub endpoint: String,
    pub property: String,
}

/// Gen2+ access: RPC setter method, optional config nesting key (or
/// indexed instance), and the property path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcAccess {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub property: String,
}

/// One canonical logical name with its per-generation recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gen1: Option<Gen1Access>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "gen2")]
    pub rpc: Option<RpcAccess>,

    #[serde(default)]
    pub requires_restart: bool,
}

// ── Table ───────────────────────────────────────────────────────────

/// The editable, process-wide mapping table
/// (`config/parameter_mappings.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Canonical logical name -> per-generation access.
    #[serde(default)]
    pub mappings: BTreeMap<String, MappingEntry>,

    /// Legacy Gen1 field name -> canonical name. Names absent here
    /// (e.g. `led_power_disable`) are already canonical.
    #[serde(default)]
    pub legacy_names: BTreeMap<String, String>,
}

impl Default for ParameterMapping {
    fn default() -> Self {
        let mut mappings = BTreeMap::new();

        mappings.insert(
            "eco_mode".to_string(),
            MappingEntry {
                param_type: ParamType::Boolean,
                description: "Energy saving mode".to_string(),
                gen1: Some(Gen1Access {
                    endpoint: "settings".to_string(),
                    property: "eco_mode_enabled".to_string(),
                }),
                rpc: Some(RpcAccess {
                    method: "Sys.SetConfig".to_string(),
                    component: Some("device".to_string()),
                    property: "eco_mode".to_string(),
                }),
                requires_restart: false,
            },
        );

        mappings.insert(
            "name".to_string(),
            MappingEntry {
                param_type: ParamType::String,
                description: "Device name".to_string(),
                gen1: Some(Gen1Access {
                    endpoint: "settings".to_string(),
                    property: "name".to_string(),
                }),
                rpc: Some(RpcAccess {
                    method: "Sys.SetConfig".to_string(),
                    component: Some("device".to_string()),
                    property: "name".to_string(),
                }),
                requires_restart: false,
            },
        );

        mappings.insert(
            "max_power".to_string(),
            MappingEntry {
                param_type: ParamType::Float,
                description: "Maximum power in watts".to_string(),
                gen1: Some(Gen1Access {
                    endpoint: "settings".to_string(),
                    property: "max_power".to_string(),
                }),
                rpc: Some(RpcAccess {
                    method: "Switch.SetConfig".to_string(),
                    component: Some("switch:0".to_string()),
                    property: "power_limit".to_string(),
                }),
                requires_restart: false,
            },
        );

        mappings.insert(
            "mqtt.enable".to_string(),
            MappingEntry {
                param_type: ParamType::Boolean,
                description: "Enable MQTT".to_string(),
                gen1: Some(Gen1Access {
                    endpoint: "settings/mqtt".to_string(),
                    property: "mqtt_enable".to_string(),
                }),
                rpc: Some(RpcAccess {
                    method: "MQTT.SetConfig".to_string(),
                    component: None,
                    property: "enable".to_string(),
                }),
                requires_restart: true,
            },
        );

        mappings.insert(
            "mqtt.server".to_string(),
            MappingEntry {
                param_type: ParamType::String,
                description: "MQTT server address".to_string(),
                gen1: Some(Gen1Access {
                    endpoint: "settings/mqtt".to_string(),
                    property: "mqtt_server".to_string(),
                }),
                rpc: Some(RpcAccess {
                    method: "MQTT.SetConfig".to_string(),
                    component: None,
                    property: "server".to_string(),
                }),
                requires_restart: true,
            },
        );

        // Gen1-only plug LED control; the name is already canonical.
        mappings.insert(
            "led_power_disable".to_string(),
            MappingEntry {
                param_type: ParamType::Boolean,
                description: "Disable the power status LED".to_string(),
                gen1: Some(Gen1Access {
                    endpoint: "settings".to_string(),
                    property: "led_power_disable".to_string(),
                }),
                rpc: None,
                requires_restart: false,
            },
        );

        let legacy_names = [
            ("eco_mode_enabled", "eco_mode"),
            ("mqtt_enable", "mqtt.enable"),
            ("mqtt_server", "mqtt.server"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();

        Self {
            mappings,
            legacy_names,
        }
    }
}

impl ParameterMapping {
    /// Load the table from disk, creating the default file if absent.
    pub fn load_or_create(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            info!(path = %path.display(), "creating default parameter mappings file");
            let table = Self::default();
            table.save(path)?;
            return Ok(table);
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::io(path.display().to_string(), e))?;
        match serde_yaml::from_str::<Self>(&text) {
            Ok(table) if !table.mappings.is_empty() => {
                debug!(count = table.mappings.len(), "loaded parameter mappings");
                Ok(table)
            }
            Ok(_) | Err(_) => {
                warn!(path = %path.display(), "invalid parameter mappings file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::io(parent.display().to_string(), e))?;
        }
        let text =
            serde_yaml::to_string(self).map_err(|e| CoreError::yaml(path.display().to_string(), e))?;
        std::fs::write(path, text).map_err(|e| CoreError::io(path.display().to_string(), e))
    }

    // ── Name translation ─────────────────────────────────────────────

    /// Canonical name for a possibly-legacy Gen1 field name.
    pub fn canonicalize<'a>(&'a self, name: &'a str) -> &'a str {
        self.legacy_names.get(name).map_or(name, String::as_str)
    }

    /// The Gen1 field name for a canonical name, where they differ.
    pub fn gen1_name<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.mappings
            .get(canonical)
            .and_then(|e| e.gen1.as_ref())
            .map_or(canonical, |g| g.property.as_str())
    }

    /// Look up an entry, accepting either the canonical or a legacy name.
    pub fn entry(&self, name: &str) -> Option<&MappingEntry> {
        self.mappings.get(self.canonicalize(name))
    }

    // ── Descriptor synthesis ─────────────────────────────────────────

    /// Synthesize an ad-hoc descriptor for a device of `generation`, if
    /// the table has a branch for it. This is the fallback that makes
    /// common parameters work on SKUs with no capability file.
    pub fn descriptor_for(
        &self,
        name: &str,
        generation: DeviceGeneration,
    ) -> Option<ParameterDescriptor> {
        let entry = self.entry(name)?;
        let mut descriptor = if generation.is_gen1() {
            let gen1 = entry.gen1.as_ref()?;
            ParameterDescriptor::new(entry.param_type, gen1.endpoint.clone(), gen1.property.clone())
        } else if generation.is_rpc() {
            let rpc = entry.rpc.as_ref()?;
            let mut d =
                ParameterDescriptor::new(entry.param_type, rpc.method.clone(), rpc.property.clone());
            d.component = rpc.component.clone();
            d
        } else {
            return None;
        };
        descriptor.description = entry.description.clone();
        descriptor.requires_restart = entry.requires_restart;
        Some(descriptor)
    }

    /// Canonical names that have a branch for `generation`.
    pub fn names_for(&self, generation: DeviceGeneration) -> Vec<&str> {
        self.mappings
            .iter()
            .filter(|(_, e)| {
                (generation.is_gen1() && e.gen1.is_some())
                    || (generation.is_rpc() && e.rpc.is_some())
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_translates_legacy_names() {
        let table = ParameterMapping::default();
        assert_eq!(table.canonicalize("eco_mode_enabled"), "eco_mode");
        assert_eq!(table.canonicalize("led_power_disable"), "led_power_disable");
        assert_eq!(table.canonicalize("unknown_thing"), "unknown_thing");
    }

    #[test]
    fn gen1_name_round_trips() {
        let table = ParameterMapping::default();
        assert_eq!(table.gen1_name("eco_mode"), "eco_mode_enabled");
        assert_eq!(table.canonicalize(table.gen1_name("eco_mode")), "eco_mode");
    }

    #[test]
    fn descriptor_synthesis_gen1() {
        let table = ParameterMapping::default();
        let d = table
            .descriptor_for("eco_mode", DeviceGeneration::Gen1)
            .unwrap();
        assert_eq!(d.api, "settings");
        assert_eq!(d.parameter_path, "eco_mode_enabled");
        assert_eq!(d.param_type, ParamType::Boolean);
    }

    #[test]
    fn descriptor_synthesis_rpc_carries_component() {
        let table = ParameterMapping::default();
        let d = table
            .descriptor_for("eco_mode", DeviceGeneration::Gen3)
            .unwrap();
        assert_eq!(d.api, "Sys.SetConfig");
        assert_eq!(d.component.as_deref(), Some("device"));
        assert_eq!(d.parameter_path, "eco_mode");
    }

    #[test]
    fn descriptor_synthesis_accepts_legacy_alias() {
        let table = ParameterMapping::default();
        let d = table
            .descriptor_for("eco_mode_enabled", DeviceGeneration::Gen2)
            .unwrap();
        assert_eq!(d.api, "Sys.SetConfig");
    }

    #[test]
    fn gen1_only_entry_has_no_rpc_descriptor() {
        let table = ParameterMapping::default();
        assert!(table
            .descriptor_for("led_power_disable", DeviceGeneration::Gen2)
            .is_none());
        assert!(table
            .descriptor_for("led_power_disable", DeviceGeneration::Gen1)
            .is_some());
    }

    #[test]
    fn default_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameter_mappings.yaml");

        let created = ParameterMapping::load_or_create(&path).unwrap();
        assert!(path.exists());

        let reloaded = ParameterMapping::load_or_create(&path).unwrap();
        assert_eq!(created, reloaded);
    }
}
