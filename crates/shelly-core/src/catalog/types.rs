// ── Static device-type knowledge ──
//
// `config/device_types.yaml` records what we know about SKUs independent of
// any live probe: generation, feature flags, and default limits. Discovery
// consults it only for classification hints; it never gates an operation.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoreError;
use crate::model::DeviceGeneration;

/// Knowledge about one SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTypeInfo {
    pub name: String,
    pub generation: DeviceGeneration,
    #[serde(default)]
    pub num_outputs: Option<u32>,
    #[serde(default)]
    pub num_meters: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_power: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// The full static table, keyed by SKU string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTypes {
    #[serde(default)]
    pub types: BTreeMap<String, DeviceTypeInfo>,
}

impl Default for DeviceTypes {
    fn default() -> Self {
        let entry = |name: &str,
                     generation: DeviceGeneration,
                     outputs: u32,
                     meters: u32,
                     max_power: Option<u32>,
                     features: &[&str]| DeviceTypeInfo {
            name: name.to_string(),
            generation,
            num_outputs: Some(outputs),
            num_meters: Some(meters),
            max_power,
            features: features.iter().map(|s| s.to_string()).collect(),
        };

        let mut types = BTreeMap::new();
        types.insert(
            "SHPLG-S".to_string(),
            entry("Shelly Plug S", DeviceGeneration::Gen1, 1, 1, Some(2500), &["relay", "meter"]),
        );
        types.insert(
            "SHSW-1".to_string(),
            entry("Shelly 1", DeviceGeneration::Gen1, 1, 0, None, &["relay"]),
        );
        types.insert(
            "SHSW-PM".to_string(),
            entry("Shelly 1PM", DeviceGeneration::Gen1, 1, 1, Some(3500), &["relay", "meter"]),
        );
        types.insert(
            "SHSW-25".to_string(),
            entry(
                "Shelly 2.5",
                DeviceGeneration::Gen1,
                2,
                2,
                Some(2300),
                &["relay", "roller", "meter"],
            ),
        );
        types.insert(
            "SHDM-2".to_string(),
            entry("Shelly Dimmer 2", DeviceGeneration::Gen1, 1, 1, None, &["light"]),
        );
        types.insert(
            "Plus1".to_string(),
            entry("Shelly Plus 1", DeviceGeneration::Gen2, 1, 0, None, &["switch"]),
        );
        types.insert(
            "Plus1PM".to_string(),
            entry("Shelly Plus 1PM", DeviceGeneration::Gen2, 1, 1, Some(3500), &["switch", "meter"]),
        );
        types.insert(
            "PlusPlugS".to_string(),
            entry("Shelly Plus Plug S", DeviceGeneration::Gen2, 1, 1, Some(2500), &["switch", "meter"]),
        );
        types.insert(
            "SNSW-001X16EU".to_string(),
            entry("Shelly Plus 1 (X16)", DeviceGeneration::Gen2, 1, 0, None, &["switch"]),
        );
        types.insert(
            "Pro4PM".to_string(),
            entry("Shelly Pro 4PM", DeviceGeneration::Gen2, 4, 4, Some(4000), &["switch", "meter"]),
        );
        types.insert(
            "S3SW-001X16EU".to_string(),
            entry("Shelly 1 Gen3", DeviceGeneration::Gen3, 1, 0, None, &["switch"]),
        );
        types.insert(
            "S4SW-001X16EU".to_string(),
            entry("Shelly 1 Gen4", DeviceGeneration::Gen4, 1, 0, None, &["switch"]),
        );

        Self { types }
    }
}

impl DeviceTypes {
    /// Load the table, writing the built-in defaults on first run.
    pub fn load_or_create(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            info!(path = %path.display(), "creating default device types file");
            let table = Self::default();
            table.save(path)?;
            return Ok(table);
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::io(path.display().to_string(), e))?;
        match serde_yaml::from_str(&text) {
            Ok(table) => Ok(table),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid device types file, using defaults");
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

    pub fn get(&self, sku: &str) -> Option<&DeviceTypeInfo> {
        self.types.get(sku)
    }

    /// Generation hint for a SKU string, if the table knows it.
    pub fn generation_of(&self, sku: &str) -> Option<DeviceGeneration> {
        self.get(sku).map(|info| info.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_generations() {
        let table = DeviceTypes::default();
        assert_eq!(table.generation_of("SHPLG-S"), Some(DeviceGeneration::Gen1));
        assert_eq!(table.generation_of("Plus1PM"), Some(DeviceGeneration::Gen2));
        assert_eq!(
            table.generation_of("S3SW-001X16EU"),
            Some(DeviceGeneration::Gen3)
        );
        assert_eq!(
            table.generation_of("S4SW-001X16EU"),
            Some(DeviceGeneration::Gen4)
        );
        assert_eq!(table.generation_of("NOT-A-SKU"), None);
    }

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_types.yaml");
        let created = DeviceTypes::load_or_create(&path).unwrap();
        assert!(path.exists());
        let reloaded = DeviceTypes::load_or_create(&path).unwrap();
        assert_eq!(created, reloaded);
    }
}
