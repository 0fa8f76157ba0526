// ── Capability catalogue ──
//
// Read-mostly store of per-model capability definitions plus the
// process-wide parameter mapping table. Refresh builds a whole new
// snapshot and swaps it in atomically; readers never see a torn view.

mod definition;
mod mapping;
mod probe;
mod types;

pub use definition::{
    rpc_reader_for, rpc_setter_for, structure_of, ApiDescriptor, CapabilityDefinition, ParamType,
    ParameterDescriptor, ResponseStructure,
};
pub use mapping::{Gen1Access, MappingEntry, ParameterMapping, RpcAccess};
pub use probe::CapabilityScanner;
pub use types::{DeviceTypeInfo, DeviceTypes};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::Device;

// ── Snapshot ────────────────────────────────────────────────────────

/// Immutable view of the catalogue at one point in time.
pub struct CatalogSnapshot {
    /// Primary key: `device_type` -> definition.
    pub definitions: BTreeMap<String, Arc<CapabilityDefinition>>,
    /// Reverse index: lowercased synonym (from `type_mappings`) -> primary
    /// device_type.
    type_index: BTreeMap<String, String>,
    pub mapping: ParameterMapping,
}

impl CatalogSnapshot {
    fn build(
        definitions: BTreeMap<String, Arc<CapabilityDefinition>>,
        mapping: ParameterMapping,
    ) -> Self {
        let mut type_index = BTreeMap::new();
        for (device_type, definition) in &definitions {
            type_index.insert(device_type.to_lowercase(), device_type.clone());
            for synonym in &definition.type_mappings {
                type_index
                    .entry(synonym.to_lowercase())
                    .or_insert_with(|| device_type.clone());
            }
        }
        Self {
            definitions,
            type_index,
            mapping,
        }
    }

    /// Strict lookup, falling back through `type_mappings` synonyms.
    pub fn get(&self, device_type: &str) -> Option<Arc<CapabilityDefinition>> {
        if let Some(def) = self.definitions.get(device_type) {
            return Some(Arc::clone(def));
        }
        let primary = self.type_index.get(&device_type.to_lowercase())?;
        self.definitions.get(primary).map(Arc::clone)
    }

    /// Definition for a device record: its `device_type` (or raw identity
    /// strings), else the generation's base definition, else none.
    pub fn resolve(&self, device: &Device) -> Option<Arc<CapabilityDefinition>> {
        for candidate in [
            Some(device.device_type.as_str()),
            device.raw_type.as_deref(),
            device.raw_app.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        {
            if let Some(def) = self.get(candidate) {
                return Some(def);
            }
        }
        self.get(device.generation.as_str())
    }
}

// ── Catalogue ───────────────────────────────────────────────────────

/// The capability catalogue: definitions directory + mapping table.
///
/// Files are a cache, not the source of truth; the authoritative source is
/// the device itself, and the whole directory is rebuildable by `refresh`.
pub struct CapabilityCatalog {
    dir: PathBuf,
    mapping_file: PathBuf,
    inner: RwLock<Arc<CatalogSnapshot>>,
}

impl CapabilityCatalog {
    /// Load all definitions from `dir` and the mapping table from
    /// `mapping_file`, creating both locations if needed. A malformed
    /// definition file is a warning, never a startup failure.
    pub fn load(dir: impl Into<PathBuf>, mapping_file: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        let mapping_file = mapping_file.into();
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(dir.display().to_string(), e))?;

        let mapping = ParameterMapping::load_or_create(&mapping_file)?;
        let definitions = load_definitions(&dir);
        info!(count = definitions.len(), dir = %dir.display(), "loaded capability definitions");

        Ok(Self {
            dir,
            mapping_file,
            inner: RwLock::new(Arc::new(CatalogSnapshot::build(definitions, mapping))),
        })
    }

    /// Current snapshot (cheap `Arc` clone; never torn).
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.inner.read().expect("catalog lock poisoned"))
    }

    pub fn get(&self, device_type: &str) -> Option<Arc<CapabilityDefinition>> {
        self.snapshot().get(device_type)
    }

    pub fn resolve(&self, device: &Device) -> Option<Arc<CapabilityDefinition>> {
        self.snapshot().resolve(device)
    }

    /// All known device types, sorted.
    pub fn device_types(&self) -> Vec<String> {
        self.snapshot().definitions.keys().cloned().collect()
    }

    // ── Parameter queries ────────────────────────────────────────────

    pub fn has_parameter(&self, device_type: &str, name: &str) -> bool {
        self.parameter_details(device_type, name).is_some()
    }

    /// Descriptor for a logical name on a device type. Gen1 definitions
    /// are also consulted under the legacy field name.
    pub fn parameter_details(&self, device_type: &str, name: &str) -> Option<ParameterDescriptor> {
        let snapshot = self.snapshot();
        let definition = snapshot.get(device_type)?;
        if let Some(descriptor) = definition.parameter(name) {
            return Some(descriptor.clone());
        }
        if definition.generation.is_gen1() {
            let gen1_name = snapshot.mapping.gen1_name(name);
            if gen1_name != name {
                if let Some(descriptor) = definition.parameter(gen1_name) {
                    return Some(descriptor.clone());
                }
            }
        }
        // Canonical alias: a definition keyed by the legacy name.
        let canonical = snapshot.mapping.canonicalize(name);
        if canonical != name {
            if let Some(descriptor) = definition.parameter(canonical) {
                return Some(descriptor.clone());
            }
        }
        None
    }

    /// Device types that support a logical name, via their definition or
    /// the mapping table.
    pub fn devices_supporting(&self, name: &str) -> Vec<String> {
        let snapshot = self.snapshot();
        let mapping_entry = snapshot.mapping.entry(name);
        let mut out: Vec<String> = snapshot
            .definitions
            .values()
            .filter(|def| {
                def.parameter(name).is_some()
                    || def
                        .parameter(snapshot.mapping.canonicalize(name))
                        .is_some()
                    || def.parameter(snapshot.mapping.gen1_name(name)).is_some()
                    || mapping_entry.is_some_and(|e| {
                        (def.generation.is_gen1() && e.gen1.is_some())
                            || (def.generation.is_rpc() && e.rpc.is_some())
                    })
            })
            .map(|def| def.device_type.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Persist a definition and fold it into the live snapshot.
    pub fn upsert(&self, definition: CapabilityDefinition) -> Result<(), CoreError> {
        self.write_definition(&definition)?;
        let mut guard = self.inner.write().expect("catalog lock poisoned");
        let mut definitions = guard.definitions.clone();
        definitions.insert(definition.device_type.clone(), Arc::new(definition));
        *guard = Arc::new(CatalogSnapshot::build(definitions, guard.mapping.clone()));
        Ok(())
    }

    /// Re-read everything from disk and swap the snapshot.
    pub fn reload(&self) -> Result<(), CoreError> {
        let mapping = ParameterMapping::load_or_create(&self.mapping_file)?;
        let definitions = load_definitions(&self.dir);
        let mut guard = self.inner.write().expect("catalog lock poisoned");
        *guard = Arc::new(CatalogSnapshot::build(definitions, mapping));
        Ok(())
    }

    /// Delete cached definitions and repopulate by probing one
    /// representative device per type.
    ///
    /// Without `force` only generated files (those carrying
    /// `generated_at`) are deleted; hand-edited files are preserved.
    /// A failed probe is reported but leaves the existing definition
    /// alone.
    pub async fn refresh(
        &self,
        scanner: &CapabilityScanner,
        representatives: &[Arc<Device>],
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, CoreError> {
        let mut report = RefreshReport::default();

        // Delete phase.
        let snapshot = self.snapshot();
        for (device_type, definition) in &snapshot.definitions {
            if definition.generated_at.is_none() && !force {
                debug!(%device_type, "preserving hand-edited capability file");
                report.preserved.push(device_type.clone());
                continue;
            }
            let path = self.definition_path(device_type);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| CoreError::io(path.display().to_string(), e))?;
                report.deleted.push(device_type.clone());
            }
        }
        self.reload()?;

        // Repopulate phase: first device of each type stands for the type.
        let mut seen = std::collections::BTreeSet::new();
        for device in representatives {
            if !seen.insert(device.device_type.clone()) {
                continue;
            }
            let mapping = self.snapshot().mapping.clone();
            match scanner.discover(device, &mapping, cancel).await {
                Ok(definition) => {
                    let device_type = definition.device_type.clone();
                    self.upsert(definition)?;
                    report.discovered.push(device_type);
                }
                Err(e) => {
                    warn!(device = %device.id, error = %e, "capability refresh failed for device");
                    report
                        .failed
                        .push((device.device_type.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Apply the Gen1-to-canonical renames across the catalogue.
    ///
    /// With `dry_run` the diff is only reported; otherwise renamed
    /// definitions are written back.
    pub fn standardize(&self, dry_run: bool) -> Result<StandardizeReport, CoreError> {
        let snapshot = self.snapshot();
        let mut report = StandardizeReport { dry_run, renames: Vec::new() };

        for (device_type, definition) in &snapshot.definitions {
            let mut updated = (**definition).clone();
            let mut changed = false;
            for (legacy, canonical) in &snapshot.mapping.legacy_names {
                if let Some(descriptor) = updated.parameters.remove(legacy) {
                    report.renames.push(ParameterRename {
                        device_type: device_type.clone(),
                        from: legacy.clone(),
                        to: canonical.clone(),
                    });
                    // An existing canonical entry wins over the legacy one.
                    updated
                        .parameters
                        .entry(canonical.clone())
                        .or_insert(descriptor);
                    changed = true;
                }
            }
            if changed && !dry_run {
                self.upsert(updated)?;
            }
        }

        Ok(report)
    }

    // ── Files ────────────────────────────────────────────────────────

    fn definition_path(&self, device_type: &str) -> PathBuf {
        let safe: String = device_type
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == ' ' { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}.yaml"))
    }

    fn write_definition(&self, definition: &CapabilityDefinition) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| CoreError::io(self.dir.display().to_string(), e))?;
        let path = self.definition_path(&definition.device_type);
        let text = serde_yaml::to_string(definition)
            .map_err(|e| CoreError::yaml(path.display().to_string(), e))?;
        std::fs::write(&path, text).map_err(|e| CoreError::io(path.display().to_string(), e))?;
        debug!(device_type = %definition.device_type, path = %path.display(), "saved capability definition");
        Ok(())
    }
}

fn load_definitions(dir: &Path) -> BTreeMap<String, Arc<CapabilityDefinition>> {
    let mut definitions = BTreeMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read capabilities directory");
            return definitions;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_yaml::from_str::<CapabilityDefinition>(&text).map_err(|e| e.to_string()))
        {
            Ok(definition) => {
                for (parameter, api) in definition.undeclared_apis() {
                    warn!(
                        device_type = %definition.device_type,
                        parameter, api,
                        "parameter references an API the definition does not declare"
                    );
                }
                definitions.insert(definition.device_type.clone(), Arc::new(definition));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed capability file");
            }
        }
    }
    definitions
}

// ── Reports ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RefreshReport {
    pub deleted: Vec<String>,
    pub preserved: Vec<String>,
    pub discovered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ParameterRename {
    pub device_type: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StandardizeReport {
    pub dry_run: bool,
    pub renames: Vec<ParameterRename>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceGeneration, MacAddr};

    fn catalog_in(dir: &Path) -> CapabilityCatalog {
        CapabilityCatalog::load(dir.join("device_capabilities"), dir.join("parameter_mappings.yaml"))
            .unwrap()
    }

    fn plug_definition() -> CapabilityDefinition {
        let mut def = CapabilityDefinition::new("SHPLG-S", "Shelly Plug S", DeviceGeneration::Gen1);
        def.type_mappings = vec!["SHPLG-S".into(), "shellyplug-s".into()];
        def.parameters.insert(
            "eco_mode".into(),
            ParameterDescriptor::new(ParamType::Boolean, "settings", "eco_mode_enabled"),
        );
        def
    }

    #[test]
    fn get_falls_back_through_synonyms() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path());
        catalog.upsert(plug_definition()).unwrap();

        assert!(catalog.get("SHPLG-S").is_some());
        assert!(catalog.get("shellyplug-s").is_some());
        assert!(catalog.get("SHELLYPLUG-S").is_some());
        assert!(catalog.get("Plus1PM").is_none());
    }

    #[test]
    fn resolve_prefers_device_type_then_generation_base() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path());
        catalog.upsert(plug_definition()).unwrap();

        let mut base = CapabilityDefinition::new("gen1", "Gen1 base", DeviceGeneration::Gen1);
        base.parameters.insert(
            "eco_mode".into(),
            ParameterDescriptor::new(ParamType::Boolean, "settings", "eco_mode_enabled"),
        );
        catalog.upsert(base).unwrap();

        let mut device = Device::manual(
            MacAddr::new("E868E7EA6333"),
            "SHPLG-S".into(),
            DeviceGeneration::Gen1,
        );
        assert_eq!(catalog.resolve(&device).unwrap().device_type, "SHPLG-S");

        device.device_type = "SHSW-UNSEEN".into();
        assert_eq!(catalog.resolve(&device).unwrap().device_type, "gen1");
    }

    #[test]
    fn parameter_details_accepts_legacy_name_on_gen1() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path());

        // Definition that still uses the legacy field name as the key.
        let mut def = plug_definition();
        let descriptor = def.parameters.remove("eco_mode").unwrap();
        def.parameters.insert("eco_mode_enabled".into(), descriptor);
        catalog.upsert(def).unwrap();

        assert!(catalog.has_parameter("SHPLG-S", "eco_mode"));
        assert!(catalog.has_parameter("SHPLG-S", "eco_mode_enabled"));
    }

    #[test]
    fn devices_supporting_consults_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path());
        catalog.upsert(plug_definition()).unwrap();

        let mut bare = CapabilityDefinition::new("Plus1PM", "Shelly Plus 1PM", DeviceGeneration::Gen2);
        bare.type_mappings = vec!["Plus1PM".into()];
        catalog.upsert(bare).unwrap();

        // Plus1PM has no eco_mode in its definition, but the mapping table
        // carries an RPC branch, so it still counts as supporting.
        let supporting = catalog.devices_supporting("eco_mode");
        assert!(supporting.contains(&"SHPLG-S".to_string()));
        assert!(supporting.contains(&"Plus1PM".to_string()));
    }

    #[test]
    fn standardize_renames_legacy_keys() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path());

        let mut def = plug_definition();
        let descriptor = def.parameters.remove("eco_mode").unwrap();
        def.parameters.insert("eco_mode_enabled".into(), descriptor);
        catalog.upsert(def).unwrap();

        let dry = catalog.standardize(true).unwrap();
        assert_eq!(dry.renames.len(), 1);
        // dry run leaves the definition untouched
        assert!(catalog
            .get("SHPLG-S")
            .unwrap()
            .parameter("eco_mode_enabled")
            .is_some());

        let applied = catalog.standardize(false).unwrap();
        assert_eq!(applied.renames.len(), 1);
        let def = catalog.get("SHPLG-S").unwrap();
        assert!(def.parameter("eco_mode").is_some());
        assert!(def.parameter("eco_mode_enabled").is_none());
    }

    #[test]
    fn reload_picks_up_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path());
        catalog.upsert(plug_definition()).unwrap();

        // Second catalogue instance over the same directory sees the file.
        let other = catalog_in(dir.path());
        assert!(other.get("SHPLG-S").is_some());
    }
}
