// ── Device groups ──
//
// Fully user-managed named sets of device MACs, one YAML file per group.
// A member referenced but absent from the registry is retained: groups
// don't lose devices just because discovery missed them. The name
// `all-devices` is reserved for the dynamic all-registry set and never
// persisted.

mod executor;

pub use executor::{ExecuteOptions, GroupExecutor, GroupRequest};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::MacAddr;

/// The implicit group resolving to the registry snapshot at call time.
pub const ALL_DEVICES: &str = "all-devices";

// ── Group ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered set of member MACs; insertion order is dispatch order.
    #[serde(default)]
    pub device_ids: Vec<MacAddr>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Optional configuration overlay applied when operating on the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            device_ids: Vec::new(),
            tags: Vec::new(),
            config: None,
        }
    }

    /// Add a member; returns `false` if it was already present.
    pub fn add_device(&mut self, id: MacAddr) -> bool {
        if self.device_ids.contains(&id) {
            return false;
        }
        self.device_ids.push(id);
        true
    }

    /// Remove a member; returns `false` if it was not present.
    pub fn remove_device(&mut self, id: &MacAddr) -> bool {
        let before = self.device_ids.len();
        self.device_ids.retain(|m| m != id);
        self.device_ids.len() != before
    }

    pub fn has_device(&self, id: &MacAddr) -> bool {
        self.device_ids.contains(id)
    }
}

/// Group names become filenames; anything path-hostile is replaced by `_`.
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Manager ─────────────────────────────────────────────────────────

/// Loads, persists, and mutates groups under one directory
/// (`data/groups/`, overridable with `SHELLY_GROUPS_DIR`).
pub struct GroupManager {
    dir: PathBuf,
    groups: RwLock<BTreeMap<String, Arc<Group>>>,
}

impl GroupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(dir.display().to_string(), e))?;
        let manager = Self {
            dir,
            groups: RwLock::new(BTreeMap::new()),
        };
        manager.load_all()?;
        Ok(manager)
    }

    fn load_all(&self) -> Result<(), CoreError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| CoreError::io(self.dir.display().to_string(), e))?;
        let mut loaded = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_yaml::from_str::<Group>(&text).map_err(|e| e.to_string()))
            {
                Ok(group) => {
                    loaded.insert(group.name.clone(), Arc::new(group));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed group file"),
            }
        }
        info!(count = loaded.len(), dir = %self.dir.display(), "loaded groups");
        *self.groups.write().expect("groups lock poisoned") = loaded;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .read()
            .expect("groups lock poisoned")
            .get(name)
            .map(Arc::clone)
    }

    pub fn list(&self) -> Vec<Arc<Group>> {
        self.groups
            .read()
            .expect("groups lock poisoned")
            .values()
            .map(Arc::clone)
            .collect()
    }

    /// Groups containing a given device.
    pub fn groups_for_device(&self, id: &MacAddr) -> Vec<Arc<Group>> {
        self.list()
            .into_iter()
            .filter(|g| g.has_device(id))
            .collect()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    pub fn create(&self, group: Group) -> Result<Arc<Group>, CoreError> {
        if group.name == ALL_DEVICES {
            return Err(CoreError::ReservedGroupName { name: group.name });
        }
        if self.get(&group.name).is_some() {
            return Err(CoreError::GroupExists { name: group.name });
        }
        let group = Arc::new(group);
        self.persist(&group)?;
        self.groups
            .write()
            .expect("groups lock poisoned")
            .insert(group.name.clone(), Arc::clone(&group));
        info!(group = %group.name, members = group.device_ids.len(), "created group");
        Ok(group)
    }

    /// Replace an existing group's contents. Renames go through
    /// [`rename`](Self::rename) so exactly one file remains on disk.
    pub fn update(&self, group: Group) -> Result<Arc<Group>, CoreError> {
        if self.get(&group.name).is_none() {
            return Err(CoreError::GroupNotFound { name: group.name });
        }
        let group = Arc::new(group);
        self.persist(&group)?;
        self.groups
            .write()
            .expect("groups lock poisoned")
            .insert(group.name.clone(), Arc::clone(&group));
        Ok(group)
    }

    pub fn rename(&self, old: &str, new: impl Into<String>) -> Result<Arc<Group>, CoreError> {
        let new = new.into();
        if new == ALL_DEVICES {
            return Err(CoreError::ReservedGroupName { name: new });
        }
        if self.get(&new).is_some() {
            return Err(CoreError::GroupExists { name: new });
        }
        let existing = self
            .get(old)
            .ok_or_else(|| CoreError::GroupNotFound { name: old.into() })?;

        let mut renamed = (*existing).clone();
        renamed.name = new;
        let renamed = Arc::new(renamed);
        self.persist(&renamed)?;

        let old_path = self.group_path(old);
        if old_path.exists() {
            std::fs::remove_file(&old_path)
                .map_err(|e| CoreError::io(old_path.display().to_string(), e))?;
        }
        let mut guard = self.groups.write().expect("groups lock poisoned");
        guard.remove(old);
        guard.insert(renamed.name.clone(), Arc::clone(&renamed));
        Ok(renamed)
    }

    pub fn delete(&self, name: &str) -> Result<bool, CoreError> {
        let removed = self
            .groups
            .write()
            .expect("groups lock poisoned")
            .remove(name)
            .is_some();
        if removed {
            let path = self.group_path(name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| CoreError::io(path.display().to_string(), e))?;
            }
            info!(group = %name, "deleted group");
        }
        Ok(removed)
    }

    pub fn add_device(&self, name: &str, id: MacAddr) -> Result<Arc<Group>, CoreError> {
        let group = self
            .get(name)
            .ok_or_else(|| CoreError::GroupNotFound { name: name.into() })?;
        let mut updated = (*group).clone();
        if !updated.add_device(id.clone()) {
            debug!(group = %name, device = %id, "device already in group");
            return Ok(group);
        }
        self.update(updated)
    }

    pub fn remove_device(&self, name: &str, id: &MacAddr) -> Result<bool, CoreError> {
        let group = self
            .get(name)
            .ok_or_else(|| CoreError::GroupNotFound { name: name.into() })?;
        let mut updated = (*group).clone();
        if !updated.remove_device(id) {
            return Ok(false);
        }
        self.update(updated)?;
        Ok(true)
    }

    // ── Files ────────────────────────────────────────────────────────

    fn group_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", safe_file_name(name)))
    }

    fn persist(&self, group: &Group) -> Result<(), CoreError> {
        let path = self.group_path(&group.name);
        let text = serde_yaml::to_string(group)
            .map_err(|e| CoreError::yaml(path.display().to_string(), e))?;
        std::fs::write(&path, text).map_err(|e| CoreError::io(path.display().to_string(), e))?;
        debug!(group = %group.name, path = %path.display(), "saved group");
        Ok(())
    }
}
