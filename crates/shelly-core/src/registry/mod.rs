// ── Device registry ──
//
// The durable set of known devices, keyed by MAC. Concurrent lookups go
// through a DashMap; record mutation is serialized per device by an async
// mutex that the engine also holds across wire calls (embedded Gen1 HTTP
// servers mishandle concurrent PUT-like GETs). Persistence is YAML, one
// file per device, written atomically via temp-file-then-rename.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{Device, MacAddr};

pub struct DeviceRegistry {
    dir: PathBuf,
    devices: DashMap<String, Arc<Device>>,
    /// Insertion order, for deterministic group dispatch and test replays.
    order: Mutex<Vec<MacAddr>>,
    /// Per-device operation locks, created on first use.
    op_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl DeviceRegistry {
    /// Open a registry over `dir`, creating it if needed. Call
    /// [`load_all`](Self::load_all) to read persisted devices.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(dir.display().to_string(), e))?;
        Ok(Self {
            dir,
            devices: DashMap::new(),
            order: Mutex::new(Vec::new()),
            op_locks: DashMap::new(),
        })
    }

    // ── Loading ──────────────────────────────────────────────────────

    /// Load every `*.yaml` device file, deduplicating by MAC.
    ///
    /// Duplicate files for one MAC are a warning, not an error; the most
    /// recently modified file wins.
    pub fn load_all(&self) -> Result<usize, CoreError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| CoreError::io(self.dir.display().to_string(), e))?;

        // MAC -> (mtime, device), newest file kept.
        let mut newest: std::collections::BTreeMap<String, (std::time::SystemTime, Device)> =
            std::collections::BTreeMap::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let device: Device = match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_yaml::from_str(&text).map_err(|e| e.to_string()))
            {
                Ok(device) => device,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed device file");
                    continue;
                }
            };

            if let Some(file_mac) = mac_from_filename(&path) {
                if file_mac != device.id.as_str() {
                    warn!(
                        path = %path.display(),
                        id = %device.id,
                        "device id does not match the MAC in its filename"
                    );
                }
            }

            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            let key = device.id.as_str().to_string();
            match newest.get(&key) {
                Some((existing_mtime, _)) => {
                    warn!(mac = %key, path = %path.display(), "duplicate device file");
                    if mtime > *existing_mtime {
                        newest.insert(key, (mtime, device));
                    }
                }
                None => {
                    newest.insert(key, (mtime, device));
                }
            }
        }

        let count = newest.len();
        for (_, (_, device)) in newest {
            self.insert_in_memory(Arc::new(device));
        }
        info!(count, dir = %self.dir.display(), "loaded devices");
        Ok(count)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, id: &MacAddr) -> Option<Arc<Device>> {
        self.devices.get(id.as_str()).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &MacAddr) -> bool {
        self.devices.contains_key(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Consistent snapshot in registry insertion order.
    pub fn snapshot(&self) -> Vec<Arc<Device>> {
        let order = self.order.lock().expect("registry order lock poisoned");
        order
            .iter()
            .filter_map(|mac| self.devices.get(mac.as_str()).map(|r| Arc::clone(r.value())))
            .collect()
    }

    /// The per-device operation lock, creating it on first use.
    ///
    /// The engine holds this across the full wire exchange with a device so
    /// a group run and a direct call cannot interleave requests against the
    /// same embedded server.
    pub fn op_lock(&self, id: &MacAddr) -> Arc<tokio::sync::Mutex<()>> {
        self.op_locks
            .entry(id.as_str().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Merge a discovery observation (or manual insert) and persist.
    ///
    /// For an existing record the observation wins on mutable fields (IP,
    /// firmware, name); `last_seen_at` keeps the newer of the two stamps.
    pub fn upsert(&self, incoming: Device) -> Result<Arc<Device>, CoreError> {
        let existing = self.get(&incoming.id);
        let old_stem = existing.as_ref().map(|d| d.file_stem());
        let merged = Arc::new(match existing {
            Some(existing) => merge_observation(&existing, incoming),
            None => incoming,
        });
        self.persist(&merged, old_stem.as_deref())?;
        self.insert_in_memory(Arc::clone(&merged));
        Ok(merged)
    }

    /// Apply an in-place update (engine write-back) and persist.
    pub fn update_with(
        &self,
        id: &MacAddr,
        apply: impl FnOnce(&mut Device),
    ) -> Result<Arc<Device>, CoreError> {
        let current = self.get(id).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: id.to_string(),
        })?;
        let mut updated = (*current).clone();
        apply(&mut updated);
        let old_stem = current.file_stem();
        let updated = Arc::new(updated);
        self.persist(&updated, Some(&old_stem))?;
        self.insert_in_memory(Arc::clone(&updated));
        Ok(updated)
    }

    /// Remove a device and its file. Returns `true` if it existed.
    pub fn delete(&self, id: &MacAddr) -> Result<bool, CoreError> {
        let Some((_, device)) = self.devices.remove(id.as_str()) else {
            return Ok(false);
        };
        self.order
            .lock()
            .expect("registry order lock poisoned")
            .retain(|mac| mac != id);
        let path = self.dir.join(format!("{}.yaml", device.file_stem()));
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| CoreError::io(path.display().to_string(), e))?;
        }
        debug!(mac = %id, "deleted device");
        Ok(true)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn insert_in_memory(&self, device: Arc<Device>) {
        let is_new = !self.devices.contains_key(device.id.as_str());
        if is_new {
            self.order
                .lock()
                .expect("registry order lock poisoned")
                .push(device.id.clone());
        }
        self.devices
            .insert(device.id.as_str().to_string(), device);
    }

    /// Atomic write: temp file in the same directory, then rename. A
    /// device-type change also renames the file, so the stale one goes.
    fn persist(&self, device: &Device, old_stem: Option<&str>) -> Result<(), CoreError> {
        let stem = device.file_stem();
        let path = self.dir.join(format!("{stem}.yaml"));
        let tmp = self.dir.join(format!(".{stem}.yaml.tmp"));

        let text = serde_yaml::to_string(device)
            .map_err(|e| CoreError::yaml(path.display().to_string(), e))?;
        std::fs::write(&tmp, text).map_err(|e| CoreError::io(tmp.display().to_string(), e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CoreError::io(path.display().to_string(), e))?;

        if let Some(old) = old_stem.filter(|old| *old != stem) {
            let stale = self.dir.join(format!("{old}.yaml"));
            if stale.exists() {
                if let Err(e) = std::fs::remove_file(&stale) {
                    warn!(path = %stale.display(), error = %e, "could not remove stale device file");
                }
            }
        }
        debug!(mac = %device.id, path = %path.display(), "saved device");
        Ok(())
    }
}

/// Merge rules for a re-observation of a known MAC: the observation is
/// authoritative for mutable fields at the moment of the query, but never
/// erases knowledge with an absent field, and the newer timestamp wins.
fn merge_observation(existing: &Device, incoming: Device) -> Device {
    let mut merged = incoming;
    if merged.ip_address.is_none() {
        merged.ip_address = existing.ip_address.clone();
    }
    if merged.name.is_none() {
        merged.name = existing.name.clone();
    }
    if merged.hostname.is_none() {
        merged.hostname = existing.hostname.clone();
    }
    if merged.firmware_version.is_none() {
        merged.firmware_version = existing.firmware_version.clone();
    }
    if merged.eco_mode_enabled.is_none() {
        merged.eco_mode_enabled = existing.eco_mode_enabled;
    }
    if merged.raw_info.is_null() {
        merged.raw_info = existing.raw_info.clone();
    }
    if merged.device_type == "unknown" || merged.device_type.is_empty() {
        merged.device_type = existing.device_type.clone();
    }
    merged.last_seen_at = merged.last_seen_at.max(existing.last_seen_at);
    merged
}

fn mac_from_filename(path: &std::path::Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('_').map(|(_, mac)| mac.to_uppercase())
}
