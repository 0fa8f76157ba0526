//! Shared configuration for the shellyctl CLI and service.
//!
//! TOML settings file merged with `SHELLY_*` environment variables via
//! figment, plus the canonical on-disk layout: capability definitions and
//! static device knowledge under `config/`, devices and groups under
//! `data/`. Both binaries depend on this crate.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the groups directory.
///
/// Checked at path-resolution time (not only through figment) so test runs
/// can isolate group storage without a settings file.
pub const GROUPS_DIR_ENV: &str = "SHELLY_GROUPS_DIR";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Top-level settings shared by the CLI and the HTTP service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Root for static knowledge and capability cache files.
    pub config_dir: PathBuf,

    /// Root for mutable state (devices, groups).
    pub data_dir: PathBuf,

    pub transport: TransportSettings,
    pub discovery: DiscoverySettings,
    pub executor: ExecutorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            data_dir: PathBuf::from("data"),
            transport: TransportSettings::default(),
            discovery: DiscoverySettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

/// HTTP transport knobs, passed through to `shelly-api`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

/// Discovery strategy configuration. Both strategies are optional and
/// independently switchable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Listen for `_shelly._tcp.local.` announcements.
    pub mdns: bool,

    /// Actively probe `GET /shelly` across the target networks.
    pub http_probe: bool,

    /// CIDR blocks to expand into probe targets (e.g. "192.168.1.0/24").
    pub networks: Vec<String>,

    /// Simultaneous probes per chunk; bounds socket usage on weak networks.
    pub chunk_size: usize,

    /// TCP connect deadline for probes, in seconds.
    pub probe_timeout_secs: u64,

    /// How long the mDNS listener collects announcements per discovery run,
    /// in seconds.
    pub mdns_window_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            mdns: true,
            http_probe: true,
            networks: Vec::new(),
            chunk_size: 16,
            probe_timeout_secs: 1,
            mdns_window_secs: 5,
        }
    }
}

/// Group fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Concurrent per-device operations per group run.
    pub concurrency: usize,

    /// Verbs that require `confirm=true` against the implicit all-devices
    /// group. Writes to `wifi.*` parameters are always treated as
    /// destructive regardless of this list.
    pub destructive_verbs: Vec<String>,

    /// Grace period after issuing a coordinated reboot, in seconds.
    pub reboot_grace_secs: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            concurrency: 16,
            destructive_verbs: vec![
                "off".to_string(),
                "reboot".to_string(),
                "update_firmware".to_string(),
            ],
            reboot_grace_secs: 10,
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────

impl Settings {
    /// Load settings: defaults, then the TOML file (if present), then
    /// `SHELLY_*` environment variables (`__` separates nesting, e.g.
    /// `SHELLY_EXECUTOR__CONCURRENCY=8`).
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        } else {
            figment = figment.merge(Toml::file("shellyctl.toml"));
        }
        let settings: Settings = figment
            .merge(Env::prefixed("SHELLY_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.concurrency == 0 {
            return Err(ConfigError::Validation {
                field: "executor.concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.discovery.chunk_size == 0 {
            return Err(ConfigError::Validation {
                field: "discovery.chunk_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    // ── On-disk layout ───────────────────────────────────────────────

    /// `config/device_capabilities/` -- one YAML file per capability
    /// definition.
    pub fn capabilities_dir(&self) -> PathBuf {
        self.config_dir.join("device_capabilities")
    }

    /// `config/device_types.yaml` -- static generation / feature knowledge.
    pub fn device_types_file(&self) -> PathBuf {
        self.config_dir.join("device_types.yaml")
    }

    /// `config/parameter_mappings.yaml` -- the standard parameter mapping
    /// table.
    pub fn parameter_mappings_file(&self) -> PathBuf {
        self.config_dir.join("parameter_mappings.yaml")
    }

    /// `data/devices/` -- one YAML file per device.
    pub fn devices_dir(&self) -> PathBuf {
        self.data_dir.join("devices")
    }

    /// `data/groups/` -- one YAML file per group. `SHELLY_GROUPS_DIR`
    /// overrides the location.
    pub fn groups_dir(&self) -> PathBuf {
        match std::env::var(GROUPS_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.data_dir.join("groups"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.executor.concurrency, 16);
        assert_eq!(s.discovery.chunk_size, 16);
        assert_eq!(s.transport.timeout_secs, 5);
        assert!(s.executor.destructive_verbs.contains(&"reboot".to_string()));
    }

    #[test]
    fn layout_paths_derive_from_roots() {
        let s = Settings::default();
        assert_eq!(
            s.capabilities_dir(),
            PathBuf::from("config/device_capabilities")
        );
        assert_eq!(s.devices_dir(), PathBuf::from("data/devices"));
        assert_eq!(
            s.parameter_mappings_file(),
            PathBuf::from("config/parameter_mappings.yaml")
        );
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "data_dir = \"/var/lib/shellyctl\"\n[executor]\nconcurrency = 4"
        )
        .unwrap();

        let s = Settings::load(Some(file.path())).unwrap();
        assert_eq!(s.data_dir, PathBuf::from("/var/lib/shellyctl"));
        assert_eq!(s.executor.concurrency, 4);
        // untouched sections keep defaults
        assert_eq!(s.discovery.chunk_size, 16);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nconcurrency = 0").unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }
}
