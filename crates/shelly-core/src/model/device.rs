// ── Device identity and record types ──

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── MacAddr ─────────────────────────────────────────────────────────

/// Device identity: the MAC address, normalized to uppercase hex with no
/// separators (`E868E7EA6333`).
///
/// This is the registry key and the identity embedded in persisted
/// filenames. Any common input format (colons, dashes, mixed case) is
/// accepted and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddr(String);

impl MacAddr {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized: String = raw
            .as_ref()
            .chars()
            .filter(|c| *c != ':' && *c != '-' && *c != '.')
            .collect::<String>()
            .to_uppercase();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this looks like a real MAC (12 hex digits). Group members
    /// may reference stale identifiers that no longer match any device;
    /// those still round-trip, they just never resolve.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 12 && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddr {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for MacAddr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ── Generation ──────────────────────────────────────────────────────

/// Hardware/firmware family. Determines which wire dialect applies:
/// Gen1 speaks legacy REST, everything later speaks JSON-RPC over `/rpc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceGeneration {
    Unknown,
    Gen1,
    Gen2,
    Gen3,
    Gen4,
}

impl DeviceGeneration {
    pub fn is_gen1(&self) -> bool {
        matches!(self, Self::Gen1)
    }

    /// True for every RPC-dialect generation.
    pub fn is_rpc(&self) -> bool {
        matches!(self, Self::Gen2 | Self::Gen3 | Self::Gen4)
    }

    /// Map the numeric `gen` field from an identification payload.
    pub fn from_gen_field(gen: u64) -> Self {
        match gen {
            1 => Self::Gen1,
            2 => Self::Gen2,
            3 => Self::Gen3,
            4 => Self::Gen4,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Gen1 => "gen1",
            Self::Gen2 => "gen2",
            Self::Gen3 => "gen3",
            Self::Gen4 => "gen4",
        }
    }
}

impl fmt::Display for DeviceGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Discovery method ────────────────────────────────────────────────

/// How a device entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    Mdns,
    HttpProbe,
    Manual,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mdns => "mdns",
            Self::HttpProbe => "http-probe",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Device ──────────────────────────────────────────────────────────

/// A known Shelly device.
///
/// Created by discovery or manual insert; mutated only by a later
/// discovery observation of the same MAC or by an engine write-back;
/// removed only by explicit delete. A device without an IP address is
/// known but unreachable -- operations against it fail fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: MacAddr,

    /// Vendor SKU string (`SHPLG-S`, `Plus1PM`, `SNSW-001X16EU`).
    pub device_type: String,

    pub generation: DeviceGeneration,

    /// Network authority for HTTP calls (`192.168.1.100`, optionally with
    /// a port). Absent means known-but-unreachable: operations fail fast.
    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub firmware_version: Option<String>,

    /// User-set name, mutable on the device itself.
    #[serde(default)]
    pub name: Option<String>,

    pub discovery_method: DiscoveryMethod,

    pub last_seen_at: DateTime<Utc>,

    /// Free-form snapshot of the identification endpoint response.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw_info: serde_json::Value,

    // Raw identity strings as reported by the device; kept verbatim for
    // capability matching.
    #[serde(default)]
    pub raw_type: Option<String>,
    #[serde(default)]
    pub raw_model: Option<String>,
    #[serde(default)]
    pub raw_app: Option<String>,

    #[serde(default)]
    pub auth_enabled: Option<bool>,

    #[serde(default)]
    pub fw_id: Option<String>,

    /// Convenience mirror of the `eco_mode` parameter, refreshed on
    /// discovery and on successful writes.
    #[serde(default)]
    pub eco_mode_enabled: Option<bool>,
}

impl Device {
    /// Minimal record for a manual insert.
    pub fn manual(id: MacAddr, device_type: String, generation: DeviceGeneration) -> Self {
        Self {
            id,
            device_type,
            generation,
            ip_address: None,
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::Manual,
            last_seen_at: Utc::now(),
            raw_info: serde_json::Value::Null,
            raw_type: None,
            raw_model: None,
            raw_app: None,
            auth_enabled: None,
            fw_id: None,
            eco_mode_enabled: None,
        }
    }

    /// The authority string for HTTP calls, or `None` when unreachable.
    pub fn host(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// File stem used for persistence: `<device_type>_<MAC>`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", sanitize_type(&self.device_type), self.id)
    }
}

/// Device types appear in filenames; anything path-hostile becomes `_`.
fn sanitize_type(device_type: &str) -> String {
    device_type
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ' ' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_normalizes_separators_and_case() {
        assert_eq!(MacAddr::new("e8:68:e7:ea:63:33").as_str(), "E868E7EA6333");
        assert_eq!(MacAddr::new("e8-68-e7-ea-63-33").as_str(), "E868E7EA6333");
        assert_eq!(MacAddr::new("E868E7EA6333").as_str(), "E868E7EA6333");
    }

    #[test]
    fn mac_well_formedness() {
        assert!(MacAddr::new("E868E7EA6333").is_well_formed());
        assert!(!MacAddr::new("not-a-mac").is_well_formed());
        assert!(!MacAddr::new("E868E7").is_well_formed());
    }

    #[test]
    fn generation_from_gen_field() {
        assert_eq!(DeviceGeneration::from_gen_field(2), DeviceGeneration::Gen2);
        assert_eq!(DeviceGeneration::from_gen_field(4), DeviceGeneration::Gen4);
        assert_eq!(
            DeviceGeneration::from_gen_field(9),
            DeviceGeneration::Unknown
        );
    }

    #[test]
    fn generation_serializes_lowercase() {
        let yaml = serde_yaml::to_string(&DeviceGeneration::Gen1).unwrap();
        assert_eq!(yaml.trim(), "gen1");
    }

    #[test]
    fn file_stem_combines_type_and_mac() {
        let device = Device::manual(
            MacAddr::new("e8:68:e7:ea:63:33"),
            "SHPLG-S".into(),
            DeviceGeneration::Gen1,
        );
        assert_eq!(device.file_stem(), "SHPLG-S_E868E7EA6333");
    }

    #[test]
    fn discovery_method_kebab_case() {
        let yaml = serde_yaml::to_string(&DiscoveryMethod::HttpProbe).unwrap();
        assert_eq!(yaml.trim(), "http-probe");
    }
}
