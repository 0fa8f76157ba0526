// ── Device classification ──
//
// Turns an identification payload (`GET /shelly`, or mDNS TXT records)
// into a Device record, or nothing when the responder is not a Shelly.
// Gen1 announces a `type` SKU; Gen2+ announces an `app` name with an
// optional `gen` pin and a `model` SKU whose prefix betrays the family.

use chrono::Utc;
use serde_json::Value;

use crate::catalog::DeviceTypes;
use crate::model::{Device, DeviceGeneration, DiscoveryMethod, MacAddr};

/// Gen1 SKU prefixes (`SHSW-25`, `SHPLG-S`, ...).
const GEN1_PREFIXES: &[&str] = &[
    "SHSW-", "SHPLG-", "SHDM-", "SHRGBW", "SHBLB-", "SHCB-", "SHVIN-", "SHHT-", "SHWT-", "SHDW-",
    "SHEM", "SHIX3-", "SHBTN-", "SHGS-", "SHSM-", "SHTRV-", "SHAIR-", "SHSEN-", "SHSPOT-",
    "SHUNI-", "SH2LED-", "SHCL-",
];

/// Gen2 model prefixes for the Plus/Pro/Mini families.
const GEN2_PREFIXES: &[&str] = &["SNSW", "SNPL", "SNDM", "SNSN", "SNGW", "SPSW", "SPEM", "SPSH", "SPDM", "SPCC"];

/// Classify a `/shelly` identification payload from the authority `ip`.
///
/// Anything that is not recognizably a Shelly is silently discarded --
/// subnet sweeps hit printers and routers all the time.
pub fn classify_http(ip: &str, payload: &Value, types: &DeviceTypes) -> Option<Device> {
    let mac = payload.get("mac").and_then(Value::as_str)?;
    let raw_type = payload.get("type").and_then(Value::as_str).unwrap_or("");
    let raw_app = payload.get("app").and_then(Value::as_str).unwrap_or("");
    let raw_model = payload.get("model").and_then(Value::as_str).unwrap_or("");
    let gen_field = payload.get("gen").and_then(Value::as_u64);

    let (generation, device_type) = classify_identity(
        raw_type,
        raw_app,
        raw_model,
        gen_field,
        types,
    )?;

    let device = Device {
        id: MacAddr::new(mac),
        device_type,
        generation,
        ip_address: Some(ip.to_string()),
        hostname: None,
        firmware_version: payload
            .get("ver")
            .or_else(|| payload.get("fw"))
            .and_then(Value::as_str)
            .map(str::to_string),
        name: payload
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        discovery_method: DiscoveryMethod::HttpProbe,
        last_seen_at: Utc::now(),
        raw_info: payload.clone(),
        raw_type: non_empty(raw_type),
        raw_model: non_empty(raw_model),
        raw_app: non_empty(raw_app),
        auth_enabled: payload
            .get("auth")
            .or_else(|| payload.get("auth_en"))
            .and_then(Value::as_bool),
        fw_id: payload.get("fw_id").and_then(Value::as_str).map(str::to_string),
        eco_mode_enabled: None,
    };
    if device.id.as_str().is_empty() {
        return None;
    }
    Some(device)
}

/// Shared identity classification for HTTP payloads and mDNS TXT records.
///
/// Returns `(generation, device_type)` or `None` for a non-Shelly.
pub fn classify_identity(
    raw_type: &str,
    raw_app: &str,
    raw_model: &str,
    gen_field: Option<u64>,
    types: &DeviceTypes,
) -> Option<(DeviceGeneration, String)> {
    // Gen2+ identification leads with `app`.
    if !raw_app.is_empty() {
        let generation = match gen_field {
            Some(gen) => DeviceGeneration::from_gen_field(gen),
            None => infer_rpc_generation(raw_model, types),
        };
        if !generation.is_rpc() {
            return None;
        }
        return Some((generation, raw_app.to_string()));
    }

    // Gen1 identification leads with `type`.
    if !raw_type.is_empty() && is_gen1_sku(raw_type, types) {
        return Some((DeviceGeneration::Gen1, raw_type.to_string()));
    }

    None
}

fn is_gen1_sku(raw_type: &str, types: &DeviceTypes) -> bool {
    if types.generation_of(raw_type) == Some(DeviceGeneration::Gen1) {
        return true;
    }
    let upper = raw_type.to_uppercase();
    GEN1_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Generation for an RPC-family device when the payload carries no `gen`
/// pin: the model SKU prefix decides, defaulting to gen2 for the Plus/Pro
/// families that predate the `gen` field.
fn infer_rpc_generation(raw_model: &str, types: &DeviceTypes) -> DeviceGeneration {
    if let Some(generation) = types.generation_of(raw_model) {
        return generation;
    }
    let upper = raw_model.to_uppercase();
    if upper.starts_with("S3") {
        DeviceGeneration::Gen3
    } else if upper.starts_with("S4") {
        DeviceGeneration::Gen4
    } else if GEN2_PREFIXES.iter().any(|p| upper.starts_with(p)) {
        DeviceGeneration::Gen2
    } else {
        DeviceGeneration::Gen2
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
