// ── mDNS listener ──
//
// Shelly devices announce `_shelly._tcp.local.` with TXT records carrying
// the same identity fields the `/shelly` endpoint serves. A discovery run
// browses for a bounded window and hands the collected announcements to
// classification.

use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::DeviceTypes;
use crate::error::CoreError;
use crate::model::{Device, DiscoveryMethod, MacAddr};

use super::classify::classify_identity;

const SHELLY_SERVICE: &str = "_shelly._tcp.local.";

/// Browse for Shelly announcements for `window`, or until cancelled.
///
/// Errors starting the daemon (no multicast route, sandboxed test runs)
/// degrade to an empty result with a warning -- mDNS is one of two
/// independent strategies, never a hard requirement.
pub(crate) async fn browse_window(
    window: Duration,
    types: &DeviceTypes,
    cancel: &CancellationToken,
) -> Result<Vec<Device>, CoreError> {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(e) => {
            warn!(error = %e, "mDNS daemon unavailable, skipping mDNS discovery");
            return Ok(Vec::new());
        }
    };
    let receiver = daemon
        .browse(SHELLY_SERVICE)
        .map_err(|e| CoreError::Internal(format!("mDNS browse failed: {e}")))?;

    let mut devices = Vec::new();
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut deadline => break,
            event = receiver.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if let Some(device) = device_from_txt(
                            info.get_addresses().iter().next().copied(),
                            |key| info.get_property_val_str(key).map(str::to_string),
                            types,
                        ) {
                            debug!(mac = %device.id, "mDNS announcement");
                            devices.push(device);
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    if let Err(e) = daemon.shutdown() {
        debug!(error = %e, "mDNS daemon shutdown");
    }
    Ok(devices)
}

/// Build a partial Device from TXT-record fields.
///
/// Shared with tests through the lookup closure; the daemon's `TxtProperty`
/// type never leaves this module.
pub(crate) fn device_from_txt(
    ip: Option<IpAddr>,
    lookup: impl Fn(&str) -> Option<String>,
    types: &DeviceTypes,
) -> Option<Device> {
    let mac = lookup("mac")?;
    let raw_type = lookup("type").unwrap_or_default();
    let raw_app = lookup("app").unwrap_or_default();
    let raw_model = lookup("model").unwrap_or_default();
    let gen_field = lookup("gen").and_then(|g| g.parse().ok());

    let (generation, device_type) =
        classify_identity(&raw_type, &raw_app, &raw_model, gen_field, types)?;

    Some(Device {
        id: MacAddr::new(&mac),
        device_type,
        generation,
        ip_address: ip.map(|addr| addr.to_string()),
        hostname: None,
        firmware_version: lookup("ver").or_else(|| lookup("fw")),
        name: lookup("name").filter(|s| !s.is_empty()),
        discovery_method: DiscoveryMethod::Mdns,
        last_seen_at: Utc::now(),
        raw_info: serde_json::Value::Null,
        raw_type: (!raw_type.is_empty()).then_some(raw_type),
        raw_model: (!raw_model.is_empty()).then_some(raw_model),
        raw_app: (!raw_app.is_empty()).then_some(raw_app),
        auth_enabled: lookup("auth_en").and_then(|v| v.parse().ok()),
        fw_id: lookup("fw_id"),
        eco_mode_enabled: None,
    })
}
