// ── Discovery engine ──
//
// Two concurrent strategies, both optional: an mDNS browse window and an
// active HTTP sweep that probes `GET /shelly` across target IPs in bounded
// chunks. Classified devices are emitted to a single channel that the
// registry consumes, so partial results survive cancellation.

mod classify;
mod mdns;

pub use classify::{classify_http, classify_identity};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shelly_api::{Gen1Client, RpcClient, TransportConfig};
use shelly_config::DiscoverySettings;

use crate::catalog::DeviceTypes;
use crate::error::CoreError;
use crate::model::{Device, DiscoveryMethod};
use crate::registry::DeviceRegistry;

pub struct DiscoveryService {
    registry: Arc<DeviceRegistry>,
    types: DeviceTypes,
    settings: DiscoverySettings,
    /// Probe client: short connect deadline, no retry.
    probe: Gen1Client,
    gen1: Gen1Client,
    rpc: RpcClient,
}

impl DiscoveryService {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        types: DeviceTypes,
        settings: DiscoverySettings,
        transport: &TransportConfig,
    ) -> Result<Self, CoreError> {
        let probe_transport = TransportConfig {
            connect_timeout: Duration::from_secs(settings.probe_timeout_secs.max(1)),
            timeout: Duration::from_secs(settings.probe_timeout_secs.max(1) + 2),
            ..transport.clone()
        };
        Ok(Self {
            registry,
            types,
            settings,
            probe: Gen1Client::new(&probe_transport)
                .map_err(|e| CoreError::Internal(e.to_string()))?,
            gen1: Gen1Client::new(transport).map_err(|e| CoreError::Internal(e.to_string()))?,
            rpc: RpcClient::new(transport).map_err(|e| CoreError::Internal(e.to_string()))?,
        })
    }

    /// Run one discovery pass and return the devices observed.
    ///
    /// `networks` overrides the configured CIDR blocks; `explicit_ips`
    /// (authority strings, port allowed) are probed regardless of strategy
    /// switches. Cancellation stops outstanding probes; everything already
    /// emitted stays in the registry.
    pub async fn discover(
        &self,
        networks: Option<&[String]>,
        explicit_ips: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Device>>, CoreError> {
        // mDNS pass first: its partial records merge under HTTP results.
        let mut mdns_partials: HashMap<String, Device> = HashMap::new();
        if self.settings.mdns && !cancel.is_cancelled() {
            let window = Duration::from_secs(self.settings.mdns_window_secs);
            for device in mdns::browse_window(window, &self.types, cancel).await? {
                mdns_partials.insert(device.id.as_str().to_string(), device);
            }
            info!(count = mdns_partials.len(), "mDNS discovery window closed");
        }

        // The single out-channel the registry consumes.
        let (tx, mut rx) = mpsc::channel::<Device>(32);
        let registry = Arc::clone(&self.registry);
        let consumer = tokio::spawn(async move {
            let mut observed = Vec::new();
            while let Some(device) = rx.recv().await {
                match registry.upsert(device) {
                    Ok(stored) => observed.push(stored),
                    Err(e) => warn!(error = %e, "failed to store discovered device"),
                }
            }
            observed
        });

        if self.settings.http_probe || !explicit_ips.is_empty() {
            let targets = self.probe_targets(networks, explicit_ips)?;
            info!(total = targets.len(), chunk = self.settings.chunk_size, "probing targets");
            self.probe_in_chunks(&targets, &mut mdns_partials, &tx, cancel)
                .await;
        }

        // mDNS-only devices: nothing merged them away, emit as-is.
        for (_, device) in mdns_partials.drain() {
            let enriched = self.enrich(device, cancel).await;
            let _ = tx.send(enriched).await;
        }

        drop(tx);
        let observed = consumer
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        info!(count = observed.len(), "discovery pass complete");
        Ok(observed)
    }

    /// Re-probe every registry device that has an address, refreshing
    /// mutable fields.
    pub async fn refresh_known(&self, cancel: &CancellationToken) -> Vec<Arc<Device>> {
        let mut refreshed = Vec::new();
        for device in self.registry.snapshot() {
            if cancel.is_cancelled() {
                break;
            }
            let Some(ip) = device.ip_address.clone() else {
                continue;
            };
            match self.probe_one(&ip, cancel).await {
                Some(observed) => match self.registry.upsert(observed) {
                    Ok(stored) => refreshed.push(stored),
                    Err(e) => warn!(device = %device.id, error = %e, "refresh store failed"),
                },
                None => debug!(device = %device.id, %ip, "device did not answer refresh probe"),
            }
        }
        refreshed
    }

    // ── Probing ──────────────────────────────────────────────────────

    fn probe_targets(
        &self,
        networks: Option<&[String]>,
        explicit_ips: &[String],
    ) -> Result<Vec<String>, CoreError> {
        let mut targets: Vec<String> = explicit_ips.to_vec();
        let blocks = networks.unwrap_or(&self.settings.networks);
        for block in blocks {
            let net: IpNet = block.parse().map_err(|_| CoreError::Validation {
                field: "network".into(),
                reason: format!("'{block}' is not a valid CIDR block"),
            })?;
            targets.extend(net.hosts().map(|ip| ip.to_string()));
        }
        targets.dedup();
        Ok(targets)
    }

    /// Probe in chunks of `chunk_size` simultaneous IPs; each chunk
    /// completes before the next starts, bounding socket usage.
    async fn probe_in_chunks(
        &self,
        targets: &[String],
        mdns_partials: &mut HashMap<String, Device>,
        tx: &mpsc::Sender<Device>,
        cancel: &CancellationToken,
    ) {
        for chunk in targets.chunks(self.settings.chunk_size.max(1)) {
            if cancel.is_cancelled() {
                debug!("discovery cancelled between chunks");
                return;
            }
            let probes = chunk.iter().map(|ip| self.probe_one(ip, cancel));
            for observed in futures::future::join_all(probes).await.into_iter().flatten() {
                let merged = match mdns_partials.remove(observed.id.as_str()) {
                    Some(partial) => merge_strategies(observed, &partial),
                    None => observed,
                };
                let enriched = self.enrich(merged, cancel).await;
                if tx.send(enriched).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn probe_one(&self, ip: &str, cancel: &CancellationToken) -> Option<Device> {
        let payload = self.probe.probe_identify(ip, cancel).await.ok()?;
        let device = classify_http(ip, &payload, &self.types);
        if let Some(device) = &device {
            info!(mac = %device.id, %ip, generation = %device.generation, "discovered device");
        }
        device
    }

    // ── Enrichment ───────────────────────────────────────────────────

    /// One-shot follow-up fetch filling fields identification lacks:
    /// hostname, user-set name, firmware, eco-mode state. Failures leave
    /// the record as classified.
    async fn enrich(&self, mut device: Device, cancel: &CancellationToken) -> Device {
        let Some(host) = device.host().map(str::to_string) else {
            return device;
        };
        if device.generation.is_gen1() {
            match self.gen1.get(&host, "settings", &[], cancel).await {
                Ok(settings) => {
                    if let Some(name) = settings.get("name").and_then(|v| v.as_str()) {
                        if !name.is_empty() {
                            device.name = Some(name.to_string());
                        }
                    }
                    if let Some(hostname) = settings
                        .pointer("/device/hostname")
                        .and_then(|v| v.as_str())
                    {
                        device.hostname = Some(hostname.to_string());
                    }
                    if let Some(fw) = settings.pointer("/fw").and_then(|v| v.as_str()) {
                        device.firmware_version = Some(fw.to_string());
                    }
                    device.eco_mode_enabled = settings
                        .get("eco_mode_enabled")
                        .and_then(|v| v.as_bool())
                        .or(device.eco_mode_enabled);
                }
                Err(e) => debug!(mac = %device.id, error = %e, "Gen1 enrich failed"),
            }
        } else {
            match self
                .rpc
                .call(&host, "Shelly.GetConfig", json!({}), cancel)
                .await
            {
                Ok(config) => {
                    if let Some(name) = config.pointer("/sys/device/name").and_then(|v| v.as_str())
                    {
                        device.name = Some(name.to_string());
                        device.hostname = Some(name.to_string());
                    }
                    device.eco_mode_enabled = config
                        .pointer("/sys/device/eco_mode")
                        .and_then(|v| v.as_bool())
                        .or(device.eco_mode_enabled);
                }
                Err(e) => debug!(mac = %device.id, error = %e, "RPC enrich failed"),
            }
        }
        device
    }
}

/// Merge the two strategies' views of one MAC: the HTTP probe wins the
/// mutable fields because it is authoritative at the moment of the query;
/// the mDNS timestamp is kept when newer.
fn merge_strategies(http: Device, mdns: &Device) -> Device {
    let mut merged = http;
    if merged.name.is_none() {
        merged.name = mdns.name.clone();
    }
    if merged.firmware_version.is_none() {
        merged.firmware_version = mdns.firmware_version.clone();
    }
    merged.last_seen_at = merged.last_seen_at.max(mdns.last_seen_at);
    merged.discovery_method = DiscoveryMethod::HttpProbe;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceGeneration, MacAddr};
    use chrono::Utc;

    fn partial(method: DiscoveryMethod) -> Device {
        let mut d = Device::manual(
            MacAddr::new("E868E7EA6333"),
            "SHPLG-S".into(),
            DeviceGeneration::Gen1,
        );
        d.discovery_method = method;
        d
    }

    #[test]
    fn http_wins_mutable_fields_mdns_timestamp_kept_when_newer() {
        let mut http = partial(DiscoveryMethod::HttpProbe);
        http.firmware_version = Some("1.11.7".into());
        http.last_seen_at = Utc::now() - chrono::Duration::seconds(60);

        let mut mdns = partial(DiscoveryMethod::Mdns);
        mdns.firmware_version = Some("1.10.0".into());
        mdns.name = Some("kitchen".into());
        mdns.last_seen_at = Utc::now();

        let merged = merge_strategies(http, &mdns);
        assert_eq!(merged.firmware_version.as_deref(), Some("1.11.7"));
        assert_eq!(merged.name.as_deref(), Some("kitchen"));
        assert_eq!(merged.last_seen_at, mdns.last_seen_at);
        assert_eq!(merged.discovery_method, DiscoveryMethod::HttpProbe);
    }
}
