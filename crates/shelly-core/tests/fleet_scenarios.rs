// End-to-end fleet scenarios against wiremock devices: discovery seeding
// the registry, logical writes on both dialects, group fan-out with
// partial failure, and the all-devices safety interlock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shelly_api::TransportConfig;
use shelly_config::DiscoverySettings;
use shelly_core::{
    CapabilityCatalog, CoreError, Device, DeviceGeneration, DeviceRegistry, DiscoveryService,
    ErrorKind, GroupExecutor, GroupManager, GroupRequest, MacAddr, ParameterEngine, SetOptions,
};
use shelly_core::catalog::DeviceTypes;
use shelly_core::groups::{ExecuteOptions, Group, ALL_DEVICES};

// ── Harness ─────────────────────────────────────────────────────────

struct Fleet {
    _tmp: tempfile::TempDir,
    registry: Arc<DeviceRegistry>,
    engine: Arc<ParameterEngine>,
    groups: Arc<GroupManager>,
    devices_dir: std::path::PathBuf,
}

impl Fleet {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let devices_dir = tmp.path().join("data/devices");
        let catalog = Arc::new(
            CapabilityCatalog::load(
                tmp.path().join("config/device_capabilities"),
                tmp.path().join("config/parameter_mappings.yaml"),
            )
            .unwrap(),
        );
        let registry = Arc::new(DeviceRegistry::new(&devices_dir).unwrap());
        let engine = Arc::new(
            ParameterEngine::new(
                &TransportConfig::default(),
                Arc::clone(&catalog),
                Arc::clone(&registry),
                Duration::ZERO,
            )
            .unwrap(),
        );
        let groups = Arc::new(GroupManager::new(tmp.path().join("data/groups")).unwrap());
        Self {
            _tmp: tmp,
            registry,
            engine,
            groups,
            devices_dir,
        }
    }

    fn executor(&self) -> GroupExecutor {
        GroupExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.engine),
            Arc::clone(&self.groups),
            16,
            ["off", "reboot", "update_firmware"]
                .into_iter()
                .map(String::from),
        )
    }

    fn discovery(&self) -> DiscoveryService {
        let settings = DiscoverySettings {
            mdns: false,
            http_probe: false,
            networks: Vec::new(),
            chunk_size: 16,
            probe_timeout_secs: 1,
            mdns_window_secs: 0,
        };
        DiscoveryService::new(
            Arc::clone(&self.registry),
            DeviceTypes::default(),
            settings,
            &TransportConfig::default(),
        )
        .unwrap()
    }

    fn insert_gen1(&self, mac: &str, host: &str) -> Arc<Device> {
        let mut device = Device::manual(
            MacAddr::new(mac),
            "SHPLG-S".into(),
            DeviceGeneration::Gen1,
        );
        device.ip_address = Some(host.to_string());
        self.registry.upsert(device).unwrap()
    }

    fn insert_gen2(&self, mac: &str, host: &str) -> Arc<Device> {
        let mut device =
            Device::manual(MacAddr::new(mac), "Plus1PM".into(), DeviceGeneration::Gen2);
        device.ip_address = Some(host.to_string());
        self.registry.upsert(device).unwrap()
    }
}

fn host_of(server: &MockServer) -> String {
    server.uri().strip_prefix("http://").unwrap().to_string()
}

/// A Gen1 plug answering identification, settings, and toggle.
async fn mock_gen1_plug(mac: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "SHPLG-S",
            "mac": mac,
            "fw": "1.11.0",
            "auth": false,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "kitchen plug",
            "device": { "hostname": format!("shellyplug-s-{}", mac.to_lowercase()) },
            "fw": "1.11.0",
            "eco_mode_enabled": false,
            "max_power": 2500,
            "mqtt": { "enable": false, "server": "" },
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/relay/0"))
        .and(query_param("turn", "toggle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ison": true })))
        .mount(&server)
        .await;

    server
}

// ── Scenario 1: discovery seeds registry ────────────────────────────

#[tokio::test]
async fn discovery_seeds_registry() {
    let fleet = Fleet::new();
    let server = mock_gen1_plug("E868E7EA6333").await;

    let observed = fleet
        .discovery()
        .discover(None, &[host_of(&server)], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(observed.len(), 1);
    let device = fleet.registry.get(&MacAddr::new("E868E7EA6333")).unwrap();
    assert_eq!(device.generation, DeviceGeneration::Gen1);
    assert_eq!(device.device_type, "SHPLG-S");
    assert_eq!(device.firmware_version.as_deref(), Some("1.11.0"));
    // Enrichment filled the user-set name from /settings.
    assert_eq!(device.name.as_deref(), Some("kitchen plug"));

    assert!(fleet
        .devices_dir
        .join("SHPLG-S_E868E7EA6333.yaml")
        .exists());
}

// ── Scenario 2: Gen1 logical write via the mapping table ────────────

#[tokio::test]
async fn gen1_logical_write_uses_legacy_field_name() {
    let fleet = Fleet::new();
    let server = MockServer::start().await;

    // The write: exactly one GET /settings?eco_mode_enabled=true.
    Mock::given(method("GET"))
        .and(path("/settings"))
        .and(query_param("eco_mode_enabled", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eco_mode_enabled": true,
            "max_power": 2500,
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    // The read-back document.
    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eco_mode_enabled": true,
            "max_power": 2500,
        })))
        .with_priority(5)
        .mount(&server)
        .await;

    let device = fleet.insert_gen1("E868E7EA6333", &host_of(&server));
    let cancel = CancellationToken::new();

    // No capability file exists; resolution falls through to the mapping
    // table, which carries the legacy Gen1 field name.
    let result = fleet
        .engine
        .set(&device, "eco_mode", json!(true), SetOptions::default(), &cancel)
        .await;
    assert!(result.success, "set failed: {:?}", result.error_message);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "set must issue exactly one request");

    let read = fleet.engine.get(&device, "eco_mode", &cancel).await;
    assert!(read.success);
    assert_eq!(read.value, Some(json!(true)));

    // The registry record mirrors the write.
    let stored = fleet.registry.get(&device.id).unwrap();
    assert_eq!(stored.eco_mode_enabled, Some(true));
}

#[tokio::test]
async fn gen1_boolean_spelled_on_never_reaches_the_wire() {
    let fleet = Fleet::new();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let device = fleet.insert_gen1("E868E7EA6333", &host_of(&server));
    let result = fleet
        .engine
        .set(
            &device,
            "eco_mode",
            json!("on"),
            SetOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::TypeMismatch));
}

// ── Scenario 3: Gen2 logical write with component nesting ───────────

#[tokio::test]
async fn gen2_logical_write_nests_component_config() {
    let fleet = Fleet::new();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "method": "Sys.SetConfig",
            "params": { "config": { "device": { "eco_mode": true } } },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "result": { "restart_required": false },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let device = fleet.insert_gen2("A1B2C3D4E5F6", &host_of(&server));
    let result = fleet
        .engine
        .set(
            &device,
            "eco_mode",
            json!(true),
            SetOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.success, "set failed: {:?}", result.error_message);

    // The envelope carried a numeric id alongside method and params.
    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["id"].is_u64());
}

#[tokio::test]
async fn gen2_unknown_component_is_device_error() {
    let fleet = Fleet::new();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "error": { "code": -105, "message": "Component not found!" },
        })))
        .mount(&server)
        .await;

    let device = fleet.insert_gen2("A1B2C3D4E5F6", &host_of(&server));
    let result = fleet
        .engine
        .set(
            &device,
            "max_power",
            json!(2000),
            SetOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::DeviceError));
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("Component not found!"));
}

// ── Scenario 4: group fan-out with partial failure ──────────────────

#[tokio::test]
async fn group_fanout_reports_partial_failure_in_input_order() {
    let fleet = Fleet::new();
    let server_a = mock_gen1_plug("AAAAAAAAAAA1").await;
    let server_c = mock_gen1_plug("CCCCCCCCCCC3").await;

    fleet.insert_gen1("AAAAAAAAAAA1", &host_of(&server_a));
    // B: known device, unreachable address (nothing listens on port 9).
    fleet.insert_gen1("BBBBBBBBBBB2", "127.0.0.1:9");
    fleet.insert_gen1("CCCCCCCCCCC3", &host_of(&server_c));

    let mut kitchen = Group::new("kitchen");
    kitchen.add_device(MacAddr::new("AAAAAAAAAAA1"));
    kitchen.add_device(MacAddr::new("BBBBBBBBBBB2"));
    kitchen.add_device(MacAddr::new("CCCCCCCCCCC3"));
    fleet.groups.create(kitchen).unwrap();

    let result = fleet
        .executor()
        .execute(
            "kitchen",
            GroupRequest::Operate {
                verb: "toggle".into(),
                args: BTreeMap::new(),
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.success_count, 2);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.skipped_count, 0);

    let order: Vec<String> = result
        .results
        .iter()
        .map(|r| r.device_id.to_string())
        .collect();
    assert_eq!(order, vec!["AAAAAAAAAAA1", "BBBBBBBBBBB2", "CCCCCCCCCCC3"]);

    assert!(result.results[0].success);
    assert_eq!(result.results[1].error_kind, Some(ErrorKind::Unreachable));
    assert!(result.results[2].success);
}

#[tokio::test]
async fn group_member_missing_from_registry_is_skipped() {
    let fleet = Fleet::new();
    let server = mock_gen1_plug("AAAAAAAAAAA1").await;
    fleet.insert_gen1("AAAAAAAAAAA1", &host_of(&server));

    let mut group = Group::new("hallway");
    group.add_device(MacAddr::new("AAAAAAAAAAA1"));
    group.add_device(MacAddr::new("DDDDDDDDDDD4")); // never discovered
    fleet.groups.create(group).unwrap();

    let result = fleet
        .executor()
        .execute(
            "hallway",
            GroupRequest::Operate {
                verb: "toggle".into(),
                args: BTreeMap::new(),
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 0);
    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.results[1].error_kind, Some(ErrorKind::UnknownDevice));
}

#[tokio::test]
async fn unknown_group_is_a_fleet_error() {
    let fleet = Fleet::new();
    let err = fleet
        .executor()
        .execute(
            "no-such-group",
            GroupRequest::Operate {
                verb: "toggle".into(),
                args: BTreeMap::new(),
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::GroupNotFound { .. }));
}

#[tokio::test]
async fn unknown_verb_is_a_fleet_error() {
    let fleet = Fleet::new();
    let server = mock_gen1_plug("AAAAAAAAAAA1").await;
    fleet.insert_gen1("AAAAAAAAAAA1", &host_of(&server));

    let err = fleet
        .executor()
        .execute(
            ALL_DEVICES,
            GroupRequest::Operate {
                verb: "self_destruct".into(),
                args: BTreeMap::new(),
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

// ── Scenario 5: all-devices safety interlock ────────────────────────

#[tokio::test]
async fn all_devices_destructive_verb_requires_confirmation() {
    let fleet = Fleet::new();
    let server = MockServer::start().await;
    fleet.insert_gen1("E868E7EA6333", &host_of(&server));

    let executor = fleet.executor();

    // Without confirmation: a single fleet error, zero device I/O.
    let err = executor
        .execute(
            ALL_DEVICES,
            GroupRequest::Operate {
                verb: "off".into(),
                args: BTreeMap::new(),
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConfirmationRequired { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());

    // With confirmation the request dispatches to the snapshot.
    Mock::given(method("GET"))
        .and(path("/relay/0"))
        .and(query_param("turn", "off"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ison": false })))
        .expect(1)
        .mount(&server)
        .await;

    let result = executor
        .execute(
            ALL_DEVICES,
            GroupRequest::Operate {
                verb: "off".into(),
                args: BTreeMap::new(),
            },
            ExecuteOptions {
                confirm: true,
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.success_count, 1);
}

#[tokio::test]
async fn wifi_writes_against_all_devices_are_destructive() {
    let fleet = Fleet::new();
    let server = MockServer::start().await;
    fleet.insert_gen1("E868E7EA6333", &host_of(&server));

    let err = fleet
        .executor()
        .execute(
            ALL_DEVICES,
            GroupRequest::SetParameter {
                name: "wifi.sta.ssid".into(),
                value: json!("lab"),
                reboot_if_needed: false,
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConfirmationRequired { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());

    // A non-destructive write to all-devices runs without confirmation.
    fleet
        .executor()
        .execute(
            ALL_DEVICES,
            GroupRequest::GetParameter {
                name: "eco_mode".into(),
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap();
}

// ── Registry round-trip (discover, persist, reload) ─────────────────

#[tokio::test]
async fn persisted_registry_reloads_to_equal_snapshot() {
    let fleet = Fleet::new();
    let server = mock_gen1_plug("E868E7EA6333").await;

    fleet
        .discovery()
        .discover(None, &[host_of(&server)], &CancellationToken::new())
        .await
        .unwrap();

    let before: Vec<_> = fleet.registry.snapshot();

    let reloaded = DeviceRegistry::new(&fleet.devices_dir).unwrap();
    reloaded.load_all().unwrap();
    let after = reloaded.snapshot();

    assert_eq!(before.len(), after.len());
    let (b, a) = (&before[0], &after[0]);
    assert_eq!(b.id, a.id);
    assert_eq!(b.device_type, a.device_type);
    assert_eq!(b.generation, a.generation);
    assert_eq!(b.ip_address, a.ip_address);
    assert_eq!(b.firmware_version, a.firmware_version);
    assert_eq!(b.name, a.name);
}

// ── Bulk apply ──────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_apply_reports_per_parameter_outcomes() {
    let fleet = Fleet::new();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eco_mode_enabled": true,
            "max_power": 2000,
        })))
        .mount(&server)
        .await;

    fleet.insert_gen1("E868E7EA6333", &host_of(&server));
    let mut group = Group::new("plugs");
    group.add_device(MacAddr::new("E868E7EA6333"));
    fleet.groups.create(group).unwrap();

    let mut values = BTreeMap::new();
    values.insert("eco_mode".to_string(), json!(true));
    values.insert("max_power".to_string(), json!(2000));

    let result = fleet
        .executor()
        .execute(
            "plugs",
            GroupRequest::ApplyParameters {
                values,
                reboot_if_needed: false,
            },
            ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.success_count, 1);
    let per_parameter = result.results[0].value.as_ref().unwrap();
    assert_eq!(per_parameter["eco_mode"], json!("ok"));
    assert_eq!(per_parameter["max_power"], json!("ok"));
}
