// Capability discovery against wiremock devices: probe sets, parameter
// harvesting, idempotent re-discovery, and catalogue refresh.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shelly_api::TransportConfig;
use shelly_core::catalog::{CapabilityScanner, ParamType, ParameterMapping};
use shelly_core::{CapabilityCatalog, Device, DeviceGeneration, MacAddr};

fn host_of(server: &MockServer) -> String {
    server.uri().strip_prefix("http://").unwrap().to_string()
}

fn gen1_device(host: &str) -> Device {
    let mut device = Device::manual(
        MacAddr::new("E868E7EA6333"),
        "SHPLG-S".into(),
        DeviceGeneration::Gen1,
    );
    device.ip_address = Some(host.to_string());
    device.raw_type = Some("SHPLG-S".into());
    device
}

fn gen2_device(host: &str) -> Device {
    let mut device = Device::manual(
        MacAddr::new("A1B2C3D4E5F6"),
        "Plus1PM".into(),
        DeviceGeneration::Gen2,
    );
    device.ip_address = Some(host.to_string());
    device.raw_app = Some("Plus1PM".into());
    device
}

/// A Gen1 plug that answers the root documents plus the relay
/// sub-settings; every other probe endpoint 404s.
async fn mock_gen1_surface() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "SHPLG-S", "mac": "E868E7EA6333", "fw": "1.11.0", "auth": false,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "kitchen plug",
            "eco_mode_enabled": false,
            "max_power": 2500,
            "led_power_disable": false,
            "mqtt": { "enable": false, "server": "" },
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "relays": [ { "ison": false } ],
            "uptime": 5120,
            "update": { "has_update": false },
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/settings/relay/0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auto_on": 0.0, "auto_off": 0.0,
        })))
        .mount(&server)
        .await;

    // Everything else (light/roller/actions/...) is absent on a plug.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .with_priority(250)
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn gen1_discovery_harvests_settings_and_marks_status_read_only() {
    let server = mock_gen1_surface().await;
    let scanner = CapabilityScanner::new(&TransportConfig::default()).unwrap();
    let mapping = ParameterMapping::default();

    let definition = scanner
        .discover(
            &gen1_device(&host_of(&server)),
            &mapping,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(definition.device_type, "SHPLG-S");
    assert_eq!(definition.generation, DeviceGeneration::Gen1);
    assert!(definition.type_mappings.contains(&"SHPLG-S".to_string()));

    // Answering endpoints became APIs; 404s did not.
    assert!(definition.has_api("settings"));
    assert!(definition.has_api("status"));
    assert!(definition.has_api("settings/relay/0"));
    assert!(!definition.has_api("settings/light/0"));

    // The legacy field name canonicalized; path keeps the wire name.
    let eco = definition.parameter("eco_mode").unwrap();
    assert_eq!(eco.api, "settings");
    assert_eq!(eco.parameter_path, "eco_mode_enabled");
    assert_eq!(eco.param_type, ParamType::Boolean);
    assert!(!eco.read_only);

    // led_power_disable has no alias and stays as-is.
    assert!(definition.parameter("led_power_disable").is_some());

    // Status-sourced fields are read-only.
    let ison = definition.parameter("relays[0].ison").unwrap();
    assert!(ison.read_only);
    let uptime = definition.parameter("uptime").unwrap();
    assert!(uptime.read_only);
}

#[tokio::test]
async fn gen2_discovery_harvests_components() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "Shelly.GetDeviceInfo" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "result": { "app": "Plus1PM", "gen": 2, "mac": "A1B2C3D4E5F6" },
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "Shelly.GetConfig" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2,
            "result": {
                "sys": { "device": { "eco_mode": false, "name": "plug" } },
                "mqtt": { "enable": false, "server": null },
                "switch:0": { "in_mode": "follow", "power_limit": 2800 },
            },
        })))
        .mount(&server)
        .await;

    // Remaining probe methods answer an RPC error (method not found).
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 0,
            "error": { "code": -114, "message": "Method not found!" },
        })))
        .with_priority(250)
        .mount(&server)
        .await;

    let scanner = CapabilityScanner::new(&TransportConfig::default()).unwrap();
    let definition = scanner
        .discover(
            &gen2_device(&host_of(&server)),
            &ParameterMapping::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(definition.has_api("Shelly.GetDeviceInfo"));
    assert!(definition.has_api("Shelly.GetConfig"));
    assert!(!definition.has_api("Script.List"));

    let eco = definition.parameter("eco_mode").unwrap();
    assert_eq!(eco.api, "Sys.SetConfig");
    assert_eq!(eco.component.as_deref(), Some("device"));
    assert_eq!(eco.parameter_path, "eco_mode");

    let in_mode = definition.parameter("switch:0.in_mode").unwrap();
    assert_eq!(in_mode.api, "Switch.SetConfig");
    assert_eq!(in_mode.component.as_deref(), Some("switch:0"));

    // A literal null leaf is recorded as nullable.
    let mqtt_server = definition.parameter("mqtt.server").unwrap();
    assert_eq!(mqtt_server.param_type, ParamType::Null);
}

#[tokio::test]
async fn rediscovery_is_idempotent_modulo_timestamp() {
    let server = mock_gen1_surface().await;
    let scanner = CapabilityScanner::new(&TransportConfig::default()).unwrap();
    let mapping = ParameterMapping::default();
    let device = gen1_device(&host_of(&server));
    let cancel = CancellationToken::new();

    let mut first = scanner.discover(&device, &mapping, &cancel).await.unwrap();
    let mut second = scanner.discover(&device, &mapping, &cancel).await.unwrap();

    // Byte-identical after normalizing the generation timestamp.
    first.generated_at = None;
    second.generated_at = None;
    assert_eq!(
        serde_yaml::to_string(&first).unwrap(),
        serde_yaml::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn catalog_refresh_replaces_generated_definitions() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = CapabilityCatalog::load(
        tmp.path().join("device_capabilities"),
        tmp.path().join("parameter_mappings.yaml"),
    )
    .unwrap();

    let server = mock_gen1_surface().await;
    let scanner = CapabilityScanner::new(&TransportConfig::default()).unwrap();
    let device = Arc::new(gen1_device(&host_of(&server)));
    let cancel = CancellationToken::new();

    let report = catalog
        .refresh(&scanner, &[Arc::clone(&device)], false, &cancel)
        .await
        .unwrap();
    assert_eq!(report.discovered, vec!["SHPLG-S".to_string()]);
    assert!(catalog.get("SHPLG-S").is_some());
    assert!(catalog.has_parameter("SHPLG-S", "eco_mode"));

    // A second refresh deletes the generated file and rediscovers it.
    let report = catalog
        .refresh(&scanner, &[device], false, &cancel)
        .await
        .unwrap();
    assert_eq!(report.deleted, vec!["SHPLG-S".to_string()]);
    assert_eq!(report.discovered, vec!["SHPLG-S".to_string()]);
    assert!(catalog.get("SHPLG-S").is_some());
}

#[tokio::test]
async fn refresh_preserves_hand_edited_files_unless_forced() {
    let tmp = tempfile::tempdir().unwrap();
    let capabilities_dir = tmp.path().join("device_capabilities");
    std::fs::create_dir_all(&capabilities_dir).unwrap();

    // A hand-written definition: no generated_at marker.
    std::fs::write(
        capabilities_dir.join("SHCUSTOM-1.yaml"),
        "device_type: SHCUSTOM-1\nname: Custom relay\ngeneration: gen1\n",
    )
    .unwrap();

    let catalog = CapabilityCatalog::load(
        &capabilities_dir,
        tmp.path().join("parameter_mappings.yaml"),
    )
    .unwrap();
    let scanner = CapabilityScanner::new(&TransportConfig::default()).unwrap();
    let cancel = CancellationToken::new();

    let report = catalog.refresh(&scanner, &[], false, &cancel).await.unwrap();
    assert_eq!(report.preserved, vec!["SHCUSTOM-1".to_string()]);
    assert!(capabilities_dir.join("SHCUSTOM-1.yaml").exists());

    let report = catalog.refresh(&scanner, &[], true, &cancel).await.unwrap();
    assert_eq!(report.deleted, vec!["SHCUSTOM-1".to_string()]);
    assert!(!capabilities_dir.join("SHCUSTOM-1.yaml").exists());
}
