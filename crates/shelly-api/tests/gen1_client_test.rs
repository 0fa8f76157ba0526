// Integration tests for `Gen1Client` using wiremock.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shelly_api::{Error, Gen1Client, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Gen1Client, String) {
    let server = MockServer::start().await;
    let host = server
        .uri()
        .strip_prefix("http://")
        .expect("wiremock serves plain http")
        .to_string();
    let client = Gen1Client::new(&TransportConfig {
        timeout: Duration::from_secs(2),
        ..TransportConfig::default()
    })
    .unwrap();
    (server, client, host)
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn get_settings_returns_payload() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device": { "hostname": "shellyplug-s-6333" },
            "eco_mode_enabled": true,
            "max_power": 2500,
        })))
        .mount(&server)
        .await;

    let value = client
        .get(&host, "settings", &[], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(value["eco_mode_enabled"], json!(true));
    assert_eq!(value["device"]["hostname"], json!("shellyplug-s-6333"));
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn write_is_get_with_query_parameters() {
    let (server, client, host) = setup().await;

    // The vendor convention: writes are GETs, booleans are literal
    // lowercase true/false in the query string.
    Mock::given(method("GET"))
        .and(path("/settings"))
        .and(query_param("eco_mode_enabled", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eco_mode_enabled": true,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = vec![("eco_mode_enabled".to_string(), "true".to_string())];
    let value = client
        .get(&host, "settings", &query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(value["eco_mode_enabled"], json!(true));
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn non_200_is_http_error_with_body() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/settings/roller/0"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let err = client
        .get(&host, "settings/roller/0", &[], &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::Http { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "Not Found");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn four_xx_is_not_retried() {
    let (server, client, host) = setup().await;

    // expect(1) fails the test if a retry fires a second request.
    Mock::given(method("GET"))
        .and(path("/reboot"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .get(&host, "reboot", &[], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn connect_refused_is_transient() {
    let client = Gen1Client::new(&TransportConfig::default()).unwrap();

    // Port 9 on localhost: nothing listens there.
    let err = client
        .get("127.0.0.1:9", "shelly", &[], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_connect());
    assert!(err.is_transient());
}

#[tokio::test]
async fn cancelled_token_aborts_before_send() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.get(&host, "status", &[], &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn non_json_body_is_deserialization_error() {
    let (server, client, host) = setup().await;

    Mock::given(method("GET"))
        .and(path("/shelly"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>router admin</html>"))
        .mount(&server)
        .await;

    let err = client
        .probe_identify(&host, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }));
}
