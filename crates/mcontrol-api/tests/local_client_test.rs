#![allow(clippy::unwrap_used)]
// Integration tests for `LocalClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcontrol_api::local::RECORD_LEN;
use mcontrol_api::{Error, LocalClient, LocalFan, LocalMode, TransportConfig, decode};

async fn setup() -> (MockServer, LocalClient) {
    let server = MockServer::start().await;
    let client = LocalClient::new(
        &server.address().to_string(),
        &TransportConfig::default().with_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    (server, client)
}

async fn mount_status(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/get_mbdata_all.jsn"))
        .and(body_string_contains("_web_cmd=get_mbdata_all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_poll_status_builds_frame_for_occupied_slots() {
    let (server, client) = setup().await;
    mount_status(
        &server,
        json!([
            { "addr": 0, "Data": "00,00,00,00,c0,00,1a," },
            { "addr": 1, "Data": "-" },
            { "addr": "2", "Data": "000000 90 aa 00 13" }
        ]),
    )
    .await;

    let frame = client.poll_status().await.unwrap();
    assert_eq!(frame.len(), 2 * RECORD_LEN);

    let units = decode(&frame).unwrap();
    assert_eq!(units.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(units[&0].mode, LocalMode::Cool);
    assert_eq!(units[&0].target_temp, 24);
    assert_eq!(units[&2].mode, LocalMode::Off);
    assert_eq!(units[&2].fan, LocalFan::High);
}

#[tokio::test]
async fn test_bad_entries_are_skipped() {
    let (server, client) = setup().await;
    mount_status(
        &server,
        json!([
            { "addr": 0, "Data": "zzzz" },
            { "addr": 1, "Data": "0000" },
            { "Data": "00000000c0001a" },
            { "addr": 300, "Data": "00000000c0001a" },
            { "addr": 3, "Data": "00000000c0001a" }
        ]),
    )
    .await;

    let units = client.poll_units().await.unwrap();
    assert_eq!(units.len(), 1);
    assert!(units.contains_key(&3));
}

#[tokio::test]
async fn test_http_error_is_unreachable() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/get_mbdata_all.jsn"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.poll_status().await.unwrap_err();
    assert!(
        matches!(err, Error::LocalUnreachable { .. }),
        "expected LocalUnreachable, got: {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_timeout_is_unreachable() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/get_mbdata_all.jsn"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let result = client.poll_status().await;
    assert!(
        matches!(result, Err(Error::LocalUnreachable { .. })),
        "expected LocalUnreachable, got: {result:?}"
    );
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() {
    let (server, client) = setup().await;
    drop(server);

    let result = client.poll_status().await;
    assert!(
        matches!(result, Err(Error::LocalUnreachable { .. })),
        "expected LocalUnreachable, got: {result:?}"
    );
}

#[tokio::test]
async fn test_duplicate_addresses_fail_decoding() {
    let (server, client) = setup().await;
    mount_status(
        &server,
        json!([
            { "addr": 5, "Data": "00000000c0001a" },
            { "addr": 5, "Data": "00000000c0001a" }
        ]),
    )
    .await;

    let result = client.poll_units().await;
    match result {
        Err(Error::Protocol(e)) => assert_eq!(e.offset, RECORD_LEN),
        other => panic!("expected Protocol error, got: {other:?}"),
    }
}
