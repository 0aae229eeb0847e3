#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcontrol_api::{CloudClient, ControlRequest, Error, Session};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, CloudClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = CloudClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn session() -> Session {
    Session::new("4711", SecretString::from("JSESSIONID=abc"), "user@example.com")
}

fn form_field(body: &[u8], key: &str) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .and(body_string_contains("account=user%40example.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "JSESSIONID=abc123; Path=/; HttpOnly")
                .set_body_json(json!({ "code": "200", "result": { "id": 4711 } })),
        )
        .mount(&server)
        .await;

    let password = SecretString::from("hunter2");
    let session = client.login("user@example.com", &password).await.unwrap();

    assert_eq!(session.user_id(), "4711");
    assert_eq!(session.account(), "user@example.com");
}

#[tokio::test]
async fn test_login_rejected_by_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let result = client
        .login("user@example.com", &SecretString::from("wrong"))
        .await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_without_user_id_is_rejection() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 10001, "msg": "wrong password" })),
        )
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &SecretString::from("wrong"))
        .await
        .unwrap_err();

    assert!(err.is_credential_rejection());
    assert!(err.to_string().contains("wrong password"));
}

#[tokio::test]
async fn test_login_server_error_is_not_rejection() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client
        .login("user@example.com", &SecretString::from("pw"))
        .await
        .unwrap_err();

    assert!(!err.is_credential_rejection());
    assert_eq!(err.api_error_code(), Some(502));
}

// ── Device listing ──────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_flattens_areas() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .and(header("cookie", "JSESSIONID=abc"))
        .and(body_string_contains("userId=4711"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "result": {
                "areas": [
                    { "name": "Ground floor", "data": [
                        { "id": 1, "name": "Lobby", "power": "y", "mode": "cool",
                          "setTemp": "24", "wind": "auto", "swing": "0", "factTemp": "26" }
                    ]},
                    { "name": "First floor", "data": [
                        { "id": "2", "name": "Office", "power": "n", "mode": "heat",
                          "setTemp": 21, "wind": "low", "swing": 1, "factTemp": 19 }
                    ]}
                ]
            }
        })))
        .mount(&server)
        .await;

    let devices = client.list_devices(&session()).await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, "1");
    assert_eq!(devices[0].area.as_deref(), Some("Ground floor"));
    assert_eq!(devices[1].id, "2");
    assert_eq!(devices[1].name, "Office");
    assert_eq!(devices[1].swing.as_deref(), Some("1"));
    assert_eq!(devices[1].area.as_deref(), Some("First floor"));
}

#[tokio::test]
async fn test_list_devices_session_expired_code() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 40018, "msg": "timeout" })),
        )
        .mount(&server)
        .await;

    let result = client.list_devices(&session()).await;
    assert!(
        matches!(result, Err(Error::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );
}

#[tokio::test]
async fn test_list_devices_http_401() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.list_devices(&session()).await.unwrap_err();
    assert!(err.is_auth_expired());
}

#[tokio::test]
async fn test_list_devices_missing_id_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "areas": [ { "data": [ { "name": "no id" } ] } ] }
        })))
        .mount(&server)
        .await;

    let result = client.list_devices(&session()).await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

// ── Control ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_control_sends_only_supplied_fields() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/device/control"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "200" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = ControlRequest::new("2");
    request.set_temp = Some("22".into());
    client.control(&session(), &request).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body = &received[0].body;
    let control: serde_json::Value =
        serde_json::from_str(&form_field(body, "control").unwrap()).unwrap();
    assert_eq!(control, json!({ "id": "2", "setTemp": "22" }));
    assert_eq!(form_field(body, "operation"), form_field(body, "control"));
    assert_eq!(form_field(body, "userId").as_deref(), Some("4711"));
}

#[tokio::test]
async fn test_control_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/web/device/control"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 500, "msg": "device offline" })),
        )
        .mount(&server)
        .await;

    let mut request = ControlRequest::new("2");
    request.power = Some("y".into());
    let result = client.control(&session(), &request).await;

    match result {
        Err(Error::CommandRejected { device_id, message }) => {
            assert_eq!(device_id, "2");
            assert!(message.contains("device offline"));
        }
        other => panic!("expected CommandRejected, got: {other:?}"),
    }
}
