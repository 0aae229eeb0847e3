#![allow(clippy::unwrap_used)]
// Integration tests for `SessionManager` using wiremock.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcontrol_api::CloudClient;
use mcontrol_core::{AuthError, CoreError, RetryPolicy, SessionManager};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(retries: u32) -> (MockServer, Arc<SessionManager>) {
    let server = MockServer::start().await;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(400))
        .build()
        .unwrap();
    let client = CloudClient::with_client(
        http,
        Url::parse(&server.uri()).unwrap(),
    );
    let manager = SessionManager::new(
        client,
        "user@example.com",
        SecretString::from("pw"),
        RetryPolicy {
            retries,
            backoff: Duration::from_millis(10),
        },
    );
    (server, Arc::new(manager))
}

fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("set-cookie", "JSESSIONID=abc; Path=/")
        .set_body_json(json!({ "code": 200, "result": { "id": "4711" } }))
}

fn details_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 200,
        "result": { "areas": [{ "areaName": "Home", "data": [{ "id": "1", "name": "Hall" }] }] }
    }))
}

fn expired() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": 40018, "msg": "not logged in" }))
}

async fn list(manager: &SessionManager) -> Result<usize, CoreError> {
    manager
        .call(|client, session| async move { client.list_devices(&session).await })
        .await
        .map(|devices| devices.len())
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let (server, manager) = setup(0).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(login_ok().set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let calls = (0..8).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.ensure_session().await })
    });
    let sessions: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(sessions.len(), 8);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    assert_eq!(sessions[0].user_id(), "4711");
}

#[tokio::test]
async fn test_expired_session_relogs_once_and_retries() {
    let (server, manager) = setup(0).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(login_ok())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(expired())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(details_ok())
        .mount(&server)
        .await;

    assert_eq!(list(&manager).await.unwrap(), 1);
}

#[tokio::test]
async fn test_second_expiry_is_surfaced() {
    let (server, manager) = setup(0).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(login_ok())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(expired())
        .expect(2)
        .mount(&server)
        .await;

    let result = list(&manager).await;
    assert!(
        matches!(result, Err(CoreError::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );
}

#[tokio::test]
async fn test_rejections_latch_until_credentials_change() {
    let (server, manager) = setup(3).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad password"))
        .expect(2)
        .mount(&server)
        .await;

    for _ in 0..3 {
        let result = manager.ensure_session().await;
        assert!(
            matches!(
                result,
                Err(CoreError::Auth(AuthError::InvalidCredentials { .. }))
            ),
            "expected InvalidCredentials, got: {result:?}"
        );
    }
    assert!(manager.is_latched());

    manager.update_credentials("user@example.com", SecretString::from("new"));
    assert!(!manager.is_latched());
}

#[tokio::test]
async fn test_login_timeout_is_retried() {
    let (server, manager) = setup(2).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(login_ok().set_delay(Duration::from_secs(2)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(login_ok())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(details_ok())
        .mount(&server)
        .await;

    assert_eq!(list(&manager).await.unwrap(), 1);
    assert!(!manager.is_latched());
}

#[tokio::test]
async fn test_server_errors_are_not_retried() {
    let (server, manager) = setup(3).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(login_ok())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = list(&manager).await.unwrap_err();
    assert!(matches!(err, CoreError::CloudUnavailable { .. }), "{err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_login_server_error_is_not_retried() {
    let (server, manager) = setup(3).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = list(&manager).await.unwrap_err();
    assert!(matches!(err, CoreError::CloudUnavailable { .. }), "{err:?}");
    assert!(!manager.is_latched());
}

#[tokio::test]
async fn test_invalidate_ignores_replaced_session() {
    let (server, manager) = setup(0).await;

    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(login_ok())
        .mount(&server)
        .await;

    let first = manager.ensure_session().await.unwrap();
    let second = manager.login().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    manager.invalidate(&first);
    assert!(manager.current().is_some());

    manager.invalidate(&second);
    assert!(manager.current().is_none());
}
