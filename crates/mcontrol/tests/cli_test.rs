//! Integration tests for the `mcontrol` CLI binary.
//!
//! Argument parsing, help output, completions and error exit codes run
//! without any network. The engine-backed tests point a profile at a
//! wiremock cloud.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

const NO_HOME: &str = "/tmp/mcontrol-cli-test-nonexistent";

/// Build a command for the `mcontrol` binary with env isolation.
///
/// Clears all `MCONTROL_*` variables the CLI reads and points config
/// directories at `home`.
fn mcontrol_in(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("mcontrol");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("MCONTROL_PROFILE")
        .env_remove("MCONTROL_EMAIL")
        .env_remove("MCONTROL_PASSWORD")
        .env_remove("MCONTROL_GATEWAY")
        .env_remove("MCONTROL_OUTPUT")
        .env_remove("MCONTROL_TIMEOUT");
    cmd
}

fn mcontrol_cmd() -> assert_cmd::Command {
    mcontrol_in(Path::new(NO_HOME))
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Write a cloud-only profile pointing at `cloud` under `home`.
fn write_profile(home: &Path, cloud: &MockServer) {
    let dir = home.join("mcontrol");
    std::fs::create_dir_all(&dir).unwrap();
    let body = format!(
        "default_profile = \"home\"\n\n\
         [profiles.home]\n\
         email = \"user@example.com\"\n\
         password = \"pw\"\n\
         cloud_url = \"{}\"\n\
         cloud_retries = 0\n",
        cloud.uri()
    );
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

async fn cloud_with(devices: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "JSESSIONID=abc; Path=/")
                .set_body_json(json!({ "code": 200, "result": { "id": "4711" } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/web/userGroup/getDetails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "result": { "areas": [{ "areaName": "Home", "data": devices }] }
        })))
        .mount(&server)
        .await;
    server
}

fn living() -> Value {
    json!({
        "id": "101", "name": "Living", "power": "y", "mode": "cool",
        "setTemp": "24", "wind": "auto", "swing": "0", "factTemp": "23"
    })
}

/// Run the binary off the async runtime so the mock servers keep serving.
async fn run(cmd: assert_cmd::Command) -> std::process::Output {
    let mut cmd = cmd;
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = mcontrol_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    mcontrol_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("devices")
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("--cloud-only")),
    );
}

#[test]
fn test_version_flag() {
    mcontrol_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mcontrol"));
}

#[test]
fn test_invalid_subcommand() {
    mcontrol_cmd().arg("frobnicate").assert().failure();
}

#[test]
fn test_invalid_output_format() {
    mcontrol_cmd()
        .args(["--output", "xml", "devices", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xml"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    mcontrol_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    mcontrol_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    mcontrol_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mcontrol"));
}

// ── Subcommand help ─────────────────────────────────────────────────

#[test]
fn test_subcommand_help_lists_commands() {
    let cases: &[(&str, &[&str])] = &[
        ("devices", &["list", "get"]),
        ("local", &["dump"]),
        ("config", &["init", "show", "set", "profiles", "use", "set-password"]),
    ];
    for (sub, expected) in cases {
        let output = mcontrol_cmd().args([sub, "--help"]).output().unwrap();
        assert!(output.status.success(), "{sub} --help failed");
        let text = String::from_utf8_lossy(&output.stdout);
        for word in *expected {
            assert!(text.contains(word), "'{sub} --help' lacks '{word}':\n{text}");
        }
    }
}

#[test]
fn test_set_help_lists_flags() {
    mcontrol_cmd().args(["set", "--help"]).assert().success().stdout(
        predicate::str::contains("--power")
            .and(predicate::str::contains("--mode"))
            .and(predicate::str::contains("--fan"))
            .and(predicate::str::contains("--temp"))
            .and(predicate::str::contains("--swing")),
    );
}

#[test]
fn test_set_rejects_unknown_mode() {
    mcontrol_cmd()
        .args(["set", "101", "--mode", "turbo"])
        .assert()
        .failure()
        .code(2);
}

// ── Missing configuration ───────────────────────────────────────────

#[test]
fn test_devices_without_config_is_usage_error() {
    let output = mcontrol_cmd().args(["devices", "list"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output).to_lowercase();
    assert!(
        text.contains("config") || text.contains("profile"),
        "Expected a configuration hint:\n{text}"
    );
}

#[test]
fn test_unknown_profile_is_not_found() {
    mcontrol_cmd()
        .args(["--profile", "cabin", "status"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("cabin"));
}

#[test]
fn test_local_dump_without_gateway() {
    mcontrol_cmd()
        .args(["--email", "user@example.com", "local", "dump"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("gateway"));
}

#[test]
fn test_local_dump_rejects_url_gateway() {
    mcontrol_cmd()
        .args(["--gateway", "http://192.168.1.50/", "local", "dump"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_config_show_without_file() {
    mcontrol_cmd().args(["config", "show"]).assert().success();
}

// ── Config round trip ───────────────────────────────────────────────

#[test]
fn test_config_set_then_show() {
    let home = tempfile::tempdir().unwrap();

    mcontrol_in(home.path())
        .args(["config", "set", "email", "user@example.com"])
        .assert()
        .success();
    mcontrol_in(home.path())
        .args(["config", "set", "gateway", "192.168.1.50"])
        .assert()
        .success();
    mcontrol_in(home.path())
        .args(["config", "set", "cloud_interval", "fast"])
        .assert()
        .failure()
        .code(2);

    mcontrol_in(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("user@example.com")
                .and(predicate::str::contains("192.168.1.50"))
                .and(predicate::str::contains("cloud_interval").not()),
        );

    mcontrol_in(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default *").and(predicate::str::contains("hybrid")));
}

#[test]
fn test_config_use_unknown_profile() {
    let home = tempfile::tempdir().unwrap();
    mcontrol_in(home.path())
        .args(["config", "use", "cabin"])
        .assert()
        .failure()
        .code(4);
}

// ── Engine-backed commands ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list_json_from_cloud() {
    let cloud = cloud_with(vec![living()]).await;
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &cloud);

    let mut cmd = mcontrol_in(home.path());
    cmd.args(["--output", "json", "devices", "list"]);
    let output = run(cmd).await;

    let text = combined_output(&output);
    assert!(output.status.success(), "devices list failed:\n{text}");
    let listed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed[0]["cloud_id"], "101");
    assert_eq!(listed[0]["name"], "Living");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_reports_cloud_only() {
    let cloud = cloud_with(vec![living()]).await;
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &cloud);

    let mut cmd = mcontrol_in(home.path());
    cmd.args(["--output", "json", "status"]);
    let output = run(cmd).await;

    let text = combined_output(&output);
    assert!(output.status.success(), "status failed:\n{text}");
    let status: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["devices"], 1);
    assert!(status["gateway"].is_null());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_unknown_device_is_not_found() {
    let cloud = cloud_with(vec![living()]).await;
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &cloud);

    let mut cmd = mcontrol_in(home.path());
    cmd.args(["devices", "get", "Garage"]);
    let output = run(cmd).await;
    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_by_name_is_applied() {
    let cloud = cloud_with(vec![living()]).await;
    Mock::given(method("POST"))
        .and(path("/web/device/control"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 200 })))
        .expect(1)
        .mount(&cloud)
        .await;
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &cloud);

    let mut cmd = mcontrol_in(home.path());
    cmd.args(["--output", "plain", "set", "living", "--power", "off"]);
    let output = run(cmd).await;

    let text = combined_output(&output);
    assert!(output.status.success(), "set failed:\n{text}");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "101");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_command_exit_code() {
    let cloud = cloud_with(vec![living()]).await;
    Mock::given(method("POST"))
        .and(path("/web/device/control"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 1003, "msg": "device offline" })),
        )
        .mount(&cloud)
        .await;
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &cloud);

    let mut cmd = mcontrol_in(home.path());
    cmd.args(["set", "101", "--temp", "22"]);
    let output = run(cmd).await;
    assert_eq!(output.status.code(), Some(5), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_password_is_auth_error() {
    let cloud = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/web/user/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 40001, "msg": "password error" })),
        )
        .mount(&cloud)
        .await;
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &cloud);

    let mut cmd = mcontrol_in(home.path());
    cmd.args(["--password", "wrong", "status"]);
    let output = run(cmd).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
