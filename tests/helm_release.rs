//! End-to-end reads of the `helm_release` data source against fake `helm`
//! programs.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;
use terraform_provider_torb::testing::{assert_error_contains, ProviderTester};
use terraform_provider_torb::{ProviderError, TorbProvider};
use tokio::sync::Mutex;

// Writing an executable while another test forks can leave the file busy
// (ETXTBSY) when it is exec'd, so script creation and spawning are serialized.
static SPAWN_LOCK: Mutex<()> = Mutex::const_new(());

struct FakeHelm {
    _dir: TempDir,
    path: PathBuf,
}

fn fake_helm(body: &str) -> FakeHelm {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helm");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    FakeHelm { _dir: dir, path }
}

async fn read_with(body: &str, config: Value) -> Result<Value, ProviderError> {
    let _guard = SPAWN_LOCK.lock().await;
    let helm = fake_helm(body);

    let tester = ProviderTester::new(TorbProvider::new("test"));
    tester
        .configure(json!({"helm_binary": helm.path.to_str().unwrap()}))
        .await
        .unwrap();
    tester.read_data_source("helm_release", config).await
}

#[tokio::test]
async fn test_reads_and_flattens_values() {
    let state = read_with(
        r#"echo '{"image":{"repository":"nginx","tag":"1.25"},"replicaCount":2,"ports":[80,443]}'"#,
        json!({"release_name": "web", "namespace": "apps"}),
    )
    .await
    .unwrap();

    assert_eq!(state["release_name"], "web");
    assert_eq!(state["namespace"], "apps");

    let values: Value = serde_json::from_str(state["values"].as_str().unwrap()).unwrap();
    assert_eq!(
        values,
        json!({
            "image.repository": "nginx",
            "image.tag": "1.25",
            "ports.0": "80",
            "ports.1": "443",
            "replicaCount": "2"
        })
    );
}

#[tokio::test]
async fn test_passes_release_and_namespace_to_helm() {
    let state = read_with(
        r#"printf '{"argv":"%s"}\n' "$*""#,
        json!({"release_name": "hello-world"}),
    )
    .await
    .unwrap();

    assert_eq!(state["namespace"], "default");
    assert_eq!(
        state["values"],
        r#"{"argv":"get values hello-world --namespace default -o json"}"#
    );
}

#[tokio::test]
async fn test_null_values_become_empty_object() {
    let state = read_with("echo null", json!({"release_name": "bare"}))
        .await
        .unwrap();
    assert_eq!(state["values"], "{}");
}

#[tokio::test]
async fn test_id_is_unix_timestamp() {
    let before = unix_now();
    let state = read_with("echo '{}'", json!({"release_name": "web"}))
        .await
        .unwrap();
    let after = unix_now();

    let id: i64 = state["id"].as_str().unwrap().parse().unwrap();
    assert!(before <= id && id <= after);
}

#[tokio::test]
async fn test_non_zero_exit_surfaces_output() {
    let err = read_with(
        "echo 'Error: release: not found' >&2\nexit 1",
        json!({"release_name": "missing"}),
    )
    .await
    .unwrap_err();

    let diagnostic = err.to_diagnostic();
    assert_eq!(diagnostic.summary, "Failed to read values from Helm");
    assert_error_contains(&[diagnostic], "Error: release: not found");
}

#[tokio::test]
async fn test_invalid_json_is_reported() {
    let err = read_with("echo 'values:\n  a: 1'", json!({"release_name": "web"}))
        .await
        .unwrap_err();

    assert_error_contains(&[err.to_diagnostic()], "failed to parse helm output as JSON");
}

#[tokio::test]
async fn test_non_object_values_are_reported() {
    let err = read_with("echo '[1, 2]'", json!({"release_name": "web"}))
        .await
        .unwrap_err();

    assert_error_contains(
        &[err.to_diagnostic()],
        "expected a JSON object at the document root, got array",
    );
}

#[tokio::test]
async fn test_kube_context_is_forwarded() {
    let _guard = SPAWN_LOCK.lock().await;
    let helm = fake_helm(r#"printf '{"argv":"%s"}\n' "$*""#);

    let tester = ProviderTester::new(TorbProvider::new("test"));
    tester
        .configure(json!({
            "helm_binary": helm.path.to_str().unwrap(),
            "kube_context": "kind-dev"
        }))
        .await
        .unwrap();

    let state = tester
        .lifecycle_read("helm_release", json!({"release_name": "web", "namespace": "apps"}))
        .await
        .unwrap();
    assert_eq!(
        state["values"],
        r#"{"argv":"get values web --namespace apps -o json --kube-context kind-dev"}"#
    );
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
