//! End-to-end CLI tests for the citegraph binary.

mod support;

use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use support::socket_guard::start_mock_server_or_skip;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn citegraph() -> Command {
    let mut cmd = Command::cargo_bin("citegraph").unwrap();
    cmd.env_remove("OPENALEX_EMAIL")
        .env_remove("CITEGRAPH_OPENALEX_URL")
        .env_remove("CITEGRAPH_S2_URL")
        .env_remove("RUST_LOG");
    cmd
}

async fn mount_work(server: &MockServer, id: &str, references: &[&str], delay: Duration) {
    let references: Vec<String> = references
        .iter()
        .map(|r| format!("https://openalex.org/{r}"))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/works/{id}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "id": format!("https://openalex.org/{id}"),
                    "title": format!("Survey of topic {id}"),
                    "publication_year": 2019,
                    "cited_by_count": 50,
                    "referenced_works": references
                }))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[test]
fn test_binary_help_displays_usage() {
    citegraph()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build a citation graph"));
}

#[test]
fn test_binary_version_displays_version() {
    citegraph()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("citegraph"));
}

#[test]
fn test_missing_seed_is_fatal() {
    citegraph()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_depth_above_limit_is_rejected() {
    citegraph().args(["W1", "--depth", "11"]).assert().code(1);
}

#[test]
fn test_zero_workers_is_rejected() {
    citegraph().args(["W1", "-w", "0"]).assert().code(1);
}

#[test]
fn test_invalid_flag_is_rejected() {
    citegraph()
        .args(["W1", "--invalid-flag"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crawl_writes_graph_and_metrics() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_work(&server, "W1", &["W2"], Duration::ZERO).await;
    mount_work(&server, "W2", &[], Duration::ZERO).await;

    let out = tempfile::tempdir().unwrap();
    let out_path = out.path().to_path_buf();
    let uri = server.uri();
    let assert = tokio::task::spawn_blocking(move || {
        citegraph()
            .args(["W1", "-q", "--metrics", "-e", "tests@example.org", "--openalex-url", &uri])
            .arg("-o")
            .arg(&out_path)
            .assert()
    })
    .await
    .unwrap();
    assert.success().stdout(predicate::str::contains("graph.json"));

    let graph: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.path().join("graph.json")).unwrap()).unwrap();
    assert_eq!(graph["metadata"]["complete"], true);
    assert_eq!(graph["metadata"]["seed_id"], "W1");
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(graph["edges"].as_array().unwrap().len(), 1);
    assert!(out.path().join("metrics.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unresolvable_seed_exits_fatal() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/works/W9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let out_path = out.path().to_path_buf();
    let uri = server.uri();
    let assert = tokio::task::spawn_blocking(move || {
        citegraph()
            .args(["W9", "--openalex-url", &uri])
            .arg("-o")
            .arg(&out_path)
            .assert()
    })
    .await
    .unwrap();
    assert.code(1).stderr(predicate::str::contains("error:"));
    assert!(!out.path().join("graph.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_global_timeout_exits_incomplete() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_work(&server, "W1", &["W2"], Duration::ZERO).await;
    mount_work(&server, "W2", &[], Duration::from_secs(5)).await;

    let out = tempfile::tempdir().unwrap();
    let out_path = out.path().to_path_buf();
    let uri = server.uri();
    let assert = tokio::task::spawn_blocking(move || {
        citegraph()
            .args(["W1", "-q", "-t", "1", "--openalex-url", &uri])
            .arg("-o")
            .arg(&out_path)
            .assert()
    })
    .await
    .unwrap();
    assert.code(2);

    let graph: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.path().join("graph.json")).unwrap()).unwrap();
    assert_eq!(graph["metadata"]["complete"], false);
    assert_eq!(graph["metadata"]["layers_completed"], 0);
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 1);
}
