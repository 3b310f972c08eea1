mod support;

use std::path::Path;
use std::process::{Command, Output};

use assert_cmd::prelude::*;
use serde_json::Value;
use support::{spawn_backend, Backend, API_KEY};
use tempfile::TempDir;

const PAGE: &str = r#"<html><body><article><p id="post-1">You are scum.</p></article><p id="post-2">Lovely weather today.</p></body></html>"#;

fn sentinel(workdir: &Path, args: Vec<String>) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("sentinel");
    let mut cmd = Command::new(bin);
    cmd.current_dir(workdir)
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(workdir.join("missing.yaml"))
        .args(args);
    cmd
}

async fn run(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.assert().success().get_output().clone())
        .await
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("utf8 output");
    serde_json::from_str(stdout.trim()).expect("valid json")
}

fn scan_args(dir: &TempDir, base_url: &str, extra: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "scan".into(),
        "--page".into(),
        dir.path().join("page.html").display().to_string(),
        "--url".into(),
        "https://x.com/home".into(),
        "--relay".into(),
        base_url.into(),
        "--api-key".into(),
        API_KEY.into(),
        "--data-dir".into(),
        dir.path().join("data").display().to_string(),
    ];
    args.extend(extra.iter().map(|arg| arg.to_string()));
    args
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scan_prints_summary_and_writes_annotated_page() {
    let backend = spawn_backend(Backend::default()).await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("page.html"), PAGE).unwrap();
    let out = dir.path().join("annotated.html");

    let output = run(sentinel(
        dir.path(),
        scan_args(&dir, &backend.base_url(), &["--out", out.to_str().unwrap()]),
    ))
    .await;

    let summary = stdout_json(&output);
    assert_eq!(summary["processedElements"], 2);
    assert_eq!(summary["flaggedElements"], 1);
    assert_eq!(summary["flaggedSegments"], 1);
    assert_eq!(summary["batchSize"], 2);
    assert_eq!(summary["style"], "highlight");

    let html = std::fs::read_to_string(&out).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("sentinel-inline"));
    assert_eq!(backend.recorded.lock().batches.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persisted_sensitivity_applies_unless_overridden() {
    let backend = spawn_backend(Backend::default()).await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("page.html"), PAGE).unwrap();
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data/sensitivity.json"), "0.95").unwrap();
    std::fs::write(dir.path().join("data/highlightStyle.json"), "\"redact\"").unwrap();

    let output = run(sentinel(dir.path(), scan_args(&dir, &backend.base_url(), &[]))).await;
    let summary = stdout_json(&output);
    assert_eq!(summary["threshold"], 0.95);
    assert_eq!(summary["style"], "redact");
    assert_eq!(summary["flaggedElements"], 0);

    let output = run(sentinel(
        dir.path(),
        scan_args(&dir, &backend.base_url(), &["--sensitivity", "0.5"]),
    ))
    .await;
    let summary = stdout_json(&output);
    assert_eq!(summary["threshold"], 0.5);
    assert_eq!(summary["flaggedElements"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn feedback_pending_is_empty_for_fresh_data_dir() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data").display().to_string();

    let output = run(sentinel(
        dir.path(),
        vec!["feedback".into(), "pending".into(), "--data-dir".into(), data],
    ))
    .await;
    assert_eq!(stdout_json(&output), Value::Array(Vec::new()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn config_show_prints_effective_policy() {
    let dir = TempDir::new().unwrap();
    let output = run(sentinel(dir.path(), vec!["config".into(), "show".into()])).await;
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("sensitivity: 0.8"));
    assert!(stdout.contains("localhost:5000"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn config_show_sources_names_the_layer_of_each_setting() {
    let dir = TempDir::new().unwrap();
    let mut cmd = sentinel(
        dir.path(),
        vec!["config".into(), "show".into(), "--sources".into()],
    );
    cmd.env("SENTINEL__SCAN__SENSITIVITY", "0.65");
    let output = run(cmd).await;
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("sensitivity: 0.65"));
    assert!(stdout.contains("# Sources"));
    assert!(stdout.contains("scan.sensitivity: env"));
    assert!(stdout.contains("scan.debounce_ms: builtin"));
}
