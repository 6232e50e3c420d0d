//! Integration test: run the `layerforge` binary against Dockerfiles on disk.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run layerforge and return (stdout, stderr, success).
fn run(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_layerforge"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn write_dockerfile(dir: &Path) {
    fs::write(
        dir.join("Dockerfile"),
        "FROM golang:1.22 AS Builder\n\
         RUN go build -o /out/app\n\
         FROM alpine:3.19 AS runtime\n\
         FROM builder\n",
    )
    .unwrap();
}

#[test]
fn test_version() {
    let (stdout, _, ok) = run(&["version"]);
    assert!(ok);
    assert!(stdout.starts_with("layerforge version "));
}

#[test]
fn test_stages_json_plan() {
    let tmp = TempDir::new().unwrap();
    write_dockerfile(tmp.path());
    let context = tmp.path().to_str().unwrap();

    let (stdout, stderr, ok) = run(&["stages", "--context", context, "--json"]);
    assert!(ok, "stderr: {stderr}");

    let plan: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(plan["target"], 2);
    assert_eq!(plan["stages"][0]["stage"]["name"], "builder");
    assert_eq!(plan["stages"][0]["retain"], true);
    assert_eq!(plan["stages"][1]["retain"], false);
    assert_eq!(plan["stages"][2]["base_stage"], 0);
}

#[test]
fn test_stages_table() {
    let tmp = TempDir::new().unwrap();
    write_dockerfile(tmp.path());
    let context = tmp.path().to_str().unwrap();

    let (stdout, _, ok) = run(&["stages", "-c", context, "--target", "runtime"]);
    assert!(ok);
    assert!(stdout.contains("alpine:3.19"));
    assert!(stdout.contains("target"));
    assert!(stdout.contains("Build chain: 1"));
}

#[test]
fn test_invalid_target_exits_with_error() {
    let tmp = TempDir::new().unwrap();
    write_dockerfile(tmp.path());
    let context = tmp.path().to_str().unwrap();

    let (_, stderr, ok) = run(&["stages", "-c", context, "--target", "release"]);
    assert!(!ok);
    assert!(stderr.contains("Error: release is not a valid target build stage"));
}

#[test]
fn test_build_without_layout_fails() {
    let tmp = TempDir::new().unwrap();
    write_dockerfile(tmp.path());
    let root = tmp.path();

    let (_, stderr, ok) = run(&[
        "build",
        "-c",
        root.to_str().unwrap(),
        "--output-dir",
        root.join("out").to_str().unwrap(),
        "--cache-dir",
        root.join("cache").to_str().unwrap(),
        "--layout",
        root.join("missing").to_str().unwrap(),
    ]);
    assert!(!ok);
    assert!(stderr.contains("Error:"));
    assert!(!root.join("out").exists());
}
