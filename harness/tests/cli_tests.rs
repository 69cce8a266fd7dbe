//! Exit-code checks against the built `harness` binary.

use std::path::Path;
use std::process::{Command, Output};

fn harness(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_harness"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .unwrap()
}

fn seed_coverage_files(root: &Path, files: &[&str]) {
    for file in files {
        std::fs::write(root.join(file), "").unwrap();
    }
}

#[test]
fn test_clean_exits_zero_with_broken_config() {
    let root = tempfile::tempdir().unwrap();
    let config = root.path().join("bad.toml");
    std::fs::write(&config, "compiler = [").unwrap();
    seed_coverage_files(root.path(), &["coverage.info", "Scene.gcda"]);

    let output = harness(
        root.path(),
        &["--config", config.to_str().unwrap(), "coverage", "--clean"],
    );

    assert_eq!(output.status.code(), Some(0));
    assert!(!root.path().join("coverage.info").exists());
    assert!(!root.path().join("Scene.gcda").exists());
}

#[test]
fn test_clean_uses_report_paths_from_config() {
    let root = tempfile::tempdir().unwrap();
    let config = root.path().join("pipeline.toml");
    std::fs::write(&config, "[coverage]\nraw_report = \"native.info\"\n").unwrap();
    seed_coverage_files(root.path(), &["native.info"]);
    let record = root.path().join("clean.json");

    let output = harness(
        root.path(),
        &[
            "--config",
            config.to_str().unwrap(),
            "--json",
            record.to_str().unwrap(),
            "coverage",
            "--clean",
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    assert!(!root.path().join("native.info").exists());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&record).unwrap()).unwrap();
    assert_eq!(json["pipeline"], "clean");
    assert_eq!(json["removed"], 1);
    assert_eq!(json["exit_code"], 0);
}

#[test]
fn test_clean_with_nothing_to_remove_exits_zero() {
    let root = tempfile::tempdir().unwrap();

    let output = harness(root.path(), &["coverage", "--clean"]);

    assert_eq!(output.status.code(), Some(0));
}
