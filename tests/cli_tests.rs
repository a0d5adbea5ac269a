use std::fs;
use std::path::Path;

use assert_cmd::Command;
use inferbench::record::{Baseline, LengthBucket, MetricsRecord};
use inferbench::store::{BaselineStore, JsonBaselineStore, encode_document};
use tempfile::tempdir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_inferbench"))
}

fn record(latency: f64, throughput: f64) -> MetricsRecord {
    MetricsRecord {
        component: "embedding".into(),
        batch_size: 64,
        length_bucket: LengthBucket::Short,
        avg_latency_ms: latency,
        p50_latency_ms: latency,
        p95_latency_ms: latency,
        p99_latency_ms: latency,
        throughput_items_per_sec: throughput,
        peak_memory_mb: 537.9,
        memory_delta_mb: 0.0,
        sample_count: 20,
        failure_count: 0,
        captured_at: 1_700_000_000,
    }
}

fn write_doc(path: &Path, name: &str, record: MetricsRecord) {
    let doc = Baseline::from_records(name, [record]);
    fs::write(path, encode_document(&doc).unwrap()).unwrap();
}

#[test]
fn test_cli_exits_with_success_on_help() {
    bin().arg("--help").assert().success();
}

#[test]
fn test_cli_run_saves_then_compares() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("baselines");
    let common = [
        "run",
        "--component",
        "nli",
        "--iterations",
        "2",
        "--warmup",
        "0",
        "--batch-sizes",
        "1,2",
        "--lengths",
        "short",
        "--baseline",
        "ci",
    ];

    bin()
        .args(common)
        .arg("--store")
        .arg(&store)
        .arg("--save-baseline")
        .assert()
        .success();
    let saved = JsonBaselineStore::open(&store)
        .unwrap()
        .load("ci-nli")
        .unwrap();
    assert_eq!(saved.len(), 2);

    let results = dir.path().join("out/current.json");
    bin()
        .args(common)
        .arg("--store")
        .arg(&store)
        .arg("--output")
        .arg(&results)
        .args(["--latency-tolerance", "1000000", "--memory-tolerance", "1000000"])
        .args(["--throughput-tolerance", "100"])
        .assert()
        .success();
    let written: Baseline = serde_json::from_slice(&fs::read(&results).unwrap()).unwrap();
    assert_eq!(written.len(), 2);
}

#[test]
fn test_cli_compare_passes_within_tolerance() {
    let dir = tempdir().unwrap();
    let baseline = dir.path().join("baseline.json");
    let current = dir.path().join("current.json");
    write_doc(&baseline, "release", record(6.66, 1184.9));
    write_doc(&current, "current", record(6.70, 1200.0));
    bin()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .assert()
        .code(0);
}

#[test]
fn test_cli_compare_fails_on_regression() {
    let dir = tempdir().unwrap();
    let baseline = dir.path().join("baseline.json");
    let current = dir.path().join("current.json");
    write_doc(&baseline, "release", record(6.66, 1184.9));
    write_doc(&current, "current", record(7.40, 1184.9));
    bin()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .assert()
        .code(1);
}

#[test]
fn test_cli_compare_fails_when_scenario_is_absent() {
    let dir = tempdir().unwrap();
    let baseline = dir.path().join("baseline.json");
    let current = dir.path().join("current.json");
    let mut small = record(6.66, 1184.9);
    small.batch_size = 8;
    let doc = Baseline::from_records("release", [small.clone(), record(6.66, 1184.9)]);
    fs::write(&baseline, encode_document(&doc).unwrap()).unwrap();
    write_doc(&current, "current", small);
    bin()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .assert()
        .code(1);
}

#[test]
fn test_cli_compare_unreadable_document_is_error() {
    let dir = tempdir().unwrap();
    let baseline = dir.path().join("baseline.json");
    let current = dir.path().join("current.json");
    fs::write(&baseline, b"not json").unwrap();
    write_doc(&current, "current", record(6.66, 1184.9));
    bin()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .assert()
        .code(2);
}

#[test]
fn test_cli_rejects_unknown_length_bucket() {
    bin().args(["run", "--lengths", "huge"]).assert().failure();
}
