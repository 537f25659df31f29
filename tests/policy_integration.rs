//! Integration checks for observe, enforce, and compare.

mod common;

use common::{sh_available, write_script, ACME_SCRIPT, SLEEPER_SCRIPT, WRITER_SCRIPT};
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;

fn read_json(path: &Path) -> Value {
    let content = std::fs::read_to_string(path).expect("read artifact");
    serde_json::from_str(&content).expect("parse artifact")
}

#[test]
fn observe_records_sandboxed_writes() {
    if !sh_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("create temp dir");
    let tool = temp.path().join("writer");
    write_script(&tool, WRITER_SCRIPT);
    let out_dir = temp.path().join("out");

    let bin = env!("CARGO_BIN_EXE_bwarden");
    let status = Command::new(bin)
        .arg("observe")
        .arg("--binary")
        .arg(&tool)
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--run-args")
        .arg("touch")
        .status()
        .expect("run observe");
    assert!(status.success());

    let dynamic = read_json(&out_dir.join("dynamic/dynamic-analysis.json"));
    assert_eq!(dynamic["exit_code"].as_i64(), Some(0));
    assert_eq!(dynamic["timed_out"].as_bool(), Some(false));
    assert_eq!(
        dynamic["file_diff"]["created"],
        json!(["home/.ssh/id_test", "work/out.txt"])
    );
    assert!(out_dir.join("dynamic/dynamic-analysis.md").is_file());
}

#[test]
fn observe_kills_on_timeout() {
    if !sh_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("create temp dir");
    let tool = temp.path().join("sleeper");
    write_script(&tool, SLEEPER_SCRIPT);
    let out_dir = temp.path().join("out");

    let bin = env!("CARGO_BIN_EXE_bwarden");
    let status = Command::new(bin)
        .arg("observe")
        .arg("--binary")
        .arg(&tool)
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--timeout")
        .arg("1")
        .status()
        .expect("run observe");
    assert!(status.success());

    let dynamic = read_json(&out_dir.join("dynamic/dynamic-analysis.json"));
    assert_eq!(dynamic["timed_out"].as_bool(), Some(true));
    assert_eq!(dynamic["exit_code"].as_i64(), Some(-9));
    let duration = dynamic["duration_ms"].as_u64().expect("duration_ms");
    assert!(duration >= 1_000);
    assert!(duration < 5_000);
}

#[test]
fn enforce_flags_forbidden_writes() {
    if !sh_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("create temp dir");
    let tool = temp.path().join("writer");
    write_script(&tool, WRITER_SCRIPT);
    let out_dir = temp.path().join("out");

    let bin = env!("CARGO_BIN_EXE_bwarden");
    let status = Command::new(bin)
        .arg("observe")
        .arg("--binary")
        .arg(&tool)
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--run-args")
        .arg("touch")
        .status()
        .expect("run observe");
    assert!(status.success());
    let status = Command::new(bin)
        .arg("contract")
        .arg("--binary")
        .arg(&tool)
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--max-depth")
        .arg("1")
        .status()
        .expect("run contract");
    assert!(status.success());

    let policy_path = temp.path().join("policy.json");
    std::fs::write(
        &policy_path,
        r#"{"forbid_file_path_patterns": ["\\.ssh/"], "max_created_files": 1}"#,
    )
    .expect("write policy");

    let output = Command::new(bin)
        .arg("enforce")
        .arg("--run-dir")
        .arg(&out_dir)
        .arg("--policy-file")
        .arg(&policy_path)
        .arg("--out-dir")
        .arg(&out_dir)
        .output()
        .expect("run enforce");
    assert_eq!(output.status.code(), Some(3));

    let verdict = read_json(&out_dir.join("policy/policy-verdict.json"));
    assert_eq!(verdict["verdict"].as_str(), Some("FAIL"));
    let codes: Vec<&str> = verdict["findings"]
        .as_array()
        .expect("findings")
        .iter()
        .map(|finding| finding["code"].as_str().expect("finding code"))
        .collect();
    assert_eq!(codes, ["too_many_created_files", "forbidden_file_path"]);
}

#[test]
fn enforce_passes_empty_policy() {
    if !sh_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("create temp dir");
    let tool = temp.path().join("acme");
    write_script(&tool, ACME_SCRIPT);
    let out_dir = temp.path().join("out");

    let bin = env!("CARGO_BIN_EXE_bwarden");
    let status = Command::new(bin)
        .arg("contract")
        .arg("--binary")
        .arg(&tool)
        .arg("--out-dir")
        .arg(&out_dir)
        .status()
        .expect("run contract");
    assert!(status.success());

    let policy_path = temp.path().join("policy.json");
    std::fs::write(&policy_path, "{}").expect("write policy");

    let status = Command::new(bin)
        .arg("enforce")
        .arg("--run-dir")
        .arg(&out_dir)
        .arg("--policy-file")
        .arg(&policy_path)
        .arg("--out-dir")
        .arg(&out_dir)
        .status()
        .expect("run enforce");
    assert!(status.success());

    let verdict = read_json(&out_dir.join("policy/policy-verdict.json"));
    assert_eq!(verdict["verdict"].as_str(), Some("PASS"));
    assert_eq!(verdict["findings"], json!([]));
    assert_eq!(verdict["finding_count"].as_u64(), Some(0));
}

#[test]
fn enforce_requires_policy_and_contract() {
    if !sh_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("create temp dir");
    let tool = temp.path().join("acme");
    write_script(&tool, ACME_SCRIPT);
    let run_dir = temp.path().join("run");

    let bin = env!("CARGO_BIN_EXE_bwarden");
    let status = Command::new(bin)
        .arg("contract")
        .arg("--binary")
        .arg(&tool)
        .arg("--out-dir")
        .arg(&run_dir)
        .status()
        .expect("run contract");
    assert!(status.success());

    let output = Command::new(bin)
        .arg("enforce")
        .arg("--run-dir")
        .arg(&run_dir)
        .arg("--policy-file")
        .arg("/nonexistent/policy.json")
        .arg("--out-dir")
        .arg(temp.path().join("out-a"))
        .output()
        .expect("run enforce without policy");
    assert_eq!(output.status.code(), Some(2));

    let policy_path = temp.path().join("policy.json");
    std::fs::write(&policy_path, "{}").expect("write policy");
    let empty_run = temp.path().join("empty-run");
    std::fs::create_dir_all(&empty_run).expect("create empty run dir");
    let output = Command::new(bin)
        .arg("enforce")
        .arg("--run-dir")
        .arg(&empty_run)
        .arg("--policy-file")
        .arg(&policy_path)
        .arg("--out-dir")
        .arg(temp.path().join("out-b"))
        .output()
        .expect("run enforce without contract");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("contract not found"));
}

#[test]
fn compare_reports_drift_without_failing() {
    if !sh_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("create temp dir");
    let tool = temp.path().join("acme");
    write_script(&tool, ACME_SCRIPT);
    let current_dir = temp.path().join("current");

    let bin = env!("CARGO_BIN_EXE_bwarden");
    let status = Command::new(bin)
        .arg("contract")
        .arg("--binary")
        .arg(&tool)
        .arg("--out-dir")
        .arg(&current_dir)
        .status()
        .expect("run contract");
    assert!(status.success());

    let mut baseline = read_json(&current_dir.join("contract/contract.json"));
    baseline["command_paths"]
        .as_array_mut()
        .expect("command_paths")
        .push(Value::String("legacy".to_string()));
    let base_dir = temp.path().join("base");
    std::fs::create_dir_all(&base_dir).expect("create baseline dir");
    std::fs::write(
        base_dir.join("contract.json"),
        serde_json::to_string_pretty(&baseline).expect("serialize baseline"),
    )
    .expect("write baseline contract");

    let out_dir = temp.path().join("cmp");
    let status = Command::new(bin)
        .arg("compare")
        .arg("--current-dir")
        .arg(&current_dir)
        .arg("--baseline-dir")
        .arg(&base_dir)
        .arg("--out-dir")
        .arg(&out_dir)
        .status()
        .expect("run compare");
    assert!(status.success());

    let diff = read_json(&out_dir.join("compare/baseline-diff.json"));
    assert_eq!(diff["status"].as_str(), Some("fail"));
    assert_eq!(diff["removed"], json!(["legacy"]));
    assert_eq!(diff["added"], json!([]));
    assert_eq!(diff["current_count"].as_u64(), Some(3));
    assert_eq!(diff["baseline_count"].as_u64(), Some(4));
    assert_eq!(diff["overlap_count"].as_u64(), Some(3));
}
