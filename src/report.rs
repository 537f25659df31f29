//! Markdown companions for each JSON artifact plus the run-level summary.
//!
//! Rendering is pure string assembly over the typed records. Long lists are
//! capped so reports stay readable when a binary advertises hundreds of
//! commands or spawns noisy process trees.

use crate::baseline::{self, BaselineDiff, BaselineStatus};
use crate::contract::{self, Contract};
use crate::facts::{self, StaticFacts};
use crate::policy::{self, PolicyVerdict, Verdict};
use crate::supervise::{self, DynamicRun};
use crate::util::{now_epoch_ms, read_json};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SUITE_SUMMARY_SCHEMA_VERSION: u32 = 1;

const MAX_LIST_ITEMS: usize = 200;
const MAX_SAMPLE_ITEMS: usize = 40;
const MAX_SAMPLE_CHARS: usize = 180;

pub fn render_static_markdown(facts: &StaticFacts) -> String {
    let linked = facts.linked_libraries.join("\n");
    let mut lines = vec![
        "# Static Analysis".to_string(),
        String::new(),
        format!("- Generated: `{}`", facts.generated_at_epoch_ms),
        format!("- Binary: `{}`", facts.binary),
        format!("- SHA256: `{}`", facts.sha256),
        format!("- Size: `{}` bytes", facts.size_bytes),
        format!("- Runtime guess: `{}`", facts.runtime_guess.join(", ")),
        format!(
            "- Embedded ZIP local headers: `{}`",
            facts.zip_local_header_count
        ),
        format!(
            "- Strings sampled: `{}` of `{}`",
            facts.strings_sample_count, facts.strings_total_count
        ),
        String::new(),
        "## file(1)".to_string(),
        String::new(),
        "```".to_string(),
    ];
    if facts.file_info.is_empty() {
        lines.push("(unavailable)".to_string());
    } else {
        lines.push(facts.file_info.clone());
    }
    lines.push("```".to_string());
    lines.push(String::new());
    lines.push("## Linked Libraries".to_string());
    lines.push(String::new());
    lines.push("```".to_string());
    if linked.trim().is_empty() {
        lines.push("(none detected)".to_string());
    } else {
        lines.push(linked.trim().to_string());
    }
    lines.push("```".to_string());
    finish(lines)
}

pub fn render_dynamic_markdown(run: &DynamicRun) -> String {
    let mut lines = vec![
        "# Dynamic Analysis".to_string(),
        String::new(),
        format!("- Generated: `{}`", run.generated_at_epoch_ms),
        format!("- Exit code: `{}`", run.exit_code),
        format!("- Timed out: `{}`", run.timed_out),
        format!("- Duration: `{}` ms", run.duration_ms),
        format!(
            "- Files created in sandbox: `{}`",
            run.file_diff.created.len()
        ),
        format!(
            "- Network endpoints observed: `{}`",
            run.observed_network_endpoints.len()
        ),
        String::new(),
        "## Command".to_string(),
        String::new(),
        "```".to_string(),
        shell_words::join(&run.argv),
        "```".to_string(),
        String::new(),
        "## Observed Processes (sample)".to_string(),
        String::new(),
    ];
    push_samples(
        &mut lines,
        &run.observed_processes,
        "- _No process samples captured._",
    );
    lines.push(String::new());
    lines.push("## Network Endpoints (sample)".to_string());
    lines.push(String::new());
    push_samples(
        &mut lines,
        &run.observed_network_endpoints,
        "- _None observed._",
    );
    finish(lines)
}

pub fn render_contract_markdown(contract: &Contract) -> String {
    let probes: Vec<&str> = contract
        .help_probe_kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect();
    let probe_line = if probes.is_empty() {
        "none".to_string()
    } else {
        probes.join(", ")
    };
    let mut lines = vec![
        "# Behavior Contract".to_string(),
        String::new(),
        format!("- Binary: `{}`", contract.binary),
        format!("- SHA256: `{}`", contract.binary_sha256),
        format!("- Runtime guess: `{}`", contract.runtime_guess.join(", ")),
        format!("- Command paths: `{}`", contract.command_paths.len()),
        format!(
            "- Top-level commands: `{}`",
            contract.top_level_commands.len()
        ),
        format!("- Max depth: `{}`", contract.max_depth),
        format!("- Help probes: `{probe_line}`"),
        String::new(),
        "## Top-Level Commands".to_string(),
        String::new(),
    ];
    if contract.top_level_commands.is_empty() {
        lines.push("- _No commands discovered._".to_string());
    } else {
        for command in contract.top_level_commands.iter().take(MAX_LIST_ITEMS) {
            lines.push(format!("- `{command}`"));
        }
    }
    finish(lines)
}

pub fn render_baseline_markdown(diff: &BaselineDiff) -> String {
    let mut lines = vec![
        "# Baseline Diff".to_string(),
        String::new(),
        format!("- Generated: `{}`", diff.generated_at_epoch_ms),
        format!("- Status: **{}**", diff.status.as_str().to_uppercase()),
        format!("- Current commands: `{}`", diff.current_count),
        format!("- Baseline commands: `{}`", diff.baseline_count),
        format!("- Overlap: `{}`", diff.overlap_count),
        String::new(),
        "## Added Commands".to_string(),
        String::new(),
    ];
    push_command_list(&mut lines, &diff.added);
    lines.push(String::new());
    lines.push("## Removed Commands".to_string());
    lines.push(String::new());
    push_command_list(&mut lines, &diff.removed);
    finish(lines)
}

pub fn render_policy_markdown(verdict: &PolicyVerdict) -> String {
    let mut lines = vec![
        "# Policy Verdict".to_string(),
        String::new(),
        format!("- Generated: `{}`", verdict.generated_at_epoch_ms),
        format!("- Verdict: **{}**", verdict.verdict.as_str()),
        format!("- Policy file: `{}`", verdict.policy_file),
        format!("- Findings: `{}`", verdict.finding_count),
        String::new(),
        "## Findings".to_string(),
        String::new(),
    ];
    if verdict.findings.is_empty() {
        lines.push("- _No policy findings._".to_string());
    } else {
        for finding in &verdict.findings {
            lines.push(format!(
                "- **{}** `{}`: {}",
                finding.severity.label(),
                finding.code,
                finding.message
            ));
        }
    }
    finish(lines)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    #[serde(rename = "static")]
    pub static_analysis: Option<String>,
    pub dynamic: Option<String>,
    pub contract: Option<String>,
    pub compare: Option<String>,
    pub policy: Option<String>,
}

/// Roll-up of which artifacts a run directory holds and the headline values
/// an operator checks first. Detail fields appear only when their artifact
/// exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub schema_version: u32,
    pub generated_at_epoch_ms: u128,
    pub artifacts: ArtifactIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_guess: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_status: Option<BaselineStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_commands: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_verdict: Option<Verdict>,
}

pub fn summary_path(out_dir: &Path) -> PathBuf {
    out_dir.join("suite-summary.json")
}

/// Index the artifacts under a run directory and lift headline values out of
/// the ones that exist.
pub fn suite_summary(out_dir: &Path) -> Result<SuiteSummary> {
    let static_path = facts::artifact_path(out_dir);
    let dynamic_path = supervise::artifact_path(out_dir);
    let contract_path = contract::artifact_path(out_dir);
    let compare_path = baseline::artifact_path(out_dir);
    let policy_path = policy::artifact_path(out_dir);

    let mut summary = SuiteSummary {
        schema_version: SUITE_SUMMARY_SCHEMA_VERSION,
        generated_at_epoch_ms: now_epoch_ms()?,
        artifacts: ArtifactIndex {
            static_analysis: present(&static_path),
            dynamic: present(&dynamic_path),
            contract: present(&contract_path),
            compare: present(&compare_path),
            policy: present(&policy_path),
        },
        command_count: None,
        runtime_guess: None,
        baseline_status: None,
        removed_commands: None,
        policy_verdict: None,
    };

    if contract_path.is_file() {
        let contract: Contract = read_json(&contract_path)?;
        summary.command_count = Some(contract.command_paths.len());
        summary.runtime_guess = Some(contract.runtime_guess);
    }
    if compare_path.is_file() {
        let diff: BaselineDiff = read_json(&compare_path)?;
        summary.baseline_status = Some(diff.status);
        summary.removed_commands = Some(diff.removed.len());
    }
    if policy_path.is_file() {
        let verdict: PolicyVerdict = read_json(&policy_path)?;
        summary.policy_verdict = Some(verdict.verdict);
    }
    Ok(summary)
}

pub fn render_summary_markdown(summary: &SuiteSummary) -> String {
    let command_count = summary
        .command_count
        .map(|count| count.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let runtime = summary
        .runtime_guess
        .as_ref()
        .map(|guess| guess.join(", "))
        .unwrap_or_else(|| "n/a".to_string());
    let baseline = summary
        .baseline_status
        .map(|status| status.as_str().to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let verdict = summary
        .policy_verdict
        .map(|verdict| verdict.as_str().to_string())
        .unwrap_or_else(|| "n/a".to_string());
    finish(vec![
        "# Suite Summary".to_string(),
        String::new(),
        format!("- Generated: `{}`", summary.generated_at_epoch_ms),
        format!("- Command count: `{command_count}`"),
        format!("- Runtime guess: `{runtime}`"),
        format!("- Baseline status: `{baseline}`"),
        format!("- Policy verdict: `{verdict}`"),
    ])
}

fn present(path: &Path) -> Option<String> {
    path.is_file().then(|| path.display().to_string())
}

fn push_samples(lines: &mut Vec<String>, items: &[String], empty_note: &str) {
    if items.is_empty() {
        lines.push(empty_note.to_string());
        return;
    }
    for item in items.iter().take(MAX_SAMPLE_ITEMS) {
        lines.push(format!("- `{}`", clip(item, MAX_SAMPLE_CHARS)));
    }
}

fn push_command_list(lines: &mut Vec<String>, commands: &[String]) {
    if commands.is_empty() {
        lines.push("_None._".to_string());
        return;
    }
    for command in commands.iter().take(MAX_LIST_ITEMS) {
        lines.push(format!("- `{command}`"));
    }
    if commands.len() > MAX_LIST_ITEMS {
        lines.push(format!("- ... ({} more)", commands.len() - MAX_LIST_ITEMS));
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn finish(lines: Vec<String>) -> String {
    let joined = lines.join("\n");
    format!("{}\n", joined.trim_end())
}
