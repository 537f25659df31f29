//! Policy loading and enforcement against a behavior contract.
//!
//! A policy is a JSON document of optional constraint fields. Evaluation
//! walks a fixed rule order and never short-circuits, so one run reports
//! every violation at once. Pattern fields are regular expressions and are
//! rejected at load time if they do not compile.

use crate::baseline::BaselineDiff;
use crate::contract::Contract;
use crate::supervise::DynamicRun;
use crate::util::{now_epoch_ms, read_json};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const POLICY_VERDICT_SCHEMA_VERSION: u32 = 1;

/// Constraint document supplied by the operator. Every field is optional;
/// an empty policy passes everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Policy {
    pub required_top_level_commands: Vec<String>,
    pub deny_command_patterns: Vec<String>,
    pub max_created_files: Option<usize>,
    pub forbid_file_path_patterns: Vec<String>,
    pub allow_network_endpoint_patterns: Vec<String>,
    pub deny_network_endpoint_patterns: Vec<String>,
    pub block_if_removed_commands: bool,
    pub min_command_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fail,
    Warn,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Fail => "FAIL",
            Severity::Warn => "WARN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl Finding {
    fn fail(code: &str, message: String) -> Self {
        Finding {
            severity: Severity::Fail,
            code: code.to_string(),
            message,
        }
    }

    fn warn(code: &str, message: String) -> Self {
        Finding {
            severity: Severity::Warn,
            code: code.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Warn => "WARN",
            Verdict::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub schema_version: u32,
    pub generated_at_epoch_ms: u128,
    pub verdict: Verdict,
    pub policy_file: String,
    pub finding_count: usize,
    pub findings: Vec<Finding>,
}

impl PolicyVerdict {
    pub fn new(policy_file: &Path, verdict: Verdict, findings: Vec<Finding>) -> Result<Self> {
        Ok(PolicyVerdict {
            schema_version: POLICY_VERDICT_SCHEMA_VERSION,
            generated_at_epoch_ms: now_epoch_ms()?,
            verdict,
            policy_file: policy_file.display().to_string(),
            finding_count: findings.len(),
            findings,
        })
    }
}

pub fn artifact_path(out_dir: &Path) -> PathBuf {
    out_dir.join("policy").join("policy-verdict.json")
}

/// Parse a policy file and verify every pattern field compiles.
pub fn load(path: &Path) -> Result<Policy> {
    let policy: Policy = read_json(path)?;
    compile_all(&policy.deny_command_patterns)?;
    compile_all(&policy.forbid_file_path_patterns)?;
    compile_all(&policy.allow_network_endpoint_patterns)?;
    compile_all(&policy.deny_network_endpoint_patterns)?;
    Ok(policy)
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).with_context(|| format!("invalid policy pattern {pattern:?}"))
        })
        .collect()
}

fn any_match(matchers: &[Regex], value: &str) -> bool {
    matchers.iter().any(|matcher| matcher.is_match(value))
}

/// Evaluate every rule in order and aggregate the verdict: any fail finding
/// makes FAIL, otherwise any finding makes WARN, otherwise PASS.
pub fn evaluate(
    policy: &Policy,
    contract: &Contract,
    dynamic: Option<&DynamicRun>,
    compare: Option<&BaselineDiff>,
) -> Result<(Verdict, Vec<Finding>)> {
    let deny_commands = compile_all(&policy.deny_command_patterns)?;
    let forbid_paths = compile_all(&policy.forbid_file_path_patterns)?;
    let allow_net = compile_all(&policy.allow_network_endpoint_patterns)?;
    let deny_net = compile_all(&policy.deny_network_endpoint_patterns)?;

    let mut findings = Vec::new();

    let top: BTreeSet<&str> = contract
        .top_level_commands
        .iter()
        .map(String::as_str)
        .collect();
    let mut missing: Vec<&str> = policy
        .required_top_level_commands
        .iter()
        .filter(|command| !top.contains(command.as_str()))
        .map(String::as_str)
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        findings.push(Finding::fail(
            "missing_required_commands",
            format!("missing required top-level commands: {}", missing.join(", ")),
        ));
    }

    for command in &contract.command_paths {
        if any_match(&deny_commands, command) {
            findings.push(Finding::fail(
                "denied_command_pattern",
                format!("denied command pattern matched: {command}"),
            ));
        }
    }

    let created_files: &[String] = dynamic
        .map(|run| run.file_diff.created.as_slice())
        .unwrap_or(&[]);
    if let Some(cap) = policy.max_created_files {
        if created_files.len() > cap {
            findings.push(Finding::fail(
                "too_many_created_files",
                format!("created files {} exceeds max {cap}", created_files.len()),
            ));
        }
    }

    for path in created_files {
        if any_match(&forbid_paths, path) {
            findings.push(Finding::fail(
                "forbidden_file_path",
                format!("forbidden created path: {path}"),
            ));
        }
    }

    let endpoints: &[String] = dynamic
        .map(|run| run.observed_network_endpoints.as_slice())
        .unwrap_or(&[]);
    if !allow_net.is_empty() {
        for endpoint in endpoints {
            if !any_match(&allow_net, endpoint) {
                findings.push(Finding::fail(
                    "network_not_allowlisted",
                    format!("network endpoint not allowlisted: {endpoint}"),
                ));
            }
        }
    }

    for endpoint in endpoints {
        if any_match(&deny_net, endpoint) {
            findings.push(Finding::fail(
                "network_denylisted",
                format!("denylisted network endpoint observed: {endpoint}"),
            ));
        }
    }

    if policy.block_if_removed_commands {
        if let Some(diff) = compare {
            if !diff.removed.is_empty() {
                findings.push(Finding::fail(
                    "removed_commands",
                    format!("commands removed vs baseline: {}", diff.removed.len()),
                ));
            }
        }
    }

    let command_count = contract.command_paths.len();
    if command_count < policy.min_command_count {
        findings.push(Finding::warn(
            "low_command_count",
            format!(
                "command count {command_count} below expected minimum {}",
                policy.min_command_count
            ),
        ));
    }

    Ok((verdict_of(&findings), findings))
}

fn verdict_of(findings: &[Finding]) -> Verdict {
    if findings
        .iter()
        .any(|finding| finding.severity == Severity::Fail)
    {
        Verdict::Fail
    } else if findings.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Warn
    }
}
