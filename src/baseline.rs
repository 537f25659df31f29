//! Drift detection between a current contract and a stored baseline.
//!
//! The comparison is set arithmetic over command paths plus identity checks
//! on runtime guess and content hash. Removed commands fail the comparison;
//! additions and hash changes are reported but do not fail on their own.

use crate::contract::Contract;
use crate::util::now_epoch_ms;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const BASELINE_DIFF_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStatus {
    Pass,
    Fail,
}

impl BaselineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineStatus::Pass => "pass",
            BaselineStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineDiff {
    pub schema_version: u32,
    pub generated_at_epoch_ms: u128,
    pub status: BaselineStatus,
    pub current_count: usize,
    pub baseline_count: usize,
    pub overlap_count: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub runtime_changed: bool,
    pub current_runtime: Vec<String>,
    pub baseline_runtime: Vec<String>,
    pub current_sha256: String,
    pub baseline_sha256: String,
}

impl BaselineDiff {
    pub fn failed(&self) -> bool {
        self.status == BaselineStatus::Fail
    }
}

pub fn artifact_path(out_dir: &Path) -> PathBuf {
    out_dir.join("compare").join("baseline-diff.json")
}

/// Compare two contracts. The status is fail exactly when the baseline
/// advertises command paths the current contract no longer has.
pub fn diff(current: &Contract, baseline: &Contract) -> Result<BaselineDiff> {
    let current_paths: BTreeSet<&str> =
        current.command_paths.iter().map(String::as_str).collect();
    let baseline_paths: BTreeSet<&str> =
        baseline.command_paths.iter().map(String::as_str).collect();

    let added: Vec<String> = current_paths
        .difference(&baseline_paths)
        .map(|path| path.to_string())
        .collect();
    let removed: Vec<String> = baseline_paths
        .difference(&current_paths)
        .map(|path| path.to_string())
        .collect();
    let overlap_count = current_paths.intersection(&baseline_paths).count();

    let status = if removed.is_empty() {
        BaselineStatus::Pass
    } else {
        BaselineStatus::Fail
    };

    Ok(BaselineDiff {
        schema_version: BASELINE_DIFF_SCHEMA_VERSION,
        generated_at_epoch_ms: now_epoch_ms()?,
        status,
        current_count: current_paths.len(),
        baseline_count: baseline_paths.len(),
        overlap_count,
        added,
        removed,
        runtime_changed: current.runtime_guess != baseline.runtime_guess,
        current_runtime: current.runtime_guess.clone(),
        baseline_runtime: baseline.runtime_guess.clone(),
        current_sha256: current.binary_sha256.clone(),
        baseline_sha256: baseline.binary_sha256.clone(),
    })
}
