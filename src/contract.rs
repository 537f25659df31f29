//! Behavior contract assembly and persistence.
//!
//! A contract merges the binary's identity, its discovered command surface,
//! and a coarse summary of the latest supervised run. Assembly is pure
//! structural merging with no probing or clock reads, so identical inputs
//! serialize to byte-identical JSON.

use crate::facts::StaticFacts;
use crate::supervise::DynamicRun;
use crate::surface::{CommandSurface, ProbeKind};
use crate::util::read_json;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const CONTRACT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicSummary {
    pub exit_code: Option<i32>,
    pub timed_out: Option<bool>,
    pub network_endpoint_count: usize,
    pub sandbox_file_creates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub schema_version: u32,
    pub binary: String,
    pub binary_sha256: String,
    pub runtime_guess: Vec<String>,
    pub command_paths: Vec<String>,
    pub top_level_commands: Vec<String>,
    pub max_depth: usize,
    pub help_probe_kinds: BTreeSet<ProbeKind>,
    pub help_section_count: usize,
    pub dynamic_summary: DynamicSummary,
}

/// Merge static facts, the command surface, and the most recent run into a
/// contract. A missing dynamic run leaves its summary fields empty.
pub fn build(
    facts: &StaticFacts,
    surface: &CommandSurface,
    dynamic: Option<&DynamicRun>,
) -> Contract {
    let dynamic_summary = match dynamic {
        Some(run) => DynamicSummary {
            exit_code: Some(run.exit_code),
            timed_out: Some(run.timed_out),
            network_endpoint_count: run.observed_network_endpoints.len(),
            sandbox_file_creates: run.file_diff.created.len(),
        },
        None => DynamicSummary {
            exit_code: None,
            timed_out: None,
            network_endpoint_count: 0,
            sandbox_file_creates: 0,
        },
    };
    Contract {
        schema_version: CONTRACT_SCHEMA_VERSION,
        binary: facts.binary.clone(),
        binary_sha256: facts.sha256.clone(),
        runtime_guess: facts.runtime_guess.clone(),
        command_paths: surface.command_paths.clone(),
        top_level_commands: surface.top_level_commands.clone(),
        max_depth: surface.max_depth,
        help_probe_kinds: surface.probe_kinds.clone(),
        help_section_count: surface.help_sections.len(),
        dynamic_summary,
    }
}

pub fn artifact_path(out_dir: &Path) -> PathBuf {
    out_dir.join("contract").join("contract.json")
}

/// Load a persisted contract from a run directory, accepting either the
/// nested layout this tool writes or a bare `contract.json`.
pub fn load(dir: &Path) -> Result<Contract> {
    let nested = artifact_path(dir);
    let flat = dir.join("contract.json");
    let target = if nested.is_file() { nested } else { flat };
    if !target.is_file() {
        return Err(anyhow!("contract not found under {}", dir.display()));
    }
    let contract: Contract = read_json(&target)?;
    if contract.schema_version != CONTRACT_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported contract schema_version {}",
            contract.schema_version
        ));
    }
    Ok(contract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FileDiff;
    use crate::supervise::SandboxPaths;
    use crate::util::write_json;

    fn sample_facts() -> StaticFacts {
        StaticFacts {
            schema_version: 1,
            generated_at_epoch_ms: 0,
            binary: "/opt/tools/acme".to_string(),
            size_bytes: 1_024,
            sha256: "deadbeef".to_string(),
            file_info: String::new(),
            linked_libraries: Vec::new(),
            runtime_guess: vec!["Go".to_string()],
            zip_local_header_count: 0,
            strings_sample_count: 0,
            strings_total_count: 0,
        }
    }

    fn sample_surface() -> CommandSurface {
        CommandSurface {
            command_paths: vec!["scan".to_string(), "scan deep".to_string()],
            top_level_commands: vec!["scan".to_string()],
            help_sections: Vec::new(),
            probe_kinds: BTreeSet::from([ProbeKind::LongHelp]),
            max_depth: 2,
            timed_out: false,
        }
    }

    fn sample_run() -> DynamicRun {
        DynamicRun {
            schema_version: 1,
            generated_at_epoch_ms: 0,
            argv: vec!["/opt/tools/acme".to_string(), "--help".to_string()],
            timeout_seconds: 8,
            duration_ms: 120,
            exit_code: 0,
            timed_out: false,
            stdout: String::new(),
            stderr: String::new(),
            sandbox: SandboxPaths {
                root: "/tmp/s".to_string(),
                home: "/tmp/s/home".to_string(),
                work: "/tmp/s/work".to_string(),
            },
            observed_processes: vec!["acme --help".to_string()],
            observed_pids: vec![4242],
            observed_network_endpoints: vec!["TCP 1.2.3.4:443".to_string()],
            file_diff: FileDiff {
                created: vec!["home/cache.db".to_string(), "work/out.txt".to_string()],
                modified: Vec::new(),
                removed: Vec::new(),
            },
        }
    }

    #[test]
    fn identical_inputs_build_byte_identical_contracts() {
        let facts = sample_facts();
        let surface = sample_surface();
        let run = sample_run();
        let first = serde_json::to_vec(&build(&facts, &surface, Some(&run))).expect("serialize");
        let second = serde_json::to_vec(&build(&facts, &surface, Some(&run))).expect("serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn dynamic_summary_reflects_the_run() {
        let contract = build(&sample_facts(), &sample_surface(), Some(&sample_run()));
        assert_eq!(contract.dynamic_summary.exit_code, Some(0));
        assert_eq!(contract.dynamic_summary.timed_out, Some(false));
        assert_eq!(contract.dynamic_summary.network_endpoint_count, 1);
        assert_eq!(contract.dynamic_summary.sandbox_file_creates, 2);
    }

    #[test]
    fn missing_dynamic_run_leaves_summary_empty() {
        let contract = build(&sample_facts(), &sample_surface(), None);
        assert_eq!(contract.dynamic_summary.exit_code, None);
        assert_eq!(contract.dynamic_summary.timed_out, None);
        assert_eq!(contract.dynamic_summary.network_endpoint_count, 0);
        assert_eq!(contract.dynamic_summary.sandbox_file_creates, 0);
    }

    #[test]
    fn load_accepts_nested_and_flat_layouts() {
        let contract = build(&sample_facts(), &sample_surface(), None);

        let nested = tempfile::tempdir().expect("tempdir");
        write_json(&artifact_path(nested.path()), &contract).expect("write nested");
        assert_eq!(
            load(nested.path()).expect("load nested").binary_sha256,
            "deadbeef"
        );

        let flat = tempfile::tempdir().expect("tempdir");
        write_json(&flat.path().join("contract.json"), &contract).expect("write flat");
        assert_eq!(
            load(flat.path()).expect("load flat").binary_sha256,
            "deadbeef"
        );
    }

    #[test]
    fn load_reports_missing_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(dir.path()).expect_err("must fail");
        assert!(err.to_string().contains("contract not found"));
    }
}
