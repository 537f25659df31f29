//! Workflow entry points behind each CLI subcommand.
//!
//! Each entry resolves and validates its inputs, runs the collectors, persists
//! the JSON artifact plus its Markdown companion, and maps the outcome onto
//! the exit-status contract. Invalid invocations report to stderr and return
//! their exit code instead of an error, so `main` reserves failure for real
//! faults.

use crate::baseline::{self, BaselineDiff};
use crate::cli::{
    Command, CompareArgs, ContractArgs, EnforceArgs, FingerprintArgs, ObserveArgs, RootArgs,
    RunArgs,
};
use crate::contract::{self, Contract};
use crate::facts;
use crate::policy::{self, Policy, Verdict};
use crate::report;
use crate::sandbox::Sandbox;
use crate::supervise;
use crate::surface::{self, DiscoveryOptions, HelpSection};
use crate::util::{expand_user, read_json, write_json, write_text};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_POLICY_FAIL: i32 = 3;
pub const EXIT_GATE_FAIL: i32 = 4;

pub fn run(args: RootArgs) -> Result<i32> {
    match args.command {
        Command::Fingerprint(args) => run_fingerprint(args),
        Command::Observe(args) => run_observe(args),
        Command::Contract(args) => run_contract(args),
        Command::Compare(args) => run_compare(args),
        Command::Enforce(args) => run_enforce(args),
        Command::Run(args) => run_pipeline(args),
    }
}

fn run_fingerprint(args: FingerprintArgs) -> Result<i32> {
    let Some(binary) = resolve_binary(&args.binary)? else {
        return Ok(EXIT_USAGE);
    };
    let out_dir = expand_user(&args.out_dir)?;
    collect_fingerprint(&binary, &out_dir, args.verbose)?;
    Ok(EXIT_OK)
}

fn run_observe(args: ObserveArgs) -> Result<i32> {
    let Some(binary) = resolve_binary(&args.binary)? else {
        return Ok(EXIT_USAGE);
    };
    let out_dir = expand_user(&args.out_dir)?;
    collect_observation(&binary, &out_dir, &args.run_args, args.timeout, args.verbose)?;
    Ok(EXIT_OK)
}

fn run_contract(args: ContractArgs) -> Result<i32> {
    let Some(binary) = resolve_binary(&args.binary)? else {
        return Ok(EXIT_USAGE);
    };
    let out_dir = expand_user(&args.out_dir)?;
    let options = DiscoveryOptions {
        max_depth: args.max_depth,
        per_probe_timeout: Duration::from_secs(args.per_probe_timeout),
        total_timeout: Duration::from_secs(args.total_timeout),
    };
    collect_contract(&binary, &out_dir, options, args.verbose)?;
    Ok(EXIT_OK)
}

fn run_compare(args: CompareArgs) -> Result<i32> {
    let current_dir = expand_user(&args.current_dir)?;
    let baseline_dir = expand_user(&args.baseline_dir)?;
    let out_dir = expand_user(&args.out_dir)?;

    let current = match contract::load(&current_dir) {
        Ok(contract) => contract,
        Err(err) => {
            eprintln!("error: {err:#}");
            return Ok(EXIT_USAGE);
        }
    };
    let baseline = match contract::load(&baseline_dir) {
        Ok(contract) => contract,
        Err(err) => {
            eprintln!("error: {err:#}");
            return Ok(EXIT_USAGE);
        }
    };

    compare_contracts(&current, &baseline, &out_dir)?;
    Ok(EXIT_OK)
}

fn run_enforce(args: EnforceArgs) -> Result<i32> {
    let run_dir = expand_user(&args.run_dir)?;
    let policy_file = expand_user(&args.policy_file)?;
    let out_dir = expand_user(&args.out_dir)?;

    let policy = match policy::load(&policy_file) {
        Ok(policy) => policy,
        Err(err) => {
            eprintln!("error: {err:#}");
            return Ok(EXIT_USAGE);
        }
    };
    let contract = match contract::load(&run_dir) {
        Ok(contract) => contract,
        Err(err) => {
            eprintln!("error: {err:#}");
            return Ok(EXIT_USAGE);
        }
    };

    let verdict = enforce_policy(&policy, &policy_file, &contract, &run_dir, &out_dir)?;
    if verdict == Verdict::Fail {
        return Ok(EXIT_POLICY_FAIL);
    }
    Ok(EXIT_OK)
}

fn run_pipeline(args: RunArgs) -> Result<i32> {
    let Some(binary) = resolve_binary(&args.binary)? else {
        return Ok(EXIT_USAGE);
    };
    let out_dir = expand_user(&args.out_dir)?;

    // Gate inputs are validated before any collection starts so a bad
    // invocation fails without leaving partial artifacts behind.
    let policy = match &args.policy_file {
        Some(path) => {
            let path = expand_user(path)?;
            match policy::load(&path) {
                Ok(policy) => Some((path, policy)),
                Err(err) => {
                    eprintln!("error: {err:#}");
                    return Ok(EXIT_USAGE);
                }
            }
        }
        None => None,
    };
    let baseline_contract = match &args.baseline_dir {
        Some(dir) => {
            let dir = expand_user(dir)?;
            match contract::load(&dir) {
                Ok(contract) => Some(contract),
                Err(err) => {
                    eprintln!("error: {err:#}");
                    return Ok(EXIT_USAGE);
                }
            }
        }
        None => None,
    };

    collect_fingerprint(&binary, &out_dir, args.verbose)?;
    collect_observation(&binary, &out_dir, &args.run_args, args.timeout, args.verbose)?;
    let options = DiscoveryOptions {
        max_depth: args.max_depth,
        per_probe_timeout: Duration::from_secs(args.per_probe_timeout),
        total_timeout: Duration::from_secs(args.total_timeout),
    };
    let current = collect_contract(&binary, &out_dir, options, args.verbose)?;

    let mut removed_gate = false;
    if let Some(baseline) = &baseline_contract {
        let diff = compare_contracts(&current, baseline, &out_dir)?;
        if args.fail_on_removed && diff.failed() {
            removed_gate = true;
        }
    }

    let mut policy_gate = false;
    if let Some((policy_file, policy)) = &policy {
        let verdict = enforce_policy(policy, policy_file, &current, &out_dir, &out_dir)?;
        if args.fail_on_policy_fail && verdict == Verdict::Fail {
            policy_gate = true;
        }
    }

    let summary = report::suite_summary(&out_dir)?;
    let summary_path = report::summary_path(&out_dir);
    write_json(&summary_path, &summary)?;
    write_text(
        &summary_path.with_extension("md"),
        &report::render_summary_markdown(&summary),
    )?;
    println!("wrote {}", summary_path.display());

    if removed_gate || policy_gate {
        return Ok(EXIT_GATE_FAIL);
    }
    Ok(EXIT_OK)
}

/// Expand and verify the target binary. A missing target is an invocation
/// error reported on stderr, not a workflow fault.
fn resolve_binary(raw: &Path) -> Result<Option<PathBuf>> {
    let expanded = expand_user(raw)?;
    if !expanded.is_file() {
        eprintln!("error: binary not found: {}", expanded.display());
        return Ok(None);
    }
    let resolved = expanded
        .canonicalize()
        .with_context(|| format!("resolve {}", expanded.display()))?;
    Ok(Some(resolved))
}

fn parse_run_args(raw: &str) -> Result<Vec<String>> {
    let mut run_args =
        shell_words::split(raw).with_context(|| format!("parse run args {raw:?}"))?;
    if run_args.is_empty() {
        run_args.push("--help".to_string());
    }
    Ok(run_args)
}

fn collect_fingerprint(binary: &Path, out_dir: &Path, verbose: bool) -> Result<()> {
    let facts = facts::collect(binary)?;
    if verbose {
        eprintln!("hashed {} ({} bytes)", facts.binary, facts.size_bytes);
    }
    let json_path = facts::artifact_path(out_dir);
    write_json(&json_path, &facts)?;
    write_text(
        &json_path.with_extension("md"),
        &report::render_static_markdown(&facts),
    )?;
    println!("wrote {}", json_path.display());
    Ok(())
}

fn collect_observation(
    binary: &Path,
    out_dir: &Path,
    raw_run_args: &str,
    timeout_seconds: u64,
    verbose: bool,
) -> Result<()> {
    let run_args = parse_run_args(raw_run_args)?;
    let sandbox = Sandbox::create(out_dir)?;
    if verbose {
        eprintln!("sandbox root {}", sandbox.root().display());
    }
    let run = supervise::supervise(
        binary,
        &run_args,
        Duration::from_secs(timeout_seconds),
        &sandbox,
    )?;
    if verbose {
        eprintln!("child exited {} after {} ms", run.exit_code, run.duration_ms);
    }
    let json_path = supervise::artifact_path(out_dir);
    write_json(&json_path, &run)?;
    write_text(
        &json_path.with_extension("md"),
        &report::render_dynamic_markdown(&run),
    )?;
    println!("wrote {}", json_path.display());
    Ok(())
}

#[derive(Serialize)]
struct HelpSectionsArtifact {
    sections: Vec<HelpSection>,
}

fn collect_contract(
    binary: &Path,
    out_dir: &Path,
    options: DiscoveryOptions,
    verbose: bool,
) -> Result<Contract> {
    let surface = surface::discover(binary, options)?;
    if verbose {
        eprintln!(
            "mapped {} command paths from {} help sections",
            surface.command_paths.len(),
            surface.help_sections.len()
        );
    }
    let facts = match facts::load(out_dir)? {
        Some(facts) => facts,
        None => facts::minimal(binary)?,
    };
    let dynamic = supervise::load(out_dir)?;
    let contract = contract::build(&facts, &surface, dynamic.as_ref());

    let json_path = contract::artifact_path(out_dir);
    write_json(&json_path, &contract)?;
    write_text(
        &json_path.with_extension("md"),
        &report::render_contract_markdown(&contract),
    )?;
    write_json(
        &json_path.with_file_name("help-sections.json"),
        &HelpSectionsArtifact {
            sections: surface.help_sections,
        },
    )?;
    println!("wrote {}", json_path.display());
    Ok(contract)
}

fn compare_contracts(
    current: &Contract,
    baseline: &Contract,
    out_dir: &Path,
) -> Result<BaselineDiff> {
    let diff = baseline::diff(current, baseline)?;
    let json_path = baseline::artifact_path(out_dir);
    write_json(&json_path, &diff)?;
    write_text(
        &json_path.with_extension("md"),
        &report::render_baseline_markdown(&diff),
    )?;
    println!("wrote {}", json_path.display());
    Ok(diff)
}

fn enforce_policy(
    policy: &Policy,
    policy_file: &Path,
    contract: &Contract,
    run_dir: &Path,
    out_dir: &Path,
) -> Result<Verdict> {
    let dynamic = supervise::load(run_dir)?;
    let compare_path = baseline::artifact_path(run_dir);
    let compare: Option<BaselineDiff> = if compare_path.is_file() {
        Some(read_json(&compare_path)?)
    } else {
        None
    };

    let (verdict, findings) =
        policy::evaluate(policy, contract, dynamic.as_ref(), compare.as_ref())?;
    let record = policy::PolicyVerdict::new(policy_file, verdict, findings)?;
    let json_path = policy::artifact_path(out_dir);
    write_json(&json_path, &record)?;
    write_text(
        &json_path.with_extension("md"),
        &report::render_policy_markdown(&record),
    )?;
    println!("wrote {}", json_path.display());
    Ok(verdict)
}
