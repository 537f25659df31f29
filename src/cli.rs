//! CLI argument parsing for the contract workflow.
//!
//! The CLI is intentionally thin: each subcommand maps to one workflow entry
//! point, so the collectors stay reusable without the binary wrapper.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the contract workflow.
///
/// Keeping a single `RootArgs` type makes command routing obvious and avoids
/// hidden defaults in subcommand constructors.
#[derive(Parser, Debug)]
#[command(
    name = "bwarden",
    version,
    about = "Behavior-contract engine for third-party binaries",
    after_help = "Commands:\n  fingerprint --binary <BIN> --out-dir <DIR>   Collect static facts\n  observe --binary <BIN> --out-dir <DIR>       Supervise one sandboxed run\n  contract --binary <BIN> --out-dir <DIR>      Map the help surface into a contract\n  compare --current-dir <DIR> --baseline-dir <DIR> --out-dir <DIR>\n                                               Diff a contract against a baseline\n  enforce --run-dir <DIR> --policy-file <FILE> --out-dir <DIR>\n                                               Evaluate a policy over run artifacts\n  run --binary <BIN> --out-dir <DIR>           Full pipeline with optional gates\n\nExamples:\n  bwarden fingerprint --binary ./vendor-tool --out-dir /tmp/warden\n  bwarden observe --binary ./vendor-tool --out-dir /tmp/warden --run-args '--version'\n  bwarden contract --binary ./vendor-tool --out-dir /tmp/warden --max-depth 3\n  bwarden compare --current-dir /tmp/warden --baseline-dir /tmp/warden-v1 --out-dir /tmp/warden\n  bwarden run --binary ./vendor-tool --out-dir /tmp/warden --policy-file policy.json --fail-on-policy-fail",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Fingerprint(FingerprintArgs),
    Observe(ObserveArgs),
    Contract(ContractArgs),
    Compare(CompareArgs),
    Enforce(EnforceArgs),
    Run(RunArgs),
}

/// Fingerprint command inputs for static fact collection.
#[derive(Parser, Debug)]
#[command(about = "Collect static facts about a binary")]
pub struct FingerprintArgs {
    /// Binary under observation
    #[arg(long, value_name = "BIN")]
    pub binary: PathBuf,

    /// Directory that receives run artifacts
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Emit a verbose transcript of the workflow
    #[arg(long)]
    pub verbose: bool,
}

/// Observe command inputs for one supervised sandbox run.
#[derive(Parser, Debug)]
#[command(about = "Run the binary once inside a scratch sandbox")]
pub struct ObserveArgs {
    /// Binary under observation
    #[arg(long, value_name = "BIN")]
    pub binary: PathBuf,

    /// Directory that receives run artifacts
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Arguments passed to the binary, parsed shell-style
    #[arg(long, value_name = "STR", default_value = "--help")]
    pub run_args: String,

    /// Wall-clock budget for the run in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 8)]
    pub timeout: u64,

    /// Emit a verbose transcript of the workflow
    #[arg(long)]
    pub verbose: bool,
}

/// Contract command inputs for help-surface discovery.
#[derive(Parser, Debug)]
#[command(about = "Discover the command surface and assemble a contract")]
pub struct ContractArgs {
    /// Binary under observation
    #[arg(long, value_name = "BIN")]
    pub binary: PathBuf,

    /// Directory that receives run artifacts
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Maximum command-path depth to walk
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub max_depth: usize,

    /// Timeout for each help probe in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    pub per_probe_timeout: u64,

    /// Total discovery budget in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 120)]
    pub total_timeout: u64,

    /// Emit a verbose transcript of the workflow
    #[arg(long)]
    pub verbose: bool,
}

/// Compare command inputs for baseline drift detection.
#[derive(Parser, Debug)]
#[command(about = "Diff a current contract against a baseline contract")]
pub struct CompareArgs {
    /// Run directory holding the current contract
    #[arg(long, value_name = "DIR")]
    pub current_dir: PathBuf,

    /// Run directory holding the baseline contract
    #[arg(long, value_name = "DIR")]
    pub baseline_dir: PathBuf,

    /// Directory that receives the diff artifacts
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,
}

/// Enforce command inputs for policy evaluation.
#[derive(Parser, Debug)]
#[command(about = "Evaluate a policy file against persisted run artifacts")]
pub struct EnforceArgs {
    /// Run directory holding contract and dynamic artifacts
    #[arg(long, value_name = "DIR")]
    pub run_dir: PathBuf,

    /// Policy JSON file
    #[arg(long, value_name = "FILE")]
    pub policy_file: PathBuf,

    /// Directory that receives the verdict artifacts
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,
}

/// Run command inputs for the composed pipeline.
#[derive(Parser, Debug)]
#[command(about = "Fingerprint, observe, contract, then optionally compare and enforce")]
pub struct RunArgs {
    /// Binary under observation
    #[arg(long, value_name = "BIN")]
    pub binary: PathBuf,

    /// Directory that receives run artifacts
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Arguments passed to the binary during the supervised run
    #[arg(long, value_name = "STR", default_value = "--help")]
    pub run_args: String,

    /// Wall-clock budget for the supervised run in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 8)]
    pub timeout: u64,

    /// Maximum command-path depth to walk
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub max_depth: usize,

    /// Timeout for each help probe in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    pub per_probe_timeout: u64,

    /// Total discovery budget in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 120)]
    pub total_timeout: u64,

    /// Baseline run directory to diff against
    #[arg(long, value_name = "DIR")]
    pub baseline_dir: Option<PathBuf>,

    /// Policy JSON file to enforce
    #[arg(long, value_name = "FILE")]
    pub policy_file: Option<PathBuf>,

    /// Exit non-zero when the baseline comparison reports removed commands
    #[arg(long)]
    pub fail_on_removed: bool,

    /// Exit non-zero when the policy verdict is FAIL
    #[arg(long)]
    pub fail_on_policy_fail: bool,

    /// Emit a verbose transcript of the workflow
    #[arg(long)]
    pub verbose: bool,
}
