//! Sandboxed dynamic execution under a polling supervisor.
//!
//! The child runs as the leader of a fresh process group inside the sandbox.
//! A 200 ms polling loop resolves its descendant set from the process table,
//! accumulates command lines, pids, and socket endpoints, and enforces the
//! wall-clock timeout by killing the whole group. Sampling is coarse:
//! processes that start and exit between ticks can be missed.

use crate::probe::exit_code_of;
use crate::process;
use crate::sandbox::Sandbox;
use crate::snapshot::{FileDiff, FileSnapshot};
use crate::util::{now_epoch_ms, read_json, truncate_bytes};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub const DYNAMIC_RUN_SCHEMA_VERSION: u32 = 1;

/// Byte cap for the stdout/stderr carried in the persisted record. The full
/// streams stay on disk in the sandbox spool files.
pub const MAX_STREAM_BYTES: usize = 20_000;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const KILLED_EXIT_CODE: i32 = -9;
const STDOUT_SPOOL: &str = "child-stdout.log";
const STDERR_SPOOL: &str = "child-stderr.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxPaths {
    pub root: String,
    pub home: String,
    pub work: String,
}

/// Everything observed during one supervised run. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicRun {
    pub schema_version: u32,
    pub generated_at_epoch_ms: u128,
    pub argv: Vec<String>,
    pub timeout_seconds: u64,
    pub duration_ms: u128,
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub sandbox: SandboxPaths,
    pub observed_processes: Vec<String>,
    pub observed_pids: Vec<i32>,
    pub observed_network_endpoints: Vec<String>,
    pub file_diff: FileDiff,
}

pub fn artifact_path(out_dir: &Path) -> PathBuf {
    out_dir.join("dynamic").join("dynamic-analysis.json")
}

pub fn load(out_dir: &Path) -> Result<Option<DynamicRun>> {
    let path = artifact_path(out_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let run: DynamicRun = read_json(&path)?;
    if run.schema_version != DYNAMIC_RUN_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported dynamic run schema_version {}",
            run.schema_version
        ));
    }
    Ok(Some(run))
}

/// Run `binary` with `run_args` inside the sandbox and observe it until exit
/// or timeout.
pub fn supervise(
    binary: &Path,
    run_args: &[String],
    timeout: Duration,
    sandbox: &Sandbox,
) -> Result<DynamicRun> {
    let before_home = FileSnapshot::capture(sandbox.home())?;
    let before_work = FileSnapshot::capture(sandbox.work())?;

    let mut argv = vec![binary.display().to_string()];
    argv.extend(run_args.iter().cloned());

    // Spool files live at the sandbox root, outside the snapshotted home and
    // work subtrees, so the child's own writes stay cleanly separated.
    let stdout_path = sandbox.root().join(STDOUT_SPOOL);
    let stderr_path = sandbox.root().join(STDERR_SPOOL);
    let stdout_spool = fs::File::create(&stdout_path)
        .with_context(|| format!("create {}", stdout_path.display()))?;
    let stderr_spool = fs::File::create(&stderr_path)
        .with_context(|| format!("create {}", stderr_path.display()))?;

    let env = sandbox.environment();
    let mut cmd = Command::new(binary);
    cmd.args(run_args)
        .current_dir(sandbox.work())
        .env_clear()
        .envs(&env)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_spool))
        .stderr(Stdio::from(stderr_spool));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(anyhow!("binary not found: {}", binary.display()));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("launch {}", binary.display()));
        }
    };
    let root_pid = child.id() as i32;
    tracing::debug!(pid = root_pid, "supervised child started");

    let lsof_available = which::which("lsof").is_ok();
    let mut observed_processes: BTreeSet<String> = BTreeSet::new();
    let mut observed_pids: BTreeSet<i32> = BTreeSet::new();
    let mut observed_endpoints: BTreeSet<String> = BTreeSet::new();
    let mut timed_out = false;

    let status = loop {
        if let Some(status) = child.try_wait().context("poll supervised child")? {
            break Some(status);
        }

        let elapsed = started.elapsed();
        let table = process::read_process_table();
        // When the root pid is missing from a sample, trust only the root
        // rather than chasing reparented strays.
        let live_pids = if table.iter().any(|record| record.pid == root_pid) {
            process::descendants(root_pid, &table)
        } else {
            BTreeSet::from([root_pid])
        };
        observed_pids.extend(live_pids.iter().copied());
        for record in &table {
            if live_pids.contains(&record.pid) && !record.command_line.is_empty() {
                observed_processes.insert(record.command_line.clone());
            }
        }
        if lsof_available {
            for pid in &live_pids {
                observed_endpoints.extend(process::endpoints_for_pid(*pid));
            }
        }

        if elapsed >= timeout {
            timed_out = true;
            tracing::info!(pid = root_pid, "timeout reached, killing process group");
            #[cfg(unix)]
            unsafe {
                let _ = libc::killpg(root_pid, libc::SIGKILL);
            }
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let exit_code = match status {
        Some(status) => exit_code_of(&status),
        None => {
            let _ = child.wait();
            KILLED_EXIT_CODE
        }
    };
    let duration_ms = started.elapsed().as_millis();

    let after_home = FileSnapshot::capture(sandbox.home())?;
    let after_work = FileSnapshot::capture(sandbox.work())?;
    let file_diff = FileSnapshot::diff(&before_home, &after_home)
        .prefixed("home")
        .merge(FileSnapshot::diff(&before_work, &after_work).prefixed("work"));

    let stdout_bytes = fs::read(&stdout_path)
        .with_context(|| format!("read {}", stdout_path.display()))?;
    let stderr_bytes = fs::read(&stderr_path)
        .with_context(|| format!("read {}", stderr_path.display()))?;

    Ok(DynamicRun {
        schema_version: DYNAMIC_RUN_SCHEMA_VERSION,
        generated_at_epoch_ms: now_epoch_ms()?,
        argv,
        timeout_seconds: timeout.as_secs(),
        duration_ms,
        exit_code,
        timed_out,
        stdout: truncate_bytes(&stdout_bytes, MAX_STREAM_BYTES),
        stderr: truncate_bytes(&stderr_bytes, MAX_STREAM_BYTES),
        sandbox: SandboxPaths {
            root: sandbox.root().display().to_string(),
            home: sandbox.home().display().to_string(),
            work: sandbox.work().display().to_string(),
        },
        observed_processes: observed_processes.into_iter().collect(),
        observed_pids: observed_pids.into_iter().collect(),
        observed_network_endpoints: observed_endpoints.into_iter().collect(),
        file_diff,
    })
}
