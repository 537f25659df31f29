//! Bounded execution of a single external command.
//!
//! Every external invocation in the suite funnels through [`run_probe`]: help
//! probes against the target binary, observation tools (`ps`, `lsof`, `file`,
//! `ldd`, `strings`), and anything else that must not hang the engine. The
//! child is polled rather than waited on so an unresponsive program is killed
//! at its deadline and reported as a fact instead of an error. Output spools
//! to scratch files, never pipes, so a child that writes more than one pipe
//! buffer cannot block against its deadline.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Exit code reported when the program itself cannot be found.
pub const TOOL_MISSING_EXIT_CODE: i32 = 127;

/// Exit code reported when the deadline killed the program.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured outcome of one bounded invocation. A timeout or a missing
/// program is encoded here, not surfaced as `Err`. Streams are captured in
/// full; callers that persist them apply their own byte caps.
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u128,
}

impl ProbeOutput {
    pub fn combined_text(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Run `program` with `args`, killing it once `timeout` elapses.
///
/// When `env` is supplied the child sees exactly those variables and nothing
/// inherited. A program that cannot be spawned because it does not exist maps
/// to exit code 127 with a `tool missing:` marker on stderr.
pub fn run_probe(
    program: &Path,
    args: &[String],
    timeout: Duration,
    cwd: Option<&Path>,
    env: Option<&BTreeMap<String, String>>,
) -> Result<ProbeOutput> {
    let mut stdout_spool = tempfile::tempfile().context("create stdout spool")?;
    let mut stderr_spool = tempfile::tempfile().context("create stderr spool")?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(
            stdout_spool.try_clone().context("clone stdout spool")?,
        ))
        .stderr(Stdio::from(
            stderr_spool.try_clone().context("clone stderr spool")?,
        ));
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    if let Some(env) = env {
        cmd.env_clear();
        cmd.envs(env);
    }

    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Ok(ProbeOutput {
                exit_code: TOOL_MISSING_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("{}: {err}\n[missing tool]", program.display()),
                timed_out: false,
                duration_ms: start.elapsed().as_millis(),
            });
        }
        Err(err) => {
            return Err(err).with_context(|| format!("spawn {}", program.display()));
        }
    };

    let mut timed_out = false;
    loop {
        if child
            .try_wait()
            .with_context(|| format!("poll {}", program.display()))?
            .is_some()
        {
            break;
        }
        if start.elapsed() > timeout {
            timed_out = true;
            let _ = child.kill();
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let status = child
        .wait()
        .with_context(|| format!("collect status of {}", program.display()))?;
    let duration_ms = start.elapsed().as_millis();

    let exit_code = if timed_out {
        TIMEOUT_EXIT_CODE
    } else {
        exit_code_of(&status)
    };
    let stdout = read_spool(&mut stdout_spool)
        .with_context(|| format!("read stdout of {}", program.display()))?;
    let mut stderr = read_spool(&mut stderr_spool)
        .with_context(|| format!("read stderr of {}", program.display()))?;
    if timed_out {
        stderr.push_str("\n[timeout]");
    }

    Ok(ProbeOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration_ms,
    })
}

/// Everything the child wrote, whether it exited or was killed mid-write.
fn read_spool(spool: &mut File) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    spool.seek(SeekFrom::Start(0))?;
    spool.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Exit code with the Unix convention for signalled children: the negated
/// signal number.
pub fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
