//! Static fingerprinting of the target binary.
//!
//! Every facet is best-effort: a missing host tool (`file`, `otool`, `ldd`,
//! `strings`) degrades that facet to empty output while the rest of the
//! record is still collected. Only the content hash and size are mandatory.

use crate::probe::run_probe;
use crate::util::{now_epoch_ms, read_json, sha256_file};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STATIC_FACTS_SCHEMA_VERSION: u32 = 1;

const FILE_TIMEOUT: Duration = Duration::from_secs(10);
const LINKED_TIMEOUT: Duration = Duration::from_secs(10);
const STRINGS_TIMEOUT: Duration = Duration::from_secs(90);
const STRINGS_SAMPLE_CAP: usize = 5_000;
const ZIP_SIG: &[u8] = b"PK\x03\x04";
const ZIP_SCAN_CHUNK_BYTES: usize = 4 * 1024 * 1024;

const RUNTIME_HINTS: [(&str, &str); 7] = [
    (
        "Go",
        r"runtime\.morestack|go\.buildid|\bgo1\.\d+|golang\.org/|\bGOROOT\b",
    ),
    (
        "Python",
        r"libpython|python\d+\.\d+|Py_Initialize|Python\.framework",
    ),
    (
        "Rust",
        r"rustc/\d+\.\d+\.\d+|core::panicking|alloc::|std::panicking|cargo:",
    ),
    ("Node.js", r"NODE_MODULE_VERSION|libnode|node:internal|npm_"),
    ("JVM", r"java/lang/|JNI_OnLoad|ClassNotFoundException|kotlin/"),
    (
        ".NET",
        r"CoreCLR|clrjit|mscoree|System\.Collections|Microsoft\.NET",
    ),
    (
        "C/C++",
        r"GLIBCXX_|CXXABI_|libstdc\+\+|libc\+\+|__cxa_throw",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFacts {
    pub schema_version: u32,
    pub generated_at_epoch_ms: u128,
    pub binary: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub file_info: String,
    pub linked_libraries: Vec<String>,
    pub runtime_guess: Vec<String>,
    pub zip_local_header_count: usize,
    pub strings_sample_count: usize,
    pub strings_total_count: usize,
}

pub fn artifact_path(out_dir: &Path) -> PathBuf {
    out_dir.join("static").join("static-analysis.json")
}

/// Full collection pass over the binary.
pub fn collect(binary: &Path) -> Result<StaticFacts> {
    let meta =
        fs::metadata(binary).with_context(|| format!("stat {}", binary.display()))?;
    let binary_arg = binary.display().to_string();

    let file_info = if which::which("file").is_ok() {
        let out = run_probe(
            Path::new("file"),
            std::slice::from_ref(&binary_arg),
            FILE_TIMEOUT,
            None,
            None,
        )?;
        out.stdout.trim().to_string()
    } else {
        String::new()
    };

    let linked = if which::which("otool").is_ok() {
        run_probe(
            Path::new("otool"),
            &["-L".to_string(), binary_arg.clone()],
            LINKED_TIMEOUT,
            None,
            None,
        )?
        .stdout
    } else if which::which("ldd").is_ok() {
        run_probe(
            Path::new("ldd"),
            std::slice::from_ref(&binary_arg),
            LINKED_TIMEOUT,
            None,
            None,
        )?
        .stdout
    } else {
        String::new()
    };

    let (strings_lines, strings_blob) = extract_strings(binary)?;

    let detected = detect_runtimes(&strings_blob, &linked, &file_info);
    let runtime_guess = if detected.is_empty() {
        vec!["unknown".to_string()]
    } else {
        detected
    };

    let linked_libraries = linked
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    Ok(StaticFacts {
        schema_version: STATIC_FACTS_SCHEMA_VERSION,
        generated_at_epoch_ms: now_epoch_ms()?,
        binary: binary_arg,
        size_bytes: meta.len(),
        sha256: sha256_file(binary)?,
        file_info,
        linked_libraries,
        runtime_guess,
        zip_local_header_count: count_zip_signatures(binary)?,
        strings_sample_count: strings_lines.len().min(STRINGS_SAMPLE_CAP),
        strings_total_count: strings_lines.len(),
    })
}

/// Identity-only record used when contract assembly finds no persisted
/// static facts: hash, size, and an unknown runtime, with no tool runs.
pub fn minimal(binary: &Path) -> Result<StaticFacts> {
    let meta =
        fs::metadata(binary).with_context(|| format!("stat {}", binary.display()))?;
    Ok(StaticFacts {
        schema_version: STATIC_FACTS_SCHEMA_VERSION,
        generated_at_epoch_ms: now_epoch_ms()?,
        binary: binary.display().to_string(),
        size_bytes: meta.len(),
        sha256: sha256_file(binary)?,
        file_info: String::new(),
        linked_libraries: Vec::new(),
        runtime_guess: vec!["unknown".to_string()],
        zip_local_header_count: 0,
        strings_sample_count: 0,
        strings_total_count: 0,
    })
}

pub fn load(out_dir: &Path) -> Result<Option<StaticFacts>> {
    let path = artifact_path(out_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let facts: StaticFacts = read_json(&path)?;
    if facts.schema_version != STATIC_FACTS_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported static facts schema_version {}",
            facts.schema_version
        ));
    }
    Ok(Some(facts))
}

fn extract_strings(binary: &Path) -> Result<(Vec<String>, String)> {
    if which::which("strings").is_err() {
        return Ok((Vec::new(), String::new()));
    }
    let out = run_probe(
        Path::new("strings"),
        &["-a".to_string(), binary.display().to_string()],
        STRINGS_TIMEOUT,
        None,
        None,
    )?;
    if out.exit_code != 0 {
        return Ok((Vec::new(), String::new()));
    }
    let lines = out.stdout.lines().map(str::to_string).collect();
    Ok((lines, out.stdout))
}

/// Match runtime fingerprints over the combined strings/libraries/file-info
/// corpus. Empty result means nothing was recognized.
pub fn detect_runtimes(strings_blob: &str, linked_blob: &str, file_blob: &str) -> Vec<String> {
    let corpus = format!("{strings_blob}\n{linked_blob}\n{file_blob}");
    let mut hits = BTreeSet::new();
    for (name, pattern) in RUNTIME_HINTS {
        let matcher = Regex::new(&format!("(?i){pattern}")).expect("regex for runtime hints");
        if matcher.is_match(&corpus) {
            hits.insert(name.to_string());
        }
    }
    hits.into_iter().collect()
}

/// Count ZIP local-header signatures in the raw bytes, reading in chunks and
/// carrying a three-byte tail so boundary-spanning signatures still count.
fn count_zip_signatures(path: &Path) -> Result<usize> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = vec![0u8; ZIP_SCAN_CHUNK_BYTES];
    let mut tail: Vec<u8> = Vec::new();
    let mut count = 0;
    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }
        let mut window = tail.clone();
        window.extend_from_slice(&buf[..read]);
        count += window
            .windows(ZIP_SIG.len())
            .filter(|chunk| *chunk == ZIP_SIG)
            .count();
        let keep = window.len().saturating_sub(ZIP_SIG.len() - 1);
        tail = window[keep..].to_vec();
    }
    Ok(count)
}
