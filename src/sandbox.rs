//! Disposable sandbox directory for supervised runs.
//!
//! The sandbox is observational: it gives the child a private `HOME`, working
//! directory, and `TMPDIR` whose before/after snapshots expose file activity.
//! It does not contain the process.

use crate::util::ensure_dir;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const FALLBACK_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

pub struct Sandbox {
    root: PathBuf,
    home: PathBuf,
    work: PathBuf,
    tmp: PathBuf,
}

impl Sandbox {
    /// Build `<out_dir>/dynamic/sandbox/{home,work,tmp}`, wiping any previous
    /// sandbox tree first so every run starts from an empty state.
    pub fn create(out_dir: &Path) -> Result<Sandbox> {
        let root = out_dir.join("dynamic").join("sandbox");
        if root.exists() {
            fs::remove_dir_all(&root)
                .with_context(|| format!("remove stale sandbox {}", root.display()))?;
        }
        let sandbox = Sandbox {
            home: root.join("home"),
            work: root.join("work"),
            tmp: root.join("tmp"),
            root,
        };
        for dir in [&sandbox.home, &sandbox.work, &sandbox.tmp] {
            ensure_dir(dir)?;
        }
        Ok(sandbox)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn work(&self) -> &Path {
        &self.work
    }

    pub fn tmp(&self) -> &Path {
        &self.tmp
    }

    /// Exact child environment: the host `PATH` (or a fixed fallback), the
    /// sandbox `HOME` and `TMPDIR`, and a stable locale. Nothing else leaks
    /// in.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert(
            "PATH".to_string(),
            env::var("PATH").unwrap_or_else(|_| FALLBACK_PATH.to_string()),
        );
        vars.insert("HOME".to_string(), self.home.display().to_string());
        vars.insert("TMPDIR".to_string(), self.tmp.display().to_string());
        vars.insert("LANG".to_string(), "C.UTF-8".to_string());
        vars
    }
}
