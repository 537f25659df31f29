//! Point-in-time file tree snapshots and their diffs.
//!
//! A snapshot records `(size, mtime_ns)` for every regular file under a root.
//! Two snapshots taken around a sandboxed run yield the created / modified /
//! removed sets that feed the dynamic summary and policy checks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub size_bytes: u64,
    pub mtime_ns: i128,
}

/// Sorted map of root-relative path to file stat. A missing root is an empty
/// snapshot, not an error, and anything the walk cannot read is skipped so a
/// hostile child cannot fail the run by leaving unreadable state behind.
#[derive(Debug, Clone, Default)]
pub struct FileSnapshot {
    entries: BTreeMap<String, FileStat>,
}

impl FileSnapshot {
    pub fn capture(root: &Path) -> Result<FileSnapshot> {
        let mut entries = BTreeMap::new();
        if !root.exists() {
            return Ok(FileSnapshot { entries });
        }
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(listing) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in listing {
                let Ok(entry) = entry else {
                    continue;
                };
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                let path = entry.path();
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                // Follows symlinks so a link to a regular file counts; a
                // dangling link is skipped.
                let Ok(meta) = fs::metadata(&path) else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let rel = path
                    .strip_prefix(root)
                    .with_context(|| format!("relativize {}", path.display()))?
                    .to_string_lossy()
                    .to_string();
                entries.insert(
                    rel,
                    FileStat {
                        size_bytes: meta.len(),
                        mtime_ns: mtime_ns(&meta),
                    },
                );
            }
        }
        Ok(FileSnapshot { entries })
    }

    pub fn diff(before: &FileSnapshot, after: &FileSnapshot) -> FileDiff {
        let mut created = Vec::new();
        let mut modified = Vec::new();
        for (path, stat) in &after.entries {
            match before.entries.get(path) {
                None => created.push(path.clone()),
                Some(prev) if prev != stat => modified.push(path.clone()),
                Some(_) => {}
            }
        }
        let removed = before
            .entries
            .keys()
            .filter(|path| !after.entries.contains_key(*path))
            .cloned()
            .collect();
        FileDiff {
            created,
            modified,
            removed,
        }
    }
}

fn mtime_ns(meta: &fs::Metadata) -> i128 {
    let Ok(modified) = meta.modified() else {
        return 0;
    };
    match modified.duration_since(UNIX_EPOCH) {
        Ok(after_epoch) => after_epoch.as_nanos() as i128,
        Err(before_epoch) => -(before_epoch.duration().as_nanos() as i128),
    }
}

/// Set difference of two snapshots. `modified` holds paths present in both
/// with an unequal stat pair. All three lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl FileDiff {
    /// Rebase every path under `prefix/`.
    pub fn prefixed(mut self, prefix: &str) -> FileDiff {
        for list in [&mut self.created, &mut self.modified, &mut self.removed] {
            for path in list.iter_mut() {
                *path = format!("{prefix}/{path}");
            }
        }
        self
    }

    pub fn merge(mut self, other: FileDiff) -> FileDiff {
        self.created.extend(other.created);
        self.modified.extend(other.modified);
        self.removed.extend(other.removed);
        self.created.sort();
        self.modified.sort();
        self.removed.sort();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_is_empty() {
        let snap = FileSnapshot::capture(Path::new("/nonexistent/warden-snapshot-root"))
            .expect("capture");
        assert!(snap.entries.is_empty());
    }

    #[test]
    fn unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("keep.txt"), b"kept").expect("write");
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).expect("mkdir");
        fs::write(locked.join("hidden.txt"), b"hidden").expect("write");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        let snap = FileSnapshot::capture(dir.path()).expect("capture");

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod back");
        assert!(snap.entries.contains_key("keep.txt"));
    }

    #[test]
    fn identical_snapshots_diff_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), b"alpha").expect("write");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("sub").join("b.txt"), b"beta").expect("write");
        let snap = FileSnapshot::capture(dir.path()).expect("capture");
        let diff = FileSnapshot::diff(&snap, &snap);
        assert_eq!(diff, FileDiff::default());
    }

    #[test]
    fn detects_created_modified_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("keep.txt"), b"same").expect("write");
        fs::write(dir.path().join("grow.txt"), b"v1").expect("write");
        fs::write(dir.path().join("gone.txt"), b"bye").expect("write");
        let before = FileSnapshot::capture(dir.path()).expect("capture before");

        fs::write(dir.path().join("grow.txt"), b"version-two").expect("rewrite");
        fs::remove_file(dir.path().join("gone.txt")).expect("remove");
        fs::write(dir.path().join("new.txt"), b"hello").expect("write new");
        let after = FileSnapshot::capture(dir.path()).expect("capture after");

        let diff = FileSnapshot::diff(&before, &after);
        assert_eq!(diff.created, vec!["new.txt".to_string()]);
        assert_eq!(diff.modified, vec!["grow.txt".to_string()]);
        assert_eq!(diff.removed, vec!["gone.txt".to_string()]);
    }

    #[test]
    fn prefix_and_merge_keep_sorted_paths() {
        let home = FileDiff {
            created: vec!["cache.db".to_string()],
            modified: Vec::new(),
            removed: Vec::new(),
        };
        let work = FileDiff {
            created: vec!["out.log".to_string()],
            modified: Vec::new(),
            removed: Vec::new(),
        };
        let merged = home.prefixed("home").merge(work.prefixed("work"));
        assert_eq!(
            merged.created,
            vec!["home/cache.db".to_string(), "work/out.log".to_string()]
        );
    }
}
