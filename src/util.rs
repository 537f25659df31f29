use anyhow::{anyhow, Context, Result};
use sha2::Digest;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const HASH_CHUNK_BYTES: usize = 1024 * 1024;

pub fn truncate_bytes(bytes: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    truncate_string(&text, max_bytes)
}

/// Truncate to `max_bytes`, replacing the excess with an explicit marker so
/// capped captures are distinguishable from short ones.
pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    let dropped = text.len() - truncated.len();
    truncated.push_str(&format!("\n... [truncated {dropped} bytes]"));
    truncated
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content hash of a file, read in bounded chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = sha2::Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create {}", path.display()))?;
    Ok(())
}

/// Write a pretty-printed JSON artifact with a trailing newline, creating
/// parent directories as needed.
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes =
        serde_json::to_vec_pretty(value).with_context(|| format!("serialize {}", path.display()))?;
    bytes.push(b'\n');
    write_bytes(path, &bytes)
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    write_bytes(path, text.as_bytes())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let value =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(value)
}

/// Expand a leading `~` against the current user's home directory.
pub fn expand_user(path: &Path) -> Result<PathBuf> {
    let Some(text) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if text == "~" {
        return dirs::home_dir().ok_or_else(|| anyhow!("cannot resolve home directory"));
    }
    if let Some(rest) = text.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot resolve home directory"))?;
        return Ok(home.join(rest));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_string_returns_short_input_unchanged() {
        assert_eq!(truncate_string("hello", 16), "hello");
    }

    #[test]
    fn truncate_string_appends_marker_when_capped() {
        let out = truncate_string("abcdefgh", 4);
        assert!(out.starts_with("abcd"));
        assert!(out.contains("[truncated 4 bytes]"));
    }

    #[test]
    fn truncate_string_respects_char_boundaries() {
        let out = truncate_string("héllo", 2);
        assert!(out.starts_with('h'));
        assert!(!out.starts_with("hé"));
    }

    #[test]
    fn sha256_file_matches_in_memory_hash() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("blob");
        fs::write(&path, b"contract").expect("write blob");
        assert_eq!(
            sha256_file(&path).expect("hash file"),
            sha256_hex(b"contract")
        );
    }

    #[test]
    fn expand_user_leaves_plain_paths_alone() {
        let plain = Path::new("/usr/bin/true");
        assert_eq!(expand_user(plain).expect("expand"), plain);
    }
}
