//! File system helpers

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;
use crate::utils::dates;

/// Create `dir` and its parents if missing
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_` and collapse runs
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Remove a directory tree. Returns false when it did not exist.
pub fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(dir)?;
    Ok(true)
}

/// Recursively copy `src` into `dst`, returning the number of files copied
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                ensure_dir(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Move `src` to `dst`, replacing `dst`. Falls back to copy + delete when a
/// rename crosses file systems.
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    remove_dir_if_exists(dst)?;
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    if std::fs::rename(src, dst).is_err() {
        copy_dir_all(src, dst)?;
        std::fs::remove_dir_all(src)?;
    }
    Ok(())
}

/// Files directly under `dir` with the given extension, sorted by path
pub fn list_files(dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let wanted = match extension {
            Some(ext) => path.extension().map(|e| e == ext).unwrap_or(false),
            None => true,
        };
        if wanted {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Delete files under `dir` (recursively) last modified more than `age` ago.
/// Returns the deleted paths.
pub fn prune_older_than(dir: &Path, age: Duration, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut removed = Vec::new();
    if !dir.exists() {
        return Ok(removed);
    }

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(ext) = extension {
            if path.extension().map(|e| e != ext).unwrap_or(true) {
                continue;
            }
        }
        let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
        if let Some(modified) = modified {
            if dates::is_older_than(modified, age, now) {
                std::fs::remove_file(path)?;
                debug!("Pruned {}", path.display());
                removed.push(path.to_path_buf());
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("search works", "search_works")]
    #[test_case("a/b\\c:d", "a_b_c_d")]
    #[test_case("  ??  ", "unnamed")]
    #[test_case("report-v1.2", "report-v1.2")]
    fn test_sanitize_file_name(input: &str, expected: &str) {
        assert_eq!(sanitize_file_name(input), expected);
    }

    #[test]
    fn test_json_roundtrip_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/data.json");
        write_json(&path, &serde_json::json!({ "query": "rust" })).unwrap();
        let value: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(value["query"], "rust");
    }

    #[test]
    fn test_move_dir_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("out");
        let dst = dir.path().join("reports/final");
        std::fs::create_dir_all(src.join("data")).unwrap();
        std::fs::write(src.join("index.html"), "<html/>").unwrap();
        std::fs::write(src.join("data/a.json"), "{}").unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(dst.join("stale.html"), "old").unwrap();

        move_dir(&src, &dst).unwrap();

        assert!(!src.exists());
        assert!(dst.join("index.html").exists());
        assert!(dst.join("data/a.json").exists());
        assert!(!dst.join("stale.html").exists());
    }

    #[test]
    fn test_prune_keeps_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fresh.log"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let removed = prune_older_than(dir.path(), Duration::from_secs(3600), Some("log")).unwrap();
        assert!(removed.is_empty());

        let stale = dir.path().join("stale.log");
        std::fs::write(&stale, "x").unwrap();
        let ten_days_ago = std::time::SystemTime::now() - Duration::from_secs(10 * 24 * 3600);
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(ten_days_ago)
            .unwrap();

        let removed = prune_older_than(dir.path(), Duration::from_secs(7 * 24 * 3600), Some("log")).unwrap();
        assert_eq!(removed, vec![stale.clone()]);
        assert!(!stale.exists());
        assert!(dir.path().join("fresh.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_list_files_filters_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), "").unwrap();
        std::fs::write(dir.path().join("a.png"), "").unwrap();
        std::fs::write(dir.path().join("c.json"), "").unwrap();

        let pngs = list_files(dir.path(), Some("png")).unwrap();
        assert_eq!(pngs, vec![dir.path().join("a.png"), dir.path().join("b.png")]);
        assert_eq!(list_files(dir.path(), None).unwrap().len(), 3);
        assert!(list_files(&dir.path().join("missing"), None).unwrap().is_empty());
    }
}
