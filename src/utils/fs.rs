//! File system helpers for cache files and manifest rewrites.
//!
//! Every file the engine writes goes through [`atomic_write`], so readers see
//! either the old content or the new content and never a partially written file.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Write `content` to `path` atomically.
///
/// The bytes are written to a temporary file in the destination directory and
/// renamed over the target, creating parent directories as needed.
///
/// # Examples
///
/// ```rust,no_run
/// use spmdeps::utils::atomic_write;
/// use std::path::Path;
///
/// atomic_write(Path::new(".build/spmdeps/project-map.json"), b"{}")?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temporary file for {}", path.display()))?;
    if let Ok(metadata) = std::fs::metadata(path) {
        // keep the mode of the file being replaced
        temp.as_file()
            .set_permissions(metadata.permissions())
            .with_context(|| format!("Failed to copy permissions of {}", path.display()))?;
    }
    temp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temporary file for {}", path.display()))?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Modification time of `path` in whole milliseconds since the Unix epoch.
///
/// Returns `None` when the file is missing or the platform cannot report it.
#[must_use]
pub fn modified_time_ms(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
    u64::try_from(millis).ok()
}

/// Read and deserialize a JSON file, returning `Ok(None)` when it does not exist.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    json.push('\n');
    atomic_write(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a").join("b").join("file.txt");

        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");

        atomic_write(&path, b"replaced").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "replaced");
    }

    #[test]
    fn test_modified_time_missing_file() {
        let temp = TempDir::new().unwrap();
        assert_eq!(modified_time_ms(&temp.path().join("nope")), None);

        let file = temp.path().join("present");
        std::fs::write(&file, "x").unwrap();
        assert!(modified_time_ms(&file).is_some());
    }

    #[test]
    fn test_json_roundtrip_and_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("map.json");

        let missing: Option<BTreeMap<String, u32>> = read_json_file(&path).unwrap();
        assert!(missing.is_none());

        let mut value = BTreeMap::new();
        value.insert("Core".to_string(), 0u32);
        write_json_file(&path, &value).unwrap();

        let loaded: BTreeMap<String, u32> = read_json_file(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_read_json_reports_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result: Result<Option<BTreeMap<String, u32>>> = read_json_file(&path);
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }
}
