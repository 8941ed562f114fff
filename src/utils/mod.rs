//! Path and file utilities shared by the cache, the project map, and the patcher.
//!
//! # Modules
//!
//! - [`fs`] - Atomic writes, modification times, JSON file helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use spmdeps::utils::{atomic_write, compute_relative_path, stable_path_hash};
//! use std::path::Path;
//!
//! let key = stable_path_hash(Path::new("/work/App/Package.swift"));
//! atomic_write(Path::new("/tmp/graphs/x.json"), b"{}")?;
//! assert_eq!(compute_relative_path(Path::new("/work/App"), Path::new("/work/Core")), "../Core");
//! # let _ = key;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, anyhow};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

pub mod fs;

pub use fs::{atomic_write, modified_time_ms, read_json_file, write_json_file};

/// Normalize a path to forward slashes for storage in JSON and manifests.
#[must_use]
pub fn normalize_path_for_storage<P: AsRef<Path>>(path: P) -> String {
    path.as_ref().to_string_lossy().replace('\\', "/")
}

/// Canonicalize a path, tolerating a missing final component.
///
/// When `path` does not exist but its parent does, the canonical parent is
/// joined with the file name so cache keys stay stable for manifests that are
/// about to be created.
pub fn safe_canonicalize(path: &Path) -> anyhow::Result<PathBuf> {
    if !path.exists() {
        if let Some(parent) = path.parent()
            && parent.exists()
        {
            let canonical_parent = parent.canonicalize().with_context(|| {
                format!("Failed to canonicalize parent of '{}'", path.display())
            })?;

            if let Some(file_name) = path.file_name() {
                return Ok(canonical_parent.join(file_name));
            }
        }
        return Err(anyhow!("Path does not exist: {}", path.display()));
    }

    path.canonicalize().with_context(|| format!("Failed to canonicalize path: {}", path.display()))
}

/// Resolve `.` and `..` components without touching the file system.
///
/// ```
/// use spmdeps::utils::clean_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(clean_path(Path::new("/w/App/../Core/./Sources")), PathBuf::from("/w/Core/Sources"));
/// assert_eq!(clean_path(Path::new("../Core")), PathBuf::from("../Core"));
/// ```
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Stable hex key derived from an absolute path.
///
/// Used to name per-manifest cache files; the first 16 bytes of the SHA-256
/// digest of the normalized path are plenty for one project's manifests.
#[must_use]
pub fn stable_path_hash(path: &Path) -> String {
    let digest = Sha256::digest(normalize_path_for_storage(path).as_bytes());
    hex::encode(&digest[..16])
}

/// Whether a package location is a local file system path rather than a URL.
///
/// # Examples
///
/// ```
/// use spmdeps::utils::is_local_path;
///
/// assert!(is_local_path("../Core"));
/// assert!(is_local_path("/abs/path"));
/// assert!(is_local_path("Modules/Core"));
/// assert!(!is_local_path("https://github.com/apple/swift-log.git"));
/// assert!(!is_local_path("git@github.com:apple/swift-log.git"));
/// assert!(!is_local_path("file:///repos/swift-log"));
/// ```
#[must_use]
pub fn is_local_path(location: &str) -> bool {
    if location.contains("://") {
        return false;
    }
    // scp-like git remotes: user@host:path
    if let Some((user_host, _)) = location.split_once(':')
        && user_host.contains('@')
        && !user_host.contains('/')
    {
        return false;
    }
    true
}

/// Computes a relative path from `base` to `target`, using forward slashes.
///
/// # Examples
///
/// ```
/// use spmdeps::utils::compute_relative_path;
/// use std::path::Path;
///
/// let base = Path::new("/project/Apps/App");
/// assert_eq!(compute_relative_path(base, Path::new("/project/Apps/App/Sub")), "Sub");
/// assert_eq!(compute_relative_path(base, Path::new("/project/Packages/Core")), "../../Packages/Core");
/// ```
pub fn compute_relative_path(base: &Path, target: &Path) -> String {
    if let Ok(relative) = target.strip_prefix(base) {
        return normalize_path_for_storage(relative);
    }

    let base_components: Vec<_> = base.components().collect();
    let target_components: Vec<_> = target.components().collect();

    let common_prefix_len = base_components
        .iter()
        .zip(target_components.iter())
        .take_while(|(b, t)| b == t)
        .count();

    let mut result = PathBuf::new();
    for _ in &base_components[common_prefix_len..] {
        result.push("..");
    }
    for component in &target_components[common_prefix_len..] {
        if let Component::Normal(c) = component {
            result.push(c);
        }
    }

    normalize_path_for_storage(result)
}

/// Last path segment of a package location with any `.git` suffix removed.
///
/// This is the identity SwiftPM derives for unnamed `.package(...)` declarations.
///
/// ```
/// use spmdeps::utils::location_basename;
///
/// assert_eq!(location_basename("https://github.com/apple/swift-log.git"), Some("swift-log".to_string()));
/// assert_eq!(location_basename("../Packages/Core/"), Some("Core".to_string()));
/// assert_eq!(location_basename("git@github.com:org/Networking.git"), Some("Networking".to_string()));
/// assert_eq!(location_basename(""), None);
/// ```
#[must_use]
pub fn location_basename(location: &str) -> Option<String> {
    let trimmed = location.trim().trim_end_matches('/');
    let segment = trimmed.rsplit(['/', ':']).next()?;
    let segment = segment.strip_suffix(".git").unwrap_or(segment);
    if segment.is_empty() || segment == "." || segment == ".." {
        None
    } else {
        Some(segment.to_string())
    }
}
