//! Discovery of `Package.swift` manifests under a project root.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use super::MANIFEST_FILENAME;

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] =
    &[".build", ".git", ".swiftpm", "DerivedData", "Pods", "Carthage", "node_modules"];

/// Walks a project tree collecting manifests.
#[derive(Debug, Clone)]
pub struct ManifestScanner {
    root: PathBuf,
    extra_excludes: Vec<PathBuf>,
}

impl ManifestScanner {
    /// Scanner rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extra_excludes: Vec::new(),
        }
    }

    /// Also skip everything below `dir` (the engine's own cache directory).
    #[must_use]
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_excludes.push(dir.into());
        self
    }

    /// Absolute paths of every manifest found, sorted for deterministic output.
    ///
    /// Unreadable directories are skipped with a debug log rather than
    /// aborting the scan.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut manifests: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry during manifest scan: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILENAME)
            .map(DirEntry::into_path)
            .collect();
        manifests.sort();
        tracing::debug!("Found {} manifest(s) under {}", manifests.len(), self.root.display());
        manifests
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        EXCLUDED_DIRS.contains(&name.as_ref())
            || self.extra_excludes.iter().any(|dir| entry.path().starts_with(dir))
    }

    /// The scan root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
