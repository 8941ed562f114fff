//! Two-tier cache of per-manifest dependency graphs.
//!
//! Graphs are kept in an in-process map and on disk. Both tiers are keyed by
//! the canonical manifest path and validated against the manifest's current
//! modification time, so an edit made outside the engine is picked up on the
//! next access without any notification.
//!
//! # Cache Directory Structure
//!
//! ```text
//! <cache-dir>/
//! ├── graphs/
//! │   ├── 3f1c0d9a7b...e4.json   # one file per manifest, named by path hash
//! │   └── 91aa52c04e...07.json
//! └── project-map.json           # see crate::project
//! ```
//!
//! A cache file that cannot be read or decoded is treated as a miss and
//! overwritten; a cache file that cannot be written only costs a rebuild next
//! time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use super::{DependencyGraph, GRAPH_SCHEMA_VERSION};
use crate::manifest::ExternalParserBridge;
use crate::utils::{
    modified_time_ms, read_json_file, safe_canonicalize, stable_path_hash, write_json_file,
};

/// Per-project graph cache.
///
/// Construct one per project root and share it by reference; [`clear`](Self::clear)
/// drops every in-process entry when the project is closed.
#[derive(Debug)]
pub struct DependencyGraphCache {
    graphs_dir: PathBuf,
    bridge: ExternalParserBridge,
    memory: DashMap<PathBuf, Arc<DependencyGraph>>,
}

impl DependencyGraphCache {
    /// Cache storing graph files under `<cache_dir>/graphs`.
    pub fn new(cache_dir: &Path, bridge: ExternalParserBridge) -> Self {
        Self {
            graphs_dir: cache_dir.join("graphs"),
            bridge,
            memory: DashMap::new(),
        }
    }

    /// Disk location of the cached graph for `manifest`.
    #[must_use]
    pub fn cache_file(&self, manifest: &Path) -> PathBuf {
        self.graphs_dir.join(format!("{}.json", stable_path_hash(manifest)))
    }

    /// Return the graph for `manifest`, building it on a miss.
    ///
    /// Returns `None` when the manifest does not exist or no parser produced
    /// any target.
    pub async fn get_or_build(&self, manifest: &Path) -> Option<Arc<DependencyGraph>> {
        let canonical = safe_canonicalize(manifest).ok()?;
        let mtime = modified_time_ms(&canonical)?;

        if let Some(entry) = self.memory.get(&canonical)
            && entry.mtime_ms == mtime
        {
            tracing::debug!("Graph cache hit (memory) for {}", canonical.display());
            return Some(Arc::clone(entry.value()));
        }

        if let Some(graph) = self.load_from_disk(&canonical, mtime) {
            tracing::debug!("Graph cache hit (disk) for {}", canonical.display());
            let graph = Arc::new(graph);
            self.memory.insert(canonical, Arc::clone(&graph));
            return Some(graph);
        }

        tracing::debug!("Graph cache miss for {}", canonical.display());
        self.build(&canonical, mtime).await
    }

    /// Drop both cached representations of `manifest`.
    pub fn invalidate(&self, manifest: &Path) {
        let canonical = safe_canonicalize(manifest).unwrap_or_else(|_| manifest.to_path_buf());
        self.memory.remove(&canonical);
        let file = self.cache_file(&canonical);
        if file.exists()
            && let Err(e) = std::fs::remove_file(&file)
        {
            tracing::warn!("Failed to remove graph cache {}: {}", file.display(), e);
        }
        tracing::debug!("Invalidated graph cache for {}", canonical.display());
    }

    /// Build a fresh graph for `manifest` and repopulate both tiers.
    pub async fn rebuild_and_cache(&self, manifest: &Path) -> Option<Arc<DependencyGraph>> {
        self.invalidate(manifest);
        let canonical = safe_canonicalize(manifest).ok()?;
        let mtime = modified_time_ms(&canonical)?;
        self.build(&canonical, mtime).await
    }

    /// Forget every in-process entry. Disk files stay valid for the next session.
    pub fn clear(&self) {
        self.memory.clear();
    }

    /// Number of graphs held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether no graph is held in memory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    fn load_from_disk(&self, canonical: &Path, mtime: u64) -> Option<DependencyGraph> {
        let file = self.cache_file(canonical);
        let graph: DependencyGraph = match read_json_file(&file) {
            Ok(Some(graph)) => graph,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!("Ignoring unreadable graph cache {}: {:#}", file.display(), e);
                return None;
            }
        };
        let valid = graph.schema_version == GRAPH_SCHEMA_VERSION
            && graph.mtime_ms == mtime
            && graph.package_path == canonical;
        valid.then_some(graph)
    }

    async fn build(&self, canonical: &Path, mtime: u64) -> Option<Arc<DependencyGraph>> {
        let info = match self.bridge.parse(canonical).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("No graph for {}: {}", canonical.display(), e);
                return None;
            }
        };
        let graph = Arc::new(DependencyGraph::from_package(info, canonical, mtime));

        let file = self.cache_file(canonical);
        if let Err(e) = write_json_file(&file, graph.as_ref()) {
            tracing::warn!("Failed to write graph cache {}: {:#}", file.display(), e);
        }
        self.memory.insert(canonical.to_path_buf(), Arc::clone(&graph));
        Some(graph)
    }
}
