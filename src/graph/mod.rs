//! Target-level dependency graph of one package.
//!
//! A [`DependencyGraph`] is built from the [`PackageInfo`] of a single manifest
//! and is the unit the [cache](cache) stores and the [analyzer](analyzer) and
//! [policy engine](policy) reason about.
//!
//! Only *local* edges take part in graph algorithms: a dependency entry that can
//! name a same-package target (a bare string, `.target(name:)`, or
//! `.byName(name:)`) and that matches a target of this package. Product
//! references and names that match no local target are kept in the target's
//! dependency list but treated as unresolved here; they resolve against the
//! project-wide map instead.

pub mod analyzer;
pub mod cache;
pub mod policy;

pub use analyzer::{DependencyGraphAnalyzer, GraphAnalysis, find_path, is_reachable};
pub use cache::DependencyGraphCache;
pub use policy::{DependencyPolicyEngine, Direction, Level, PolicyDecision, PolicyVerdict};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::manifest::{Dependency, PackageDecl, PackageInfo, ProductDecl, TargetKind};

/// Version of the on-disk graph cache layout.
pub const GRAPH_SCHEMA_VERSION: u32 = 1;

/// A target node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Target name
    pub name: String,
    /// Constructor kind
    #[serde(default)]
    pub kind: TargetKind,
    /// Source path override
    #[serde(default)]
    pub path: Option<String>,
    /// Explicit source list
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    /// Declared dependencies in source order
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Dependency graph of one package, as persisted in the graph cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    /// Cache layout version
    pub schema_version: u32,
    /// Absolute manifest path
    pub package_path: PathBuf,
    /// Directory containing the manifest
    pub package_dir: PathBuf,
    /// Manifest modification time the graph was built from
    pub mtime_ms: u64,
    /// Package name
    pub package_name: String,
    /// Targets by name
    pub targets: BTreeMap<String, Target>,
    /// Target names in declaration order
    pub targets_list: Vec<String>,
    /// Top-level `.package(...)` declarations
    #[serde(default)]
    pub package_decls: Vec<PackageDecl>,
    /// Declared products
    #[serde(default)]
    pub products: Vec<ProductDecl>,
}

impl DependencyGraph {
    /// Build a graph from parsed package information.
    ///
    /// When a target name is declared twice the first declaration wins.
    #[must_use]
    pub fn from_package(info: PackageInfo, manifest: &Path, mtime_ms: u64) -> Self {
        let package_dir = manifest.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let package_name = info.name.unwrap_or_else(|| {
            package_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        });

        let mut targets = BTreeMap::new();
        let mut targets_list = Vec::with_capacity(info.targets.len());
        for t in info.targets {
            if targets.contains_key(&t.name) {
                tracing::debug!("Ignoring duplicate declaration of target '{}'", t.name);
                continue;
            }
            targets_list.push(t.name.clone());
            targets.insert(
                t.name.clone(),
                Target {
                    name: t.name,
                    kind: t.kind,
                    path: t.path,
                    sources: t.sources,
                    dependencies: t.dependencies,
                },
            );
        }

        Self {
            schema_version: GRAPH_SCHEMA_VERSION,
            package_path: manifest.to_path_buf(),
            package_dir,
            mtime_ms,
            package_name,
            targets,
            targets_list,
            package_decls: info.package_decls,
            products: info.products,
        }
    }

    /// The manifest this graph was built from.
    #[must_use]
    pub fn source_manifest_path(&self) -> &Path {
        &self.package_path
    }

    /// Whether `name` is a target of this package.
    #[must_use]
    pub fn has_target(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Distinct local targets `target` depends on directly, in declaration order.
    pub fn local_dependencies(&self, target: &str) -> Vec<&str> {
        let Some(t) = self.targets.get(target) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = Vec::new();
        for dep in &t.dependencies {
            let name = dep.name();
            if dep.may_be_local() && self.targets.contains_key(name) && !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    /// Whether `from` already lists `to` as a same-package reference.
    #[must_use]
    pub fn has_direct_dependency(&self, from: &str, to: &str) -> bool {
        self.local_dependencies(from).contains(&to)
    }

    /// Unqualified entries of `target` that match no local target.
    pub fn unresolved_references(&self, target: &str) -> Vec<&Dependency> {
        self.targets
            .get(target)
            .map(|t| {
                t.dependencies
                    .iter()
                    .filter(|d| d.is_unqualified() && !self.targets.contains_key(d.name()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reverse adjacency over local edges: target to the targets depending on it.
    pub fn dependents(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut reverse: BTreeMap<&str, Vec<&str>> =
            self.targets_list.iter().map(|n| (n.as_str(), Vec::new())).collect();
        for name in &self.targets_list {
            for dep in self.local_dependencies(name) {
                reverse.entry(dep).or_default().push(name.as_str());
            }
        }
        reverse
    }
}
