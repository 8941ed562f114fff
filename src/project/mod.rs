//! Project-wide, multi-package dependency map.
//!
//! [`ProjectDependencyMapStore`] scans every manifest under a project root and
//! persists what it learns in one JSON side file,
//! `<cache-dir>/project-map.json`:
//!
//! - `packages`: package name to manifest location and targets
//! - `products`: product name to owning package, from `products: [...]`
//!   declarations and from `.product(name:package:)` usage sites
//! - `packageSources`: package name to the URL or path it is declared with
//! - `graph`: the package-level [`ProjectGraph`]
//!
//! The three lookup tables are merged, never blindly overwritten: an existing
//! entry that conflicts with a new discovery is kept (with a warning) unless
//! conflict overrides are enabled, so manual corrections survive re-scans. The
//! `graph` section is derived data and is replaced on every update.
//!
//! # Example
//!
//! ```rust,no_run
//! use spmdeps::config::EngineConfig;
//! use spmdeps::project::{ProjectDependencyMapStore, UpdateOptions};
//! use std::path::Path;
//!
//! let root = Path::new("/work/MyApp");
//! let config = EngineConfig::load(root)?;
//! let store = ProjectDependencyMapStore::new(root, &config.cache_dir(root), config.project_map.clone());
//! let summary = store.update(&UpdateOptions::default())?;
//! println!("scanned {} manifests, changed: {}", summary.scanned, summary.changed);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProjectMapConfig;
use crate::manifest::{ManifestParser, ManifestScanner, PackageDecl, PackageProvenance, ProductDecl};
use crate::utils::{
    clean_path, compute_relative_path, is_local_path, location_basename,
    normalize_path_for_storage, read_json_file, write_json_file,
};

/// File name of the project map inside the cache directory.
pub const PROJECT_MAP_FILENAME: &str = "project-map.json";

/// Version of the project map layout.
pub const PROJECT_MAP_SCHEMA_VERSION: u32 = 1;

/// A package found in the project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageEntry {
    /// Directory holding the manifest
    pub package_dir: String,
    /// Manifest path
    pub package_swift_path: String,
    /// Target names, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
}

/// Owner of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEntry {
    /// Always `"product"`
    pub kind: String,
    /// Product name
    pub name: String,
    /// Owning package
    pub package: String,
    /// Targets the product exposes, when declared in the project
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

impl ProductEntry {
    fn new(name: &str, package: &str, targets: Vec<String>) -> Self {
        Self {
            kind: "product".to_string(),
            name: name.to_string(),
            package: package.to_string(),
            targets,
        }
    }
}

/// Where a package is declared from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSource {
    /// Remote URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Absolute path for local declarations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Version requirement as declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
}

impl PackageSource {
    fn same_location(&self, other: &Self) -> bool {
        self.url == other.url && self.path == other.path
    }
}

/// Enforcement policy recorded alongside the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPolicy {
    /// What happens on violation
    pub enforcement: String,
    /// Rule enforced
    pub rule: String,
}

impl Default for MapPolicy {
    fn default() -> Self {
        Self {
            enforcement: "block".to_string(),
            rule: "no_package_cycle".to_string(),
        }
    }
}

/// A node of the package-level graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPackage {
    /// Directory holding the manifest
    pub package_dir: String,
    /// Manifest path
    pub manifest_path: String,
    /// Target names
    pub targets: Vec<String>,
}

/// Package-level dependency graph of the whole project.
///
/// An edge `A -> B` means A's manifest declares a usable reference to B, either
/// a `.package(...)` declaration or a `.product(package:)` usage. Only packages
/// found in the project tree become nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectGraph {
    /// Packages by name
    pub packages: BTreeMap<String, GraphPackage>,
    /// Outgoing edges by package name
    pub edges: BTreeMap<String, Vec<String>>,
    /// Relative path declarations: declaring package to target package to path
    pub path_decls: BTreeMap<String, BTreeMap<String, String>>,
    /// When the graph was built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    /// Root that was scanned
    #[serde(default)]
    pub project_root: String,
}

impl ProjectGraph {
    /// Shortest package chain from `from` to `to`, both ends included.
    #[must_use]
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
        let mut seen: HashSet<&str> = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for next in self.edges.get(current).into_iter().flatten() {
                let next = next.as_str();
                if !seen.insert(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut cursor = to;
                    while let Some(&p) = parent.get(cursor) {
                        path.push(p.to_string());
                        cursor = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// The cycle an edge `from -> to` would close, as a package path starting
    /// and ending at `from`.
    #[must_use]
    pub fn cycle_through(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let back = self.find_path(to, from)?;
        let mut cycle = vec![from.to_string()];
        cycle.extend(back);
        Some(cycle)
    }

    /// Name of the package whose manifest is `manifest`.
    #[must_use]
    pub fn package_for_manifest(&self, manifest: &Path) -> Option<&str> {
        let wanted = normalize_path_for_storage(manifest);
        self.packages
            .iter()
            .find(|(_, p)| p.manifest_path == wanted)
            .map(|(name, _)| name.as_str())
    }
}

/// The persisted project map document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMap {
    /// Layout version
    pub schema_version: u32,
    /// Package lookup table
    #[serde(default)]
    pub packages: BTreeMap<String, PackageEntry>,
    /// Product lookup table
    #[serde(default)]
    pub products: BTreeMap<String, ProductEntry>,
    /// Package provenance table
    #[serde(default)]
    pub package_sources: BTreeMap<String, PackageSource>,
    /// Enforcement policy
    #[serde(default)]
    pub policy: MapPolicy,
    /// Derived package graph
    #[serde(default)]
    pub graph: ProjectGraph,
}

impl Default for ProjectMap {
    fn default() -> Self {
        Self {
            schema_version: PROJECT_MAP_SCHEMA_VERSION,
            packages: BTreeMap::new(),
            products: BTreeMap::new(),
            package_sources: BTreeMap::new(),
            policy: MapPolicy::default(),
            graph: ProjectGraph::default(),
        }
    }
}

/// Package and product that provide a requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOwner {
    /// Owning package
    pub package: String,
    /// Product to depend on
    pub product: String,
}

impl ProjectMap {
    /// Which package provides `name`, either as a product or as a target.
    #[must_use]
    pub fn owner_of(&self, name: &str) -> Option<TargetOwner> {
        if let Some(product) = self.products.get(name) {
            return Some(TargetOwner {
                package: product.package.clone(),
                product: product.name.clone(),
            });
        }
        let (package, _) = self
            .packages
            .iter()
            .find(|(_, p)| p.targets.as_ref().is_some_and(|t| t.iter().any(|t| t == name)))?;
        let product = self
            .products
            .values()
            .find(|p| p.package == *package && p.targets.iter().any(|t| t == name))
            .map_or_else(|| name.to_string(), |p| p.name.clone());
        Some(TargetOwner {
            package: package.clone(),
            product,
        })
    }

    /// How a manifest at `manifest` should declare `package`.
    ///
    /// Packages inside the project tree are always declared by a path relative
    /// to the manifest's directory.
    #[must_use]
    pub fn provenance_for(&self, package: &str, manifest: &Path) -> PackageProvenance {
        let base = manifest.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let local = self
            .packages
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(package))
            .map(|(_, entry)| entry);
        if let Some(entry) = local {
            return PackageProvenance::Path {
                relative: compute_relative_path(&base, Path::new(&entry.package_dir)),
            };
        }
        let source = self
            .package_sources
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(package))
            .map(|(_, source)| source);
        match source {
            Some(PackageSource {
                url: Some(url),
                requirement,
                ..
            }) => PackageProvenance::Url {
                url: url.clone(),
                requirement: requirement.clone(),
            },
            Some(PackageSource {
                path: Some(path),
                ..
            }) => PackageProvenance::Path {
                relative: compute_relative_path(&base, Path::new(path)),
            },
            _ => PackageProvenance::Unknown,
        }
    }

    /// Copy with the volatile timestamp removed, for change detection.
    fn without_timestamp(&self) -> Self {
        let mut copy = self.clone();
        copy.graph.generated_at = None;
        copy
    }
}

/// Flags for one [`ProjectDependencyMapStore::update`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Infer names for `.package(...)` declarations without one
    pub aggressive: bool,
    /// Let new discoveries replace conflicting lookup entries
    pub override_conflicts: bool,
}

impl From<&ProjectMapConfig> for UpdateOptions {
    fn from(config: &ProjectMapConfig) -> Self {
        Self {
            aggressive: config.aggressive,
            override_conflicts: config.override_conflicts,
        }
    }
}

/// Result of one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    /// Whether the persisted document changed (ignoring the timestamp)
    pub changed: bool,
    /// Number of manifests scanned
    pub scanned: usize,
}

/// One manifest's contribution to the map.
struct Discovery {
    name: String,
    dir: PathBuf,
    manifest: PathBuf,
    targets: Vec<String>,
    products: Vec<ProductDecl>,
    usages: Vec<(String, String)>,
    decls: Vec<PackageDecl>,
}

/// Reads, merges, and persists the project map.
#[derive(Debug)]
pub struct ProjectDependencyMapStore {
    project_root: PathBuf,
    cache_dir: PathBuf,
    config: ProjectMapConfig,
    last_refresh: Mutex<Option<Instant>>,
}

impl ProjectDependencyMapStore {
    /// Store for `project_root` persisting under `cache_dir`.
    pub fn new(project_root: &Path, cache_dir: &Path, config: ProjectMapConfig) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
            config,
            last_refresh: Mutex::new(None),
        }
    }

    /// Location of the map file.
    #[must_use]
    pub fn map_path(&self) -> PathBuf {
        self.cache_dir.join(PROJECT_MAP_FILENAME)
    }

    /// Read the persisted map, or an empty one when none exists yet.
    pub fn load(&self) -> Result<ProjectMap> {
        Ok(read_json_file(&self.map_path())?.unwrap_or_default())
    }

    /// Update unless the last refresh happened within the configured interval.
    ///
    /// `force` bypasses the throttle. Returns `None` when the refresh was
    /// skipped.
    pub fn refresh(&self, force: bool) -> Result<Option<UpdateSummary>> {
        {
            let last = self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner);
            if !force
                && let Some(at) = *last
                && at.elapsed() < self.config.refresh_interval()
            {
                tracing::debug!("Project map refreshed {:?} ago, skipping", at.elapsed());
                return Ok(None);
            }
        }
        let summary = self.update(&UpdateOptions::from(&self.config))?;
        *self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        Ok(Some(summary))
    }

    /// [`refresh`](Self::refresh) on the blocking thread pool, for async
    /// callers.
    pub async fn refresh_async(self: Arc<Self>, force: bool) -> Result<Option<UpdateSummary>> {
        tokio::task::spawn_blocking(move || self.refresh(force))
            .await
            .context("Project map refresh task failed")?
    }

    /// Scan the project and merge discoveries into the persisted map.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing map file cannot be decoded or the
    /// merged map cannot be written.
    pub fn update(&self, options: &UpdateOptions) -> Result<UpdateSummary> {
        let manifests = ManifestScanner::new(&self.project_root).exclude(&self.cache_dir).scan();
        let discoveries: Vec<Discovery> = manifests.iter().filter_map(|m| discover(m)).collect();

        let previous = read_json_file::<ProjectMap>(&self.map_path())?;
        let mut map = previous.clone().unwrap_or_default();
        map.schema_version = PROJECT_MAP_SCHEMA_VERSION;

        for d in &discoveries {
            merge_package(&mut map, d, options);
        }
        for d in &discoveries {
            for product in &d.products {
                let entry = ProductEntry::new(&product.name, &d.name, product.targets.clone());
                merge_product(&mut map, entry, options);
            }
        }
        for d in &discoveries {
            for (product, package) in &d.usages {
                merge_product(&mut map, ProductEntry::new(product, package, Vec::new()), options);
            }
            for decl in &d.decls {
                merge_source(&mut map, &d.dir, decl, options);
            }
        }

        map.graph = build_graph(&self.project_root, &discoveries);

        let changed = previous.as_ref().map(ProjectMap::without_timestamp)
            != Some(map.without_timestamp());
        if changed {
            write_json_file(&self.map_path(), &map)?;
            tracing::info!(
                "Wrote project map {} ({} packages, {} products)",
                self.map_path().display(),
                map.packages.len(),
                map.products.len()
            );
        }
        Ok(UpdateSummary {
            changed,
            scanned: manifests.len(),
        })
    }
}

fn discover(manifest: &Path) -> Option<Discovery> {
    let text = match std::fs::read_to_string(manifest) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Skipping unreadable manifest {}: {}", manifest.display(), e);
            return None;
        }
    };
    let parsed = ManifestParser::parse_structure(&text);
    let dir = manifest.parent()?.to_path_buf();
    let name = parsed
        .package
        .name
        .clone()
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))?;
    let usages = parsed
        .package
        .product_usages()
        .into_iter()
        .map(|(product, package)| (product.to_string(), package.to_string()))
        .collect();
    Some(Discovery {
        name,
        targets: parsed.package.targets.iter().map(|t| t.name.clone()).collect(),
        manifest: manifest.to_path_buf(),
        dir,
        products: parsed.package.products,
        usages,
        decls: parsed.package.package_decls,
    })
}

fn merge_package(map: &mut ProjectMap, d: &Discovery, options: &UpdateOptions) {
    let entry = PackageEntry {
        package_dir: normalize_path_for_storage(&d.dir),
        package_swift_path: normalize_path_for_storage(&d.manifest),
        targets: Some(d.targets.clone()),
    };
    match map.packages.get_mut(&d.name) {
        None => {
            map.packages.insert(d.name.clone(), entry);
        }
        Some(existing) if existing.package_swift_path == entry.package_swift_path => {
            existing.targets = entry.targets;
        }
        Some(existing) => {
            if options.override_conflicts {
                *existing = entry;
            } else {
                tracing::warn!(
                    "Package '{}' at {} conflicts with recorded {}; keeping the recorded entry",
                    d.name,
                    entry.package_swift_path,
                    existing.package_swift_path
                );
            }
        }
    }
}

fn merge_product(map: &mut ProjectMap, entry: ProductEntry, options: &UpdateOptions) {
    match map.products.get_mut(&entry.name) {
        None => {
            map.products.insert(entry.name.clone(), entry);
        }
        Some(existing) if existing.package.eq_ignore_ascii_case(&entry.package) => {
            if existing.targets.is_empty() && !entry.targets.is_empty() {
                existing.targets = entry.targets;
            }
        }
        Some(existing) => {
            if options.override_conflicts {
                *existing = entry;
            } else {
                tracing::warn!(
                    "Product '{}' is owned by '{}' but was also seen in '{}'; keeping '{}'",
                    entry.name,
                    existing.package,
                    entry.package,
                    existing.package
                );
            }
        }
    }
}

fn merge_source(map: &mut ProjectMap, declaring_dir: &Path, decl: &PackageDecl, options: &UpdateOptions) {
    let (name, inferred) = match (&decl.name, options.aggressive) {
        (Some(name), _) => (name.clone(), false),
        (None, true) => match decl.inferred_name() {
            Some(name) => (name, true),
            None => return,
        },
        (None, false) => return,
    };

    let path = decl.path.as_deref().filter(|p| is_local_path(p)).map(|p| {
        let absolute = if Path::new(p).is_absolute() {
            PathBuf::from(p)
        } else {
            declaring_dir.join(p)
        };
        normalize_path_for_storage(clean_path(&absolute))
    });
    let source = PackageSource {
        url: decl.url.clone(),
        path,
        requirement: decl.requirement.clone(),
    };
    if source.url.is_none() && source.path.is_none() {
        return;
    }

    match map.package_sources.get(&name) {
        None => {
            map.package_sources.insert(name, source);
        }
        Some(existing) if existing.same_location(&source) => {}
        Some(_) if inferred => {
            tracing::debug!("Inferred package name '{}' already refers to another location", name);
        }
        Some(existing) => {
            if options.override_conflicts {
                map.package_sources.insert(name, source);
            } else {
                tracing::warn!(
                    "Package source for '{}' conflicts with recorded {:?}; keeping the recorded entry",
                    name,
                    existing.url.as_ref().or(existing.path.as_ref())
                );
            }
        }
    }
}

fn build_graph(project_root: &Path, discoveries: &[Discovery]) -> ProjectGraph {
    let mut graph = ProjectGraph {
        generated_at: Some(Utc::now()),
        project_root: normalize_path_for_storage(project_root),
        ..ProjectGraph::default()
    };

    // First discovery of a name wins, matching the lookup tables
    let mut nodes: Vec<&Discovery> = Vec::new();
    for d in discoveries {
        if graph.packages.contains_key(&d.name) {
            continue;
        }
        graph.packages.insert(
            d.name.clone(),
            GraphPackage {
                package_dir: normalize_path_for_storage(&d.dir),
                manifest_path: normalize_path_for_storage(&d.manifest),
                targets: d.targets.clone(),
            },
        );
        nodes.push(d);
    }

    for d in &nodes {
        let mut targets: BTreeSet<String> = BTreeSet::new();
        let mut declared: Vec<(String, String)> = Vec::new();

        for decl in &d.decls {
            let by_path = match decl.path.as_deref() {
                Some(path) if is_local_path(path) => node_at(&nodes, &d.dir.join(path)),
                _ => None,
            };
            let identity = decl.identity();
            let Some(to) = by_path.or_else(|| identity.as_deref().and_then(|i| node_named(&nodes, i)))
            else {
                continue;
            };
            if let Some(path) = &decl.path {
                graph.path_decls.entry(d.name.clone()).or_default().insert(to.clone(), path.clone());
            }
            if let Some(identity) = identity {
                declared.push((identity, to.clone()));
            }
            targets.insert(to);
        }

        for (_, package) in &d.usages {
            let via_decl = declared
                .iter()
                .find(|(identity, _)| identity.eq_ignore_ascii_case(package))
                .map(|(_, to)| to.clone());
            if let Some(to) = via_decl.or_else(|| node_named(&nodes, package)) {
                targets.insert(to);
            }
        }

        targets.remove(&d.name);
        if !targets.is_empty() {
            graph.edges.insert(d.name.clone(), targets.into_iter().collect());
        }
    }

    graph
}

/// Package whose directory is `dir` after lexical cleanup.
fn node_at(nodes: &[&Discovery], dir: &Path) -> Option<String> {
    let wanted = clean_path(dir);
    nodes.iter().find(|n| clean_path(&n.dir) == wanted).map(|n| n.name.clone())
}

/// Package whose name or directory matches `identity`, ignoring case.
fn node_named(nodes: &[&Discovery], identity: &str) -> Option<String> {
    nodes
        .iter()
        .find(|n| {
            n.name.eq_ignore_ascii_case(identity)
                || n.dir.file_name().is_some_and(|f| f.to_string_lossy().eq_ignore_ascii_case(identity))
        })
        .map(|n| n.name.clone())
}
