//! Request orchestration for adding a dependency edge.
//!
//! [`DependencyResolutionService`] is the single entry point a file watcher or
//! editor integration calls. It owns one instance of every stage for a project
//! root and walks a request through them:
//!
//! 1. refresh the project map (throttled)
//! 2. load the target graph of the requesting manifest
//! 3. for a same-package edge, run the layering policy on that graph
//! 4. for a cross-package edge, find the owning package and check the
//!    package-level graph for a cycle
//! 5. depending on the [`ResolutionMode`], describe or apply the patch
//!
//! Every outcome, including failures, is a [`ResolutionResult`]. Calling
//! [`ensure_dependency`](DependencyResolutionService::ensure_dependency) twice
//! with the same arguments never inserts twice.
//!
//! # Example
//!
//! ```rust,no_run
//! use spmdeps::core::ResolutionMode;
//! use spmdeps::resolver::DependencyResolutionService;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = DependencyResolutionService::open(Path::new("/work/MyApp"))?;
//! let result = service
//!     .ensure_dependency(
//!         Path::new("/work/MyApp/Package.swift"),
//!         "App",
//!         "Feature",
//!         ResolutionMode::Fix,
//!     )
//!     .await;
//! if !result.ok {
//!     eprintln!("{}: {}", result.reason.unwrap_or_default(), result.message.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::core::{BlockReason, DepsError, ResolutionMode};
use crate::graph::{
    DependencyGraph, DependencyGraphAnalyzer, DependencyGraphCache, DependencyPolicyEngine,
    PolicyVerdict,
};
use crate::manifest::patcher::Change;
use crate::manifest::{
    Dependency, ExternalParserBridge, ManifestParser, ManifestPatcher, PackageContext, PatchOutcome,
};
use crate::project::{ProjectDependencyMapStore, ProjectMap, TargetOwner};
use crate::utils::safe_canonicalize;

/// Reason reported when an allowed edge was not applied because the mode
/// forbids writes.
pub const REASON_PATCH_REQUIRED: &str = "patchRequired";

/// Reason reported when an unqualified entry collides with a product of
/// another package.
pub const REASON_UNRESOLVED_BY_NAME: &str = "unresolvedByNameReference";

/// Structured answer to one [`ensure_dependency`](DependencyResolutionService::ensure_dependency) call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// Whether the edge is in place after the call
    pub ok: bool,
    /// Whether a manifest was rewritten
    pub changed: bool,
    /// Machine-readable reason for failures and blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Patch description when the mode forbids writing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Edits made in fix mode
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
}

impl ResolutionResult {
    fn satisfied(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    fn failed(reason: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl From<DepsError> for ResolutionResult {
    fn from(error: DepsError) -> Self {
        Self::failed(error.reason(), error.to_string())
    }
}

impl From<PatchOutcome> for ResolutionResult {
    fn from(outcome: PatchOutcome) -> Self {
        Self {
            ok: outcome.ok,
            changed: outcome.changed,
            reason: outcome.reason,
            message: outcome.error,
            suggestion: None,
            changes: outcome.changes,
        }
    }
}

/// What a request resolved to once policy has allowed it.
enum Edge {
    Local,
    CrossPackage(PackageContext),
}

/// Orchestrates analysis and remediation for one project root.
#[derive(Debug)]
pub struct DependencyResolutionService {
    project_root: PathBuf,
    cache: DependencyGraphCache,
    project: Arc<ProjectDependencyMapStore>,
    analyzer: DependencyGraphAnalyzer,
    policy: DependencyPolicyEngine,
    patcher: ManifestPatcher,
}

impl DependencyResolutionService {
    /// Service for `project_root` configured from its `spmdeps.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error when the root does not exist or the configuration
    /// file is invalid.
    pub fn open(project_root: &Path) -> Result<Self> {
        let config = EngineConfig::load(project_root)?;
        Self::new(project_root, &config)
    }

    /// Service for `project_root` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the root cannot be canonicalized.
    pub fn new(project_root: &Path, config: &EngineConfig) -> Result<Self> {
        let project_root = safe_canonicalize(project_root)
            .with_context(|| format!("Invalid project root {}", project_root.display()))?;
        let cache_dir = config.cache_dir(&project_root);
        tracing::debug!(
            "Opening project {} with cache {}",
            project_root.display(),
            cache_dir.display()
        );

        Ok(Self {
            cache: DependencyGraphCache::new(&cache_dir, ExternalParserBridge::from_config(&config.parser)),
            project: Arc::new(ProjectDependencyMapStore::new(
                &project_root,
                &cache_dir,
                config.project_map.clone(),
            )),
            analyzer: DependencyGraphAnalyzer::new(config.policy.all_system_modules()),
            policy: DependencyPolicyEngine,
            patcher: ManifestPatcher::new(config.policy.default_version_floor.clone()),
            project_root,
        })
    }

    /// The canonical project root.
    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The graph cache shared by every request.
    #[must_use]
    pub fn graph_cache(&self) -> &DependencyGraphCache {
        &self.cache
    }

    /// The project map store.
    #[must_use]
    pub fn project_map(&self) -> &ProjectDependencyMapStore {
        &self.project
    }

    /// Drop in-process state when the project is closed.
    pub fn close(&self) {
        self.cache.clear();
    }

    /// Make `to_target` a dependency of `from_target` in `manifest`.
    ///
    /// Already-satisfied edges succeed with `changed: false`. Edges refused by
    /// policy fail with `cycleBlocked` or `downwardDependency`. Allowed edges
    /// are applied only in [`ResolutionMode::Fix`]; other modes fail with
    /// `patchRequired` and a suggestion describing the edit.
    pub async fn ensure_dependency(
        &self,
        manifest: &Path,
        from_target: &str,
        to_target: &str,
        mode: ResolutionMode,
    ) -> ResolutionResult {
        match self.resolve(manifest, from_target, to_target, mode).await {
            Ok(result) => result,
            Err(error) => {
                tracing::debug!("Request {} -> {} failed: {}", from_target, to_target, error);
                error.into()
            }
        }
    }

    async fn resolve(
        &self,
        manifest: &Path,
        from_target: &str,
        to_target: &str,
        mode: ResolutionMode,
    ) -> Result<ResolutionResult, DepsError> {
        self.refresh_project_map(false).await;

        let Some(graph) = self.cache.get_or_build(manifest).await else {
            return Err(DepsError::ParseUnavailable {
                path: manifest.to_path_buf(),
            });
        };
        let manifest = graph.source_manifest_path().to_path_buf();
        if !graph.has_target(from_target) {
            let skipped = std::fs::read_to_string(&manifest)
                .is_ok_and(|text| ManifestParser::parse_structure(&text).is_skipped(from_target));
            if skipped {
                return Err(DepsError::malformed(
                    &manifest,
                    format!("target '{from_target}' has unbalanced brackets"),
                ));
            }
            return Err(DepsError::target_not_found(from_target, &manifest));
        }
        if self.analyzer.is_system_module(to_target) {
            return Ok(ResolutionResult::satisfied(format!(
                "'{to_target}' is a system module and needs no declaration"
            )));
        }

        let edge = if graph.has_target(to_target) {
            let analysis = self.analyzer.analyze(&graph);
            match self.policy.evaluate(&graph, &analysis, from_target, to_target) {
                PolicyVerdict::AlreadyPresent => {
                    return Ok(ResolutionResult::satisfied(format!(
                        "'{from_target}' already depends on '{to_target}'"
                    )));
                }
                PolicyVerdict::AlreadyReachable {
                    path,
                } => {
                    return Ok(ResolutionResult::satisfied(format!(
                        "'{to_target}' is already reachable from '{from_target}': {}",
                        path.join(" -> ")
                    )));
                }
                PolicyVerdict::Decision(decision) if decision.blocked => {
                    let reason = decision.reason.map_or("blocked", |r| r.as_str());
                    tracing::debug!("Policy blocked {} -> {}: {}", from_target, to_target, reason);
                    return Ok(ResolutionResult::failed(reason, decision.message.unwrap_or_default()));
                }
                PolicyVerdict::Decision(_) => Edge::Local,
            }
        } else {
            match self.cross_package_edge(&graph, from_target, to_target)? {
                Ok(edge) => edge,
                Err(result) => return Ok(result),
            }
        };

        let context = match &edge {
            Edge::Local => None,
            Edge::CrossPackage(context) => Some(context),
        };

        if !mode.allows_write() {
            return self.suggest(&manifest, from_target, to_target, context);
        }

        let outcome = self.patcher.add_target_dependency(&manifest, from_target, to_target, context);
        if outcome.changed {
            self.cache.invalidate(&manifest);
            self.refresh_project_map(true).await;
        }
        Ok(outcome.into())
    }

    /// Resolve a destination outside the requesting package.
    ///
    /// The outer error is a domain failure; the inner `Err` is a finished
    /// result that ends the request early.
    fn cross_package_edge(
        &self,
        graph: &DependencyGraph,
        from_target: &str,
        to_target: &str,
    ) -> Result<Result<Edge, ResolutionResult>, DepsError> {
        let map = self.load_project_map();
        let Some(TargetOwner {
            package,
            product,
        }) = map.owner_of(to_target)
        else {
            return Err(DepsError::target_not_found(to_target, graph.source_manifest_path()));
        };

        let current = map
            .graph
            .package_for_manifest(graph.source_manifest_path())
            .unwrap_or(graph.package_name.as_str())
            .to_string();
        if package.eq_ignore_ascii_case(&current) {
            return Err(DepsError::target_not_found(to_target, graph.source_manifest_path()));
        }

        let dependencies = graph.targets.get(from_target).map(|t| t.dependencies.as_slice()).unwrap_or(&[]);
        let present = dependencies.iter().any(|d| match d {
            Dependency::Product {
                name,
                package: p,
            } => *name == product && p.eq_ignore_ascii_case(&package),
            _ => false,
        });
        if present {
            return Ok(Err(ResolutionResult::satisfied(format!(
                "'{from_target}' already depends on product '{product}' of '{package}'"
            ))));
        }
        if graph.unresolved_references(from_target).iter().any(|d| d.name() == to_target) {
            return Ok(Err(ResolutionResult::failed(
                REASON_UNRESOLVED_BY_NAME,
                format!(
                    "'{from_target}' lists '{to_target}' without a package, but it is provided by \
                     package '{package}'; qualify it as .product(name: \"{product}\", package: \"{package}\")"
                ),
            )));
        }

        if let Some(cycle) = map.graph.cycle_through(&current, &package) {
            return Err(DepsError::PolicyBlocked {
                reason: BlockReason::CycleBlocked,
                message: format!(
                    "adding package '{current}' -> '{package}' would create a package cycle: {}",
                    cycle.join(" -> ")
                ),
            });
        }

        let provenance = map.provenance_for(&package, graph.source_manifest_path());
        Ok(Ok(Edge::CrossPackage(PackageContext {
            package_name: package,
            product_name: product,
            provenance,
        })))
    }

    /// Describe the patch without writing it.
    fn suggest(
        &self,
        manifest: &Path,
        from_target: &str,
        to_target: &str,
        context: Option<&PackageContext>,
    ) -> Result<ResolutionResult, DepsError> {
        let text = std::fs::read_to_string(manifest).map_err(|_| DepsError::ParseUnavailable {
            path: manifest.to_path_buf(),
        })?;
        let patch = self.patcher.apply(&text, manifest, from_target, to_target, context)?;
        if patch.changes.is_empty() {
            return Ok(ResolutionResult::satisfied(format!(
                "'{from_target}' already depends on '{to_target}'"
            )));
        }
        let steps: Vec<String> = patch.changes.iter().map(describe_change).collect();
        Ok(ResolutionResult {
            suggestion: Some(steps.join("; ")),
            ..ResolutionResult::failed(
                REASON_PATCH_REQUIRED,
                format!("'{from_target}' -> '{to_target}' is allowed but was not applied"),
            )
        })
    }

    fn load_project_map(&self) -> ProjectMap {
        self.project.load().unwrap_or_else(|e| {
            tracing::warn!("Unreadable project map, using an empty one: {:#}", e);
            ProjectMap::default()
        })
    }

    async fn refresh_project_map(&self, force: bool) {
        if let Err(e) = Arc::clone(&self.project).refresh_async(force).await {
            tracing::warn!("Project map refresh failed: {:#}", e);
        }
    }
}

fn describe_change(change: &Change) -> String {
    match change {
        Change::TargetDependency {
            from_target,
            to_target,
            file,
        } => format!("add \"{to_target}\" to the dependencies of '{from_target}' in {file}"),
        Change::PackageDeclaration {
            package_ref,
            file,
            ..
        } => format!("declare {package_ref} in the package dependencies of {file}"),
        Change::ProductDependency {
            from_target,
            to_target,
            package_name,
            file,
        } => format!(
            "add .product(name: \"{to_target}\", package: \"{package_name}\") to the dependencies of \
             '{from_target}' in {file}"
        ),
    }
}
