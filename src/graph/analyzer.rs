//! Level assignment, topological order, and reachability.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::DependencyGraph;
use super::policy::Level;
use crate::config::DEFAULT_SYSTEM_MODULES;

/// Result of analyzing one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAnalysis {
    /// Assigned levels; targets absent here are unassigned
    pub levels: BTreeMap<String, u32>,
    /// Dependencies-first order of every acyclic target
    pub topology: Vec<String>,
    /// Names recognized as platform frameworks
    pub system_modules: BTreeSet<String>,
}

impl GraphAnalysis {
    /// Level of `name`, pinning system modules to zero.
    #[must_use]
    pub fn level(&self, name: &str) -> Level {
        if self.system_modules.contains(name) {
            return Level::At(0);
        }
        self.levels.get(name).map_or(Level::Unassigned, |l| Level::At(*l))
    }
}

/// Runs the pure graph algorithms.
#[derive(Debug, Clone)]
pub struct DependencyGraphAnalyzer {
    system_modules: HashSet<String>,
}

impl Default for DependencyGraphAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_MODULES.iter().map(|s| (*s).to_string()))
    }
}

impl DependencyGraphAnalyzer {
    /// Analyzer treating `system_modules` as platform frameworks.
    pub fn new(system_modules: impl IntoIterator<Item = String>) -> Self {
        Self {
            system_modules: system_modules.into_iter().collect(),
        }
    }

    /// Whether `name` is a known platform framework.
    #[must_use]
    pub fn is_system_module(&self, name: &str) -> bool {
        self.system_modules.contains(name)
    }

    /// Compute levels, topological order, and system modules.
    ///
    /// # Examples
    ///
    /// ```
    /// use spmdeps::graph::{DependencyGraph, DependencyGraphAnalyzer};
    /// use spmdeps::manifest::ManifestParser;
    /// use std::path::Path;
    ///
    /// let info = ManifestParser::parse(r#"let package = Package(name: "P", targets: [
    ///     .target(name: "App", dependencies: ["Feature", "Core"]),
    ///     .target(name: "Feature", dependencies: ["Core"]),
    ///     .target(name: "Core"),
    /// ])"#).unwrap();
    /// let graph = DependencyGraph::from_package(info, Path::new("/p/Package.swift"), 0);
    /// let analysis = DependencyGraphAnalyzer::default().analyze(&graph);
    /// assert_eq!(analysis.levels["Core"], 0);
    /// assert_eq!(analysis.levels["Feature"], 1);
    /// assert_eq!(analysis.levels["App"], 2);
    /// assert_eq!(analysis.topology, vec!["Core", "Feature", "App"]);
    /// ```
    #[must_use]
    pub fn analyze(&self, graph: &DependencyGraph) -> GraphAnalysis {
        let dependents = graph.dependents();
        let mut remaining: HashMap<&str, usize> = graph
            .targets_list
            .iter()
            .map(|n| (n.as_str(), graph.local_dependencies(n).len()))
            .collect();

        // Levels: breadth-first from the dependency-free frontier. A target is
        // settled once every local dependency is, at one more than their max.
        let mut levels: BTreeMap<String, u32> = BTreeMap::new();
        let mut tentative: HashMap<&str, u32> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        for name in &graph.targets_list {
            if remaining[name.as_str()] == 0 {
                levels.insert(name.clone(), 0);
                queue.push_back(name);
            }
        }
        let mut topology = Vec::with_capacity(graph.targets_list.len());
        while let Some(current) = queue.pop_front() {
            topology.push(current.to_string());
            let level = levels.get(current).copied().unwrap_or(0);
            for &dependent in dependents.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                let best = tentative.entry(dependent).or_insert(0);
                *best = (*best).max(level + 1);
                if let Some(count) = remaining.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        levels.insert(dependent.to_string(), *best);
                        queue.push_back(dependent);
                    }
                }
            }
        }

        let mut system_modules = BTreeSet::new();
        for name in &graph.targets_list {
            if self.is_system_module(name) {
                system_modules.insert(name.clone());
            }
            if let Some(target) = graph.targets.get(name) {
                for dep in &target.dependencies {
                    if self.is_system_module(dep.name()) {
                        system_modules.insert(dep.name().to_string());
                    }
                }
            }
        }
        for name in &system_modules {
            if graph.has_target(name) {
                levels.insert(name.clone(), 0);
            }
        }

        tracing::debug!(
            "Analyzed {}: {} of {} targets leveled",
            graph.package_name,
            levels.len(),
            graph.targets_list.len()
        );

        GraphAnalysis {
            levels,
            topology,
            system_modules,
        }
    }
}

/// Shortest chain of local edges from `from` to `to`, both ends included.
///
/// `from == to` yields a single-element path.
#[must_use]
pub fn find_path(graph: &DependencyGraph, from: &str, to: &str) -> Option<Vec<String>> {
    if from == to {
        return Some(vec![from.to_string()]);
    }
    if !graph.has_target(from) {
        return None;
    }
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut seen: HashSet<&str> = HashSet::from([from]);
    while let Some(current) = queue.pop_front() {
        for next in graph.local_dependencies(current) {
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

/// Whether `to` can be reached from `from` over existing local edges.
#[must_use]
pub fn is_reachable(graph: &DependencyGraph, from: &str, to: &str) -> bool {
    find_path(graph, from, to).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::graph;

    #[test]
    fn test_levels_take_maximum_over_dependencies() {
        let g = graph(&[
            ("App", &["Feature", "Core"]),
            ("Feature", &["Model"]),
            ("Model", &["Core"]),
            ("Core", &[]),
        ]);
        let analysis = DependencyGraphAnalyzer::default().analyze(&g);
        assert_eq!(analysis.levels["Core"], 0);
        assert_eq!(analysis.levels["Model"], 1);
        assert_eq!(analysis.levels["Feature"], 2);
        assert_eq!(analysis.levels["App"], 3);
    }

    #[test]
    fn test_cycles_stay_unassigned() {
        let g = graph(&[("A", &["B"]), ("B", &["A"]), ("C", &["A"]), ("D", &[])]);
        let analysis = DependencyGraphAnalyzer::default().analyze(&g);
        assert_eq!(analysis.level("A"), Level::Unassigned);
        assert_eq!(analysis.level("B"), Level::Unassigned);
        assert_eq!(analysis.level("C"), Level::Unassigned);
        assert_eq!(analysis.level("D"), Level::At(0));
        assert_eq!(analysis.topology, vec!["D"]);
    }

    #[test]
    fn test_unresolved_names_do_not_raise_levels() {
        let g = graph(&[("App", &["swift-log", "Core"]), ("Core", &["Foundation"])]);
        let analysis = DependencyGraphAnalyzer::default().analyze(&g);
        assert_eq!(analysis.levels["Core"], 0);
        assert_eq!(analysis.levels["App"], 1);
        assert!(analysis.system_modules.contains("Foundation"));
        assert_eq!(analysis.level("Foundation"), Level::At(0));
    }

    #[test]
    fn test_system_module_target_pinned_to_zero() {
        let g = graph(&[("Combine", &["Shim"]), ("Shim", &[])]);
        let analysis = DependencyGraphAnalyzer::default().analyze(&g);
        assert_eq!(analysis.levels["Combine"], 0);
    }

    #[test]
    fn test_topology_puts_dependencies_first() {
        let g = graph(&[("App", &["Feature"]), ("Feature", &["Core"]), ("Core", &[]), ("Tool", &[])]);
        let analysis = DependencyGraphAnalyzer::default().analyze(&g);
        let pos = |n: &str| analysis.topology.iter().position(|t| t == n).unwrap();
        assert!(pos("Core") < pos("Feature"));
        assert!(pos("Feature") < pos("App"));
        assert_eq!(analysis.topology.len(), 4);
    }

    #[test]
    fn test_level_monotonicity_on_layered_graph() {
        let g = graph(&[
            ("L0a", &[]),
            ("L0b", &[]),
            ("L1", &["L0a"]),
            ("L2", &["L1", "L0b"]),
            ("L3", &["L2", "L0a"]),
            ("Side", &["L1"]),
        ]);
        let analysis = DependencyGraphAnalyzer::default().analyze(&g);
        for from in &g.targets_list {
            for to in &g.targets_list {
                if from != to && is_reachable(&g, from, to) {
                    assert!(
                        analysis.levels[to] < analysis.levels[from],
                        "{to} should sit below {from}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_find_path() {
        let g = graph(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);
        assert_eq!(find_path(&g, "A", "C").unwrap(), vec!["A", "B", "C"]);
        assert!(find_path(&g, "C", "A").is_none());
        assert!(is_reachable(&g, "B", "B"));
        assert!(!is_reachable(&g, "Missing", "A"));
    }

    #[test]
    fn test_custom_system_modules() {
        let analyzer = DependencyGraphAnalyzer::new(vec!["VendorKit".to_string()]);
        assert!(analyzer.is_system_module("VendorKit"));
        assert!(!analyzer.is_system_module("Foundation"));
    }
}
