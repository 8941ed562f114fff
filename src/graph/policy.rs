//! Layering policy for candidate edges.
//!
//! A candidate edge `from -> to` is judged in this order:
//!
//! 1. `from` already lists `to`: [`PolicyVerdict::AlreadyPresent`]
//! 2. `to` is already reachable from `from`: [`PolicyVerdict::AlreadyReachable`]
//! 3. `to` reaches `from`, so the edge closes a cycle: blocked, `cycleBlocked`
//! 4. `to` sits on a higher level than `from`: blocked, `downwardDependency`
//! 5. otherwise the edge is allowed, upward or same-level
//!
//! Unassigned levels (targets caught in or behind a cycle) compare as higher
//! than every assigned level, so edges toward them are refused.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::analyzer::{GraphAnalysis, find_path};
use super::DependencyGraph;
use crate::core::BlockReason;

/// A target's level, where [`Level::Unassigned`] sorts above every number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Level {
    /// Distance from the dependency-free leaves
    At(u32),
    /// No level could be assigned; treated as infinity
    Unassigned,
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::At(a), Self::At(b)) => a.cmp(b),
            (Self::At(_), Self::Unassigned) => Ordering::Less,
            (Self::Unassigned, Self::At(_)) => Ordering::Greater,
            (Self::Unassigned, Self::Unassigned) => Ordering::Equal,
        }
    }
}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(level) => write!(f, "{level}"),
            Self::Unassigned => f.write_str("unassigned"),
        }
    }
}

/// Direction of an edge relative to the layering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Toward a lower level
    Upward,
    /// Toward a higher level
    Downward,
    /// Between targets on the same level
    SameLevel,
}

impl Direction {
    fn between(from: Level, to: Level) -> Self {
        match to.cmp(&from) {
            Ordering::Less => Self::Upward,
            Ordering::Greater => Self::Downward,
            Ordering::Equal => Self::SameLevel,
        }
    }
}

/// Outcome of the layering check for one candidate edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    /// Whether the edge is refused
    pub blocked: bool,
    /// Why the edge is refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
    /// Edge direction
    pub direction: Direction,
    /// Level of the source target
    pub from_level: Level,
    /// Level of the destination target
    pub to_level: Level,
    /// Human-readable explanation for blocked edges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Full verdict for a candidate edge, including the already-satisfied cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// `from` already lists `to` directly.
    AlreadyPresent,
    /// `to` is already reachable through other targets.
    AlreadyReachable {
        /// Chain from `from` to `to`
        path: Vec<String>,
    },
    /// The edge was judged by the layering policy.
    Decision(PolicyDecision),
}

/// Stateless policy engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyPolicyEngine;

impl DependencyPolicyEngine {
    /// Judge `from -> to`, reporting already-satisfied edges first.
    #[must_use]
    pub fn evaluate(
        &self,
        graph: &DependencyGraph,
        analysis: &GraphAnalysis,
        from: &str,
        to: &str,
    ) -> PolicyVerdict {
        if graph.has_direct_dependency(from, to) {
            return PolicyVerdict::AlreadyPresent;
        }
        if from != to
            && let Some(path) = find_path(graph, from, to)
        {
            return PolicyVerdict::AlreadyReachable {
                path,
            };
        }
        PolicyVerdict::Decision(self.check_policy(graph, analysis, from, to))
    }

    /// Apply the cycle and layering rules to `from -> to`.
    #[must_use]
    pub fn check_policy(
        &self,
        graph: &DependencyGraph,
        analysis: &GraphAnalysis,
        from: &str,
        to: &str,
    ) -> PolicyDecision {
        let from_level = analysis.level(from);
        let to_level = analysis.level(to);
        let direction = Direction::between(from_level, to_level);

        if let Some(back) = find_path(graph, to, from) {
            let mut cycle = vec![from.to_string()];
            cycle.extend(back);
            return PolicyDecision {
                blocked: true,
                reason: Some(BlockReason::CycleBlocked),
                direction,
                from_level,
                to_level,
                message: Some(format!(
                    "adding '{from}' -> '{to}' would create a cycle: {}",
                    cycle.join(" -> ")
                )),
            };
        }

        if to_level > from_level {
            return PolicyDecision {
                blocked: true,
                reason: Some(BlockReason::DownwardDependency),
                direction,
                from_level,
                to_level,
                message: Some(format!(
                    "'{from}' (level {from_level}) may not depend on '{to}' (level {to_level}): \
                     a lower layer would depend on a higher layer"
                )),
            };
        }

        PolicyDecision {
            blocked: false,
            reason: None,
            direction,
            from_level,
            to_level,
            message: None,
        }
    }
}
