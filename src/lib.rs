//! spmdeps - dependency-graph analysis and safe auto-remediation for Swift packages
//!
//! Given a `Package.swift` and a request "target A should depend on B", the
//! engine decides whether the edge is already satisfied, whether it would break
//! the layering of the package or close a cycle, and, when allowed, inserts it
//! into the manifest text without reformatting anything around it.
//!
//! # Architecture Overview
//!
//! Requests flow through a fixed pipeline:
//! - the manifest is parsed into target blocks with recorded byte spans
//! - a per-manifest dependency graph is built and cached on disk
//! - targets are assigned layering levels and checked for reachability
//! - a policy decides whether the new edge is allowed
//! - the patcher inserts the edge, declaring the owning package when needed
//!
//! A project-wide map of packages, products, and package-level edges lets the
//! engine resolve names owned by other packages in the same tree.
//!
//! # Core Modules
//!
//! ## Core Functionality
//! - [`core`] - Error taxonomy and resolution modes
//! - [`config`] - Optional `spmdeps.toml` configuration
//! - [`resolver`] - The request orchestrator and its structured results
//!
//! ## Manifests
//! - [`manifest`] - Lexing, parsing, external parser bridge, scanning, and patching
//!
//! ## Graphs
//! - [`graph`] - Target graphs, level analysis, policy, and the graph cache
//! - [`project`] - Project-wide package map and package-level graph
//!
//! ## Supporting Modules
//! - [`utils`] - Atomic writes, path hashing, and relative path helpers
//!
//! # Configuration (spmdeps.toml)
//!
//! ```toml
//! [parser]
//! timeout-ms = 5000
//! toolchain-dump = true
//!
//! [project-map]
//! aggressive = true
//!
//! [policy]
//! system-modules = ["VendorKit"]
//! ```
//!
//! # Resolution Results
//!
//! | Situation | `ok` | `changed` | `reason` |
//! |---|---|---|---|
//! | edge already present or reachable | true | false | |
//! | edge inserted (fix mode) | true | true | |
//! | edge allowed, not in fix mode | false | false | `patchRequired` |
//! | edge closes a cycle | false | false | `cycleBlocked` |
//! | lower layer toward higher layer | false | false | `downwardDependency` |
//! | unknown target | false | false | `targetNotFound` |
//! | manifest missing or unreadable | false | false | `parseUnavailable` |

// Core functionality modules
pub mod config;
pub mod core;
pub mod resolver;

// Manifest and graph handling
pub mod graph;
pub mod manifest;
pub mod project;

// Supporting modules
pub mod utils;
