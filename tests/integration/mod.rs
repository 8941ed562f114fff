//! Integration test suite for spmdeps
//!
//! End-to-end tests that drive [`DependencyResolutionService`] against real
//! manifests written to temporary project trees.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **scenarios**: single-package requests (already present, insertion,
//!   layering and cycle blocks, modes)
//! - **properties**: idempotence, comma handling, cycle symmetry, and level
//!   monotonicity over edited manifests
//! - **cross_package**: product references across packages, package
//!   declarations, and package-level cycles
//!
//! [`DependencyResolutionService`]: spmdeps::resolver::DependencyResolutionService

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod cross_package;
mod properties;
mod scenarios;
