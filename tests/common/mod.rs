//! Common test utilities and fixtures for spmdeps integration tests
//!
//! # Quick Start Guide
//!
//! ```rust,ignore
//! let project = TestProject::new()?;
//! let manifest = project.write_package(
//!     "Package.swift",
//!     &PackageBuilder::new("Layers").target("App", &["Core"]).target("Core", &[]).build(),
//! )?;
//! let service = project.service()?;
//! ```
//!
//! ## Helper Method Summary
//!
//! ### TestProject
//! - `new()` - Create a project root in a temp directory
//! - `write_package(rel, text)` - Write a manifest (parent dirs created)
//! - `read(path)` - Read a manifest back
//! - `service()` - Resolution service with default configuration
//! - `service_with(config)` - Resolution service with explicit configuration
//!
//! ### PackageBuilder
//! - See `manifest_builder` module for the full API

#![allow(dead_code)]

mod manifest_builder;

pub use manifest_builder::PackageBuilder;

use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::{Context, Result};
use spmdeps::config::EngineConfig;
use spmdeps::resolver::DependencyResolutionService;
use tempfile::TempDir;

static LOGGING: Once = Once::new();

/// Install a test subscriber once, honoring `RUST_LOG`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// A project root in a temporary directory.
pub struct TestProject {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestProject {
    /// Create an empty project.
    pub fn new() -> Result<Self> {
        init_test_logging();
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        Ok(Self {
            _temp_dir: temp_dir,
            root,
        })
    }

    /// Canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `text` to `rel` under the root and return the full path.
    pub fn write_package(&self, rel: &str, text: &str) -> Result<PathBuf> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Read a file back.
    pub fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Resolution service with default configuration.
    pub fn service(&self) -> Result<DependencyResolutionService> {
        self.service_with(&EngineConfig::default())
    }

    /// Resolution service with `config`.
    pub fn service_with(&self, config: &EngineConfig) -> Result<DependencyResolutionService> {
        DependencyResolutionService::new(&self.root, config)
    }
}
