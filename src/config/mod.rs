//! Engine configuration loaded from `spmdeps.toml`.
//!
//! The file is optional and lives at the project root. Every key has a default,
//! so an empty or missing file yields [`EngineConfig::default`].
//!
//! # Examples
//!
//! ```toml
//! [parser]
//! timeout-ms = 3000
//! helper = "/usr/local/bin/manifest-helper"
//! toolchain-dump = true
//! swift = "/usr/bin/swift"
//!
//! [cache]
//! dir = ".build/spmdeps"
//!
//! [project-map]
//! refresh-interval-ms = 3000
//! aggressive = true
//!
//! [policy]
//! system-modules = ["MyVendorKit"]
//! default-version-floor = "1.0.0"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up at the project root.
pub const CONFIG_FILENAME: &str = "spmdeps.toml";

/// Platform frameworks that have no local source and always sit at level 0.
pub const DEFAULT_SYSTEM_MODULES: &[&str] = &[
    "Foundation",
    "Swift",
    "SwiftUI",
    "UIKit",
    "AppKit",
    "Combine",
    "Dispatch",
    "XCTest",
    "Testing",
    "CoreData",
    "CoreGraphics",
    "CoreFoundation",
    "Observation",
    "os",
];

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// External parser settings.
    pub parser: ParserConfig,
    /// Graph cache settings.
    pub cache: CacheConfig,
    /// Project-wide dependency map settings.
    pub project_map: ProjectMapConfig,
    /// Layering policy settings.
    pub policy: PolicyConfig,
}

/// Settings for the external parser strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ParserConfig {
    /// Hard deadline for any external parser invocation.
    pub timeout_ms: u64,
    /// Dedicated helper executable speaking the JSON-lines protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper: Option<PathBuf>,
    /// Whether to try `swift package dump-package`.
    pub toolchain_dump: bool,
    /// Swift driver used for the toolchain dump.
    pub swift: PathBuf,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            helper: None,
            toolchain_dump: false,
            swift: PathBuf::from("swift"),
        }
    }
}

impl ParserConfig {
    /// The parser deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where graph caches and the project map are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Cache directory; relative paths resolve against the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Settings for the project-wide dependency map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProjectMapConfig {
    /// Minimum interval between unforced refreshes.
    pub refresh_interval_ms: u64,
    /// Infer names for unnamed `.package(...)` declarations.
    pub aggressive: bool,
    /// Let re-discoveries replace conflicting lookup entries.
    pub override_conflicts: bool,
}

impl Default for ProjectMapConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 3_000,
            aggressive: false,
            override_conflicts: false,
        }
    }
}

impl ProjectMapConfig {
    /// The refresh throttle as a [`Duration`].
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Layering policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct PolicyConfig {
    /// Extra names treated as system modules, appended to the built-in list.
    pub system_modules: Vec<String>,
    /// Version floor used when declaring a URL package with no known requirement.
    pub default_version_floor: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            system_modules: Vec::new(),
            default_version_floor: "1.0.0".to_string(),
        }
    }
}

impl PolicyConfig {
    /// Built-in system modules followed by configured extras, deduplicated.
    #[must_use]
    pub fn all_system_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = DEFAULT_SYSTEM_MODULES.iter().map(|s| (*s).to_string()).collect();
        for extra in &self.system_modules {
            if !names.contains(extra) {
                names.push(extra.clone());
            }
        }
        names
    }
}

impl EngineConfig {
    /// Load `spmdeps.toml` from `project_root`, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, is not valid TOML,
    /// contains unknown keys, or carries an invalid version floor.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(CONFIG_FILENAME);
        if !path.exists() {
            tracing::debug!("No {} at {}, using defaults", CONFIG_FILENAME, project_root.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        semver::Version::parse(&self.policy.default_version_floor).with_context(|| {
            format!(
                "default-version-floor '{}' is not a semantic version",
                self.policy.default_version_floor
            )
        })?;
        if self.parser.timeout_ms == 0 {
            anyhow::bail!("parser timeout-ms must be greater than zero");
        }
        Ok(())
    }

    /// Resolved cache directory for a project.
    #[must_use]
    pub fn cache_dir(&self, project_root: &Path) -> PathBuf {
        match &self.cache.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_root.join(dir),
            None => project_root.join(".build").join("spmdeps"),
        }
    }
}
