//! Core types shared by every stage of the engine.
//!
//! This module holds the pieces that do not belong to any single stage:
//!
//! - [`DepsError`] and [`BlockReason`] - the error taxonomy
//! - [`ResolutionMode`] - how far the resolver may go once an edge is allowed
//!
//! # Error Handling Pattern
//!
//! Stages use `anyhow::Result` internally for I/O and serialization, and raise
//! [`DepsError`] for domain failures. Nothing crosses a public contract as an
//! error; the resolver folds every failure into a structured result:
//!
//! ```rust,no_run
//! use spmdeps::core::{DepsError, ResolutionMode};
//!
//! fn describe(err: &DepsError) -> String {
//!     format!("{} ({})", err, err.reason())
//! }
//!
//! let mode: ResolutionMode = "suggest".parse().unwrap();
//! assert!(!mode.allows_write());
//! ```

pub mod error;

pub use error::{BlockReason, DepsError};

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operating mode of a resolution request.
///
/// Only [`ResolutionMode::Fix`] lets the resolver rewrite a manifest. The two
/// other modes evaluate the edge exactly the same way and stop before the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Report only; no suggestion is acted on.
    Off,
    /// Report with a human-readable patch suggestion.
    #[default]
    Suggest,
    /// Apply the patch when the policy allows it.
    Fix,
}

impl ResolutionMode {
    /// Whether this mode may write to a manifest.
    #[must_use]
    pub const fn allows_write(self) -> bool {
        matches!(self, Self::Fix)
    }

    /// The lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Suggest => "suggest",
            Self::Fix => "fix",
        }
    }
}

impl FromStr for ResolutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "suggest" => Ok(Self::Suggest),
            "fix" => Ok(Self::Fix),
            other => anyhow::bail!("unknown resolution mode '{other}' (expected off, suggest or fix)"),
        }
    }
}

impl std::fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
