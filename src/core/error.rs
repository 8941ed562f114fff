//! Error taxonomy for manifest analysis and remediation.
//!
//! [`DepsError`] names every way a request can fail inside the engine. Public
//! entry points never return it directly: the graph cache turns
//! [`DepsError::ParseUnavailable`] into `None`, the patcher turns its failures
//! into a [`PatchOutcome`](crate::manifest::patcher::PatchOutcome), and the
//! resolver maps everything onto a [`ResolutionResult`](crate::resolver::ResolutionResult).
//! The enum still implements [`std::error::Error`] so internal helpers can use `?`
//! and so callers embedding the engine can wrap it in `anyhow`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the policy engine refused an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockReason {
    /// The proposed edge would let the destination reach back to the source.
    CycleBlocked,
    /// A lower layer would depend on a higher layer.
    DownwardDependency,
}

impl BlockReason {
    /// The wire name used in results and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CycleBlocked => "cycleBlocked",
            Self::DownwardDependency => "downwardDependency",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain errors raised while parsing, analyzing, or patching a manifest.
#[derive(Debug, Error)]
pub enum DepsError {
    /// Neither the external bridge nor the syntactic parser produced structure.
    #[error("no parser could read package structure from {}", path.display())]
    ParseUnavailable {
        /// Manifest that could not be parsed
        path: PathBuf,
    },

    /// A target named in a request is absent from the manifest.
    #[error("target '{target}' not found in {}", manifest.display())]
    TargetNotFound {
        /// Requested target name
        target: String,
        /// Manifest that was searched
        manifest: PathBuf,
    },

    /// A bracket span the patcher needs is present but unbalanced.
    #[error("malformed manifest {}: {detail}", manifest.display())]
    ManifestMalformed {
        /// Manifest that failed structural checks
        manifest: PathBuf,
        /// What was found to be broken
        detail: String,
    },

    /// The layering or cycle policy refused the edge.
    #[error("{reason}: {message}")]
    PolicyBlocked {
        /// Machine-readable block reason
        reason: BlockReason,
        /// Human-readable explanation
        message: String,
    },

    /// The external parser did not answer within its deadline.
    #[error("external parser timed out after {}ms", timeout.as_millis())]
    ExternalParserTimeout {
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// The external parser exited unsuccessfully or produced unusable output.
    #[error("external parser failed: {detail}")]
    ExternalParserFailed {
        /// Exit status, stderr excerpt, or decode error
        detail: String,
    },

    /// A cross-package edge needs a package declaration but neither a URL nor a
    /// local path is known for the owning package.
    #[error("no source location known for package '{package}'")]
    MissingProvenance {
        /// Package that could not be declared
        package: String,
    },
}

impl DepsError {
    /// Short machine-readable reason string used in structured results.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ParseUnavailable { .. } => "parseUnavailable",
            Self::TargetNotFound { .. } => "targetNotFound",
            Self::ManifestMalformed { .. } => "manifestMalformed",
            Self::PolicyBlocked { reason, .. } => reason.as_str(),
            Self::ExternalParserTimeout { .. } => "externalParserTimeout",
            Self::ExternalParserFailed { .. } => "externalParserFailed",
            Self::MissingProvenance { .. } => "missingProvenance",
        }
    }

    pub(crate) fn malformed(manifest: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::ManifestMalformed {
            manifest: manifest.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn target_not_found(target: impl Into<String>, manifest: impl Into<PathBuf>) -> Self {
        Self::TargetNotFound {
            target: target.into(),
            manifest: manifest.into(),
        }
    }
}
