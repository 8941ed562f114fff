//! Swift package manifest model, parsing, and patching.
//!
//! A `Package.swift` file is Swift source, not data. This module recovers the
//! structural facts the dependency engine needs without compiling it:
//!
//! - [`lexer`] classifies every byte as code, comment, or string literal
//! - [`parser`] recognizes `Package(...)`, target, product, and package
//!   declarations on top of that classification
//! - [`bridge`] optionally asks an external tool for a higher-fidelity parse
//!   and falls back to [`parser`]
//! - [`scanner`] finds manifests in a project tree
//! - [`patcher`] inserts dependency declarations while leaving every other
//!   byte of the file untouched
//!
//! Every parse path produces the same [`PackageInfo`] shape, so the graph and
//! policy layers never know which parser ran.
//!
//! # Manifest Shape
//!
//! ```swift
//! let package = Package(
//!     name: "App",
//!     products: [.library(name: "AppKitLib", targets: ["App"])],
//!     dependencies: [
//!         .package(url: "https://github.com/apple/swift-log.git", from: "1.5.0"),
//!         .package(path: "../Core"),
//!     ],
//!     targets: [
//!         .target(
//!             name: "App",
//!             dependencies: [
//!                 "Feature",
//!                 .target(name: "Model"),
//!                 .byName(name: "Utils"),
//!                 .product(name: "Logging", package: "swift-log"),
//!             ],
//!             path: "Sources/App"
//!         ),
//!     ]
//! )
//! ```

pub mod bridge;
pub mod lexer;
pub mod parser;
pub mod patcher;
pub mod scanner;

pub use bridge::{ExternalParserBridge, ParseStrategy};
pub use parser::{ManifestParser, ParsedManifest};
pub use patcher::{ManifestPatcher, PackageContext, PackageProvenance, PatchOutcome};
pub use scanner::ManifestScanner;

use serde::{Deserialize, Serialize};

/// File name of a Swift package manifest.
pub const MANIFEST_FILENAME: &str = "Package.swift";

/// One entry of a target's `dependencies: [...]` array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Dependency {
    /// Bare string literal: `"Core"`.
    String {
        /// Referenced name
        name: String,
    },
    /// Explicit same-package target: `.target(name: "Core")`.
    Target {
        /// Referenced target
        name: String,
    },
    /// Cross-package product: `.product(name: "Logging", package: "swift-log")`.
    Product {
        /// Product name
        name: String,
        /// Owning package identity
        package: String,
    },
    /// Unqualified reference resolved later: `.byName(name: "Core")`.
    ByName {
        /// Referenced name
        name: String,
    },
}

impl Dependency {
    /// The referenced target or product name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::String {
                name,
            }
            | Self::Target {
                name,
            }
            | Self::Product {
                name,
                ..
            }
            | Self::ByName {
                name,
            } => name,
        }
    }

    /// The owning package, present only for product references.
    #[must_use]
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Product {
                package,
                ..
            } => Some(package),
            _ => None,
        }
    }

    /// Whether this entry can refer to a target of the same package.
    #[must_use]
    pub const fn may_be_local(&self) -> bool {
        !matches!(self, Self::Product { .. })
    }

    /// Whether this entry is unqualified (bare string or `byName`).
    #[must_use]
    pub const fn is_unqualified(&self) -> bool {
        matches!(self, Self::String { .. } | Self::ByName { .. })
    }
}

/// Target constructor that introduced a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    /// `.target(...)`
    #[default]
    Regular,
    /// `.executableTarget(...)`
    Executable,
    /// `.testTarget(...)`
    Test,
    /// `.macro(...)`
    Macro,
    /// `.plugin(...)`
    Plugin,
    /// `.systemLibrary(...)`
    System,
    /// `.binaryTarget(...)`
    Binary,
}

impl TargetKind {
    /// Constructor names recognized as target declarations.
    pub const CONSTRUCTORS: &'static [(&'static str, TargetKind)] = &[
        ("target", TargetKind::Regular),
        ("executableTarget", TargetKind::Executable),
        ("testTarget", TargetKind::Test),
        ("macro", TargetKind::Macro),
        ("plugin", TargetKind::Plugin),
        ("systemLibrary", TargetKind::System),
        ("binaryTarget", TargetKind::Binary),
    ];

    /// Whether the constructor has a `dependencies:` parameter.
    #[must_use]
    pub const fn takes_dependencies(self) -> bool {
        !matches!(self, Self::System | Self::Binary)
    }

    /// Map a `swift package dump-package` `type` string.
    #[must_use]
    pub fn from_dump_type(value: &str) -> Self {
        match value {
            "executable" => Self::Executable,
            "test" => Self::Test,
            "macro" => Self::Macro,
            "plugin" => Self::Plugin,
            "system" => Self::System,
            "binary" => Self::Binary,
            _ => Self::Regular,
        }
    }
}

/// One target as recovered from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target name
    pub name: String,
    /// Constructor kind
    #[serde(default)]
    pub kind: TargetKind,
    /// `path:` argument, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// `sources:` argument, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Entries of `dependencies: [...]` in source order
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// A top-level `.package(...)` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDecl {
    /// Explicit `name:` argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `url:` argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `path:` argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Registry `id:` argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Version requirement as written (`from: "1.2.0"` yields `1.2.0`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
}

impl PackageDecl {
    /// Identity inferred from the location: URL or path basename, or the
    /// last component of a registry id.
    #[must_use]
    pub fn inferred_name(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return crate::utils::location_basename(url);
        }
        if let Some(path) = &self.path {
            return crate::utils::location_basename(path);
        }
        self.id.as_ref().and_then(|id| id.rsplit('.').next()).map(str::to_string)
    }

    /// Explicit name when present, otherwise the inferred identity.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.name.clone().or_else(|| self.inferred_name())
    }

    /// Whether this declaration refers to `package`, comparing identities
    /// case-insensitively the way SwiftPM does.
    #[must_use]
    pub fn refers_to(&self, package: &str) -> bool {
        let explicit = self.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(package));
        explicit || self.inferred_name().is_some_and(|n| n.eq_ignore_ascii_case(package))
    }
}

/// A product declared in `products: [...]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDecl {
    /// Product name
    pub name: String,
    /// Constructor: `library`, `executable`, or `plugin`
    pub kind: String,
    /// Targets the product exposes
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Parser-agnostic package structure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Package name from `Package(name:)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Targets in declaration order
    #[serde(default)]
    pub targets: Vec<TargetInfo>,
    /// Top-level package dependencies
    #[serde(default)]
    pub package_decls: Vec<PackageDecl>,
    /// Declared products
    #[serde(default)]
    pub products: Vec<ProductDecl>,
}

impl PackageInfo {
    /// Look up a target by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&TargetInfo> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Whether any target information was recovered.
    #[must_use]
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Every product-usage site: `(product, package)` pairs in target order.
    #[must_use]
    pub fn product_usages(&self) -> Vec<(&str, &str)> {
        self.targets
            .iter()
            .flat_map(|t| t.dependencies.iter())
            .filter_map(|d| d.package().map(|p| (d.name(), p)))
            .collect()
    }
}
