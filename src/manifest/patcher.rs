//! In-place insertion of dependency declarations into `Package.swift`.
//!
//! The patcher edits manifest text without reformatting it. Every edit is an
//! insertion computed from the byte spans recorded by the
//! [parser](super::parser); no existing byte is removed or rewritten. The full
//! new text is assembled in memory before the file is replaced atomically, so a
//! failed request never leaves a partial write behind.
//!
//! Insertion follows the surrounding array's style:
//!
//! - multi-line arrays get a new line with the last element's indentation
//! - single-line arrays stay on one line
//! - a trailing comma is added after the new element only when the array
//!   already used one
//! - a comma is added after the previous last element only when it lacked one
//!
//! Applying the same request twice is a no-op the second time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::lexer::SourceMap;
use super::parser::{ArraySpan, DependenciesSpan, ManifestParser, ParsedManifest, TargetBlock};
use super::{Dependency, PackageDecl};
use crate::core::DepsError;
use crate::utils::{atomic_write, normalize_path_for_storage};

const INDENT_UNIT: &str = "    ";

/// Where the owning package of a cross-package product can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PackageProvenance {
    /// Remote repository.
    Url {
        /// Clone URL
        url: String,
        /// Known version requirement
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requirement: Option<String>,
    },
    /// Local package, relative to the requesting manifest's directory.
    Path {
        /// Relative path
        relative: String,
    },
    /// Nothing is known.
    Unknown,
}

/// Information needed to add a cross-package edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageContext {
    /// Name of the package owning the product
    pub package_name: String,
    /// Product to depend on
    pub product_name: String,
    /// How to declare the package if the manifest does not yet
    pub provenance: PackageProvenance,
}

/// One concrete edit made to a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Change {
    /// A same-package target was added to a target's dependencies.
    TargetDependency {
        /// Target that gained the dependency
        from_target: String,
        /// Target depended upon
        to_target: String,
        /// Manifest edited
        file: String,
    },
    /// A `.package(...)` declaration was added.
    PackageDeclaration {
        /// Package identity as referenced by products
        package_name: String,
        /// The inserted declaration
        package_ref: String,
        /// Manifest edited
        file: String,
    },
    /// A `.product(name:package:)` entry was added to a target's dependencies.
    ProductDependency {
        /// Target that gained the dependency
        from_target: String,
        /// Product depended upon
        to_target: String,
        /// Owning package
        package_name: String,
        /// Manifest edited
        file: String,
    },
}

/// Result of a patch request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOutcome {
    /// Whether the request succeeded (including no-op success)
    pub ok: bool,
    /// Whether the manifest was rewritten
    pub changed: bool,
    /// Machine-readable failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Edits made
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
}

impl PatchOutcome {
    fn unchanged() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    fn applied(changes: Vec<Change>) -> Self {
        Self {
            ok: true,
            changed: true,
            changes,
            ..Self::default()
        }
    }

    fn failed(reason: &str, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.to_string()),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl From<DepsError> for PatchOutcome {
    fn from(error: DepsError) -> Self {
        Self::failed(error.reason(), error.to_string())
    }
}

/// New manifest text plus the edits that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Full manifest text after all edits
    pub text: String,
    /// Edits applied, empty when nothing was needed
    pub changes: Vec<Change>,
}

/// Inserts target, product, and package declarations.
#[derive(Debug, Clone)]
pub struct ManifestPatcher {
    version_floor: String,
}

impl Default for ManifestPatcher {
    fn default() -> Self {
        Self::new("1.0.0")
    }
}

impl ManifestPatcher {
    /// Patcher that declares URL packages without a known requirement as
    /// `from: "<version_floor>"`.
    pub fn new(version_floor: impl Into<String>) -> Self {
        Self {
            version_floor: version_floor.into(),
        }
    }

    /// Add `to_target` to `from_target`'s dependencies in the manifest file.
    ///
    /// With `context` the edge is cross-package: the owning package is
    /// declared if needed and a `.product(name:package:)` entry is added.
    /// Without it, `to_target` is added as a bare string.
    pub fn add_target_dependency(
        &self,
        manifest: &Path,
        from_target: &str,
        to_target: &str,
        context: Option<&PackageContext>,
    ) -> PatchOutcome {
        let text = match std::fs::read_to_string(manifest) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", manifest.display(), e);
                return DepsError::ParseUnavailable {
                    path: manifest.to_path_buf(),
                }
                .into();
            }
        };

        let patch = match self.apply(&text, manifest, from_target, to_target, context) {
            Ok(patch) => patch,
            Err(e) => return e.into(),
        };
        if patch.changes.is_empty() {
            return PatchOutcome::unchanged();
        }

        if let Err(e) = atomic_write(manifest, patch.text.as_bytes()) {
            return PatchOutcome::failed("writeFailed", format!("{e:#}"));
        }
        tracing::info!(
            "Patched {}: {} edit(s) adding {} -> {}",
            manifest.display(),
            patch.changes.len(),
            from_target,
            to_target
        );
        PatchOutcome::applied(patch.changes)
    }

    /// Compute the patched text without touching the file system.
    ///
    /// # Errors
    ///
    /// - [`DepsError::TargetNotFound`] when `from_target` has no balanced block
    /// - [`DepsError::ManifestMalformed`] when a span that must be edited is
    ///   unbalanced or is not an array literal
    /// - [`DepsError::MissingProvenance`] when a package must be declared but
    ///   no location is known
    ///
    /// # Examples
    ///
    /// ```
    /// use spmdeps::manifest::ManifestPatcher;
    /// use std::path::Path;
    ///
    /// let text = r#"let package = Package(name: "P", targets: [
    ///     .target(name: "App", dependencies: ["Core"]),
    ///     .target(name: "Core"),
    ///     .target(name: "Feature"),
    /// ])"#;
    /// let patch = ManifestPatcher::default()
    ///     .apply(text, Path::new("Package.swift"), "App", "Feature", None)
    ///     .unwrap();
    /// assert!(patch.text.contains(r#"dependencies: ["Core", "Feature"]"#));
    /// ```
    pub fn apply(
        &self,
        text: &str,
        manifest: &Path,
        from_target: &str,
        to_target: &str,
        context: Option<&PackageContext>,
    ) -> Result<Patch, DepsError> {
        let file = normalize_path_for_storage(manifest);
        let mut text = text.to_string();
        let mut changes = Vec::new();
        let parsed = ManifestParser::parse_structure(&text);
        let block = locate_block(&parsed, manifest, from_target)?;

        let Some(context) = context else {
            let present = block
                .info
                .dependencies
                .iter()
                .any(|d| d.may_be_local() && d.name() == to_target);
            if !present {
                let token = swift_string(to_target);
                text = insert_dependency(&text, block, &token, manifest)?;
                changes.push(Change::TargetDependency {
                    from_target: from_target.to_string(),
                    to_target: to_target.to_string(),
                    file,
                });
            }
            return Ok(Patch {
                text,
                changes,
            });
        };

        let package_ref = match find_declaration(&parsed, context) {
            Some(decl) => decl.identity().unwrap_or_else(|| context.package_name.clone()),
            None => {
                let (decl_token, identity) = self.declaration_token(context)?;
                text = insert_package_declaration(&text, &parsed, &decl_token, manifest)?;
                changes.push(Change::PackageDeclaration {
                    package_name: identity.clone(),
                    package_ref: decl_token,
                    file: file.clone(),
                });
                identity
            }
        };

        let parsed = ManifestParser::parse_structure(&text);
        let block = locate_block(&parsed, manifest, from_target)?;
        let present = block.info.dependencies.iter().any(|d| match d {
            Dependency::Product {
                name,
                package,
            } => {
                name == &context.product_name
                    && (package.eq_ignore_ascii_case(&package_ref)
                        || package.eq_ignore_ascii_case(&context.package_name))
            }
            _ => false,
        });
        if !present {
            let token = format!(
                ".product(name: {}, package: {})",
                swift_string(&context.product_name),
                swift_string(&package_ref)
            );
            text = insert_dependency(&text, block, &token, manifest)?;
            changes.push(Change::ProductDependency {
                from_target: from_target.to_string(),
                to_target: context.product_name.clone(),
                package_name: package_ref,
                file,
            });
        }

        Ok(Patch {
            text,
            changes,
        })
    }

    /// The `.package(...)` token for `context` and the identity it introduces.
    fn declaration_token(&self, context: &PackageContext) -> Result<(String, String), DepsError> {
        match &context.provenance {
            PackageProvenance::Url {
                url,
                requirement,
            } => {
                let floor = requirement
                    .as_deref()
                    .filter(|r| semver::Version::parse(r).is_ok())
                    .unwrap_or(&self.version_floor);
                let identity = crate::utils::location_basename(url)
                    .unwrap_or_else(|| context.package_name.clone());
                Ok((
                    format!(".package(url: {}, from: {})", swift_string(url), swift_string(floor)),
                    identity,
                ))
            }
            PackageProvenance::Path {
                relative,
            } => {
                let identity = crate::utils::location_basename(relative)
                    .unwrap_or_else(|| context.package_name.clone());
                Ok((format!(".package(path: {})", swift_string(relative)), identity))
            }
            PackageProvenance::Unknown => Err(DepsError::MissingProvenance {
                package: context.package_name.clone(),
            }),
        }
    }
}

fn locate_block<'p>(
    parsed: &'p ParsedManifest,
    manifest: &Path,
    target: &str,
) -> Result<&'p TargetBlock, DepsError> {
    match parsed.block(target) {
        Some(block) => Ok(block),
        None if parsed.is_skipped(target) => Err(DepsError::malformed(
            manifest,
            format!("target '{target}' has unbalanced brackets"),
        )),
        None => Err(DepsError::target_not_found(target, manifest)),
    }
}

fn normalize_location(location: &str) -> String {
    let trimmed = location.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.strip_suffix(".git").unwrap_or(trimmed).to_ascii_lowercase()
}

/// An existing declaration of the context's package, by identity or location.
fn find_declaration<'p>(parsed: &'p ParsedManifest, context: &PackageContext) -> Option<&'p PackageDecl> {
    parsed.package.package_decls.iter().find(|decl| {
        if decl.refers_to(&context.package_name) {
            return true;
        }
        match &context.provenance {
            PackageProvenance::Url {
                url,
                ..
            } => decl.url.as_deref().is_some_and(|u| normalize_location(u) == normalize_location(url)),
            PackageProvenance::Path {
                relative,
            } => decl
                .path
                .as_deref()
                .is_some_and(|p| normalize_location(p) == normalize_location(relative)),
            PackageProvenance::Unknown => false,
        }
    })
}

/// Quote `value` as a Swift string literal.
fn swift_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Debug)]
struct Edit {
    at: usize,
    text: String,
}

impl Edit {
    fn new(at: usize, text: impl Into<String>) -> Self {
        Self {
            at,
            text: text.into(),
        }
    }
}

/// Apply insertions; insertions at the same position appear in list order.
fn apply_edits(text: &str, edits: Vec<Edit>) -> String {
    let mut ordered: Vec<(usize, Edit)> = edits.into_iter().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| b.at.cmp(&a.at).then(ib.cmp(ia)));
    let mut out = text.to_string();
    for (_, edit) in ordered {
        out.insert_str(edit.at, &edit.text);
    }
    out
}

/// Where to start a new line after `anchor`: the end of its line, unless that
/// line ends inside a comment or at `limit`.
fn line_insert_point(map: &SourceMap<'_>, anchor: usize, limit: usize) -> usize {
    let end = map.line_end(anchor).min(limit);
    if end == limit || map.is_code(end) { end } else { anchor + 1 }
}

fn indent_inside(outer: &str) -> String {
    if outer.contains('\t') { format!("{outer}\t") } else { format!("{outer}{INDENT_UNIT}") }
}

/// Edits appending `token` to the array literal at `span`.
fn array_insertion(map: &SourceMap<'_>, span: ArraySpan, token: &str) -> Vec<Edit> {
    let entries = map.split_top_level(span.open, span.close);
    let Some(last) = entries.last() else {
        if map.spans_lines(span.open, span.close) {
            let inner = indent_inside(map.line_indent(span.close));
            let at = line_insert_point(map, span.open, span.close);
            return vec![Edit::new(at, format!("\n{inner}{token},"))];
        }
        return vec![Edit::new(span.open + 1, token)];
    };

    let bytes = map.text().as_bytes();
    let trailing_comma =
        map.last_significant_before(span.close, last.end).filter(|&i| bytes[i] == b',');

    if map.spans_lines(last.end, span.close) {
        let indent = map.line_indent(last.start);
        match trailing_comma {
            Some(comma) => {
                let at = line_insert_point(map, comma, span.close);
                vec![Edit::new(at, format!("\n{indent}{token},"))]
            }
            None => {
                let at = line_insert_point(map, last.end - 1, span.close);
                vec![Edit::new(last.end, ","), Edit::new(at, format!("\n{indent}{token}"))]
            }
        }
    } else {
        match trailing_comma {
            Some(comma) => vec![Edit::new(comma + 1, format!(" {token},"))],
            None => vec![Edit::new(last.end, format!(", {token}"))],
        }
    }
}

/// Insert `token` into `block`'s dependencies, creating the argument if absent.
fn insert_dependency(
    text: &str,
    block: &TargetBlock,
    token: &str,
    manifest: &Path,
) -> Result<String, DepsError> {
    if !block.info.kind.takes_dependencies() {
        return Err(DepsError::malformed(
            manifest,
            format!("'{}' is a system library or binary target and takes no dependencies", block.info.name),
        ));
    }
    let map = SourceMap::new(text);
    let edits = match &block.dependencies {
        DependenciesSpan::Array(span) => array_insertion(&map, *span, token),
        DependenciesSpan::Opaque => {
            return Err(DepsError::malformed(
                manifest,
                format!("dependencies of '{}' is not an array literal", block.info.name),
            ));
        }
        DependenciesSpan::Absent => {
            let name_end = block.name_literal.end;
            let next = map.skip_trivia(name_end, block.close);
            let next_arg = next.and_then(|comma| map.skip_trivia(comma + 1, block.close));
            match (next, next_arg) {
                (Some(comma), Some(arg))
                    if map.text().as_bytes()[comma] == b',' && map.spans_lines(comma, arg) =>
                {
                    let indent = map.line_indent(arg);
                    let at = line_insert_point(&map, comma, block.close);
                    vec![Edit::new(at, format!("\n{indent}dependencies: [{token}],"))]
                }
                _ => vec![Edit::new(name_end, format!(", dependencies: [{token}]"))],
            }
        }
    };
    Ok(apply_edits(text, edits))
}

/// Insert a `.package(...)` token into `Package(dependencies:)`, creating the
/// argument before `targets:` when absent.
fn insert_package_declaration(
    text: &str,
    parsed: &ParsedManifest,
    token: &str,
    manifest: &Path,
) -> Result<String, DepsError> {
    let map = SourceMap::new(text);
    if let Some(span) = parsed.package_dependencies {
        return Ok(apply_edits(text, array_insertion(&map, span, token)));
    }
    if let Some((open, close)) = parsed.package_call
        && map.find_label(open, close, "dependencies").is_some()
    {
        return Err(DepsError::malformed(manifest, "package dependencies is not an array literal"));
    }
    if parsed.package_call.is_some()
        && let Some(label) = parsed.targets_label
    {
        let indent = map.line_indent(label);
        let label_starts_line = text[..label].ends_with(indent)
            && text[..label.saturating_sub(indent.len())].ends_with('\n');
        let insertion = if label_starts_line {
            let inner = indent_inside(indent);
            format!("dependencies: [\n{inner}{token},\n{indent}],\n{indent}")
        } else {
            format!("dependencies: [{token}], ")
        };
        return Ok(apply_edits(text, vec![Edit::new(label, insertion)]));
    }
    Err(DepsError::malformed(manifest, "no Package(...) call with a targets argument"))
}

/// The path a manifest would use to declare `package_dir`.
#[must_use]
pub fn relative_declaration_path(manifest: &Path, package_dir: &Path) -> String {
    let base = manifest.parent().map_or_else(PathBuf::new, Path::to_path_buf);
    crate::utils::compute_relative_path(&base, package_dir)
}
