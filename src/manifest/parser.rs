//! Syntactic ("AST-lite") parsing of `Package.swift`.
//!
//! The parser recognizes a handful of structural tokens on top of the
//! [`SourceMap`] classification and ignores any code it does not understand:
//!
//! - the `Package(...)` call and its `name:`, `products:`, `dependencies:`
//!   and `targets:` arguments
//! - target constructors (`.target(`, `.executableTarget(`, ...) that are
//!   elements of `targets: [...]`, `package.targets += [...]` or
//!   `package.targets.append(...)`; the same calls anywhere else are
//!   references, not declarations
//! - `.package(...)` declarations
//! - dependency entries: bare strings, `.target(name:)`, `.byName(name:)`,
//!   and `.product(name:package:)`
//!
//! Parsing never fails. A target whose parentheses do not balance is skipped
//! and counted in [`ParsedManifest::skipped`]; the rest of the manifest is
//! still returned. Byte spans of every recognized construct are kept so the
//! [patcher](super::patcher) can edit the text in place.

use std::ops::Range;

use super::lexer::{SourceMap, is_ident_byte};
use super::{Dependency, PackageDecl, PackageInfo, ProductDecl, TargetInfo, TargetKind};

/// Bracket pair of an array literal: indices of `[` and `]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySpan {
    /// Index of the opening bracket
    pub open: usize,
    /// Index of the closing bracket
    pub close: usize,
}

/// How a target's `dependencies:` argument is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependenciesSpan {
    /// No `dependencies:` argument.
    Absent,
    /// An array literal.
    Array(ArraySpan),
    /// Something other than an array literal (a variable, a concatenation).
    Opaque,
}

/// One entry of a dependencies array together with its source range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    /// Recognized dependency, `None` for entries the parser does not understand
    pub dependency: Option<Dependency>,
    /// Trimmed byte range of the entry
    pub range: Range<usize>,
}

/// A balanced target declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBlock {
    /// Parsed target
    pub info: TargetInfo,
    /// Index of the leading `.` of the constructor
    pub start: usize,
    /// Index of the constructor's `(`
    pub open: usize,
    /// Index of the constructor's `)`
    pub close: usize,
    /// Range of the `name:` string literal
    pub name_literal: Range<usize>,
    /// The `dependencies:` argument
    pub dependencies: DependenciesSpan,
    /// Entries of the dependencies array, when it is a literal
    pub entries: Vec<DependencyEntry>,
}

/// A target constructor whose parentheses never balanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBlock {
    /// Index of the leading `.` of the constructor
    pub start: usize,
    /// Name, when it could still be read from the leading `name:` argument
    pub name: Option<String>,
}

/// Result of a syntactic parse: the normalized package plus source spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedManifest {
    /// Normalized package information
    pub package: PackageInfo,
    /// `(` and `)` of the top-level `Package(...)` call
    pub package_call: Option<(usize, usize)>,
    /// The `Package(dependencies: [...])` array
    pub package_dependencies: Option<ArraySpan>,
    /// Index of the `targets` label inside `Package(...)`
    pub targets_label: Option<usize>,
    /// Balanced target declarations in source order
    pub blocks: Vec<TargetBlock>,
    /// Unbalanced target constructors
    pub skipped: Vec<SkippedBlock>,
    /// Spans of every `.package(...)` call, parallel to `package.package_decls`
    pub package_decl_spans: Vec<Range<usize>>,
}

impl ParsedManifest {
    /// Find the balanced block declaring `name`.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&TargetBlock> {
        self.blocks.iter().find(|b| b.info.name == name)
    }

    /// Whether `name` was declared in a block that could not be balanced.
    #[must_use]
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.iter().any(|s| s.name.as_deref() == Some(name))
    }
}

/// Stateless syntactic manifest parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestParser;

impl ManifestParser {
    /// Parse manifest text into a [`PackageInfo`].
    ///
    /// Returns `None` only when neither a package name nor any target could be
    /// recovered.
    ///
    /// # Examples
    ///
    /// ```
    /// use spmdeps::manifest::ManifestParser;
    ///
    /// let text = r#"
    /// let package = Package(
    ///     name: "App",
    ///     targets: [
    ///         .target(name: "Core"),
    ///         .target(name: "App", dependencies: ["Core"]),
    ///     ]
    /// )
    /// "#;
    /// let info = ManifestParser::parse(text).unwrap();
    /// assert_eq!(info.name.as_deref(), Some("App"));
    /// assert_eq!(info.targets.len(), 2);
    /// assert_eq!(info.target("App").unwrap().dependencies[0].name(), "Core");
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Option<PackageInfo> {
        let parsed = Self::parse_structure(text);
        if parsed.package.name.is_none() && parsed.package.targets.is_empty() {
            None
        } else {
            Some(parsed.package)
        }
    }

    /// Parse manifest text keeping byte spans for in-place edits.
    #[must_use]
    pub fn parse_structure(text: &str) -> ParsedManifest {
        let map = SourceMap::new(text);
        let mut parsed = ParsedManifest::default();

        if let Some((open, close)) = find_package_call(&map) {
            parsed.package_call = Some((open, close));
            parsed.package.name = label_string(&map, open, close, "name");
            parsed.package_dependencies = label_array(&map, open, close, "dependencies");
            parsed.targets_label = map.find_label(open, close, "targets").and_then(|after| {
                text[..after].rfind("targets")
            });
            if let Some(products) = label_array(&map, open, close, "products") {
                parsed.package.products = parse_products(&map, products);
            }
        }

        for (dot, paren) in map.member_calls("package", 0..map.len()) {
            let Some(close) = map.find_matching(paren) else {
                continue;
            };
            parsed.package.package_decls.push(parse_package_decl(&map, paren, close));
            parsed.package_decl_spans.push(dot..close + 1);
        }

        let mut candidates: Vec<(usize, usize, TargetKind)> = TargetKind::CONSTRUCTORS
            .iter()
            .flat_map(|(name, kind)| {
                map.member_calls(name, 0..map.len())
                    .into_iter()
                    .map(move |(dot, paren)| (dot, paren, *kind))
            })
            .collect();
        candidates.sort_by_key(|(dot, _, _)| *dot);
        let dots: Vec<usize> = candidates.iter().map(|(dot, _, _)| *dot).collect();
        let openers = enclosing_openers(&map, &dots);

        let mut covered_until = 0usize;
        for ((dot, paren, kind), opener) in candidates.into_iter().zip(openers) {
            if dot < covered_until {
                continue;
            }
            if !opener.is_some_and(|open| is_targets_container(&map, open)) {
                tracing::debug!("Ignoring target constructor at byte {} outside a targets list", dot);
                continue;
            }
            let Some(close) = map.find_matching(paren) else {
                let name = leading_name(&map, paren);
                tracing::debug!(
                    "Skipping unbalanced target constructor at byte {} ({})",
                    dot,
                    name.as_deref().unwrap_or("unnamed")
                );
                parsed.skipped.push(SkippedBlock {
                    start: dot,
                    name,
                });
                continue;
            };
            if let Some(block) = parse_target_block(&map, dot, paren, close, kind) {
                covered_until = close + 1;
                parsed.package.targets.push(block.info.clone());
                parsed.blocks.push(block);
            }
        }

        parsed
    }
}

fn find_package_call(map: &SourceMap<'_>) -> Option<(usize, usize)> {
    let text = map.text();
    map.code_occurrences("Package", 0..map.len()).into_iter().find_map(|idx| {
        if idx > 0 {
            let prev = text.as_bytes()[idx - 1];
            if is_ident_byte(prev) || prev == b'.' {
                return None;
            }
        }
        let after = idx + "Package".len();
        if after < text.len() && is_ident_byte(text.as_bytes()[after]) {
            return None;
        }
        let paren = map.skip_trivia(after, map.len())?;
        if text.as_bytes()[paren] != b'(' {
            return None;
        }
        map.find_matching(paren).map(|close| (paren, close))
    })
}

/// Innermost open bracket before each of the sorted `positions`.
///
/// Stray closers pop whatever is open, so text after an unbalanced construct
/// still gets a best-effort answer.
fn enclosing_openers(map: &SourceMap<'_>, positions: &[usize]) -> Vec<Option<usize>> {
    let bytes = map.text().as_bytes();
    let mut stack: Vec<usize> = Vec::new();
    let mut idx = 0usize;
    positions
        .iter()
        .map(|&pos| {
            while idx < pos {
                if map.is_code(idx) {
                    match bytes[idx] {
                        b'(' | b'[' | b'{' => stack.push(idx),
                        b')' | b']' | b'}' => {
                            stack.pop();
                        }
                        _ => {}
                    }
                }
                idx += 1;
            }
            stack.last().copied()
        })
        .collect()
}

/// Identifier ending at the last significant byte before `before`.
fn word_before<'a>(map: &SourceMap<'a>, before: usize) -> Option<(usize, &'a str)> {
    let text = map.text();
    let end = map.last_significant_before(before, 0)? + 1;
    let start = text.as_bytes()[..end]
        .iter()
        .rposition(|&b| !is_ident_byte(b))
        .map_or(0, |i| i + 1);
    (start < end).then(|| (start, &text[start..end]))
}

/// Whether the code before `before` ends in a `targets` property, as in
/// `package.targets`.
fn is_targets_receiver(map: &SourceMap<'_>, before: usize) -> bool {
    word_before(map, before).is_some_and(|(_, word)| word == "targets")
}

/// `targets.append(` with `paren` at the opening parenthesis.
fn is_targets_append(map: &SourceMap<'_>, paren: usize) -> bool {
    let bytes = map.text().as_bytes();
    let Some((start, "append")) = word_before(map, paren) else {
        return false;
    };
    map.last_significant_before(start, 0)
        .is_some_and(|dot| bytes[dot] == b'.' && is_targets_receiver(map, dot))
}

/// Whether elements directly inside `open` are target declarations:
/// `targets: [`, `targets += [`, `targets.append(` and
/// `targets.append(contentsOf: [`.
fn is_targets_container(map: &SourceMap<'_>, open: usize) -> bool {
    let bytes = map.text().as_bytes();
    match bytes[open] {
        b'(' => is_targets_append(map, open),
        b'[' => {
            let Some(prev) = map.last_significant_before(open, 0) else {
                return false;
            };
            match bytes[prev] {
                b':' => match word_before(map, prev) {
                    Some((_, "targets")) => true,
                    Some((start, "contentsOf")) => map
                        .last_significant_before(start, 0)
                        .is_some_and(|paren| bytes[paren] == b'(' && is_targets_append(map, paren)),
                    _ => false,
                },
                b'=' => prev > 0 && bytes[prev - 1] == b'+' && is_targets_receiver(map, prev - 1),
                _ => false,
            }
        }
        _ => false,
    }
}

/// Value of a `label: "literal"` argument at depth zero of `open..close`.
fn label_string(map: &SourceMap<'_>, open: usize, close: usize, label: &str) -> Option<String> {
    label_literal(map, open, close, label).map(|(_, value)| value)
}

fn label_literal(
    map: &SourceMap<'_>,
    open: usize,
    close: usize,
    label: &str,
) -> Option<(Range<usize>, String)> {
    let after = map.find_label(open, close, label)?;
    let value = map.skip_trivia(after, close)?;
    map.string_literal_at(value)
}

/// Span of a `label: [ ... ]` array argument at depth zero of `open..close`.
fn label_array(map: &SourceMap<'_>, open: usize, close: usize, label: &str) -> Option<ArraySpan> {
    let after = map.find_label(open, close, label)?;
    let bracket = map.skip_trivia(after, close)?;
    if map.text().as_bytes()[bracket] != b'[' {
        return None;
    }
    let end = map.find_matching(bracket)?;
    Some(ArraySpan {
        open: bracket,
        close: end,
    })
}

fn string_elements(map: &SourceMap<'_>, span: ArraySpan) -> Vec<String> {
    map.split_top_level(span.open, span.close)
        .into_iter()
        .filter_map(|range| map.string_literal_at(range.start).map(|(_, value)| value))
        .collect()
}

/// Read `name: "..."` directly after an opening parenthesis, without needing
/// the closing one.
fn leading_name(map: &SourceMap<'_>, paren: usize) -> Option<String> {
    let text = map.text();
    let label = map.skip_trivia(paren + 1, map.len())?;
    if !text[label..].starts_with("name") {
        return None;
    }
    let colon = map.skip_trivia(label + "name".len(), map.len())?;
    if text.as_bytes()[colon] != b':' {
        return None;
    }
    let value = map.skip_trivia(colon + 1, map.len())?;
    map.string_literal_at(value).map(|(_, name)| name)
}

fn parse_target_block(
    map: &SourceMap<'_>,
    dot: usize,
    open: usize,
    close: usize,
    kind: TargetKind,
) -> Option<TargetBlock> {
    let (name_literal, name) = label_literal(map, open, close, "name")?;

    // `.plugin(name:targets:)` inside `products:` is a product, not a target
    if kind == TargetKind::Plugin
        && map.find_label(open, close, "targets").is_some()
        && map.find_label(open, close, "capability").is_none()
    {
        return None;
    }

    let path = label_string(map, open, close, "path");
    let sources = label_array(map, open, close, "sources").map(|span| string_elements(map, span));

    let (dependencies, entries) = match map.find_label(open, close, "dependencies") {
        None => (DependenciesSpan::Absent, Vec::new()),
        Some(after) => match map.skip_trivia(after, close) {
            Some(bracket) if map.text().as_bytes()[bracket] == b'[' => {
                match map.find_matching(bracket) {
                    Some(end) => {
                        let span = ArraySpan {
                            open: bracket,
                            close: end,
                        };
                        (DependenciesSpan::Array(span), parse_dependency_entries(map, span))
                    }
                    None => (DependenciesSpan::Opaque, Vec::new()),
                }
            }
            _ => (DependenciesSpan::Opaque, Vec::new()),
        },
    };

    let info = TargetInfo {
        name,
        kind,
        path,
        sources,
        dependencies: entries.iter().filter_map(|e| e.dependency.clone()).collect(),
    };

    Some(TargetBlock {
        info,
        start: dot,
        open,
        close,
        name_literal,
        dependencies,
        entries,
    })
}

/// Classify every element of a dependencies array.
pub(crate) fn parse_dependency_entries(map: &SourceMap<'_>, span: ArraySpan) -> Vec<DependencyEntry> {
    map.split_top_level(span.open, span.close)
        .into_iter()
        .map(|range| DependencyEntry {
            dependency: classify_entry(map, range.clone()),
            range,
        })
        .collect()
}

fn classify_entry(map: &SourceMap<'_>, range: Range<usize>) -> Option<Dependency> {
    if let Some((_, name)) = map.string_literal_at(range.start) {
        return Some(Dependency::String {
            name,
        });
    }

    for call in ["target", "byName", "product"] {
        let Some(&(dot, paren)) = map.member_calls(call, range.clone()).first() else {
            continue;
        };
        if dot != range.start {
            continue;
        }
        let close = map.find_matching(paren)?;
        let name = label_string(map, paren, close, "name")?;
        return match call {
            "target" => Some(Dependency::Target {
                name,
            }),
            "byName" => Some(Dependency::ByName {
                name,
            }),
            _ => label_string(map, paren, close, "package").map(|package| Dependency::Product {
                name,
                package,
            }),
        };
    }
    None
}

fn parse_package_decl(map: &SourceMap<'_>, open: usize, close: usize) -> PackageDecl {
    let name = label_literal(map, open, close, "name");
    let url = label_literal(map, open, close, "url");
    let path = label_literal(map, open, close, "path");
    let id = label_literal(map, open, close, "id");

    let requirement = ["from", "exact", "branch", "revision"]
        .iter()
        .find_map(|label| label_string(map, open, close, label))
        .or_else(|| {
            // nested forms: .upToNextMajor(from: "1.0.0"), .exact("1.2.3")
            map.code_occurrences("from", open..close).into_iter().find_map(|idx| {
                let colon = map.skip_trivia(idx + "from".len(), close)?;
                if map.text().as_bytes()[colon] != b':' {
                    return None;
                }
                let value = map.skip_trivia(colon + 1, close)?;
                map.string_literal_at(value).map(|(_, v)| v)
            })
        })
        .or_else(|| {
            // unlabeled ranges such as "1.0.0"..<"2.0.0"
            let taken: Vec<usize> =
                [&name, &url, &path, &id].into_iter().flatten().map(|(r, _)| r.start).collect();
            (open + 1..close)
                .filter(|&i| !taken.contains(&i))
                .find_map(|i| map.string_literal_at(i).map(|(_, v)| v))
        });

    PackageDecl {
        name: name.map(|(_, v)| v),
        url: url.map(|(_, v)| v),
        path: path.map(|(_, v)| v),
        id: id.map(|(_, v)| v),
        requirement,
    }
}

fn parse_products(map: &SourceMap<'_>, span: ArraySpan) -> Vec<ProductDecl> {
    let text = map.text();
    map.split_top_level(span.open, span.close)
        .into_iter()
        .filter_map(|range| {
            let body = text[range.clone()].trim_start();
            let kind = ["library", "executable", "plugin"]
                .into_iter()
                .find(|k| body.strip_prefix('.').is_some_and(|rest| rest.starts_with(k)))?;
            let &(_, paren) = map.member_calls(kind, range.clone()).first()?;
            let close = map.find_matching(paren)?;
            let name = label_string(map, paren, close, "name")?;
            let targets = label_array(map, paren, close, "targets")
                .map(|s| string_elements(map, s))
                .unwrap_or_default();
            Some(ProductDecl {
                name,
                kind: kind.to_string(),
                targets,
            })
        })
        .collect()
}
