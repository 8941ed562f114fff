//! Ordered parse strategies for reading a manifest from disk.
//!
//! [`ExternalParserBridge`] holds a list of [`ParseStrategy`] values and tries
//! them in order, stopping at the first success. External strategies run in a
//! child process under a hard deadline; when the deadline passes the child is
//! killed and the bridge moves on as if the strategy were unavailable. The
//! syntactic parser always closes the list, so a manifest that any parser can
//! read yields a [`PackageInfo`].
//!
//! # Helper Protocol
//!
//! A helper is spawned as `<helper> --manifest <path> --format json-lines`. It
//! receives one JSON request line on stdin and writes JSON lines to stdout.
//! Lines whose `type` is not `"result"` are ignored; the first result line ends
//! the exchange:
//!
//! ```json
//! {"type":"result","ok":true,"package":{"name":"App","targets":[{"name":"App","dependencies":[{"kind":"string","name":"Core"}]}]}}
//! ```
//!
//! # Toolchain Dump
//!
//! `swift package dump-package` output is normalized into the same shape: the
//! `byName`/`target`/`product` tuple arrays become [`Dependency`] values and
//! `sourceControl`/`fileSystem`/`registry` entries become [`PackageDecl`]s.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{
    Dependency, ManifestParser, PackageDecl, PackageInfo, ProductDecl, TargetInfo, TargetKind,
};
use crate::config::ParserConfig;
use crate::core::DepsError;

/// One way of turning a manifest file into a [`PackageInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Dedicated helper executable speaking the JSON-lines protocol.
    HelperProcess {
        /// Helper executable
        command: PathBuf,
    },
    /// `swift package dump-package`.
    ToolchainDump {
        /// Swift driver
        swift: PathBuf,
    },
    /// In-process syntactic parse.
    Syntactic,
}

impl ParseStrategy {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::HelperProcess { .. } => "helper",
            Self::ToolchainDump { .. } => "toolchain-dump",
            Self::Syntactic => "syntactic",
        }
    }

    /// Whether the strategy runs outside this process.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        !matches!(self, Self::Syntactic)
    }

    /// Parse `manifest` with this strategy.
    ///
    /// External strategies are bounded by `timeout`; the syntactic strategy
    /// ignores it.
    pub async fn parse(&self, manifest: &Path, timeout: Duration) -> Result<PackageInfo, DepsError> {
        match self {
            Self::HelperProcess {
                command,
            } => tokio::time::timeout(timeout, run_helper(command, manifest))
                .await
                .map_err(|_| DepsError::ExternalParserTimeout {
                    timeout,
                })?,
            Self::ToolchainDump {
                swift,
            } => run_toolchain_dump(swift, manifest, timeout).await,
            Self::Syntactic => {
                let text = tokio::fs::read_to_string(manifest).await.map_err(|_| {
                    DepsError::ParseUnavailable {
                        path: manifest.to_path_buf(),
                    }
                })?;
                ManifestParser::parse(&text).ok_or_else(|| DepsError::ParseUnavailable {
                    path: manifest.to_path_buf(),
                })
            }
        }
    }
}

/// Tries each configured [`ParseStrategy`] in order.
#[derive(Debug, Clone)]
pub struct ExternalParserBridge {
    strategies: Vec<ParseStrategy>,
    timeout: Duration,
}

impl ExternalParserBridge {
    /// Build the strategy list from configuration: helper, then toolchain
    /// dump, then the syntactic parser.
    #[must_use]
    pub fn from_config(config: &ParserConfig) -> Self {
        let mut strategies = Vec::new();
        if let Some(helper) = &config.helper {
            strategies.push(ParseStrategy::HelperProcess {
                command: helper.clone(),
            });
        }
        if config.toolchain_dump {
            strategies.push(ParseStrategy::ToolchainDump {
                swift: config.swift.clone(),
            });
        }
        strategies.push(ParseStrategy::Syntactic);
        Self {
            strategies,
            timeout: config.timeout(),
        }
    }

    /// A bridge that only runs the syntactic parser.
    #[must_use]
    pub fn syntactic_only() -> Self {
        Self {
            strategies: vec![ParseStrategy::Syntactic],
            timeout: ParserConfig::default().timeout(),
        }
    }

    /// Configured strategies in the order they are tried.
    #[must_use]
    pub fn strategies(&self) -> &[ParseStrategy] {
        &self.strategies
    }

    /// Run only the external strategies.
    ///
    /// Returns `None` when none is configured or every one failed, timed out,
    /// or produced no targets; the caller then falls back to the syntactic
    /// parser.
    pub async fn try_parse(&self, manifest: &Path) -> Option<PackageInfo> {
        for strategy in self.strategies.iter().filter(|s| s.is_external()) {
            match strategy.parse(manifest, self.timeout).await {
                Ok(info) if info.has_targets() => return Some(info),
                Ok(_) => {
                    tracing::debug!(
                        "{} parser returned no targets for {}",
                        strategy.name(),
                        manifest.display()
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        "{} parser unavailable for {}: {}",
                        strategy.name(),
                        manifest.display(),
                        e
                    );
                }
            }
        }
        None
    }

    /// Run every strategy in order and return the first usable result.
    ///
    /// A missing package name is filled in from the manifest directory's
    /// basename.
    ///
    /// # Errors
    ///
    /// [`DepsError::ParseUnavailable`] when the manifest is missing or no
    /// strategy recovered any target.
    pub async fn parse(&self, manifest: &Path) -> Result<PackageInfo, DepsError> {
        let mut info = match self.try_parse(manifest).await {
            Some(info) => info,
            None => {
                let info = ParseStrategy::Syntactic.parse(manifest, self.timeout).await?;
                if !info.has_targets() {
                    return Err(DepsError::ParseUnavailable {
                        path: manifest.to_path_buf(),
                    });
                }
                info
            }
        };
        if info.name.is_none() {
            info.name = manifest
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned());
        }
        Ok(info)
    }
}

fn failed(detail: impl Into<String>) -> DepsError {
    DepsError::ExternalParserFailed {
        detail: detail.into(),
    }
}

#[derive(Debug, Deserialize)]
struct HelperMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    package: Option<PackageInfo>,
    #[serde(default)]
    error: Option<String>,
}

async fn run_helper(command: &Path, manifest: &Path) -> Result<PackageInfo, DepsError> {
    tracing::debug!("Running manifest helper {} for {}", command.display(), manifest.display());

    let mut child = Command::new(command)
        .arg("--manifest")
        .arg(manifest)
        .arg("--format")
        .arg("json-lines")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failed(format!("failed to spawn {}: {e}", command.display())))?;

    if let Some(mut stdin) = child.stdin.take() {
        let mut request = serde_json::json!({
            "type": "parse",
            "manifest": manifest,
            "format": "json",
        })
        .to_string();
        request.push('\n');
        // A helper that never reads stdin may already have closed the pipe
        if let Err(e) = stdin.write_all(request.as_bytes()).await {
            tracing::debug!("Manifest helper did not accept a request: {}", e);
        }
    }

    let stdout = child.stdout.take().ok_or_else(|| failed("helper stdout unavailable"))?;
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) =
        lines.next_line().await.map_err(|e| failed(format!("failed to read helper output: {e}")))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: HelperMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Ignoring non-protocol helper line: {}", e);
                continue;
            }
        };
        if message.kind != "result" {
            continue;
        }
        if !message.ok {
            return Err(failed(
                message.error.unwrap_or_else(|| "helper reported failure".to_string()),
            ));
        }
        return message.package.ok_or_else(|| failed("helper result carried no package"));
    }

    let status = child.wait().await.map_err(|e| failed(e.to_string()))?;
    Err(failed(format!("helper exited with {status} before sending a result")))
}

async fn run_toolchain_dump(
    swift: &Path,
    manifest: &Path,
    timeout: Duration,
) -> Result<PackageInfo, DepsError> {
    let package_dir = manifest.parent().unwrap_or_else(|| Path::new("."));
    tracing::debug!("Running {} package dump-package in {}", swift.display(), package_dir.display());

    let output = tokio::time::timeout(
        timeout,
        Command::new(swift)
            .arg("package")
            .arg("dump-package")
            .arg("--package-path")
            .arg(package_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| DepsError::ExternalParserTimeout {
        timeout,
    })?
    .map_err(|e| failed(format!("failed to run {}: {e}", swift.display())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(format!("dump-package exited with {}: {}", output.status, stderr.trim())));
    }

    let value: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| failed(format!("invalid dump-package output: {e}")))?;
    normalize_dump(&value)
}

/// Convert `swift package dump-package` JSON into a [`PackageInfo`].
///
/// # Errors
///
/// [`DepsError::ExternalParserFailed`] when the document has no `targets` array.
pub fn normalize_dump(value: &Value) -> Result<PackageInfo, DepsError> {
    let targets = value
        .get("targets")
        .and_then(Value::as_array)
        .ok_or_else(|| failed("dump-package output has no targets array"))?;

    let targets = targets.iter().filter_map(normalize_target).collect();

    let package_decls = value
        .get("dependencies")
        .and_then(Value::as_array)
        .map(|deps| deps.iter().filter_map(normalize_package_decl).collect())
        .unwrap_or_default();

    let products = value
        .get("products")
        .and_then(Value::as_array)
        .map(|products| products.iter().filter_map(normalize_product).collect())
        .unwrap_or_default();

    Ok(PackageInfo {
        name: value.get("name").and_then(Value::as_str).map(str::to_string),
        targets,
        package_decls,
        products,
    })
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items.iter().filter_map(Value::as_str).map(str::to_string).collect()
    })
}

fn normalize_target(value: &Value) -> Option<TargetInfo> {
    let name = value.get("name")?.as_str()?.to_string();
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(TargetKind::from_dump_type)
        .unwrap_or_default();
    let dependencies = value
        .get("dependencies")
        .and_then(Value::as_array)
        .map(|deps| deps.iter().filter_map(normalize_dependency).collect())
        .unwrap_or_default();
    Some(TargetInfo {
        name,
        kind,
        path: value.get("path").and_then(Value::as_str).map(str::to_string),
        sources: string_list(value.get("sources")),
        dependencies,
    })
}

/// `{"byName": ["X", null]}`, `{"target": ["X", null]}`,
/// `{"product": ["X", "pkg", null, null]}`
fn normalize_dependency(value: &Value) -> Option<Dependency> {
    let object = value.as_object()?;
    let (kind, args) = object.iter().next()?;
    let args = args.as_array()?;
    let name = args.first()?.as_str()?.to_string();
    match kind.as_str() {
        "byName" => Some(Dependency::ByName {
            name,
        }),
        "target" => Some(Dependency::Target {
            name,
        }),
        "product" => {
            let package = args.get(1)?.as_str()?.to_string();
            Some(Dependency::Product {
                name,
                package,
            })
        }
        _ => None,
    }
}

fn normalize_package_decl(value: &Value) -> Option<PackageDecl> {
    let object = value.as_object()?;
    let (kind, entries) = object.iter().next()?;
    let entry = entries.as_array()?.first()?;
    let name = entry
        .get("nameForTargetDependencyResolutionOnly")
        .or_else(|| entry.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let requirement = entry.get("requirement").and_then(normalize_requirement);

    match kind.as_str() {
        "sourceControl" => Some(PackageDecl {
            name,
            url: entry.get("location").and_then(remote_location),
            requirement,
            ..PackageDecl::default()
        }),
        "fileSystem" | "local" => Some(PackageDecl {
            name,
            path: entry.get("path").and_then(Value::as_str).map(str::to_string),
            ..PackageDecl::default()
        }),
        "registry" => Some(PackageDecl {
            name,
            id: entry.get("identity").and_then(Value::as_str).map(str::to_string),
            requirement,
            ..PackageDecl::default()
        }),
        _ => None,
    }
}

/// `"location": {"remote": [{"urlString": "..."}]}`, or the legacy forms
/// `{"remote": ["..."]}` and a bare string.
fn remote_location(location: &Value) -> Option<String> {
    if let Some(url) = location.as_str() {
        return Some(url.to_string());
    }
    let remote = location.get("remote")?.as_array()?.first()?;
    remote
        .as_str()
        .or_else(|| remote.get("urlString").and_then(Value::as_str))
        .map(str::to_string)
}

/// `{"range": [{"lowerBound": "1.0.0", ...}]}`, `{"exact": ["1.2.3"]}`,
/// `{"branch": ["main"]}`, `{"revision": ["abc"]}`
fn normalize_requirement(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let (kind, args) = object.iter().next()?;
    let first = args.as_array()?.first()?;
    match kind.as_str() {
        "range" => first.get("lowerBound").and_then(Value::as_str).map(str::to_string),
        _ => first.as_str().map(str::to_string),
    }
}

fn normalize_product(value: &Value) -> Option<ProductDecl> {
    let name = value.get("name")?.as_str()?.to_string();
    let kind = value
        .get("type")
        .and_then(Value::as_object)
        .and_then(|t| t.keys().next().cloned())
        .unwrap_or_else(|| "library".to_string());
    Some(ProductDecl {
        name,
        kind,
        targets: string_list(value.get("targets")).unwrap_or_default(),
    })
}
