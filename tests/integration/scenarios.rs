//! Single-package requests through the resolution service.

use anyhow::Result;
use spmdeps::config::EngineConfig;
use spmdeps::core::ResolutionMode;
use spmdeps::resolver::DependencyResolutionService;

use crate::common::{PackageBuilder, TestProject};

/// Target already listed: nothing to do.
#[tokio::test]
async fn test_existing_dependency_is_noop() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layers").target("App", &["Core"]).target("Core", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "App", "Core", ResolutionMode::Fix).await;
    assert!(result.ok, "{result:?}");
    assert!(!result.changed);
    assert!(result.changes.is_empty());
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

/// Empty dependency array gains the target, and replaying changes nothing.
#[tokio::test]
async fn test_insert_into_empty_array_then_replay() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layers").target("App", &[]).target("Feature", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let first = service.ensure_dependency(&manifest, "App", "Feature", ResolutionMode::Fix).await;
    assert!(first.ok && first.changed, "{first:?}");
    let patched = project.read(&manifest)?;
    assert!(patched.contains(r#".target(name: "App", dependencies: ["Feature"]),"#));

    let second = service.ensure_dependency(&manifest, "App", "Feature", ResolutionMode::Fix).await;
    assert!(second.ok, "{second:?}");
    assert!(!second.changed);
    assert_eq!(project.read(&manifest)?, patched);
    Ok(())
}

/// A level-0 target may not depend on a level-1 target it cannot reach.
#[tokio::test]
async fn test_downward_dependency_is_blocked() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layers")
        .target("App", &["Core"])
        .target("Core", &[])
        .target("Util", &[])
        .build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "Util", "App", ResolutionMode::Fix).await;
    assert!(!result.ok);
    assert_eq!(result.reason.as_deref(), Some("downwardDependency"));
    assert!(result.message.unwrap().contains("level 0"));
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

/// Reversing a direct edge is refused before any write.
#[tokio::test]
async fn test_reverse_of_direct_edge_is_blocked() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layers").target("App", &["Core"]).target("Core", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "Core", "App", ResolutionMode::Fix).await;
    assert!(!result.ok);
    assert!(!result.changed);
    assert_eq!(result.reason.as_deref(), Some("cycleBlocked"));
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

/// C -> A would close A -> B -> C -> A.
#[tokio::test]
async fn test_transitive_cycle_is_blocked() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Chain")
        .target("A", &["B"])
        .target("B", &["C"])
        .target("C", &[])
        .build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "C", "A", ResolutionMode::Fix).await;
    assert!(!result.ok);
    assert_eq!(result.reason.as_deref(), Some("cycleBlocked"));
    assert_eq!(result.message.as_deref(), Some("adding 'C' -> 'A' would create a cycle: C -> A -> B -> C"));
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

/// Transitively satisfied edges are reported without a patch.
#[tokio::test]
async fn test_already_reachable_is_noop() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Chain")
        .target("A", &["B"])
        .target("B", &["C"])
        .target("C", &[])
        .build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "A", "C", ResolutionMode::Fix).await;
    assert!(result.ok);
    assert!(!result.changed);
    assert!(result.message.unwrap().contains("A -> B -> C"));
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

#[tokio::test]
async fn test_suggest_mode_describes_without_writing() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layers").target("App", &["Core"]).target("Core", &[]).target("Util", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "App", "Util", ResolutionMode::Suggest).await;
    assert!(!result.ok);
    assert!(!result.changed);
    assert_eq!(result.reason.as_deref(), Some("patchRequired"));
    let suggestion = result.suggestion.unwrap();
    assert!(suggestion.contains("\"Util\""));
    assert!(suggestion.contains("'App'"));
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

#[tokio::test]
async fn test_configured_system_module_is_noop() -> Result<()> {
    let project = TestProject::new()?;
    project.write_package("spmdeps.toml", "[policy]\nsystem-modules = [\"VendorKit\"]\n")?;
    let text = PackageBuilder::new("Layers").target("App", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = DependencyResolutionService::open(project.root())?;

    let result = service.ensure_dependency(&manifest, "App", "VendorKit", ResolutionMode::Fix).await;
    assert!(result.ok);
    assert!(!result.changed);
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

#[tokio::test]
async fn test_unbalanced_target_reports_malformed() -> Result<()> {
    let project = TestProject::new()?;
    let text = r#"let package = Package(
    name: "Broken",
    targets: [
        .target(name: "Core"),
        .target(name: "App", dependencies: ["Core"]
"#;
    let manifest = project.write_package("Package.swift", text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "App", "Core", ResolutionMode::Fix).await;
    assert!(!result.ok);
    assert_eq!(result.reason.as_deref(), Some("manifestMalformed"));
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}

#[tokio::test]
async fn test_custom_cache_dir_holds_graphs() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layers").target("App", &["Core"]).target("Core", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let config = EngineConfig::from_toml_str("[cache]\ndir = \"cache\"\n")?;
    let service = project.service_with(&config)?;

    service.ensure_dependency(&manifest, "App", "Core", ResolutionMode::Suggest).await;
    assert!(project.root().join("cache/graphs").is_dir());
    assert!(project.root().join("cache/project-map.json").is_file());
    assert!(!project.root().join(".build").exists());
    Ok(())
}

/// A `.target(name:)` reference in a shared array does not hide the real
/// declaration, so the cycle through it is still seen.
#[tokio::test]
async fn test_shared_dependency_array_does_not_hide_cycle() -> Result<()> {
    let project = TestProject::new()?;
    let text = r#"// swift-tools-version:5.9
import PackageDescription

let featureDeps: [Target.Dependency] = [.target(name: "Feature")]

let package = Package(
    name: "Shared",
    targets: [
        .target(name: "Core", dependencies: []),
        .target(name: "Feature", dependencies: ["Core"]),
        .target(name: "App", dependencies: featureDeps),
    ]
)
"#;
    let manifest = project.write_package("Package.swift", text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "Core", "Feature", ResolutionMode::Fix).await;
    assert!(!result.ok, "{result:?}");
    assert!(!result.changed);
    assert_eq!(result.reason.as_deref(), Some("cycleBlocked"));
    assert_eq!(project.read(&manifest)?, text);
    Ok(())
}
