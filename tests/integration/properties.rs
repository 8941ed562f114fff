//! Behavior that must hold across repeated and combined edits.

use anyhow::Result;
use spmdeps::core::ResolutionMode;
use spmdeps::graph::{DependencyGraphAnalyzer, is_reachable};

use crate::common::{PackageBuilder, TestProject};

const NO_TRAILING_COMMA: &str = r#"// swift-tools-version:5.9
import PackageDescription

let package = Package(
    name: "Styles",
    targets: [
        .target(
            name: "App",
            dependencies: [
                "Core"
            ]
        ),
        .target(name: "Core"),
        .target(name: "Util"),
        .target(name: "Inline", dependencies: ["Core"]),
    ]
)
"#;

#[tokio::test]
async fn test_patch_twice_is_idempotent() -> Result<()> {
    let project = TestProject::new()?;
    let manifest = project.write_package("Package.swift", NO_TRAILING_COMMA)?;
    let service = project.service()?;

    let first = service.ensure_dependency(&manifest, "App", "Util", ResolutionMode::Fix).await;
    assert!(first.ok && first.changed, "{first:?}");
    let after_first = project.read(&manifest)?;

    let second = service.ensure_dependency(&manifest, "App", "Util", ResolutionMode::Fix).await;
    assert!(second.ok && !second.changed, "{second:?}");
    assert_eq!(project.read(&manifest)?, after_first);
    Ok(())
}

#[tokio::test]
async fn test_no_dangling_comma_in_multiline_array() -> Result<()> {
    let project = TestProject::new()?;
    let manifest = project.write_package("Package.swift", NO_TRAILING_COMMA)?;
    let service = project.service()?;

    service.ensure_dependency(&manifest, "App", "Util", ResolutionMode::Fix).await;
    let text = project.read(&manifest)?;
    assert!(
        text.contains("            dependencies: [\n                \"Core\",\n                \"Util\"\n            ]"),
        "{text}"
    );
    assert!(text.lines().all(|line| line.trim() != ","));
    Ok(())
}

#[tokio::test]
async fn test_single_line_array_stays_single_line() -> Result<()> {
    let project = TestProject::new()?;
    let manifest = project.write_package("Package.swift", NO_TRAILING_COMMA)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "Inline", "Util", ResolutionMode::Fix).await;
    assert!(result.changed, "{result:?}");
    let text = project.read(&manifest)?;
    assert!(text.contains(r#".target(name: "Inline", dependencies: ["Core", "Util"]),"#));
    Ok(())
}

#[tokio::test]
async fn test_missing_dependencies_argument_is_created() -> Result<()> {
    let project = TestProject::new()?;
    let manifest = project.write_package("Package.swift", NO_TRAILING_COMMA)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&manifest, "Util", "Core", ResolutionMode::Fix).await;
    assert!(result.ok && result.changed, "{result:?}");
    let text = project.read(&manifest)?;
    assert!(text.contains(r#".target(name: "Util", dependencies: ["Core"]),"#));
    Ok(())
}

#[tokio::test]
async fn test_cycle_symmetry() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Pair").target("A", &["B"]).target("B", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let reverse = service.ensure_dependency(&manifest, "B", "A", ResolutionMode::Fix).await;
    assert!(!reverse.ok);
    assert_eq!(reverse.reason.as_deref(), Some("cycleBlocked"));

    let forward = service.ensure_dependency(&manifest, "A", "B", ResolutionMode::Fix).await;
    assert!(forward.ok);
    assert!(!forward.changed);
    assert!(forward.reason.is_none());
    Ok(())
}

#[tokio::test]
async fn test_levels_stay_monotonic_after_edits() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layered")
        .target("App", &["Feature"])
        .target("Feature", &["Model"])
        .target("Model", &["Core"])
        .target("Core", &[])
        .target("Logging", &[])
        .target("Settings", &["Core"])
        .build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    for (from, to) in [("Feature", "Logging"), ("App", "Settings"), ("Model", "Logging"), ("Settings", "Logging")] {
        let result = service.ensure_dependency(&manifest, from, to, ResolutionMode::Fix).await;
        assert!(result.ok, "{from} -> {to}: {result:?}");
    }

    let graph = service.graph_cache().get_or_build(&manifest).await.expect("graph");
    let analysis = DependencyGraphAnalyzer::default().analyze(&graph);
    assert_eq!(analysis.topology.len(), graph.targets_list.len());
    for from in &graph.targets_list {
        for to in &graph.targets_list {
            if from != to && is_reachable(&graph, from, to) {
                assert!(analysis.levels[to] < analysis.levels[from], "{to} should sit below {from}");
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_external_edit_is_picked_up() -> Result<()> {
    let project = TestProject::new()?;
    let text = PackageBuilder::new("Layers").target("App", &[]).target("Core", &[]).build();
    let manifest = project.write_package("Package.swift", &text)?;
    let service = project.service()?;

    let before = service.ensure_dependency(&manifest, "Core", "App", ResolutionMode::Suggest).await;
    assert_eq!(before.reason.as_deref(), Some("patchRequired"));

    let edited = text.replace(r#".target(name: "App", dependencies: []),"#, r#".target(name: "App", dependencies: ["Core"]),"#);
    std::fs::write(&manifest, &edited)?;
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    std::fs::File::options().write(true).open(&manifest)?.set_modified(later)?;

    let after = service.ensure_dependency(&manifest, "Core", "App", ResolutionMode::Suggest).await;
    assert_eq!(after.reason.as_deref(), Some("cycleBlocked"));
    Ok(())
}
