//! Requests whose destination is owned by another package of the project.

use anyhow::Result;
use spmdeps::core::ResolutionMode;
use spmdeps::manifest::patcher::Change;
use spmdeps::project::UpdateOptions;

use crate::common::{PackageBuilder, TestProject};

/// `Packages/Core` exporting `CoreKit` and an undeclared `Packages/Feature`.
fn two_packages(project: &TestProject) -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    let core = project.write_package(
        "Packages/Core/Package.swift",
        &PackageBuilder::new("Core")
            .product_library("CoreKit", &["Core"])
            .target("Core", &[])
            .build(),
    )?;
    let feature = project.write_package(
        "Packages/Feature/Package.swift",
        &PackageBuilder::new("Feature").target("Feature", &[]).build(),
    )?;
    Ok((core, feature))
}

#[tokio::test]
async fn test_cross_package_fix_declares_package_and_product() -> Result<()> {
    let project = TestProject::new()?;
    let (_core, feature) = two_packages(&project)?;
    let service = project.service()?;

    let first = service.ensure_dependency(&feature, "Feature", "Core", ResolutionMode::Fix).await;
    assert!(first.ok && first.changed, "{first:?}");
    assert_eq!(first.changes.len(), 2);
    assert!(matches!(&first.changes[0], Change::PackageDeclaration { package_ref, .. } if package_ref == r#".package(path: "../Core")"#));
    assert!(matches!(&first.changes[1], Change::ProductDependency { to_target, package_name, .. } if to_target == "CoreKit" && package_name == "Core"));

    let text = project.read(&feature)?;
    assert!(text.contains("    dependencies: [\n        .package(path: \"../Core\"),\n    ],\n    targets: ["), "{text}");
    assert!(text.contains(r#".target(name: "Feature", dependencies: [.product(name: "CoreKit", package: "Core")]),"#));

    let second = service.ensure_dependency(&feature, "Feature", "Core", ResolutionMode::Fix).await;
    assert!(second.ok && !second.changed, "{second:?}");
    assert_eq!(project.read(&feature)?, text);
    Ok(())
}

#[tokio::test]
async fn test_requesting_the_product_name_directly() -> Result<()> {
    let project = TestProject::new()?;
    let (_core, feature) = two_packages(&project)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&feature, "Feature", "CoreKit", ResolutionMode::Fix).await;
    assert!(result.ok && result.changed, "{result:?}");
    let text = project.read(&feature)?;
    assert!(text.contains(r#".product(name: "CoreKit", package: "Core")"#));
    Ok(())
}

#[tokio::test]
async fn test_cross_package_suggestion_lists_both_edits() -> Result<()> {
    let project = TestProject::new()?;
    let (_core, feature) = two_packages(&project)?;
    let before = project.read(&feature)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&feature, "Feature", "Core", ResolutionMode::Suggest).await;
    assert!(!result.ok);
    assert_eq!(result.reason.as_deref(), Some("patchRequired"));
    let suggestion = result.suggestion.unwrap();
    assert!(suggestion.contains(r#"declare .package(path: "../Core")"#), "{suggestion}");
    assert!(suggestion.contains(r#".product(name: "CoreKit", package: "Core")"#), "{suggestion}");
    assert_eq!(project.read(&feature)?, before);
    Ok(())
}

#[tokio::test]
async fn test_package_level_cycle_is_blocked() -> Result<()> {
    let project = TestProject::new()?;
    let (core, feature) = two_packages(&project)?;
    let service = project.service()?;

    let forward = service.ensure_dependency(&feature, "Feature", "Core", ResolutionMode::Fix).await;
    assert!(forward.changed, "{forward:?}");
    let core_before = project.read(&core)?;

    let back = service.ensure_dependency(&core, "Core", "Feature", ResolutionMode::Fix).await;
    assert!(!back.ok);
    assert_eq!(back.reason.as_deref(), Some("cycleBlocked"));
    assert!(back.message.unwrap().contains("Core -> Feature -> Core"));
    assert_eq!(project.read(&core)?, core_before);
    Ok(())
}

#[tokio::test]
async fn test_unqualified_reference_to_foreign_product_is_reported() -> Result<()> {
    let project = TestProject::new()?;
    project.write_package(
        "Packages/Core/Package.swift",
        &PackageBuilder::new("Core").product_library("CoreKit", &["Core"]).target("Core", &[]).build(),
    )?;
    let text = PackageBuilder::new("Feature").target("Feature", &["CoreKit"]).build();
    let feature = project.write_package("Packages/Feature/Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&feature, "Feature", "CoreKit", ResolutionMode::Fix).await;
    assert!(!result.ok);
    assert_eq!(result.reason.as_deref(), Some("unresolvedByNameReference"));
    assert_eq!(project.read(&feature)?, text);
    Ok(())
}

#[tokio::test]
async fn test_remote_package_uses_known_url() -> Result<()> {
    let project = TestProject::new()?;
    project.write_package(
        "Apps/Tool/Package.swift",
        &PackageBuilder::new("Tool")
            .package_url("https://github.com/apple/swift-log.git", "1.5.0")
            .target_with("Tool", &[r#".product(name: "Logging", package: "swift-log")"#])
            .build(),
    )?;
    let app = project.write_package(
        "Apps/App/Package.swift",
        &PackageBuilder::new("App").target("App", &[]).build(),
    )?;
    let service = project.service()?;
    service.project_map().update(&UpdateOptions {
        aggressive: true,
        ..UpdateOptions::default()
    })?;

    let result = service.ensure_dependency(&app, "App", "Logging", ResolutionMode::Fix).await;
    assert!(result.ok && result.changed, "{result:?}");
    let text = project.read(&app)?;
    assert!(text.contains(r#".package(url: "https://github.com/apple/swift-log.git", from: "1.5.0"),"#), "{text}");
    assert!(text.contains(r#".product(name: "Logging", package: "swift-log")"#));
    Ok(())
}

#[tokio::test]
async fn test_unknown_remote_package_reports_missing_provenance() -> Result<()> {
    let project = TestProject::new()?;
    project.write_package(
        "Apps/Tool/Package.swift",
        &PackageBuilder::new("Tool")
            .package_url("https://github.com/apple/swift-log.git", "1.5.0")
            .target_with("Tool", &[r#".product(name: "Logging", package: "swift-log")"#])
            .build(),
    )?;
    let text = PackageBuilder::new("App").target("App", &[]).build();
    let app = project.write_package("Apps/App/Package.swift", &text)?;
    let service = project.service()?;

    let result = service.ensure_dependency(&app, "App", "Logging", ResolutionMode::Fix).await;
    assert!(!result.ok);
    assert_eq!(result.reason.as_deref(), Some("missingProvenance"));
    assert_eq!(project.read(&app)?, text);
    Ok(())
}
