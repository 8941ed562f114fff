//! Fluent builder for creating `Package.swift` manifests in tests
//!
//! ```rust,ignore
//! let text = PackageBuilder::new("Feature")
//!     .package_path("../Core")
//!     .product_library("FeatureKit", &["Feature"])
//!     .target_with("Feature", &[r#".product(name: "CoreKit", package: "Core")"#])
//!     .build();
//! ```
//!
//! Targets added with [`target`](PackageBuilder::target) list bare-string
//! dependencies; [`target_with`](PackageBuilder::target_with) takes raw entries.
//! An empty list renders as `dependencies: []`.

/// Builder for test manifests in the multi-line style Xcode generates.
#[derive(Debug, Default)]
pub struct PackageBuilder {
    name: String,
    packages: Vec<String>,
    products: Vec<String>,
    targets: Vec<String>,
}

impl PackageBuilder {
    /// Start a package named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Declare a local package.
    pub fn package_path(mut self, path: &str) -> Self {
        self.packages.push(format!(".package(path: \"{path}\")"));
        self
    }

    /// Declare a remote package.
    pub fn package_url(mut self, url: &str, from: &str) -> Self {
        self.packages.push(format!(".package(url: \"{url}\", from: \"{from}\")"));
        self
    }

    /// Declare a library product.
    pub fn product_library(mut self, name: &str, targets: &[&str]) -> Self {
        let list = quoted(targets).join(", ");
        self.products.push(format!(".library(name: \"{name}\", targets: [{list}])"));
        self
    }

    /// Add a target depending on local names.
    pub fn target(self, name: &str, dependencies: &[&str]) -> Self {
        let entries = quoted(dependencies);
        let entries: Vec<&str> = entries.iter().map(String::as_str).collect();
        self.target_with(name, &entries)
    }

    /// Add a target with raw dependency entries.
    pub fn target_with(mut self, name: &str, entries: &[&str]) -> Self {
        let block = if entries.is_empty() {
            format!("        .target(name: \"{name}\", dependencies: []),")
        } else {
            let mut block = format!("        .target(\n            name: \"{name}\",\n            dependencies: [\n");
            for entry in entries {
                block.push_str(&format!("                {entry},\n"));
            }
            block.push_str("            ]\n        ),");
            block
        };
        self.targets.push(block);
        self
    }

    /// Render the manifest.
    pub fn build(&self) -> String {
        let mut out = String::from("// swift-tools-version:5.9\nimport PackageDescription\n\nlet package = Package(\n");
        out.push_str(&format!("    name: \"{}\",\n", self.name));
        if !self.products.is_empty() {
            out.push_str("    products: [\n");
            for product in &self.products {
                out.push_str(&format!("        {product},\n"));
            }
            out.push_str("    ],\n");
        }
        if !self.packages.is_empty() {
            out.push_str("    dependencies: [\n");
            for package in &self.packages {
                out.push_str(&format!("        {package},\n"));
            }
            out.push_str("    ],\n");
        }
        out.push_str("    targets: [\n");
        for target in &self.targets {
            out.push_str(target);
            out.push('\n');
        }
        out.push_str("    ]\n)\n");
        out
    }
}

fn quoted(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("\"{n}\"")).collect()
}
