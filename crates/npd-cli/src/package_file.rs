//! `package.toml`: a package's name and declared npm dependencies.
//!
//! ```toml
//! [package]
//! name = "test-package"
//!
//! [npm-dependencies]
//! gcd = "0.0.0"
//! gzippo = "https://github.com/meteor/gzippo/tarball/1e4b955"
//! ```

use anyhow::{Context, Result};
use npd_core::{PackageBuild, PackageLayout};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// File name looked up in every package directory.
pub const PACKAGE_FILE: &str = "package.toml";

/// Parsed `package.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageFile {
    /// The `[package]` table.
    #[serde(default)]
    pub package: PackageSection,
    /// Declared requirements, kept raw so invalid ones surface as diagnostics.
    #[serde(default)]
    pub npm_dependencies: BTreeMap<String, String>,
}

/// The `[package]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageSection {
    /// Package name; defaults to the directory name.
    pub name: Option<String>,
}

impl PackageFile {
    /// Parse `package.toml` text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse package.toml")
    }

    /// Read `<dir>/package.toml`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(PACKAGE_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Package name, falling back to the name of `dir`.
    pub fn name_or_dir(&self, dir: &Path) -> String {
        self.package.name.clone().unwrap_or_else(|| {
            dir.file_name()
                .map_or_else(|| "package".to_string(), |n| n.to_string_lossy().into_owned())
        })
    }

    /// Whether any npm dependency is declared.
    pub fn has_npm_dependencies(&self) -> bool {
        !self.npm_dependencies.is_empty()
    }

    /// Turn the file into a build request for the package in `dir`.
    pub fn into_build(self, dir: &Path) -> PackageBuild {
        let layout = PackageLayout::new(self.name_or_dir(dir), dir);
        PackageBuild::declared(layout, self.npm_dependencies)
    }
}

/// Load every package directory, failing on the first unreadable one.
pub fn load_packages(dirs: &[impl AsRef<Path>]) -> Result<Vec<PackageBuild>> {
    dirs.iter()
        .map(|dir| {
            let dir = dir.as_ref();
            let file = PackageFile::load(dir)?;
            debug!(
                dir = %dir.display(),
                dependencies = file.npm_dependencies.len(),
                "loaded package.toml"
            );
            Ok(file.into_build(dir))
        })
        .collect()
}
