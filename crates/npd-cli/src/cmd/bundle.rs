//! `npd bundle`: build packages, then place their npm trees in a bundle.

use anyhow::{Context as _, Result};
use npd_core::PackageLayout;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{exit_code, print_diagnostics};
use crate::Context;
use crate::package_file::load_packages;

/// Build every package and, if all succeed, copy the trees of those that
/// declare npm dependencies into `output`.
pub async fn bundle(ctx: &Context, output: &Path, dirs: &[PathBuf]) -> Result<ExitCode> {
    let packages = load_packages(dirs)?;
    let session = ctx.session()?;

    let with_deps: Vec<PackageLayout> = packages
        .iter()
        .filter(|p| p.manifest().is_ok_and(|m| !m.is_empty()))
        .map(|p| p.layout().clone())
        .collect();

    let report = session.build(packages).await;
    print_diagnostics(ctx, &report.diagnostics())?;
    if report.has_failures() {
        return Ok(exit_code(true));
    }

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let placements = session
        .bundle(output, &with_deps)
        .await
        .context("Failed to bundle npm dependencies")?;

    if !ctx.json {
        for placement in &placements {
            println!("{}", placement.display());
        }
    }
    Ok(exit_code(false))
}
