//! `npd build`: bring each package's npm dependencies in line with its
//! `package.toml`.

use anyhow::Result;
use std::path::PathBuf;
use std::process::ExitCode;

use super::{exit_code, print_diagnostics};
use crate::Context;
use crate::package_file::load_packages;

/// Build every package directory; failures become diagnostics and a
/// non-zero exit code.
pub async fn build(ctx: &Context, dirs: &[PathBuf]) -> Result<ExitCode> {
    let packages = load_packages(dirs)?;
    let session = ctx.session()?;

    let report = session.build(packages).await;
    print_diagnostics(ctx, &report.diagnostics())?;

    Ok(exit_code(report.has_failures()))
}
