//! Subcommand implementations.

pub mod build;
pub mod bundle;
pub mod status;

use anyhow::Result;
use npd_core::Diagnostics;
use std::process::ExitCode;

use crate::Context;

/// Print per-job diagnostics: JSON when requested, else the plain-text form
/// (only when something failed).
pub(crate) fn print_diagnostics(ctx: &Context, diagnostics: &Diagnostics) -> Result<()> {
    if ctx.json {
        println!("{}", diagnostics.to_json()?);
    } else if diagnostics.has_messages() {
        print!("{}", diagnostics.format_messages());
    }
    Ok(())
}

pub(crate) fn exit_code(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
