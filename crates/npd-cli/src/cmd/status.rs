//! `npd status`: report what a build would do, without touching disk.

use anyhow::Result;
use crossterm::style::Stylize;
use futures::future::join_all;
use npd_core::{Action, BuildSession, PackageBuild, TreeDigest, TreeState};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use super::exit_code;
use crate::Context;
use crate::package_file::load_packages;

/// One package's status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TreeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Digest of the installed `node_modules`, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<TreeDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn status_of(session: &BuildSession, package: &PackageBuild) -> StatusRow {
    let layout = package.layout();
    let tree_dir = layout.tree_dir();
    let digest = tokio::task::spawn_blocking(move || {
        if tree_dir.is_dir() {
            TreeDigest::compute(&tree_dir).ok()
        } else {
            None
        }
    })
    .await
    .ok()
    .flatten();

    let mut row = StatusRow {
        package: layout.name().to_string(),
        state: None,
        action: None,
        reasons: Vec::new(),
        digest,
        error: None,
    };
    match session.status(package).await {
        Ok(reconciliation) => {
            row.state = Some(reconciliation.state);
            row.action = Some(reconciliation.action);
            row.reasons = reconciliation.reasons;
        }
        Err(e) => row.error = Some(e.to_string()),
    }
    row
}

/// Print the status of every package directory. Exits non-zero if any
/// package cannot be classified (e.g. an invalid manifest).
pub async fn status(ctx: &Context, dirs: &[PathBuf]) -> Result<ExitCode> {
    let packages = load_packages(dirs)?;
    let session = ctx.session()?;

    let rows: Vec<StatusRow> =
        join_all(packages.iter().map(|p| status_of(&session, p))).await;
    let failed = rows.iter().any(|r| r.error.is_some());

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(exit_code(failed));
    }

    let width = rows.iter().map(|r| r.package.len()).max().unwrap_or(0);
    for row in &rows {
        let name = format!("{:<width$}", row.package);
        match (&row.state, &row.action, &row.error) {
            (_, _, Some(error)) => println!("{} {}", name.cyan(), error.as_str().red()),
            (Some(state), Some(action), None) => {
                let summary = format!("{state} ({action})");
                let summary = if *state == TreeState::Clean {
                    summary.green()
                } else {
                    summary.yellow()
                };
                let digest = row
                    .digest
                    .as_ref()
                    .map_or_else(String::new, |d| format!(" {}", d.short()));
                println!("{} {summary}{}", name.cyan(), digest.dark_grey());
            }
            _ => println!("{}", name.cyan()),
        }
        for reason in &row.reasons {
            println!("  {}", reason.as_str().dark_grey());
        }
    }
    Ok(exit_code(failed))
}
