//! npd - reproducible npm dependency trees for buildable packages
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Each package directory carries a `package.toml` declaring its npm
//! dependencies. `npd build` keeps `<package>/.npm/package` in sync with it,
//! `npd bundle` copies the resulting trees into a bundle, and `npd status`
//! reports what a build would do.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.npd/
//! └── config.toml      # optional settings
//!
//! <package>/
//! ├── package.toml     # [package] name, [npm-dependencies]
//! └── .npm/package/    # generated; commit everything except node_modules
//! ```

pub mod cmd;
pub mod context;
pub mod package_file;
pub mod ui;

pub use context::Context;
pub use package_file::PackageFile;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use npd_core::Config;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "npd")]
#[command(author, version, about = "npd - reproducible npm dependencies per package")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand. Flags override the config file.
#[derive(Debug, Clone, Args)]
pub struct GlobalOpts {
    /// Config file (default: $NPD_HOME/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// npm executable to run
    #[arg(long, global = true, env = "NPD_NPM")]
    pub npm: Option<PathBuf>,

    /// Per-package time limit in seconds (0 disables)
    #[arg(long, global = true, env = "NPD_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Packages to build concurrently
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Log every npm invocation
    #[arg(long, global = true)]
    pub print_npm_calls: bool,

    /// Print diagnostics as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl GlobalOpts {
    /// Load the config file and apply flag overrides.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(npm) = &self.npm {
            config.npm = Some(npm.clone());
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.print_npm_calls {
            config.print_npm_calls = true;
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install or repair the npm dependencies of packages
    Build {
        /// Package directories (each containing package.toml)
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Build packages, then copy their npm trees into a bundle
    Bundle {
        /// Bundle output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Package directories (each containing package.toml)
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Show what a build would do, without changing anything
    Status {
        /// Package directories (each containing package.toml)
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config_values() {
        let cli = Cli::parse_from([
            "npd",
            "build",
            "--npm",
            "/opt/npm",
            "--timeout",
            "0",
            "-j",
            "3",
            "--config",
            "/nonexistent/config.toml",
            "pkg",
        ]);
        assert!(cli.global.config().is_err());

        let opts = GlobalOpts {
            config: None,
            ..cli.global
        };
        // No explicit file: defaults (or the user's file) plus overrides.
        if let Ok(config) = opts.config() {
            assert_eq!(config.npm.as_deref(), Some(std::path::Path::new("/opt/npm")));
            assert_eq!(config.timeout(), None);
            assert_eq!(config.jobs, 3);
        }
    }
}
