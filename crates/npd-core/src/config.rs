//! User configuration (`$NPD_HOME/config.toml`).
//!
//! Every field is optional; missing values fall back to defaults. The CLI
//! layers its flags on top of whatever this file provides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::install::InstallerConfig;
use crate::paths::default_config_path;
use crate::runner::{NpmCli, RunError};

/// Default budget for one package's whole install sequence.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
}

/// Resolved npd settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Path to the `npm` executable. Looked up on `PATH` when unset.
    pub npm: Option<PathBuf>,

    /// Per-package time budget in seconds. `0` disables the limit.
    pub timeout_secs: Option<u64>,

    /// Maximum number of packages built concurrently.
    pub jobs: usize,

    /// Log every npm invocation at info level instead of debug.
    pub print_npm_calls: bool,

    /// Extra arguments appended to every `npm install`.
    pub install_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            npm: None,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            jobs: num_cpus::get(),
            print_npm_calls: false,
            install_args: InstallerConfig::default().install_args,
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else the default config file if it exists,
    /// else defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a file that exists cannot be read or parsed.
    /// An explicitly named file that does not exist is an error too.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// The per-package time budget, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Installer settings derived from this config.
    pub fn installer(&self) -> InstallerConfig {
        InstallerConfig {
            print_npm_calls: self.print_npm_calls,
            install_args: self.install_args.clone(),
            ..InstallerConfig::default()
        }
    }

    /// The npm runner this config selects.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NotFound`] if no npm path is configured and none is
    /// on `PATH`.
    pub fn npm_runner(&self) -> Result<NpmCli, RunError> {
        match &self.npm {
            Some(program) => Ok(NpmCli::new(program)),
            None => NpmCli::discover(),
        }
    }
}
