//! Domain-specific errors for dependency operations

use npd_schema::ManifestError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// One way an installed tree disagrees with its lock description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftEntry {
    /// A locked dependency has no directory under `node_modules`.
    Missing {
        /// Locked dependency name.
        name: String,
    },
    /// The directory exists but holds neither a readme nor a license.
    NoEvidence {
        /// Locked dependency name.
        name: String,
    },
    /// A stale entry could not be removed.
    Unprunable {
        /// Entry name under `node_modules`.
        name: String,
        /// Underlying I/O error.
        reason: String,
    },
    /// The tree directory itself could not be read.
    Unreadable {
        /// Underlying I/O error.
        reason: String,
    },
}

impl fmt::Display for DriftEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => write!(f, "{name} is not installed"),
            Self::NoEvidence { name } => write!(f, "{name} does not look installed"),
            Self::Unprunable { name, reason } => write!(f, "could not remove stale {name}: {reason}"),
            Self::Unreadable { reason } => write!(f, "could not read node_modules: {reason}"),
        }
    }
}

fn format_drift(entries: &[DriftEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Everything that can go wrong while reconciling, installing, validating or
/// bundling a package's npm dependencies.
///
/// None of these abort a multi-package build: the session turns them into
/// diagnostics on the owning package's job.
#[derive(Error, Debug)]
pub enum DepsError {
    /// A declared dependency is malformed.
    #[error(transparent)]
    ManifestInvalid(#[from] ManifestError),

    /// npm cannot satisfy the requested version or source.
    #[error("{name} version {version} is not available in the npm registry")]
    VersionUnresolvable {
        /// Dependency name.
        name: String,
        /// Requested version or source URL.
        version: String,
    },

    /// npm could not run, could not reach the network, or timed out.
    #[error("npm {command} failed: {detail}")]
    InstallTransportFailure {
        /// The npm sub-command that failed (e.g. `install mime@1.2.7`).
        command: String,
        /// What went wrong, usually the tail of npm's stderr.
        detail: String,
    },

    /// The installed tree could not be brought in line with the lock.
    #[error("npm dependency tree does not match npm-shrinkwrap.json: {}", format_drift(.0))]
    TreeDrift(Vec<DriftEntry>),

    /// A filesystem operation failed.
    #[error("{context} {}: {source}", .path.display())]
    IoFailure {
        /// What was being attempted.
        context: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl DepsError {
    /// Wrap an I/O error with the operation and path it concerns.
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoFailure {
            context,
            path: path.into(),
            source,
        }
    }

    /// Closure form of [`DepsError::io`] for `map_err`.
    pub fn io_at(
        context: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::io(context, path, source)
    }

    /// The whole package build exceeded its time budget.
    pub fn timed_out(limit: Duration) -> Self {
        Self::InstallTransportFailure {
            command: "install".to_string(),
            detail: format!("timed out after {}s", limit.as_secs()),
        }
    }

    /// Whether npm could not satisfy a requirement as written (as opposed
    /// to a transient or local problem, or a malformed manifest).
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::VersionUnresolvable { .. })
    }
}
