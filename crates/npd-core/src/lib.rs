//! Core library for npd.
//!
//! A package declares npm dependencies; npd keeps a reproducible copy of
//! them under `<package>/.npm/package` and copies that tree into bundles.
//! The pieces, leaves first:
//!
//! - [`store`]: the persisted lock description and its marker files.
//! - [`tree`]: what is actually installed under `node_modules`.
//! - [`reconcile`]: decides between no-op, bulk reinstall from the lock and a
//!   full reinstall.
//! - [`install`]: drives the external `npm` through an injectable
//!   [`NpmRunner`], staging everything so failures never touch the prior tree.
//! - [`validate`]: checks installation evidence and prunes stale entries.
//! - [`bundle`]: copies validated trees into a bundle.
//! - [`job`] and [`session`]: per-package diagnostics and the concurrent
//!   build loop that ties it together.

pub mod bundle;
pub mod config;
pub mod digest;
pub mod error;
pub mod fs;
pub mod install;
pub mod job;
pub mod paths;
pub mod reconcile;
pub mod reporter;
pub mod runner;
pub mod session;
pub mod store;
pub mod tree;
pub mod validate;

pub use bundle::{BundleSource, integrate, integrate_all};
pub use config::{Config, ConfigError};
pub use digest::TreeDigest;
pub use error::{DepsError, DriftEntry};
pub use install::{InstallMode, Installer, InstallerConfig, StagedInstall};
pub use job::{Diagnostics, Job, Message};
pub use paths::PackageLayout;
pub use reconcile::{Action, Reconciliation, TreeState, reconcile};
pub use reporter::{NullReporter, Reporter};
pub use runner::{CommandOutput, NpmCli, NpmRunner, RunError, RunOptions};
pub use session::{BuildReport, BuildSession, PackageBuild, PackageOutcome};
pub use tree::TreeListing;
pub use validate::{Validation, validate};
