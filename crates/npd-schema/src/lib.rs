//! Shared types for npd.
//!
//! Everything in this crate is pure data: dependency names and requirements
//! as a package declares them ([`Manifest`]) and the exact resolved graph that
//! was last installed for it ([`LockDescription`]). Filesystem access lives in
//! `npd-core`.

pub mod lock;
pub mod manifest;
pub mod types;

// Re-exports
pub use lock::{LOCK_FILE, LockDescription, LockError, LockedDependency, Origin};
pub use manifest::{Manifest, ManifestError};
pub use types::{DependencyName, Requirement, is_source_url};
