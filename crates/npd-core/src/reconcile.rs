//! Decide how much work a package's dependency directory needs.
//!
//! The decision is a pure function of the declared manifest, the prior lock
//! description (if any) and a listing of the installed tree. It is recomputed
//! on every build and never cached.

use npd_schema::{LockDescription, Manifest, Origin};
use serde::Serialize;
use std::fmt;

use crate::tree::TreeListing;

/// Classification of a package's dependency tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreeState {
    /// Lock matches the manifest and the tree matches the lock.
    Clean,
    /// Lock matches the manifest but installed files are missing or altered.
    DiskMissing,
    /// No lock, or the lock no longer matches the manifest.
    ManifestChanged,
    /// The last install attempt could not satisfy the manifest.
    Unresolvable,
}

impl fmt::Display for TreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clean => "clean",
            Self::DiskMissing => "disk-missing",
            Self::ManifestChanged => "manifest-changed",
            Self::Unresolvable => "unresolvable",
        })
    }
}

/// Corrective action chosen for a [`TreeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Nothing to install.
    Keep,
    /// One bulk install reproducing the prior lock exactly.
    InstallFromLock,
    /// Per-requirement install from the manifest, producing a new lock.
    FullInstall,
    /// The manifest is empty; delete the dependency directory.
    RemoveTree,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keep => "keep",
            Self::InstallFromLock => "install from lock",
            Self::FullInstall => "full install",
            Self::RemoveTree => "remove",
        })
    }
}

/// Result of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Classified state.
    pub state: TreeState,
    /// Minimal corrective action.
    pub action: Action,
    /// Human-readable reasons, one per offending dependency.
    pub reasons: Vec<String>,
}

impl Reconciliation {
    fn new(state: TreeState, action: Action, reasons: Vec<String>) -> Self {
        Self {
            state,
            action,
            reasons,
        }
    }
}

/// Classify a package's dependency directory and choose an action.
///
/// Requirements are compared to the lock textually. Any added, removed or
/// changed requirement forces a full reinstall; a matching lock with an
/// incomplete tree is repaired from the lock alone.
pub fn reconcile(
    manifest: &Manifest,
    prior: Option<&LockDescription>,
    listing: &TreeListing,
) -> Reconciliation {
    if manifest.is_empty() {
        return if prior.is_some() || !listing.is_empty() {
            Reconciliation::new(
                TreeState::ManifestChanged,
                Action::RemoveTree,
                vec!["no npm dependencies declared".to_string()],
            )
        } else {
            Reconciliation::new(TreeState::Clean, Action::Keep, Vec::new())
        };
    }

    let Some(lock) = prior else {
        return Reconciliation::new(
            TreeState::ManifestChanged,
            Action::FullInstall,
            vec![format!("no {}", npd_schema::LOCK_FILE)],
        );
    };

    let drift = lock.manifest_drift(manifest);
    if !drift.is_empty() {
        let reasons = drift
            .into_iter()
            .map(|name| format!("{name} changed"))
            .collect();
        return Reconciliation::new(TreeState::ManifestChanged, Action::FullInstall, reasons);
    }

    let reasons = disk_drift(lock, listing);
    if reasons.is_empty() {
        Reconciliation::new(TreeState::Clean, Action::Keep, reasons)
    } else {
        Reconciliation::new(TreeState::DiskMissing, Action::InstallFromLock, reasons)
    }
}

fn disk_drift(lock: &LockDescription, listing: &TreeListing) -> Vec<String> {
    let mut reasons = Vec::new();
    for (name, locked) in &lock.dependencies {
        let Some(installed) = listing.get(name) else {
            reasons.push(format!("{name} is not installed"));
            continue;
        };
        if !installed.has_evidence {
            reasons.push(format!("{name} does not look installed"));
            continue;
        }
        if locked.origin() == Origin::Registry
            && let (Some(want), Some(have)) = (locked.version.as_deref(), installed.version.as_deref())
            && want != have
        {
            reasons.push(format!("{name} is at {have}, locked at {want}"));
        }
    }
    reasons
}
