//! Bring an installed tree in line with its lock description.
//!
//! Validation first prunes top-level entries the lock does not name, then
//! checks that every locked dependency is installed with evidence. Running
//! it twice changes nothing the second time.

use npd_schema::LockDescription;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::DriftEntry;
use crate::fs::remove_path;
use crate::tree::TreeListing;

/// What a successful validation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Top-level entries removed because the lock does not name them.
    pub pruned: Vec<String>,
}

/// Validate `tree_dir` against `lock`, pruning stale entries.
///
/// Hidden entries (`.bin`, `.package-lock.json`) belong to npm and are never
/// pruned. Scope directories emptied by pruning are removed as well.
///
/// # Errors
///
/// Returns every [`DriftEntry`] found: locked dependencies that are absent
/// or lack evidence, stale entries that could not be removed, or an
/// unreadable tree.
pub fn validate(tree_dir: &Path, lock: &LockDescription) -> Result<Validation, Vec<DriftEntry>> {
    let listing = TreeListing::scan(tree_dir).map_err(|e| {
        vec![DriftEntry::Unreadable {
            reason: e.to_string(),
        }]
    })?;

    let mut drift = Vec::new();
    let mut validation = Validation::default();

    for entry in listing.entries() {
        if lock.contains(&entry.name) {
            continue;
        }
        match remove_path(&entry.path) {
            Ok(()) => {
                warn!(entry = %entry.name, tree = %tree_dir.display(), "pruned stale dependency");
                validation.pruned.push(entry.name.clone());
            }
            Err(e) => drift.push(DriftEntry::Unprunable {
                name: entry.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    remove_empty_scopes(tree_dir, &listing, &validation.pruned);

    for name in lock.names() {
        match listing.get(name) {
            None => drift.push(DriftEntry::Missing {
                name: name.to_string(),
            }),
            Some(entry) if !entry.has_evidence => drift.push(DriftEntry::NoEvidence {
                name: name.to_string(),
            }),
            Some(_) => {}
        }
    }

    if drift.is_empty() {
        debug!(tree = %tree_dir.display(), entries = lock.len(), "tree matches lock");
        Ok(validation)
    } else {
        Err(drift)
    }
}

fn remove_empty_scopes(tree_dir: &Path, listing: &TreeListing, pruned: &[String]) {
    let mut scopes: Vec<_> = listing.empty_scopes().to_vec();
    scopes.extend(
        pruned
            .iter()
            .filter_map(|name| name.split_once('/'))
            .map(|(scope, _)| tree_dir.join(scope)),
    );
    scopes.sort();
    scopes.dedup();

    for scope in scopes {
        // Fails harmlessly while the scope still has members.
        if std::fs::remove_dir(&scope).is_ok() {
            debug!(scope = %scope.display(), "removed empty scope directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npd_schema::LockedDependency;
    use tempfile::tempdir;

    fn lock(names: &[&str]) -> LockDescription {
        let mut lock = LockDescription::default();
        for name in names {
            lock.dependencies
                .insert((*name).to_string(), LockedDependency::registry("1.0.0"));
        }
        lock
    }

    fn install(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("README.md"), name).unwrap();
    }

    #[test]
    fn prunes_stale_entries_and_keeps_hidden_ones() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        install(root, "gcd");
        install(root, "mime");
        install(root, "@scope/stale");
        std::fs::create_dir_all(root.join(".bin")).unwrap();

        let result = validate(root, &lock(&["gcd"])).unwrap();

        assert_eq!(result.pruned, ["@scope/stale", "mime"]);
        assert!(root.join("gcd").exists());
        assert!(!root.join("mime").exists());
        assert!(!root.join("@scope").exists());
        assert!(root.join(".bin").exists());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempdir().unwrap();
        install(dir.path(), "gcd");
        install(dir.path(), "extra");

        let l = lock(&["gcd"]);
        assert_eq!(validate(dir.path(), &l).unwrap().pruned, ["extra"]);
        assert!(validate(dir.path(), &l).unwrap().pruned.is_empty());
    }

    #[test]
    fn reports_missing_and_unpacked_entries() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mime")).unwrap();

        let drift = validate(dir.path(), &lock(&["gcd", "mime"])).unwrap_err();
        assert_eq!(
            drift,
            [
                DriftEntry::Missing { name: "gcd".into() },
                DriftEntry::NoEvidence {
                    name: "mime".into()
                },
            ]
        );
    }

    #[test]
    fn package_json_alone_is_not_evidence() {
        let dir = tempdir().unwrap();
        let mime = dir.path().join("mime");
        std::fs::create_dir_all(&mime).unwrap();
        std::fs::write(mime.join("package.json"), r#"{"version":"1.0.0"}"#).unwrap();

        let drift = validate(dir.path(), &lock(&["mime"])).unwrap_err();
        assert_eq!(drift, [DriftEntry::NoEvidence { name: "mime".into() }]);
    }

    #[test]
    fn scoped_entries_in_the_lock_are_kept() {
        let dir = tempdir().unwrap();
        install(dir.path(), "@types/node");
        assert!(validate(dir.path(), &lock(&["@types/node"])).unwrap().pruned.is_empty());
        assert!(dir.path().join("@types/node/README.md").exists());
    }
}
