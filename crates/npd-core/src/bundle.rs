//! Copy validated per-package trees into a bundle.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::DepsError;
use crate::fs::{copy_tree, remove_path};
use crate::paths::bundle_placement;

/// A package whose dependency tree should be embedded in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSource {
    /// Package name, which determines the placement directory.
    pub package_name: String,
    /// The package's installed `node_modules`.
    pub tree_dir: PathBuf,
}

/// Copy `tree_dir` to `<bundle_dir>/programs/server/npm/<package>/node_modules`,
/// replacing whatever was there. Returns the placement directory.
///
/// # Errors
///
/// Returns [`DepsError::IoFailure`] if the source tree is missing or any
/// removal or copy fails.
pub fn integrate(
    bundle_dir: &Path,
    package_name: &str,
    tree_dir: &Path,
) -> Result<PathBuf, DepsError> {
    if !tree_dir.is_dir() {
        return Err(DepsError::io(
            "dependency tree missing at",
            tree_dir,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let placement = bundle_placement(bundle_dir, package_name);
    remove_path(&placement).map_err(DepsError::io_at("failed to remove", &placement))?;
    let files = copy_tree(tree_dir, &placement).map_err(DepsError::io_at("failed to copy into", &placement))?;

    info!(package = package_name, files, dest = %placement.display(), "bundled npm dependencies");
    Ok(placement)
}

/// Integrate each source in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first [`DepsError`] from [`integrate`].
pub fn integrate_all(bundle_dir: &Path, sources: &[BundleSource]) -> Result<Vec<PathBuf>, DepsError> {
    sources
        .iter()
        .map(|s| integrate(bundle_dir, &s.package_name, &s.tree_dir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replaces_previous_placement() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("gcd")).unwrap();
        std::fs::write(tree.join("gcd/README.md"), "gcd").unwrap();

        let bundle = dir.path().join("bundle");
        let stale = bundle_placement(&bundle, "test-package").join("mime");
        std::fs::create_dir_all(&stale).unwrap();

        let placement = integrate(&bundle, "test-package", &tree).unwrap();
        assert!(placement.join("gcd/README.md").exists());
        assert!(!stale.exists());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempdir().unwrap();
        let err = integrate(dir.path(), "p", &dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, DepsError::IoFailure { .. }));
    }

    #[test]
    fn integrate_all_stops_at_first_failure() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good");
        std::fs::create_dir_all(&good).unwrap();
        let sources = [
            BundleSource {
                package_name: "a".into(),
                tree_dir: dir.path().join("absent"),
            },
            BundleSource {
                package_name: "b".into(),
                tree_dir: good,
            },
        ];
        assert!(integrate_all(dir.path(), &sources).is_err());
        assert!(!bundle_placement(dir.path(), "b").exists());
    }
}
