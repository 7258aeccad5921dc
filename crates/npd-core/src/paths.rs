//! Filesystem layout: where npd keeps its own state and where each package's
//! npm tree lives.
//!
//! ```text
//! <package>/
//! └── .npm/
//!     └── package/
//!         ├── .gitignore            # "node_modules"
//!         ├── README                # generated-directory notice
//!         ├── npm-shrinkwrap.json   # lock description
//!         └── node_modules/         # installed tree
//!
//! <bundle>/programs/server/npm/<package>/node_modules/
//! ```

use dirs::home_dir;
use std::path::{Path, PathBuf};

pub use npd_schema::LOCK_FILE;

/// Directory under a package that holds everything npd generates.
pub const NPM_DIR: &str = ".npm";

/// The dependency directory inside [`NPM_DIR`].
pub const DEPENDENCY_DIR: &str = "package";

/// The installed tree inside the dependency directory.
pub const NODE_MODULES: &str = "node_modules";

/// Version-control exclusion marker.
pub const GITIGNORE_FILE: &str = ".gitignore";

/// Human-readable notice marking the directory as generated.
pub const README_FILE: &str = "README";

/// Returns the npd state directory (`$NPD_HOME`, else `~/.npd`), or None if
/// the user's home cannot be resolved.
pub fn try_npd_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("NPD_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".npd"))
}

/// Default configuration file: `$NPD_HOME/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    try_npd_home().map(|home| home.join("config.toml"))
}

/// Where one package's npm dependencies live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    name: String,
    source_dir: PathBuf,
}

impl PackageLayout {
    /// Layout for package `name` whose sources are in `source_dir`.
    pub fn new(name: impl Into<String>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source_dir: source_dir.into(),
        }
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<package>/.npm`, the parent of the dependency directory. Staging
    /// directories are created here so the final rename stays on one volume.
    pub fn npm_root(&self) -> PathBuf {
        self.source_dir.join(NPM_DIR)
    }

    /// `<package>/.npm/package`
    pub fn dependency_dir(&self) -> PathBuf {
        self.npm_root().join(DEPENDENCY_DIR)
    }

    /// `<package>/.npm/package/npm-shrinkwrap.json`
    pub fn lock_path(&self) -> PathBuf {
        self.dependency_dir().join(LOCK_FILE)
    }

    /// `<package>/.npm/package/node_modules`
    pub fn tree_dir(&self) -> PathBuf {
        self.dependency_dir().join(NODE_MODULES)
    }

    /// Key used to serialize work on this package's dependency directory.
    pub(crate) fn lock_key(&self) -> PathBuf {
        std::fs::canonicalize(&self.source_dir)
            .unwrap_or_else(|_| self.source_dir.clone())
            .join(NPM_DIR)
            .join(DEPENDENCY_DIR)
    }
}

/// Where a package's tree is placed inside a bundle:
/// `<bundle>/programs/server/npm/<package>/node_modules`.
///
/// Package names may carry an owner prefix (`owner:name`); the colon is not
/// portable in paths and becomes `_`.
pub fn bundle_placement(bundle_dir: &Path, package_name: &str) -> PathBuf {
    bundle_dir
        .join("programs")
        .join("server")
        .join("npm")
        .join(package_name.replace(':', "_"))
        .join(NODE_MODULES)
}
