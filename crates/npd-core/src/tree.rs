//! Listing of what is actually installed under a `node_modules` directory.

use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Files whose presence shows a package directory was fully unpacked: a
/// readme or a license. `package.json` is written first and proves nothing.
pub const EVIDENCE_FILES: &[&str] = &["README.md", "README", "LICENSE", "LICENSE.md"];

/// One top-level entry of an installed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledEntry {
    /// Package name as npm resolves it (`name` or `@scope/name`).
    pub name: String,
    /// Directory of the entry.
    pub path: PathBuf,
    /// Whether any of [`EVIDENCE_FILES`] is present.
    pub has_evidence: bool,
    /// Version from the entry's `package.json`, if readable.
    pub version: Option<String>,
}

/// Snapshot of the top level of a `node_modules` directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeListing {
    entries: BTreeMap<String, InstalledEntry>,
    hidden: Vec<String>,
    empty_scopes: Vec<PathBuf>,
}

impl TreeListing {
    /// Scan `tree_dir`. A missing directory yields an empty listing.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than the directory being absent.
    pub fn scan(tree_dir: &Path) -> io::Result<Self> {
        let mut listing = Self::default();
        let read = match std::fs::read_dir(tree_dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(listing),
            Err(e) => return Err(e),
        };

        for entry in read {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if file_name.starts_with('.') {
                listing.hidden.push(file_name);
            } else if file_name.starts_with('@') && path.is_dir() {
                let mut members = 0usize;
                for scoped in std::fs::read_dir(&path)? {
                    let scoped = scoped?;
                    let member = scoped.file_name().to_string_lossy().into_owned();
                    if member.starts_with('.') {
                        continue;
                    }
                    members += 1;
                    listing.insert(format!("{file_name}/{member}"), scoped.path());
                }
                if members == 0 {
                    listing.empty_scopes.push(path);
                }
            } else {
                listing.insert(file_name, path);
            }
        }

        listing.hidden.sort();
        listing.empty_scopes.sort();
        Ok(listing)
    }

    fn insert(&mut self, name: String, path: PathBuf) {
        let entry = InstalledEntry {
            has_evidence: has_installation_evidence(&path),
            version: read_installed_version(&path),
            name: name.clone(),
            path,
        };
        self.entries.insert(name, entry);
    }

    /// Look up an installed entry by package name.
    pub fn get(&self, name: &str) -> Option<&InstalledEntry> {
        self.entries.get(name)
    }

    /// Installed entries, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = &InstalledEntry> {
        self.entries.values()
    }

    /// Hidden top-level names (`.bin`, `.package-lock.json`, ...). These
    /// belong to npm and are left alone.
    pub fn hidden(&self) -> &[String] {
        &self.hidden
    }

    /// Scope directories with no members left in them.
    pub fn empty_scopes(&self) -> &[PathBuf] {
        &self.empty_scopes
    }

    /// Number of installed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `dir` holds any of [`EVIDENCE_FILES`].
pub fn has_installation_evidence(dir: &Path) -> bool {
    EVIDENCE_FILES.iter().any(|f| dir.join(f).is_file())
}

fn read_installed_version(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join("package.json")).ok()?;
    let json: Value = serde_json::from_str(&content).ok()?;
    json.get("version")?.as_str().map(str::to_string)
}
