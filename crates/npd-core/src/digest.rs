//! Content digest of a directory tree.
//!
//! Two trees have the same digest exactly when they hold the same relative
//! paths with the same kinds, file contents and symlink targets. Timestamps
//! and permissions are ignored.

use serde::Serialize;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// BLAKE3 digest of a directory tree, as 64 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TreeDigest(String);

impl TreeDigest {
    /// Digest every entry under `root`. A missing `root` is an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any entry cannot be read.
    pub fn compute(root: &Path) -> io::Result<Self> {
        let mut hasher = blake3::Hasher::new();

        for entry in WalkDir::new(root).sort_by_file_name().min_depth(1) {
            let entry = entry.map_err(io::Error::other)?;
            let relative = entry.path().strip_prefix(root).map_err(io::Error::other)?;
            let file_type = entry.file_type();

            // Separators keep "a" + "bc" distinct from "ab" + "c".
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(b"\0");

            if file_type.is_symlink() {
                hasher.update(b"L");
                let target = std::fs::read_link(entry.path())?;
                hasher.update(target.to_string_lossy().as_bytes());
            } else if file_type.is_dir() {
                hasher.update(b"D");
            } else {
                hasher.update(b"F");
                let mut file = std::fs::File::open(entry.path())?;
                let len = io::copy(&mut file, &mut hasher)?;
                hasher.update(&len.to_le_bytes());
            }
            hasher.update(b"\0");
        }

        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    /// Hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for TreeDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn equal_trees_have_equal_digests() {
        let a = tree(&[("mime/README.md", "mime"), ("gcd/index.js", "1")]);
        let b = tree(&[("gcd/index.js", "1"), ("mime/README.md", "mime")]);
        let da = TreeDigest::compute(a.path()).unwrap();
        assert_eq!(da, TreeDigest::compute(b.path()).unwrap());
        assert_eq!(da.as_str().len(), 64);
        assert_eq!(da.short().len(), 12);
    }

    #[test]
    fn content_and_layout_changes_are_detected() {
        let base = TreeDigest::compute(tree(&[("a/b", "x")]).path()).unwrap();
        assert_ne!(base, TreeDigest::compute(tree(&[("a/b", "y")]).path()).unwrap());
        assert_ne!(base, TreeDigest::compute(tree(&[("ab", "x")]).path()).unwrap());
    }
}
