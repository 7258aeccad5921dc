//! Dependency names and requirements as a package declares them.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

use crate::manifest::ManifestError;

/// Longest package name the npm registry accepts.
const MAX_NAME_LEN: usize = 214;

/// A validated npm package name, optionally scoped (`@scope/name`).
///
/// Unlike registry names in other ecosystems this is *not* case-normalized:
/// npm treats the directory name under `node_modules` as the identity, so the
/// name is kept exactly as declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DependencyName(String);

impl DependencyName {
    /// Validate and wrap a dependency name.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidName`] if the name is empty, too long,
    /// starts with `.` or `_`, or contains characters npm does not allow in a
    /// package name.
    pub fn parse(name: &str) -> Result<Self, ManifestError> {
        let invalid = |reason: &'static str| ManifestError::InvalidName {
            name: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(invalid("name is longer than 214 characters"));
        }

        let bare = if let Some(scoped) = name.strip_prefix('@') {
            let (scope, rest) = scoped
                .split_once('/')
                .ok_or_else(|| invalid("scoped name is missing '/'"))?;
            if !is_valid_segment(scope) {
                return Err(invalid("scope contains invalid characters"));
            }
            rest
        } else {
            name
        };

        if bare.starts_with('.') || bare.starts_with('_') {
            return Err(invalid("name cannot start with '.' or '_'"));
        }
        if !is_valid_segment(bare) {
            return Err(invalid("name contains invalid characters"));
        }

        Ok(Self(name.to_string()))
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a scoped (`@scope/name`) package.
    pub fn is_scoped(&self) -> bool {
        self.0.starts_with('@')
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

impl std::fmt::Display for DependencyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for DependencyName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for DependencyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for DependencyName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl Borrow<str> for DependencyName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DependencyName {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DependencyName> for String {
    fn from(name: DependencyName) -> Self {
        name.0
    }
}

impl PartialEq<str> for DependencyName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DependencyName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Whether a requirement string points at a source (tarball or git URL)
/// rather than a registry version.
pub fn is_source_url(requirement: &str) -> bool {
    requirement.contains("://") || requirement.starts_with("git+") || requirement.starts_with("github:")
}

/// What a package declares for one dependency.
///
/// The stored string is kept verbatim: reconciliation compares requirements
/// textually, so `1.2.7` and a URL pointing at the 1.2.7 tarball are
/// different requirements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// An exact registry version, e.g. `1.2.7`.
    Version(String),
    /// A direct source reference, e.g. a GitHub tarball URL.
    Url(String),
}

impl Requirement {
    /// Classify and validate the raw requirement declared for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::EmptyRequirement`] for a blank requirement and
    /// [`ManifestError::InexactVersion`] when a registry requirement is not an
    /// exact semantic version.
    pub fn parse(name: &str, raw: &str) -> Result<Self, ManifestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ManifestError::EmptyRequirement {
                name: name.to_string(),
            });
        }

        if is_source_url(trimmed) {
            return Ok(Self::Url(trimmed.to_string()));
        }

        // Ranges are rejected: the lock records only resolved versions, so a
        // range could never compare equal and would reinstall on every build.
        semver::Version::parse(trimmed).map_err(|_| ManifestError::InexactVersion {
            name: name.to_string(),
            requirement: raw.to_string(),
        })?;

        Ok(Self::Version(trimmed.to_string()))
    }

    /// The requirement exactly as declared.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Version(v) | Self::Url(v) => v,
        }
    }

    /// Whether this requirement is a direct source URL.
    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }

    /// The argument handed to `npm install` for this requirement.
    pub fn install_spec(&self, name: &DependencyName) -> String {
        match self {
            Self::Version(v) => format!("{name}@{v}"),
            Self::Url(url) => url.clone(),
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
