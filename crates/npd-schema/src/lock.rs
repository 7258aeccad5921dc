//! The lock description: the exact dependency graph last installed for a
//! package, persisted as `npm-shrinkwrap.json`.
//!
//! The persisted form is deliberately minimal. Each entry carries either a
//! `version` (registry dependencies) or a `from` reference (source URLs),
//! followed by its nested `dependencies`. Keys are sorted and the file is
//! pretty-printed with two-space indentation plus a trailing newline, so an
//! unchanged graph always serializes to the same bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::manifest::Manifest;
use crate::types::{Requirement, is_source_url};

/// File name of the lock description inside a package's dependency directory.
pub const LOCK_FILE: &str = "npm-shrinkwrap.json";

/// Errors produced while reading or deriving a lock description.
#[derive(Error, Debug)]
pub enum LockError {
    /// The JSON could not be parsed or produced.
    #[error("malformed npm-shrinkwrap.json: {0}")]
    Json(#[from] serde_json::Error),

    /// npm's shrinkwrap lacks an entry for a declared dependency.
    #[error("npm shrinkwrap has no entry for {name}")]
    MissingEntry {
        /// Declared dependency that npm did not record.
        name: String,
    },
}

/// Where a resolved dependency came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Resolved from the npm registry by version.
    Registry,
    /// Fetched directly from a source URL.
    Url,
}

/// One resolved dependency and its pinned sub-dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    /// Exact installed version (registry dependencies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Source reference (URL dependencies). Version metadata of fetched
    /// sources is not trustworthy, so none is recorded for them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Nested dependencies, pinned exactly as they were installed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, LockedDependency>,
}

impl LockedDependency {
    /// A registry dependency pinned at `version`.
    pub fn registry(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }

    /// A dependency fetched from `url`.
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            from: Some(url.into()),
            ..Self::default()
        }
    }

    /// Add a nested dependency (builder style).
    pub fn with_dependency(mut self, name: impl Into<String>, dep: LockedDependency) -> Self {
        self.dependencies.insert(name.into(), dep);
        self
    }

    /// Whether this entry came from the registry or a URL.
    pub fn origin(&self) -> Origin {
        if self.from.is_some() && self.version.is_none() {
            Origin::Url
        } else {
            Origin::Registry
        }
    }

    /// The resolved version, or the source reference for URL entries.
    pub fn resolved(&self) -> &str {
        self.version
            .as_deref()
            .or(self.from.as_deref())
            .unwrap_or_default()
    }

    /// Whether this entry satisfies `requirement`, compared textually.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        match requirement {
            Requirement::Version(v) => self.version.as_deref() == Some(v.as_str()),
            Requirement::Url(url) => {
                self.version.is_none() && self.from.as_deref() == Some(url.as_str())
            }
        }
    }
}

/// The complete lock description of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDescription {
    /// Top-level dependencies, keyed and ordered by name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, LockedDependency>,
}

impl LockDescription {
    /// Parse a persisted lock description.
    ///
    /// Unknown fields written by other tools are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Json`] if `content` is not valid JSON of the
    /// expected shape.
    pub fn parse(content: &str) -> Result<Self, LockError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Serialize into the canonical on-disk form.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Json`] if serialization fails.
    pub fn to_canonical_string(&self) -> Result<String, LockError> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Look up a top-level entry.
    pub fn get(&self, name: &str) -> Option<&LockedDependency> {
        self.dependencies.get(name)
    }

    /// Iterate over top-level names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    /// Whether `name` is a top-level entry.
    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the lock has no entries.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Names whose declared requirement no longer matches this lock.
    ///
    /// Covers additions, removals and changed requirements. An empty result
    /// means the lock was produced from exactly this manifest.
    pub fn manifest_drift(&self, manifest: &Manifest) -> Vec<String> {
        let mut drift: Vec<String> = manifest
            .iter()
            .filter(|(name, requirement)| {
                self.get(name)
                    .is_none_or(|entry| !entry.satisfies(requirement))
            })
            .map(|(name, _)| name.to_string())
            .collect();

        drift.extend(
            self.names()
                .filter(|name| manifest.get(name).is_none())
                .map(str::to_string),
        );
        drift.sort();
        drift
    }

    /// Reduce a shrinkwrap written by `npm shrinkwrap` to a lock description
    /// covering exactly the dependencies declared in `manifest`.
    ///
    /// Both the nested `dependencies` layout (lockfile v1/v2) and the flat
    /// `packages` layout (lockfile v3) are understood. Top-level URL
    /// dependencies record the declared URL as `from` and drop the version
    /// npm reports for them.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::MissingEntry`] if a declared dependency does not
    /// appear in the shrinkwrap.
    pub fn from_npm_shrinkwrap(raw: &Value, manifest: &Manifest) -> Result<Self, LockError> {
        let mut tree = if let Some(deps) = raw.get("dependencies").and_then(Value::as_object) {
            minimize_nested(deps)
        } else if let Some(packages) = raw.get("packages").and_then(Value::as_object) {
            minimize_packages(packages)
        } else {
            BTreeMap::new()
        };

        let mut dependencies = BTreeMap::new();
        for (name, requirement) in manifest.iter() {
            let mut entry = tree
                .remove(name.as_str())
                .ok_or_else(|| LockError::MissingEntry {
                    name: name.to_string(),
                })?;
            if let Requirement::Url(url) = requirement {
                entry.version = None;
                entry.from = Some(url.clone());
            }
            dependencies.insert(name.to_string(), entry);
        }

        Ok(Self { dependencies })
    }
}

/// Minimize one npm shrinkwrap entry: keep `version`, or `from` when the
/// version is really a source reference, plus nested dependencies.
fn minimize_entry(raw: &Value) -> LockedDependency {
    let version = raw.get("version").and_then(Value::as_str);
    let from = raw
        .get("from")
        .or_else(|| raw.get("resolved"))
        .and_then(Value::as_str);

    let mut entry = match version {
        Some(v) if !is_source_url(v) => LockedDependency::registry(v),
        Some(v) => LockedDependency::url(from.filter(|f| is_source_url(f)).unwrap_or(v)),
        None => from.map(LockedDependency::url).unwrap_or_default(),
    };

    if let Some(nested) = raw.get("dependencies").and_then(Value::as_object) {
        entry.dependencies = minimize_nested(nested);
    }
    entry
}

fn minimize_nested(deps: &Map<String, Value>) -> BTreeMap<String, LockedDependency> {
    deps.iter()
        .map(|(name, raw)| (name.clone(), minimize_entry(raw)))
        .collect()
}

/// Rebuild the nested tree from lockfile v3 `packages` keys such as
/// `node_modules/a/node_modules/@scope/b`.
fn minimize_packages(packages: &Map<String, Value>) -> BTreeMap<String, LockedDependency> {
    let mut tree: BTreeMap<String, LockedDependency> = BTreeMap::new();

    for (path, raw) in packages {
        let Some(rest) = path.strip_prefix("node_modules/") else {
            continue;
        };
        if raw.get("link").and_then(Value::as_bool) == Some(true) {
            continue;
        }

        let segments: Vec<&str> = rest.split("/node_modules/").collect();
        let Some((leaf, parents)) = segments.split_last() else {
            continue;
        };

        let mut level = &mut tree;
        for parent in parents {
            level = &mut level.entry((*parent).to_string()).or_default().dependencies;
        }

        let minimized = minimize_entry(raw);
        let slot = level.entry((*leaf).to_string()).or_default();
        slot.version = minimized.version;
        slot.from = minimized.from;
    }

    tree
}
