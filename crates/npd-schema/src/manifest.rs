//! Declared npm dependencies of a package.
//!
//! A manifest is what the package description says it wants; it is compared
//! against the lock description to decide whether anything must be installed.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{DependencyName, Requirement};

/// Errors raised while reading a package's declared npm dependencies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// The dependency name is not a valid npm package name.
    #[error("invalid npm package name '{name}': {reason}")]
    InvalidName {
        /// Name as declared.
        name: String,
        /// Which rule the name breaks.
        reason: &'static str,
    },

    /// A registry requirement is a range or tag instead of an exact version.
    #[error("must declare exact version of npm package dependency {name}, got '{requirement}'")]
    InexactVersion {
        /// Dependency name.
        name: String,
        /// Requirement as declared.
        requirement: String,
    },

    /// The requirement string is blank.
    #[error("npm package dependency {name} has an empty requirement")]
    EmptyRequirement {
        /// Dependency name.
        name: String,
    },

    /// The same dependency is declared twice.
    #[error("npm package dependency {name} is declared more than once")]
    Duplicate {
        /// Dependency name.
        name: String,
    },
}

impl ManifestError {
    /// Name of the dependency the error is about.
    pub fn dependency(&self) -> &str {
        match self {
            Self::InvalidName { name, .. }
            | Self::InexactVersion { name, .. }
            | Self::EmptyRequirement { name }
            | Self::Duplicate { name } => name,
        }
    }
}

/// The npm dependencies declared by one package, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    dependencies: BTreeMap<DependencyName, Requirement>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from `(name, requirement)` pairs as declared.
    ///
    /// # Errors
    ///
    /// Returns the first [`ManifestError`] found: an invalid name, a blank or
    /// inexact requirement, or a name declared twice.
    pub fn from_declared<I, K, V>(declared: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut manifest = Self::new();
        for (name, raw) in declared {
            let name = DependencyName::parse(name.as_ref())?;
            let requirement = Requirement::parse(&name, raw.as_ref())?;
            if manifest.dependencies.contains_key(&name) {
                return Err(ManifestError::Duplicate {
                    name: name.to_string(),
                });
            }
            manifest.dependencies.insert(name, requirement);
        }
        Ok(manifest)
    }

    /// Add or replace a single requirement.
    pub fn insert(&mut self, name: DependencyName, requirement: Requirement) -> Option<Requirement> {
        self.dependencies.insert(name, requirement)
    }

    /// Look up the requirement declared for `name`.
    pub fn get(&self, name: &str) -> Option<&Requirement> {
        self.dependencies.get(name)
    }

    /// Iterate over declared dependencies in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&DependencyName, &Requirement)> {
        self.dependencies.iter()
    }

    /// Number of declared dependencies.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the package declares no npm dependencies at all.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
