//! Materialize a package's dependency tree with the external `npm`.
//!
//! Two modes exist. [`InstallMode::Full`] installs each declared requirement
//! individually and asks npm to shrinkwrap the result, producing a new lock
//! description. [`InstallMode::FromLock`] reproduces an existing lock in a
//! single bulk `npm install`, so sub-dependencies come back at exactly the
//! pinned versions.
//!
//! Both modes work in a staging directory next to the dependency directory
//! and only swap it into place once the staged tree validates. A failure at
//! any step leaves the previous lock and tree untouched.

use npd_schema::{LOCK_FILE, LockDescription, Manifest};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::DepsError;
use crate::fs::{remove_path, replace_dir};
use crate::paths::{NODE_MODULES, PackageLayout};
use crate::runner::{CommandOutput, NpmRunner, RunError, RunOptions};
use crate::store;
use crate::validate::{Validation, validate};

/// How many lines of npm output to keep in a transport failure.
const TAIL_LINES: usize = 8;

/// Name written into the throwaway `package.json` npm needs to run.
const STAGING_PACKAGE_NAME: &str = "npd-staging";

static UNRESOLVABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(ETARGET|notarget|no matching version|version not found|E404|404 Not Found|is not in (the|this) registry)",
    )
    .unwrap_or_else(|e| panic!("invalid unresolvable pattern: {e}"))
});

static NO_MATCHING_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"No matching version found for (\S+)@(\S+?)\.?(\s|$)")
        .unwrap_or_else(|e| panic!("invalid version pattern: {e}"))
});

/// Settings for [`Installer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerConfig {
    /// Log every npm invocation at info level instead of debug.
    pub print_npm_calls: bool,
    /// Arguments appended to every `npm install`.
    pub install_args: Vec<String>,
    /// Environment passed to every npm invocation.
    pub env: Vec<(String, String)>,
    /// Limit for a single npm invocation.
    pub call_timeout: Option<Duration>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            print_npm_calls: false,
            // Nested layout: only direct dependencies sit at the top of
            // node_modules, which is what validation and pruning expect.
            install_args: ["--global-style", "--no-audit", "--no-fund"]
                .map(String::from)
                .to_vec(),
            env: [
                ("npm_config_fund", "false"),
                ("npm_config_audit", "false"),
                ("npm_config_update_notifier", "false"),
            ]
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .to_vec(),
            call_timeout: None,
        }
    }
}

/// What to install.
#[derive(Debug, Clone, Copy)]
pub enum InstallMode<'a> {
    /// Install every requirement of the manifest and derive a new lock.
    Full(&'a Manifest),
    /// Reproduce this lock in one bulk install.
    FromLock(&'a LockDescription),
}

impl InstallMode<'_> {
    /// Short label for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Full(_) => "fresh",
            Self::FromLock(_) => "from lock",
        }
    }
}

/// Drives npm for one package at a time.
pub struct Installer {
    runner: Arc<dyn NpmRunner>,
    config: InstallerConfig,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("runner", &"<dyn NpmRunner>")
            .field("config", &self.config)
            .finish()
    }
}

impl Installer {
    /// Create an installer over `runner`.
    pub fn new(runner: Arc<dyn NpmRunner>, config: InstallerConfig) -> Self {
        Self { runner, config }
    }

    /// Run npm in a staging directory beside `layout`'s dependency directory
    /// and validate the result. Nothing outside the staging directory
    /// changes; dropping the returned value discards it.
    ///
    /// # Errors
    ///
    /// - [`DepsError::VersionUnresolvable`] if npm cannot satisfy a requirement.
    /// - [`DepsError::InstallTransportFailure`] if npm fails for another reason.
    /// - [`DepsError::TreeDrift`] if the staged tree does not match the lock.
    /// - [`DepsError::IoFailure`] if the staging directory cannot be prepared.
    pub async fn stage(
        &self,
        layout: &PackageLayout,
        mode: InstallMode<'_>,
    ) -> Result<StagedInstall, DepsError> {
        let npm_root = layout.npm_root();
        tokio::fs::create_dir_all(&npm_root)
            .await
            .map_err(DepsError::io_at("failed to create", &npm_root))?;

        let staging = tempfile::Builder::new()
            .prefix("package-new-")
            .tempdir_in(&npm_root)
            .map_err(DepsError::io_at("failed to create staging directory in", &npm_root))?;
        let stage = staging.path();
        debug!(package = layout.name(), staging = %stage.display(), mode = mode.label(), "staging install");

        let lock = match mode {
            InstallMode::Full(manifest) => self.install_full(stage, manifest).await?,
            InstallMode::FromLock(lock) => {
                self.install_from_lock(stage, lock).await?;
                lock.clone()
            }
        };

        store::write_scaffold(stage).await?;
        store::save_lock(stage, &lock).await?;
        for leftover in ["package.json", "package-lock.json"] {
            let path = stage.join(leftover);
            tokio::fs::remove_file(&path)
                .await
                .or_else(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => Ok(()),
                    _ => Err(e),
                })
                .map_err(DepsError::io_at("failed to remove", &path))?;
        }

        let validation = Self::validate_staged(stage.join(NODE_MODULES), lock.clone()).await?;
        if !validation.pruned.is_empty() {
            debug!(package = layout.name(), pruned = ?validation.pruned, "pruned staged tree");
        }

        Ok(StagedInstall {
            package: layout.name().to_string(),
            mode: mode.label(),
            staging,
            target: layout.dependency_dir(),
            lock,
        })
    }

    /// Delete `layout`'s dependency directory (the manifest became empty).
    ///
    /// # Errors
    ///
    /// Returns [`DepsError::IoFailure`] if the directory cannot be removed.
    pub async fn remove(&self, layout: &PackageLayout) -> Result<(), DepsError> {
        let dir = layout.dependency_dir();
        let target = dir.clone();
        tokio::task::spawn_blocking(move || remove_path(&target))
            .await
            .map_err(|e| DepsError::io("failed to remove", &dir, std::io::Error::other(e)))?
            .map_err(DepsError::io_at("failed to remove", &dir))?;
        info!(package = layout.name(), "removed npm dependencies");
        Ok(())
    }

    async fn install_full(
        &self,
        stage: &Path,
        manifest: &Manifest,
    ) -> Result<LockDescription, DepsError> {
        write_package_json(stage, Map::new()).await?;

        for (name, requirement) in manifest.iter() {
            let spec = requirement.install_spec(name);
            let mut args = vec!["install".to_string(), spec];
            args.extend(self.config.install_args.iter().cloned());

            let output = self.npm(stage, &args).await?;
            if !output.success() {
                return Err(classify(&args, &output, || {
                    (name.to_string(), requirement.to_string())
                }));
            }
        }

        let args = vec!["shrinkwrap".to_string()];
        let output = self.npm(stage, &args).await?;
        if !output.success() {
            return Err(transport_failure(&args, output.tail(TAIL_LINES)));
        }

        let path = stage.join(LOCK_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(DepsError::io_at("failed to read", &path))?;
        let raw: Value = serde_json::from_str(&content)
            .map_err(|e| transport_failure(&args, format!("unreadable {LOCK_FILE}: {e}")))?;

        LockDescription::from_npm_shrinkwrap(&raw, manifest)
            .map_err(|e| transport_failure(&args, e.to_string()))
    }

    async fn install_from_lock(&self, stage: &Path, lock: &LockDescription) -> Result<(), DepsError> {
        let dependencies = lock
            .dependencies
            .iter()
            .map(|(name, entry)| (name.clone(), Value::String(entry.resolved().to_string())))
            .collect();
        write_package_json(stage, dependencies).await?;
        store::save_lock(stage, lock).await?;

        let mut args = vec!["install".to_string()];
        args.extend(self.config.install_args.iter().cloned());

        let output = self.npm(stage, &args).await?;
        if output.success() {
            return Ok(());
        }

        Err(classify_bulk(&args, &output, lock))
    }

    async fn npm(&self, cwd: &Path, args: &[String]) -> Result<CommandOutput, DepsError> {
        let command = args.join(" ");
        if self.config.print_npm_calls {
            info!(cwd = %cwd.display(), "npm {command}");
        } else {
            debug!(cwd = %cwd.display(), "npm {command}");
        }

        let options = RunOptions {
            env: self.config.env.clone(),
            timeout: self.config.call_timeout,
        };
        let output = self
            .runner
            .run(cwd, args, &options)
            .await
            .map_err(|e: RunError| transport_failure(args, e.to_string()))?;

        debug!(code = ?output.code, "npm {command} finished");
        Ok(output)
    }

    async fn validate_staged(
        tree_dir: PathBuf,
        lock: LockDescription,
    ) -> Result<Validation, DepsError> {
        let dir = tree_dir.clone();
        tokio::task::spawn_blocking(move || validate(&tree_dir, &lock))
            .await
            .map_err(|e| DepsError::io("failed to validate", &dir, std::io::Error::other(e)))?
            .map_err(DepsError::TreeDrift)
    }
}

async fn write_package_json(stage: &Path, dependencies: Map<String, Value>) -> Result<(), DepsError> {
    let body = json!({
        "name": STAGING_PACKAGE_NAME,
        "private": true,
        "dependencies": dependencies,
    });
    let path = stage.join("package.json");
    let content = serde_json::to_string_pretty(&body).map_err(|e| {
        DepsError::io("failed to serialize", &path, std::io::Error::other(e))
    })?;
    tokio::fs::write(&path, content)
        .await
        .map_err(DepsError::io_at("failed to write", &path))
}

/// A validated install waiting to be swapped into place.
#[derive(Debug)]
pub struct StagedInstall {
    package: String,
    mode: &'static str,
    staging: TempDir,
    target: PathBuf,
    lock: LockDescription,
}

impl StagedInstall {
    /// Label of the mode that produced it ("fresh" or "from lock").
    pub fn mode(&self) -> &'static str {
        self.mode
    }

    /// Replace the dependency directory with the staged one.
    ///
    /// The swap runs on a blocking thread that finishes even if this future
    /// is dropped, so the directory is never left half replaced.
    ///
    /// # Errors
    ///
    /// Returns [`DepsError::IoFailure`] if the swap fails; the previous
    /// directory is restored and the staged one removed.
    pub async fn commit(self) -> Result<LockDescription, DepsError> {
        let Self {
            package,
            staging,
            target,
            lock,
            ..
        } = self;
        let dir = target.clone();
        let result = tokio::task::spawn_blocking(move || {
            let staged = staging.keep();
            let result = replace_dir(&staged, &target);
            if result.is_err() {
                let _ = remove_path(&staged);
            }
            result
        })
        .await
        .map_err(|e| DepsError::io("failed to replace", &dir, std::io::Error::other(e)))?;
        result.map_err(DepsError::io_at("failed to replace", &dir))?;

        info!(package = %package, dependencies = lock.len(), dir = %dir.display(), "installed npm dependencies");
        Ok(lock)
    }
}

fn combined(output: &CommandOutput) -> String {
    format!("{}\n{}", output.stderr, output.stdout)
}

fn transport_failure(args: &[String], detail: String) -> DepsError {
    DepsError::InstallTransportFailure {
        command: args.join(" "),
        detail,
    }
}

/// Turn a failed per-requirement install into the matching error.
fn classify(
    args: &[String],
    output: &CommandOutput,
    requested: impl FnOnce() -> (String, String),
) -> DepsError {
    if UNRESOLVABLE.is_match(&combined(output)) {
        let (name, version) = requested();
        DepsError::VersionUnresolvable { name, version }
    } else {
        transport_failure(args, output.tail(TAIL_LINES))
    }
}

/// Turn a failed bulk install into the matching error, naming the locked
/// dependency npm complained about.
fn classify_bulk(args: &[String], output: &CommandOutput, lock: &LockDescription) -> DepsError {
    let text = combined(output);
    if let Some(caps) = NO_MATCHING_VERSION.captures(&text) {
        return DepsError::VersionUnresolvable {
            name: caps[1].to_string(),
            version: caps[2].to_string(),
        };
    }
    if UNRESOLVABLE.is_match(&text)
        && let Some((name, entry)) = lock
            .dependencies
            .iter()
            .find(|(name, _)| mentions_package(&text, name))
    {
        return DepsError::VersionUnresolvable {
            name: name.clone(),
            version: entry.resolved().to_string(),
        };
    }
    transport_failure(args, output.tail(TAIL_LINES))
}

/// Whether npm output refers to `name`, as `name@version` or as the last
/// segment of a registry URL.
fn mentions_package(text: &str, name: &str) -> bool {
    let is_name_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~');
    let ends_name = |rest: &str| !rest.starts_with(is_name_char);
    let starts_name = |before: &str| !before.ends_with(is_name_char) && !before.ends_with('/');

    text.match_indices(name).any(|(at, _)| {
        let (before, rest) = (&text[..at], &text[at + name.len()..]);
        ends_name(rest) && ((rest.starts_with('@') && starts_name(before)) || before.ends_with('/'))
    })
}
