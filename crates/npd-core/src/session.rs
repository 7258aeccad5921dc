//! The build loop: reconcile, install and validate many packages
//! concurrently, collecting one job of diagnostics per package.

use npd_schema::{LockDescription, Manifest, ManifestError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tracing::{debug, error, info};

use crate::bundle::{BundleSource, integrate_all};
use crate::config::Config;
use crate::error::DepsError;
use crate::install::{InstallMode, Installer, StagedInstall};
use crate::job::{Diagnostics, Job};
use crate::paths::PackageLayout;
use crate::reconcile::{Action, Reconciliation, TreeState, reconcile};
use crate::reporter::Reporter;
use crate::runner::NpmRunner;
use crate::store;
use crate::tree::TreeListing;
use crate::validate::{Validation, validate};

/// One package to build: where it lives and what it declares.
#[derive(Debug, Clone)]
pub struct PackageBuild {
    layout: PackageLayout,
    manifest: Result<Manifest, ManifestError>,
}

impl PackageBuild {
    /// A package with an already validated manifest.
    pub fn new(layout: PackageLayout, manifest: Manifest) -> Self {
        Self {
            layout,
            manifest: Ok(manifest),
        }
    }

    /// A package with raw `(name, requirement)` declarations. An invalid
    /// declaration does not fail here; it becomes a diagnostic on the
    /// package's job when built.
    pub fn declared<I, K, V>(layout: PackageLayout, declared: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            layout,
            manifest: Manifest::from_declared(declared),
        }
    }

    /// Where the package lives.
    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    /// The declared manifest, or why it is invalid.
    pub fn manifest(&self) -> Result<&Manifest, &ManifestError> {
        self.manifest.as_ref()
    }
}

/// What happened to one package.
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    /// Package name.
    pub package: String,
    /// State the reconciler classified (or `Unresolvable` after a failure
    /// to satisfy the manifest).
    pub state: TreeState,
    /// Action that was attempted.
    pub action: Action,
    /// Lock description in effect afterwards. On failure this is the prior
    /// lock, which stays on disk untouched.
    pub lock: Option<LockDescription>,
    /// Stale entries removed from the tree.
    pub pruned: Vec<String>,
    /// Diagnostics for this package.
    pub job: Job,
}

impl PackageOutcome {
    fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            state: TreeState::Clean,
            action: Action::Keep,
            lock: None,
            pruned: Vec::new(),
            job: Job::for_package(package),
        }
    }

    /// Whether the package built without diagnostics.
    pub fn succeeded(&self) -> bool {
        !self.job.has_messages()
    }
}

/// Result of [`BuildSession::build`].
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Per-package outcomes, in the order the packages were given.
    pub outcomes: Vec<PackageOutcome>,
    /// Wall-clock time of the whole build.
    pub elapsed: Duration,
}

impl BuildReport {
    /// Every package's job.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            jobs: self.outcomes.iter().map(|o| o.job.clone()).collect(),
        }
    }

    /// Whether any package failed.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.succeeded())
    }

    /// Look up a package's outcome.
    pub fn outcome(&self, package: &str) -> Option<&PackageOutcome> {
        self.outcomes.iter().find(|o| o.package == package)
    }
}

type LockMap = HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>;

/// One async mutex per dependency directory, so that two builds (or a build
/// and a bundle) never touch the same directory at once.
#[derive(Debug, Clone, Default)]
struct DirLocks(Arc<Mutex<LockMap>>);

impl DirLocks {
    async fn acquire(&self, layout: &PackageLayout) -> OwnedMutexGuard<()> {
        self.acquire_key(layout.lock_key()).await
    }

    /// Lock several directories, each once and in sorted order, so that
    /// overlapping multi-directory holders cannot deadlock.
    async fn acquire_all(&self, layouts: &[&PackageLayout]) -> Vec<OwnedMutexGuard<()>> {
        let keys: BTreeSet<PathBuf> = layouts.iter().map(|l| l.lock_key()).collect();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire_key(key).await);
        }
        guards
    }

    async fn acquire_key(&self, key: PathBuf) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Builds packages against one installer and reporter.
#[derive(Clone)]
pub struct BuildSession {
    installer: Arc<Installer>,
    reporter: Arc<dyn Reporter>,
    locks: DirLocks,
    timeout: Option<Duration>,
    jobs: usize,
}

impl std::fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSession")
            .field("installer", &self.installer)
            .field("reporter", &"<dyn Reporter>")
            .field("timeout", &self.timeout)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl BuildSession {
    /// A session with no time limit and one concurrent package per CPU.
    pub fn new(installer: Installer, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            installer: Arc::new(installer),
            reporter,
            locks: DirLocks::default(),
            timeout: None,
            jobs: num_cpus::get(),
        }
    }

    /// A session configured from `config`, running npm through `runner`.
    pub fn from_config(
        config: &Config,
        runner: Arc<dyn NpmRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self::new(Installer::new(runner, config.installer()), reporter)
            .with_timeout(config.timeout())
            .with_jobs(config.jobs)
    }

    /// Bound each package's whole install sequence.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build at most `jobs` packages at once (at least one).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Build every package, concurrently up to the configured limit.
    ///
    /// Never fails as a whole: per-package failures are recorded on that
    /// package's job and the remaining packages still build.
    pub async fn build(&self, packages: Vec<PackageBuild>) -> BuildReport {
        let started = Instant::now();
        self.reporter.section("Building");

        let names: Vec<String> = packages.iter().map(|p| p.layout.name().to_string()).collect();
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut set = tokio::task::JoinSet::new();

        for (index, package) in packages.into_iter().enumerate() {
            let session = self.clone();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                (index, session.build_one(package).await)
            });
        }

        let mut slots: Vec<Option<PackageOutcome>> = vec![None; names.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!(error = %e, "package build task failed"),
            }
        }

        let outcomes: Vec<PackageOutcome> = slots
            .into_iter()
            .zip(&names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| {
                    let mut outcome = PackageOutcome::new(name);
                    outcome.job.error("internal error: build task did not complete");
                    outcome
                })
            })
            .collect();

        let elapsed = started.elapsed();
        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        self.reporter
            .summary(outcomes.len() - failed, failed, elapsed.as_secs_f64());

        BuildReport { outcomes, elapsed }
    }

    /// Build one package: reconcile, install if needed, validate.
    pub async fn build_one(&self, package: PackageBuild) -> PackageOutcome {
        let name = package.layout.name().to_string();
        let mut outcome = PackageOutcome::new(&name);
        let _guard = self.locks.acquire(&package.layout).await;

        // The time budget covers everything up to the swap; the swap itself
        // always runs to completion.
        let prepared = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.prepare(&package, &mut outcome))
                .await
                .unwrap_or_else(|_| Err(DepsError::timed_out(limit))),
            None => self.prepare(&package, &mut outcome).await,
        };
        let result = match prepared {
            Ok(Some(staged)) => self.commit(staged, &mut outcome).await,
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            if err.is_unresolvable() {
                outcome.state = TreeState::Unresolvable;
            } else if matches!(err, DepsError::ManifestInvalid(_)) {
                // Never reconciled; the declaration itself needs fixing.
                outcome.state = TreeState::ManifestChanged;
                outcome.action = Action::FullInstall;
            }
            error!(package = %name, error = %err, "npm dependencies not ready");
            self.reporter.failed(&name, &err.to_string());
            outcome.job.report(&err);
        }
        outcome
    }

    /// Everything but the final swap. Returns the staged install still to
    /// commit, if the action needs one.
    async fn prepare(
        &self,
        package: &PackageBuild,
        outcome: &mut PackageOutcome,
    ) -> Result<Option<StagedInstall>, DepsError> {
        let layout = &package.layout;
        let lock_path = layout.lock_path();
        let prior = store::load_lock(&lock_path).await?;
        if prior.is_none() && tokio::fs::try_exists(&lock_path).await.unwrap_or(false) {
            self.reporter.warning(&format!(
                "{}: ignoring unreadable {}, reinstalling",
                layout.name(),
                lock_path.display()
            ));
        }
        outcome.lock.clone_from(&prior);

        let manifest = package.manifest.clone()?;
        let reconciliation = Self::reconcile_layout(layout, &manifest, prior.as_ref()).await?;
        outcome.state = reconciliation.state;
        outcome.action = reconciliation.action;
        debug!(package = layout.name(), state = %reconciliation.state, reasons = ?reconciliation.reasons, "reconciled");
        self.reporter
            .reconciled(layout.name(), reconciliation.state, reconciliation.action);

        match (reconciliation.action, prior.as_ref()) {
            (Action::Keep, Some(lock)) => {
                let validation = Self::validate_tree(layout.tree_dir(), lock.clone()).await?;
                for entry in &validation.pruned {
                    self.reporter.pruned(layout.name(), entry);
                }
                outcome.pruned = validation.pruned;
                if store::ensure_scaffold(&layout.dependency_dir()).await? {
                    info!(package = layout.name(), "restored dependency directory markers");
                    self.reporter
                        .info(&format!("{}: restored .gitignore and README", layout.name()));
                }
                self.reporter.done(layout.name(), "up to date");
            }
            (Action::Keep, None) => {
                self.reporter.done(layout.name(), "no npm dependencies");
            }
            (Action::RemoveTree, _) => {
                self.installer.remove(layout).await?;
                outcome.lock = None;
                self.reporter.done(layout.name(), "removed npm dependencies");
            }
            (Action::InstallFromLock, Some(lock)) => {
                return self.stage(layout, InstallMode::FromLock(lock)).await.map(Some);
            }
            (Action::FullInstall | Action::InstallFromLock, _) => {
                return self.stage(layout, InstallMode::Full(&manifest)).await.map(Some);
            }
        }
        Ok(None)
    }

    async fn stage(
        &self,
        layout: &PackageLayout,
        mode: InstallMode<'_>,
    ) -> Result<StagedInstall, DepsError> {
        self.reporter.installing(layout.name(), mode.label());
        self.installer.stage(layout, mode).await
    }

    async fn commit(
        &self,
        staged: StagedInstall,
        outcome: &mut PackageOutcome,
    ) -> Result<(), DepsError> {
        let mode = staged.mode();
        let lock = staged.commit().await?;
        self.reporter.done(
            &outcome.package,
            &format!("{} npm dependencies ({mode})", lock.len()),
        );
        outcome.lock = Some(lock);
        Ok(())
    }

    /// Classify a package without changing anything on disk.
    ///
    /// # Errors
    ///
    /// Returns [`DepsError::ManifestInvalid`] for an invalid manifest and
    /// [`DepsError::IoFailure`] if the lock or tree cannot be read.
    pub async fn status(&self, package: &PackageBuild) -> Result<Reconciliation, DepsError> {
        let layout = &package.layout;
        let _guard = self.locks.acquire(layout).await;
        let prior = store::load_lock(&layout.lock_path()).await?;
        let manifest = package.manifest.clone()?;
        Self::reconcile_layout(layout, &manifest, prior.as_ref()).await
    }

    /// Copy each package's installed tree into `bundle_dir`.
    ///
    /// Packages are bundled in order while holding their directory locks;
    /// the first failure stops the bundle. A directory listed more than once
    /// is bundled once, at its first position.
    ///
    /// # Errors
    ///
    /// Returns the first [`DepsError`] from bundle integration.
    pub async fn bundle(
        &self,
        bundle_dir: &Path,
        layouts: &[PackageLayout],
    ) -> Result<Vec<PathBuf>, DepsError> {
        self.reporter.section("Bundling");

        let mut seen = HashSet::new();
        let layouts: Vec<&PackageLayout> = layouts
            .iter()
            .filter(|l| seen.insert(l.lock_key()))
            .collect();
        let guards = self.locks.acquire_all(&layouts).await;

        let sources: Vec<BundleSource> = layouts
            .iter()
            .map(|l| BundleSource {
                package_name: l.name().to_string(),
                tree_dir: l.tree_dir(),
            })
            .collect();
        let dest = bundle_dir.to_path_buf();
        let placements = tokio::task::spawn_blocking(move || integrate_all(&dest, &sources))
            .await
            .map_err(|e| DepsError::io("failed to bundle into", bundle_dir, std::io::Error::other(e)))??;

        drop(guards);
        for (layout, placement) in layouts.iter().zip(&placements) {
            self.reporter
                .done(layout.name(), &placement.display().to_string());
        }
        Ok(placements)
    }

    async fn reconcile_layout(
        layout: &PackageLayout,
        manifest: &Manifest,
        prior: Option<&LockDescription>,
    ) -> Result<Reconciliation, DepsError> {
        let tree_dir = layout.tree_dir();
        let scan_dir = tree_dir.clone();
        let listing = tokio::task::spawn_blocking(move || TreeListing::scan(&scan_dir))
            .await
            .map_err(|e| DepsError::io("failed to scan", &tree_dir, std::io::Error::other(e)))?
            .map_err(DepsError::io_at("failed to scan", &tree_dir))?;
        Ok(reconcile(manifest, prior, &listing))
    }

    async fn validate_tree(
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::InstallerConfig;
    use crate::reporter::NullReporter;
    use crate::runner::{CommandOutput, RunError, RunOptions};
    use async_trait::async_trait;
    use tempfile::tempdir;

    /// Fails every call; proves a code path never reaches npm.
    struct NoNpm;

    #[async_trait]
    impl NpmRunner for NoNpm {
        async fn run(
            &self,
            _: &Path,
            args: &[String],
            _: &RunOptions,
        ) -> Result<CommandOutput, RunError> {
            Ok(CommandOutput::failed(1, format!("unexpected npm {}", args.join(" "))))
        }
    }

    /// Never finishes.
    struct HangingNpm;

    #[async_trait]
    impl NpmRunner for HangingNpm {
        async fn run(&self, _: &Path, _: &[String], _: &RunOptions) -> Result<CommandOutput, RunError> {
            std::future::pending().await
        }
    }

    /// Keeps warnings and info lines; ignores the rest.
    #[derive(Default)]
    struct Notes(std::sync::Mutex<Vec<String>>);

    impl Reporter for Notes {
        fn section(&self, _: &str) {}
        fn reconciled(&self, _: &str, _: TreeState, _: Action) {}
        fn installing(&self, _: &str, _: &str) {}
        fn pruned(&self, _: &str, _: &str) {}
        fn done(&self, _: &str, _: &str) {}
        fn failed(&self, _: &str, _: &str) {}
        fn info(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("info: {msg}"));
        }
        fn warning(&self, msg: &str) {
            self.0.lock().unwrap().push(format!("warning: {msg}"));
        }
        fn summary(&self, _: usize, _: usize, _: f64) {}
    }

    fn session(runner: Arc<dyn NpmRunner>) -> BuildSession {
        BuildSession::new(
            Installer::new(runner, InstallerConfig::default()),
            Arc::new(NullReporter),
        )
    }

    #[tokio::test]
    async fn invalid_manifest_becomes_a_diagnostic() {
        let dir = tempdir().unwrap();
        let package = PackageBuild::declared(
            PackageLayout::new("test-package", dir.path()),
            [("mime", "^1.2.7")],
        );

        let report = session(Arc::new(NoNpm)).build(vec![package]).await;

        assert!(report.has_failures());
        let outcome = report.outcome("test-package").unwrap();
        assert_eq!(outcome.state, TreeState::ManifestChanged);
        assert!(outcome.job.messages[0].message.contains("must declare exact version"));
        assert!(!dir.path().join(".npm").exists());
    }

    #[tokio::test]
    async fn package_without_dependencies_is_a_no_op() {
        let dir = tempdir().unwrap();
        let package = PackageBuild::new(PackageLayout::new("plain", dir.path()), Manifest::new());

        let report = session(Arc::new(NoNpm)).build(vec![package]).await;

        assert!(!report.has_failures());
        assert_eq!(report.outcomes[0].action, Action::Keep);
    }

    #[tokio::test]
    async fn timeout_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let package = PackageBuild::declared(
            PackageLayout::new("slow", dir.path()),
            [("gcd", "0.0.0")],
        );

        let report = session(Arc::new(HangingNpm))
            .with_timeout(Some(Duration::from_millis(50)))
            .build(vec![package])
            .await;

        let outcome = &report.outcomes[0];
        assert!(outcome.job.messages[0].message.contains("timed out"));
        assert_ne!(outcome.state, TreeState::Unresolvable);
        assert!(!dir.path().join(".npm/package").exists());
        let staging_left: Vec<_> = std::fs::read_dir(dir.path().join(".npm")).unwrap().collect();
        assert!(staging_left.is_empty());
    }

    #[tokio::test]
    async fn unreadable_lock_is_reported_and_reinstalled() {
        let dir = tempdir().unwrap();
        let layout = PackageLayout::new("test-package", dir.path());
        std::fs::create_dir_all(layout.dependency_dir()).unwrap();
        std::fs::write(layout.lock_path(), "{ not json").unwrap();

        let notes = Arc::new(Notes::default());
        let session = BuildSession::new(
            Installer::new(Arc::new(NoNpm), InstallerConfig::default()),
            notes.clone(),
        );
        let package = PackageBuild::declared(layout, [("gcd", "0.0.0")]);
        let report = session.build(vec![package]).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.action, Action::FullInstall);
        let notes = notes.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("warning: test-package: ignoring unreadable"));
    }
}
