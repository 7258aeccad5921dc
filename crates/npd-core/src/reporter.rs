//! Reporter trait for dependency injection
//!
//! Lets the build loop report progress without being coupled to a specific
//! terminal UI. Diagnostics that must survive the build go through
//! [`crate::job`]; the reporter is for live feedback only.

use crate::reconcile::{Action, TreeState};

/// Receives live progress from a build session.
pub trait Reporter: Send + Sync {
    /// A new phase started (e.g. "Building", "Bundling").
    fn section(&self, title: &str);

    /// The reconciler classified a package.
    fn reconciled(&self, package: &str, state: TreeState, action: Action);

    /// npm is about to run for a package (`mode` is "from lock" or "fresh").
    fn installing(&self, package: &str, mode: &str);

    /// A stale top-level entry was removed from a package's tree.
    fn pruned(&self, package: &str, entry: &str);

    /// A package finished successfully.
    fn done(&self, package: &str, detail: &str);

    /// A package failed; the reason is also recorded on its job.
    fn failed(&self, package: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Display a final summary.
    fn summary(&self, succeeded: usize, failed: usize, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn reconciled(&self, package: &str, state: TreeState, action: Action) {
        (**self).reconciled(package, state, action);
    }
    fn installing(&self, package: &str, mode: &str) {
        (**self).installing(package, mode);
    }
    fn pruned(&self, package: &str, entry: &str) {
        (**self).pruned(package, entry);
    }
    fn done(&self, package: &str, detail: &str) {
        (**self).done(package, detail);
    }
    fn failed(&self, package: &str, reason: &str) {
        (**self).failed(package, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn summary(&self, succeeded: usize, failed: usize, elapsed_secs: f64) {
        (**self).summary(succeeded, failed, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., status checks, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn reconciled(&self, _: &str, _: TreeState, _: Action) {}
    fn installing(&self, _: &str, _: &str) {}
    fn pruned(&self, _: &str, _: &str) {}
    fn done(&self, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: usize, _: f64) {}
}
