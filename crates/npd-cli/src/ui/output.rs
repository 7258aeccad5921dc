//! Console reporter: live progress on stderr.
//!
//! Stdout is reserved for command results (diagnostics, placements, JSON)
//! so that it stays machine-readable.

use crossterm::style::Stylize;
use npd_core::{Action, Reporter, TreeState};

use super::theme::Theme;

/// Prints build progress to stderr.
#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter {
    theme: Theme,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            theme: Theme::default(),
            quiet,
        }
    }

    fn line(&self, icon: String, package: &str, detail: &str) {
        if self.quiet {
            return;
        }
        eprintln!(
            "{icon} {} {}",
            package.with(self.theme.colors.package_name),
            detail.with(self.theme.colors.secondary)
        );
    }
}

/// One-line summary of a finished build.
pub fn summary_text(succeeded: usize, failed: usize, elapsed_secs: f64) -> String {
    let noun = |n: usize| if n == 1 { "package" } else { "packages" };
    if failed == 0 {
        format!("{succeeded} {} ready in {elapsed_secs:.1}s", noun(succeeded))
    } else {
        format!(
            "{failed} {} failed, {succeeded} ready in {elapsed_secs:.1}s",
            noun(failed)
        )
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        if !self.quiet {
            eprintln!("{}", title.with(self.theme.colors.header).bold());
        }
    }

    fn reconciled(&self, package: &str, state: TreeState, action: Action) {
        if action != Action::Keep {
            let icon = self.theme.icons.pending.to_string();
            self.line(icon, package, &format!("{state}, {action}"));
        }
    }

    fn installing(&self, package: &str, mode: &str) {
        let icon = self.theme.icons.active.yellow().to_string();
        self.line(icon, package, &format!("installing ({mode})"));
    }

    fn pruned(&self, package: &str, entry: &str) {
        let icon = self.theme.icons.warning.yellow().to_string();
        self.line(icon, package, &format!("removed stale {entry}"));
    }

    fn done(&self, package: &str, detail: &str) {
        let icon = self.theme.icons.success.green().to_string();
        self.line(icon, package, detail);
    }

    fn failed(&self, package: &str, reason: &str) {
        let icon = self.theme.icons.error.red().to_string();
        self.line(icon, package, reason);
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{} {msg}", self.theme.icons.info.dark_grey());
        }
    }

    fn warning(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{} {}", self.theme.icons.warning.yellow(), msg.yellow());
        }
    }

    fn summary(&self, succeeded: usize, failed: usize, elapsed_secs: f64) {
        if self.quiet {
            return;
        }
        let text = summary_text(succeeded, failed, elapsed_secs);
        eprintln!();
        if failed == 0 {
            eprintln!("{} {}", self.theme.icons.success.green(), text.green());
        } else {
            eprintln!("{} {}", self.theme.icons.error.red(), text.red());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_pluralizes() {
        assert_eq!(summary_text(1, 0, 0.31), "1 package ready in 0.3s");
        assert_eq!(summary_text(2, 1, 1.0), "1 package failed, 2 ready in 1.0s");
        assert_eq!(summary_text(0, 3, 2.0), "3 packages failed, 0 ready in 2.0s");
    }
}
