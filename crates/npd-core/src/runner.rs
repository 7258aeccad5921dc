//! The boundary to the external `npm` executable.
//!
//! Everything npd knows about version resolution and fetching lives behind
//! [`NpmRunner`]. Production code uses [`NpmCli`]; tests substitute a
//! recording fake to assert exactly which invocations were made.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

/// Errors from running the external installer itself (as opposed to npm
/// running and reporting a failure).
#[derive(Error, Debug)]
pub enum RunError {
    /// No `npm` executable could be located.
    #[error("npm executable not found: {0}")]
    NotFound(#[from] which::Error),

    /// The process could not be started or waited on.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that was invoked.
        program: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The process did not finish within the per-call limit.
    #[error("npm did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Extra environment variables for the child process.
    pub env: Vec<(String, String)>,
    /// Kill the child if it runs longer than this.
    pub timeout: Option<Duration>,
}

/// Captured result of one npm invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with no output.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether npm exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The last few non-empty lines of stderr (falling back to stdout), for
    /// error messages.
    pub fn tail(&self, lines: usize) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = kept.len().saturating_sub(lines);
        kept[start..].join("\n")
    }
}

/// Capability to run npm with an argument list inside a working directory.
#[async_trait]
pub trait NpmRunner: Send + Sync {
    /// Run `npm <args>` in `cwd`.
    ///
    /// A non-zero exit is *not* an error here; it is reported through
    /// [`CommandOutput::code`] so the caller can classify npm's complaint.
    async fn run(
        &self,
        cwd: &Path,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, RunError>;
}

/// Runs the real `npm` executable.
#[derive(Debug, Clone)]
pub struct NpmCli {
    program: PathBuf,
}

impl NpmCli {
    /// Use the npm executable at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate `npm` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NotFound`] if no `npm` executable is on `PATH`.
    pub fn discover() -> Result<Self, RunError> {
        Ok(Self::new(which::which("npm")?))
    }

    /// Path of the npm executable in use.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl NpmRunner for NpmCli {
    async fn run(
        &self,
        cwd: &Path,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, RunError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(args)
            .current_dir(cwd)
            .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future (timeout or build cancellation) must not
            // leave npm writing into a staging directory.
            .kill_on_drop(true);

        let spawn_err = |source| RunError::Spawn {
            program: self.program.clone(),
            source,
        };

        let child = cmd.spawn().map_err(spawn_err)?;
        let output = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunError::Timeout(limit))?,
            None => child.wait_with_output().await,
        }
        .map_err(spawn_err)?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_prefers_stderr() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "added 3 packages".into(),
            stderr: "npm ERR! one\n\nnpm ERR! two\nnpm ERR! three\n".into(),
        };
        assert!(!out.success());
        assert_eq!(out.tail(2), "npm ERR! two\nnpm ERR! three");
    }

    #[test]
    fn tail_falls_back_to_stdout() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "only stdout".into(),
            stderr: "   ".into(),
        };
        assert_eq!(out.tail(5), "only stdout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_a_real_process() {
        let dir = tempfile::tempdir().unwrap();
        // `sh -c` stands in for npm: same spawning path, no network.
        let runner = NpmCli::new("/bin/sh");
        let args = vec!["-c".to_string(), "echo hi; echo oops >&2; exit 3".to_string()];
        let out = runner
            .run(dir.path(), &args, &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn per_call_timeout_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let runner = NpmCli::new("/bin/sh");
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let options = RunOptions {
            timeout: Some(Duration::from_millis(100)),
            ..RunOptions::default()
        };
        let err = runner.run(dir.path(), &args, &options).await.unwrap_err();
        assert!(matches!(err, RunError::Timeout(_)));
    }
}
