//! Shared command context.
//!
//! Groups the resolved configuration and the reporter so commands do not
//! each re-derive them.

use anyhow::{Context as _, Result};
use npd_core::{BuildSession, Config, Reporter};
use std::fmt;
use std::sync::Arc;

use crate::GlobalOpts;
use crate::ui::ConsoleReporter;

/// State shared by all commands of one invocation.
#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub reporter: Arc<dyn Reporter>,
    pub json: bool,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("json", &self.json)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(config: Config, reporter: Arc<dyn Reporter>, json: bool) -> Self {
        Self {
            config,
            reporter,
            json,
        }
    }

    /// Resolve configuration and pick a reporter from the global flags.
    pub fn from_opts(opts: &GlobalOpts) -> Result<Self> {
        let config = opts.config()?;
        let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::new(opts.quiet));
        Ok(Self::new(config, reporter, opts.json))
    }

    /// A build session running the configured npm.
    pub fn session(&self) -> Result<BuildSession> {
        let runner = self
            .config
            .npm_runner()
            .context("Cannot run npm; install it or pass --npm")?;
        Ok(BuildSession::from_config(
            &self.config,
            Arc::new(runner),
            Arc::clone(&self.reporter),
        ))
    }
}
