//! Command execution service.
//!
//! [`ExecService`] is the seam the HTTP layer talks to. The concrete service
//! ([`BasicExecService`]) spawns the child process; everything else (logging,
//! forwarding to the history store) is layered on top as [`Middleware`]
//! applied once at construction time by [`new`].

mod middleware;
mod runner;

pub use middleware::{forwarding, logging};
pub use runner::{tokenize, BasicExecService, MIN_COMMAND_LEN};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{EXIT_CODE_NO_STATUS, EXIT_CODE_UNSET};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid command")]
    InvalidCommand,
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to collect output: {0}")]
    Wait(#[source] std::io::Error),
    #[error("exit status {code}")]
    NonZeroExit { code: i32 },
    #[error("terminated by signal")]
    Signalled,
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl ExecError {
    /// True for failures where the command was rejected before anything ran.
    pub fn is_invalid_command(&self) -> bool {
        matches!(self, ExecError::InvalidCommand)
    }
}

/// Everything a caller learns about one execution.
///
/// `exit_code` is populated whenever the process ran, including when `error`
/// is set because the exit status was non-zero.
#[derive(Debug)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: Option<ExecError>,
}

impl ExecOutcome {
    /// Outcome of a command that was rejected before spawning.
    pub fn invalid() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: EXIT_CODE_UNSET,
            error: Some(ExecError::InvalidCommand),
        }
    }

    /// Outcome of a run that produced no exit status.
    pub fn no_status(error: ExecError) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: EXIT_CODE_NO_STATUS,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs a command on behalf of a caller.
#[async_trait]
pub trait ExecService: Send + Sync {
    async fn exec_cmd(&self, cmd: &str) -> ExecOutcome;
}

/// A decorator that wraps one service in another.
pub type Middleware = Box<dyn FnOnce(Arc<dyn ExecService>) -> Arc<dyn ExecService> + Send>;

/// Wrap `base` in each middleware, in order: the last one listed is the
/// outermost layer.
pub fn new(base: Arc<dyn ExecService>, middleware: Vec<Middleware>) -> Arc<dyn ExecService> {
    middleware.into_iter().fold(base, |svc, wrap| wrap(svc))
}
