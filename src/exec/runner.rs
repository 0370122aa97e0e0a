//! Child-process runner -- tokenize, spawn, capture, enforce timeouts.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ExecError, ExecOutcome, ExecService};
use crate::config::ExecConfig;
use crate::record::EXIT_CODE_NO_STATUS;

/// Shortest accepted command, counted in characters after trimming.
pub const MIN_COMMAND_LEN: usize = 3;

/// Split a command into program and arguments.
///
/// Surrounding whitespace is trimmed, then the command is split on every
/// single space. There is no quoting: `echo "a b"` yields the two arguments
/// `"a` and `b"`, and two consecutive spaces yield an empty argument.
///
/// Returns `None` when the trimmed command is shorter than
/// [`MIN_COMMAND_LEN`].
pub fn tokenize(cmd: &str) -> Option<(&str, Vec<&str>)> {
    let trimmed = cmd.trim();
    if trimmed.chars().count() < MIN_COMMAND_LEN {
        return None;
    }
    let mut parts = trimmed.split(' ');
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Executes commands as direct child processes of this service.
#[derive(Debug, Clone, Default)]
pub struct BasicExecService {
    timeout: Option<Duration>,
}

impl BasicExecService {
    /// `timeout` of `None` lets a command run for as long as it likes.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &ExecConfig) -> Self {
        Self::new(config.timeout())
    }
}

#[async_trait]
impl ExecService for BasicExecService {
    async fn exec_cmd(&self, cmd: &str) -> ExecOutcome {
        let Some((program, args)) = tokenize(cmd) else {
            return ExecOutcome::invalid();
        };

        // Dropping this future (timeout, client gone) drops the child, which
        // kills it.
        let child = match Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                return ExecOutcome::no_status(ExecError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
        };
        debug!(program, pid = ?child.id(), "spawned command");

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => return ExecOutcome::no_status(ExecError::TimedOut(limit)),
            },
            None => child.wait_with_output().await,
        };
        let output = match waited {
            Ok(output) => output,
            Err(e) => return ExecOutcome::no_status(ExecError::Wait(e)),
        };

        let (exit_code, error) = match output.status.code() {
            Some(0) => (0, None),
            Some(code) => (code, Some(ExecError::NonZeroExit { code })),
            None => (EXIT_CODE_NO_STATUS, Some(ExecError::Signalled)),
        };

        ExecOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            error,
        }
    }
}
