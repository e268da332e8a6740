//! Runner abstraction for the external computation.
//!
//! The [`ComputeRunner`] trait decouples the query pipeline from the actual
//! backend (a subprocess). Tests use recording runners that return scripted
//! outcomes without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::core::types::ExecutionOutcome;
use crate::io::process::{ProcessError, run_command_with_timeout};

/// Placeholder substituted with the validated query in command arguments.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Parameters for one computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeRequest {
    /// Validated query text.
    pub query: String,
    /// Working directory where the computation's support files live.
    pub workdir: PathBuf,
    /// Wall-clock budget before the process is killed.
    pub budget: Duration,
    /// Maximum stdout/stderr bytes kept in memory.
    pub output_limit_bytes: usize,
}

/// Abstraction over computation backends.
pub trait ComputeRunner: Send + Sync {
    /// Run the computation. Implementations must not leave a process or pipe
    /// behind once this returns.
    fn run(&self, request: &ComputeRequest) -> ExecutionOutcome;
}

/// Runner that spawns a program with the query spliced into its arguments.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build the command for `request` without running it.
    pub fn command(&self, request: &ComputeRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(
            self.args
                .iter()
                .map(|arg| arg.replace(QUERY_PLACEHOLDER, &request.query)),
        )
        .current_dir(&request.workdir);
        cmd
    }
}

impl ComputeRunner for CommandRunner {
    #[instrument(skip_all, fields(program = %self.program, budget_ms = request.budget.as_millis() as u64))]
    fn run(&self, request: &ComputeRequest) -> ExecutionOutcome {
        let cmd = self.command(request);
        let output = match run_command_with_timeout(cmd, request.budget, request.output_limit_bytes)
        {
            Ok(output) => output,
            Err(err @ ProcessError::Spawn { .. }) => {
                return ExecutionOutcome::StartFailed {
                    cause: err.to_string(),
                };
            }
            Err(err) => {
                return ExecutionOutcome::OutputReadFailed {
                    cause: err.to_string(),
                };
            }
        };

        if output.timed_out {
            return ExecutionOutcome::TimedOut {
                elapsed: output.elapsed,
            };
        }
        if !output.status.success() {
            return ExecutionOutcome::NonZeroExit {
                code: output.status.code(),
                stderr: output.stderr,
            };
        }

        debug!(stdout_bytes = output.stdout.len(), "computation completed");
        ExecutionOutcome::Completed {
            stdout: output.stdout,
            elapsed: output.elapsed,
        }
    }
}
