//! Runner module - Checker execution layer
//!
//! This module starts external checkers (test runners, interpreters, HTTP
//! clients talking to validators) and hands back what they printed:
//! - `ProcessRunner`: direct child process execution under a deadline
//!
//! The runner module does NOT:
//! - Decode output into text
//! - Decide what the output means for a grade
//! - Know about submission kinds

pub mod process;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Fixed stderr reported for a checker that ran out of time
pub const TIMEOUT_MESSAGE: &str = "Test failed due to timeout";

/// Command specification for execution
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// Execution status (raw, no grade interpretation)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal
    Signaled(i32),
    /// Deadline passed, process group was killed
    TimedOut,
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a checker, output still as raw bytes
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Wall-clock time until exit or kill
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Outcome for a run that hit its deadline. Partial output is never kept.
    pub fn timed_out(elapsed: Duration) -> Self {
        Self {
            status: RunStatus::TimedOut,
            stdout: Vec::new(),
            stderr: TIMEOUT_MESSAGE.as_bytes().to_vec(),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Checker output after decoding, as consumed by the classifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// `None` when the run timed out
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn timed_out() -> Self {
        Self {
            stdout: None,
            stderr: Some(TIMEOUT_MESSAGE.to_string()),
            exit_code: None,
            timed_out: true,
        }
    }
}

/// Runner trait for executing checkers
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command under `timeout`, feeding `stdin` if given.
    ///
    /// Hitting the deadline is reported through [`RunStatus::TimedOut`], not
    /// as an error. Errors are reserved for a checker that cannot be started.
    async fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutcome>;
}

// Re-exports
pub use process::ProcessRunner;
