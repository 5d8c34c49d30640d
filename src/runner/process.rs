//! Process runner implementation
//!
//! Executes checkers directly as child processes. Every child is started as
//! the leader of its own process group so that the whole group (test runner
//! plus anything it forked) can be killed in one go.

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CommandSpec, RunOutcome, RunStatus, Runner};
use crate::error::{GradeError, Result};

/// How long to keep collecting output after the checker has exited
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runner that executes checkers directly on the host
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    drain_timeout: Duration,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Bound on reading the remaining pipe contents once the checker exits
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Run a checker and wait for it, at most `timeout`
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutcome> {
        debug!("Running checker: {:?} (timeout {:?})", cmd.to_vec(), timeout);

        let mut std_cmd = std::process::Command::new(&cmd.program);
        std_cmd
            .args(&cmd.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut command = Command::from(std_cmd);
        command.kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| GradeError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        let pgid = child.id();

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let input = input.to_vec();
            tokio::spawn(async move {
                // The checker is free to exit without reading its input
                if let Err(e) = pipe.write_all(&input).await {
                    debug!("Checker stdin closed early: {}", e);
                }
            });
        }

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let waited = tokio::time::timeout(timeout, child.wait()).await;

        // Whatever happened, nothing from this run may outlive it
        kill_process_group(pgid);

        let exit_status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                stdout_task.abort();
                stderr_task.abort();
                reap(&mut child).await;
                return Err(GradeError::Wait {
                    program: cmd.program.clone(),
                    source,
                });
            }
            Err(_) => {
                warn!(
                    "Checker {} exceeded its {:?} deadline, process group killed",
                    cmd.program, timeout
                );
                reap(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return Ok(RunOutcome::timed_out(started.elapsed()));
            }
        };

        let stdout = self.drain(stdout_task, "stdout").await;
        let stderr = self.drain(stderr_task, "stderr").await;

        let status = match exit_status.code() {
            Some(code) => RunStatus::Exited(code),
            None => RunStatus::Signaled(exit_status.signal().unwrap_or_default()),
        };

        debug!(
            "Checker {} finished: status={:?}, stdout={}B, stderr={}B",
            cmd.program,
            status,
            stdout.len(),
            stderr.len()
        );

        Ok(RunOutcome {
            status,
            stdout,
            stderr,
            elapsed: started.elapsed(),
        })
    }

    async fn drain(&self, task: JoinHandle<Vec<u8>>, stream: &str) -> Vec<u8> {
        let abort = task.abort_handle();
        match tokio::time::timeout(self.drain_timeout, task).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("Failed to collect checker {}: {}", stream, e);
                Vec::new()
            }
            Err(_) => {
                abort.abort();
                warn!("Checker {} still held open after exit, dropped", stream);
                Vec::new()
            }
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
        stdin: Option<&[u8]>,
    ) -> Result<RunOutcome> {
        self.execute(cmd, timeout, stdin).await
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            debug!("Checker pipe read ended with error: {}", e);
        }
    }
    buf
}

fn kill_process_group(pgid: Option<u32>) {
    let Some(pgid) = pgid else {
        return;
    };
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!("Reaping checker failed: {}", e);
    }
}
