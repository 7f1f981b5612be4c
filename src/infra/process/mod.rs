//! Blocking subprocess execution for the rendering toolchain.
//!
//! Every tool is started from an explicit argument vector; nothing is routed
//! through a shell, so paths and option values reach the child verbatim.

mod mmdc;
mod toolchain;

use std::{
    ffi::OsStr,
    io::{self, Read},
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::warn;

pub use mmdc::{Invocation, MermaidCli};
pub use toolchain::Toolchain;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("`{program}` exited unsuccessfully (exit {exit_code:?}): {stderr}")]
    Exit {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("failed while waiting for `{program}`: {source}")]
    Wait { program: String, source: io::Error },
}

/// Captured result of a finished tool.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turn a non-zero exit into [`ProcessError::Exit`].
    pub fn into_success(self, program: &str) -> Result<Self, ProcessError> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(ProcessError::Exit {
                program: program.to_string(),
                exit_code: self.status.code(),
                stderr: self.stderr_lossy(),
            })
        }
    }
}

/// Program name used in logs and errors.
pub fn program_name(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

/// Human readable rendition of the argument vector, for logging only.
pub fn describe(command: &Command) -> String {
    let mut rendered = program_name(command);
    for arg in command.get_args() {
        rendered.push(' ');
        rendered.push_str(&quote_for_log(arg));
    }
    rendered
}

fn quote_for_log(arg: &OsStr) -> String {
    let text = arg.to_string_lossy();
    if !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@".contains(c))
    {
        text.into_owned()
    } else {
        format!("{text:?}")
    }
}

/// Run `command` to completion, blocking the caller.
///
/// Stdin is closed; stdout and stderr are captured. With a timeout the child
/// is killed and reaped once the deadline passes. A non-zero exit is not an
/// error here; see [`ToolOutput::into_success`].
pub fn run(command: &mut Command, timeout: Option<Duration>) -> Result<ToolOutput, ProcessError> {
    let program = program_name(command);
    let started_at = Instant::now();

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    match timeout {
        None => {
            let output = child
                .wait_with_output()
                .map_err(|source| ProcessError::Wait {
                    program: program.clone(),
                    source,
                })?;
            Ok(ToolOutput {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
                elapsed: started_at.elapsed(),
            })
        }
        Some(limit) => wait_with_deadline(child, &program, started_at, limit),
    }
}

fn wait_with_deadline(
    mut child: Child,
    program: &str,
    started_at: Instant,
    limit: Duration,
) -> Result<ToolOutput, ProcessError> {
    // Drain both pipes while polling so a chatty child never blocks on a full pipe.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                terminate(&mut child, program);
                return Err(ProcessError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }

        let elapsed = started_at.elapsed();
        if elapsed >= limit {
            terminate(&mut child, program);
            // Grandchildren may still hold the pipes open; let the readers finish detached.
            drop((stdout, stderr));
            return Err(ProcessError::Timeout {
                program: program.to_string(),
                timeout: limit,
            });
        }
        thread::sleep(POLL_INTERVAL.min(limit - elapsed));
    };

    Ok(ToolOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
        elapsed: started_at.elapsed(),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Err(err) = pipe.read_to_end(&mut buffer) {
            warn!(
                target = "infra::process",
                op = "process::drain",
                error = %err,
                "Failed to read child output"
            );
        }
        buffer
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn terminate(child: &mut Child, program: &str) {
    if let Err(err) = child.kill() {
        warn!(
            target = "infra::process",
            op = "process::terminate",
            program,
            error = %err,
            "Failed to kill child process"
        );
    }
    if let Err(err) = child.wait() {
        warn!(
            target = "infra::process",
            op = "process::terminate",
            program,
            error = %err,
            "Failed to reap child process"
        );
    }
}
