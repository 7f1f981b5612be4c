use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::infra::process::ProcessError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize {file}: {source}")]
    ConfigSerialization {
        file: &'static str,
        source: serde_json::Error,
    },
    #[error("{context}: {source}")]
    Io { context: String, source: io::Error },
    #[error("mermaid CLI unavailable (`{program}`): {source}")]
    Spawn { program: String, source: io::Error },
    #[error("mermaid CLI invocation failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("mermaid CLI exited without writing {}", path.display())]
    MissingOutput { path: PathBuf },
    #[error("mermaid CLI wrote an empty file at {}", path.display())]
    EmptyOutput { path: PathBuf },
    #[error("`{program}` timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

impl RenderError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The renderer ran but did not produce a usable image.
    pub fn is_render_failure(&self) -> bool {
        matches!(
            self,
            RenderError::Cli { .. }
                | RenderError::MissingOutput { .. }
                | RenderError::EmptyOutput { .. }
                | RenderError::Timeout { .. }
        )
    }

    /// Short machine-readable tag for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::ConfigSerialization { .. } => "config_serialization",
            RenderError::Io { .. } => "io",
            RenderError::Spawn { .. } => "spawn_cli",
            RenderError::Cli { .. } => "mermaid_cli",
            RenderError::MissingOutput { .. } => "missing_output",
            RenderError::EmptyOutput { .. } => "empty_output",
            RenderError::Timeout { .. } => "timeout",
        }
    }
}

impl From<ProcessError> for RenderError {
    fn from(error: ProcessError) -> Self {
        match error {
            ProcessError::Spawn { program, source } => RenderError::Spawn { program, source },
            ProcessError::Exit {
                exit_code, stderr, ..
            } => RenderError::Cli { exit_code, stderr },
            ProcessError::Timeout { program, timeout } => RenderError::Timeout { program, timeout },
            ProcessError::Wait { program, source } => {
                RenderError::io(format!("failed while waiting for `{program}`"), source)
            }
        }
    }
}
