use std::error::Error as StdError;

use thiserror::Error;

use crate::{application::render::RenderError, config::LoadError, infra::error::InfraError};

/// Flattened error chain, ready for logging.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn render(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{failed} install step(s) failed")]
    Install { failed: usize },
}

impl AppError {
    /// Process exit code for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Render(err) if err.is_render_failure() => 3,
            AppError::Render(_) | AppError::Infra(_) => 1,
            AppError::Install { .. } => 4,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_walks_the_source_chain() {
        let error = AppError::from(LoadError::Invalid {
            key: "cache.backend",
            reason: "unknown backend `redis`".to_string(),
        });
        let report = error.report();
        assert_eq!(
            report.messages,
            [
                "failed to load configuration",
                "invalid configuration for `cache.backend`: unknown backend `redis`",
            ]
        );
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn render_failures_get_their_own_exit_code() {
        let cli = AppError::from(RenderError::Cli {
            exit_code: Some(1),
            stderr: "Parse error".to_string(),
        });
        assert_eq!(cli.exit_code(), 3);

        let install = AppError::Install { failed: 1 };
        assert_eq!(install.to_string(), "1 install step(s) failed");
        assert_eq!(install.exit_code(), 4);
    }

    #[test]
    fn other_failures_exit_with_one() {
        let io = AppError::from(InfraError::from(std::io::Error::other("stdout closed")));
        assert_eq!(io.exit_code(), 1);

        let spawn = AppError::from(RenderError::Spawn {
            program: "mmdc".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(spawn.exit_code(), 1);
    }
}
