use std::{
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use metrics::histogram;
use tracing::{debug, warn};

use super::{ProcessError, describe, program_name, run};
use crate::domain::OutputFormat;

const METRIC_CLI_MS: &str = "mermaid_render_cli_ms";

/// Paths handed to a single mmdc run.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub format: OutputFormat,
    /// Skipped when the toolchain ships no diagram config.
    pub diagram_config: Option<&'a Path>,
    pub puppeteer_config: &'a Path,
}

/// The mermaid CLI (`mmdc`) driven through an explicit argument vector.
#[derive(Debug, Clone)]
pub struct MermaidCli {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl MermaidCli {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(config) = invocation.diagram_config {
            command.arg("--configFile").arg(config);
        }
        command
            .arg("--puppeteerConfigFile")
            .arg(invocation.puppeteer_config)
            .arg("--outputFormat")
            .arg(invocation.format.as_str())
            .arg("--output")
            .arg(invocation.output)
            .arg("--input")
            .arg(invocation.input)
            .arg("--quiet");
        command
    }

    /// Render one diagram, blocking until mmdc exits. Only the exit status is
    /// checked here; the caller verifies the output file.
    pub fn render(&self, invocation: &Invocation<'_>) -> Result<(), ProcessError> {
        let mut command = self.command(invocation);
        let program = program_name(&command);
        debug!(
            target = "infra::process::mmdc",
            op = "mmdc::render",
            command = %describe(&command),
            "Mermaid command"
        );

        let output = run(&mut command, self.timeout).inspect_err(|err| {
            warn!(
                target = "infra::process::mmdc",
                op = "mmdc::render",
                result = "error",
                error_code = "spawn_cli",
                error = %err,
                "Failed to run Mermaid CLI"
            );
        })?;
        histogram!(METRIC_CLI_MS).record(output.elapsed.as_secs_f64() * 1000.0);

        let cli_elapsed_ms = output.elapsed.as_millis() as u64;
        output.into_success(&program).map_err(|err| {
            if let ProcessError::Exit {
                exit_code, stderr, ..
            } = &err
            {
                warn!(
                    target = "infra::process::mmdc",
                    op = "mmdc::render",
                    result = "error",
                    cli_elapsed_ms,
                    exit_code = exit_code.map(i64::from).unwrap_or(-1),
                    error_code = "mermaid_cli",
                    stderr = %stderr,
                    "Mermaid CLI invocation failed"
                );
            }
            err
        })?;

        debug!(
            target = "infra::process::mmdc",
            op = "mmdc::render",
            result = "ok",
            cli_elapsed_ms,
            output_path = %invocation.output.display(),
            "Mermaid CLI finished"
        );
        Ok(())
    }
}
