//! One-shot provisioning of the rendering toolchain.
//!
//! Steps run in order inside the package directory. A failing step is logged
//! and recorded, and the remaining steps still run.

use std::{path::PathBuf, process::Command, time::Duration};

use tracing::{debug, info, warn};

use super::process::{Toolchain, describe, run};

/// A single provisioning command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionStep {
    pub name: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProvisionStep {
    fn command(&self, toolchain: &Toolchain) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(toolchain.package_dir());
        command
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub name: &'static str,
    pub command: String,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub steps: Vec<StepOutcome>,
}

impl InstallReport {
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|step| step.succeeded)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|step| !step.succeeded)
    }
}

/// Node dependency install followed by the headless browser download.
pub fn default_steps(toolchain: &Toolchain) -> Vec<ProvisionStep> {
    vec![
        ProvisionStep {
            name: "npm-install",
            program: toolchain.npm().to_path_buf(),
            args: vec!["install".to_string()],
        },
        ProvisionStep {
            name: "browser-install",
            program: toolchain.npx().to_path_buf(),
            args: ["puppeteer", "browsers", "install", "chrome-headless-shell"]
                .into_iter()
                .map(String::from)
                .collect(),
        },
    ]
}

/// Run `steps` best-effort, never stopping at a failed step.
pub fn run_steps(
    toolchain: &Toolchain,
    steps: &[ProvisionStep],
    timeout: Option<Duration>,
) -> InstallReport {
    let mut report = InstallReport::default();

    for step in steps {
        let mut command = step.command(toolchain);
        let rendered = describe(&command);
        debug!(
            target = "infra::provision",
            op = "provision::run_step",
            step = step.name,
            command = %rendered,
            package_dir = %toolchain.package_dir().display(),
            "Provisioning command"
        );

        let outcome = match run(&mut command, timeout) {
            Ok(output) => {
                let succeeded = output.status.success();
                let exit_code = output.status.code();
                if succeeded {
                    info!(
                        target = "infra::provision",
                        op = "provision::run_step",
                        result = "ok",
                        step = step.name,
                        elapsed_ms = output.elapsed.as_millis() as u64,
                        output = %output.stdout_lossy(),
                        "Provisioning step finished"
                    );
                } else {
                    warn!(
                        target = "infra::provision",
                        op = "provision::run_step",
                        result = "error",
                        step = step.name,
                        exit_code = exit_code.map(i64::from).unwrap_or(-1),
                        output = %output.stdout_lossy(),
                        stderr = %output.stderr_lossy(),
                        "Provisioning step failed; continuing"
                    );
                }
                StepOutcome {
                    name: step.name,
                    command: rendered,
                    exit_code,
                    succeeded,
                }
            }
            Err(err) => {
                warn!(
                    target = "infra::provision",
                    op = "provision::run_step",
                    result = "error",
                    step = step.name,
                    error = %err,
                    "Provisioning step could not run; continuing"
                );
                StepOutcome {
                    name: step.name,
                    command: rendered,
                    exit_code: None,
                    succeeded: false,
                }
            }
        };
        report.steps.push(outcome);
    }

    report
}
