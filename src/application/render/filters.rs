use std::{
    ffi::OsString,
    fs,
    path::Path,
    process::Command,
    time::Duration,
};

use metrics::counter;
use tempfile::Builder;
use tracing::{debug, warn};

use crate::{
    domain::PostFilter,
    infra::process::{self, Toolchain, describe, program_name},
};

const METRIC_FILTER_FAILURE: &str = "mermaid_render_filter_failure_total";
const STAGING_PREFIX: &str = "mermaid-filter-";

/// Everything a filter run needs besides the artifact itself.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub toolchain: &'a Toolchain,
    pub svgo_config: &'a Path,
    pub work_dir: &'a Path,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub applied: Vec<PostFilter>,
    pub failed: Vec<PostFilter>,
}

fn filter_command(
    filter: PostFilter,
    context: &FilterContext<'_>,
    input: &Path,
    staged: &Path,
) -> Command {
    match filter {
        PostFilter::Inkscape => {
            let mut export = OsString::from("--export-filename=");
            export.push(staged);
            let mut command = Command::new(context.toolchain.inkscape());
            command.arg(export).arg(input);
            command
        }
        PostFilter::Svgo => {
            let mut command = Command::new(context.toolchain.svgo());
            command
                .arg("--config")
                .arg(context.svgo_config)
                .arg("--input")
                .arg(input)
                .arg("--output")
                .arg(staged);
            command
        }
    }
}

/// Run `chain` over the svg at `artifact`, in order.
///
/// Each filter writes to a staging file that only replaces the artifact when
/// the filter succeeds with non-empty output. Failures are logged and counted;
/// the artifact keeps whatever the previous step produced.
pub fn apply_chain(
    chain: &[PostFilter],
    artifact: &Path,
    context: &FilterContext<'_>,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    for &filter in chain {
        match apply_one(filter, artifact, context) {
            Ok(()) => outcome.applied.push(filter),
            Err(reason) => {
                counter!(METRIC_FILTER_FAILURE, "filter" => filter.as_str()).increment(1);
                warn!(
                    target = "application::render::filters",
                    op = "filters::apply",
                    result = "error",
                    filter = filter.as_str(),
                    artifact = %artifact.display(),
                    error = %reason,
                    "Post-processing filter failed; keeping unfiltered output"
                );
                outcome.failed.push(filter);
            }
        }
    }
    outcome
}

fn apply_one(
    filter: PostFilter,
    artifact: &Path,
    context: &FilterContext<'_>,
) -> Result<(), String> {
    let staged = Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".svg")
        .tempfile_in(context.work_dir)
        .map_err(|err| format!("failed to create staging file: {err}"))?;

    let mut command = filter_command(filter, context, artifact, staged.path());
    let program = program_name(&command);
    debug!(
        target = "application::render::filters",
        op = "filters::apply",
        filter = filter.as_str(),
        command = %describe(&command),
        "Filter command"
    );

    let output = process::run(&mut command, context.timeout)
        .and_then(|output| output.into_success(&program))
        .map_err(|err| err.to_string())?;

    let staged_len = fs::metadata(staged.path())
        .map_err(|err| format!("failed to inspect filter output: {err}"))?
        .len();
    if staged_len == 0 {
        return Err(format!("`{program}` produced no output"));
    }

    staged
        .persist(artifact)
        .map_err(|err| format!("failed to replace artifact: {}", err.error))?;

    debug!(
        target = "application::render::filters",
        op = "filters::apply",
        result = "ok",
        filter = filter.as_str(),
        filter_elapsed_ms = output.elapsed.as_millis() as u64,
        "Filter finished"
    );
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;

    fn write_script(path: &Path, body: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("script dir");
        }
        fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(path).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("chmod");
    }

    struct Fixture {
        dir: TempDir,
        toolchain: Toolchain,
        artifact: std::path::PathBuf,
        svgo_config: std::path::PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("temp dir");
            let toolchain = Toolchain::in_package(dir.path().join("pkg"))
                .with_inkscape(dir.path().join("bin/inkscape"));
            let artifact = dir.path().join("out.svg");
            fs::write(&artifact, "<svg>raw</svg>").expect("seed artifact");
            let svgo_config = dir.path().join("svgo-config.js");
            fs::write(&svgo_config, "module.exports = {}").expect("svgo config");
            Self {
                dir,
                toolchain,
                artifact,
                svgo_config,
            }
        }

        fn context(&self) -> FilterContext<'_> {
            FilterContext {
                toolchain: &self.toolchain,
                svgo_config: &self.svgo_config,
                work_dir: self.dir.path(),
                timeout: Some(Duration::from_secs(10)),
            }
        }
    }

    #[test]
    fn filters_run_in_order_over_the_artifact() {
        let fixture = Fixture::new();
        // inkscape: --export-filename=<staged> <input>
        write_script(
            fixture.toolchain.inkscape(),
            r#"out="${1#--export-filename=}"; { cat "$2"; printf '+inkscape'; } > "$out""#,
        );
        // svgo: --config C --input I --output O
        write_script(
            fixture.toolchain.svgo(),
            r#"{ cat "$4"; printf '+svgo'; } > "$6""#,
        );

        let outcome = apply_chain(
            &[PostFilter::Inkscape, PostFilter::Svgo],
            &fixture.artifact,
            &fixture.context(),
        );

        assert_eq!(outcome.applied, [PostFilter::Inkscape, PostFilter::Svgo]);
        assert!(outcome.failed.is_empty());
        assert_eq!(
            fs::read_to_string(&fixture.artifact).expect("read"),
            "<svg>raw</svg>+inkscape+svgo"
        );
    }

    #[test]
    fn failing_filter_keeps_previous_output() {
        let fixture = Fixture::new();
        write_script(fixture.toolchain.svgo(), "echo 'svgo exploded' >&2; exit 1");

        let outcome = apply_chain(&[PostFilter::Svgo], &fixture.artifact, &fixture.context());

        assert_eq!(outcome.failed, [PostFilter::Svgo]);
        assert_eq!(
            fs::read_to_string(&fixture.artifact).expect("read"),
            "<svg>raw</svg>"
        );
        let staging_left = fs::read_dir(fixture.dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX));
        assert!(!staging_left, "staging file should be removed");
    }

    #[test]
    fn empty_filter_output_is_rejected() {
        let fixture = Fixture::new();
        write_script(fixture.toolchain.inkscape(), "exit 0");

        let outcome = apply_chain(
            &[PostFilter::Inkscape],
            &fixture.artifact,
            &fixture.context(),
        );

        assert_eq!(outcome.failed, [PostFilter::Inkscape]);
        assert_eq!(
            fs::read_to_string(&fixture.artifact).expect("read"),
            "<svg>raw</svg>"
        );
    }

    #[test]
    fn missing_filter_binary_is_not_fatal() {
        let fixture = Fixture::new();
        let outcome = apply_chain(
            &[PostFilter::Inkscape, PostFilter::Svgo],
            &fixture.artifact,
            &fixture.context(),
        );
        assert_eq!(outcome.failed, [PostFilter::Inkscape, PostFilter::Svgo]);
        assert!(outcome.applied.is_empty());
    }
}
