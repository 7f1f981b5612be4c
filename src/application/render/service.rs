use std::{
    ffi::OsString,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::counter;
use serde_json::{Map, Value};
use tempfile::{Builder, TempPath};
use tracing::{info, warn};

use super::{
    error::RenderError,
    filters::{self, FilterContext},
    materialize::{ConfigMaterializer, ConfigStyle},
};
use crate::{
    config::Settings,
    domain::{
        CacheKey, KeyMaterial, OutputFormat, PostFilter, SecondaryMaterial, chain_label,
        normalize_chain,
    },
    infra::{
        cache::{CacheError, ResultCache},
        process::{Invocation, MermaidCli, Toolchain},
        provision::{self, InstallReport},
    },
};

pub const PUPPETEER_CONFIG_FILE: &str = "puppeteer-config.json";
pub const SVGO_CONFIG_FILE: &str = "svgo-config.js";

const INPUT_PREFIX: &str = "mermaid-input-";
const OUTPUT_PREFIX: &str = "mermaid-output-";

const METRIC_CACHE_HIT: &str = "mermaid_render_cache_hit_total";
const METRIC_CACHE_MISS: &str = "mermaid_render_cache_miss_total";
const METRIC_CACHE_UNAVAILABLE: &str = "mermaid_render_cache_unavailable_total";

/// Render options fixed for the lifetime of a [`MermaidService`].
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Options for the headless browser driven by mmdc.
    pub puppeteer: Map<String, Value>,
    /// Options for the svgo optimizer.
    pub svgo: Map<String, Value>,
    /// Post-processing applied to vector output.
    pub filters: Vec<PostFilter>,
    pub timeout: Option<Duration>,
}

impl From<&Settings> for RenderOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            puppeteer: settings.puppeteer.clone(),
            svgo: settings.svgo.clone(),
            filters: settings.render.filters.clone(),
            timeout: settings.render.timeout,
        }
    }
}

/// Renders mermaid diagrams through the mermaid CLI, fronted by an optional
/// result cache.
///
/// Safe to share between threads: every call works on its own temp files and
/// the materialized configs only change when their bytes do.
pub struct MermaidService {
    toolchain: Toolchain,
    work_dir: PathBuf,
    cli: MermaidCli,
    puppeteer: ConfigMaterializer,
    puppeteer_bytes: Vec<u8>,
    svgo: ConfigMaterializer,
    svgo_bytes: Vec<u8>,
    filters: Vec<PostFilter>,
    timeout: Option<Duration>,
    cache: Option<Arc<dyn ResultCache>>,
}

impl MermaidService {
    pub fn new(
        toolchain: Toolchain,
        work_dir: impl Into<PathBuf>,
        options: RenderOptions,
        cache: Option<Arc<dyn ResultCache>>,
    ) -> Result<Self, RenderError> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir).map_err(|err| {
            RenderError::io(format!("failed to create {}", work_dir.display()), err)
        })?;

        let puppeteer =
            ConfigMaterializer::new(work_dir.join(PUPPETEER_CONFIG_FILE), ConfigStyle::Json);
        let puppeteer_bytes = puppeteer.serialize(&options.puppeteer)?;
        let svgo = ConfigMaterializer::new(
            work_dir.join(SVGO_CONFIG_FILE),
            ConfigStyle::CommonJsModule,
        );
        let svgo_bytes = svgo.serialize(&options.svgo)?;

        Ok(Self {
            cli: MermaidCli::new(toolchain.mmdc(), options.timeout),
            toolchain,
            work_dir,
            puppeteer,
            puppeteer_bytes,
            svgo,
            svgo_bytes,
            filters: normalize_chain(&options.filters),
            timeout: options.timeout,
            cache,
        })
    }

    pub fn from_settings(
        settings: &Settings,
        cache: Option<Arc<dyn ResultCache>>,
    ) -> Result<Self, RenderError> {
        Self::new(
            Toolchain::from_settings(&settings.toolchain),
            settings.render.work_dir.clone(),
            RenderOptions::from(settings),
            cache,
        )
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn puppeteer_config_path(&self) -> &Path {
        self.puppeteer.path()
    }

    pub fn svgo_config_path(&self) -> &Path {
        self.svgo.path()
    }

    /// Filters that run for `format`; raster and pdf output is never filtered.
    pub fn filter_chain(&self, format: OutputFormat) -> &[PostFilter] {
        if format.is_vector() {
            &self.filters
        } else {
            &[]
        }
    }

    /// Key the result of rendering `source` as `format` would be cached under.
    pub fn cache_key(&self, source: &[u8], format: OutputFormat) -> Result<CacheKey, RenderError> {
        let diagram_config = self.read_diagram_config()?;
        Ok(self.derive_key(source, format, diagram_config.as_deref()))
    }

    /// Render diagram text. The text is written to a temp file inside the work
    /// directory and removed afterwards.
    pub fn render_text(&self, source: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
        let mut input = Builder::new()
            .prefix(INPUT_PREFIX)
            .suffix(".mmd")
            .tempfile_in(&self.work_dir)
            .map_err(|err| RenderError::io("failed to create diagram input file", err))?;
        input
            .write_all(source.as_bytes())
            .and_then(|()| input.flush())
            .map_err(|err| RenderError::io("failed to write diagram input file", err))?;

        let result = self.render_file(input.path(), format);
        if let Err(err) = input.close() {
            warn!(
                target = "application::render::service",
                op = "mermaid::render_text",
                result = "cleanup_error",
                error = %err,
                "Failed to remove diagram input file"
            );
        }
        result
    }

    /// Render the diagram stored at `path`.
    pub fn render_file(&self, path: &Path, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
        let started_at = Instant::now();
        let source = fs::read(path).map_err(|err| {
            RenderError::io(format!("failed to read diagram {}", path.display()), err)
        })?;
        let diagram_config = self.read_diagram_config()?;
        let key = self.derive_key(&source, format, diagram_config.as_deref());

        if let Some(blob) = self.lookup(&key) {
            counter!(METRIC_CACHE_HIT).increment(1);
            info!(
                target = "application::render::service",
                op = "mermaid::render",
                result = "cache_hit",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                format = format.as_str(),
                cache_key = %key,
                output_bytes = blob.len(),
                "Mermaid diagram served from cache"
            );
            return Ok(blob);
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        self.puppeteer.write_if_changed(&self.puppeteer_bytes)?;
        let chain = self.filter_chain(format);
        if chain.contains(&PostFilter::Svgo) {
            self.svgo.write_if_changed(&self.svgo_bytes)?;
        }

        let output = OutputArtifact::reserve(&self.work_dir, format)?;
        let diagram_config_path = diagram_config
            .is_some()
            .then(|| self.toolchain.diagram_config_path());
        self.cli.render(&Invocation {
            input: path,
            output: output.path(),
            format,
            diagram_config: diagram_config_path.as_deref(),
            puppeteer_config: self.puppeteer.path(),
        })?;
        output.ensure_produced().inspect_err(|err| self.log_failure(err, started_at))?;

        let mut degraded = false;
        if !chain.is_empty() {
            let outcome = filters::apply_chain(
                chain,
                output.path(),
                &FilterContext {
                    toolchain: &self.toolchain,
                    svgo_config: self.svgo.path(),
                    work_dir: &self.work_dir,
                    timeout: self.timeout,
                },
            );
            degraded = !outcome.failed.is_empty();
        }

        let blob = output.read().inspect_err(|err| self.log_failure(err, started_at))?;
        // The key covers the filter chain, so unfiltered bytes must not be stored under it.
        if !degraded {
            self.store(&key, &blob);
        }

        info!(
            target = "application::render::service",
            op = "mermaid::render",
            result = "cache_miss",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            format = format.as_str(),
            cache_key = %key,
            output_bytes = blob.len(),
            cached = !degraded,
            "Mermaid diagram rendered via CLI"
        );
        Ok(blob)
    }

    /// Install the node toolchain and headless browser into the package
    /// directory. Every step runs even when an earlier one fails.
    pub fn install(&self) -> InstallReport {
        install(&self.toolchain)
    }

    fn read_diagram_config(&self) -> Result<Option<Vec<u8>>, RenderError> {
        self.toolchain.read_diagram_config().map_err(|err| {
            RenderError::io(
                format!(
                    "failed to read {}",
                    self.toolchain.diagram_config_path().display()
                ),
                err,
            )
        })
    }

    fn derive_key(
        &self,
        source: &[u8],
        format: OutputFormat,
        diagram_config: Option<&[u8]>,
    ) -> CacheKey {
        let chain = self.filter_chain(format);
        let label = chain_label(chain);
        let svgo_config: &[u8] = if chain.contains(&PostFilter::Svgo) {
            &self.svgo_bytes
        } else {
            &[]
        };
        let secondary = (!chain.is_empty()).then(|| SecondaryMaterial {
            filters: &label,
            config: svgo_config,
        });

        KeyMaterial {
            format,
            source,
            config: &self.puppeteer_bytes,
            diagram_config: diagram_config.unwrap_or_default(),
            secondary,
        }
        .derive()
    }

    fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let cache = self.cache.as_ref()?;
        match cache.has(key) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                self.cache_unavailable("has", key, &err);
                return None;
            }
        }
        match cache.get(key) {
            Ok(blob) => Some(blob),
            // Removed between `has` and `get`.
            Err(CacheError::NotFound(_)) => None,
            Err(err) => {
                self.cache_unavailable("get", key, &err);
                None
            }
        }
    }

    fn store(&self, key: &CacheKey, blob: &[u8]) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Err(err) = cache.set(key, blob) {
            self.cache_unavailable("set", key, &err);
        }
    }

    fn cache_unavailable(&self, cache_op: &'static str, key: &CacheKey, err: &CacheError) {
        counter!(METRIC_CACHE_UNAVAILABLE, "op" => cache_op).increment(1);
        warn!(
            target = "application::render::service",
            op = "mermaid::render",
            result = "cache_unavailable",
            cache_op,
            cache_key = %key,
            error = %err,
            "Result cache unavailable; continuing without it"
        );
    }

    fn log_failure(&self, err: &RenderError, started_at: Instant) {
        warn!(
            target = "application::render::service",
            op = "mermaid::render",
            result = "error",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            error_code = err.code(),
            error = %err,
            "Mermaid CLI produced no usable output"
        );
    }
}

/// Run the default provisioning steps for `toolchain`. Needs neither a work
/// directory nor materialized configs.
pub fn install(toolchain: &Toolchain) -> InstallReport {
    let steps = provision::default_steps(toolchain);
    provision::run_steps(toolchain, &steps, None)
}

/// Output path for one mmdc run.
///
/// A unique name is reserved in the work directory and the format extension
/// appended, so the file itself does not exist until mmdc writes it. Both the
/// reservation and the output are removed on drop.
struct OutputArtifact {
    reservation: Option<TempPath>,
    path: PathBuf,
}

impl OutputArtifact {
    fn reserve(work_dir: &Path, format: OutputFormat) -> Result<Self, RenderError> {
        let reservation = Builder::new()
            .prefix(OUTPUT_PREFIX)
            .tempfile_in(work_dir)
            .map_err(|err| RenderError::io("failed to reserve output path", err))?
            .into_temp_path();

        let mut path = OsString::from(reservation.as_os_str());
        path.push(".");
        path.push(format.extension());

        Ok(Self {
            reservation: Some(reservation),
            path: PathBuf::from(path),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_produced(&self) -> Result<(), RenderError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() == 0 => Err(RenderError::EmptyOutput {
                path: self.path.clone(),
            }),
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(RenderError::MissingOutput {
                path: self.path.clone(),
            }),
            Err(err) => Err(RenderError::io(
                format!("failed to inspect {}", self.path.display()),
                err,
            )),
        }
    }

    fn read(&self) -> Result<Vec<u8>, RenderError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Err(RenderError::EmptyOutput {
                path: self.path.clone(),
            }),
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(RenderError::MissingOutput {
                path: self.path.clone(),
            }),
            Err(err) => Err(RenderError::io(
                format!("failed to read {}", self.path.display()),
                err,
            )),
        }
    }
}

impl Drop for OutputArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                target = "application::render::service",
                op = "mermaid::cleanup",
                result = "cleanup_error",
                path = %self.path.display(),
                error = %err,
                "Failed to remove rendered output"
            ),
        }
        if let Some(reservation) = self.reservation.take() {
            if let Err(err) = reservation.close() {
                warn!(
                    target = "application::render::service",
                    op = "mermaid::cleanup",
                    result = "cleanup_error",
                    error = %err,
                    "Failed to remove output reservation"
                );
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;

    fn fake_mmdc(dir: &Path, body: &str) -> Toolchain {
        let toolchain = Toolchain::in_package(dir.join("pkg"));
        let mmdc = toolchain.mmdc();
        fs::create_dir_all(mmdc.parent().expect("parent")).expect("bin dir");
        fs::write(mmdc, format!("#!/bin/sh\n{body}\n")).expect("script");
        let mut perms = fs::metadata(mmdc).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(mmdc, perms).expect("chmod");
        toolchain
    }

    #[test]
    fn output_reservation_is_cleaned_up() {
        let dir = TempDir::new().expect("temp dir");
        let artifact = OutputArtifact::reserve(dir.path(), OutputFormat::Png).expect("reserve");
        let output = artifact.path().to_path_buf();
        assert!(output.to_string_lossy().ends_with(".png"));
        assert!(!output.exists());
        assert!(matches!(
            artifact.ensure_produced(),
            Err(RenderError::MissingOutput { .. })
        ));

        fs::write(&output, b"png").expect("write output");
        drop(artifact);
        assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn filter_chain_only_applies_to_svg() {
        let dir = TempDir::new().expect("temp dir");
        let service = MermaidService::new(
            Toolchain::in_package(dir.path().join("pkg")),
            dir.path().join("work"),
            RenderOptions {
                filters: vec![PostFilter::Svgo, PostFilter::Inkscape],
                ..RenderOptions::default()
            },
            None,
        )
        .expect("service");

        assert_eq!(
            service.filter_chain(OutputFormat::Svg),
            [PostFilter::Inkscape, PostFilter::Svgo]
        );
        assert!(service.filter_chain(OutputFormat::Png).is_empty());
        assert!(service.filter_chain(OutputFormat::Pdf).is_empty());
    }

    #[test]
    fn cli_failure_surfaces_stderr() {
        let dir = TempDir::new().expect("temp dir");
        let toolchain = fake_mmdc(dir.path(), "echo 'Parse error on line 1' >&2; exit 1");
        let service = MermaidService::new(
            toolchain,
            dir.path().join("work"),
            RenderOptions::default(),
            None,
        )
        .expect("service");

        let err = service
            .render_text("graph TD; A-->", OutputFormat::Svg)
            .expect_err("render should fail");
        match &err {
            RenderError::Cli { exit_code, stderr } => {
                assert_eq!(*exit_code, Some(1));
                assert!(stderr.contains("Parse error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_render_failure());
    }
}
