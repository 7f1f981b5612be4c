//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

use std::{
    env,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::{OutputFormat, PostFilter, normalize_chain};

pub use cli::{CliArgs, Command, InstallArgs, Overrides, RenderArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mermaid-render";
const ENV_PREFIX: &str = "MERMAID_RENDER";
const DEFAULT_PACKAGE_DIR: &str = ".";
const DEFAULT_WORK_DIR_NAME: &str = "mermaid-render";
const DEFAULT_CACHE_SUBDIR: &str = "cache";
const DEFAULT_INKSCAPE_PATH: &str = "inkscape";
const DEFAULT_NPM_PATH: &str = "npm";
const DEFAULT_NPX_PATH: &str = "npx";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MEMORY_CACHE_ENTRIES: usize = 256;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub toolchain: ToolchainSettings,
    pub render: RenderSettings,
    pub cache: CacheSettings,
    /// Handed verbatim to the headless browser as its launch config.
    pub puppeteer: Map<String, Value>,
    /// Optimizer options, materialized only when the svgo filter is enabled.
    pub svgo: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSettings {
    pub package_dir: PathBuf,
    /// Defaults to `<package_dir>/node_modules/.bin/mmdc` when unset.
    pub mmdc_path: Option<PathBuf>,
    pub inkscape_path: PathBuf,
    pub npm_path: PathBuf,
    pub npx_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub work_dir: PathBuf,
    pub format: OutputFormat,
    pub timeout: Option<Duration>,
    /// Execution order, duplicates removed.
    pub filters: Vec<PostFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    pub directory: PathBuf,
    pub memory_entries: NonZeroUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    File,
    Memory,
    None,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(CacheBackendKind::File),
            "memory" => Ok(CacheBackendKind::Memory),
            "none" | "off" | "disabled" => Ok(CacheBackendKind::None),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    toolchain: RawToolchainSettings,
    render: RawRenderSettings,
    cache: RawCacheSettings,
    puppeteer: Option<Map<String, Value>>,
    svgo: Option<Map<String, Value>>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(dir) = overrides.package_dir.as_ref() {
            self.toolchain.package_dir = Some(dir.clone());
        }
        if let Some(path) = overrides.mmdc_path.as_ref() {
            self.toolchain.mmdc_path = Some(path.clone());
        }
        if let Some(dir) = overrides.work_dir.as_ref() {
            self.render.work_dir = Some(dir.clone());
        }
        if let Some(backend) = overrides.cache_backend {
            self.cache.backend = Some(backend_name(backend).to_string());
        }
        if let Some(dir) = overrides.cache_dir.as_ref() {
            self.cache.directory = Some(dir.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.render.timeout_seconds = Some(seconds);
        }
        if !overrides.filters.is_empty() {
            self.render.filters = Some(
                overrides
                    .filters
                    .iter()
                    .map(|filter| filter.as_str().to_string())
                    .collect(),
            );
        }
    }
}

fn backend_name(kind: CacheBackendKind) -> &'static str {
    match kind {
        CacheBackendKind::File => "file",
        CacheBackendKind::Memory => "memory",
        CacheBackendKind::None => "none",
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            toolchain,
            render,
            cache,
            puppeteer,
            svgo,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let toolchain = build_toolchain_settings(toolchain)?;
        let render = build_render_settings(render)?;
        let cache = build_cache_settings(cache, &render.work_dir)?;

        Ok(Self {
            logging,
            toolchain,
            render,
            cache,
            puppeteer: puppeteer.unwrap_or_default(),
            svgo: svgo.unwrap_or_default(),
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_toolchain_settings(
    toolchain: RawToolchainSettings,
) -> Result<ToolchainSettings, LoadError> {
    let package_dir = toolchain
        .package_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PACKAGE_DIR));
    non_empty_path(&package_dir, "toolchain.package_dir")?;

    let mmdc_path = toolchain.mmdc_path;
    if let Some(path) = mmdc_path.as_ref() {
        non_empty_path(path, "toolchain.mmdc_path")?;
    }

    let inkscape_path = toolchain
        .inkscape_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INKSCAPE_PATH));
    non_empty_path(&inkscape_path, "toolchain.inkscape_path")?;

    let npm_path = toolchain
        .npm_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_NPM_PATH));
    non_empty_path(&npm_path, "toolchain.npm_path")?;

    let npx_path = toolchain
        .npx_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_NPX_PATH));
    non_empty_path(&npx_path, "toolchain.npx_path")?;

    Ok(ToolchainSettings {
        package_dir,
        mmdc_path,
        inkscape_path,
        npm_path,
        npx_path,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let work_dir = render
        .work_dir
        .unwrap_or_else(|| env::temp_dir().join(DEFAULT_WORK_DIR_NAME));
    non_empty_path(&work_dir, "render.work_dir")?;

    let format = match render.format {
        Some(value) => value
            .parse::<OutputFormat>()
            .map_err(|err| LoadError::invalid("render.format", err.to_string()))?,
        None => OutputFormat::default(),
    };

    let timeout = match render.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS) {
        0 => None,
        seconds => Some(Duration::from_secs(seconds)),
    };

    let filters = render
        .filters
        .unwrap_or_default()
        .iter()
        .map(|name| name.parse::<PostFilter>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| LoadError::invalid("render.filters", err.to_string()))?;

    Ok(RenderSettings {
        work_dir,
        format,
        timeout,
        filters: normalize_chain(&filters),
    })
}

fn build_cache_settings(
    cache: RawCacheSettings,
    work_dir: &Path,
) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(value) => value
            .parse::<CacheBackendKind>()
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackendKind::File,
    };

    let directory = cache
        .directory
        .unwrap_or_else(|| work_dir.join(DEFAULT_CACHE_SUBDIR));
    non_empty_path(&directory, "cache.directory")?;

    let entries = cache
        .memory_entries
        .unwrap_or(DEFAULT_MEMORY_CACHE_ENTRIES);
    let memory_entries = NonZeroUsize::new(entries)
        .ok_or_else(|| LoadError::invalid("cache.memory_entries", "must be greater than zero"))?;

    Ok(CacheSettings {
        backend,
        directory,
        memory_entries,
    })
}

fn non_empty_path(path: &Path, key: &'static str) -> Result<(), LoadError> {
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawToolchainSettings {
    package_dir: Option<PathBuf>,
    mmdc_path: Option<PathBuf>,
    inkscape_path: Option<PathBuf>,
    npm_path: Option<PathBuf>,
    npx_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    work_dir: Option<PathBuf>,
    format: Option<String>,
    timeout_seconds: Option<u64>,
    filters: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
    memory_entries: Option<usize>,
}
