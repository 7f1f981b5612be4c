use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use super::CacheBackendKind;
use crate::application::render::EmbedMode;
use crate::domain::{OutputFormat, PostFilter};

/// Command-line arguments for the mermaid-render binary.
#[derive(Debug, Parser)]
#[command(
    name = "mermaid-render",
    version,
    about = "Render Mermaid diagrams through the mermaid CLI with a result cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "MERMAID_RENDER_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a diagram file and write the result to stdout.
    Render(RenderArgs),
    /// Install the node toolchain and the headless browser it drives.
    Install(InstallArgs),
}

impl Command {
    pub fn overrides(&self) -> &Overrides {
        match self {
            Command::Render(args) => &args.overrides,
            Command::Install(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: Overrides,

    /// Diagram file to render; `-` reads the diagram from stdin.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Output format; defaults to `render.format` from the configuration.
    #[arg(long, short = 'f', value_enum)]
    pub format: Option<OutputFormat>,

    /// Wrap the output for direct inclusion in an HTML document.
    #[arg(long, value_enum, value_name = "MODE")]
    pub embed: Option<EmbedMode>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct InstallArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the directory holding the mermaid node package.
    #[arg(long = "package-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub package_dir: Option<PathBuf>,

    /// Override the mermaid CLI executable.
    #[arg(long = "mmdc-path", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub mmdc_path: Option<PathBuf>,

    /// Override the directory for temporary files and materialized configs.
    #[arg(long = "work-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub work_dir: Option<PathBuf>,

    /// Override the result cache backend.
    #[arg(long = "cache-backend", value_enum, value_name = "BACKEND")]
    pub cache_backend: Option<CacheBackendKind>,

    /// Override the file cache directory.
    #[arg(long = "cache-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Override the subprocess timeout; 0 disables it.
    #[arg(long = "timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Enable a post-processing filter for vector output (repeatable).
    #[arg(long = "filter", value_enum, value_name = "FILTER")]
    pub filters: Vec<PostFilter>,
}
