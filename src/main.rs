use std::{
    io::{self, Read, Write},
    path::Path,
    process,
    sync::Arc,
};

use mermaid_render::{
    application::{
        error::AppError,
        render::{self, MermaidService, embed},
    },
    config::{self, Command, RenderArgs, Settings},
    infra::{
        cache::{self, ResultCache},
        error::InfraError,
        process::Toolchain,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const STDIN_PATH: &str = "-";

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(source = report.source, error = %report.render(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, error = %report.render(), "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Render(args) => run_render(&settings, args),
        Command::Install(_) => run_install(&settings),
    }
}

fn run_render(settings: &Settings, args: RenderArgs) -> Result<(), AppError> {
    let format = args.format.unwrap_or(settings.render.format);
    let service = MermaidService::from_settings(settings, open_cache(settings))?;

    let rendered = if args.file == Path::new(STDIN_PATH) {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .map_err(InfraError::from)?;
        service.render_text(&source, format)?
    } else {
        service.render_file(&args.file, format)?
    };

    let mut stdout = io::stdout().lock();
    match args.embed {
        Some(mode) => writeln!(stdout, "{}", embed(&rendered, format, mode)),
        None => stdout.write_all(&rendered),
    }
    .and_then(|()| stdout.flush())
    .map_err(InfraError::from)?;

    Ok(())
}

fn run_install(settings: &Settings) -> Result<(), AppError> {
    let toolchain = Toolchain::from_settings(&settings.toolchain);
    let report = render::install(&toolchain);

    let failed = report.failed_steps().count();
    if failed > 0 {
        return Err(AppError::Install { failed });
    }

    info!(
        target = "mermaid_render::install",
        op = "install",
        result = "ok",
        steps = report.steps.len(),
        package_dir = %toolchain.package_dir().display(),
        "Toolchain installed"
    );
    Ok(())
}

fn open_cache(settings: &Settings) -> Option<Arc<dyn ResultCache>> {
    match cache::open(&settings.cache) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(
                target = "mermaid_render::render",
                op = "cache::open",
                result = "cache_unavailable",
                cache_dir = %settings.cache.directory.display(),
                error = %err,
                "Result cache could not be opened; rendering without it"
            );
            None
        }
    }
}
