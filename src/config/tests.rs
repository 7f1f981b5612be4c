use std::path::Path;

use super::*;
use crate::application::render::EmbedMode;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.render.timeout_seconds = Some(30);
    raw.logging.level = Some("info".to_string());

    let overrides = Overrides {
        timeout_seconds: Some(5),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.render.timeout, Some(Duration::from_secs(5)));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn render_timeout_defaults_to_two_minutes() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(
        settings.render.timeout,
        Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    );
    assert_eq!(settings.render.format, OutputFormat::Svg);
    assert!(settings.render.filters.is_empty());
}

#[test]
fn zero_timeout_disables_the_deadline() {
    let mut raw = RawSettings::default();
    raw.render.timeout_seconds = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.render.timeout, None);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = Overrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn cache_settings_use_correct_defaults() {
    let mut raw = RawSettings::default();
    raw.render.work_dir = Some(PathBuf::from("/var/tmp/mermaid"));
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.backend, CacheBackendKind::File);
    assert_eq!(
        settings.cache.directory,
        Path::new("/var/tmp/mermaid/cache")
    );
    assert_eq!(
        settings.cache.memory_entries.get(),
        DEFAULT_MEMORY_CACHE_ENTRIES
    );
}

#[test]
fn cache_settings_can_be_overridden_via_cli() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("file".to_string());
    let overrides = Overrides {
        cache_backend: Some(CacheBackendKind::Memory),
        cache_dir: Some(PathBuf::from("/srv/cache")),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.backend, CacheBackendKind::Memory);
    assert_eq!(settings.cache.directory, Path::new("/srv/cache"));
}

#[test]
fn cache_backend_accepts_disabled_aliases() {
    for alias in ["none", "off", "Disabled"] {
        let mut raw = RawSettings::default();
        raw.cache.backend = Some(alias.to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cache.backend, CacheBackendKind::None, "{alias}");
    }
}

#[test]
fn invalid_values_name_their_key() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "cache.backend"),
        other => panic!("unexpected result: {other:?}"),
    }

    let mut raw = RawSettings::default();
    raw.cache.memory_entries = Some(0);
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "cache.memory_entries"),
        other => panic!("unexpected result: {other:?}"),
    }

    let mut raw = RawSettings::default();
    raw.render.format = Some("gif".to_string());
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "render.format"),
        other => panic!("unexpected result: {other:?}"),
    }

    let mut raw = RawSettings::default();
    raw.toolchain.package_dir = Some(PathBuf::new());
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "toolchain.package_dir"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn filters_are_normalized_into_execution_order() {
    let mut raw = RawSettings::default();
    raw.render.filters = Some(vec![
        "svgo".to_string(),
        "Inkscape".to_string(),
        "svgo".to_string(),
    ]);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.render.filters,
        [PostFilter::Inkscape, PostFilter::Svgo]
    );

    let mut raw = RawSettings::default();
    raw.render.filters = Some(vec!["optipng".to_string()]);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "render.filters",
            ..
        })
    ));
}

#[test]
fn tool_configs_default_to_empty_maps() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert!(settings.puppeteer.is_empty());
    assert!(settings.svgo.is_empty());
    assert_eq!(settings.toolchain.mmdc_path, None);
    assert_eq!(settings.toolchain.package_dir, Path::new("."));
}

#[test]
fn config_file_layers_tool_options() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("render.toml");
    std::fs::write(
        &path,
        r#"
[render]
format = "png"
timeout_seconds = 0

[puppeteer]
args = ["--no-sandbox"]
"#,
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "mermaid-render",
        "--config-file",
        path.to_str().expect("utf-8 path"),
        "install",
    ]);
    let settings = load(&args).expect("settings load");

    assert_eq!(settings.render.format, OutputFormat::Png);
    assert_eq!(settings.render.timeout, None);
    assert_eq!(
        settings.puppeteer.get("args"),
        Some(&serde_json::json!(["--no-sandbox"]))
    );
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "mermaid-render",
        "render",
        "diagram.mmd",
        "--format",
        "pdf",
        "--embed",
        "base64",
        "--filter",
        "svgo",
        "--filter",
        "inkscape",
        "--cache-backend",
        "none",
    ]);

    match args.command {
        Command::Render(render) => {
            assert_eq!(render.file, Path::new("diagram.mmd"));
            assert_eq!(render.format, Some(OutputFormat::Pdf));
            assert_eq!(render.embed, Some(EmbedMode::Base64));
            assert_eq!(
                render.overrides.filters,
                [PostFilter::Svgo, PostFilter::Inkscape]
            );
            assert_eq!(
                render.overrides.cache_backend,
                Some(CacheBackendKind::None)
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_render_from_stdin() {
    let args = CliArgs::parse_from(["mermaid-render", "render", "-"]);
    match args.command {
        Command::Render(render) => {
            assert_eq!(render.file, Path::new("-"));
            assert_eq!(render.format, None);
            assert_eq!(render.embed, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_install_overrides() {
    let args = CliArgs::parse_from([
        "mermaid-render",
        "install",
        "--package-dir",
        "/opt/mermaid",
        "--log-json",
        "true",
    ]);

    match &args.command {
        Command::Install(install) => {
            assert_eq!(
                install.overrides.package_dir.as_deref(),
                Some(Path::new("/opt/mermaid"))
            );
            assert_eq!(install.overrides.log_json, Some(true));
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert_eq!(
        args.command.overrides().package_dir.as_deref(),
        Some(Path::new("/opt/mermaid"))
    );
}
