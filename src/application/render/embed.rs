use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::domain::OutputFormat;

/// How rendered bytes are wrapped for inclusion in an HTML page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedMode {
    /// Inline svg markup; other formats fall back to a data URI.
    Inline,
    /// Always an `<img>` with a base64 data URI.
    Base64,
}

pub fn embed(bytes: &[u8], format: OutputFormat, mode: EmbedMode) -> String {
    match (mode, format) {
        (EmbedMode::Inline, OutputFormat::Svg) => String::from_utf8_lossy(bytes).into_owned(),
        _ => format!(
            r#"<img width="100%" src="data:{};base64,{}" />"#,
            format.mime_type(),
            STANDARD.encode(bytes)
        ),
    }
}
