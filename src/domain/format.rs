use std::{fmt, str::FromStr};

use serde::Deserialize;
use thiserror::Error;

/// Image formats the mermaid CLI can emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
    Pdf,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported output format `{0}` (expected svg, png or pdf)")]
pub struct UnknownFormat(pub String);

impl OutputFormat {
    /// Name passed to `--outputFormat` and mixed into the cache key.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Svg => "image/svg+xml",
            OutputFormat::Png => "image/png",
            OutputFormat::Pdf => "application/pdf",
        }
    }

    /// Post-processing filters only understand vector output.
    pub fn is_vector(self) -> bool {
        matches!(self, OutputFormat::Svg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(OutputFormat::Svg),
            "png" => Ok(OutputFormat::Png),
            "pdf" => Ok(OutputFormat::Pdf),
            _ => Err(UnknownFormat(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("SVG".parse::<OutputFormat>(), Ok(OutputFormat::Svg));
        assert_eq!(" png ".parse::<OutputFormat>(), Ok(OutputFormat::Png));
        assert_eq!("pdf".parse::<OutputFormat>(), Ok(OutputFormat::Pdf));
    }

    #[test]
    fn rejects_unknown_formats() {
        let err = "gif".parse::<OutputFormat>().expect_err("gif is unsupported");
        assert_eq!(err, UnknownFormat("gif".to_string()));
    }

    #[test]
    fn only_svg_is_vector() {
        assert!(OutputFormat::Svg.is_vector());
        assert!(!OutputFormat::Png.is_vector());
        assert!(!OutputFormat::Pdf.is_vector());
    }
}
