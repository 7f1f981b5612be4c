use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use super::error::RenderError;

/// On-disk shape of a materialized config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStyle {
    /// Plain JSON document.
    Json,
    /// `module.exports = <json>`, loadable by node tools such as svgo.
    CommonJsModule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Keeps a tool's config file in sync with in-memory settings.
///
/// The file is only rewritten when its bytes differ, and every rewrite goes
/// through a temp file renamed into place.
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    path: PathBuf,
    style: ConfigStyle,
}

impl ConfigMaterializer {
    pub fn new(path: impl Into<PathBuf>, style: ConfigStyle) -> Self {
        Self {
            path: path.into(),
            style,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical bytes for `options`.
    ///
    /// `serde_json::Map` keeps keys sorted, so equal maps always serialize to
    /// equal bytes.
    pub fn serialize(&self, options: &Map<String, Value>) -> Result<Vec<u8>, RenderError> {
        let json =
            serde_json::to_vec(options).map_err(|source| RenderError::ConfigSerialization {
                file: self.file_label(),
                source,
            })?;

        Ok(match self.style {
            ConfigStyle::Json => json,
            ConfigStyle::CommonJsModule => {
                let mut module = b"module.exports = ".to_vec();
                module.extend_from_slice(&json);
                module
            }
        })
    }

    pub fn ensure_written(&self, options: &Map<String, Value>) -> Result<WriteOutcome, RenderError> {
        let bytes = self.serialize(options)?;
        self.write_if_changed(&bytes)
    }

    /// Write already-serialized bytes unless the file holds them already.
    pub fn write_if_changed(&self, bytes: &[u8]) -> Result<WriteOutcome, RenderError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|err| {
            RenderError::io(format!("failed to create {}", parent.display()), err)
        })?;

        match fs::read(&self.path) {
            Ok(existing) if existing == bytes => return Ok(WriteOutcome::Unchanged),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(RenderError::io(
                    format!("failed to read {}", self.path.display()),
                    err,
                ));
            }
        }

        let mut staged = NamedTempFile::new_in(parent)
            .map_err(|err| RenderError::io("failed to stage config file", err))?;
        staged
            .write_all(bytes)
            .and_then(|()| staged.flush())
            .map_err(|err| RenderError::io("failed to stage config file", err))?;
        staged.persist(&self.path).map_err(|err| {
            RenderError::io(format!("failed to replace {}", self.path.display()), err.error)
        })?;

        debug!(
            target = "application::render::materialize",
            op = "materialize::write_if_changed",
            result = "written",
            config_path = %self.path.display(),
            config_bytes = bytes.len(),
            "Materialized tool config"
        );
        Ok(WriteOutcome::Written)
    }

    fn file_label(&self) -> &'static str {
        match self.style {
            ConfigStyle::Json => "puppeteer config",
            ConfigStyle::CommonJsModule => "svgo config",
        }
    }
}
