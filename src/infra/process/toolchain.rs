use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use crate::config::ToolchainSettings;

const MMDC_RELATIVE: &str = "node_modules/.bin/mmdc";
const SVGO_RELATIVE: &str = "node_modules/.bin/svgo";
const DIAGRAM_CONFIG_FILE: &str = "mermaid.config.json";

/// Location of the installed rendering toolchain.
///
/// Resolved once from settings at startup and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    package_dir: PathBuf,
    mmdc: PathBuf,
    svgo: PathBuf,
    inkscape: PathBuf,
    npm: PathBuf,
    npx: PathBuf,
}

impl Toolchain {
    /// Toolchain rooted at `package_dir` using the conventional node layout.
    pub fn in_package(package_dir: impl Into<PathBuf>) -> Self {
        let package_dir = package_dir.into();
        Self {
            mmdc: package_dir.join(MMDC_RELATIVE),
            svgo: package_dir.join(SVGO_RELATIVE),
            inkscape: PathBuf::from("inkscape"),
            npm: PathBuf::from("npm"),
            npx: PathBuf::from("npx"),
            package_dir,
        }
    }

    pub fn from_settings(settings: &ToolchainSettings) -> Self {
        let mut toolchain = Self::in_package(settings.package_dir.clone());
        if let Some(mmdc) = settings.mmdc_path.as_ref() {
            toolchain.mmdc = mmdc.clone();
        }
        toolchain.inkscape = settings.inkscape_path.clone();
        toolchain.npm = settings.npm_path.clone();
        toolchain.npx = settings.npx_path.clone();
        toolchain
    }

    pub fn with_inkscape(mut self, inkscape: impl Into<PathBuf>) -> Self {
        self.inkscape = inkscape.into();
        self
    }

    pub fn with_npm(mut self, npm: impl Into<PathBuf>, npx: impl Into<PathBuf>) -> Self {
        self.npm = npm.into();
        self.npx = npx.into();
        self
    }

    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    pub fn mmdc(&self) -> &Path {
        &self.mmdc
    }

    pub fn svgo(&self) -> &Path {
        &self.svgo
    }

    pub fn inkscape(&self) -> &Path {
        &self.inkscape
    }

    pub fn npm(&self) -> &Path {
        &self.npm
    }

    pub fn npx(&self) -> &Path {
        &self.npx
    }

    /// Diagram-level mermaid config shipped with the package.
    pub fn diagram_config_path(&self) -> PathBuf {
        self.package_dir.join(DIAGRAM_CONFIG_FILE)
    }

    /// Contents of the diagram config, `None` when the package ships none.
    pub fn read_diagram_config(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.diagram_config_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn derives_paths_from_package_dir() {
        let toolchain = Toolchain::in_package("/opt/mermaid");
        assert_eq!(
            toolchain.mmdc(),
            Path::new("/opt/mermaid/node_modules/.bin/mmdc")
        );
        assert_eq!(
            toolchain.svgo(),
            Path::new("/opt/mermaid/node_modules/.bin/svgo")
        );
        assert_eq!(
            toolchain.diagram_config_path(),
            Path::new("/opt/mermaid/mermaid.config.json")
        );
    }

    #[test]
    fn settings_override_individual_binaries() {
        let settings = ToolchainSettings {
            package_dir: PathBuf::from("/opt/mermaid"),
            mmdc_path: Some(PathBuf::from("/usr/local/bin/mmdc")),
            inkscape_path: PathBuf::from("/usr/bin/inkscape"),
            npm_path: PathBuf::from("npm"),
            npx_path: PathBuf::from("npx"),
        };
        let toolchain = Toolchain::from_settings(&settings);
        assert_eq!(toolchain.mmdc(), Path::new("/usr/local/bin/mmdc"));
        assert_eq!(toolchain.inkscape(), Path::new("/usr/bin/inkscape"));
        assert_eq!(toolchain.package_dir(), Path::new("/opt/mermaid"));
    }

    #[test]
    fn missing_diagram_config_reads_as_none() {
        let dir = TempDir::new().expect("temp dir");
        let toolchain = Toolchain::in_package(dir.path());
        assert_eq!(toolchain.read_diagram_config().expect("read"), None);

        fs::write(dir.path().join(DIAGRAM_CONFIG_FILE), br#"{"theme":"forest"}"#)
            .expect("write config");
        assert_eq!(
            toolchain.read_diagram_config().expect("read"),
            Some(br#"{"theme":"forest"}"#.to_vec())
        );
    }
}
