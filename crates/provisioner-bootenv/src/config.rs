//! Provisioner configuration
//!
//! Loaded from TOML by the binary. Every field has a default, so a config
//! file only needs to name what differs.

use crate::error::{BootEnvError, Result};
use provisioner_render::RenderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default install root
pub const DEFAULT_FILE_ROOT: &str = "/var/lib/provisioner/files";

/// Default external media extraction procedure
pub const DEFAULT_EXPLODE_SCRIPT: &str = "/explode_iso.sh";

/// Provisioner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Install root that ISOs, install trees and rendered artifacts live under
    pub file_root: PathBuf,

    /// Base URL machines fetch install files from
    pub provisioner_url: String,

    /// URL of the command and control API
    pub command_url: String,

    /// Script invoked as `<script> <os> <iso> <target dir>` to extract media
    pub explode_script: PathBuf,

    /// Directory of machine records (`*.json`)
    pub machines_dir: PathBuf,

    /// Directory of content templates, one file per template identifier
    pub templates_dir: PathBuf,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            file_root: PathBuf::from(DEFAULT_FILE_ROOT),
            provisioner_url: "http://127.0.0.1:8091".to_string(),
            command_url: String::new(),
            explode_script: PathBuf::from(DEFAULT_EXPLODE_SCRIPT),
            machines_dir: PathBuf::from("/var/lib/provisioner/machines"),
            templates_dir: PathBuf::from("/var/lib/provisioner/templates"),
        }
    }
}

impl ProvisionerConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BootEnvError::Config(e.to_string()))
    }

    /// Load a TOML config file
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BootEnvError::io(path, e))?;
        Self::from_toml(&text)
    }

    pub fn with_file_root(mut self, file_root: impl Into<PathBuf>) -> Self {
        self.file_root = file_root.into();
        self
    }

    pub fn with_provisioner_url(mut self, url: impl Into<String>) -> Self {
        self.provisioner_url = url.into();
        self
    }

    pub fn with_command_url(mut self, url: impl Into<String>) -> Self {
        self.command_url = url.into();
        self
    }

    pub fn with_explode_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.explode_script = script.into();
        self
    }

    pub fn with_machines_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.machines_dir = dir.into();
        self
    }

    pub fn with_templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = dir.into();
        self
    }

    /// Directory ISO images are staged in
    pub fn iso_dir(&self) -> PathBuf {
        self.file_root.join("isos")
    }

    /// The subset threaded into template compilation and path resolution
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig::new(self.file_root.clone(), self.provisioner_url.clone())
            .with_command_url(self.command_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.explode_script, PathBuf::from("/explode_iso.sh"));
        assert_eq!(config.iso_dir(), PathBuf::from("/var/lib/provisioner/files/isos"));
    }

    #[test]
    fn test_partial_toml() {
        let config = ProvisionerConfig::from_toml(
            r#"
            file_root = "/srv/tftp"
            provisioner_url = "http://10.0.0.1:8091/"
            "#,
        )
        .unwrap();

        assert_eq!(config.file_root, PathBuf::from("/srv/tftp"));
        assert_eq!(config.explode_script, PathBuf::from(DEFAULT_EXPLODE_SCRIPT));

        let render = config.render_config();
        assert_eq!(render.file_root, PathBuf::from("/srv/tftp"));
        assert_eq!(render.provisioner_url, "http://10.0.0.1:8091");
    }

    #[test]
    fn test_invalid_toml() {
        let err = ProvisionerConfig::from_toml("file_root = [").unwrap_err();
        assert!(matches!(err, BootEnvError::Config(_)));
    }
}
