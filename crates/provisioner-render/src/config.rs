//! Render configuration
//!
//! Install root and base URLs are passed explicitly to the compiler and the
//! path resolver; nothing here is process-global.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default install root
pub const DEFAULT_FILE_ROOT: &str = "/tftpboot";

/// Configuration shared by every render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Install root directory that rendered artifacts and install trees live under
    pub file_root: PathBuf,

    /// Base URL machines fetch install files from (e.g., http://10.0.0.1:8091)
    pub provisioner_url: String,

    /// URL of the command and control API machines talk to
    pub command_url: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            file_root: PathBuf::from(DEFAULT_FILE_ROOT),
            provisioner_url: String::new(),
            command_url: String::new(),
        }
    }
}

impl RenderConfig {
    /// Create a config with install root and provisioner URL
    pub fn new(file_root: impl Into<PathBuf>, provisioner_url: impl Into<String>) -> Self {
        Self {
            file_root: file_root.into(),
            provisioner_url: provisioner_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Set the command and control URL
    pub fn with_command_url(mut self, url: impl Into<String>) -> Self {
        self.command_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = RenderConfig::new("/srv/tftp", "http://10.0.0.1:8091/")
            .with_command_url("https://10.0.0.1:3000");

        assert_eq!(config.file_root, PathBuf::from("/srv/tftp"));
        assert_eq!(config.provisioner_url, "http://10.0.0.1:8091");
        assert_eq!(config.command_url, "https://10.0.0.1:3000");
    }

    #[test]
    fn test_config_defaults() {
        let config: RenderConfig =
            serde_json::from_str(r#"{"provisioner_url": "http://p"}"#).unwrap();
        assert_eq!(config.file_root, PathBuf::from(DEFAULT_FILE_ROOT));
        assert!(config.command_url.is_empty());
    }
}
