//! Path resolution across access protocols
//!
//! Partial paths in a boot environment are relative to its install tree,
//! `<root>/<os>/install` (or `<root>/discovery`). The same partial path is
//! reachable three ways:
//!
//! - `disk`: absolute path on the provisioner's filesystem
//! - `tftp`: path relative to the TFTP root
//! - `network`: URL under the provisioner URL

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use provisioner_crd::BootEnv;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Access protocol for a partial path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Disk,
    Tftp,
    Network,
}

impl FromStr for Protocol {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disk" => Ok(Protocol::Disk),
            "tftp" => Ok(Protocol::Tftp),
            // Templates written for the HTTP file server use "http"
            "network" | "http" => Ok(Protocol::Network),
            other => Err(RenderError::UnknownProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Disk => write!(f, "disk"),
            Protocol::Tftp => write!(f, "tftp"),
            Protocol::Network => write!(f, "network"),
        }
    }
}

/// Resolves partial paths for one boot environment
#[derive(Debug, Clone, PartialEq)]
pub struct PathResolver {
    file_root: PathBuf,
    provisioner_url: String,
    os_name: String,
    segment: String,
}

impl PathResolver {
    /// Create a resolver for a boot environment
    pub fn new(config: &RenderConfig, bootenv: &BootEnv) -> Self {
        Self {
            file_root: config.file_root.clone(),
            provisioner_url: config.provisioner_url.trim_end_matches('/').to_string(),
            os_name: bootenv.os.name.clone(),
            segment: bootenv.install_segment(),
        }
    }

    /// Expand a partial path for a protocol
    pub fn path_for(&self, proto: Protocol, partial: &str) -> String {
        let relative = self.relative(partial);
        match proto {
            Protocol::Disk => self.file_root.join(&relative).to_string_lossy().into_owned(),
            Protocol::Tftp => relative,
            Protocol::Network => format!("{}/{}", self.provisioner_url, relative),
        }
    }

    /// Absolute on-disk path of a partial path
    pub fn disk_path(&self, partial: &str) -> PathBuf {
        self.file_root.join(self.relative(partial))
    }

    /// Install tree directory on disk
    pub fn install_dir(&self) -> PathBuf {
        self.file_root.join(&self.segment)
    }

    /// Expand several partial paths and join them with spaces
    pub fn join_paths(&self, proto: Protocol, partials: &[String]) -> String {
        partials
            .iter()
            .map(|p| self.path_for(proto, p))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// URL of the install tree, always under `<os>/install`
    pub fn install_url(&self) -> String {
        format!("{}/{}/install", self.provisioner_url, self.os_name)
    }

    pub fn file_root(&self) -> &Path {
        &self.file_root
    }

    fn relative(&self, partial: &str) -> String {
        let partial = partial.trim_start_matches('/');
        if partial.is_empty() {
            self.segment.clone()
        } else {
            format!("{}/{}", self.segment, partial)
        }
    }
}
