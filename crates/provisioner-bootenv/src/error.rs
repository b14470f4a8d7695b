//! Error types for the boot environment lifecycle

use provisioner_crd::CrdError;
use provisioner_render::RenderError;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for lifecycle operations
#[derive(Debug, Error)]
pub enum BootEnvError {
    /// Structural validation failed
    #[error(transparent)]
    Crd(#[from] CrdError),

    /// Compilation or rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The ISO image does not hash to the configured checksum
    #[error(
        "iso checksum bad, re-download image {}: actual {actual}, expected {expected}",
        .path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The external extraction procedure failed
    #[error("extracting media for {os} failed: {reason}")]
    MediaExtraction { os: String, reason: String },

    /// Transport failure while downloading an auxiliary file
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    /// An auxiliary file is still missing after downloading it
    #[error("file {name} doesn't exist after download: {}", .path.display())]
    FileFetchFailed { name: String, path: PathBuf },

    #[error("{bootenv}: missing or invalid kernel {kernel} ({})", .path.display())]
    MissingKernel {
        bootenv: String,
        kernel: String,
        path: PathBuf,
    },

    #[error("{bootenv}: missing or invalid initrd {initrd} ({})", .path.display())]
    MissingInitrd {
        bootenv: String,
        initrd: String,
        path: PathBuf,
    },

    /// An update tried to rename a boot environment
    #[error("cannot change name of bootenv {from} to {to}")]
    ImmutableIdentity { from: String, to: String },

    /// A machine still references the boot environment
    #[error("bootenv {bootenv} in use by machine {machine}")]
    EnvironmentInUse { bootenv: String, machine: String },

    /// Record store error
    #[error("store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BootEnvError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BootEnvError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, BootEnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BootEnvError::EnvironmentInUse {
            bootenv: "centos-7-install".to_string(),
            machine: "node1".to_string(),
        };
        assert_eq!(err.to_string(), "bootenv centos-7-install in use by machine node1");

        let err = BootEnvError::MissingKernel {
            bootenv: "centos-7-install".to_string(),
            kernel: "images/pxeboot/vmlinuz".to_string(),
            path: PathBuf::from("/tftpboot/centos-7/install/images/pxeboot/vmlinuz"),
        };
        assert_eq!(
            err.to_string(),
            "centos-7-install: missing or invalid kernel images/pxeboot/vmlinuz \
             (/tftpboot/centos-7/install/images/pxeboot/vmlinuz)"
        );
    }

    #[test]
    fn test_wraps_lower_errors() {
        let err: BootEnvError = CrdError::IncompleteBootSupport("local".to_string()).into();
        assert!(matches!(err, BootEnvError::Crd(CrdError::IncompleteBootSupport(_))));

        let err: BootEnvError = RenderError::MissingParameter("ntp".to_string()).into();
        assert_eq!(err.to_string(), "no such machine parameter ntp");
    }
}
