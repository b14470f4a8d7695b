//! Error types for record validation

use thiserror::Error;

/// Errors that can occur when validating provisioner records
#[derive(Debug, Error)]
pub enum CrdError {
    /// A template entry is missing its name, path expression or content reference
    #[error("illegal template at index {index}: name={name:?} path={path:?} uuid={uuid:?}")]
    IllegalTemplate {
        index: usize,
        name: String,
        path: String,
        uuid: String,
    },

    /// The template set cannot boot both BIOS and UEFI machines
    #[error("boot environment '{0}' needs an ipxe template or both pxelinux and elilo templates")]
    IncompleteBootSupport(String),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for record operations
pub type Result<T> = std::result::Result<T, CrdError>;
