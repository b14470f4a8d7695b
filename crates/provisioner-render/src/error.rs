//! Error types for template compilation and rendering

use crate::context::HelperError;
use provisioner_crd::CrdError;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for rendering operations
#[derive(Debug, Error)]
pub enum RenderError {
    /// A path expression, content template or boot parameter template failed to parse
    #[error("error compiling template {template}: {source}\n---template---\n{text}")]
    TemplateCompile {
        template: String,
        text: String,
        #[source]
        source: minijinja::Error,
    },

    /// The boot environment definition is structurally invalid
    #[error(transparent)]
    Definition(#[from] CrdError),

    /// The template store has no template with this identifier
    #[error("template {uuid} for {template} not found")]
    TemplateNotFound { template: String, uuid: String },

    /// The template store failed
    #[error("template store error: {0}")]
    TemplateSource(String),

    /// Evaluation failed, typically an undefined variable under strict binding
    #[error("error rendering template {template}: {source}")]
    TemplateEvaluation {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    /// The machine lacks parameters the boot environment requires
    #[error("{bootenv}: machine {machine} is missing required params: {}", .missing.join(", "))]
    MissingRequiredParams {
        bootenv: String,
        machine: String,
        missing: Vec<String>,
    },

    /// `parseUrl` was asked for a segment other than scheme, host or path
    #[error("no idea how to get URL part {segment} from {url}")]
    UnsupportedSegment { segment: String, url: String },

    /// `parseUrl` was given something that is not an absolute URL
    #[error("cannot parse URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// `param` referenced a key the machine does not have
    #[error("no such machine parameter {0}")]
    MissingParameter(String),

    /// A protocol tag other than disk, tftp or network
    ///
    /// Only reachable through a template helper; this is a caller logic
    /// error rather than bad data.
    #[error("unknown protocol {0}")]
    UnknownProtocol(String),

    /// A rendered destination path escapes the install tree
    #[error("template {template} rendered invalid path {path:?}")]
    InvalidPath { template: String, path: String },

    /// Filesystem error while writing an artifact
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// Build an evaluation error, surfacing typed helper failures
    pub(crate) fn evaluation(template: &str, err: minijinja::Error) -> Self {
        match HelperError::find(&err) {
            Some(helper) => helper.into(),
            None => RenderError::TemplateEvaluation {
                template: template.to_string(),
                source: err,
            },
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenderError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<HelperError> for RenderError {
    fn from(err: HelperError) -> Self {
        match err {
            HelperError::UnsupportedSegment { segment, url } => {
                RenderError::UnsupportedSegment { segment, url }
            }
            HelperError::InvalidUrl { url, reason } => RenderError::InvalidUrl { url, reason },
            HelperError::MissingParameter(key) => RenderError::MissingParameter(key),
            HelperError::UnknownProtocol(tag) => RenderError::UnknownProtocol(tag),
        }
    }
}

/// Result type for rendering operations
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::MissingRequiredParams {
            bootenv: "ubuntu-16.04-install".to_string(),
            machine: "node1".to_string(),
            missing: vec!["dns-domain".to_string(), "ntp".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "ubuntu-16.04-install: machine node1 is missing required params: dns-domain, ntp"
        );

        let err = RenderError::MissingParameter("dns-domain".to_string());
        assert_eq!(err.to_string(), "no such machine parameter dns-domain");
    }

    #[test]
    fn test_helper_error_conversion() {
        let err: RenderError = HelperError::UnsupportedSegment {
            segment: "port".to_string(),
            url: "http://x".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            RenderError::UnsupportedSegment { segment, .. } if segment == "port"
        ));

        let err: RenderError = HelperError::UnknownProtocol("ftp".to_string()).into();
        assert!(matches!(err, RenderError::UnknownProtocol(tag) if tag == "ftp"));
    }
}
