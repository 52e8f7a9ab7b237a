//! Error types for conversion and mirroring

use hgss_model::ValidationError;
use thiserror::Error;

/// Failure reported by a converter in either direction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("expected a {expected} view")]
    UnexpectedView { expected: &'static str },

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        ConvertError::Json(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MirrorError {
    #[error("no converter registered for format {0:?}")]
    UnknownFormat(String),

    #[error("{format}: {source}")]
    Conversion {
        format: String,
        #[source]
        source: ConvertError,
    },

    #[error("{format}: converter panicked: {message}")]
    Panicked { format: String, message: String },

    #[error("{format}: invalid document: {source}")]
    Invalid {
        format: String,
        #[source]
        source: ValidationError,
    },
}

impl MirrorError {
    /// Format the failure belongs to
    pub fn format(&self) -> &str {
        match self {
            MirrorError::UnknownFormat(format)
            | MirrorError::Conversion { format, .. }
            | MirrorError::Panicked { format, .. }
            | MirrorError::Invalid { format, .. } => format,
        }
    }
}
