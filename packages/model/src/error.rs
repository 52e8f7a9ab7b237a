use thiserror::Error;

/// Reasons a document header is rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid type {0:?}, must be HGSS")]
    InvalidType(String),

    #[error("missing version")]
    MissingVersion,
}
