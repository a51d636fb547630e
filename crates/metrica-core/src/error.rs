//! Error types for metrica-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in metrica-core
#[derive(Debug, Error)]
pub enum Error {
    /// Field name is not an identifier
    #[error("Invalid field name: '{0}'")]
    InvalidFieldName(String),

    /// Field declared twice in a schema
    #[error("Field already declared: '{0}'")]
    DuplicateField(String),
}
