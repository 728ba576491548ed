//! Error types for compose loading and merging.

use thiserror::Error;

/// Errors that can occur while turning compose documents into a stack config.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Malformed YAML in a compose document
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Template expansion failed
    #[error("Template error: {0}")]
    Template(String),

    /// A `$VAR`/`${VAR}` token could not be parsed
    #[error("Invalid interpolation format for key \"{key}\": \"{value}\"")]
    Interpolation { key: String, value: String },

    /// `extends` could not be resolved
    #[error("{0}")]
    Extends(String),

    /// A referenced file could not be loaded
    #[error("{0}")]
    Lookup(String),

    /// A field had a shape the typed model does not accept
    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },

    /// Generic I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ComposeError>;
