//! Error types for scaffolding
//!
//! This module contains the error type shared by the declaration store, the
//! merge engine, every synthesizer and the driver.

use std::path::{Path, PathBuf};

/// Error type for scaffolding
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// Generated tokens did not parse back as Rust
    #[error("code generation error: {0}")]
    CodeGenError(String),

    /// Source text is not valid Rust
    #[error("parse error: {0}")]
    Parse(String),

    /// Reading, creating or replacing a file failed
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File or directory the operation targeted
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A merge target was absent even after skeleton fallback
    #[error("missing declaration context: {0}")]
    MissingContext(String),

    /// The entity description violates an invariant
    #[error("invalid entity '{entity}': {message}")]
    InvalidEntity {
        /// Entity name as declared
        entity: String,
        /// What is wrong with it
        message: String,
    },

    /// Project configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// Template rendering failed
    #[error("template error: {0}")]
    Template(String),
}

impl GeneratorError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        GeneratorError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build an [`GeneratorError::InvalidEntity`]
    pub fn invalid_entity(entity: impl Into<String>, message: impl Into<String>) -> Self {
        GeneratorError::InvalidEntity {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

impl From<minijinja::Error> for GeneratorError {
    fn from(e: minijinja::Error) -> Self {
        GeneratorError::Template(e.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = GeneratorError> = std::result::Result<T, E>;
