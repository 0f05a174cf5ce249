//! Error types for platmap

use std::path::PathBuf;
use thiserror::Error;

/// platmap error type
///
/// Only conditions that abort a run end up here. Per-file and
/// per-invocation problems are recorded in [`crate::Diagnostics`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid compiler specification for '{compiler}': {message}")]
    CompilerSpec { compiler: String, message: String },

    #[error("Compilation database error in {path}: {message}")]
    Database { path: PathBuf, message: String },

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("No analyzable files remain")]
    NoAnalyzableFiles,
}

impl Error {
    /// Shorthand for a compiler specification error
    pub fn compiler_spec(compiler: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CompilerSpec {
            compiler: compiler.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for platmap
pub type Result<T> = std::result::Result<T, Error>;
