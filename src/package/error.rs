use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Package not found at {path}; run `edgepack pack` first")]
    NotFound { path: PathBuf },

    #[error("Package is missing required file(s): {}", .files.join(", "))]
    MissingEntries { files: Vec<String> },

    #[error("Package entry escapes the package root: {path}")]
    UnsafeEntry { path: String },

    #[error("Package input not found: {path}")]
    MissingInput { path: PathBuf },

    #[error("Package {path} could not be read: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    Task(String),
}
