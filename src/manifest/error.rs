use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("No manifest found at {path}; run `edgepack init` to create one")]
    NotFound { path: PathBuf },

    #[error("Manifest {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Manifest is missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("Unsupported language `{0}` (expected one of: rust, javascript, other)")]
    UnknownLanguage(String),

    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] toml::ser::Error),
}
