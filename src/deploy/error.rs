use crate::deploy::provision::ProvisionStep;
use crate::manifest::ManifestError;
use crate::package::PackageError;
use crate::remote::RemoteError;
use crate::template::TemplateError;
use crate::toolchain::ToolchainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{context}: {source}")]
    Collaborator {
        context: String,
        #[source]
        source: RemoteError,
    },

    #[error("{}", partial_failure_message(.source, .unwind_errors))]
    PartialFailure {
        step: ProvisionStep,
        source: Box<DeployError>,
        unwind_errors: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    pub fn collaborator(context: impl Into<String>, source: RemoteError) -> Self {
        DeployError::Collaborator {
            context: context.into(),
            source,
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DeployError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Remediation hint for errors that carry one.
    pub fn remediation(&self) -> Option<&str> {
        match self {
            DeployError::Toolchain(e) => Some(e.remediation.as_str()),
            DeployError::PartialFailure { source, .. } => source.remediation(),
            _ => None,
        }
    }
}

fn partial_failure_message(source: &DeployError, unwind_errors: &[String]) -> String {
    if unwind_errors.is_empty() {
        format!("{source} (all created resources were removed)")
    } else {
        format!(
            "{source} (rollback incomplete: {})",
            unwind_errors.join("; ")
        )
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
