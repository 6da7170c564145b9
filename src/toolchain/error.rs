use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainErrorKind {
    MissingBinary,
    MissingToolchain,
    MissingTarget,
    VersionMismatch,
    InvalidConstraint,
    MissingProjectFile,
    CrateNotFound,
    CrateOutdated,
    Metadata,
    BuildFailed,
    RuntimeFailed,
}

/// A local environment problem, paired with the command or URL that fixes it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ToolchainError {
    pub kind: ToolchainErrorKind,
    pub message: String,
    pub remediation: String,
}

impl ToolchainError {
    pub fn new(
        kind: ToolchainErrorKind,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            remediation: remediation.into(),
        }
    }
}
