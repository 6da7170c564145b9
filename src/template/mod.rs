//! Starter templates for `init`: fetched into a staging directory, then copied
//! into the project without overwriting anything already there.

pub mod git;

pub use git::GitTemplateFetcher;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Invalid template reference `{reference}`: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Failed to fetch template {reference}: {message}")]
    FetchFailed { reference: String, message: String },

    #[error("Failed to copy template file {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Task join error: {0}")]
    Task(String),
}

/// Fetches the file tree named by `reference` into `staging`.
#[async_trait]
pub trait TemplateFetcher: Send + Sync {
    async fn fetch(&self, reference: &str, staging: &Path) -> Result<(), TemplateError>;
}

/// Copies every file below `staging` into `project_dir`, skipping `.git` and any
/// file that already exists in the project. Returns the relative paths written.
pub fn copy_tree(staging: &Path, project_dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let mut written = Vec::new();
    let walker = WalkDir::new(staging)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| TemplateError::Copy {
            path: e.path().map(Path::to_path_buf).unwrap_or_default(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(staging) else {
            continue;
        };
        let dest = project_dir.join(relative);
        if dest.exists() {
            debug!("Keeping existing {}", dest.display());
            continue;
        }

        let copy_err = |source| TemplateError::Copy {
            path: dest.clone(),
            source,
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(copy_err)?;
        }
        std::fs::copy(entry.path(), &dest).map_err(copy_err)?;
        written.push(relative.to_path_buf());
    }

    debug!("Copied {} template files", written.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree_skips_git_and_existing_files() {
        let staging = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::create_dir_all(staging.path().join(".git")).unwrap();
        std::fs::write(staging.path().join(".git/HEAD"), "ref").unwrap();
        std::fs::create_dir_all(staging.path().join("src")).unwrap();
        std::fs::write(staging.path().join("src/main.rs"), "template").unwrap();
        std::fs::write(staging.path().join("edge.toml"), "name = \"t\"").unwrap();
        std::fs::write(project.path().join("edge.toml"), "name = \"mine\"").unwrap();

        let written = copy_tree(staging.path(), project.path()).unwrap();

        assert_eq!(written, vec![PathBuf::from("src/main.rs")]);
        assert!(!project.path().join(".git").exists());
        assert_eq!(
            std::fs::read_to_string(project.path().join("edge.toml")).unwrap(),
            "name = \"mine\""
        );
    }
}
