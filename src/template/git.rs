use super::{TemplateError, TemplateFetcher};
use async_trait::async_trait;
use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks};
use std::path::Path;
use tokio::task;
use tracing::{debug, info};

/// Clones a template repository. A `#name` suffix on the reference selects a branch.
#[derive(Debug, Clone, Default)]
pub struct GitTemplateFetcher;

impl GitTemplateFetcher {
    pub fn new() -> Self {
        Self
    }

    fn clone_sync(reference: &str, staging: &Path) -> Result<(), TemplateError> {
        let (url, branch) = split_reference(reference)?;

        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|stats| {
            debug!(
                "Transfer progress: {}/{} objects, {} bytes",
                stats.received_objects(),
                stats.total_objects(),
                stats.received_bytes()
            );
            true
        });
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);
        if let Some(branch) = branch {
            builder.branch(branch);
        }

        builder
            .clone(url, staging)
            .map_err(|e| TemplateError::FetchFailed {
                reference: reference.to_string(),
                message: e.message().to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl TemplateFetcher for GitTemplateFetcher {
    async fn fetch(&self, reference: &str, staging: &Path) -> Result<(), TemplateError> {
        info!("Fetching template {}", reference);
        let reference = reference.to_string();
        let staging = staging.to_path_buf();
        task::spawn_blocking(move || Self::clone_sync(&reference, &staging))
            .await
            .map_err(|e| TemplateError::Task(e.to_string()))?
    }
}

fn split_reference(reference: &str) -> Result<(&str, Option<&str>), TemplateError> {
    let (url, branch) = match reference.split_once('#') {
        Some((url, branch)) => (url, Some(branch)),
        None => (reference, None),
    };
    let invalid = |reason: &str| TemplateError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    };
    if url.trim().is_empty() {
        return Err(invalid("repository URL is empty"));
    }
    if branch.is_some_and(|b| b.trim().is_empty()) {
        return Err(invalid("branch name after `#` is empty"));
    }
    Ok((url, branch))
}
