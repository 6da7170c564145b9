//! Published-version lookups against a crates.io compatible registry.

use crate::remote::RemoteError;
use async_trait::async_trait;
use reqwest::Client;
use semver::Version;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait VersionRegistry: Send + Sync {
    /// Every non-yanked version string published for `name`.
    async fn versions(&self, name: &str) -> Result<Vec<String>, RemoteError>;

    /// Highest stable release of `name`.
    async fn latest_version(&self, name: &str) -> Result<Version, RemoteError> {
        let versions = self.versions(name).await?;
        latest_stable(&versions)
            .ok_or_else(|| RemoteError::NotFound(format!("no published releases of {name}")))
    }
}

/// Picks the highest parseable version that is not a pre-release.
pub fn latest_stable(versions: &[String]) -> Option<Version> {
    versions
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| v.pre.is_empty())
        .max()
}

pub struct CratesIoRegistry {
    client: Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct CrateResponse {
    versions: Vec<CrateVersion>,
}

#[derive(Deserialize)]
struct CrateVersion {
    num: String,
    #[serde(default)]
    yanked: bool,
}

impl CratesIoRegistry {
    pub fn new(endpoint: Url) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("edgepack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl VersionRegistry for CratesIoRegistry {
    async fn versions(&self, name: &str) -> Result<Vec<String>, RemoteError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::Other(format!("invalid registry endpoint: {}", self.endpoint))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "crates", name]);
        debug!("Fetching published versions of {} from {}", name, url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(format!("crate {name} is not published")));
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: format!("registry lookup for {name} failed"),
            });
        }

        let body: CrateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(body
            .versions
            .into_iter()
            .filter(|v| !v.yanked)
            .map(|v| v.num)
            .collect())
    }
}
