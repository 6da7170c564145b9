use crate::deploy::{DeployError, Result, VersionResolver};
use crate::manifest::{Manifest, ManifestStore};
use crate::package::file_digest;
use crate::remote::{ControlPlane, ServiceVersion};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Uploaded and activated; `domain` is the service's primary domain when it could be looked up.
    Deployed { version: u32, domain: Option<String> },
    /// The version already carries a package with this digest.
    Skipped { version: u32 },
}

impl DeployOutcome {
    pub fn version(&self) -> u32 {
        match self {
            DeployOutcome::Deployed { version, .. } | DeployOutcome::Skipped { version } => {
                *version
            }
        }
    }
}

/// Uploads a package to a resolved version and activates it.
pub struct DeployExecutor<'a> {
    api: &'a dyn ControlPlane,
    store: &'a ManifestStore,
}

impl<'a> DeployExecutor<'a> {
    pub fn new(api: &'a dyn ControlPlane, store: &'a ManifestStore) -> Self {
        Self { api, store }
    }

    /// Deploys on top of `base`. An unchanged package is skipped before anything
    /// is cloned, so the skip reports `base` itself.
    pub async fn deploy(
        &self,
        manifest: &mut Manifest,
        service_id: &str,
        archive: &Path,
        base: &ServiceVersion,
    ) -> Result<DeployOutcome> {
        if self.is_current(service_id, archive, base.number).await? {
            info!(
                "Package for service {} version {} is unchanged, skipping upload",
                service_id, base.number
            );
            self.record(manifest, service_id, base.number, false)?;
            return Ok(DeployOutcome::Skipped {
                version: base.number,
            });
        }

        let target = VersionResolver::new(self.api, service_id)
            .editable(base)
            .await?;
        self.upload(service_id, archive, target.number).await?;

        self.api
            .activate_version(service_id, target.number)
            .await
            .map_err(|e| DeployError::collaborator("error activating version", e))?;
        info!("Activated service {} version {}", service_id, target.number);

        self.record(manifest, service_id, target.number, true)?;

        let domain = match self.api.list_domains(service_id, target.number).await {
            Ok(domains) => domains.into_iter().next().map(|d| d.name),
            Err(e) => {
                warn!("Could not look up domains for service {}: {}", service_id, e);
                None
            }
        };

        Ok(DeployOutcome::Deployed {
            version: target.number,
            domain,
        })
    }

    /// Uploads without activating. The manifest is left untouched.
    pub async fn update(
        &self,
        service_id: &str,
        archive: &Path,
        base: &ServiceVersion,
    ) -> Result<DeployOutcome> {
        if self.is_current(service_id, archive, base.number).await? {
            return Ok(DeployOutcome::Skipped {
                version: base.number,
            });
        }

        let target = VersionResolver::new(self.api, service_id)
            .editable(base)
            .await?;
        self.upload(service_id, archive, target.number).await?;
        Ok(DeployOutcome::Deployed {
            version: target.number,
            domain: None,
        })
    }

    /// Binds an unbound manifest to `service_id`. A bound manifest only tracks
    /// activations of its own service.
    fn record(
        &self,
        manifest: &mut Manifest,
        service_id: &str,
        version: u32,
        activated: bool,
    ) -> Result<()> {
        if manifest.has_service() {
            if manifest.service_id != service_id {
                debug!(
                    "Not recording version {} of service {} in a manifest bound to {}",
                    version, service_id, manifest.service_id
                );
                return Ok(());
            }
            if !activated {
                return Ok(());
            }
        }

        manifest.service_id = service_id.to_string();
        manifest.version = version;
        self.store.save(manifest)?;
        Ok(())
    }

    async fn is_current(&self, service_id: &str, archive: &Path, version: u32) -> Result<bool> {
        let digest = file_digest(archive)?;
        debug!("Package digest: {}", digest);

        let remote = self
            .api
            .get_package(service_id, version)
            .await
            .map_err(|e| DeployError::collaborator("error retrieving package", e))?;

        Ok(remote
            .and_then(|metadata| metadata.hashsum)
            .is_some_and(|hashsum| hashsum.eq_ignore_ascii_case(&digest)))
    }

    async fn upload(&self, service_id: &str, archive: &Path, version: u32) -> Result<()> {
        info!(
            "Uploading {} to service {} version {}",
            archive.display(),
            service_id,
            version
        );
        self.api
            .update_package(service_id, version, archive)
            .await
            .map_err(|e| DeployError::collaborator("error uploading package", e))?;
        Ok(())
    }
}
