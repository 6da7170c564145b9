//! First-time provisioning of service, domain and backend with compensating rollback.

use crate::deploy::{DeployError, Result};
use crate::manifest::{Manifest, ManifestStore};
use crate::remote::{ControlPlane, NewBackend};
use std::fmt;
use std::io::Write;
use tracing::{debug, info, warn};

/// Default suffix for generated service domains.
pub const DEFAULT_DOMAIN_SUFFIX: &str = "edgecompute.app";
pub const DEFAULT_BACKEND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_BACKEND_PORT: u16 = 80;

/// Used when a service name has no characters valid in a hostname label.
const FALLBACK_DOMAIN_LABEL: &str = "edge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    CreateService,
    CreateDomain,
    CreateBackend,
    PersistManifest,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionStep::CreateService => "creating service",
            ProvisionStep::CreateDomain => "creating domain",
            ProvisionStep::CreateBackend => "creating backend",
            ProvisionStep::PersistManifest => "saving manifest",
        };
        f.write_str(s)
    }
}

/// Reversal of one completed step. Each variant owns every identifier it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    DeleteService {
        service_id: String,
    },
    DeleteDomain {
        service_id: String,
        version: u32,
        name: String,
    },
    DeleteBackend {
        service_id: String,
        version: u32,
        name: String,
    },
}

impl Compensation {
    pub async fn run(&self, api: &dyn ControlPlane) -> std::result::Result<(), String> {
        let result = match self {
            Compensation::DeleteService { service_id } => api.delete_service(service_id).await,
            Compensation::DeleteDomain {
                service_id,
                version,
                name,
            } => api.delete_domain(service_id, *version, name).await,
            Compensation::DeleteBackend {
                service_id,
                version,
                name,
            } => api.delete_backend(service_id, *version, name).await,
        };
        result.map_err(|e| format!("{self}: {e}"))
    }
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::DeleteService { service_id } => {
                write!(f, "error deleting service {service_id}")
            }
            Compensation::DeleteDomain { name, .. } => write!(f, "error deleting domain {name}"),
            Compensation::DeleteBackend { name, .. } => {
                write!(f, "error deleting backend {name}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub step: ProvisionStep,
    pub undo: Compensation,
}

/// Completed steps of one provisioning run, in creation order.
#[derive(Debug, Default)]
pub struct ProvisioningPlan {
    entries: Vec<PlanEntry>,
}

impl ProvisioningPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: ProvisionStep, undo: Compensation) {
        debug!("Recorded compensation for {}: {:?}", step, undo);
        self.entries.push(PlanEntry { step, undo });
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every compensation newest first. A failing compensation does not stop
    /// the ones after it; all failures are returned.
    pub async fn unwind(self, api: &dyn ControlPlane) -> Vec<String> {
        let mut errors = Vec::new();
        for entry in self.entries.into_iter().rev() {
            info!("Rolling back {}", entry.step);
            if let Err(e) = entry.undo.run(api).await {
                warn!("Rollback step failed: {}", e);
                errors.push(e);
            }
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub service_name: String,
    pub description: String,
    pub domain: String,
    pub backend: NewBackend,
}

impl ProvisionRequest {
    /// Request with a generated domain and the loopback backend.
    pub fn with_defaults(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            domain: default_domain(&service_name),
            description: String::new(),
            backend: default_backend(),
            service_name,
        }
    }
}

/// `<name>-<8 hex chars>.edgecompute.app`
pub fn default_domain(service_name: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let label: String = service_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let label = match label.trim_matches('-') {
        "" => FALLBACK_DOMAIN_LABEL,
        trimmed => trimmed,
    };
    format!("{label}-{}.{DEFAULT_DOMAIN_SUFFIX}", &id[..8])
}

pub fn default_backend() -> NewBackend {
    NewBackend {
        name: "backend_1".to_string(),
        address: DEFAULT_BACKEND_ADDRESS.to_string(),
        port: DEFAULT_BACKEND_PORT,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub service_id: String,
    pub version: u32,
    pub domain: String,
    pub backend: String,
}

/// Creates service, domain and backend as one unit; on failure removes what it made.
pub struct ProvisioningOrchestrator<'a> {
    api: &'a dyn ControlPlane,
    store: &'a ManifestStore,
}

impl<'a> ProvisioningOrchestrator<'a> {
    pub fn new(api: &'a dyn ControlPlane, store: &'a ManifestStore) -> Self {
        Self { api, store }
    }

    pub async fn provision(
        &self,
        manifest: &mut Manifest,
        request: &ProvisionRequest,
        out: &mut (dyn Write + Send),
    ) -> Result<Provisioned> {
        let mut plan = ProvisioningPlan::new();

        match self.run_steps(manifest, request, &mut plan, out).await {
            Ok(provisioned) => {
                info!(
                    "Provisioned service {} version {}",
                    provisioned.service_id, provisioned.version
                );
                Ok(provisioned)
            }
            Err((step, error)) => {
                warn!("Provisioning failed while {}: {}", step, error);
                let mut unwind_errors = plan.unwind(self.api).await;

                manifest.service_id.clear();
                if let Err(e) = self.store.save(manifest) {
                    unwind_errors.push(format!("error resetting manifest service id: {e}"));
                }

                Err(DeployError::PartialFailure {
                    step,
                    source: Box::new(error),
                    unwind_errors,
                })
            }
        }
    }

    async fn run_steps(
        &self,
        manifest: &mut Manifest,
        request: &ProvisionRequest,
        plan: &mut ProvisioningPlan,
        out: &mut (dyn Write + Send),
    ) -> std::result::Result<Provisioned, (ProvisionStep, DeployError)> {
        let service = self
            .api
            .create_service(&request.service_name, &request.description)
            .await
            .map_err(|e| {
                (
                    ProvisionStep::CreateService,
                    DeployError::collaborator("error creating service", e),
                )
            })?;
        plan.push(
            ProvisionStep::CreateService,
            Compensation::DeleteService {
                service_id: service.id.clone(),
            },
        );
        manifest.service_id = service.id.clone();
        writeln!(out, "Created service {}", service.id)
            .map_err(|e| (ProvisionStep::CreateService, DeployError::from(e)))?;

        let domain = self
            .api
            .create_domain(&service.id, service.version, &request.domain)
            .await
            .map_err(|e| {
                (
                    ProvisionStep::CreateDomain,
                    DeployError::collaborator("error creating domain", e),
                )
            })?;
        plan.push(
            ProvisionStep::CreateDomain,
            Compensation::DeleteDomain {
                service_id: service.id.clone(),
                version: service.version,
                name: domain.name.clone(),
            },
        );
        writeln!(out, "Created domain {}", domain.name)
            .map_err(|e| (ProvisionStep::CreateDomain, DeployError::from(e)))?;

        let backend = self
            .api
            .create_backend(&service.id, service.version, &request.backend)
            .await
            .map_err(|e| {
                (
                    ProvisionStep::CreateBackend,
                    DeployError::collaborator("error creating backend", e),
                )
            })?;
        plan.push(
            ProvisionStep::CreateBackend,
            Compensation::DeleteBackend {
                service_id: service.id.clone(),
                version: service.version,
                name: backend.name.clone(),
            },
        );
        writeln!(
            out,
            "Created backend {} ({}:{})",
            backend.name, backend.address, backend.port
        )
        .map_err(|e| (ProvisionStep::CreateBackend, DeployError::from(e)))?;

        self.store
            .save(manifest)
            .map_err(|e| (ProvisionStep::PersistManifest, DeployError::from(e)))?;

        Ok(Provisioned {
            service_id: service.id,
            version: service.version,
            domain: domain.name,
            backend: backend.name,
        })
    }
}
