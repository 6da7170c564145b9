//! The hosting platform's control-plane API, consumed as an external collaborator.

pub mod error;
pub mod http;
pub mod types;

pub use error::RemoteError;
pub use http::HttpControlPlane;
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Resource verbs over services, versions, domains, backends and packages.
///
/// Every call is a synchronous, fallible round trip from the caller's point of view.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_service(&self, name: &str, comment: &str) -> Result<Service>;
    async fn delete_service(&self, service_id: &str) -> Result<()>;

    async fn create_domain(&self, service_id: &str, version: u32, name: &str) -> Result<Domain>;
    async fn delete_domain(&self, service_id: &str, version: u32, name: &str) -> Result<()>;
    async fn list_domains(&self, service_id: &str, version: u32) -> Result<Vec<Domain>>;

    async fn create_backend(
        &self,
        service_id: &str,
        version: u32,
        backend: &NewBackend,
    ) -> Result<Backend>;
    async fn delete_backend(&self, service_id: &str, version: u32, name: &str) -> Result<()>;
    async fn list_backends(&self, service_id: &str, version: u32) -> Result<Vec<Backend>>;

    async fn list_versions(&self, service_id: &str) -> Result<Vec<ServiceVersion>>;
    async fn clone_version(&self, service_id: &str, version: u32) -> Result<ServiceVersion>;
    async fn activate_version(&self, service_id: &str, version: u32) -> Result<ServiceVersion>;

    /// `None` when the version has no package uploaded yet.
    async fn get_package(&self, service_id: &str, version: u32)
        -> Result<Option<PackageMetadata>>;
    async fn update_package(
        &self,
        service_id: &str,
        version: u32,
        archive: &Path,
    ) -> Result<PackageMetadata>;
}
