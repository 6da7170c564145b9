//! HTTP client for the control-plane API

use super::{
    Backend, ControlPlane, Domain, NewBackend, PackageMetadata, RemoteError, Result, Service,
    ServiceVersion,
};
use crate::config::ApiConfig;
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

const TOKEN_HEADER: &str = "Fastly-Key";

pub struct HttpControlPlane {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ServiceResponse {
    id: String,
    name: String,
    #[serde(default)]
    versions: Vec<VersionNumber>,
}

#[derive(Deserialize)]
struct VersionNumber {
    number: u32,
}

#[derive(Deserialize)]
struct PackageResponse {
    #[serde(default)]
    metadata: PackageMetadata,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl HttpControlPlane {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("edgepack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Other(format!("invalid API endpoint: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        let mut builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| match (b.msg, b.detail) {
                (Some(msg), Some(detail)) => Some(format!("{msg}: {detail}")),
                (Some(msg), None) => Some(msg),
                (None, detail) => detail,
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(message));
        }
        Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_service(&self, name: &str, comment: &str) -> Result<Service> {
        let url = self.url(&["service"])?;
        let form = [("name", name), ("comment", comment), ("type", "wasm")];
        let response: ServiceResponse = self
            .send_json(self.request(Method::POST, url).form(&form))
            .await?;

        Ok(Service {
            id: response.id,
            name: response.name,
            version: response.versions.first().map(|v| v.number).unwrap_or(1),
        })
    }

    async fn delete_service(&self, service_id: &str) -> Result<()> {
        let url = self.url(&["service", service_id])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn create_domain(&self, service_id: &str, version: u32, name: &str) -> Result<Domain> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "domain"])?;
        self.send_json(self.request(Method::POST, url).form(&[("name", name)]))
            .await
    }

    async fn delete_domain(&self, service_id: &str, version: u32, name: &str) -> Result<()> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "domain", name])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn list_domains(&self, service_id: &str, version: u32) -> Result<Vec<Domain>> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "domain"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn create_backend(
        &self,
        service_id: &str,
        version: u32,
        backend: &NewBackend,
    ) -> Result<Backend> {
        let version = version.to_string();
        let port = backend.port.to_string();
        let url = self.url(&["service", service_id, "version", &version, "backend"])?;
        let form = [
            ("name", backend.name.as_str()),
            ("address", backend.address.as_str()),
            ("port", port.as_str()),
        ];
        self.send_json(self.request(Method::POST, url).form(&form))
            .await
    }

    async fn delete_backend(&self, service_id: &str, version: u32, name: &str) -> Result<()> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "backend", name])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn list_backends(&self, service_id: &str, version: u32) -> Result<Vec<Backend>> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "backend"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn list_versions(&self, service_id: &str) -> Result<Vec<ServiceVersion>> {
        let url = self.url(&["service", service_id, "version"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn clone_version(&self, service_id: &str, version: u32) -> Result<ServiceVersion> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "clone"])?;
        self.send_json(self.request(Method::PUT, url)).await
    }

    async fn activate_version(&self, service_id: &str, version: u32) -> Result<ServiceVersion> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "activate"])?;
        self.send_json(self.request(Method::PUT, url)).await
    }

    async fn get_package(
        &self,
        service_id: &str,
        version: u32,
    ) -> Result<Option<PackageMetadata>> {
        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "package"])?;
        match self
            .send_json::<PackageResponse>(self.request(Method::GET, url))
            .await
        {
            Ok(response) => Ok(Some(response.metadata)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_package(
        &self,
        service_id: &str,
        version: u32,
        archive: &Path,
    ) -> Result<PackageMetadata> {
        let bytes = tokio::fs::read(archive).await?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.tar.gz".to_string());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/gzip")?;
        let form = reqwest::multipart::Form::new().part("package", part);

        let version = version.to_string();
        let url = self.url(&["service", service_id, "version", &version, "package"])?;
        let response: PackageResponse = self
            .send_json(self.request(Method::PUT, url).multipart(form))
            .await?;
        Ok(response.metadata)
    }
}
