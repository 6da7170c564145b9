//! The build-and-release pipeline behind each CLI command.

use super::executor::{DeployExecutor, DeployOutcome};
use super::provision::{ProvisionRequest, Provisioned, ProvisioningOrchestrator};
use super::resolver::VersionResolver;
use crate::config::{ServeConfig, ToolchainConfig, API_TOKEN_ENV};
use crate::deploy::{DeployError, Result};
use crate::manifest::{Language, Manifest, ManifestError, ManifestStore, MANIFEST_FILE};
use crate::package::{self, collect_inputs, create_archive, validate_package};
use crate::process::{CommandRunner, CommandSpec, WriterSink};
use crate::remote::ControlPlane;
use crate::template::{copy_tree, GitTemplateFetcher, TemplateFetcher};
use crate::toolchain::{
    canonical_binary_path, Toolchain, ToolchainContext, ToolchainError, ToolchainErrorKind,
    VersionRegistry,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub verbose: bool,
    /// Skip toolchain verification.
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Overrides the manifest's service id.
    pub service_id: Option<String>,
    pub version: Option<u32>,
    /// Overrides `pkg/<name>.tar.gz`.
    pub path: Option<PathBuf>,
    /// Domain for a service created on first deploy.
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InitRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub language: Option<Language>,
    /// Template repository reference, `url[#branch]`.
    pub from: Option<String>,
    /// Attach to an existing service instead of provisioning one.
    pub service_id: Option<String>,
    pub domain: Option<String>,
    pub backend: Option<(String, u16)>,
}

/// One project directory plus the collaborators every command needs.
pub struct Pipeline {
    project_dir: PathBuf,
    store: ManifestStore,
    runner: Arc<dyn CommandRunner>,
    registry: Arc<dyn VersionRegistry>,
    api: Option<Arc<dyn ControlPlane>>,
    templates: Arc<dyn TemplateFetcher>,
    toolchain_config: ToolchainConfig,
    serve_config: ServeConfig,
}

impl Pipeline {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        registry: Arc<dyn VersionRegistry>,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            store: ManifestStore::new(&project_dir),
            project_dir,
            runner,
            registry,
            api: None,
            templates: Arc::new(GitTemplateFetcher::new()),
            toolchain_config: ToolchainConfig::default(),
            serve_config: ServeConfig::detect(),
        }
    }

    pub fn with_api(mut self, api: Arc<dyn ControlPlane>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateFetcher>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_toolchain_config(mut self, config: ToolchainConfig) -> Self {
        self.toolchain_config = config;
        self
    }

    pub fn with_serve_config(mut self, config: ServeConfig) -> Self {
        self.serve_config = config;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    fn api(&self) -> Result<&dyn ControlPlane> {
        self.api.as_deref().ok_or_else(|| {
            DeployError::validation(
                "api token",
                format!("no API token configured; set {API_TOKEN_ENV}"),
            )
        })
    }

    fn toolchain(&self, manifest: &Manifest) -> Result<Toolchain> {
        let language = manifest.language()?;
        let ctx = ToolchainContext {
            project_dir: self.project_dir.clone(),
            runner: Arc::clone(&self.runner),
            registry: Arc::clone(&self.registry),
            config: self.toolchain_config.clone(),
            build_script: manifest.scripts.build.clone(),
        };
        Ok(Toolchain::new(language, ctx))
    }

    fn archive_path(&self, manifest: &Manifest, path: Option<&Path>) -> PathBuf {
        match path {
            Some(path) => self.project_dir.join(path),
            None => package::default_archive_path(&self.project_dir, &manifest.package_name()),
        }
    }

    /// Verifies the toolchain (unless forced) and compiles `bin/main.wasm`.
    pub async fn build(&self, opts: BuildOptions, out: &mut (dyn Write + Send)) -> Result<PathBuf> {
        let manifest = self.store.load()?;
        let toolchain = self.toolchain(&manifest)?;

        if opts.force {
            warn!("Toolchain verification skipped for {}", manifest.name);
            writeln!(out, "Skipping toolchain verification (--force)")?;
        } else {
            toolchain.verify(out).await?;
        }

        writeln!(out, "Building package {}...", manifest.name)?;
        let binary = toolchain.build(opts.verbose, out).await?;
        writeln!(out, "Built {}", binary.display())?;
        Ok(binary)
    }

    /// Archives the manifest, binary and language extras, then validates the result.
    pub async fn pack(&self, path: Option<&Path>, out: &mut (dyn Write + Send)) -> Result<PathBuf> {
        let manifest = self.store.load()?;
        let toolchain = self.toolchain(&manifest)?;
        let dest = self.archive_path(&manifest, path);

        let inputs = collect_inputs(&self.project_dir, toolchain.extra_includes())?;
        let archive = create_archive(inputs, manifest.package_name(), dest).await?;
        validate_package(archive.clone()).await?;

        writeln!(out, "Created package {}", archive.display())?;
        Ok(archive)
    }

    pub async fn validate(&self, path: Option<&Path>, out: &mut (dyn Write + Send)) -> Result<()> {
        let path = match path {
            Some(path) => self.project_dir.join(path),
            None => self.archive_path(&self.store.load()?, None),
        };
        validate_package(path.clone()).await?;
        writeln!(out, "Validated package {}", path.display())?;
        Ok(())
    }

    /// Scaffolds the project (optionally from a template), writes the manifest and
    /// provisions a service unless one is supplied.
    pub async fn init(
        &self,
        request: InitRequest,
        out: &mut (dyn Write + Send),
    ) -> Result<Option<Provisioned>> {
        if let Ok(existing) = self.store.load() {
            if existing.has_service() {
                return Err(DeployError::validation(
                    "service_id",
                    format!(
                        "{} is already initialized for service {}",
                        MANIFEST_FILE, existing.service_id
                    ),
                ));
            }
        }

        std::fs::create_dir_all(&self.project_dir)?;
        if let Some(reference) = &request.from {
            let staging = tempfile::TempDir::new()?;
            self.templates.fetch(reference, staging.path()).await?;
            let written = copy_tree(staging.path(), &self.project_dir)?;
            writeln!(out, "Copied {} file(s) from template {}", written.len(), reference)?;
        }

        let mut manifest = match self.store.load() {
            Ok(manifest) => manifest,
            Err(ManifestError::NotFound { .. }) => self.fresh_manifest(&request)?,
            Err(ManifestError::MissingField { .. }) => self.fresh_manifest(&request)?,
            Err(e) => return Err(e.into()),
        };
        if let Some(name) = &request.name {
            manifest.name = name.clone();
        }
        if let Some(description) = &request.description {
            manifest.description = description.clone();
        }
        if !request.authors.is_empty() {
            manifest.authors = request.authors.clone();
        }
        if let Some(language) = request.language {
            manifest.language = language.as_str().to_string();
        }
        manifest.validate()?;
        self.store.save(&manifest)?;
        writeln!(out, "Wrote {}", self.store.path().display())?;

        if let Some(service_id) = &request.service_id {
            manifest.service_id = service_id.clone();
            self.store.save(&manifest)?;
            writeln!(out, "Using existing service {service_id}")?;
            return Ok(None);
        }

        let mut provision = ProvisionRequest::with_defaults(manifest.name.clone());
        provision.description = manifest.description.clone();
        if let Some(domain) = &request.domain {
            provision.domain = domain.clone();
        }
        if let Some((address, port)) = &request.backend {
            provision.backend.address = address.clone();
            provision.backend.port = *port;
        }

        let provisioned = ProvisioningOrchestrator::new(self.api()?, &self.store)
            .provision(&mut manifest, &provision, out)
            .await?;
        writeln!(
            out,
            "Initialized service {} at https://{}",
            provisioned.service_id, provisioned.domain
        )?;
        Ok(Some(provisioned))
    }

    fn fresh_manifest(&self, request: &InitRequest) -> Result<Manifest> {
        let name = match &request.name {
            Some(name) => name.clone(),
            None => self
                .project_dir
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| DeployError::validation("name", "pass --name"))?,
        };
        let language = request
            .language
            .ok_or_else(|| DeployError::validation("language", "pass --language"))?;
        Ok(Manifest::new(name, language))
    }

    /// Uploads the package to the resolved version and activates it. A project
    /// without a service gets one provisioned first.
    pub async fn deploy(
        &self,
        opts: &DeployOptions,
        out: &mut (dyn Write + Send),
    ) -> Result<DeployOutcome> {
        let api = self.api()?;
        let mut manifest = self.store.load()?;
        let archive = self.archive_path(&manifest, opts.path.as_deref());
        validate_package(archive.clone()).await?;

        let service_id = match opts.service_id.clone() {
            Some(id) if !id.is_empty() => id,
            _ if manifest.has_service() => manifest.service_id.clone(),
            _ => {
                writeln!(out, "No service configured, creating one...")?;
                let mut request = ProvisionRequest::with_defaults(manifest.name.clone());
                request.description = manifest.description.clone();
                if let Some(domain) = &opts.domain {
                    request.domain = domain.clone();
                }
                ProvisioningOrchestrator::new(api, &self.store)
                    .provision(&mut manifest, &request, out)
                    .await?
                    .service_id
            }
        };

        let base = VersionResolver::new(api, &service_id)
            .base(opts.version)
            .await?;
        debug!("Deploying to service {} on top of version {}", service_id, base.number);

        let outcome = DeployExecutor::new(api, &self.store)
            .deploy(&mut manifest, &service_id, &archive, &base)
            .await?;

        match &outcome {
            DeployOutcome::Deployed { version, domain } => {
                writeln!(out, "Deployed package (service {service_id}, version {version})")?;
                if let Some(domain) = domain {
                    writeln!(out, "View this service at: https://{domain}")?;
                }
            }
            DeployOutcome::Skipped { version } => {
                writeln!(
                    out,
                    "Skipped package upload: service {service_id} version {version} already has this package"
                )?;
            }
        }
        Ok(outcome)
    }

    /// Uploads the package to an editable version without activating it.
    pub async fn update(
        &self,
        opts: &DeployOptions,
        out: &mut (dyn Write + Send),
    ) -> Result<DeployOutcome> {
        let api = self.api()?;
        let manifest = self.store.load()?;
        let service_id = opts
            .service_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| manifest.has_service().then(|| manifest.service_id.clone()))
            .ok_or_else(|| {
                DeployError::validation("service_id", "no service configured; run `edgepack init`")
            })?;

        let archive = self.archive_path(&manifest, opts.path.as_deref());
        validate_package(archive.clone()).await?;
        let base = VersionResolver::new(api, &service_id)
            .base(opts.version)
            .await?;

        let outcome = DeployExecutor::new(api, &self.store)
            .update(&service_id, &archive, &base)
            .await?;
        match &outcome {
            DeployOutcome::Deployed { version, .. } => {
                writeln!(out, "Updated package (service {service_id}, version {version})")?;
            }
            DeployOutcome::Skipped { version } => {
                writeln!(
                    out,
                    "Skipped package upload: service {service_id} version {version} already has this package"
                )?;
            }
        }
        Ok(outcome)
    }

    /// Build, pack and deploy.
    pub async fn publish(
        &self,
        build: BuildOptions,
        opts: &DeployOptions,
        out: &mut (dyn Write + Send),
    ) -> Result<DeployOutcome> {
        self.build(build, out).await?;
        let archive = self.pack(opts.path.as_deref(), out).await?;
        let opts = DeployOptions {
            path: Some(archive),
            ..opts.clone()
        };
        self.deploy(&opts, out).await
    }

    /// Builds, then runs the binary in the local runtime until it exits.
    pub async fn serve(&self, build: BuildOptions, out: &mut (dyn Write + Send)) -> Result<()> {
        self.build(build, out).await?;

        let runtime = self.serve_config.runtime.display().to_string();
        let binary = canonical_binary_path(&self.project_dir);
        let spec = CommandSpec::new(runtime.clone())
            .arg(binary.display().to_string())
            .arg("-C")
            .arg(self.store.path().display().to_string())
            .arg("--addr")
            .arg(self.serve_config.addr.clone())
            .current_dir(&self.project_dir);

        writeln!(out, "Serving on http://{}", self.serve_config.addr)?;
        info!("Starting local runtime: {}", spec.display());
        let mut sink = WriterSink::new(out, true);
        let status = self.runner.run(&spec, &mut sink).await.map_err(|e| {
            ToolchainError::new(
                ToolchainErrorKind::MissingBinary,
                format!("failed to start `{runtime}`: {e}"),
                "Install the local runtime with `cargo install viceroy`",
            )
        })?;

        if !status.success() {
            return Err(ToolchainError::new(
                ToolchainErrorKind::RuntimeFailed,
                format!("`{runtime}` exited with {:?}", status.code),
                "Check the runtime output above for the cause",
            )
            .into());
        }
        Ok(())
    }
}
