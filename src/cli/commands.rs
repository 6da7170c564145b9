use crate::cli::options::{BuildArgs, Commands, DeployArgs, EdgepackCli, InitArgs};
use crate::config::{ApiConfig, ServeConfig, ToolchainConfig};
use crate::deploy::{BuildOptions, DeployError, DeployOptions, InitRequest, Pipeline, Result};
use crate::process::SystemRunner;
use crate::remote::{ControlPlane, HttpControlPlane};
use crate::toolchain::CratesIoRegistry;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// Commands that talk to the control plane.
fn needs_api(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Init(_) | Commands::Deploy(_) | Commands::Update(_) | Commands::Publish { .. }
    )
}

/// Wires the real collaborators into a pipeline for `cli.project_dir`.
pub fn build_pipeline(cli: &EdgepackCli) -> Result<Pipeline> {
    let toolchain_config = ToolchainConfig::default();
    let registry = CratesIoRegistry::new(toolchain_config.registry_endpoint.clone())
        .map_err(|e| DeployError::collaborator("error creating registry client", e))?;

    let mut serve_config = ServeConfig::detect();
    if let Commands::Serve { runtime, addr, .. } = &cli.command {
        if let Some(runtime) = runtime {
            serve_config.runtime = runtime.clone();
        }
        if let Some(addr) = addr {
            serve_config.addr = addr.clone();
        }
    }

    let mut pipeline = Pipeline::new(
        cli.project_dir.clone(),
        Arc::new(SystemRunner::new()),
        Arc::new(registry),
    )
    .with_toolchain_config(toolchain_config)
    .with_serve_config(serve_config);

    if needs_api(&cli.command) {
        let api_config = ApiConfig::from_env()
            .map_err(|e| DeployError::validation("api endpoint", e.to_string()))?;
        if api_config.token.is_some() {
            debug!("Using control plane at {}", api_config.endpoint);
            let api = HttpControlPlane::new(&api_config)
                .map_err(|e| DeployError::collaborator("error creating API client", e))?;
            pipeline = pipeline.with_api(Arc::new(api) as Arc<dyn ControlPlane>);
        }
    }
    Ok(pipeline)
}

pub async fn execute(cli: &EdgepackCli, out: &mut (dyn Write + Send)) -> Result<()> {
    let pipeline = build_pipeline(cli)?;
    info!("Project directory: {}", pipeline.project_dir().display());
    let verbose = cli.verbose > 0;

    match &cli.command {
        Commands::Build(args) => {
            pipeline.build(build_options(args, verbose), out).await?;
        }
        Commands::Pack { path } => {
            pipeline.pack(path.as_deref(), out).await?;
        }
        Commands::Validate { path } => {
            pipeline.validate(path.as_deref(), out).await?;
        }
        Commands::Init(args) => {
            pipeline.init(init_request(args), out).await?;
        }
        Commands::Deploy(args) => {
            pipeline.deploy(&deploy_options(args), out).await?;
        }
        Commands::Update(args) => {
            pipeline.update(&deploy_options(args), out).await?;
        }
        Commands::Publish { build, deploy } => {
            pipeline
                .publish(build_options(build, verbose), &deploy_options(deploy), out)
                .await?;
        }
        Commands::Serve { build, .. } => {
            pipeline.serve(build_options(build, verbose), out).await?;
        }
    }
    Ok(())
}

fn build_options(args: &BuildArgs, verbose: bool) -> BuildOptions {
    BuildOptions {
        verbose: verbose || args.show_output,
        force: args.force,
    }
}

fn deploy_options(args: &DeployArgs) -> DeployOptions {
    DeployOptions {
        service_id: args.service_id.clone(),
        version: args.version,
        path: args.path.clone(),
        domain: args.domain.clone(),
    }
}

fn init_request(args: &InitArgs) -> InitRequest {
    InitRequest {
        name: args.name.clone(),
        description: args.description.clone(),
        authors: args.authors.clone(),
        language: args.language,
        from: args.from.clone(),
        service_id: args.service_id.clone(),
        domain: args.domain.clone(),
        backend: args.backend.clone(),
    }
}
