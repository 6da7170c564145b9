use crate::manifest::Language;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Build, package and release edge-compute services
#[derive(Parser)]
#[command(name = "edgepack")]
#[command(about = "Build, package and deploy edge-compute packages")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct EdgepackCli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory containing edge.toml
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify the toolchain and compile bin/main.wasm
    Build(BuildArgs),

    /// Create the package archive from the manifest and compiled binary
    Pack {
        /// Archive location (default: pkg/<name>.tar.gz)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Check that a package archive contains the required files
    Validate {
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Create a project and provision its service
    Init(InitArgs),

    /// Upload the package to the service and activate it
    Deploy(DeployArgs),

    /// Upload the package to an editable version without activating it
    Update(DeployArgs),

    /// Build, pack and deploy
    Publish {
        #[command(flatten)]
        build: BuildArgs,
        #[command(flatten)]
        deploy: DeployArgs,
    },

    /// Build and run the package in the local runtime
    Serve {
        #[command(flatten)]
        build: BuildArgs,

        /// Local runtime binary
        #[arg(long)]
        runtime: Option<PathBuf>,

        /// Address the local runtime listens on
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct BuildArgs {
    /// Skip toolchain verification
    #[arg(short, long)]
    pub force: bool,

    /// Stream compiler output
    #[arg(long)]
    pub show_output: bool,
}

#[derive(Args, Clone, Debug, Default)]
pub struct DeployArgs {
    /// Service to deploy to (default: service_id from edge.toml)
    #[arg(short, long)]
    pub service_id: Option<String>,

    /// Version to deploy to (default: active, else locked, else latest)
    #[arg(long = "version")]
    pub version: Option<u32>,

    /// Package archive (default: pkg/<name>.tar.gz)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Domain for a service created by this deploy
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct InitArgs {
    /// Package name (default: directory name)
    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    /// Author, may be repeated
    #[arg(short, long = "author")]
    pub authors: Vec<String>,

    /// rust, javascript or other
    #[arg(short, long, value_parser = parse_language)]
    pub language: Option<Language>,

    /// Template repository, `url[#branch]`
    #[arg(long)]
    pub from: Option<String>,

    /// Attach to an existing service instead of creating one
    #[arg(short, long)]
    pub service_id: Option<String>,

    /// Domain for the new service
    #[arg(long)]
    pub domain: Option<String>,

    /// Backend for the new service, `host[:port]`
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<(String, u16)>,
}

fn parse_language(value: &str) -> Result<Language, String> {
    value.parse().map_err(|e: crate::manifest::ManifestError| e.to_string())
}

/// `host` or `host:port`; the port defaults to 80.
pub fn parse_backend(value: &str) -> Result<(String, u16), String> {
    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => port
            .parse()
            .map(|port| (host.to_string(), port))
            .map_err(|_| format!("invalid port `{port}`")),
        Some(_) => Err("backend host is empty".to_string()),
        None if value.is_empty() => Err("backend host is empty".to_string()),
        None => Ok((value.to_string(), 80)),
    }
}
