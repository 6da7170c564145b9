use anyhow::Result;
use clap::Parser;
use edgepack::cli::{execute, print_error, EdgepackCli};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EdgepackCli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting edgepack v{}", env!("CARGO_PKG_VERSION"));

    let mut stdout = std::io::stdout();
    if let Err(e) = execute(&cli, &mut stdout).await {
        debug!("Command failed: {:?}", e);
        print_error(&mut std::io::stderr(), &e);
        std::process::exit(1);
    }
    Ok(())
}
