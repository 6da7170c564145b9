use super::{
    coupling_constraint, install_binary, parse_constraint, require_binary, require_project_file,
    run_streamed, DependencyNode, ToolchainContext, ToolchainError, ToolchainErrorKind,
};
use crate::config::{RustConfig, ToolchainPin};
use crate::deploy::{DeployError, Result};
use crate::process::CommandSpec;
use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Prerelease, Version};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

static RUSTC_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rustc (\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)").expect("valid rustc version regex")
});

pub struct RustToolchain {
    ctx: ToolchainContext,
}

#[derive(Deserialize)]
struct CargoToml {
    #[serde(default)]
    package: Option<CargoTomlTarget>,
    #[serde(default)]
    bin: Vec<CargoTomlTarget>,
}

#[derive(Deserialize)]
struct CargoTomlTarget {
    name: String,
}

#[derive(Deserialize)]
struct CargoTargetDirectory {
    #[serde(default)]
    target_directory: Option<PathBuf>,
}

impl RustToolchain {
    pub fn new(ctx: ToolchainContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn context(&self) -> &ToolchainContext {
        &self.ctx
    }

    fn config(&self) -> &RustConfig {
        &self.ctx.config.rust
    }

    /// `+<toolchain>` selector for cargo/rustup when an exact toolchain is pinned.
    fn toolchain_selector(&self) -> Option<&str> {
        match &self.config().toolchain {
            ToolchainPin::Exact(version) => Some(version.as_str()),
            ToolchainPin::Range(_) => None,
        }
    }

    fn cargo(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("cargo").current_dir(&self.ctx.project_dir);
        if let Some(toolchain) = self.toolchain_selector() {
            spec = spec.arg(format!("+{toolchain}"));
        }
        spec
    }

    pub async fn verify(&self, out: &mut (dyn Write + Send)) -> Result<()> {
        writeln!(out, "Checking if rustup is installed...")?;
        require_binary(
            &self.ctx,
            "rustup",
            "Install rustup from https://rustup.rs and restart your shell",
        )?;

        match &self.config().toolchain {
            ToolchainPin::Exact(version) => self.verify_installed_toolchain(version, out).await?,
            ToolchainPin::Range(range) => self.verify_rustc_range(range, out).await?,
        }

        self.verify_wasm_target(out).await?;

        writeln!(out, "Checking for Cargo.toml...")?;
        require_project_file(
            &self.ctx,
            "Cargo.toml",
            "Run `cargo init` in the project directory",
        )?;

        self.verify_dependency_coupling(out).await?;
        Ok(())
    }

    async fn verify_installed_toolchain(
        &self,
        version: &str,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        writeln!(out, "Checking if Rust {version} is installed...")?;
        let spec = CommandSpec::new("rustup").args(["toolchain", "list"]);
        let stdout = self.capture(&spec).await?;

        let installed = stdout.lines().any(|line| line.trim().starts_with(version));
        if !installed {
            return Err(ToolchainError::new(
                ToolchainErrorKind::MissingToolchain,
                format!("Rust toolchain {version} not found"),
                format!("rustup toolchain install {version}"),
            )
            .into());
        }
        debug!("Rust toolchain {} is installed", version);
        Ok(())
    }

    async fn verify_rustc_range(&self, range: &str, out: &mut (dyn Write + Send)) -> Result<()> {
        let requirement = parse_constraint(range)?;
        writeln!(out, "Checking rustc version satisfies {requirement}...")?;

        let stdout = self.capture(&CommandSpec::new("rustc").arg("--version")).await?;
        let installed = parse_rustc_version(&stdout).ok_or_else(|| {
            ToolchainError::new(
                ToolchainErrorKind::VersionMismatch,
                format!("could not read the rustc version from `{}`", stdout.trim()),
                "rustup update stable",
            )
        })?;

        // Nightly and beta builds are compared as the release they precede.
        let mut release = installed.clone();
        release.pre = Prerelease::EMPTY;
        if !requirement.matches(&release) {
            return Err(ToolchainError::new(
                ToolchainErrorKind::VersionMismatch,
                format!("rustc {installed} does not satisfy the required range {requirement}"),
                "rustup update stable",
            )
            .into());
        }
        debug!("rustc {} satisfies {}", installed, requirement);
        Ok(())
    }

    async fn verify_wasm_target(&self, out: &mut (dyn Write + Send)) -> Result<()> {
        let target = self.config().wasm_target.clone();
        writeln!(out, "Checking if the {target} target is installed...")?;

        let mut spec = CommandSpec::new("rustup").args(["target", "list", "--installed"]);
        let mut remediation = format!("rustup target add {target}");
        if let Some(toolchain) = self.toolchain_selector() {
            spec = spec.args(["--toolchain", toolchain]);
            remediation.push_str(&format!(" --toolchain {toolchain}"));
        }

        let stdout = self.capture(&spec).await?;
        if !stdout.lines().any(|line| line.trim() == target) {
            return Err(ToolchainError::new(
                ToolchainErrorKind::MissingTarget,
                format!("Rust target {target} not installed"),
                remediation,
            )
            .into());
        }
        Ok(())
    }

    /// The SDK crate and its ABI crate must stay on the same minor release line.
    async fn verify_dependency_coupling(&self, out: &mut (dyn Write + Send)) -> Result<()> {
        let sdk = self.config().sdk_crate.clone();
        let abi = self.config().abi_crate.clone();
        writeln!(out, "Checking {abi} crate version...")?;

        let latest_abi = self
            .ctx
            .registry
            .latest_version(&abi)
            .await
            .map_err(|e| {
                DeployError::collaborator(format!("error fetching latest {abi} version"), e)
            })?;
        let latest_sdk = self
            .ctx
            .registry
            .latest_version(&sdk)
            .await
            .map_err(|e| {
                DeployError::collaborator(format!("error fetching latest {sdk} version"), e)
            })?;

        let constraint = coupling_constraint(&latest_abi);
        let graph = self.dependency_graph().await?;
        let remediation = format!(
            "Upgrade the {sdk} crate to {latest_sdk}: set `{sdk} = \"^{latest_sdk}\"` in Cargo.toml and run `cargo update -p {sdk}`"
        );

        let installed_abi = graph.find(&abi).ok_or_else(|| {
            ToolchainError::new(
                ToolchainErrorKind::CrateNotFound,
                format!("{abi} crate not found"),
                remediation.clone(),
            )
        })?;
        if !constraint.matches(&installed_abi.version) {
            return Err(ToolchainError::new(
                ToolchainErrorKind::CrateOutdated,
                format!(
                    "{abi} crate not up-to-date: found {}, expected {constraint}",
                    installed_abi.version
                ),
                remediation,
            )
            .into());
        }

        if let Some(installed_sdk) = graph.find(&sdk) {
            if installed_sdk.version < latest_sdk {
                warn!(
                    "{} {} is behind the latest release {}",
                    sdk, installed_sdk.version, latest_sdk
                );
                writeln!(
                    out,
                    "Advisory: a newer version of {sdk} is available ({} -> {latest_sdk}). {remediation}",
                    installed_sdk.version
                )?;
            }
        }
        Ok(())
    }

    async fn dependency_graph(&self) -> Result<DependencyNode> {
        let spec = self
            .cargo()
            .args(["metadata", "--format-version", "1", "--quiet"]);
        let stdout = self.capture(&spec).await?;
        Ok(DependencyNode::from_cargo_metadata(&stdout)?)
    }

    /// Runs `spec` for its stdout, failing on a spawn error or non-zero exit.
    async fn capture(&self, spec: &CommandSpec) -> Result<String> {
        let (status, output) = self.ctx.runner.capture(spec).await.map_err(|e| {
            ToolchainError::new(
                ToolchainErrorKind::MissingBinary,
                format!("failed to run `{}`: {e}", spec.display()),
                format!("Make sure `{}` is installed and on your $PATH", spec.program),
            )
        })?;
        if !status.success() {
            return Err(ToolchainError::new(
                ToolchainErrorKind::Metadata,
                format!("`{}` failed: {}", spec.display(), output.stderr.trim()),
                "Run the command above manually to diagnose the problem",
            )
            .into());
        }
        Ok(output.stdout)
    }

    /// Name of the binary target cargo will produce.
    pub fn binary_name(&self) -> Result<String> {
        let path = require_project_file(
            &self.ctx,
            "Cargo.toml",
            "Run `cargo init` in the project directory",
        )?;
        let content = std::fs::read_to_string(&path)?;
        let manifest: CargoToml = toml::from_str(&content).map_err(|e| {
            ToolchainError::new(
                ToolchainErrorKind::MissingProjectFile,
                format!("could not parse {}: {}", path.display(), e.message()),
                "Fix the syntax errors in Cargo.toml",
            )
        })?;

        manifest
            .bin
            .into_iter()
            .next()
            .or(manifest.package)
            .map(|target| target.name)
            .ok_or_else(|| {
                ToolchainError::new(
                    ToolchainErrorKind::MissingProjectFile,
                    "Cargo.toml declares neither [package] nor [[bin]]",
                    "Add a [package] section with a name to Cargo.toml",
                )
                .into()
            })
    }

    pub async fn build(&self, verbose: bool, out: &mut (dyn Write + Send)) -> Result<PathBuf> {
        let binary = self.binary_name()?;
        let target = self.config().wasm_target.clone();
        info!("Building {} for {}", binary, target);
        writeln!(out, "Building package using Rust toolchain...")?;

        let spec = self.cargo().args([
            "build",
            "--bin",
            binary.as_str(),
            "--release",
            "--target",
            target.as_str(),
        ]);
        run_streamed(&self.ctx, &spec, verbose, out).await?;

        let built = self
            .target_dir()
            .await
            .join(&target)
            .join("release")
            .join(format!("{binary}.wasm"));
        if !built.is_file() {
            return Err(ToolchainError::new(
                ToolchainErrorKind::BuildFailed,
                format!("cargo finished but {} was not produced", built.display()),
                "Check that the crate has a binary target and builds for wasm",
            )
            .into());
        }
        install_binary(&built, &self.ctx.project_dir)
    }

    /// Where cargo puts build output. Workspace members and `CARGO_TARGET_DIR`
    /// both move it away from `<project>/target`.
    async fn target_dir(&self) -> PathBuf {
        let fallback = self.ctx.project_dir.join("target");
        let spec = self
            .cargo()
            .args(["metadata", "--format-version", "1", "--no-deps", "--quiet"]);
        let stdout = match self.capture(&spec).await {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!(
                    "Could not ask cargo for its target directory, using {}: {}",
                    fallback.display(),
                    e
                );
                return fallback;
            }
        };

        match serde_json::from_str::<CargoTargetDirectory>(&stdout) {
            Ok(CargoTargetDirectory {
                target_directory: Some(dir),
            }) => {
                debug!("cargo target directory: {}", dir.display());
                dir
            }
            _ => fallback,
        }
    }
}

fn parse_rustc_version(output: &str) -> Option<Version> {
    let captures = RUSTC_VERSION.captures(output.trim())?;
    Version::parse(captures.get(1)?.as_str()).ok()
}
