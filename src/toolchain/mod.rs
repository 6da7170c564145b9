//! Toolchain verification and builds, one variant per supported language.

pub mod error;
pub mod graph;
pub mod javascript;
pub mod prebuilt;
pub mod registry;
pub mod rust;

pub use error::{ToolchainError, ToolchainErrorKind};
pub use graph::DependencyNode;
pub use javascript::JavaScriptToolchain;
pub use prebuilt::PrebuiltToolchain;
pub use registry::{CratesIoRegistry, VersionRegistry};
pub use rust::RustToolchain;

use crate::config::ToolchainConfig;
use crate::deploy::Result;
use crate::manifest::Language;
use crate::process::{CommandRunner, CommandSpec, WriterSink};
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const BINARY_DIR: &str = "bin";
pub const BINARY_FILE: &str = "main.wasm";

/// Everything a toolchain needs from its surroundings, injected at construction.
#[derive(Clone)]
pub struct ToolchainContext {
    pub project_dir: PathBuf,
    pub runner: Arc<dyn CommandRunner>,
    pub registry: Arc<dyn VersionRegistry>,
    pub config: ToolchainConfig,
    /// Custom build command from the manifest's `[scripts]` table.
    pub build_script: Option<String>,
}

/// The toolchain for one pipeline run, selected once from the manifest language.
pub enum Toolchain {
    Rust(RustToolchain),
    JavaScript(JavaScriptToolchain),
    Prebuilt(PrebuiltToolchain),
}

impl Toolchain {
    pub fn new(language: Language, ctx: ToolchainContext) -> Self {
        match language {
            Language::Rust => Toolchain::Rust(RustToolchain::new(ctx)),
            Language::JavaScript => Toolchain::JavaScript(JavaScriptToolchain::new(ctx)),
            Language::Other => Toolchain::Prebuilt(PrebuiltToolchain::new(ctx)),
        }
    }

    pub fn language(&self) -> Language {
        match self {
            Toolchain::Rust(_) => Language::Rust,
            Toolchain::JavaScript(_) => Language::JavaScript,
            Toolchain::Prebuilt(_) => Language::Other,
        }
    }

    fn context(&self) -> &ToolchainContext {
        match self {
            Toolchain::Rust(t) => t.context(),
            Toolchain::JavaScript(t) => t.context(),
            Toolchain::Prebuilt(t) => t.context(),
        }
    }

    /// Checks that the local environment can build this package.
    pub async fn verify(&self, out: &mut (dyn Write + Send)) -> Result<()> {
        info!("Verifying {} toolchain", self.language());
        match self {
            Toolchain::Rust(t) => t.verify(out).await,
            Toolchain::JavaScript(t) => t.verify(out).await,
            Toolchain::Prebuilt(t) => t.verify(out).await,
        }
    }

    /// Produces `bin/main.wasm` and returns its path.
    pub async fn build(&self, verbose: bool, out: &mut (dyn Write + Send)) -> Result<PathBuf> {
        let ctx = self.context();
        if let Some(script) = &ctx.build_script {
            info!("Running custom build script: {}", script);
            run_build_script(ctx, script, verbose, out).await?;
            return require_canonical_binary(&ctx.project_dir);
        }

        match self {
            Toolchain::Rust(t) => t.build(verbose, out).await,
            Toolchain::JavaScript(t) => t.build(verbose, out).await,
            Toolchain::Prebuilt(t) => t.build(verbose, out).await,
        }
    }

    /// Project files shipped in the package next to the manifest and binary.
    pub fn extra_includes(&self) -> &'static [&'static str] {
        match self {
            Toolchain::Rust(_) => &["Cargo.toml", "Cargo.lock", "src"],
            Toolchain::JavaScript(_) => &["package.json", "src"],
            Toolchain::Prebuilt(_) => &[],
        }
    }
}

pub fn canonical_binary_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BINARY_DIR).join(BINARY_FILE)
}

/// "Same major.minor as `latest`, any patch": 0.4.2 gives `~0.4.0`.
pub fn coupling_constraint(latest: &Version) -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::Tilde,
            major: latest.major,
            minor: Some(latest.minor),
            patch: Some(0),
            pre: Prerelease::EMPTY,
        }],
    }
}

pub(crate) fn parse_constraint(
    constraint: &str,
) -> std::result::Result<VersionReq, ToolchainError> {
    VersionReq::parse(constraint).map_err(|e| {
        ToolchainError::new(
            ToolchainErrorKind::InvalidConstraint,
            format!("invalid version constraint `{constraint}`: {e}"),
            "Use a semver range such as `>=1.78.0`",
        )
    })
}

pub(crate) fn require_binary(
    ctx: &ToolchainContext,
    program: &str,
    remediation: &str,
) -> std::result::Result<PathBuf, ToolchainError> {
    match ctx.runner.locate(program) {
        Some(path) => {
            debug!("Found {} at {}", program, path.display());
            Ok(path)
        }
        None => Err(ToolchainError::new(
            ToolchainErrorKind::MissingBinary,
            format!("`{program}` not found in $PATH"),
            remediation,
        )),
    }
}

pub(crate) fn require_project_file(
    ctx: &ToolchainContext,
    file: &str,
    remediation: &str,
) -> std::result::Result<PathBuf, ToolchainError> {
    let path = ctx.project_dir.join(file);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ToolchainError::new(
            ToolchainErrorKind::MissingProjectFile,
            format!("{file} not found in {}", ctx.project_dir.display()),
            remediation,
        ))
    }
}

/// Runs a build step, streaming its output; any non-zero exit fails the build.
pub(crate) async fn run_streamed(
    ctx: &ToolchainContext,
    spec: &CommandSpec,
    verbose: bool,
    out: &mut (dyn Write + Send),
) -> Result<()> {
    info!("Running `{}`", spec.display());
    let mut sink = WriterSink::new(out, verbose);
    let status = ctx.runner.run(spec, &mut sink).await.map_err(|e| {
        ToolchainError::new(
            ToolchainErrorKind::BuildFailed,
            format!("failed to start `{}`: {e}", spec.program),
            format!("Make sure `{}` is installed and on your $PATH", spec.program),
        )
    })?;

    if !status.success() {
        return Err(ToolchainError::new(
            ToolchainErrorKind::BuildFailed,
            format!(
                "`{}` exited with {}",
                spec.display(),
                status
                    .code
                    .map(|c| format!("status {c}"))
                    .unwrap_or_else(|| "a signal".to_string())
            ),
            "Re-run with --verbose to see the full compiler output",
        )
        .into());
    }
    Ok(())
}

async fn run_build_script(
    ctx: &ToolchainContext,
    script: &str,
    verbose: bool,
    out: &mut (dyn Write + Send),
) -> Result<()> {
    let words = shell_words::split(script).map_err(|e| {
        ToolchainError::new(
            ToolchainErrorKind::BuildFailed,
            format!("could not parse build script `{script}`: {e}"),
            "Fix the quoting of `scripts.build` in edge.toml",
        )
    })?;
    let Some((program, args)) = words.split_first() else {
        return Err(ToolchainError::new(
            ToolchainErrorKind::BuildFailed,
            "build script is empty",
            "Remove `scripts.build` from edge.toml or give it a command",
        )
        .into());
    };

    let spec = CommandSpec::new(program.clone())
        .args(args.iter().cloned())
        .current_dir(&ctx.project_dir);
    run_streamed(ctx, &spec, verbose, out).await
}

/// Copies a freshly built binary to `bin/main.wasm`, creating `bin/` if needed.
pub(crate) fn install_binary(built: &Path, project_dir: &Path) -> Result<PathBuf> {
    let dest = canonical_binary_path(project_dir);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(built, &dest)?;
    debug!("Copied {} to {}", built.display(), dest.display());
    Ok(dest)
}

pub(crate) fn require_canonical_binary(project_dir: &Path) -> Result<PathBuf> {
    let path = canonical_binary_path(project_dir);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ToolchainError::new(
            ToolchainErrorKind::BuildFailed,
            format!("build did not produce {}", path.display()),
            format!("Make sure the build writes its output to {BINARY_DIR}/{BINARY_FILE}"),
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupling_constraint_window() {
        let constraint = coupling_constraint(&Version::new(0, 4, 2));
        assert_eq!(constraint.to_string(), "~0.4.0");
        assert!(constraint.matches(&Version::new(0, 4, 0)));
        assert!(constraint.matches(&Version::new(0, 4, 9)));
        assert!(!constraint.matches(&Version::new(0, 5, 0)));
        assert!(!constraint.matches(&Version::new(0, 3, 7)));
    }

    #[test]
    fn test_coupling_constraint_from_latest() {
        let constraint = coupling_constraint(&Version::new(0, 6, 0));
        assert!(!constraint.matches(&Version::new(0, 3, 7)));
        assert!(constraint.matches(&Version::new(0, 6, 0)));
    }

    #[test]
    fn test_parse_constraint_rejects_garbage() {
        let err = parse_constraint("not a range").unwrap_err();
        assert_eq!(err.kind, ToolchainErrorKind::InvalidConstraint);
        assert!(parse_constraint(">=1.78.0").is_ok());
    }
}
