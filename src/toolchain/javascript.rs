use super::{
    canonical_binary_path, parse_constraint, require_binary, require_canonical_binary,
    require_project_file, run_streamed, DependencyNode, ToolchainContext, ToolchainError,
    ToolchainErrorKind,
};
use crate::deploy::Result;
use crate::process::CommandSpec;
use semver::Version;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct JavaScriptToolchain {
    ctx: ToolchainContext,
}

impl JavaScriptToolchain {
    pub fn new(ctx: ToolchainContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn context(&self) -> &ToolchainContext {
        &self.ctx
    }

    pub async fn verify(&self, out: &mut (dyn Write + Send)) -> Result<()> {
        let config = &self.ctx.config.javascript;

        writeln!(out, "Checking if node and npm are installed...")?;
        require_binary(&self.ctx, "node", "Install Node.js from https://nodejs.org")?;
        require_binary(&self.ctx, "npm", "Install Node.js from https://nodejs.org")?;

        let requirement = parse_constraint(&config.node_constraint)?;
        writeln!(out, "Checking node version satisfies {requirement}...")?;
        let raw = self
            .capture(&CommandSpec::new("node").arg("--version"))
            .await?;
        let installed = Version::parse(raw.trim().trim_start_matches('v')).map_err(|e| {
            ToolchainError::new(
                ToolchainErrorKind::VersionMismatch,
                format!("could not read the node version from `{}`: {e}", raw.trim()),
                "Install a current Node.js release from https://nodejs.org",
            )
        })?;
        if !requirement.matches(&installed) {
            return Err(ToolchainError::new(
                ToolchainErrorKind::VersionMismatch,
                format!("node {installed} does not satisfy the required range {requirement}"),
                "Install a current Node.js release from https://nodejs.org",
            )
            .into());
        }

        writeln!(out, "Checking for package.json...")?;
        require_project_file(&self.ctx, "package.json", "Run `npm init` in the project directory")?;

        writeln!(out, "Checking {} is installed...", config.runtime_package)?;
        let listing = self
            .capture_lenient(
                &CommandSpec::new("npm")
                    .args(["ls", "--json", "--all"])
                    .current_dir(&self.ctx.project_dir),
            )
            .await?;
        let graph = DependencyNode::from_npm_ls(&listing)?;
        match graph.find(&config.runtime_package) {
            Some(node) => {
                debug!("{} {} is installed", node.name, node.version);
                Ok(())
            }
            None => Err(ToolchainError::new(
                ToolchainErrorKind::CrateNotFound,
                format!("{} package not found", config.runtime_package),
                format!("npm install --save-exact {}", config.runtime_package),
            )
            .into()),
        }
    }

    async fn capture(&self, spec: &CommandSpec) -> Result<String> {
        self.run_capture(spec, false).await
    }

    /// Keeps stdout on a non-zero exit: `npm ls` exits 1 whenever the tree
    /// has problems but still prints it.
    async fn capture_lenient(&self, spec: &CommandSpec) -> Result<String> {
        self.run_capture(spec, true).await
    }

    async fn run_capture(&self, spec: &CommandSpec, lenient: bool) -> Result<String> {
        let (status, output) = self.ctx.runner.capture(spec).await.map_err(|e| {
            ToolchainError::new(
                ToolchainErrorKind::MissingBinary,
                format!("failed to run `{}`: {e}", spec.display()),
                format!("Make sure `{}` is installed and on your $PATH", spec.program),
            )
        })?;
        let usable = status.success() || (lenient && !output.stdout.trim().is_empty());
        if !usable {
            return Err(ToolchainError::new(
                ToolchainErrorKind::Metadata,
                format!("`{}` failed: {}", spec.display(), output.stderr.trim()),
                "Run `npm install` in the project directory",
            )
            .into());
        }
        Ok(output.stdout)
    }

    pub async fn build(&self, verbose: bool, out: &mut (dyn Write + Send)) -> Result<PathBuf> {
        let entry = &self.ctx.config.javascript.entry_point;
        info!("Bundling {} into a wasm binary", entry);
        writeln!(out, "Building package using JavaScript toolchain...")?;

        let output = canonical_binary_path(&self.ctx.project_dir);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let spec = CommandSpec::new("npx")
            .args(["js-compute-runtime", entry.as_str()])
            .arg(output.to_string_lossy())
            .current_dir(&self.ctx.project_dir);
        run_streamed(&self.ctx, &spec, verbose, out).await?;

        require_canonical_binary(&self.ctx.project_dir)
    }
}
