use super::{
    canonical_binary_path, require_canonical_binary, ToolchainContext, ToolchainError,
    ToolchainErrorKind,
};
use crate::deploy::Result;
use std::io::Write;
use std::path::PathBuf;

/// Packages a wasm binary the user built with their own tooling.
pub struct PrebuiltToolchain {
    ctx: ToolchainContext,
}

impl PrebuiltToolchain {
    pub fn new(ctx: ToolchainContext) -> Self {
        Self { ctx }
    }

    pub(crate) fn context(&self) -> &ToolchainContext {
        &self.ctx
    }

    pub async fn verify(&self, out: &mut (dyn Write + Send)) -> Result<()> {
        let path = canonical_binary_path(&self.ctx.project_dir);
        writeln!(out, "Checking for {}...", path.display())?;
        if !path.is_file() {
            return Err(ToolchainError::new(
                ToolchainErrorKind::MissingProjectFile,
                format!("{} not found", path.display()),
                "Compile your application to wasm and place the output at bin/main.wasm",
            )
            .into());
        }
        Ok(())
    }

    pub async fn build(&self, _verbose: bool, out: &mut (dyn Write + Send)) -> Result<PathBuf> {
        writeln!(out, "Using prebuilt binary, skipping compilation")?;
        require_canonical_binary(&self.ctx.project_dir)
    }
}
