use super::{Manifest, ManifestError, MANIFEST_FILE};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and writes the manifest of one project directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join(MANIFEST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<Manifest, ManifestError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => {
                return Err(ManifestError::Malformed {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let manifest: Manifest =
            toml::from_str(&content).map_err(|e| ManifestError::Malformed {
                path: self.path.clone(),
                reason: e.message().to_string(),
            })?;

        manifest.validate()?;
        debug!("Loaded manifest from {}", self.path.display());
        Ok(manifest)
    }

    /// Writes through a sibling temp file so readers never see a torn manifest.
    pub fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let content = toml::to_string(manifest)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let write_err = |source: std::io::Error| ManifestError::Write {
            path: self.path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(content.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!(
            "Saved manifest to {} (service_id={:?}, version={})",
            self.path.display(),
            manifest.service_id,
            manifest.version
        );
        Ok(())
    }
}
