//! Streaming package validation: entries are read in order and never extracted.

use super::PackageError;
use crate::manifest::MANIFEST_FILE;
use crate::toolchain::BINARY_FILE;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tokio::task;
use tracing::debug;

/// Checks the package at `path` contains the manifest and the compiled binary.
pub async fn validate_package(path: PathBuf) -> Result<(), PackageError> {
    task::spawn_blocking(move || validate_archive(&path, &[MANIFEST_FILE, BINARY_FILE]))
        .await
        .map_err(|e| PackageError::Task(e.to_string()))?
}

/// Checks every name in `required` appears as the file name of some entry.
pub fn validate_archive(path: &Path, required: &[&str]) -> Result<(), PackageError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PackageError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            PackageError::Io(e)
        }
    })?;
    let corrupt = |e: std::io::Error| PackageError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut pending: Vec<&str> = required.to_vec();
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut seen = 0usize;

    for entry in archive.entries().map_err(corrupt)? {
        let entry = entry.map_err(corrupt)?;
        let entry_path = entry.path().map_err(corrupt)?.into_owned();
        seen += 1;

        if is_unsafe_path(&entry_path) {
            return Err(PackageError::UnsafeEntry {
                path: entry_path.display().to_string(),
            });
        }

        if let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) {
            pending.retain(|required| *required != name);
        }
    }

    debug!("Validated {} entries in {}", seen, path.display());
    if pending.is_empty() {
        Ok(())
    } else {
        Err(PackageError::MissingEntries {
            files: pending.into_iter().map(String::from).collect(),
        })
    }
}

fn is_unsafe_path(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}
