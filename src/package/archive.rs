//! Deterministic `.tar.gz` package creation

use super::PackageError;
use crate::manifest::MANIFEST_FILE;
use crate::toolchain::{BINARY_DIR, BINARY_FILE};
use flate2::{Compression, GzBuilder};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tokio::task;
use tracing::{debug, info};
use walkdir::WalkDir;

const FILE_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;

/// One file placed in the package, at `entry` below the package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInput {
    pub source: PathBuf,
    pub entry: PathBuf,
    pub executable: bool,
}

impl ArchiveInput {
    pub fn new(source: impl Into<PathBuf>, entry: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            entry: entry.into(),
            executable: false,
        }
    }
}

/// Gathers the manifest, the binary and any extra includes from `project_dir`.
///
/// Extra includes may be files or directories; ones that do not exist are skipped.
pub fn collect_inputs(
    project_dir: &Path,
    extras: &[&str],
) -> Result<Vec<ArchiveInput>, PackageError> {
    let manifest = project_dir.join(MANIFEST_FILE);
    let binary = project_dir.join(BINARY_DIR).join(BINARY_FILE);
    for required in [&manifest, &binary] {
        if !required.is_file() {
            return Err(PackageError::MissingInput {
                path: required.clone(),
            });
        }
    }

    let mut inputs = vec![
        ArchiveInput::new(&manifest, MANIFEST_FILE),
        ArchiveInput {
            source: binary,
            entry: Path::new(BINARY_DIR).join(BINARY_FILE),
            executable: true,
        },
    ];

    for extra in extras {
        let path = project_dir.join(extra);
        if path.is_file() {
            inputs.push(ArchiveInput::new(&path, extra));
        } else if path.is_dir() {
            for entry in WalkDir::new(&path).follow_links(false) {
                let entry = entry.map_err(|e| PackageError::Io(e.into()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(project_dir)
                    .map_err(|_| PackageError::MissingInput {
                        path: entry.path().to_path_buf(),
                    })?
                    .to_path_buf();
                inputs.push(ArchiveInput::new(entry.path(), relative));
            }
        } else {
            debug!("Skipping absent package include {}", path.display());
        }
    }

    inputs.sort_by(|a, b| a.entry.cmp(&b.entry));
    inputs.dedup_by(|a, b| a.entry == b.entry);
    Ok(inputs)
}

/// Writes `inputs` under `root/` into a gzip tarball at `dest`, replacing any
/// existing file. Identical inputs always produce identical bytes.
pub async fn create_archive(
    inputs: Vec<ArchiveInput>,
    root: String,
    dest: PathBuf,
) -> Result<PathBuf, PackageError> {
    task::spawn_blocking(move || {
        create_sync(&inputs, &root, &dest)?;
        Ok(dest)
    })
    .await
    .map_err(|e| PackageError::Task(e.to_string()))?
}

fn create_sync(inputs: &[ArchiveInput], root: &str, dest: &Path) -> Result<(), PackageError> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut ordered: Vec<&ArchiveInput> = inputs.iter().collect();
    ordered.sort_by(|a, b| a.entry.cmp(&b.entry));

    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    {
        let encoder = GzBuilder::new()
            .mtime(0)
            .write(BufWriter::new(tmp.as_file()), Compression::default());
        let mut builder = Builder::new(encoder);

        for input in ordered {
            let data = std::fs::read(&input.source).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PackageError::MissingInput {
                        path: input.source.clone(),
                    }
                } else {
                    PackageError::Io(e)
                }
            })?;

            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(if input.executable {
                EXECUTABLE_MODE
            } else {
                FILE_MODE
            });
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);

            let entry_path = Path::new(root).join(&input.entry);
            debug!("Adding {} as {}", input.source.display(), entry_path.display());
            builder.append_data(&mut header, &entry_path, data.as_slice())?;
        }

        let encoder = builder.into_inner()?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
    }
    tmp.persist(dest).map_err(|e| PackageError::Io(e.error))?;

    info!("Created package {} ({} files)", dest.display(), inputs.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "name = \"pkg\"\n").unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/main.wasm"), b"\0asm").unwrap();
        dir
    }

    #[test]
    fn test_collect_inputs_requires_binary() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "name = \"pkg\"\n").unwrap();
        let err = collect_inputs(dir.path(), &[]).unwrap_err();
        assert!(matches!(err, PackageError::MissingInput { path } if path.ends_with("main.wasm")));
    }

    #[test]
    fn test_collect_inputs_walks_directories_and_skips_absent() {
        let dir = project();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("src/nested/mod.rs"), "").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"pkg\"\n").unwrap();

        let inputs = collect_inputs(dir.path(), &["Cargo.toml", "Cargo.lock", "src"]).unwrap();
        let entries: Vec<_> = inputs.iter().map(|i| i.entry.clone()).collect();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("Cargo.toml"),
                PathBuf::from("bin/main.wasm"),
                PathBuf::from(MANIFEST_FILE),
                PathBuf::from("src/main.rs"),
                PathBuf::from("src/nested/mod.rs"),
            ]
        );
        assert!(inputs.iter().any(|i| i.executable && i.entry.ends_with(BINARY_FILE)));
    }

    #[tokio::test]
    async fn test_create_archive_is_byte_identical_across_runs() {
        let dir = project();
        let inputs = collect_inputs(dir.path(), &[]).unwrap();
        let first = dir.path().join("pkg/a.tar.gz");
        let second = dir.path().join("pkg/b.tar.gz");

        create_archive(inputs.clone(), "pkg".to_string(), first.clone())
            .await
            .unwrap();
        create_archive(inputs, "pkg".to_string(), second.clone())
            .await
            .unwrap();

        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }
}
