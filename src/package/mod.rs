//! Package archives: deterministic creation, streaming validation and digests.

pub mod archive;
pub mod digest;
pub mod error;
pub mod validate;

pub use archive::{collect_inputs, create_archive, ArchiveInput};
pub use digest::file_digest;
pub use error::PackageError;
pub use validate::{validate_archive, validate_package};

use std::path::{Path, PathBuf};

pub const PACKAGE_DIR: &str = "pkg";
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// `<project>/pkg/<name>.tar.gz`
pub fn default_archive_path(project_dir: &Path, package_name: &str) -> PathBuf {
    project_dir
        .join(PACKAGE_DIR)
        .join(format!("{package_name}.{ARCHIVE_EXTENSION}"))
}
