//! The project descriptor (`edge.toml`) and its on-disk store.

pub mod error;
pub mod store;

pub use error::ManifestError;
pub use store::ManifestStore;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MANIFEST_FILE: &str = "edge.toml";
pub const MANIFEST_VERSION: u32 = 1;

/// Source language of a package, which selects the toolchain used to build it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Compiled to wasm by cargo.
    Rust,
    /// Bundled into a wasm runtime by npm tooling.
    JavaScript,
    /// A prebuilt `bin/main.wasm` supplied by the user.
    Other,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::JavaScript => "javascript",
            Language::Other => "other",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rust" => Ok(Language::Rust),
            "javascript" | "js" => Ok(Language::JavaScript),
            "other" => Ok(Language::Other),
            _ => Err(ManifestError::UnknownLanguage(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    /// Replaces the toolchain's default build command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

impl Scripts {
    pub fn is_empty(&self) -> bool {
        self.build.is_none()
    }
}

/// Field order here is the key order written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_manifest_version")]
    pub manifest_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Scripts::is_empty")]
    pub scripts: Scripts,
}

fn default_manifest_version() -> u32 {
    MANIFEST_VERSION
}

impl Manifest {
    pub fn new(name: impl Into<String>, language: Language) -> Self {
        Self {
            manifest_version: MANIFEST_VERSION,
            name: name.into(),
            description: String::new(),
            authors: Vec::new(),
            language: language.as_str().to_string(),
            service_id: String::new(),
            version: 0,
            scripts: Scripts::default(),
        }
    }

    pub fn language(&self) -> Result<Language, ManifestError> {
        if self.language.trim().is_empty() {
            return Err(ManifestError::MissingField { field: "language" });
        }
        self.language.parse()
    }

    /// Checks the fields every pipeline step relies on.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::MissingField { field: "name" });
        }
        self.language()?;
        Ok(())
    }

    pub fn has_service(&self) -> bool {
        !self.service_id.is_empty()
    }

    /// Name used for the archive file and its root folder.
    pub fn package_name(&self) -> String {
        self.name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }
}
