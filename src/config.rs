//! Runtime configuration assembled from CLI flags and environment variables.

use std::path::PathBuf;
use url::Url;

pub const API_TOKEN_ENV: &str = "EDGEPACK_API_TOKEN";
pub const API_ENDPOINT_ENV: &str = "EDGEPACK_API_ENDPOINT";
pub const DEFAULT_API_ENDPOINT: &str = "https://api.fastly.com";
pub const DEFAULT_REGISTRY_ENDPOINT: &str = "https://crates.io";

/// How the installed Rust toolchain is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainPin {
    /// A `rustup toolchain list` entry must start with this string.
    Exact(String),
    /// `rustc --version` must satisfy this semver range.
    Range(String),
}

#[derive(Debug, Clone)]
pub struct RustConfig {
    pub toolchain: ToolchainPin,
    pub wasm_target: String,
    /// Public SDK crate that applications depend on.
    pub sdk_crate: String,
    /// Internal ABI crate pulled in by the SDK crate.
    pub abi_crate: String,
}

impl Default for RustConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainPin::Range(">=1.78.0".to_string()),
            wasm_target: "wasm32-wasi".to_string(),
            sdk_crate: "fastly".to_string(),
            abi_crate: "fastly-sys".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JavaScriptConfig {
    pub node_constraint: String,
    pub runtime_package: String,
    pub entry_point: String,
}

impl Default for JavaScriptConfig {
    fn default() -> Self {
        Self {
            node_constraint: ">=18.0.0".to_string(),
            runtime_package: "@fastly/js-compute".to_string(),
            entry_point: "src/index.js".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub rust: RustConfig,
    pub javascript: JavaScriptConfig,
    pub registry_endpoint: Url,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            rust: RustConfig::default(),
            javascript: JavaScriptConfig::default(),
            registry_endpoint: Url::parse(DEFAULT_REGISTRY_ENDPOINT)
                .expect("default registry endpoint is a valid URL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub endpoint: Url,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_API_ENDPOINT)
                .expect("default API endpoint is a valid URL"),
            token: None,
            timeout_secs: 300,
        }
    }
}

impl ApiConfig {
    /// Applies `EDGEPACK_API_TOKEN` and `EDGEPACK_API_ENDPOINT` over the defaults.
    pub fn from_env() -> Result<Self, url::ParseError> {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var(API_ENDPOINT_ENV) {
            config.endpoint = Url::parse(&endpoint)?;
        }
        config.token = std::env::var(API_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Local runtime used by `serve`.
    pub runtime: PathBuf,
    pub addr: String,
}

impl ServeConfig {
    /// Prefers a runtime installed under the user's data dir, falling back to `PATH`.
    pub fn detect() -> Self {
        let installed = dirs::data_local_dir()
            .map(|d| d.join("edgepack").join("bin").join("viceroy"))
            .filter(|p| p.is_file());

        Self {
            runtime: installed.unwrap_or_else(|| PathBuf::from("viceroy")),
            addr: "127.0.0.1:7676".to_string(),
        }
    }
}
