//! Edgepack - build, package and release pipeline for edge-compute services
//!
//! This crate verifies local toolchains, compiles a project to a wasm binary,
//! archives it into a deterministic package and ships that package to a hosting
//! platform's control plane, provisioning the remote service on first use.

pub mod cli;
pub mod config;
pub mod deploy;
pub mod manifest;
pub mod package;
pub mod process;
pub mod remote;
pub mod template;
pub mod toolchain;

pub use deploy::{DeployError, DeployOutcome, Pipeline, Result};
pub use manifest::{Language, Manifest, ManifestStore};
