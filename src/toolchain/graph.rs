//! Shallow dependency trees read from `cargo metadata` and `npm ls` output.

use super::{ToolchainError, ToolchainErrorKind};
use semver::Version;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub name: String,
    pub version: Version,
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<DependencyNode>) -> Self {
        self.children = children;
        self
    }

    /// Looks for `name` in this package, its direct dependencies and theirs.
    pub fn find(&self, name: &str) -> Option<&DependencyNode> {
        if self.name == name {
            return Some(self);
        }
        if let Some(direct) = self.children.iter().find(|c| c.name == name) {
            return Some(direct);
        }
        self.children
            .iter()
            .flat_map(|c| c.children.iter())
            .find(|c| c.name == name)
    }

    /// Builds the tree rooted at the current package from `cargo metadata --format-version 1`.
    pub fn from_cargo_metadata(json: &str) -> Result<Self, ToolchainError> {
        let metadata: CargoMetadata = serde_json::from_str(json)
            .map_err(|e| metadata_error(format!("could not parse cargo metadata: {e}")))?;

        let resolve = metadata
            .resolve
            .ok_or_else(|| metadata_error("cargo metadata has no dependency resolution"))?;
        let root_id = resolve
            .root
            .clone()
            .or_else(|| metadata.workspace_members.first().cloned())
            .ok_or_else(|| metadata_error("cargo metadata has no root package"))?;

        let packages: HashMap<&str, &CargoPackage> =
            metadata.packages.iter().map(|p| (p.id.as_str(), p)).collect();
        let edges: HashMap<&str, &[String]> = resolve
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.dependencies.as_slice()))
            .collect();

        let node = |id: &str| -> Result<DependencyNode, ToolchainError> {
            let package = packages
                .get(id)
                .ok_or_else(|| metadata_error(format!("package {id} missing from metadata")))?;
            Ok(DependencyNode::new(
                package.name.clone(),
                parse_version(&package.name, &package.version)?,
            ))
        };
        let deps_of = |id: &str| edges.get(id).copied().unwrap_or_default();

        let mut root = node(root_id.as_str())?;
        for child_id in deps_of(root_id.as_str()) {
            let mut child = node(child_id.as_str())?;
            for grandchild_id in deps_of(child_id.as_str()) {
                child.children.push(node(grandchild_id.as_str())?);
            }
            root.children.push(child);
        }
        Ok(root)
    }

    /// Builds the tree from `npm ls --json --all`. Entries npm reports without a
    /// version (missing or unmet) are left out.
    pub fn from_npm_ls(json: &str) -> Result<Self, ToolchainError> {
        let root: NpmNode = serde_json::from_str(json)
            .map_err(|e| metadata_error(format!("could not parse npm ls output: {e}")))?;

        let name = root.name.clone().unwrap_or_default();
        let version = match &root.version {
            Some(v) => parse_version(&name, v)?,
            None => Version::new(0, 0, 0),
        };

        let mut tree = DependencyNode::new(name, version);
        for (child_name, child) in &root.dependencies {
            let Some(child_version) = &child.version else {
                continue;
            };
            let mut node =
                DependencyNode::new(child_name.clone(), parse_version(child_name, child_version)?);
            for (grandchild_name, grandchild) in &child.dependencies {
                if let Some(v) = &grandchild.version {
                    node.children.push(DependencyNode::new(
                        grandchild_name.clone(),
                        parse_version(grandchild_name, v)?,
                    ));
                }
            }
            tree.children.push(node);
        }
        Ok(tree)
    }
}

fn parse_version(name: &str, version: &str) -> Result<Version, ToolchainError> {
    Version::parse(version)
        .map_err(|e| metadata_error(format!("invalid version `{version}` for {name}: {e}")))
}

fn metadata_error(message: impl Into<String>) -> ToolchainError {
    ToolchainError::new(
        ToolchainErrorKind::Metadata,
        message,
        "Make sure the project builds locally and its lock file is up to date",
    )
}

#[derive(Deserialize)]
struct CargoMetadata {
    packages: Vec<CargoPackage>,
    #[serde(default)]
    workspace_members: Vec<String>,
    #[serde(default)]
    resolve: Option<CargoResolve>,
}

#[derive(Deserialize)]
struct CargoPackage {
    id: String,
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct CargoResolve {
    #[serde(default)]
    root: Option<String>,
    nodes: Vec<CargoNode>,
}

#[derive(Deserialize)]
struct CargoNode {
    id: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Deserialize)]
struct NpmNode {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, NpmNode>,
}
