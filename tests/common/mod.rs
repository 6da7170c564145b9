//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use edgepack::manifest::{Language, Manifest, ManifestStore};
use edgepack::package::file_digest;
use edgepack::process::{CommandRunner, CommandSpec, ExitStatus, OutputSink, Stream};
use edgepack::remote::{
    Backend, ControlPlane, Domain, NewBackend, PackageMetadata, RemoteError, Result, Service,
    ServiceVersion,
};
use edgepack::toolchain::VersionRegistry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn version(number: u32, active: bool, locked: bool, minutes: i64) -> ServiceVersion {
    ServiceVersion {
        number,
        active,
        locked,
        updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
    }
}

#[derive(Default)]
struct PlaneState {
    calls: Vec<String>,
    failures: HashSet<String>,
    next_service: u32,
    versions: HashMap<String, Vec<ServiceVersion>>,
    domains: Vec<Domain>,
    backends: Vec<Backend>,
    packages: HashMap<(String, u32), PackageMetadata>,
}

/// Control plane that keeps resources in memory and records every call.
#[derive(Default)]
pub struct FakeControlPlane {
    state: Mutex<PlaneState>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `method` fail with a 500.
    pub fn fail_on(self, method: &str) -> Self {
        self.state.lock().unwrap().failures.insert(method.to_string());
        self
    }

    pub fn with_versions(self, service_id: &str, versions: Vec<ServiceVersion>) -> Self {
        self.state
            .lock()
            .unwrap()
            .versions
            .insert(service_id.to_string(), versions);
        self
    }

    pub fn with_domain(self, service_id: &str, version: u32, name: &str) -> Self {
        self.state.lock().unwrap().domains.push(Domain {
            name: name.to_string(),
            service_id: service_id.to_string(),
            version,
        });
        self
    }

    pub fn with_package(self, service_id: &str, version: u32, hashsum: &str) -> Self {
        self.state.lock().unwrap().packages.insert(
            (service_id.to_string(), version),
            PackageMetadata {
                hashsum: Some(hashsum.to_string()),
                size: None,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(method))
            .count()
    }

    pub fn versions(&self, service_id: &str) -> Vec<ServiceVersion> {
        self.state
            .lock()
            .unwrap()
            .versions
            .get(service_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn domains(&self) -> Vec<Domain> {
        self.state.lock().unwrap().domains.clone()
    }

    pub fn backends(&self) -> Vec<Backend> {
        self.state.lock().unwrap().backends.clone()
    }

    pub fn service_exists(&self, service_id: &str) -> bool {
        self.state.lock().unwrap().versions.contains_key(service_id)
    }

    fn record(&self, method: &str, detail: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{method}:{detail}"));
        if state.failures.contains(method) {
            return Err(RemoteError::Status {
                status: 500,
                message: format!("{method} is unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create_service(&self, name: &str, _comment: &str) -> Result<Service> {
        self.record("create_service", name.to_string())?;
        let mut state = self.state.lock().unwrap();
        state.next_service += 1;
        let id = format!("svc{}", state.next_service);
        state
            .versions
            .insert(id.clone(), vec![version(1, false, false, 0)]);
        Ok(Service {
            id,
            name: name.to_string(),
            version: 1,
        })
    }

    async fn delete_service(&self, service_id: &str) -> Result<()> {
        self.record("delete_service", service_id.to_string())?;
        let mut state = self.state.lock().unwrap();
        state.versions.remove(service_id);
        Ok(())
    }

    async fn create_domain(&self, service_id: &str, version: u32, name: &str) -> Result<Domain> {
        self.record("create_domain", name.to_string())?;
        let domain = Domain {
            name: name.to_string(),
            service_id: service_id.to_string(),
            version,
        };
        self.state.lock().unwrap().domains.push(domain.clone());
        Ok(domain)
    }

    async fn delete_domain(&self, service_id: &str, _version: u32, name: &str) -> Result<()> {
        self.record("delete_domain", name.to_string())?;
        self.state
            .lock()
            .unwrap()
            .domains
            .retain(|d| !(d.service_id == service_id && d.name == name));
        Ok(())
    }

    async fn list_domains(&self, service_id: &str, _version: u32) -> Result<Vec<Domain>> {
        self.record("list_domains", service_id.to_string())?;
        Ok(self
            .domains()
            .into_iter()
            .filter(|d| d.service_id == service_id)
            .collect())
    }

    async fn create_backend(
        &self,
        service_id: &str,
        version: u32,
        backend: &NewBackend,
    ) -> Result<Backend> {
        self.record("create_backend", backend.name.clone())?;
        let created = Backend {
            name: backend.name.clone(),
            address: backend.address.clone(),
            port: backend.port,
            service_id: service_id.to_string(),
            version,
        };
        self.state.lock().unwrap().backends.push(created.clone());
        Ok(created)
    }

    async fn delete_backend(&self, service_id: &str, _version: u32, name: &str) -> Result<()> {
        self.record("delete_backend", name.to_string())?;
        self.state
            .lock()
            .unwrap()
            .backends
            .retain(|b| !(b.service_id == service_id && b.name == name));
        Ok(())
    }

    async fn list_backends(&self, service_id: &str, _version: u32) -> Result<Vec<Backend>> {
        self.record("list_backends", service_id.to_string())?;
        Ok(self
            .backends()
            .into_iter()
            .filter(|b| b.service_id == service_id)
            .collect())
    }

    async fn list_versions(&self, service_id: &str) -> Result<Vec<ServiceVersion>> {
        self.record("list_versions", service_id.to_string())?;
        self.state
            .lock()
            .unwrap()
            .versions
            .get(service_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("service {service_id}")))
    }

    async fn clone_version(&self, service_id: &str, version_number: u32) -> Result<ServiceVersion> {
        self.record("clone_version", format!("{service_id}/{version_number}"))?;
        let mut state = self.state.lock().unwrap();
        let versions = state
            .versions
            .get_mut(service_id)
            .ok_or_else(|| RemoteError::NotFound(format!("service {service_id}")))?;
        let next = versions.iter().map(|v| v.number).max().unwrap_or(0) + 1;
        let cloned = version(next, false, false, 10_000 + i64::from(next));
        versions.push(cloned.clone());

        // a clone carries the source version's package
        let source = (service_id.to_string(), version_number);
        if let Some(package) = state.packages.get(&source).cloned() {
            state.packages.insert((service_id.to_string(), next), package);
        }
        Ok(cloned)
    }

    async fn activate_version(&self, service_id: &str, number: u32) -> Result<ServiceVersion> {
        self.record("activate_version", format!("{service_id}/{number}"))?;
        let mut state = self.state.lock().unwrap();
        let versions = state
            .versions
            .get_mut(service_id)
            .ok_or_else(|| RemoteError::NotFound(format!("service {service_id}")))?;
        for v in versions.iter_mut() {
            v.active = v.number == number;
        }
        versions
            .iter()
            .find(|v| v.number == number)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("version {number}")))
    }

    async fn get_package(&self, service_id: &str, number: u32) -> Result<Option<PackageMetadata>> {
        self.record("get_package", format!("{service_id}/{number}"))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .packages
            .get(&(service_id.to_string(), number))
            .cloned())
    }

    async fn update_package(
        &self,
        service_id: &str,
        number: u32,
        archive: &Path,
    ) -> Result<PackageMetadata> {
        self.record("update_package", format!("{service_id}/{number}"))?;
        let metadata = PackageMetadata {
            hashsum: Some(file_digest(archive)?),
            size: Some(std::fs::metadata(archive)?.len()),
        };
        self.state
            .lock()
            .unwrap()
            .packages
            .insert((service_id.to_string(), number), metadata.clone());
        Ok(metadata)
    }
}

struct Rule {
    program: String,
    args_prefix: Vec<String>,
    stdout: String,
    code: i32,
    writes: Vec<(PathBuf, Vec<u8>)>,
}

/// Subprocess runner answering from canned rules instead of spawning processes.
#[derive(Default)]
pub struct FakeRunner {
    located: HashSet<String>,
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binaries(mut self, programs: &[&str]) -> Self {
        self.located.extend(programs.iter().map(|p| p.to_string()));
        self
    }

    /// Answers `program args_prefix...` with `stdout` and exit code 0.
    pub fn on(self, program: &str, args_prefix: &[&str], stdout: &str) -> Self {
        self.on_status(program, args_prefix, stdout, 0)
    }

    pub fn on_status(
        mut self,
        program: &str,
        args_prefix: &[&str],
        stdout: &str,
        code: i32,
    ) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|a| a.to_string()).collect(),
            stdout: stdout.to_string(),
            code,
            writes: Vec::new(),
        });
        self
    }

    /// Like `on`, and also writes `contents` to `path` as the command's side effect.
    pub fn on_write(
        mut self,
        program: &str,
        args_prefix: &[&str],
        path: &Path,
        contents: &[u8],
    ) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|a| a.to_string()).collect(),
            stdout: String::new(),
            code: 0,
            writes: vec![(path.to_path_buf(), contents.to_vec())],
        });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, program: &str, first_arg: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| c.program == program && c.args.iter().any(|a| a == first_arg))
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.located
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }

    async fn run(
        &self,
        spec: &CommandSpec,
        sink: &mut dyn OutputSink,
    ) -> std::io::Result<ExitStatus> {
        self.calls.lock().unwrap().push(spec.clone());
        let rule = self.rules.iter().find(|r| {
            r.program == spec.program
                && spec
                    .args
                    .iter()
                    .filter(|a| !a.starts_with('+'))
                    .take(r.args_prefix.len())
                    .eq(r.args_prefix.iter())
        });

        let Some(rule) = rule else {
            sink.line(Stream::Stderr, &format!("{}: command not found", spec.program));
            return Ok(ExitStatus { code: Some(127) });
        };
        for (path, contents) in &rule.writes {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }
        for line in rule.stdout.lines() {
            sink.line(Stream::Stdout, line);
        }
        Ok(ExitStatus {
            code: Some(rule.code),
        })
    }
}

/// Registry serving fixed version lists.
#[derive(Default)]
pub struct FakeRegistry {
    versions: HashMap<String, Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, versions: &[&str]) -> Self {
        self.versions.insert(
            name.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl VersionRegistry for FakeRegistry {
    async fn versions(&self, name: &str) -> std::result::Result<Vec<String>, RemoteError> {
        self.versions
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("crate {name} is not published")))
    }
}

/// `cargo metadata` output for `pkg -> fastly -> fastly-sys`. `None` leaves fastly-sys out.
pub fn cargo_metadata(sdk: &str, abi: Option<&str>) -> String {
    let root = "pkg 0.1.0 (path+file:///work/pkg)";
    let sdk_id = format!("fastly {sdk} (registry+https://github.com/rust-lang/crates.io-index)");
    let mut packages = vec![
        serde_json::json!({"id": root, "name": "pkg", "version": "0.1.0"}),
        serde_json::json!({"id": sdk_id, "name": "fastly", "version": sdk}),
    ];
    let mut sdk_deps = Vec::new();
    let mut nodes = vec![serde_json::json!({"id": root, "dependencies": [sdk_id]})];
    if let Some(abi) = abi {
        let abi_id =
            format!("fastly-sys {abi} (registry+https://github.com/rust-lang/crates.io-index)");
        packages.push(serde_json::json!({"id": abi_id, "name": "fastly-sys", "version": abi}));
        nodes.push(serde_json::json!({"id": abi_id, "dependencies": []}));
        sdk_deps.push(abi_id);
    }
    nodes.push(serde_json::json!({"id": sdk_id, "dependencies": sdk_deps}));

    serde_json::json!({
        "packages": packages,
        "workspace_members": [root],
        "resolve": {"root": root, "nodes": nodes},
        "version": 1
    })
    .to_string()
}

/// A Rust project named `pkg` with its manifest and Cargo.toml.
pub fn rust_project(dir: &Path) -> ManifestStore {
    std::fs::write(
        dir.join("Cargo.toml"),
        "[package]\nname = \"pkg\"\nversion = \"0.1.0\"\n\n[dependencies]\nfastly = \"0.9\"\n",
    )
    .unwrap();
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();

    let store = ManifestStore::new(dir);
    store.save(&Manifest::new("pkg", Language::Rust)).unwrap();
    store
}

/// Runner for a healthy Rust environment whose build emits `wasm` for `pkg`.
pub fn healthy_rust_runner(dir: &Path, metadata: &str, wasm: &[u8]) -> FakeRunner {
    FakeRunner::new()
        .with_binaries(&["rustup", "cargo", "rustc"])
        .on("rustc", &["--version"], "rustc 1.80.1 (3f5fd8dd4 2024-08-06)")
        .on(
            "rustup",
            &["target", "list", "--installed"],
            "x86_64-unknown-linux-gnu\nwasm32-wasi\n",
        )
        .on("cargo", &["metadata"], metadata)
        .on_write(
            "cargo",
            &["build"],
            &dir.join("target/wasm32-wasi/release/pkg.wasm"),
            wasm,
        )
}

pub fn healthy_registry() -> FakeRegistry {
    FakeRegistry::new()
        .with("fastly", &["0.9.0", "0.9.1", "0.10.0-alpha.1"])
        .with("fastly-sys", &["0.9.0", "0.9.1"])
}
