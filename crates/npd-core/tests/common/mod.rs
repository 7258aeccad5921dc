//! Shared fixtures: a recording fake npm backed by a tiny in-memory registry.

#![allow(dead_code, unreachable_pub)]

use async_trait::async_trait;
use npd_core::{CommandOutput, NpmRunner, RunError, RunOptions};
use npd_schema::{LockDescription, LockedDependency};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// Tarball URL of the forked gzippo used by the scenario.
pub const GZIPPO_URL: &str =
    "https://github.com/meteor/gzippo/tarball/1e4b955439abc643879ae264b28a761521818f3b";

/// A line only the forked gzippo source contains.
pub const GZIPPO_MARKER: &str = "clientMaxAge = 604800000";

#[derive(Debug, Clone)]
struct Published {
    versions: Vec<String>,
    latest: String,
    requires: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    registry: BTreeMap<String, Published>,
    tarballs: BTreeMap<String, (String, String)>,
    calls: Vec<Vec<String>>,
    network_down: bool,
}

/// Stands in for the npm executable: installs packages from an in-memory
/// registry into the working directory and records every invocation.
#[derive(Debug, Default)]
pub struct FakeNpm {
    state: Mutex<State>,
}

impl FakeNpm {
    /// Registry with gcd (which requires big-integer), mime, semver and a
    /// gzippo tarball.
    pub fn new() -> Self {
        let fake = Self::default();
        fake.publish("gcd", &["0.0.0"], &["big-integer"]);
        fake.publish("big-integer", &["1.1.5", "1.1.6"], &[]);
        fake.set_latest("big-integer", "1.1.5");
        fake.publish("mime", &["1.2.7", "1.2.8"], &[]);
        fake.publish("semver", &["1.1.0"], &[]);
        fake.publish("gzippo", &["0.1.7"], &[]);
        fake.state
            .lock()
            .unwrap()
            .tarballs
            .insert(GZIPPO_URL.into(), ("gzippo".into(), "0.1.7".into()));
        fake
    }

    /// Publish `name` at `versions`; the last one becomes latest.
    pub fn publish(&self, name: &str, versions: &[&str], requires: &[&str]) {
        let published = Published {
            versions: versions.iter().map(|v| (*v).to_string()).collect(),
            latest: versions.last().copied().unwrap_or_default().to_string(),
            requires: requires.iter().map(|r| (*r).to_string()).collect(),
        };
        self.state
            .lock()
            .unwrap()
            .registry
            .insert(name.to_string(), published);
    }

    /// Move the `latest` tag of `name`.
    pub fn set_latest(&self, name: &str, version: &str) {
        let mut state = self.state.lock().unwrap();
        let published = state.registry.get_mut(name).unwrap();
        published.latest = version.to_string();
    }

    /// Make every following call fail as if the network were unreachable.
    pub fn set_network_down(&self, down: bool) {
        self.state.lock().unwrap().network_down = down;
    }

    /// Every recorded invocation, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Forget recorded invocations.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Recorded `npm install` calls that named specific packages.
    pub fn per_package_installs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| c.first().map(String::as_str) == Some("install"))
            .filter_map(|c| c.iter().skip(1).find(|a| !a.starts_with("--")).cloned())
            .collect()
    }

    /// Recorded bulk `npm install` calls.
    pub fn bulk_installs(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.first().map(String::as_str) == Some("install"))
            .filter(|c| c.iter().skip(1).all(|a| a.starts_with("--")))
            .count()
    }

    fn install_one(&self, cwd: &Path, spec: &str) -> CommandOutput {
        let state = self.state.lock().unwrap();

        let (name, version, from) = if spec.contains("://") {
            match state.tarballs.get(spec) {
                Some((name, version)) => (name.clone(), version.clone(), Some(spec.to_string())),
                None => {
                    return CommandOutput::failed(
                        1,
                        format!("npm ERR! code E404\nnpm ERR! 404 Not Found - GET {spec}\n"),
                    );
                }
            }
        } else {
            let (name, version) = split_spec(spec);
            let available = state
                .registry
                .get(name)
                .is_some_and(|p| p.versions.iter().any(|v| v == version));
            if !available {
                return not_found(name, version);
            }
            (name.to_string(), version.to_string(), None)
        };

        let node_modules = cwd.join("node_modules");
        let dir = node_modules.join(&name);
        let _ = std::fs::remove_dir_all(&dir);
        write_package(&dir, &name, &version, from.as_deref());

        let requires = state
            .registry
            .get(&name)
            .map(|p| p.requires.clone())
            .unwrap_or_default();
        for sub in requires {
            let latest = state.registry[&sub].latest.clone();
            write_package(&dir.join("node_modules").join(&sub), &sub, &latest, None);
        }

        let manifest_path = cwd.join("package.json");
        let mut manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
        manifest["dependencies"][name.as_str()] = Value::String(from.unwrap_or(version));
        std::fs::write(manifest_path, manifest.to_string()).unwrap();

        CommandOutput::ok()
    }

    fn install_bulk(&self, cwd: &Path) -> CommandOutput {
        let state = self.state.lock().unwrap();
        let content = std::fs::read_to_string(cwd.join("npm-shrinkwrap.json")).unwrap();
        let lock = LockDescription::parse(&content).unwrap();

        for (name, entry) in &lock.dependencies {
            if let Err(failure) = materialize(&state, &cwd.join("node_modules"), name, entry) {
                return failure;
            }
        }
        CommandOutput::ok()
    }

    fn shrinkwrap(cwd: &Path) -> CommandOutput {
        let dependencies = describe(&cwd.join("node_modules"));
        let body = json!({
            "name": "npd-staging",
            "lockfileVersion": 1,
            "requires": true,
            "dependencies": dependencies,
        });
        std::fs::write(
            cwd.join("npm-shrinkwrap.json"),
            serde_json::to_string_pretty(&body).unwrap(),
        )
        .unwrap();
        CommandOutput::ok()
    }
}

#[async_trait]
impl NpmRunner for FakeNpm {
    async fn run(
        &self,
        cwd: &Path,
        args: &[String],
        _options: &RunOptions,
    ) -> Result<CommandOutput, RunError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(args.to_vec());
            if state.network_down {
                return Ok(CommandOutput::failed(
                    1,
                    "npm ERR! code ECONNREFUSED\nnpm ERR! network request failed\n",
                ));
            }
        }

        let spec = args.iter().skip(1).find(|a| !a.starts_with("--"));
        let output = match (args.first().map(String::as_str), spec) {
            (Some("install"), Some(spec)) => self.install_one(cwd, spec),
            (Some("install"), None) => self.install_bulk(cwd),
            (Some("shrinkwrap"), _) => Self::shrinkwrap(cwd),
            _ => CommandOutput::ok(),
        };
        Ok(output)
    }
}

fn split_spec(spec: &str) -> (&str, &str) {
    match spec.rfind('@') {
        Some(at) if at > 0 => (&spec[..at], &spec[at + 1..]),
        _ => (spec, "latest"),
    }
}

fn not_found(name: &str, version: &str) -> CommandOutput {
    CommandOutput::failed(
        1,
        format!(
            "npm ERR! code ETARGET\nnpm ERR! notarget No matching version found for {name}@{version}.\n"
        ),
    )
}

fn write_package(dir: &Path, name: &str, version: &str, from: Option<&str>) {
    std::fs::create_dir_all(dir).unwrap();
    let mut manifest = json!({ "name": name, "version": version });
    if let Some(from) = from {
        manifest["_resolved"] = Value::String(from.to_string());
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::write(
            dir.join("lib/staticGzip.js"),
            format!("var {GZIPPO_MARKER};\n"),
        )
        .unwrap();
    }
    std::fs::write(dir.join("package.json"), manifest.to_string()).unwrap();
    std::fs::write(dir.join("README.md"), format!("# {name}\n")).unwrap();
}

fn materialize(
    state: &State,
    node_modules: &Path,
    name: &str,
    entry: &LockedDependency,
) -> Result<(), CommandOutput> {
    let dir = node_modules.join(name);
    match (&entry.version, &entry.from) {
        (Some(version), _) => {
            let available = state
                .registry
                .get(name)
                .is_some_and(|p| p.versions.contains(version));
            if !available {
                return Err(not_found(name, version));
            }
            write_package(&dir, name, version, None);
        }
        (None, Some(url)) => {
            let Some((_, version)) = state.tarballs.get(url) else {
                return Err(CommandOutput::failed(1, "npm ERR! 404 Not Found\n"));
            };
            write_package(&dir, name, version, Some(url));
        }
        (None, None) => return Err(CommandOutput::failed(1, "npm ERR! invalid shrinkwrap\n")),
    }

    for (sub, sub_entry) in &entry.dependencies {
        materialize(state, &dir.join("node_modules"), sub, sub_entry)?;
    }
    Ok(())
}

fn describe(node_modules: &Path) -> Map<String, Value> {
    let mut out = Map::new();
    let Ok(read) = std::fs::read_dir(node_modules) else {
        return out;
    };
    let mut names: Vec<_> = read
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();

    for name in names {
        let dir = node_modules.join(&name);
        let Ok(content) = std::fs::read_to_string(dir.join("package.json")) else {
            continue;
        };
        let manifest: Value = serde_json::from_str(&content).unwrap();
        let mut entry = Map::new();
        entry.insert("version".into(), manifest["version"].clone());
        if let Some(resolved) = manifest.get("_resolved") {
            entry.insert("from".into(), resolved.clone());
            entry.insert("resolved".into(), resolved.clone());
        }
        let nested = describe(&dir.join("node_modules"));
        if !nested.is_empty() {
            entry.insert("dependencies".into(), Value::Object(nested));
        }
        out.insert(name, Value::Object(entry));
    }
    out
}
