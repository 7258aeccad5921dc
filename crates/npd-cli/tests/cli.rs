//! End-to-end runs of the `npd` binary.
//!
//! None of these reach npm: packages either declare nothing or fail
//! validation first, so `--npm` points at a path that does not exist.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Temporary home plus a directory to create packages in.
struct TestContext {
    temp_dir: TempDir,
    npd_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let npd_home = temp_dir.path().join(".npd");
        std::fs::create_dir_all(&npd_home).expect("failed to create npd home");
        Self { temp_dir, npd_home }
    }

    fn package(&self, name: &str, toml: &str) -> PathBuf {
        let dir = self.temp_dir.path().join("packages").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.toml"), toml).unwrap();
        dir
    }

    fn npd_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_npd");
        let mut cmd = Command::new(bin_path);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("NPD_HOME", &self.npd_home);
        cmd.env_remove("NPD_NPM");
        cmd.env_remove("NPD_TIMEOUT");
        cmd.args(["--npm", "/nonexistent/npm", "--quiet"]);
        cmd
    }

    fn run(&self, args: &[&str], dirs: &[&Path]) -> Output {
        self.npd_cmd()
            .args(args)
            .args(dirs)
            .output()
            .expect("failed to run npd")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.npd_cmd().arg("--help").output().expect("failed to run npd");
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.npd_cmd().arg("--version").output().expect("failed to run npd");
    assert!(output.status.success());
}

#[test]
fn test_build_without_dependencies_succeeds() {
    let ctx = TestContext::new();
    let dir = ctx.package("plain", "[package]\nname = \"plain\"\n");

    let output = ctx.run(&["build"], &[&dir]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).is_empty());
    assert!(!dir.join(".npm").exists());
}

#[test]
fn test_build_reports_inexact_version() {
    let ctx = TestContext::new();
    let dir = ctx.package(
        "test-package",
        "[package]\nname = \"test-package\"\n\n[npm-dependencies]\nmime = \"^1.2.7\"\n",
    );

    let output = ctx.run(&["build"], &[&dir]);
    assert!(!output.status.success());
    let text = stdout(&output);
    assert!(text.contains("While building package test-package:"), "{text}");
    assert!(text.contains("must declare exact version"), "{text}");
    assert!(!dir.join(".npm").exists());
}

#[test]
fn test_build_json_diagnostics() {
    let ctx = TestContext::new();
    let bad = ctx.package("bad", "[npm-dependencies]\nmime = \"~1.2.7\"\n");
    let good = ctx.package("good", "");

    let output = ctx.run(&["build", "--json"], &[&bad, &good]);
    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let jobs = json.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["jobTitle"], "building package bad");
    assert!(jobs[0]["messages"][0]["message"].is_string());
}

#[test]
fn test_status_reports_missing_install() {
    let ctx = TestContext::new();
    let dir = ctx.package("charts", "[npm-dependencies]\ngcd = \"0.0.0\"\n");

    let output = ctx.run(&["status"], &[&dir]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("manifest-changed"));

    let output = ctx.run(&["status", "--json"], &[&dir]);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json[0]["package"], "charts");
    assert_eq!(json[0]["state"], "manifest-changed");
    assert!(!dir.join(".npm").exists());
}

#[test]
fn test_missing_package_file_fails() {
    let ctx = TestContext::new();
    let dir = ctx.temp_dir.path().join("empty");
    std::fs::create_dir_all(&dir).unwrap();

    let output = ctx.run(&["build"], &[&dir]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("package.toml"));
}

#[test]
fn test_bundle_without_dependencies_succeeds() {
    let ctx = TestContext::new();
    let dir = ctx.package("plain", "");
    let bundle = ctx.temp_dir.path().join("bundle");

    let output = ctx.run(&["bundle", "-o", bundle.to_str().unwrap()], &[&dir]);
    assert!(output.status.success(), "{output:?}");
    assert!(bundle.is_dir());
    assert!(stdout(&output).is_empty());
}
