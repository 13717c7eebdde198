//! The `mio-cli` binary end to end.

mod common;

use std::process::{Command, Output};

use serde_json::Value;

use common::{Project, MINIMAL_MANIFEST};

fn mio_cli(project: &Project, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mio-cli"))
        .env_clear()
        .arg("--root")
        .arg(project.root())
        .args(args)
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_check_prints_tooling_summary() {
    // Tooling mode never reads the manifest.
    let project = Project::new();
    let output = mio_cli(&project, &["check"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary = stdout_json(&output);
    assert_eq!(summary["tooling_mode"], true);
    assert_eq!(summary["selector"], "config");
    assert_eq!(summary["resolved_profile"], "development");
    assert!(summary["static_dir"].is_null());
    let wired: Vec<_> = summary["wired"].as_array().unwrap().iter().collect();
    assert!(wired.contains(&&Value::from("locale")));
    assert!(summary["routes"].as_array().unwrap().is_empty());
}

#[test]
fn test_routes_lists_manifest_groups() {
    let project = Project::with_manifest(
        r#"
[config]

[[blueprint]]
[blueprint.main]
class = "web.main"
"#,
    );
    let output = mio_cli(&project, &["routes"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let routes = stdout_json(&output);
    assert_eq!(routes[0]["name"], "main");
    assert_eq!(routes[0]["module_path"], "web.main");
}

#[test]
fn test_failed_composition_exits_with_code_one() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let output = mio_cli(&project, &["--selector", "settings", "check"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_hello() {
    let project = Project::new();
    let output = mio_cli(&project, &["hello"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("Powered by Mio/"));
}
