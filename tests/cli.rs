mod common;

use assert_cmd::Command;
use common::Project;
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("vendor-builder").unwrap()
}

#[test]
fn no_arguments_prints_usage_and_fails() {
    cli()
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn help_succeeds() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("openssl"))
        .stdout(predicate::str::contains("tlsssl"));
}

#[test]
fn driver_needs_build_or_package() {
    cli().args(["openssl", "--skip"]).assert().code(1);
}

#[test]
fn unknown_python_target_is_rejected() {
    cli()
        .args(["python", "--target", "4", "-b"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected 2 or 3"));
}

#[test]
fn missing_settings_file_fails() {
    let project = Project::new();
    cli()
        .current_dir(project.temp.path())
        .args(["openssl", "-b"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("reading settings file"));
}

#[test]
fn quiet_suppresses_error_output() {
    let project = Project::new();
    cli()
        .current_dir(project.temp.path())
        .args(["-q", "openssl", "-b"])
        .assert()
        .code(1)
        .stderr(predicate::str::is_empty());
}

#[test]
fn missing_key_is_reported() {
    let project = Project::new();
    let stubs = project.install_stubs();
    let config = project.write_settings(&format!(
        "openssl_build_dir = \"build/openssl\"\n\
         base_install_path = \"/Library/ITOps\"\n\
         pkgid = \"com.example\"\n\
         {stubs}"
    ));
    cli()
        .arg("--config")
        .arg(&config)
        .args(["openssl", "-p"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("openssl_version"));
}

#[test]
fn package_only_run_writes_package() {
    let project = Project::new();
    let stubs = project.install_stubs();
    let config = project.write_settings(&format!(
        "openssl_build_dir = \"build/openssl\"\n\
         base_install_path = \"/Library/ITOps\"\n\
         openssl_version = \"1.1.0f\"\n\
         pkgid = \"com.example\"\n\
         sign_cert_cn = \"Developer ID Installer: Example\"\n\
         {stubs}"
    ));
    cli()
        .arg("--config")
        .arg(&config)
        .args(["openssl", "-p", "-v"])
        .assert()
        .success()
        .stdout(predicate::str::contains("openssl packaged properly"));

    assert!(project.root().join("openssl/openssl-1.1.0f.pkg").is_file());
    let pkgbuild = project.calls("pkgbuild");
    assert_eq!(pkgbuild.len(), 1);
    assert!(pkgbuild[0].contains("--sign Developer ID Installer: Example "));
}

#[test]
fn openssl_install_alone_needs_build_output() {
    let project = Project::new();
    let config = project.write_settings(&format!(
        "openssl_build_dir = \"build/openssl\"\n\
         base_install_path = \"{}\"\n",
        project.root().join("base").display()
    ));
    cli()
        .arg("--config")
        .arg(&config)
        .args(["openssl", "--install"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("OpenSSL build output must exist"));
    assert!(!project.root().join("base/openssl").exists());
}
