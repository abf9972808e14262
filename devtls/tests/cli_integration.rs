//! CLI Integration Tests
//!
//! Drives the devtls binary against a throwaway `DEVTLS_HOME`. Nothing here
//! touches real browser trust stores.

use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use devtls_core::ca::LocalCaStore;
use devtls_core::router::RoutingSnippet;
use tempfile::TempDir;

fn run_devtls(args: &[&str], devtls_home: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_devtls"))
        .args(args)
        .env("DEVTLS_HOME", devtls_home)
        .env_remove("DEVTLS_CAROOT")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to run devtls command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn create_ca(devtls_home: &Path) {
    LocalCaStore::new(devtls_home.join("ca"))
        .create()
        .expect("create CA");
}

fn read_snippet(project_dir: &Path) -> RoutingSnippet {
    let content = fs::read_to_string(project_dir.join("routing.yaml")).unwrap();
    RoutingSnippet::parse(&content).expect("routing snippet parses")
}

#[test]
fn ca_path_prints_root_under_home() {
    let home = TempDir::new().unwrap();
    let output = run_devtls(&["ca", "path"], home.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output).trim(),
        home.path().join("ca").display().to_string()
    );
}

#[test]
fn ca_path_honors_caroot_override() {
    let home = TempDir::new().unwrap();
    let caroot = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_devtls"))
        .args(["ca", "path"])
        .env("DEVTLS_HOME", home.path())
        .env("DEVTLS_CAROOT", caroot.path())
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run devtls command");

    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        caroot.path().display().to_string()
    );
}

#[test]
fn ca_uninstall_without_install_is_a_no_op() {
    let home = TempDir::new().unwrap();
    create_ca(home.path());

    let output = run_devtls(&["ca", "uninstall"], home.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Nothing to do"));
    // Files are left alone when nothing was recorded as installed
    assert!(home.path().join("ca").join("rootCA.pem").exists());
}

#[test]
fn ca_check_without_ca_fails() {
    let home = TempDir::new().unwrap();
    let output = run_devtls(&["ca", "check"], home.path());

    assert!(!output.status.success());
    assert!(stderr(&output).contains("devtls ca install"));
}

#[test]
fn cert_issue_without_ca_fails() {
    let home = TempDir::new().unwrap();
    let output = run_devtls(&["cert", "issue", "shop", "shop.localhost"], home.path());

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No local CA found"));
    assert!(!home.path().join("ca").join("shop").exists());
}

#[test]
fn cert_issue_for_router_writes_split_files_and_snippet() {
    let home = TempDir::new().unwrap();
    create_ca(home.path());

    let output = run_devtls(
        &["cert", "issue", "shop", "shop.localhost", "127.0.0.1"],
        home.path(),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let dir = home.path().join("ca").join("shop");
    assert!(dir.join("cert.pem").exists());
    assert!(dir.join("key.pem").exists());
    let snippet = read_snippet(&dir);
    let entry = &snippet.tls.certificates[0];
    assert_eq!(entry.cert_file, "/mnt/devtls/certs/shop/cert.pem");
    assert_eq!(entry.key_file, "/mnt/devtls/certs/shop/key.pem");
}

#[test]
fn cert_issue_uses_configured_router_root() {
    let home = TempDir::new().unwrap();
    create_ca(home.path());
    fs::write(
        home.path().join("config.toml"),
        "router_cert_root = \"/certs\"\n",
    )
    .unwrap();

    let output = run_devtls(&["cert", "issue", "shop", "shop.localhost"], home.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let snippet = read_snippet(&home.path().join("ca").join("shop"));
    assert_eq!(
        snippet.tls.certificates[0].cert_file,
        "/certs/shop/cert.pem"
    );
}

#[test]
fn cert_issue_for_web_server_writes_combined_file_only() {
    let home = TempDir::new().unwrap();
    create_ca(home.path());

    let output = run_devtls(
        &[
            "cert",
            "issue",
            "blog",
            "blog.localhost",
            "--consumer",
            "web-server",
        ],
        home.path(),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let dir = home.path().join("ca").join("blog");
    let combined = fs::read_to_string(dir.join("combined.pem")).unwrap();
    assert!(combined.contains("BEGIN CERTIFICATE"));
    assert!(combined.contains("BEGIN PRIVATE KEY"));
    assert!(!dir.join("cert.pem").exists());
    assert!(!dir.join("routing.yaml").exists());
}

#[test]
fn cert_issue_with_certificate_only_ca_fails() {
    let home = TempDir::new().unwrap();
    create_ca(home.path());
    fs::remove_file(home.path().join("ca").join("rootCA-key.pem")).unwrap();

    let output = run_devtls(&["cert", "issue", "shop", "shop.localhost"], home.path());

    assert!(!output.status.success());
    assert!(stderr(&output).contains("no private key"));
}

#[test]
fn cert_issue_rejects_path_like_project() {
    let home = TempDir::new().unwrap();
    create_ca(home.path());

    let output = run_devtls(&["cert", "issue", "../escape", "x.localhost"], home.path());

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid project name"));
}

/// Puts a `certutil` that accepts every command on an otherwise empty PATH,
/// and an NSS database under a throwaway HOME.
#[cfg(unix)]
fn fake_trust_environment(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let bin = root.join("bin");
    fs::create_dir_all(&bin).unwrap();
    let certutil = bin.join("certutil");
    fs::write(&certutil, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&certutil, fs::Permissions::from_mode(0o755)).unwrap();

    let user_home = root.join("user");
    let nssdb = user_home.join(".pki").join("nssdb");
    fs::create_dir_all(&nssdb).unwrap();
    fs::write(nssdb.join("cert9.db"), b"").unwrap();

    (bin, user_home)
}

#[cfg(unix)]
#[test]
fn ca_install_force_replaces_ca_with_unreadable_key() {
    use std::os::unix::fs::PermissionsExt;

    let home = TempDir::new().unwrap();
    create_ca(home.path());
    let store = LocalCaStore::new(home.path().join("ca"));
    let key_path = store.key_path();
    fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600)).unwrap();
    fs::write(&key_path, "garbage").unwrap();
    assert!(store.load().is_err());

    let env = TempDir::new().unwrap();
    let (bin, user_home) = fake_trust_environment(env.path());
    let output = Command::new(env!("CARGO_BIN_EXE_devtls"))
        .args(["ca", "install", "--force"])
        .env("DEVTLS_HOME", home.path())
        .env("HOME", &user_home)
        .env("PATH", &bin)
        .env_remove("DEVTLS_CAROOT")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run devtls command");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Could not read the previous CA"));
    let ca = store.load().unwrap().expect("new CA on disk");
    assert!(ca.can_sign());
    let config = fs::read_to_string(home.path().join("config.toml")).unwrap();
    assert!(config.contains("ca_installed = true"));
}
