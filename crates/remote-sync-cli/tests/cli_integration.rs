//! CLI subprocess integration tests.
//!
//! These tests run the `remote-sync` binary against a directory-backed remote
//! and shell-command database hooks, checking exit codes and JSON output.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

struct Site {
    dir: tempfile::TempDir,
}

impl Site {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("web/uploads/2024")).unwrap();
        fs::write(root.join("web/uploads/2024/photo.jpg"), "jpeg").unwrap();
        fs::write(root.join("db.sql"), "INSERT INTO posts VALUES (1);").unwrap();
        fs::write(
            root.join("remote-sync.toml"),
            r#"system_name = "Test Site"
environment = "ci"
app_version = "2.0.1"
local_dir = "sync"

[provider]
kind = "filesystem"
root = "remote"

[database]
dump_command = "cp db.sql \"$REMOTE_SYNC_PATH\""
restore_command = "cp \"$REMOTE_SYNC_PATH\" db.sql"

[[volumes]]
handle = "uploads"
path = "web/uploads"
"#,
        )
        .unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> PathBuf {
        self.root().join("remote-sync.toml")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_remote-sync"))
            .arg("--config")
            .arg(self.config())
            .args(args)
            .env_remove("REMOTE_SYNC_CONFIG")
            .output()
            .unwrap()
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let mut full = vec!["--json"];
        full.extend_from_slice(args);
        let output = self.run(&full);
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_remote-sync"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("remote-sync"));
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_remote-sync"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["push-database", "pull-volumes", "list-databases", "delete-volume"] {
        assert!(stdout.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn completions_need_no_config() {
    let output = Command::new(env!("CARGO_BIN_EXE_remote-sync"))
        .args(["completions", "bash"])
        .current_dir(std::env::temp_dir())
        .env_remove("REMOTE_SYNC_CONFIG")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(!output.stdout.is_empty());
}

#[test]
fn missing_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_remote-sync"))
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("list-databases")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("config error"));
}

#[test]
fn config_from_environment_variable() {
    let site = Site::new();
    let output = Command::new(env!("CARGO_BIN_EXE_remote-sync"))
        .arg("list-databases")
        .env("REMOTE_SYNC_CONFIG", site.config())
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no database backups found"));
}

#[test]
fn database_push_list_pull_delete() {
    let site = Site::new();

    let pushed = site.json(&["push-database"]);
    let filename = pushed["filename"].as_str().unwrap().to_owned();
    assert!(filename.starts_with("test-site_ci_"), "{filename}");
    assert!(filename.ends_with("_v2.0.1.sql"), "{filename}");
    assert!(site.root().join("remote").join(&filename).is_file());

    let listed = site.json(&["list-databases"]);
    let options = listed.as_array().unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0]["value"], filename.as_str());
    assert!(options[0]["label"].as_str().unwrap().ends_with(" (ci)"));

    fs::write(site.root().join("db.sql"), "DELETE FROM posts;").unwrap();
    let pulled = site.json(&["pull-database", &filename]);
    assert_eq!(pulled["filename"], filename.as_str());
    assert_eq!(
        fs::read_to_string(site.root().join("db.sql")).unwrap(),
        "INSERT INTO posts VALUES (1);"
    );
    assert_eq!(
        fs::read_to_string(site.root().join("sync/emergency-backup.sql")).unwrap(),
        "DELETE FROM posts;"
    );

    let deleted = site.json(&["delete-database", &filename]);
    assert_eq!(deleted["deleted"], filename.as_str());
    assert!(site.json(&["list-databases"]).as_array().unwrap().is_empty());
}

#[test]
fn volumes_push_and_pull_without_emergency_backup() {
    let site = Site::new();

    let pushed = site.json(&["push-volumes"]);
    let filename = pushed["filename"].as_str().unwrap().to_owned();
    assert!(filename.ends_with(".zip"));

    fs::remove_dir_all(site.root().join("web/uploads")).unwrap();
    let pulled = site.json(&["pull-volumes", "--no-emergency-backup", &filename]);
    assert_eq!(pulled["restored_volumes"][0], "uploads");
    assert!(pulled.get("emergency_backup").is_none());
    assert_eq!(
        fs::read_to_string(site.root().join("web/uploads/2024/photo.jpg")).unwrap(),
        "jpeg"
    );
    assert!(!site.root().join("sync/emergency-backup.zip").exists());
}

#[test]
fn pulling_missing_backup_exits_three() {
    let site = Site::new();
    let output = site.run(&["pull-database", "test-site_240101_000000_abc_v1.sql"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
    // The emergency dump is taken before the transfer is attempted.
    assert!(site.root().join("sync/emergency-backup.sql").is_file());
}

#[test]
fn delete_rejects_wrong_kind() {
    let site = Site::new();
    let output = site.run(&["delete-volume", "test-site_240101_000000_abc_v1.sql"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn failing_dump_command_exits_one() {
    let site = Site::new();
    fs::remove_file(site.root().join("db.sql")).unwrap();
    let output = site.run(&["push-database"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("database dump failed"));
    let remote = site.root().join("remote");
    assert!(!remote.exists() || fs::read_dir(remote).unwrap().next().is_none());
}
