//! Smoke tests to verify command wiring

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SECRET_VARS: [&str; 8] = [
    "DATABASE_URL",
    "STRIPE_SECRET_KEY",
    "STRIPE_WEBHOOK_SECRET",
    "SHIPDAY_API_KEY",
    "SHIPDAY_WEBHOOK_TOKEN",
    "EMAIL_API_KEY",
    "MEALDASH_ADMIN_TOKEN",
    "MEALDASH_STOREFRONT_TOKEN",
];

/// `mealdash` running in an empty directory with no secrets in the environment.
fn mealdash(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mealdash").unwrap();
    cmd.current_dir(dir.path())
        .env("MEALDASH_CONFIG", dir.path().join("config.toml"))
        .env_remove("RUST_LOG");
    for var in SECRET_VARS {
        cmd.env_remove(var);
    }
    cmd
}

// === Help ===

#[test]
fn test_top_level_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("prep"));
}

#[test]
fn test_serve_help() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Address to bind to"));
}

#[test]
fn test_prep_help() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .args(["prep", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("business timezone"));
}

// === Config ===

#[test]
fn test_config_path_honours_env() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_then_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir).args(["config", "init"]).assert().success();
    let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(written.contains("[business]"));

    mealdash(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    mealdash(&dir).args(["config", "init", "--force"]).assert().success();
}

#[test]
fn test_config_show_masks_secrets() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .env("STRIPE_SECRET_KEY", "sk_live_do_not_print")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("sk_live_do_not_print").not());
}

#[test]
fn test_config_validate_reports_missing_secrets() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_bad_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[server\nbind = 1").unwrap();
    mealdash(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

// === Database commands without a database ===

#[test]
fn test_migrate_without_database_url() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL not set"));
}

#[test]
fn test_prep_rejects_bad_date() {
    let dir = TempDir::new().unwrap();
    mealdash(&dir)
        .args(["prep", "--date", "next-tuesday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--date"));
}
