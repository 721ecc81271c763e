//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("pulsewatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Self-hosted HTTP endpoint latency monitoring",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("pulsewatch")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("pulsewatch"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("pulsewatch")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_stats_subcommand_exists() {
    Command::cargo_bin("pulsewatch")
        .unwrap()
        .args(["stats", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("window-hours"));
}

#[test]
fn test_predict_subcommand_exists() {
    Command::cargo_bin("pulsewatch")
        .unwrap()
        .args(["predict", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("sma"));
}

#[test]
fn test_stats_runs_against_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pulsewatch.toml");
    let db_path = dir.path().join("test.db");
    std::fs::write(
        &config_path,
        format!("db_path = \"{}\"\n", db_path.display()),
    )
    .unwrap();

    Command::cargo_bin("pulsewatch")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "stats"])
        .assert()
        .success()
        .stdout(predicates::str::contains("samples"));
}
