//! Integration tests for CLI argument handling
//!
//! Runs the binary with credentials stripped from the environment, from an empty
//! directory so no `.env` file is picked up.

use std::process::Command;

const CREDENTIAL_VARS: [&str; 5] = [
    "AHWS_CLIENT_ID",
    "AHWS_CLIENT_SECRET",
    "AHWS_USERNAME",
    "AHWS_PASSWORD",
    "AHWS_APIM_SUBSCRIPTION_KEY",
];

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut command = Command::new(env!("CARGO_BIN_EXE_venueboard"));
    command.args(args).current_dir(dir.path());
    for var in CREDENTIAL_VARS {
        command.env_remove(var);
    }
    command.output().expect("Failed to execute venueboard")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("venueboard"), "Help should mention venueboard");
    assert!(stdout.contains("--cache-level"), "Help should list --cache-level");
    assert!(stdout.contains("AHWS_CLIENT_ID"), "Help should name env fallbacks");
}

#[test]
fn test_missing_credentials_exit_with_error() {
    let output = run_cli(&[]);
    assert!(!output.status.success(), "Expected missing credentials to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("AHWS_CLIENT_ID"),
        "Should name the missing setting: {}",
        stderr
    );
}

#[test]
fn test_invalid_cache_level_rejected() {
    let output = run_cli(&["--cache-level", "everything"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("everything"), "Should echo the bad value: {}", stderr);
}

#[test]
fn test_invalid_timezone_exits_with_error() {
    let output = run_cli(&[
        "--client-id",
        "id",
        "--username",
        "user",
        "--password",
        "pass",
        "--subscription-key",
        "key",
        "--timezone",
        "Nowhere/Special",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Nowhere/Special"), "stderr: {}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use venueboard::cli::{Cli, Config, ConfigError};
    use venueboard::data::CacheLevel;

    #[test]
    fn test_cli_parses_cache_levels() {
        for (arg, level) in [
            ("none", CacheLevel::None),
            ("auth", CacheLevel::Auth),
            ("all", CacheLevel::All),
        ] {
            let cli = Cli::parse_from(["venueboard", "--cache-level", arg]);
            assert_eq!(cli.cache_level, level);
        }
    }

    #[test]
    fn test_config_requires_subscription_key() {
        let cli = Cli::parse_from([
            "venueboard",
            "--client-id",
            "id",
            "--username",
            "user",
            "--password",
            "pass",
        ]);
        let result = Config::from_cli(&cli);
        assert!(matches!(
            result,
            Err(ConfigError::Missing("AHWS_APIM_SUBSCRIPTION_KEY"))
        ));
    }

    #[test]
    fn test_keepalive_flag() {
        let cli = Cli::parse_from(["venueboard", "--token-keepalive-secs", "600"]);
        assert_eq!(cli.token_keepalive_secs, Some(600));
    }
}
