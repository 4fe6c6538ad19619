//! Integration tests for CLI argument handling
//!
//! Runs the binary for commands that never touch the network.

use std::process::Command;

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cachefetch"))
        .args(args)
        .env_remove("CACHEFETCH_LOG")
        .output()
        .expect("Failed to execute cachefetch")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cachefetch"), "Help should mention cachefetch");
    assert!(stdout.contains("get"), "Help should mention the get command");
    assert!(stdout.contains("purge"), "Help should mention the purge command");
}

#[test]
fn test_get_without_keys_fails() {
    let output = run_cli(&["get"]);
    assert!(!output.status.success());
}

#[test]
fn test_evict_before_stale_prints_error_and_exits() {
    let output = run_cli(&["--memory", "--stale-after", "60", "--evict-after", "30", "inspect", "users/1"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("evict_after"), "Should explain the bad option: {}", stderr);
}

#[test]
fn test_inspect_unknown_key_reports_missing() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "inspect", "users/1"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"missing\""), "Unexpected output: {}", stdout);
}

#[test]
fn test_clear_and_purge_on_empty_cache() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().unwrap();

    let output = run_cli(&["--cache-dir", dir, "clear"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "cleared 0 entries");

    let output = run_cli(&["--cache-dir", dir, "purge"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "purged 0 entries");
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use cachefetch::cli::{Cli, Command, RunConfig, StoreChoice};
    use clap::Parser;

    #[test]
    fn test_cli_inspect_keys() {
        let cli = Cli::parse_from(["cachefetch", "inspect", "users/1"]);
        assert_eq!(
            cli.command,
            Command::Inspect {
                keys: vec!["users/1".to_string()]
            }
        );
    }

    #[test]
    fn test_run_config_memory_store() {
        let cli = Cli::parse_from(["cachefetch", "--memory", "purge"]);
        let config = RunConfig::from_cli(&cli);
        assert!(config.is_ok());
        assert_eq!(config.unwrap().store, StoreChoice::Memory);
    }

    #[test]
    fn test_run_config_default_timings() {
        let cli = Cli::parse_from(["cachefetch", "--memory", "purge"]);
        let config = RunConfig::from_cli(&cli).unwrap();
        assert_eq!(config.fetch, cachefetch::FetchConfig::default());
    }
}
