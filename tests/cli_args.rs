//! Integration tests for the hydrate-cache binary
//!
//! Covers argument handling and the snapshot-driven commands, which never
//! need the network.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

const SNAPSHOT: &str = r#"{"/api/broken":{"data":null,"error":{"message":"HTTP status 500 for /api/broken"}},"/api/people":{"data":[{"first":"Ada","last":"Lovelace","email":"ada@example.com","address":"12 St James's Square","created":"1843-07-10","balance":"$1,843.00"}],"error":null}}"#;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_hydrate-cache"))
        .args(args)
        .output()
        .expect("Failed to execute hydrate-cache")
}

fn write_snapshot(dir: &TempDir) -> String {
    let path = dir.path().join("snapshot.json");
    fs::write(&path, SNAPSHOT).expect("Failed to write snapshot");
    path.to_string_lossy().into_owned()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hydrate-cache"));
    assert!(stdout.contains("preload"));
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("get"));
}

#[test]
fn test_invalid_base_url_prints_error_and_exits() {
    let output = run_cli(&["preload", "/api/people", "--base-url", "localhost"]);
    assert!(!output.status.success(), "Expected invalid base URL to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid base URL"),
        "Should print error message about the base URL: {}",
        stderr
    );
}

#[test]
fn test_inspect_lists_entries() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let snapshot = write_snapshot(&dir);

    let output = run_cli(&["inspect", &snapshot, "--people"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "/api/broken\terror\tHTTP status 500 for /api/broken");
    assert_eq!(lines[1], "/api/people\tok\t1 records");
}

#[test]
fn test_inspect_malformed_snapshot_fails() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("bad.json");
    fs::write(&path, "{oops").unwrap();

    let output = run_cli(&["inspect", &path.to_string_lossy()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse cache snapshot"), "{}", stderr);
}

#[test]
fn test_get_reads_from_snapshot_without_network() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let snapshot = write_snapshot(&dir);
    let session_dir = dir.path().join("session");

    // No base URL is configured, so any network fetch of a relative URL fails.
    let output = run_cli(&[
        "get",
        "/api/people",
        "--people",
        "--snapshot",
        &snapshot,
        "--session-dir",
        &session_dir.to_string_lossy(),
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"first\": \"Ada\""));
    assert!(session_dir.join("cache.json").exists());
}

#[test]
fn test_get_restores_from_session_on_second_run() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let snapshot = write_snapshot(&dir);
    let session_dir = dir.path().join("session");
    let session_dir = session_dir.to_string_lossy();

    let first = run_cli(&["get", "/api/people", "--snapshot", &snapshot, "--session-dir", &session_dir]);
    assert!(first.status.success());

    let second = run_cli(&["get", "/api/people", "--session-dir", &session_dir]);

    assert!(second.status.success(), "{}", String::from_utf8_lossy(&second.stderr));
    assert!(String::from_utf8_lossy(&second.stdout).contains("Lovelace"));
}

#[test]
fn test_get_cached_error_exits_with_message() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let snapshot = write_snapshot(&dir);

    let output = run_cli(&["get", "/api/broken", "--snapshot", &snapshot, "--no-session"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("HTTP status 500 for /api/broken"), "{}", stderr);
}

#[test]
fn test_get_relative_url_without_base_reports_error() {
    let output = run_cli(&["get", "/api/people", "--no-session"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("relative URL"), "{}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use hydrate_cache::cli::{parse_base_url_arg, Cli, Command, SessionLocation, StartupConfig};

    #[test]
    fn test_cli_inspect_parses_path() {
        let cli = Cli::parse_from(["hydrate-cache", "inspect", "snap.json"]);
        match cli.command {
            Command::Inspect { snapshot, people } => {
                assert_eq!(snapshot.to_string_lossy(), "snap.json");
                assert!(!people);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_base_url_arg_trims_trailing_slash() {
        assert_eq!(
            parse_base_url_arg("http://localhost:3000/").unwrap(),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_startup_config_get_defaults_to_user_cache() {
        let cli = Cli::parse_from(["hydrate-cache", "get", "/api/people"]);
        match cli.command {
            Command::Get { session, fetch, .. } => {
                let config = StartupConfig::from_args(&fetch, Some(&session)).unwrap();
                assert_eq!(config.session, SessionLocation::UserCache);
                assert_eq!(config.cache.session_key, "cache");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_startup_config_rejects_zero_timeout() {
        let cli = Cli::parse_from(["hydrate-cache", "preload", "/a", "--timeout", "0"]);
        match cli.command {
            Command::Preload { fetch, .. } => {
                assert!(StartupConfig::from_args(&fetch, None).is_err());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
