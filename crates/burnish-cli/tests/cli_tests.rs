//! Integration tests for the Burnish CLI
//!
//! These tests verify the CLI behavior without a real drive. Write tests run
//! against fake backends: shell scripts named `cdrecord` placed in a search
//! directory configured through `--config-file`.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a command for the burnish binary
#[allow(deprecated)]
fn burnish() -> Command {
    Command::cargo_bin("burnish").unwrap()
}

/// Helper to set up config file for tests in a cross-platform way.
/// Returns (temp_dir, config_file)
fn setup_config_test() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("burnish_config.toml");
    (temp_dir, config_file)
}

/// Write a fake backend script and a config pointing at its directory
#[cfg(unix)]
fn setup_fake_backend(body: &str) -> (TempDir, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let (temp_dir, config_file) = setup_config_test();
    let bin_dir = temp_dir.path().join("bin");
    fs::create_dir(&bin_dir).unwrap();

    let script = bin_dir.join("cdrecord");
    let contents = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"-version\" ]; then\n\
         echo 'Cdrecord-Clone 2.01.01a20 (x86_64-pc-linux-gnu) Copyright (C) 1995-2004 Joerg Schilling'\n\
         exit 0\n\
         fi\n\
         {}",
        body
    );
    fs::write(&script, contents).unwrap();
    let mut perms = fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).unwrap();

    write_search_path_config(&config_file, &bin_dir);
    (temp_dir, config_file)
}

fn write_search_path_config(config_file: &Path, bin_dir: &Path) {
    fs::write(
        config_file,
        format!(
            "[writer]\neject = false\n\n[programs]\nsearch_paths = [\"{}\"]\n",
            bin_dir.display()
        ),
    )
    .unwrap();
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    burnish()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cdrecord or wodim"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("write"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn test_version_flag() {
    burnish()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("burnish"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_help() {
    burnish()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_write_help() {
    burnish()
        .args(["write", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<DEVICE>"))
        .stdout(predicate::str::contains("--cue"))
        .stdout(predicate::str::contains("--simulate"))
        .stdout(predicate::str::contains("--backend"))
        .stdout(predicate::str::contains("--json"));
}

// ============================================================================
// Write Argument Tests
// ============================================================================

#[test]
fn test_write_missing_device() {
    burnish()
        .arg("write")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<DEVICE>"));
}

#[test]
fn test_write_nothing_to_write() {
    let (_temp_dir, config_file) = setup_config_test();
    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["write", "/dev/sr0", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to write"));
}

#[test]
fn test_write_missing_cue_sheet() {
    let (_temp_dir, config_file) = setup_config_test();
    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["write", "/dev/sr0", "--cue", "/nonexistent/album.cue", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cue sheet not found"));
}

#[test]
fn test_write_invalid_mode() {
    burnish()
        .args(["write", "/dev/sr0", "--mode", "packet", "--", "-data", "x.iso"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown writing mode"));
}

#[test]
fn test_write_invalid_backend() {
    burnish()
        .args(["write", "/dev/sr0", "--backend", "growisofs", "--", "-data", "x.iso"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown backend"));
}

#[test]
fn test_write_eject_flags_conflict() {
    burnish()
        .args(["write", "/dev/sr0", "--eject", "--no-eject", "--", "-data", "x.iso"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
#[cfg(unix)]
fn test_write_no_eject_overrides_config() {
    let (temp_dir, config_file) = setup_fake_backend(
        r#"
echo "$@" > "$(dirname "$0")/args.txt"
exit 0
"#,
    );
    fs::write(
        &config_file,
        format!(
            "[writer]\neject = true\n\n[programs]\nsearch_paths = [\"{}\"]\n",
            temp_dir.path().join("bin").display()
        ),
    )
    .unwrap();

    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["write", "1,0,0", "--json", "--no-eject", "--", "-data", "image.iso"])
        .assert()
        .success();

    let args = fs::read_to_string(temp_dir.path().join("bin").join("args.txt")).unwrap();
    assert!(!args.contains("-eject"));
}

#[test]
#[cfg(unix)]
fn test_write_backend_not_found() {
    let (temp_dir, config_file) = setup_config_test();
    let empty_dir = temp_dir.path().join("empty");
    fs::create_dir(&empty_dir).unwrap();
    write_search_path_config(&config_file, &empty_dir);

    burnish()
        .env("PATH", &empty_dir)
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["write", "/dev/sr0", "--json", "--", "-data", "image.iso"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Could not find cdrecord executable"))
        .stdout(predicate::str::contains(r#"{"event":"finished","data":{"success":false}}"#))
        .stderr(predicate::str::contains("Write failed"));
}

// ============================================================================
// Fake Backend Tests
// ============================================================================

#[test]
#[cfg(unix)]
fn test_write_success_json_events() {
    let (_temp_dir, config_file) = setup_fake_backend(
        r#"
echo "Track 01: data   100 MB        "
echo "Starting new track at sector: 0"
printf 'Track 01:   50 of  100 MB written (fifo 100%%) [buf  99%%]\r'
printf 'Track 01:  100 of  100 MB written (fifo 100%%) [buf  99%%]\r'
echo ""
echo "Fixating..."
exit 0
"#,
    );

    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["write", "0,0,0", "--json", "--", "-data", "image.iso"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"event":"started"}"#))
        .stdout(predicate::str::contains(r#""event":"percent""#))
        .stdout(predicate::str::contains(r#""event":"buffer_fifo""#))
        .stdout(predicate::str::contains("Fixating"))
        .stdout(predicate::str::contains(r#"{"event":"finished","data":{"success":true}}"#));
}

#[test]
#[cfg(unix)]
fn test_write_passes_options_to_backend() {
    let (temp_dir, config_file) = setup_fake_backend(
        r#"
echo "$@" > "$(dirname "$0")/args.txt"
exit 0
"#,
    );

    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args([
            "write", "1,0,0", "--json", "--simulate", "--speed", "8", "--mode", "dao", "--",
            "-data", "image.iso",
        ])
        .assert()
        .success();

    let args = fs::read_to_string(temp_dir.path().join("bin").join("args.txt")).unwrap();
    assert!(args.contains("dev=1,0,0"));
    assert!(args.contains("speed=8"));
    assert!(args.contains("-dao"));
    assert!(args.contains("-dummy"));
    assert!(args.trim_end().ends_with("-data image.iso"));
}

#[test]
#[cfg(unix)]
fn test_write_backend_failure_reports_cause() {
    let (_temp_dir, config_file) = setup_fake_backend(
        r#"
echo "cdrecord: shmget failed: Invalid argument" >&2
exit 255
"#,
    );

    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["write", "/dev/sr0", "--json", "--", "-data", "image.iso"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "could not reserve shared memory segment",
        ))
        .stdout(predicate::str::contains(r#"{"event":"finished","data":{"success":false}}"#))
        .stderr(predicate::str::contains("ShmgetFailed"));
}

#[test]
#[cfg(unix)]
fn test_write_silent_success() {
    let (_temp_dir, config_file) = setup_fake_backend("exit 0\n");

    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["--silent", "write", "/dev/sr0", "--", "-data", "image.iso"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_help() {
    burnish()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration"))
        .stdout(predicate::str::contains("--init"))
        .stdout(predicate::str::contains("--path"));
}

#[test]
fn test_config_shows_defaults() {
    let (_temp_dir, config_file) = setup_config_test();
    burnish()
        .args(["--config-file", config_file.to_str().unwrap(), "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[writer]"))
        .stdout(predicate::str::contains("burnfree = true"))
        .stdout(predicate::str::contains("not found, using defaults"));
}

#[test]
fn test_config_path_flag() {
    let (_temp_dir, config_file) = setup_config_test();
    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("burnish_config.toml"));
}

#[test]
fn test_config_json_output() {
    let (_temp_dir, config_file) = setup_config_test();
    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"writer\""))
        .stdout(predicate::str::contains("\"search_paths\""));
}

#[test]
fn test_config_init_creates_file() {
    let (_temp_dir, config_file) = setup_config_test();

    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    let contents = fs::read_to_string(&config_file).unwrap();
    assert!(contents.contains("[writer]"));
    assert!(contents.contains("buffer_size_mb"));
}

#[test]
fn test_config_init_existing_file() {
    let (_temp_dir, config_file) = setup_config_test();
    fs::write(&config_file, "[writer]\ndefault_speed = 4\n").unwrap();

    burnish()
        .args(["--config-file", config_file.to_str().unwrap()])
        .args(["config", "--init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    let contents = fs::read_to_string(&config_file).unwrap();
    assert!(contents.contains("default_speed = 4"));
}

// ============================================================================
// Completions Tests
// ============================================================================

#[test]
fn test_completions_bash() {
    burnish()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("burnish"));
}

#[test]
fn test_completions_invalid_shell() {
    burnish()
        .args(["completions", "notashell"])
        .assert()
        .failure();
}
