//! Integration tests for the vfetch binary

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run vfetch with an isolated HOME and no VFETCH_* variables.
fn vfetch(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vfetch"))
        .args(args)
        .env("HOME", home)
        .env_remove("VFETCH_URL")
        .env_remove("VFETCH_TOKEN")
        .env_remove("VFETCH_TMP_DIR")
        .env_remove("VFETCH_BLOCK_SIZE_MB")
        .env_remove("VFETCH_MOUNT")
        .output()
        .expect("Failed to execute vfetch")
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    let output = vfetch(home.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("mount"));
    assert!(stdout.contains("probe"));
    assert!(stdout.contains("config"));
}

#[test]
fn test_mount_help_lists_flags() {
    let home = TempDir::new().unwrap();
    let output = vfetch(home.path(), &["mount", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for flag in [
        "--url",
        "--tmp-dir",
        "--token",
        "--blocksize",
        "--mount-point",
        "--debug",
    ] {
        assert!(stdout.contains(flag), "missing {flag}");
    }
}

#[test]
fn test_config_show_defaults() {
    let home = TempDir::new().unwrap();
    let output = vfetch(home.path(), &["config", "show"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    let parsed: vfetch_config::Config = toml::from_str(&stdout).expect("valid TOML");
    assert_eq!(parsed.cache.block_size_mb, 8);
    assert_eq!(parsed.fetch.max_attempts, 3);
    assert!(stdout.contains("[remote]"));
    assert!(stdout.contains("[fetch]"));
}

#[test]
fn test_config_show_layers_explicit_file_and_env() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("vfetch.toml");
    std::fs::write(
        &file,
        "[remote]\nurl = \"https://objects.example.com/disk.img\"\ntoken = \"hunter2\"\n\n[cache]\nblock_size_mb = 4\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_vfetch"))
        .args(["config", "show", "--config"])
        .arg(&file)
        .env("HOME", home.path())
        .env("VFETCH_BLOCK_SIZE_MB", "16")
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    let parsed: vfetch_config::Config = toml::from_str(&stdout).unwrap();
    assert_eq!(parsed.remote.url, "https://objects.example.com/disk.img");
    assert_eq!(parsed.cache.block_size_mb, 16);
    assert!(!stdout.contains("hunter2"));
}

#[test]
fn test_config_path() {
    let home = TempDir::new().unwrap();
    let output = vfetch(home.path(), &["config", "path"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Global:"));
    assert!(stdout.contains(".vfetch/config.toml"));
    assert!(stdout.contains("Explicit: (none)"));
}

#[test]
fn test_mount_requires_url() {
    let home = TempDir::new().unwrap();
    let mnt = home.path().join("mnt");
    let output = vfetch(
        home.path(),
        &["mount", "--mount-point", mnt.to_str().unwrap()],
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("remote url is required"));
}

#[test]
fn test_mount_rejects_zero_blocksize() {
    let home = TempDir::new().unwrap();
    let mnt = home.path().join("mnt");
    let output = vfetch(
        home.path(),
        &[
            "mount",
            "--url",
            "http://127.0.0.1:9/disk.img",
            "--mount-point",
            mnt.to_str().unwrap(),
            "--blocksize",
            "0",
        ],
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("block_size_mb must be at least 1"));
}

#[test]
fn test_probe_rejects_relative_url() {
    let home = TempDir::new().unwrap();
    let output = vfetch(home.path(), &["probe", "--url", "/not/absolute"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Invalid remote URL"));
}

#[test]
fn test_probe_unreachable_remote_fails() {
    let home = TempDir::new().unwrap();
    // Port 9 (discard) is closed on test machines.
    let output = vfetch(home.path(), &["probe", "--url", "http://127.0.0.1:9/disk.img"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to probe"));
}
