//! Startup behaviour of the `pdfimg` binary.
#![cfg(feature = "cli")]

use std::process::Command;

fn pdfimg() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pdfimg"));
    cmd.env_remove("TINYPNG_API_KEY")
        .env_remove("TINIFY_API_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_missing_api_key_is_fatal_before_usage() {
    let out = pdfimg().output().unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("TINYPNG_API_KEY"), "stderr: {stderr}");
}

#[test]
fn test_missing_api_key_does_not_touch_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("1.pdf");
    std::fs::write(&pdf, b"%PDF-1.4").unwrap();

    let out = pdfimg().arg(&pdf).output().unwrap();

    assert!(!out.status.success());
    assert!(pdf.exists());
    assert!(!dir.path().join("1").exists());
}

#[test]
fn test_no_arguments_prints_usage() {
    let out = pdfimg().env("TINYPNG_API_KEY", "k").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Usage"), "stdout: {stdout}");
}

#[test]
fn test_skips_only_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("notes.txt");
    std::fs::write(&txt, b"hi").unwrap();

    let out = pdfimg()
        .env("TINYPNG_API_KEY", "k")
        .arg("--json")
        .arg(&txt)
        .output()
        .unwrap();

    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["files"][0]["outcome"]["state"], "skipped_not_pdf");
}

#[test]
fn test_failed_file_sets_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("2.pdf");

    let out = pdfimg()
        .env("TINYPNG_API_KEY", "k")
        .arg("--quiet")
        .arg(&missing)
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
}
