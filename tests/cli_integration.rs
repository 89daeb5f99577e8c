//! CLI integration tests for capgen.
//!
//! These tests drive the `capgen` binary end to end: probe files in,
//! manifests and diagnostics out.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const IOS_SIMULATOR: &str = "x86_64-apple-ios-simulator";

/// Get the capgen binary command, isolated from any user config.
fn capgen(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("capgen").unwrap();
    cmd.env("HOME", home).current_dir(home);
    cmd
}

/// Create a temporary directory for test runs.
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn ios_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/x86_64-apple-ios-simulator.h")
}

/// A small probe file that resolves cleanly for `triple`, plus `extra`
/// probe lines.
fn write_probes(dir: &Path, file: &str, triple: &str, extra: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(
        &path,
        format!(
            r#"[target]
triple = "{}"

[probes]
SIZEOF_INT = 4
SIZEOF_LONG = 8
SIZEOF_LONG_LONG = 8
SIZEOF_OFF_T = 8
HAVE_DLOPEN = true
{}
"#,
            triple, extra
        ),
    )
    .unwrap();
    path
}

// ============================================================================
// capgen compile
// ============================================================================

#[test]
fn test_compile_header_replay() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .arg("compile")
        .arg(ios_fixture())
        .args(["--target", IOS_SIMULATOR])
        .assert()
        .success()
        .stdout(predicate::str::contains("#ifndef CAPGEN_CONFIG_H"))
        .stdout(predicate::str::contains("#define HAVE_FORK 1\n"))
        .stdout(predicate::str::contains("#define SIZEOF_VOID_P 8\n"))
        .stdout(predicate::str::contains("/* #undef HAVE_NCURSESW */"))
        .stderr(predicate::str::contains("error").not());
}

#[test]
fn test_compile_generated_header_logs_target() {
    let tmp = temp_dir();
    let header = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/pyconfig-x86_64.h");

    capgen(tmp.path())
        .arg("compile")
        .arg(header)
        .args(["--target", IOS_SIMULATOR, "--no-comments"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#define _GNU_SOURCE 1\n"))
        .stdout(predicate::str::contains("#define __EXTENSIONS__ 1\n"))
        .stdout(predicate::str::contains("/* #undef _POSIX_SOURCE */"))
        .stderr(predicate::str::contains(
            "compiled x86_64-apple-ios-simulator (0 diagnostics, success)",
        ));
}

#[test]
fn test_compile_is_deterministic() {
    let tmp = temp_dir();

    let run = || {
        capgen(tmp.path())
            .arg("compile")
            .arg(ios_fixture())
            .args(["--target", IOS_SIMULATOR])
            .output()
            .unwrap()
            .stdout
    };
    let first = run();
    assert!(!first.is_empty());
    assert_eq!(first, run());
}

#[test]
fn test_compile_reads_target_from_probe_file() {
    let tmp = temp_dir();
    let probes = write_probes(tmp.path(), "linux.toml", "aarch64-unknown-linux-gnu", "");

    capgen(tmp.path())
        .arg("compile")
        .arg(&probes)
        .assert()
        .success()
        .stdout(predicate::str::contains("aarch64-unknown-linux-gnu (64-bit, little-endian)"))
        .stdout(predicate::str::contains("#define HAVE_DYNAMIC_LOADING 1\n"))
        .stdout(predicate::str::contains("#define HAVE_LARGEFILE_SUPPORT 1").not());
}

#[test]
fn test_compile_requires_a_target() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .arg("compile")
        .arg(ios_fixture())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no target given"));
}

#[test]
fn test_compile_reports_unresolved_conflict() {
    let tmp = temp_dir();
    let probes = write_probes(
        tmp.path(),
        "conflict.toml",
        "aarch64-unknown-linux-gnu",
        "HAVE_GETHOSTBYNAME_R_5_ARG = true\nHAVE_GETHOSTBYNAME_R_6_ARG = true",
    );

    capgen(tmp.path())
        .arg("compile")
        .arg(&probes)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error[unresolved-conflict] gethostbyname_r: "))
        .stderr(predicate::str::contains("could not compile manifest"));
}

#[test]
fn test_compile_reports_every_diagnostic() {
    let tmp = temp_dir();
    let probes = write_probes(
        tmp.path(),
        "broken.toml",
        "aarch64-unknown-linux-gnu",
        "HAVE_GETHOSTBYNAME_R_5_ARG = true\nHAVE_GETHOSTBYNAME_R_6_ARG = true\nHAVE_WIDGETS = true\nSIZEOF_SHORT = \"two\"",
    );

    capgen(tmp.path())
        .arg("compile")
        .arg(&probes)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[unresolved-conflict] gethostbyname_r"))
        .stderr(predicate::str::contains("error[unknown-fact] HAVE_WIDGETS"))
        .stderr(predicate::str::contains("error[type-mismatch] SIZEOF_SHORT"));
}

#[test]
fn test_compile_pointer_width_override() {
    let tmp = temp_dir();

    // The recorded probes are for a 64-bit target
    capgen(tmp.path())
        .arg("compile")
        .arg(ios_fixture())
        .args(["--target", IOS_SIMULATOR, "--pointer-width", "32"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[invariant-violation] SIZEOF_VOID_P"))
        .stderr(predicate::str::contains("error[invariant-violation] SIZEOF_SIZE_T"));
}

#[test]
fn test_compile_json() {
    let tmp = temp_dir();

    let output = capgen(tmp.path())
        .arg("compile")
        .arg(ios_fixture())
        .args(["--target", IOS_SIMULATOR, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["target"]["triple"], IOS_SIMULATOR);
    assert_eq!(doc["target"]["pointer_width"], 64);
    assert!(doc["facts"].as_array().unwrap().len() > 600);
}

#[test]
fn test_compile_digest_and_output_file() {
    let tmp = temp_dir();
    let out = tmp.path().join("pyconfig.h");

    capgen(tmp.path())
        .arg("compile")
        .arg(ios_fixture())
        .args(["--target", IOS_SIMULATOR, "--digest", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_match("sha256:[0-9a-f]{64}").unwrap());

    let header = fs::read_to_string(&out).unwrap();
    assert!(header.ends_with("#endif /* CAPGEN_CONFIG_H */\n"));
}

#[test]
fn test_compile_guard_from_config_and_flag() {
    let tmp = temp_dir();
    fs::create_dir_all(tmp.path().join(".capgen")).unwrap();
    fs::write(
        tmp.path().join(".capgen/config.toml"),
        "[emit]\nguard = \"PYCONFIG_H\"\ncomments = false\n",
    )
    .unwrap();

    capgen(tmp.path())
        .arg("compile")
        .arg(ios_fixture())
        .args(["--target", IOS_SIMULATOR])
        .assert()
        .success()
        .stdout(predicate::str::contains("#ifndef PYCONFIG_H"))
        .stdout(predicate::str::contains("Default thread stack size").not());

    capgen(tmp.path())
        .arg("compile")
        .arg(ios_fixture())
        .args(["--target", IOS_SIMULATOR, "--guard", "OTHER_H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#ifndef OTHER_H"));
}

#[test]
fn test_compile_policy_flags() {
    let tmp = temp_dir();
    let probes = tmp.path().join("no-dlopen.toml");
    fs::write(
        &probes,
        "[target]\ntriple = \"aarch64-unknown-linux-gnu\"\n\n[probes]\nSIZEOF_LONG = 8\nSIZEOF_LONG_LONG = 8\nSIZEOF_OFF_T = 8\n",
    )
    .unwrap();

    capgen(tmp.path())
        .arg("compile")
        .arg(&probes)
        .assert()
        .success();

    capgen(tmp.path())
        .arg("compile")
        .arg(&probes)
        .args(["--require", "HAVE_DYNAMIC_LOADING"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[derivation-failed] HAVE_DYNAMIC_LOADING"));

    capgen(tmp.path())
        .arg("compile")
        .arg(&probes)
        .args(["--require", "HAVE_FORK"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid resolve policy"));
}

// ============================================================================
// capgen batch
// ============================================================================

#[test]
fn test_batch_writes_one_manifest_per_target() {
    let tmp = temp_dir();
    let probes = tmp.path().join("probes");
    fs::create_dir(&probes).unwrap();
    write_probes(&probes, "a.toml", "aarch64-unknown-linux-gnu", "");
    write_probes(&probes, "b.toml", "i686-pc-windows-msvc", "");

    capgen(tmp.path())
        .args(["batch", "probes/*.toml", "--out-dir", "out"])
        .assert()
        .success();

    let linux = fs::read_to_string(tmp.path().join("out/aarch64-unknown-linux-gnu.h")).unwrap();
    assert!(linux.contains("#define SIZEOF_VOID_P 8\n"));
    let windows = fs::read_to_string(tmp.path().join("out/i686-pc-windows-msvc.h")).unwrap();
    assert!(windows.contains("#define SIZEOF_VOID_P 4\n"));
}

#[test]
fn test_batch_fails_if_any_target_fails() {
    let tmp = temp_dir();
    write_probes(tmp.path(), "good.toml", "aarch64-unknown-linux-gnu", "");
    write_probes(
        tmp.path(),
        "bad.toml",
        "x86_64-unknown-linux-gnu",
        "HAVE_NCURSES = true\nHAVE_NCURSESW = false\nHAVE_PANELW = true",
    );

    capgen(tmp.path())
        .args(["batch", "*.toml", "--out-dir", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[invariant-violation] HAVE_PANELW"))
        .stderr(predicate::str::contains("1 of 2 target(s) failed: x86_64-unknown-linux-gnu"));

    assert!(tmp.path().join("out/aarch64-unknown-linux-gnu.h").exists());
    assert!(!tmp.path().join("out/x86_64-unknown-linux-gnu.h").exists());
}

#[test]
fn test_batch_rejects_duplicate_targets() {
    let tmp = temp_dir();
    write_probes(tmp.path(), "a.toml", "aarch64-unknown-linux-gnu", "");
    write_probes(tmp.path(), "b.toml", "aarch64-unknown-linux-gnu", "");

    capgen(tmp.path())
        .args(["batch", "*.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("both describe target aarch64-unknown-linux-gnu"));
}

#[test]
fn test_batch_no_matches() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["batch", "*.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no probe files match"));
}

// ============================================================================
// capgen explain / registry / completions
// ============================================================================

#[test]
fn test_explain_conflict_member() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["explain", "HAVE_NCURSESW"])
        .assert()
        .success()
        .stdout(predicate::str::contains("category: library"))
        .stdout(predicate::str::contains("Conflict groups:"))
        .stdout(predicate::str::contains("prefer HAVE_NCURSESW > HAVE_NCURSES"))
        .stdout(predicate::str::contains("panelw-needs-ncursesw"));
}

#[test]
fn test_explain_derived_fact() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["explain", "SIZEOF_VOID_P"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Derived by (required rule):"))
        .stdout(predicate::str::contains("target pointer width in bytes"));
}

#[test]
fn test_explain_follows_policy_overrides() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["explain", "HAVE_LARGEFILE_SUPPORT", "--advisory", "HAVE_LARGEFILE_SUPPORT"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Derived by (advisory rule, overridden by policy):"));

    fs::create_dir_all(tmp.path().join(".capgen")).unwrap();
    fs::write(
        tmp.path().join(".capgen/config.toml"),
        "[policy]\nrequired = [\"WITH_EDITLINE\"]\n",
    )
    .unwrap();

    capgen(tmp.path())
        .args(["explain", "WITH_EDITLINE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Derived by (required rule, overridden by policy):"));

    capgen(tmp.path())
        .args(["explain", "WITH_EDITLINE", "--require", "HAVE_FORK"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid resolve policy"));
}

#[test]
fn test_explain_unknown_fact() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["explain", "have_ncursesw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean `HAVE_NCURSESW`?"));
}

#[test]
fn test_registry_check_builtin() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["registry", "--check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: schema 1.0.0"));
}

#[test]
fn test_registry_lists_category() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["registry", "--category", "derived"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Derived facts (6)"))
        .stdout(predicate::str::contains("SIZEOF_VOID_P (integer)"))
        .stdout(predicate::str::contains("HAVE_FORK").not());
}

#[test]
fn test_registry_rejects_invalid_catalog() {
    let tmp = temp_dir();
    let catalog = tmp.path().join("catalog.toml");
    fs::write(
        &catalog,
        r#"schema = "1.0.0"

[[section]]
category = "derived"
facts = ["A", "B"]

[[rule]]
output = "A"
kind = "any_of"
inputs = ["B"]

[[rule]]
output = "B"
kind = "any_of"
inputs = ["A"]
"#,
    )
    .unwrap();

    capgen(tmp.path())
        .args(["registry", "--check"])
        .arg(&catalog)
        .assert()
        .failure()
        .stderr(predicate::str::contains("A -> B -> A").or(predicate::str::contains("B -> A -> B")))
        .stderr(predicate::str::contains("is not a valid registry"));
}

#[test]
fn test_completions() {
    let tmp = temp_dir();

    capgen(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("capgen"));
}
