//! CLI integration tests.
//!
//! These tests exercise the nvc binary end-to-end against temporary trees.

use nvc_test_utils::assertions::{assert_file_equals, assert_tree_eq};
use nvc_test_utils::TestProject;
use std::path::Path;
use std::process::{Command, Output};

/// Run nvc in `root` with an isolated global config.
fn nvc(root: &Path, args: &[&str]) -> Output {
    let config_home = tempfile::tempdir().expect("Failed to create config dir");

    Command::new(env!("CARGO_BIN_EXE_nvc"))
        .args(args)
        .current_dir(root)
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env_remove("NVC_CONFIG_CONTENT")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute nvc")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_command() {
    let project = TestProject::new().build();
    let output = nvc(project.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("snap"));
    assert!(stdout.contains("checkout"));
}

#[test]
fn test_snap_creates_numbered_snapshots() {
    let project = TestProject::new()
        .with_file("a.txt", "a")
        .with_file("src/lib.rs", "pub fn f() {}")
        .build();

    let first = nvc(project.path(), &["snap"]);
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    assert!(stdout(&first).contains("Snapshot 0 created"));
    assert!(stderr(&first).contains("Creating repository.."));

    let second = nvc(project.path(), &["backup"]);
    assert!(second.status.success());
    assert!(stdout(&second).contains("Snapshot 1 created"));
    assert!(!stderr(&second).contains("Creating repository"));

    assert_eq!(project.snapshot_dirs(), vec!["0", "1"]);
    assert!(!project.path().join(".nvc/1/.nvc").exists());
    assert_eq!(project.read_file(".nvc/1/src/lib.rs"), "pub fn f() {}");
}

#[test]
fn test_checkout_restores_tree() {
    let project = TestProject::new()
        .with_file("a.txt", "original")
        .with_file("dir/b.txt", "b")
        .build();

    assert!(nvc(project.path(), &["snap"]).status.success());
    project.write_file("a.txt", "edited");
    project.delete_file("dir/b.txt");
    assert!(!project.file_exists("dir/b.txt"));

    let output = nvc(project.path(), &["checkout", "0"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Snapshot 0 restored"));
    assert_file_equals(&project.path().join("a.txt"), "original");
    assert_file_equals(&project.path().join("dir/b.txt"), "b");
}

#[test]
fn test_checkout_into_snapshot_is_rejected() {
    let project = TestProject::new().with_file("a.txt", "a").build();
    assert!(nvc(project.path(), &["snap"]).status.success());

    let output = nvc(project.path(), &["checkout", "0", "--into", ".nvc/0/x"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("inside the snapshot"));
    assert!(!project.file_exists(".nvc/0/x"));
}

#[test]
fn test_checkout_into_directory() {
    let project = TestProject::new()
        .with_file("a.txt", "a")
        .with_file("dir/b.txt", "b")
        .build();
    let dest = TestProject::new().build();

    assert!(nvc(project.path(), &["snap"]).status.success());

    let into = dest.path().join("out");
    let output = nvc(
        project.path(),
        &["checkout", "0", "--into", into.to_str().unwrap()],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    assert_tree_eq(project.path(), &into, &[".nvc"]);
}

#[test]
fn test_checkout_uses_configured_restore_dir() {
    let project = TestProject::new()
        .with_file("a.txt", "a")
        .with_config(r#"{ "restore_dir": "working" }"#)
        .build();

    assert!(nvc(project.path(), &["snap"]).status.success());
    let output = nvc(project.path(), &["checkout", "0"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    assert_eq!(project.read_file("working/a.txt"), "a");
}

#[test]
fn test_checkout_out_of_range_fails() {
    let project = TestProject::new().with_file("a.txt", "a").build();
    assert!(nvc(project.path(), &["snap"]).status.success());
    assert!(nvc(project.path(), &["snap"]).status.success());

    let output = nvc(project.path(), &["checkout", "2"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("doesn't exist yet"));

    let output = nvc(project.path(), &["checkout", "1"]);
    assert!(output.status.success());
}

#[test]
fn test_unknown_command() {
    let project = TestProject::new().build();

    let output = nvc(project.path(), &["commit"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unrecognised command"));

    let output = nvc(project.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unrecognised command"));
}

#[test]
fn test_metadata_path_is_a_file() {
    let project = TestProject::new().with_file(".nvc", "not a dir").build();

    let output = nvc(project.path(), &["snap"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("is not a directory"));
}

#[test]
fn test_current_and_log() {
    let project = TestProject::new().with_file("a.txt", "a").build();

    let output = nvc(project.path(), &["current"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No snapshots yet."));

    assert!(nvc(project.path(), &["snap"]).status.success());
    assert!(nvc(project.path(), &["snap"]).status.success());

    let output = nvc(project.path(), &["current"]);
    assert_eq!(stdout(&output).trim(), "1");

    let output = nvc(project.path(), &["log", "--json"]);
    assert!(output.status.success());
    let snapshots: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let snapshots = snapshots.as_array().unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0]["id"], 0);
    assert_eq!(snapshots[1]["summary"]["files"], 1);
}

#[test]
fn test_diff_against_working_tree() {
    let project = TestProject::new()
        .with_file("keep.txt", "same")
        .with_file("edit.txt", "one\n")
        .build();

    assert!(nvc(project.path(), &["snap"]).status.success());
    project.write_file("edit.txt", "two\n");
    project.write_file("new.txt", "new");

    let output = nvc(project.path(), &["diff", "0", "--patch"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = stdout(&output);
    assert!(stdout.contains("M edit.txt"));
    assert!(stdout.contains("A new.txt"));
    assert!(stdout.contains("+two"));
    assert!(!stdout.contains("keep.txt"));
}

#[test]
fn test_branch_is_a_no_op() {
    let project = TestProject::new().build();

    let output = nvc(project.path(), &["branch"]);
    assert!(output.status.success());
    assert!(project.snapshot_dirs().is_empty());
}
