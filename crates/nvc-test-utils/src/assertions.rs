//! Custom assertion helpers for common test patterns.
//!
//! Provides functions for making filesystem assertions more readable
//! and providing better error messages.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Assert that a file's content equals expected text exactly.
pub fn assert_file_equals(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    if content != expected {
        panic!(
            "File {} content does not match expected.\n{}",
            path.display(),
            line_diff(expected, &content)
        );
    }
}

/// Assert the low 9 permission bits of `path`.
#[cfg(unix)]
pub fn assert_mode(path: &Path, expected: u32) {
    use std::os::unix::fs::PermissionsExt;

    let actual = fs::symlink_metadata(path)
        .unwrap_or_else(|e| panic!("Failed to stat {}: {}", path.display(), e))
        .permissions()
        .mode()
        & 0o777;

    assert_eq!(
        actual,
        expected,
        "Mode of {} is {:o}, expected {:o}",
        path.display(),
        actual,
        expected
    );
}

/// What a node looks like, for tree comparison.
#[derive(Debug, PartialEq, Eq)]
enum Node {
    Dir { mode: u32 },
    File { mode: u32, contents: Vec<u8> },
    Link { target: PathBuf },
}

/// Assert that two trees hold the same paths, contents and permissions.
///
/// Directories whose name is in `ignore` are skipped at any depth on both
/// sides. The roots themselves are not compared.
pub fn assert_tree_eq(left: &Path, right: &Path, ignore: &[&str]) {
    let left_nodes = collect(left, ignore);
    let right_nodes = collect(right, ignore);

    if left_nodes == right_nodes {
        return;
    }

    let mut report = String::new();
    for (path, node) in &left_nodes {
        match right_nodes.get(path) {
            None => report.push_str(&format!("  only in left:  {}\n", path.display())),
            Some(other) if other != node => {
                report.push_str(&format!("  differs:       {}\n", path.display()))
            }
            Some(_) => {}
        }
    }
    for path in right_nodes.keys() {
        if !left_nodes.contains_key(path) {
            report.push_str(&format!("  only in right: {}\n", path.display()));
        }
    }

    panic!(
        "Trees {} and {} differ:\n{}",
        left.display(),
        right.display(),
        report
    );
}

fn collect(root: &Path, ignore: &[&str]) -> BTreeMap<PathBuf, Node> {
    let mut nodes = BTreeMap::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(relative) = pending.pop() {
        let dir = root.join(&relative);
        let entries = fs::read_dir(&dir)
            .unwrap_or_else(|e| panic!("Failed to read directory {}: {}", dir.display(), e));

        for entry in entries {
            let entry = entry.unwrap_or_else(|e| panic!("Failed to read entry: {}", e));
            let path = relative.join(entry.file_name());
            let full_path = entry.path();
            let metadata = fs::symlink_metadata(&full_path)
                .unwrap_or_else(|e| panic!("Failed to stat {}: {}", full_path.display(), e));

            let node = if metadata.file_type().is_symlink() {
                Node::Link {
                    target: fs::read_link(&full_path).unwrap_or_default(),
                }
            } else if metadata.is_dir() {
                if ignore.iter().any(|name| entry.file_name() == **name) {
                    continue;
                }
                pending.push(path.clone());
                Node::Dir {
                    mode: mode_of(&metadata),
                }
            } else {
                Node::File {
                    mode: mode_of(&metadata),
                    contents: fs::read(&full_path).unwrap_or_else(|e| {
                        panic!("Failed to read file {}: {}", full_path.display(), e)
                    }),
                }
            };
            nodes.insert(path, node);
        }
    }

    nodes
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn line_diff(expected: &str, actual: &str) -> String {
    let diff = similar::TextDiff::from_lines(expected, actual);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        output.push_str(&format!("{}{}", sign, change));
    }

    output
}
