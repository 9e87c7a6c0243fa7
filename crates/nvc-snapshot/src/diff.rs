//! Comparison of a snapshot with another tree.

use crate::tree::{walk, EntryKind, Exclusions, TreeEntry};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// How a path differs between the two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    /// Same contents, different permission bits.
    ModeChanged,
    /// File became a directory, link became a file, ...
    TypeChanged,
}

impl ChangeKind {
    /// One-letter status marker.
    pub fn marker(&self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Removed => 'D',
            ChangeKind::Modified => 'M',
            ChangeKind::ModeChanged => 'P',
            ChangeKind::TypeChanged => 'T',
        }
    }
}

/// A single differing path.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    /// Path relative to both roots.
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Unified diff of the contents, when requested and applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// Differences between an old and a new tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeDiff {
    /// Changed paths, sorted.
    pub changes: Vec<Change>,
    /// Number of paths present and identical on both sides.
    pub unchanged: usize,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compare `old_root` with `new_root`.
///
/// Files and symlinks are reported when added or removed; directories only
/// when their permissions or kind change, since their contents already
/// show up individually.
pub async fn diff_trees(
    old_root: &Path,
    new_root: &Path,
    exclusions: &Exclusions,
    with_patch: bool,
) -> io::Result<TreeDiff> {
    let old = index(walk(old_root, exclusions).await?);
    let new = index(walk(new_root, exclusions).await?);

    let paths: BTreeSet<&PathBuf> = old.keys().chain(new.keys()).collect();
    let mut diff = TreeDiff::default();

    for path in paths {
        let kind = match (old.get(path), new.get(path)) {
            (Some(o), None) if !o.is_dir() => Some(ChangeKind::Removed),
            (None, Some(n)) if !n.is_dir() => Some(ChangeKind::Added),
            (Some(o), Some(n)) => compare(o, n, old_root, new_root).await?,
            _ => None,
        };

        let Some(kind) = kind else {
            if old.contains_key(path) && new.contains_key(path) {
                diff.unchanged += 1;
            }
            continue;
        };

        let patch = if with_patch {
            patch_for(path, kind, old_root, new_root).await?
        } else {
            None
        };

        diff.changes.push(Change {
            path: path.clone(),
            kind,
            patch,
        });
    }

    Ok(diff)
}

fn index(entries: Vec<TreeEntry>) -> BTreeMap<PathBuf, TreeEntry> {
    entries
        .into_iter()
        .map(|entry| (entry.path.clone(), entry))
        .collect()
}

async fn compare(
    old: &TreeEntry,
    new: &TreeEntry,
    old_root: &Path,
    new_root: &Path,
) -> io::Result<Option<ChangeKind>> {
    if old.kind != new.kind {
        return Ok(Some(ChangeKind::TypeChanged));
    }

    let old_path = old_root.join(&old.path);
    let new_path = new_root.join(&new.path);

    let same_contents = match old.kind {
        EntryKind::File => {
            old.len == new.len && fs::read(&old_path).await? == fs::read(&new_path).await?
        }
        EntryKind::Symlink => fs::read_link(&old_path).await? == fs::read_link(&new_path).await?,
        EntryKind::Directory | EntryKind::Other => true,
    };

    Ok(if !same_contents {
        Some(ChangeKind::Modified)
    } else if old.mode != new.mode && old.kind != EntryKind::Symlink {
        Some(ChangeKind::ModeChanged)
    } else {
        None
    })
}

async fn patch_for(
    path: &Path,
    kind: ChangeKind,
    old_root: &Path,
    new_root: &Path,
) -> io::Result<Option<String>> {
    let (old, new) = match kind {
        ChangeKind::Added => (Vec::new(), read_file(&new_root.join(path)).await?),
        ChangeKind::Removed => (read_file(&old_root.join(path)).await?, Vec::new()),
        ChangeKind::Modified => (
            read_file(&old_root.join(path)).await?,
            read_file(&new_root.join(path)).await?,
        ),
        ChangeKind::ModeChanged | ChangeKind::TypeChanged => return Ok(None),
    };

    Ok(Some(match (String::from_utf8(old), String::from_utf8(new)) {
        (Ok(old), Ok(new)) => generate_diff(&old, &new, path),
        _ => format!(
            "Binary files a/{} and b/{} differ\n",
            path.display(),
            path.display()
        ),
    }))
}

/// Contents of a regular file, empty for symlinks.
async fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    if fs::symlink_metadata(path).await?.is_file() {
        fs::read(path).await
    } else {
        Ok(Vec::new())
    }
}

/// Generate a unified diff between two strings.
pub fn generate_diff(old: &str, new: &str, path: &Path) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- a/{}\n", path.display()));
    output.push_str(&format!("+++ b/{}\n", path.display()));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}
