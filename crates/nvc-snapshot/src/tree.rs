//! Tree entries, exclusions and read-only traversal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fs::{FileType, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Mask for the owner/group/other rwx bits.
pub const PERMISSION_MASK: u32 = 0o777;

/// Kind of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Sockets, fifos, devices. Never copied.
    Other,
}

impl From<FileType> for EntryKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// One node of a tree being copied or compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Low 9 permission bits.
    pub mode: u32,
    /// Size in bytes as reported by the filesystem.
    pub len: u64,
}

impl TreeEntry {
    /// Stat `path` without following symlinks.
    pub async fn inspect(path: &Path) -> io::Result<Self> {
        let metadata = fs::symlink_metadata(path).await?;
        Ok(Self::from_metadata(path.to_path_buf(), &metadata))
    }

    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        Self {
            path,
            kind: metadata.file_type().into(),
            mode: permission_bits(metadata),
            len: metadata.len(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Directory names that traversal never descends into.
///
/// Matching is by exact entry name at any depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    names: BTreeSet<OsString>,
}

impl Exclusions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude directories called `name`.
    pub fn with(mut self, name: impl Into<OsString>) -> Self {
        self.insert(name);
        self
    }

    pub fn insert(&mut self, name: impl Into<OsString>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &OsStr) -> bool {
        self.names.contains(name)
    }

    /// Whether an entry called `name` of kind `kind` is left out.
    ///
    /// Directories and symlinks are matched, so a metadata directory that
    /// is itself a link never shows up in a copy. Regular files keep their
    /// name even when it matches.
    pub fn skips(&self, name: &OsStr, kind: EntryKind) -> bool {
        matches!(kind, EntryKind::Directory | EntryKind::Symlink) && self.contains(name)
    }
}

impl<S: Into<OsString>> FromIterator<S> for Exclusions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Counts describing a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    /// Total size of regular files.
    pub bytes: u64,
}

impl TreeSummary {
    pub fn from_entries(entries: &[TreeEntry]) -> Self {
        entries
            .iter()
            .fold(Self::default(), |mut summary, entry| {
                match entry.kind {
                    EntryKind::File => {
                        summary.files += 1;
                        summary.bytes += entry.len;
                    }
                    EntryKind::Directory => summary.directories += 1,
                    EntryKind::Symlink => summary.symlinks += 1,
                    EntryKind::Other => {}
                }
                summary
            })
    }
}

/// List every node below `root`, with paths relative to `root`.
///
/// Excluded directories are left out together with their contents. The
/// result is sorted by path.
pub async fn walk(root: &Path, exclusions: &Exclusions) -> io::Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut pending = vec![PathBuf::new()];

    while let Some(relative) = pending.pop() {
        let mut dir = fs::read_dir(root.join(&relative)).await?;
        while let Some(child) = dir.next_entry().await? {
            let name = child.file_name();
            let metadata = fs::symlink_metadata(child.path()).await?;
            let entry = TreeEntry::from_metadata(relative.join(&name), &metadata);

            if exclusions.skips(&name, entry.kind) {
                continue;
            }
            if entry.is_dir() {
                pending.push(entry.path.clone());
            }
            entries.push(entry);
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[cfg(unix)]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & PERMISSION_MASK
}

#[cfg(not(unix))]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Set exactly `mode` on `path`, regardless of the process umask.
#[cfg(unix)]
pub(crate) async fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode & PERMISSION_MASK)).await
}

#[cfg(not(unix))]
pub(crate) async fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path).await?.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, permissions).await
}
