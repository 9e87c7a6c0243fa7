//! Snapshot storage implementation.

use crate::copier::{copy_tree, CopyOptions, CopyStats};
use crate::diff::{diff_trees, TreeDiff};
use crate::tree::{walk, TreeSummary};
use crate::{CreatedSnapshot, SnapshotError, SnapshotId, SnapshotInfo, SnapshotResult};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Upper bound on ids probed while reserving a snapshot directory.
const MAX_RESERVE_ATTEMPTS: u32 = 1024;

/// Number of entries currently in the metadata directory.
///
/// This is the identifier the next snapshot will get. The directory must
/// exist; a missing or unreadable directory is reported as
/// [`SnapshotError::MetadataUnavailable`].
pub async fn next_version(metadata_dir: &Path) -> SnapshotResult<u64> {
    let unavailable = |source: io::Error| SnapshotError::MetadataUnavailable {
        path: metadata_dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(metadata_dir).await.map_err(unavailable)?;
    let mut count = 0;
    while entries.next_entry().await.map_err(unavailable)?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// Directory of snapshot `id`. Does not check that it exists.
pub fn snapshot_path(metadata_dir: &Path, id: SnapshotId) -> PathBuf {
    metadata_dir.join(id.dir_name())
}

/// Canonical form of `path`, which need not exist yet.
///
/// `.` and `..` are removed first; then the longest existing ancestor is
/// canonicalized and the missing tail is appended as is.
async fn resolve_existing(path: &Path) -> io::Result<PathBuf> {
    let normalized = nvc_util::path::normalize(path);
    let mut tail = Vec::new();
    let mut current = normalized.as_path();

    loop {
        match fs::canonicalize(current).await {
            Ok(mut resolved) => {
                resolved.extend(tail.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (current.parent(), current.file_name()) else {
                    return Err(e);
                };
                tail.push(name.to_os_string());
                current = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            Err(e) => return Err(e),
        }
    }
}

/// Storage for numbered tree snapshots.
///
/// Every snapshot is a full, independent copy of the working tree:
/// ```text
/// work_root/
///   .nvc/            # metadata directory, never copied
///     0/             # snapshot 0
///     1/             # snapshot 1
///   src/ ...
/// ```
pub struct SnapshotStore {
    /// Directory holding one subdirectory per snapshot.
    metadata_dir: PathBuf,

    /// Tree that gets snapshotted.
    work_root: PathBuf,

    /// Where restores land.
    restore_root: PathBuf,

    /// Copy options. Always excludes the metadata directory name.
    options: CopyOptions,
}

impl SnapshotStore {
    /// Create a snapshot store.
    ///
    /// # Arguments
    /// * `metadata_dir` - Directory holding the snapshots (e.g. `.nvc`)
    /// * `work_root` - Tree to snapshot; also the default restore destination
    /// * `options` - Copy options; the metadata directory name is added to
    ///   the exclusions
    pub fn new(metadata_dir: PathBuf, work_root: PathBuf, mut options: CopyOptions) -> Self {
        if let Some(name) = metadata_dir.file_name() {
            options.exclusions.insert(name.to_os_string());
        }

        Self {
            metadata_dir,
            restore_root: work_root.clone(),
            work_root,
            options,
        }
    }

    /// Restore into `root` instead of the working tree.
    pub fn with_restore_root(mut self, root: PathBuf) -> Self {
        self.restore_root = root;
        self
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn restore_root(&self) -> &Path {
        &self.restore_root
    }

    /// Identifier the next snapshot would get.
    pub async fn next_version(&self) -> SnapshotResult<u64> {
        next_version(&self.metadata_dir).await
    }

    /// Directory of snapshot `id`.
    pub fn snapshot_path(&self, id: SnapshotId) -> PathBuf {
        snapshot_path(&self.metadata_dir, id)
    }

    /// Claim a snapshot id by creating its directory.
    ///
    /// Starts at the current entry count and moves up while the directory
    /// already exists, so concurrent callers never share an id.
    async fn reserve(&self) -> SnapshotResult<SnapshotId> {
        let mut candidate = self.next_version().await?;

        for _ in 0..MAX_RESERVE_ATTEMPTS {
            let id = SnapshotId(candidate);
            match fs::create_dir(self.snapshot_path(id)).await {
                Ok(()) => {
                    debug!(snapshot = %id, "Reserved snapshot id");
                    return Ok(id);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(snapshot = %id, "Snapshot id taken, trying next");
                    candidate += 1;
                }
                Err(e) => {
                    return Err(SnapshotError::MetadataUnavailable {
                        path: self.metadata_dir.clone(),
                        source: e,
                    })
                }
            }
        }

        Err(SnapshotError::ReservationExhausted {
            attempts: MAX_RESERVE_ATTEMPTS,
        })
    }

    /// Snapshot the working tree.
    ///
    /// On a copy error the error is returned as is; the partially written
    /// snapshot directory stays on disk.
    pub async fn create(&self) -> SnapshotResult<CreatedSnapshot> {
        let id = self.reserve().await?;
        let path = self.snapshot_path(id);

        let stats = copy_tree(&self.work_root, &path, &self.options)
            .await
            .map_err(|e| {
                warn!(snapshot = %id, path = %path.display(), "Snapshot incomplete");
                e
            })?;

        info!(
            "Created snapshot {} ({} files, {} bytes)",
            id, stats.files, stats.bytes
        );

        Ok(CreatedSnapshot { id, path, stats })
    }

    /// Restore snapshot `id` into the configured restore root.
    pub async fn restore(&self, id: SnapshotId) -> SnapshotResult<CopyStats> {
        self.restore_into(id, &self.restore_root).await
    }

    /// Restore snapshot `id` into `dest`.
    ///
    /// Valid ids are `0..next_version()`; anything else is rejected before
    /// any file is touched.
    pub async fn restore_into(&self, id: SnapshotId, dest: &Path) -> SnapshotResult<CopyStats> {
        let src = self.existing_snapshot(id).await?;
        if resolve_existing(dest).await?.starts_with(fs::canonicalize(&src).await?) {
            return Err(SnapshotError::DestinationInsideSnapshot {
                id,
                dest: dest.to_path_buf(),
            });
        }

        let stats = copy_tree(&src, dest, &self.options).await?;

        info!(
            "Restored snapshot {} into {} ({} files)",
            id,
            dest.display(),
            stats.files
        );

        Ok(stats)
    }

    /// Describe snapshot `id`.
    pub async fn info(&self, id: SnapshotId) -> SnapshotResult<SnapshotInfo> {
        let path = self.snapshot_path(id);
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => metadata,
            Ok(_) => return Err(SnapshotError::not_found(id.dir_name())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::not_found(id.dir_name()))
            }
            Err(e) => return Err(e.into()),
        };

        let entries = walk(&path, &self.options.exclusions).await?;

        Ok(SnapshotInfo {
            id,
            created_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            summary: TreeSummary::from_entries(&entries),
            path,
        })
    }

    /// List all snapshots, oldest first.
    ///
    /// Entries of the metadata directory that are not snapshot directories
    /// are ignored.
    pub async fn list(&self) -> SnapshotResult<Vec<SnapshotInfo>> {
        let mut snapshots = Vec::new();

        for id in self.ids().await? {
            match self.info(id).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!("Failed to load snapshot {}: {}", id, e),
            }
        }

        Ok(snapshots)
    }

    /// Most recent snapshot, if any.
    pub async fn latest(&self) -> SnapshotResult<Option<SnapshotId>> {
        Ok(self.ids().await?.into_iter().max())
    }

    /// Compare snapshot `id` (old side) with the tree at `against` (new side).
    pub async fn diff(
        &self,
        id: SnapshotId,
        against: &Path,
        with_patch: bool,
    ) -> SnapshotResult<TreeDiff> {
        let src = self.existing_snapshot(id).await?;
        let diff = diff_trees(&src, against, &self.options.exclusions, with_patch).await?;

        debug!(
            snapshot = %id,
            changes = diff.changes.len(),
            unchanged = diff.unchanged,
            "Computed snapshot diff"
        );

        Ok(diff)
    }

    /// Ids of all snapshot directories, ascending.
    async fn ids(&self) -> SnapshotResult<Vec<SnapshotId>> {
        let unavailable = |source: io::Error| SnapshotError::MetadataUnavailable {
            path: self.metadata_dir.clone(),
            source,
        };

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.metadata_dir)
            .await
            .map_err(unavailable)?;
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(SnapshotId::from_dir_name) else {
                debug!("Ignoring foreign entry {:?} in metadata directory", name);
                continue;
            };
            if entry.file_type().await?.is_dir() {
                ids.push(id);
            } else {
                debug!("Ignoring non-directory {:?} in metadata directory", name);
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Range-check `id` and return its directory.
    async fn existing_snapshot(&self, id: SnapshotId) -> SnapshotResult<PathBuf> {
        let available = self.next_version().await?;
        if id.get() >= available {
            return Err(SnapshotError::VersionOutOfRange {
                requested: id.get(),
                available,
            });
        }

        let path = self.snapshot_path(id);
        if !fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(SnapshotError::not_found(id.dir_name()));
        }
        Ok(path)
    }
}
