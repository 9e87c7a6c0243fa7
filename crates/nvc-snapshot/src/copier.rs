//! Recursive tree copier.
//!
//! Reproduces a source directory at a destination root, file by file,
//! preserving the low 9 permission bits of every node. All entries of one
//! directory are processed concurrently on the calling task; a directory's
//! destination always exists before anything is copied into it.
//!
//! The returned future resolves once the whole subtree is done. Failures do
//! not stop siblings that are already in flight: every failure is collected
//! and reported together in [`SnapshotError::CopyFailed`]. Nothing is rolled
//! back, so a failed copy can leave a partial tree behind.

use crate::error::{CopyFailure, CopyOperation, SnapshotError, SnapshotResult};
use crate::tree::{apply_mode, EntryKind, Exclusions, TreeEntry};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::ffi::OsString;
use std::io;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default cap on files streamed at the same time.
pub const DEFAULT_MAX_OPEN_FILES: usize = 64;

/// Options for [`copy_tree`].
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Directory names never descended into.
    pub exclusions: Exclusions,
    /// Maximum number of files copied concurrently.
    pub max_open_files: usize,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            exclusions: Exclusions::new(),
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip directories called `name`.
    pub fn exclude(mut self, name: impl Into<OsString>) -> Self {
        self.exclusions.insert(name);
        self
    }

    pub fn max_open_files(mut self, limit: usize) -> Self {
        self.max_open_files = limit.max(1);
        self
    }
}

/// What a copy did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
    pub dirs_created: u64,
    /// Destination directories that already existed and were left as is.
    pub dirs_reused: u64,
    pub symlinks: u64,
    /// Directories skipped by exclusion.
    pub excluded: u64,
    /// Special files that were not copied.
    pub skipped: u64,
}

impl AddAssign for CopyStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.bytes += other.bytes;
        self.dirs_created += other.dirs_created;
        self.dirs_reused += other.dirs_reused;
        self.symlinks += other.symlinks;
        self.excluded += other.excluded;
        self.skipped += other.skipped;
    }
}

/// Result of one branch of the traversal.
#[derive(Debug, Default)]
struct Outcome {
    stats: CopyStats,
    failures: Vec<CopyFailure>,
}

impl Outcome {
    fn failed(failure: CopyFailure) -> Self {
        Self {
            stats: CopyStats::default(),
            failures: vec![failure],
        }
    }

    fn merge(&mut self, other: Outcome) {
        self.stats += other.stats;
        self.failures.extend(other.failures);
    }
}

struct CopyContext<'a> {
    exclusions: &'a Exclusions,
    open_files: &'a Semaphore,
}

/// Copy the contents of `src` into `dest`.
///
/// `dest` is created if missing. Existing destination directories are reused
/// without touching their permissions; existing files are overwritten.
pub async fn copy_tree(
    src: &Path,
    dest: &Path,
    options: &CopyOptions,
) -> SnapshotResult<CopyStats> {
    debug!(src = %src.display(), dest = %dest.display(), "Copying tree");

    fs::create_dir_all(dest).await.map_err(|e| SnapshotError::CopyFailed {
        failures: vec![CopyFailure::new(dest, CopyOperation::CreateDir, e)],
    })?;

    let open_files = Semaphore::new(options.max_open_files.max(1));
    let ctx = CopyContext {
        exclusions: &options.exclusions,
        open_files: &open_files,
    };

    let outcome = copy_dir(&ctx, src.to_path_buf(), dest.to_path_buf()).await;

    if outcome.failures.is_empty() {
        debug!(
            files = outcome.stats.files,
            bytes = outcome.stats.bytes,
            "Tree copied"
        );
        Ok(outcome.stats)
    } else {
        for failure in &outcome.failures {
            warn!("{}", failure);
        }
        warn!(
            dest = %dest.display(),
            failed = outcome.failures.len(),
            copied = outcome.stats.files,
            "Copy incomplete, destination holds a partial tree"
        );
        Err(SnapshotError::CopyFailed {
            failures: outcome.failures,
        })
    }
}

fn copy_dir<'a>(
    ctx: &'a CopyContext<'a>,
    src: PathBuf,
    dest: PathBuf,
) -> BoxFuture<'a, Outcome> {
    async move {
        let names = match list_names(&src).await {
            Ok(names) => names,
            Err(e) => {
                return Outcome::failed(CopyFailure::new(src, CopyOperation::ReadDir, e))
            }
        };

        let branches = names
            .into_iter()
            .map(|name| copy_entry(ctx, &src, &dest, name));

        let mut outcome = Outcome::default();
        for branch in join_all(branches).await {
            outcome.merge(branch);
        }
        outcome
    }
    .boxed()
}

async fn list_names(dir: &Path) -> io::Result<Vec<OsString>> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name());
    }
    Ok(names)
}

async fn copy_entry(
    ctx: &CopyContext<'_>,
    src_dir: &Path,
    dest_dir: &Path,
    name: OsString,
) -> Outcome {
    let src = src_dir.join(&name);
    let dest = dest_dir.join(&name);

    let entry = match TreeEntry::inspect(&src).await {
        Ok(entry) => entry,
        Err(e) => return Outcome::failed(CopyFailure::new(src, CopyOperation::Stat, e)),
    };

    let mut outcome = Outcome::default();
    if ctx.exclusions.skips(&name, entry.kind) {
        debug!(path = %src.display(), "Skipping excluded entry");
        outcome.stats.excluded += 1;
        return outcome;
    }

    match entry.kind {
        EntryKind::File => match copy_file(ctx, &src, &dest, entry.mode).await {
            Ok(bytes) => {
                outcome.stats.files += 1;
                outcome.stats.bytes += bytes;
            }
            Err(failure) => outcome.failures.push(failure),
        },
        EntryKind::Directory => {
            let created = match prepare_dir(&dest, entry.mode).await {
                Ok(created) => created,
                Err(failure) => return Outcome::failed(failure),
            };

            outcome.merge(copy_dir(ctx, src, dest.clone()).await);

            if created {
                outcome.stats.dirs_created += 1;
                // Applied last so read-only directories can still be filled.
                if let Err(e) = apply_mode(&dest, entry.mode).await {
                    outcome
                        .failures
                        .push(CopyFailure::new(dest, CopyOperation::SetPermissions, e));
                }
            } else {
                outcome.stats.dirs_reused += 1;
            }
        }
        EntryKind::Symlink => match copy_symlink(&src, &dest).await {
            Ok(true) => outcome.stats.symlinks += 1,
            Ok(false) => outcome.stats.skipped += 1,
            Err(failure) => outcome.failures.push(failure),
        },
        EntryKind::Other => {
            debug!(path = %src.display(), "Skipping special file");
            outcome.stats.skipped += 1;
        }
    }
    outcome
}

/// Make sure `dest` is a directory. Returns `true` if it was created here.
async fn prepare_dir(dest: &Path, mode: u32) -> Result<bool, CopyFailure> {
    match fs::symlink_metadata(dest).await {
        Ok(metadata) if metadata.is_dir() => return Ok(false),
        Ok(_) => {
            return Err(CopyFailure::new(
                dest,
                CopyOperation::CreateDir,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "destination exists and is not a directory",
                ),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(CopyFailure::new(dest, CopyOperation::Stat, e)),
    }

    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(mode | 0o700);
    #[cfg(not(unix))]
    let _ = mode;

    match builder.create(dest).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(CopyFailure::new(dest, CopyOperation::CreateDir, e)),
    }
}

async fn copy_file(
    ctx: &CopyContext<'_>,
    src: &Path,
    dest: &Path,
    mode: u32,
) -> Result<u64, CopyFailure> {
    // The semaphore lives in copy_tree and is never closed, so this only
    // fails if that ever changes.
    let _permit = ctx.open_files.acquire().await.map_err(|e| {
        CopyFailure::new(src, CopyOperation::Open, io::Error::new(io::ErrorKind::Other, e))
    })?;

    let mut reader = fs::File::open(src)
        .await
        .map_err(|e| CopyFailure::new(src, CopyOperation::Open, e))?;
    let mut writer = open_for_write(dest, mode)
        .await
        .map_err(|e| CopyFailure::new(dest, CopyOperation::Create, e))?;

    let bytes = tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|e| CopyFailure::new(dest, CopyOperation::Write, e))?;
    writer
        .flush()
        .await
        .map_err(|e| CopyFailure::new(dest, CopyOperation::Write, e))?;
    drop(writer);

    apply_mode(dest, mode)
        .await
        .map_err(|e| CopyFailure::new(dest, CopyOperation::SetPermissions, e))?;

    debug!(src = %src.display(), dest = %dest.display(), bytes, "Copied file");
    Ok(bytes)
}

async fn open_for_write(dest: &Path, mode: u32) -> io::Result<fs::File> {
    match create_truncated(dest, mode).await {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            // A read-only file from an earlier copy: replace it.
            match fs::symlink_metadata(dest).await {
                Ok(metadata) if metadata.is_file() => {
                    fs::remove_file(dest).await?;
                    create_truncated(dest, mode).await
                }
                _ => Err(e),
            }
        }
        result => result,
    }
}

async fn create_truncated(dest: &Path, mode: u32) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    options.open(dest).await
}

/// Recreate the link at `dest`. Returns `false` where symlinks are unsupported.
#[cfg(unix)]
async fn copy_symlink(src: &Path, dest: &Path) -> Result<bool, CopyFailure> {
    let target = fs::read_link(src)
        .await
        .map_err(|e| CopyFailure::new(src, CopyOperation::ReadLink, e))?;

    if let Ok(metadata) = fs::symlink_metadata(dest).await {
        if !metadata.is_dir() {
            fs::remove_file(dest)
                .await
                .map_err(|e| CopyFailure::new(dest, CopyOperation::Symlink, e))?;
        }
    }

    fs::symlink(&target, dest)
        .await
        .map_err(|e| CopyFailure::new(dest, CopyOperation::Symlink, e))?;
    Ok(true)
}

#[cfg(not(unix))]
async fn copy_symlink(src: &Path, _dest: &Path) -> Result<bool, CopyFailure> {
    debug!(path = %src.display(), "Skipping symlink");
    Ok(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nvc_test_utils::assertions::{assert_mode, assert_tree_eq};
    use nvc_test_utils::fixtures::running_as_root;
    use nvc_test_utils::TestProject;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copies_nested_tree() {
        let project = TestProject::new()
            .with_file("README.md", "# readme\n")
            .with_file("src/main.rs", "fn main() {}\n")
            .with_file("src/util/mod.rs", "pub mod x;\n")
            .with_dir("empty")
            .build();
        let dest = TempDir::new().unwrap();

        let stats = copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.dirs_created, 3);
        assert!(dest.path().join("empty").is_dir());
        assert_tree_eq(project.path(), dest.path(), &[]);
    }

    #[tokio::test]
    async fn test_creates_missing_destination_root() {
        let project = TestProject::new().with_file("a.txt", "a").build();
        let parent = TempDir::new().unwrap();
        let dest = parent.path().join("working");

        copy_tree(project.path(), &dest, &CopyOptions::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "a");
    }

    #[tokio::test]
    async fn test_excluded_directory_is_never_created() {
        let project = TestProject::new()
            .with_file(".nvc/0/old.txt", "old")
            .with_file("lib/.nvc/inner.txt", "inner")
            .with_file("lib/code.rs", "code")
            .build();
        let dest = TempDir::new().unwrap();

        let options = CopyOptions::new().exclude(".nvc");
        let stats = copy_tree(project.path(), dest.path(), &options).await.unwrap();

        assert_eq!(stats.excluded, 2);
        assert!(!dest.path().join(".nvc").exists());
        assert!(!dest.path().join("lib/.nvc").exists());
        assert!(dest.path().join("lib/code.rs").exists());
    }

    #[tokio::test]
    async fn test_exclusion_keeps_plain_files() {
        let project = TestProject::new().with_file(".nvc", "a plain file").build();
        let dest = TempDir::new().unwrap();

        let options = CopyOptions::new().exclude(".nvc");
        copy_tree(project.path(), dest.path(), &options).await.unwrap();

        assert!(dest.path().join(".nvc").is_file());
    }

    #[tokio::test]
    async fn test_excluded_symlink_is_never_created() {
        let elsewhere = TestProject::new().with_file("0/old.txt", "old").build();
        let project = TestProject::new().with_file("a.txt", "a").build();
        std::os::unix::fs::symlink(elsewhere.path(), project.path().join(".nvc")).unwrap();
        let dest = TempDir::new().unwrap();

        let options = CopyOptions::new().exclude(".nvc");
        let stats = copy_tree(project.path(), dest.path(), &options).await.unwrap();

        assert_eq!(stats.excluded, 1);
        assert_eq!(stats.symlinks, 0);
        assert!(std::fs::symlink_metadata(dest.path().join(".nvc")).is_err());
        assert!(dest.path().join("a.txt").is_file());
    }

    #[tokio::test]
    async fn test_preserves_file_permissions() {
        let project = TestProject::new()
            .with_file("plain.txt", "plain")
            .with_file("script.sh", "#!/bin/sh\n")
            .with_file("secret", "s3cret")
            .build();
        project.set_mode("plain.txt", 0o644);
        project.set_mode("script.sh", 0o755);
        project.set_mode("secret", 0o600);
        let dest = TempDir::new().unwrap();

        copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap();

        assert_mode(&dest.path().join("plain.txt"), 0o644);
        assert_mode(&dest.path().join("script.sh"), 0o755);
        assert_mode(&dest.path().join("secret"), 0o600);
    }

    #[tokio::test]
    async fn test_preserves_directory_permissions_including_read_only() {
        let project = TestProject::new()
            .with_file("shared/notes.txt", "notes")
            .with_file("locked/data.txt", "data")
            .build();
        project.set_mode("shared", 0o750);
        project.set_mode("locked", 0o555);
        let dest = TempDir::new().unwrap();

        let result = copy_tree(project.path(), dest.path(), &CopyOptions::new()).await;
        let locked = dest.path().join("locked");

        // Restore write access so the temp dirs can be cleaned up.
        project.set_mode("locked", 0o755);
        result.unwrap();
        assert_mode(&dest.path().join("shared"), 0o750);
        assert_mode(&locked, 0o555);
        assert_eq!(
            std::fs::read_to_string(locked.join("data.txt")).unwrap(),
            "data"
        );
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_existing_directories_are_reused_untouched() {
        let project = TestProject::new()
            .with_file("docs/guide.md", "guide")
            .build();
        project.set_mode("docs", 0o755);
        let dest = TempDir::new().unwrap();
        let existing = dest.path().join("docs");
        std::fs::create_dir(&existing).unwrap();
        std::fs::set_permissions(&existing, std::fs::Permissions::from_mode(0o700)).unwrap();

        let stats = copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap();

        assert_eq!(stats.dirs_reused, 1);
        assert_eq!(stats.dirs_created, 0);
        assert_mode(&existing, 0o700);
        assert!(existing.join("guide.md").exists());
    }

    #[tokio::test]
    async fn test_overwrites_existing_files_including_read_only() {
        let project = TestProject::new().with_file("a.txt", "new contents").build();
        let dest = TempDir::new().unwrap();
        let target = dest.path().join("a.txt");
        std::fs::write(&target, "old contents that are longer").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o444)).unwrap();

        copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new contents");
    }

    #[tokio::test]
    async fn test_recreates_symlinks() {
        let project = TestProject::new()
            .with_file("target.txt", "target")
            .build();
        std::os::unix::fs::symlink("target.txt", project.path().join("link")).unwrap();
        // A link cycle must not cause unbounded recursion.
        std::os::unix::fs::symlink(".", project.path().join("self")).unwrap();
        let dest = TempDir::new().unwrap();

        let stats = copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap();

        assert_eq!(stats.symlinks, 2);
        assert_eq!(
            std::fs::read_link(dest.path().join("link")).unwrap(),
            PathBuf::from("target.txt")
        );
    }

    #[tokio::test]
    async fn test_missing_source_reports_failure() {
        let dest = TempDir::new().unwrap();
        let missing = dest.path().join("does-not-exist");

        let err = copy_tree(&missing, &dest.path().join("out"), &CopyOptions::new())
            .await
            .unwrap_err();

        let failures = err.copy_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].operation, CopyOperation::ReadDir);
        assert_eq!(failures[0].path, missing);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        if running_as_root() {
            return;
        }
        let project = TestProject::new()
            .with_file("ok-1.txt", "one")
            .with_file("unreadable.txt", "nope")
            .with_file("nested/ok-2.txt", "two")
            .build();
        project.set_mode("unreadable.txt", 0o000);
        let dest = TempDir::new().unwrap();

        let err = copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap_err();
        project.set_mode("unreadable.txt", 0o644);

        let failures = err.copy_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].path.ends_with("unreadable.txt"));
        assert!(dest.path().join("ok-1.txt").exists());
        assert!(dest.path().join("nested/ok-2.txt").exists());
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        if running_as_root() {
            return;
        }
        let project = TestProject::new()
            .with_file("a/secret.txt", "a")
            .with_file("b/secret.txt", "b")
            .with_file("c.txt", "c")
            .build();
        project.set_mode("a/secret.txt", 0o000);
        project.set_mode("b/secret.txt", 0o000);
        let dest = TempDir::new().unwrap();

        let err = copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap_err();
        project.set_mode("a/secret.txt", 0o644);
        project.set_mode("b/secret.txt", 0o644);

        assert_eq!(err.copy_failures().len(), 2);
        assert!(err.to_string().contains("and 1 more failure"));
    }

    #[tokio::test]
    async fn test_file_in_place_of_directory_fails() {
        let project = TestProject::new().with_file("conf/app.toml", "x").build();
        let dest = TempDir::new().unwrap();
        std::fs::write(dest.path().join("conf"), "not a dir").unwrap();

        let err = copy_tree(project.path(), dest.path(), &CopyOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.copy_failures()[0].operation, CopyOperation::CreateDir);
    }

    #[tokio::test]
    async fn test_single_open_file_limit_still_copies_everything() {
        let mut builder = TestProject::new();
        for i in 0..20 {
            builder = builder.with_file(format!("d{}/f{i}.txt", i % 3), format!("file {i}"));
        }
        let project = builder.build();
        let dest = TempDir::new().unwrap();

        let options = CopyOptions::new().max_open_files(1);
        let stats = copy_tree(project.path(), dest.path(), &options).await.unwrap();

        assert_eq!(stats.files, 20);
        assert_tree_eq(project.path(), dest.path(), &[]);
    }

    #[test]
    fn test_stats_add_assign() {
        let mut total = CopyStats {
            files: 1,
            bytes: 10,
            ..Default::default()
        };
        total += CopyStats {
            files: 2,
            bytes: 5,
            dirs_created: 1,
            ..Default::default()
        };
        assert_eq!(total.files, 3);
        assert_eq!(total.bytes, 15);
        assert_eq!(total.dirs_created, 1);
    }
}
