//! Snapshot error types.

use crate::snapshot::SnapshotId;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Requested snapshot is outside `[0, next_version)`.
    #[error("Snapshot {requested} doesn't exist yet ({available} snapshots available)")]
    VersionOutOfRange { requested: u64, available: u64 },

    /// Snapshot directory is missing although its id is in range.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// The metadata directory could not be read.
    #[error("Metadata directory {} is unavailable: {source}", path.display())]
    MetadataUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// One or more entries failed while copying a tree.
    #[error("{}", describe_failures(failures))]
    CopyFailed { failures: Vec<CopyFailure> },

    /// Restore destination lies inside the snapshot being restored.
    #[error("Cannot restore snapshot {id} into {}: it lies inside the snapshot", dest.display())]
    DestinationInsideSnapshot { id: SnapshotId, dest: PathBuf },

    /// No free snapshot id could be reserved.
    #[error("Could not reserve a snapshot id after {attempts} attempts")]
    ReservationExhausted { attempts: u32 },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SnapshotError {
    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Failures collected during a tree copy, empty for any other error.
    pub fn copy_failures(&self) -> &[CopyFailure] {
        match self {
            Self::CopyFailed { failures } => failures,
            _ => &[],
        }
    }
}

fn describe_failures(failures: &[CopyFailure]) -> String {
    match failures {
        [] => "Copy failed".to_string(),
        [only] => format!("Copy failed: {only}"),
        [first, rest @ ..] => format!(
            "Copy failed: {first} (and {} more failure{})",
            rest.len(),
            if rest.len() == 1 { "" } else { "s" }
        ),
    }
}

/// The filesystem step that failed for a single tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOperation {
    ReadDir,
    Stat,
    Open,
    Create,
    Write,
    CreateDir,
    SetPermissions,
    ReadLink,
    Symlink,
}

impl CopyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyOperation::ReadDir => "list",
            CopyOperation::Stat => "stat",
            CopyOperation::Open => "open",
            CopyOperation::Create => "create",
            CopyOperation::Write => "write",
            CopyOperation::CreateDir => "create directory",
            CopyOperation::SetPermissions => "set permissions on",
            CopyOperation::ReadLink => "read link",
            CopyOperation::Symlink => "create symlink",
        }
    }
}

impl fmt::Display for CopyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry that could not be copied.
#[derive(Debug, Error)]
#[error("failed to {operation} {}: {source}", path.display())]
pub struct CopyFailure {
    /// Path the operation was applied to.
    pub path: PathBuf,
    /// What was being done.
    pub operation: CopyOperation,
    #[source]
    pub source: io::Error,
}

impl CopyFailure {
    pub fn new(path: impl Into<PathBuf>, operation: CopyOperation, source: io::Error) -> Self {
        Self {
            path: path.into(),
            operation,
            source,
        }
    }
}
