//! Snapshot data structures.

use crate::copier::CopyStats;
use crate::tree::TreeSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Sequential identifier of a snapshot.
///
/// Identifiers are the decimal names of the snapshot directories inside the
/// metadata directory: `0`, `1`, `2`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub u64);

impl SnapshotId {
    /// Get the numeric value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Directory name used on disk.
    pub fn dir_name(self) -> String {
        self.0.to_string()
    }

    /// Parse a snapshot directory name.
    ///
    /// Only plain decimal names are accepted, so `007` or `+1` never alias
    /// another snapshot.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let valid = !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_digit())
            && (name == "0" || !name.starts_with('0'));
        if valid {
            name.parse().ok().map(Self)
        } else {
            None
        }
    }
}

impl From<u64> for SnapshotId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for SnapshotId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A snapshot that has just been written.
#[derive(Debug, Clone)]
pub struct CreatedSnapshot {
    /// The reserved identifier.
    pub id: SnapshotId,
    /// Where the copy lives.
    pub path: PathBuf,
    /// What the copy did.
    pub stats: CopyStats,
}

/// Description of a stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot identifier.
    pub id: SnapshotId,

    /// Directory holding the snapshot.
    pub path: PathBuf,

    /// Last modification time of the snapshot directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Contents of the snapshot.
    pub summary: TreeSummary,
}
