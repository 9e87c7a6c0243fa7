//! Snapshot engine for nvc.
//!
//! This crate provides numbered, full-copy snapshots of a working tree:
//! - Sequential snapshot ids derived from the metadata directory, reserved
//!   atomically so concurrent snapshots never collide
//! - A recursive tree copier that preserves permission bits and never
//!   descends into the metadata directory
//! - Restore of any existing snapshot into a configurable destination
//! - Listing and diffing of stored snapshots
//!
//! # Example
//!
//! ```no_run
//! use nvc_snapshot::{CopyOptions, SnapshotId, SnapshotStore};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SnapshotStore::new(
//!     PathBuf::from("/project/.nvc"),
//!     PathBuf::from("/project"),
//!     CopyOptions::default(),
//! );
//!
//! // Take a snapshot of the whole tree
//! let snapshot = store.create().await?;
//! println!("Snapshot {} created", snapshot.id);
//!
//! // ... edit files ...
//!
//! // Bring the tree back
//! store.restore(SnapshotId(0)).await?;
//! # Ok(())
//! # }
//! ```

mod copier;
mod diff;
mod error;
mod snapshot;
mod store;
mod tree;

pub use copier::{copy_tree, CopyOptions, CopyStats, DEFAULT_MAX_OPEN_FILES};
pub use diff::{diff_trees, generate_diff, Change, ChangeKind, TreeDiff};
pub use error::{CopyFailure, CopyOperation, SnapshotError, SnapshotResult};
pub use snapshot::{CreatedSnapshot, SnapshotId, SnapshotInfo};
pub use store::{next_version, snapshot_path, SnapshotStore};
pub use tree::{walk, EntryKind, Exclusions, TreeEntry, TreeSummary, PERMISSION_MASK};
