//! Snapshot and restore command handlers.

use nvc_core::Repository;
use nvc_snapshot::SnapshotId;
use std::path::Path;
use tracing::debug;

/// Handle `nvc snap`.
pub async fn handle_snap(repo: &Repository) -> anyhow::Result<()> {
    let snapshot = repo.store().create().await?;

    debug!(
        files = snapshot.stats.files,
        dirs = snapshot.stats.dirs_created,
        excluded = snapshot.stats.excluded,
        "Snapshot written to {}",
        snapshot.path.display()
    );
    println!("Snapshot {} created", snapshot.id);
    Ok(())
}

/// Handle `nvc checkout <N>`.
///
/// Restores into `into` when given, otherwise into the configured restore
/// destination.
pub async fn handle_checkout(
    repo: &Repository,
    id: SnapshotId,
    into: Option<&Path>,
) -> anyhow::Result<()> {
    let store = repo.store();
    let dest = into.unwrap_or_else(|| store.restore_root());

    let stats = store.restore_into(id, dest).await?;

    debug!(
        files = stats.files,
        dirs_created = stats.dirs_created,
        dirs_reused = stats.dirs_reused,
        "Restore finished"
    );
    println!("Snapshot {} restored", id);
    Ok(())
}

/// Handle `nvc current`.
pub async fn handle_current(repo: &Repository) -> anyhow::Result<()> {
    match repo.store().latest().await? {
        Some(id) => println!("{}", id),
        None => println!("No snapshots yet."),
    }
    Ok(())
}

/// Handle `nvc branch`.
pub fn handle_branch() {
    println!("Branching is not supported; every snapshot is a full copy.");
}
