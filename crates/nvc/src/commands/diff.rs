//! Diff command handler.

use nvc_core::Repository;
use nvc_snapshot::SnapshotId;
use std::path::Path;

/// Handle `nvc diff <N>`.
///
/// Compares snapshot `id` (old side) with `against`, or with the working
/// tree when no directory is given.
pub async fn handle_diff(
    repo: &Repository,
    id: SnapshotId,
    against: Option<&Path>,
    patch: bool,
) -> anyhow::Result<()> {
    let against = against.unwrap_or_else(|| repo.root());
    let diff = repo.store().diff(id, against, patch).await?;

    if diff.is_empty() {
        println!("No changes since snapshot {}", id);
        return Ok(());
    }

    for change in &diff.changes {
        println!("{} {}", change.kind.marker(), change.path.display());
        if let Some(patch) = &change.patch {
            print!("{}", patch);
        }
    }
    println!(
        "\n{} changed, {} unchanged",
        diff.changes.len(),
        diff.unchanged
    );

    Ok(())
}
