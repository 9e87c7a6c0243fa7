//! Snapshot listing.

use nvc_core::Repository;

/// Handle `nvc log`.
pub async fn handle_log(repo: &Repository, json: bool) -> anyhow::Result<()> {
    let snapshots = repo.store().list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    if snapshots.is_empty() {
        println!("No snapshots yet.");
        return Ok(());
    }

    println!(
        "{:<6} {:<20} {:>8} {:>6} {:>12}",
        "ID", "CREATED", "FILES", "DIRS", "BYTES"
    );
    println!("{}", "-".repeat(56));

    for snapshot in snapshots {
        let created = snapshot
            .created_at
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<20} {:>8} {:>6} {:>12}",
            snapshot.id,
            created,
            snapshot.summary.files,
            snapshot.summary.directories,
            snapshot.summary.bytes
        );
    }

    Ok(())
}
