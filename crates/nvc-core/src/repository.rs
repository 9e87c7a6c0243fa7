//! Repository: a working root plus its metadata directory.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use nvc_snapshot::SnapshotStore;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Permission bits of a freshly created metadata directory.
#[cfg(unix)]
const METADATA_DIR_MODE: u32 = 0o755;

/// An opened repository.
///
/// Opening guarantees the metadata directory exists, so every snapshot
/// operation on [`Repository::store`] can rely on it.
pub struct Repository {
    root: PathBuf,
    store: SnapshotStore,
    created: bool,
}

impl Repository {
    /// Open the repository rooted at `root`, creating its metadata
    /// directory when missing.
    pub async fn open_or_init(root: &Path, config: &Config) -> CoreResult<Self> {
        let root = root.to_path_buf();
        let metadata_dir = root.join(config.metadata_dir_name());
        let created = ensure_metadata_dir(&metadata_dir).await?;

        let store = SnapshotStore::new(metadata_dir, root.clone(), config.copy_options())
            .with_restore_root(config.restore_root(&root));

        debug!(
            root = %root.display(),
            restore_root = %store.restore_root().display(),
            "Opened repository"
        );

        Ok(Self {
            root,
            store,
            created,
        })
    }

    /// The snapshot store for this repository.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_dir(&self) -> &Path {
        self.store.metadata_dir()
    }

    /// Whether opening created the metadata directory.
    pub fn was_created(&self) -> bool {
        self.created
    }
}

/// Make sure `path` is a directory. Returns true if it had to be created.
async fn ensure_metadata_dir(path: &Path) -> CoreResult<bool> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => return Ok(false),
        Ok(_) => return Err(CoreError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    info!(path = %path.display(), "Creating repository");
    match create_dir(path).await {
        Ok(()) => Ok(true),
        // Lost a race with another process creating it
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
async fn create_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir(path).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(METADATA_DIR_MODE)).await
}

#[cfg(not(unix))]
async fn create_dir(path: &Path) -> io::Result<()> {
    fs::create_dir(path).await
}
