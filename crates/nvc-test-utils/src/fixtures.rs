//! Test fixtures for creating reproducible test environments.
//!
//! Provides utilities for setting up temporary working trees, nvc
//! configuration files and metadata directories.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary working tree with configurable file structure.
///
/// Creates a temporary directory that is automatically cleaned up
/// when the built project is dropped.
///
/// # Example
///
/// ```rust
/// use nvc_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new()
///     .with_file("src/main.rs", "fn main() { println!(\"Hello\"); }")
///     .with_dir("docs")
///     .build();
///
/// assert!(project.path().join("src/main.rs").exists());
/// ```
pub struct TestProject {
    /// The temporary directory backing this project.
    temp_dir: TempDir,
    /// Files to create (path relative to root -> contents).
    files: BTreeMap<PathBuf, Vec<u8>>,
    /// Directories to create (paths relative to root).
    dirs: Vec<PathBuf>,
}

impl TestProject {
    /// Create a new test project builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: BTreeMap::new(),
            dirs: Vec::new(),
        }
    }

    /// Add a file to the project.
    ///
    /// The path should be relative to the project root.
    /// Parent directories are created automatically.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.as_ref().to_vec());
        self
    }

    /// Add an empty directory to the project.
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add an nvc configuration file.
    pub fn with_config(self, config: &str) -> Self {
        self.with_file("nvc.json", config)
    }

    /// Add an initialized metadata directory with `count` snapshot directories.
    pub fn with_snapshots(mut self, count: u64) -> Self {
        self.dirs.push(PathBuf::from(".nvc"));
        for id in 0..count {
            self.dirs.push(Path::new(".nvc").join(id.to_string()));
        }
        self
    }

    /// Build the project, creating all files and directories.
    pub fn build(self) -> BuiltTestProject {
        let root = self.temp_dir.path();

        // Create directories first
        for dir in &self.dirs {
            let full_path = root.join(dir);
            fs::create_dir_all(&full_path).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", full_path.display(), e)
            });
        }

        // Create files (parent directories are created automatically)
        for (path, contents) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!(
                        "Failed to create parent directory for {}: {}",
                        full_path.display(),
                        e
                    )
                });
            }
            fs::write(&full_path, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
        }

        BuiltTestProject {
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A built test project with files created on disk.
///
/// The temporary directory is automatically cleaned up when this is dropped.
pub struct BuiltTestProject {
    temp_dir: TempDir,
}

impl BuiltTestProject {
    /// Get the path to the project root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Read a file from the project.
    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.path().join(path.as_ref());
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    /// Check if a file exists in the project.
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.path().join(path.as_ref()).exists()
    }

    /// Write a file to the project (for modifying during tests).
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let full_path = self.path().join(path.as_ref());
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&full_path, contents.as_ref())
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }

    /// Delete a file from the project.
    pub fn delete_file(&self, path: impl AsRef<Path>) {
        let full_path = self.path().join(path.as_ref());
        fs::remove_file(&full_path)
            .unwrap_or_else(|e| panic!("Failed to delete file {}: {}", full_path.display(), e));
    }

    /// Set the permission bits of a file or directory.
    #[cfg(unix)]
    pub fn set_mode(&self, path: impl AsRef<Path>, mode: u32) {
        use std::os::unix::fs::PermissionsExt;

        let full_path = self.path().join(path.as_ref());
        fs::set_permissions(&full_path, fs::Permissions::from_mode(mode)).unwrap_or_else(|e| {
            panic!("Failed to set mode on {}: {}", full_path.display(), e)
        });
    }

    /// Permission bits of a file or directory.
    #[cfg(unix)]
    pub fn mode(&self, path: impl AsRef<Path>) -> u32 {
        use std::os::unix::fs::PermissionsExt;

        let full_path = self.path().join(path.as_ref());
        fs::symlink_metadata(&full_path)
            .unwrap_or_else(|e| panic!("Failed to stat {}: {}", full_path.display(), e))
            .permissions()
            .mode()
            & 0o777
    }

    /// Names in the metadata directory, sorted.
    pub fn snapshot_dirs(&self) -> Vec<String> {
        let metadata_dir = self.path().join(".nvc");
        let mut names: Vec<String> = match fs::read_dir(&metadata_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

/// Whether tests run with root privileges.
///
/// Permission-denied scenarios cannot be provoked as root.
#[cfg(unix)]
pub fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;

    tempfile::NamedTempFile::new()
        .and_then(|file| file.as_file().metadata())
        .map(|metadata| metadata.uid() == 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_project() {
        let project = TestProject::new().build();
        assert!(project.path().exists());
    }

    #[test]
    fn test_project_with_files() {
        let project = TestProject::new()
            .with_file("test.txt", "Hello")
            .with_file("src/main.rs", "fn main() {}")
            .build();

        assert!(project.file_exists("test.txt"));
        assert!(project.file_exists("src/main.rs"));
        assert_eq!(project.read_file("test.txt"), "Hello");
    }

    #[test]
    fn test_project_with_dir() {
        let project = TestProject::new()
            .with_dir("src/modules")
            .with_dir("tests")
            .build();

        assert!(project.path().join("src/modules").is_dir());
        assert!(project.path().join("tests").is_dir());
    }

    #[test]
    fn test_with_config() {
        let config = r#"{"metadata_dir": ".nvc"}"#;
        let project = TestProject::new().with_config(config).build();

        assert_eq!(project.read_file("nvc.json"), config);
    }

    #[test]
    fn test_with_snapshots() {
        let project = TestProject::new().with_snapshots(3).build();
        assert_eq!(project.snapshot_dirs(), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_snapshot_dirs_without_metadata_dir() {
        let project = TestProject::new().build();
        assert!(project.snapshot_dirs().is_empty());
    }

    #[test]
    fn test_write_and_delete() {
        let project = TestProject::new().build();

        project.write_file("deep/nested/new.txt", "content");
        assert!(project.file_exists("deep/nested/new.txt"));

        project.delete_file("deep/nested/new.txt");
        assert!(!project.file_exists("deep/nested/new.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_set_mode() {
        let project = TestProject::new().with_file("run.sh", "#!/bin/sh\n").build();
        project.set_mode("run.sh", 0o750);
        assert_eq!(project.mode("run.sh"), 0o750);
    }
}
