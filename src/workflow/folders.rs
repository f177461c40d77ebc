use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::errors::FolderError;
use super::traits::FolderManager;
use super::types::ScanFolder;

/// Scan directories on the local filesystem, one timestamped folder per
/// capture under `scans_root`.
#[derive(Debug, Clone)]
pub struct FileSystemFolderManager {
    scans_root: PathBuf,
}

impl FileSystemFolderManager {
    pub fn new(scans_root: impl Into<PathBuf>) -> Self {
        Self {
            scans_root: scans_root.into(),
        }
    }

    pub fn scans_root(&self) -> &Path {
        &self.scans_root
    }

    fn create_unique_root(&self) -> Result<PathBuf, FolderError> {
        std::fs::create_dir_all(&self.scans_root).map_err(|source| FolderError::Create {
            path: self.scans_root.clone(),
            source,
        })?;

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut candidate = self.scans_root.join(&timestamp);
        let mut suffix = 1;
        loop {
            match std::fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    candidate = self.scans_root.join(format!("{timestamp}-{suffix}"));
                    suffix += 1;
                }
                Err(source) => {
                    return Err(FolderError::Create {
                        path: candidate,
                        source,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl FolderManager for FileSystemFolderManager {
    fn create_new_scan_directory(&self) -> Result<ScanFolder, FolderError> {
        if self.scans_root.as_os_str().is_empty() {
            return Err(FolderError::NoScansRoot);
        }

        let root = self.create_unique_root()?;
        info!(path = %root.display(), "Creating capture directory");

        let folder = ScanFolder::at(&root);
        for path in [&folder.images, &folder.snapshots, &folder.models] {
            if let Err(source) = std::fs::create_dir_all(path) {
                error!(
                    path = %path.display(),
                    error = %source,
                    "Failed to create capture subdirectory"
                );
                return Err(FolderError::Create {
                    path: path.clone(),
                    source,
                });
            }
        }

        if !root.is_dir() {
            return Err(FolderError::NotADirectory { path: root });
        }
        Ok(folder)
    }

    async fn remove_item(&self, path: &Path) -> Result<(), FolderError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Nothing to remove");
                return Ok(());
            }
            Err(source) => {
                return Err(FolderError::Remove {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let removal = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };

        removal.map_err(|source| FolderError::Remove {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_timestamped_folder_with_subfolders() {
        let temp = TempDir::new().unwrap();
        let manager = FileSystemFolderManager::new(temp.path().join("Scans"));

        let folder = manager.create_new_scan_directory().unwrap();
        assert!(folder.root.starts_with(temp.path().join("Scans")));
        assert!(folder.images.is_dir());
        assert!(folder.snapshots.is_dir());
        assert!(folder.models.is_dir());
    }

    #[test]
    fn test_back_to_back_folders_are_distinct() {
        let temp = TempDir::new().unwrap();
        let manager = FileSystemFolderManager::new(temp.path());

        let first = manager.create_new_scan_directory().unwrap();
        let second = manager.create_new_scan_directory().unwrap();
        assert_ne!(first.root, second.root);
    }

    #[test]
    fn test_empty_root_is_rejected() {
        let manager = FileSystemFolderManager::new("");
        assert!(matches!(
            manager.create_new_scan_directory(),
            Err(FolderError::NoScansRoot)
        ));
    }

    #[tokio::test]
    async fn test_remove_item_handles_dirs_files_and_missing_paths() {
        let temp = TempDir::new().unwrap();
        let manager = FileSystemFolderManager::new(temp.path());
        let folder = manager.create_new_scan_directory().unwrap();

        std::fs::write(folder.snapshots.join("checkpoint.bin"), b"data").unwrap();
        manager.remove_item(&folder.snapshots).await.unwrap();
        assert!(!folder.snapshots.exists());

        let file = folder.images.join("IMG_0001.HEIC");
        std::fs::write(&file, b"jpeg").unwrap();
        manager.remove_item(&file).await.unwrap();
        assert!(!file.exists());

        manager.remove_item(&folder.snapshots).await.unwrap();
    }
}
