//! Watch folder layout: `inbox/`, `processing/` and `done/` under one base.
//!
//! Files are dropped into `inbox`, moved into `processing` when a job starts,
//! and the transcoded artifact lands in `done`.

use serde::Serialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error creating the folder layout.
#[derive(Debug, Error)]
pub enum FolderError {
    #[error("failed to resolve watch base {path}: {source}")]
    Resolve { path: PathBuf, source: io::Error },

    #[error("failed to create {path}: {source}")]
    Create { path: PathBuf, source: io::Error },
}

/// Error moving a file from the inbox into `processing`.
#[derive(Debug, Error)]
pub enum RenameError {
    #[error("{0} has no file name")]
    NoFileName(PathBuf),

    #[error("failed to move {from} to {to}: {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// The three absolute directories of a watch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchFolders {
    pub inbox: PathBuf,
    pub processing: PathBuf,
    pub done: PathBuf,
}

impl WatchFolders {
    /// Resolve `base` to an absolute path and create all three directories.
    pub fn create(base: &Path) -> Result<Self, FolderError> {
        let base = if base.is_absolute() {
            base.to_path_buf()
        } else {
            env::current_dir()
                .map_err(|source| FolderError::Resolve {
                    path: base.to_path_buf(),
                    source,
                })?
                .join(base)
        };

        let folders = Self {
            inbox: base.join("inbox"),
            processing: base.join("processing"),
            done: base.join("done"),
        };
        folders.ensure()?;
        Ok(folders)
    }

    /// Create any directory that went missing.
    pub fn ensure(&self) -> Result<(), FolderError> {
        for dir in [&self.inbox, &self.processing, &self.done] {
            fs::create_dir_all(dir).map_err(|source| FolderError::Create {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Rename `path` into `processing/`, keeping its file name.
    pub fn move_to_processing(&self, path: &Path) -> Result<PathBuf, RenameError> {
        let name = path
            .file_name()
            .ok_or_else(|| RenameError::NoFileName(path.to_path_buf()))?;
        let target = self.processing.join(name);

        fs::rename(path, &target).map_err(|source| RenameError::Io {
            from: path.to_path_buf(),
            to: target.clone(),
            source,
        })?;
        Ok(target)
    }

    /// Where an artifact named `file_name` is written.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.done.join(file_name)
    }

    /// Remove a processed source from `processing/`.
    pub fn cleanup(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_makes_all_directories() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("clips");

        let folders = WatchFolders::create(&base).unwrap();
        assert!(folders.inbox.is_dir());
        assert!(folders.processing.is_dir());
        assert!(folders.done.is_dir());
        assert_eq!(folders.inbox, base.join("inbox"));
        assert!(folders.done.is_absolute());
    }

    #[test]
    fn test_create_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let first = WatchFolders::create(temp.path()).unwrap();
        fs::write(first.done.join("kept.gif"), b"gif").unwrap();

        let second = WatchFolders::create(temp.path()).unwrap();
        assert_eq!(first, second);
        assert!(second.done.join("kept.gif").exists());
    }

    #[test]
    fn test_move_to_processing() {
        let temp = TempDir::new().unwrap();
        let folders = WatchFolders::create(temp.path()).unwrap();
        let dropped = folders.inbox.join("a-social.mp4");
        fs::write(&dropped, b"video").unwrap();

        let moved = folders.move_to_processing(&dropped).unwrap();
        assert_eq!(moved, folders.processing.join("a-social.mp4"));
        assert!(!dropped.exists());
        assert_eq!(fs::read(&moved).unwrap(), b"video");
    }

    #[test]
    fn test_move_missing_file_is_rename_error() {
        let temp = TempDir::new().unwrap();
        let folders = WatchFolders::create(temp.path()).unwrap();

        let err = folders
            .move_to_processing(&folders.inbox.join("gone.mp4"))
            .unwrap_err();
        assert!(matches!(err, RenameError::Io { .. }));
        assert!(err.to_string().contains("gone.mp4"));
    }

    #[test]
    fn test_output_path_and_cleanup() {
        let temp = TempDir::new().unwrap();
        let folders = WatchFolders::create(temp.path()).unwrap();
        assert_eq!(folders.output_path("c.gif"), folders.done.join("c.gif"));

        let processed = folders.processing.join("c.mp4");
        fs::write(&processed, b"x").unwrap();
        folders.cleanup(&processed).unwrap();
        assert!(!processed.exists());
        assert!(folders.cleanup(&processed).is_err());
    }
}
