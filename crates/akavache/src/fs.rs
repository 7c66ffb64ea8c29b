//! Filesystem collaborator seam (§6): the handful of path and I/O
//! operations [`crate::builder::AkavacheBuilder`] needs to resolve
//! `UserAccount`/`LocalMachine`/`Secure` store locations, factored out
//! behind a trait so tests and embedders can swap in an in-memory or
//! sandboxed filesystem.

use std::fs::File;
use std::path::{Path, PathBuf};

use akavache_core::{CacheError, Result};
use directories::ProjectDirs;

/// Narrow filesystem abstraction: path resolution plus the handful of
/// file operations the store needs, nothing more.
pub trait FilesystemProvider: Send + Sync + 'static {
    fn open_for_read(&self, path: &Path) -> Result<File>;
    fn open_for_write(&self, path: &Path) -> Result<File>;
    fn create_recursive(&self, path: &Path) -> Result<()>;
    fn delete(&self, path: &Path) -> Result<()>;

    /// Roaming-profile directory (`UserAccount` cache).
    fn default_roaming_dir(&self, app_name: &str) -> Result<PathBuf>;
    /// Machine-local directory (`LocalMachine` cache).
    fn default_local_machine_dir(&self, app_name: &str) -> Result<PathBuf>;
    /// Directory intended for the encrypted (`Secure`) cache file.
    fn default_secret_dir(&self, app_name: &str) -> Result<PathBuf>;
}

/// `std::fs` + `directories`-crate default implementation.
#[derive(Debug, Clone, Default)]
pub struct StdFilesystemProvider;

impl StdFilesystemProvider {
    fn project_dirs(app_name: &str) -> Result<ProjectDirs> {
        ProjectDirs::from("com", "akavache", app_name)
            .ok_or_else(|| CacheError::Io(format!("no home directory available to resolve paths for '{app_name}'")))
    }
}

impl FilesystemProvider for StdFilesystemProvider {
    fn open_for_read(&self, path: &Path) -> Result<File> {
        File::open(path).map_err(|e| CacheError::Io(e.to_string()))
    }

    fn open_for_write(&self, path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            self.create_recursive(parent)?;
        }
        File::create(path).map_err(|e| CacheError::Io(e.to_string()))
    }

    fn create_recursive(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| CacheError::Io(e.to_string()))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e.to_string())),
        }
    }

    fn default_roaming_dir(&self, app_name: &str) -> Result<PathBuf> {
        Ok(Self::project_dirs(app_name)?.data_dir().to_path_buf())
    }

    fn default_local_machine_dir(&self, app_name: &str) -> Result<PathBuf> {
        Ok(Self::project_dirs(app_name)?
            .cache_dir()
            .to_path_buf())
    }

    fn default_secret_dir(&self, app_name: &str) -> Result<PathBuf> {
        Ok(Self::project_dirs(app_name)?
            .data_local_dir()
            .join("secret"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roaming_and_local_dirs_differ_in_practice() {
        let fs = StdFilesystemProvider;
        let roaming = fs.default_roaming_dir("test-app").unwrap();
        let local = fs.default_local_machine_dir("test-app").unwrap();
        let secret = fs.default_secret_dir("test-app").unwrap();
        assert_ne!(roaming, secret);
        assert_ne!(local, secret);
    }

    #[test]
    fn create_recursive_then_write_then_delete_round_trips() {
        let fs = StdFilesystemProvider;
        let dir = std::env::temp_dir().join(format!("akavache-fs-test-{}", std::process::id()));
        let file_path = dir.join("nested").join("entry.bin");

        fs.open_for_write(&file_path).unwrap();
        assert!(file_path.exists());

        fs.delete(&file_path).unwrap();
        assert!(!file_path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn delete_missing_file_is_not_an_error() {
        let fs = StdFilesystemProvider;
        fs.delete(Path::new("/nonexistent/akavache/path/does-not-exist")).unwrap();
    }
}
