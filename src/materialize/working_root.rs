//! The single scratch area owned by one pipeline

use super::permissions::force_remove_dir;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ROOTFS_DIR: &str = "rootfs";
const TARBALL_NAME: &str = "image-rootfs.tar";
const EXTRACTED_DIR: &str = "extracted";

/// Scratch storage holding at most one export tarball and one extracted tree.
///
/// Paths are fixed and reused by every analysis, so only one analysis may use
/// a `WorkingRoot` at a time.
#[derive(Debug, Clone)]
pub struct WorkingRoot {
    base: PathBuf,
    rootfs: PathBuf,
}

impl WorkingRoot {
    /// Create (or reuse) `<base>/rootfs`.
    pub fn create(base: impl AsRef<Path>) -> io::Result<Self> {
        let base = base.as_ref();
        fs::create_dir_all(base)?;
        let base = fs::canonicalize(base)?;
        let rootfs = base.join(ROOTFS_DIR);
        fs::create_dir_all(&rootfs)?;
        debug!("Working root at {}", rootfs.display());
        Ok(Self { base, rootfs })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    pub fn tarball_path(&self) -> PathBuf {
        self.rootfs.join(TARBALL_NAME)
    }

    pub fn extracted_path(&self) -> PathBuf {
        self.rootfs.join(EXTRACTED_DIR)
    }

    /// Whether a tarball or extracted tree is currently present.
    pub fn has_transient_artifacts(&self) -> bool {
        fs::symlink_metadata(self.tarball_path()).is_ok()
            || fs::symlink_metadata(self.extracted_path()).is_ok()
    }

    /// Remove any stale tarball so an export starts from nothing.
    pub fn reset_tarball(&self) -> io::Result<()> {
        fs::create_dir_all(&self.rootfs)?;
        match fs::remove_file(self.tarball_path()) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Clear and recreate the extracted tree directory.
    pub async fn reset_extracted(&self, timeout: Duration) -> io::Result<PathBuf> {
        let extracted = self.extracted_path();
        force_remove_dir(&extracted, timeout).await?;
        fs::create_dir_all(&extracted)?;
        Ok(extracted)
    }

    /// Remove both transient artifacts. Errors only if something remains.
    pub async fn clear_transient(&self, timeout: Duration) -> io::Result<()> {
        let extracted = self.extracted_path();
        if fs::symlink_metadata(&extracted).is_ok() {
            debug!("Cleaning up extracted files: {}", extracted.display());
        }
        let tree = force_remove_dir(&extracted, timeout).await;

        let tarball = self.tarball_path();
        let tar = match fs::remove_file(&tarball) {
            Ok(()) => {
                debug!("Removed tar file: {}", tarball.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        };

        tree.and(tar)
    }
}
