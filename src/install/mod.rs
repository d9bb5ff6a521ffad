//! Artifact installation.
//!
//! The installer never removes an existing installation before the new artifact
//! has been fully copied next to it:
//!
//! ```text
//! artifact --copy--> <dir>/.<name>.appforge-staging
//! <dir>/<name> --rename--> <dir>/<name>.appforge-backup   (if present)
//! staging --rename--> <dir>/<name>
//! ```
//!
//! A failed copy leaves the old installation untouched; a failed swap restores
//! the backup when possible and otherwise reports where it was preserved.

pub mod bundle;
pub mod launcher;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::InstallError;

pub use bundle::BundleCustomizer;

/// Filesystem operations used for installation; swapped out in tests.
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Recursively copy a file or directory tree, preserving symlinks.
    fn copy_dir(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file or directory tree.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    fn is_writable_dir(&self, path: &Path) -> bool;
}

/// The local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    fn copy_entry(from: &Path, to: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(from)?;
        let file_type = meta.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(from)?;
            #[cfg(unix)]
            {
                std::os::unix::fs::symlink(&target, to)?;
            }
            #[cfg(not(unix))]
            {
                let _ = target;
                fs::copy(from, to)?;
            }
        } else if file_type.is_dir() {
            fs::create_dir_all(to)?;
            for entry in fs::read_dir(from)? {
                let entry = entry?;
                Self::copy_entry(&entry.path(), &to.join(entry.file_name()))?;
            }
            fs::set_permissions(to, meta.permissions())?;
        } else {
            fs::copy(from, to)?;
        }
        Ok(())
    }
}

impl Filesystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn copy_dir(&self, from: &Path, to: &Path) -> io::Result<()> {
        Self::copy_entry(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn is_writable_dir(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        // Probe by creating a file; permission bits alone miss ACLs and read-only mounts
        tempfile::Builder::new()
            .prefix(".appforge-probe")
            .tempfile_in(path)
            .is_ok()
    }
}

/// What an install did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: PathBuf,
    /// Previous installation, kept for manual rollback.
    pub backup: Option<PathBuf>,
}

/// Copies build artifacts into place with backup-then-replace ordering.
#[derive(Clone)]
pub struct Installer {
    fs: Arc<dyn Filesystem>,
}

impl Default for Installer {
    fn default() -> Self {
        Installer::new(Arc::new(LocalFs))
    }
}

impl Installer {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Installer { fs }
    }

    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    /// Sibling paths used during the swap.
    pub fn staging_path(dest: &Path) -> Result<PathBuf, InstallError> {
        let (parent, name) = split_dest(dest)?;
        Ok(parent.join(format!(".{}.appforge-staging", name)))
    }

    pub fn backup_path(dest: &Path) -> Result<PathBuf, InstallError> {
        let (parent, name) = split_dest(dest)?;
        Ok(parent.join(format!("{}.appforge-backup", name)))
    }

    /// Install `artifact` at `dest`.
    pub fn install(&self, artifact: &Path, dest: &Path) -> Result<InstallReport, InstallError> {
        if !self.fs.exists(artifact) {
            return Err(InstallError::ArtifactMissing(artifact.to_path_buf()));
        }

        let (parent, _) = split_dest(dest)?;
        if !self.fs.is_writable_dir(parent) {
            return Err(InstallError::NotWritable(parent.to_path_buf()));
        }

        let staging = Self::staging_path(dest)?;
        let backup = Self::backup_path(dest)?;

        log::info!(target: "parsed", "[Install] Copying {} -> {}", artifact.display(), dest.display());

        if self.fs.exists(&staging) {
            self.fs
                .remove_all(&staging)
                .map_err(|e| InstallError::CopyFailed {
                    dest: staging.clone(),
                    reason: format!("stale staging copy could not be removed: {}", e),
                    backup: None,
                })?;
        }

        if let Err(e) = self.fs.copy_dir(artifact, &staging) {
            if self.fs.exists(&staging) {
                let _ = self.fs.remove_all(&staging);
            }
            return Err(InstallError::CopyFailed {
                dest: staging,
                reason: e.to_string(),
                backup: None,
            });
        }

        let had_previous = self.fs.exists(dest);
        if had_previous {
            if self.fs.exists(&backup) {
                if let Err(e) = self.fs.remove_all(&backup) {
                    let _ = self.fs.remove_all(&staging);
                    return Err(InstallError::ReplaceFailed {
                        dest: dest.to_path_buf(),
                        reason: format!("old backup could not be removed: {}", e),
                        backup: None,
                    });
                }
            }
            log::info!("[Install] Backing up existing installation to {}", backup.display());
            if let Err(e) = self.fs.rename(dest, &backup) {
                let _ = self.fs.remove_all(&staging);
                return Err(InstallError::ReplaceFailed {
                    dest: dest.to_path_buf(),
                    reason: format!("existing installation could not be moved aside: {}", e),
                    backup: None,
                });
            }
        }

        if let Err(e) = self.fs.rename(&staging, dest) {
            let restored = had_previous && self.fs.rename(&backup, dest).is_ok();
            if restored {
                log::warn!("[Install] Swap failed, previous installation restored");
            }
            return Err(InstallError::ReplaceFailed {
                dest: dest.to_path_buf(),
                reason: e.to_string(),
                backup: if had_previous && !restored {
                    Some(backup)
                } else {
                    None
                },
            });
        }

        log::info!(target: "parsed", "[Install] Installed {}", dest.display());
        Ok(InstallReport {
            installed: dest.to_path_buf(),
            backup: had_previous.then_some(backup),
        })
    }
}

fn split_dest(dest: &Path) -> Result<(&Path, String), InstallError> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| InstallError::InvalidPath(format!("{} has no parent", dest.display())))?;
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| InstallError::InvalidPath(format!("{} has no file name", dest.display())))?;
    Ok((parent, name.to_string()))
}
