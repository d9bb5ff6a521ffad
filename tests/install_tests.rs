//! Backup-then-replace ordering of the installer under injected failures.

use appforge::install::{Filesystem, Installer, LocalFs};
use appforge::InstallError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    /// Copy writes part of the tree, then fails
    Copy,
    /// Moving the staged copy into place fails
    FinalRename,
    /// Moving the staged copy into place and restoring the backup both fail
    FinalRenameAndRestore,
}

/// Local disk with an operation journal and one injected fault.
struct FaultyFs {
    inner: LocalFs,
    fault: Fault,
    journal: Mutex<Vec<String>>,
    renames: Mutex<u32>,
}

impl FaultyFs {
    fn new(fault: Fault) -> Arc<Self> {
        Arc::new(FaultyFs {
            inner: LocalFs,
            fault,
            journal: Mutex::new(Vec::new()),
            renames: Mutex::new(0),
        })
    }

    fn record(&self, op: &str, path: &Path) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.journal.lock().unwrap().push(format!("{} {}", op, name));
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl Filesystem for FaultyFs {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn copy_dir(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("copy", to);
        if self.fault == Fault::Copy {
            fs::create_dir_all(to.join("Contents"))?;
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.inner.copy_dir(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("rename", to);
        let n = {
            let mut renames = self.renames.lock().unwrap();
            *renames += 1;
            *renames
        };
        // rename 1 moves the old install aside, rename 2 moves staging into place
        let fail = match self.fault {
            Fault::FinalRename => n == 2,
            Fault::FinalRenameAndRestore => n >= 2,
            _ => false,
        };
        if fail {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected"));
        }
        self.inner.rename(from, to)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        self.record("remove", path);
        self.inner.remove_all(path)
    }

    fn is_writable_dir(&self, path: &Path) -> bool {
        self.inner.is_writable_dir(path)
    }
}

struct Layout {
    _dir: TempDir,
    artifact: PathBuf,
    dest: PathBuf,
}

fn layout() -> Layout {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("build/Zed.app");
    fs::create_dir_all(artifact.join("Contents/MacOS")).unwrap();
    fs::write(artifact.join("Contents/MacOS/zed"), "new").unwrap();

    let apps = dir.path().join("Applications");
    let dest = apps.join("Zed Dev.app");
    fs::create_dir_all(dest.join("Contents/MacOS")).unwrap();
    fs::write(dest.join("Contents/MacOS/zed"), "old").unwrap();

    Layout {
        _dir: dir,
        artifact,
        dest,
    }
}

fn installed(dest: &Path) -> String {
    fs::read_to_string(dest.join("Contents/MacOS/zed")).unwrap()
}

#[test]
fn test_copy_happens_before_existing_install_is_touched() {
    let l = layout();
    let fs_impl = FaultyFs::new(Fault::None);
    let report = Installer::new(fs_impl.clone())
        .install(&l.artifact, &l.dest)
        .unwrap();

    assert_eq!(
        fs_impl.journal(),
        vec![
            "copy .Zed Dev.app.appforge-staging".to_string(),
            "rename Zed Dev.app.appforge-backup".to_string(),
            "rename Zed Dev.app".to_string(),
        ]
    );
    assert_eq!(installed(&l.dest), "new");
    assert_eq!(installed(&report.backup.unwrap()), "old");
}

#[test]
fn test_copy_failure_leaves_existing_install_untouched() {
    let l = layout();
    let fs_impl = FaultyFs::new(Fault::Copy);
    let err = Installer::new(fs_impl.clone())
        .install(&l.artifact, &l.dest)
        .unwrap_err();

    assert!(matches!(err, InstallError::CopyFailed { backup: None, .. }));
    assert_eq!(installed(&l.dest), "old");
    assert!(!fs_impl
        .journal()
        .iter()
        .any(|op| op.starts_with("rename") || op == "remove Zed Dev.app"));
    // The partial staging copy is cleaned up
    assert!(!Installer::staging_path(&l.dest).unwrap().exists());
}

#[test]
fn test_failed_swap_restores_previous_install() {
    let l = layout();
    let err = Installer::new(FaultyFs::new(Fault::FinalRename))
        .install(&l.artifact, &l.dest)
        .unwrap_err();

    assert!(matches!(
        err,
        InstallError::ReplaceFailed { backup: None, .. }
    ));
    assert_eq!(installed(&l.dest), "old");
}

#[test]
fn test_failed_swap_and_restore_reports_backup() {
    let l = layout();
    let err = Installer::new(FaultyFs::new(Fault::FinalRenameAndRestore))
        .install(&l.artifact, &l.dest)
        .unwrap_err();

    let backup = err.backup().cloned().expect("backup path reported");
    assert_eq!(backup, Installer::backup_path(&l.dest).unwrap());
    assert_eq!(installed(&backup), "old");
    assert!(err.to_string().contains("injected"));
}

#[test]
fn test_missing_artifact_never_touches_destination() {
    let l = layout();
    let fs_impl = FaultyFs::new(Fault::None);
    let err = Installer::new(fs_impl.clone())
        .install(&l.artifact.with_file_name("Missing.app"), &l.dest)
        .unwrap_err();

    assert!(matches!(err, InstallError::ArtifactMissing(_)));
    assert!(fs_impl.journal().is_empty());
    assert_eq!(installed(&l.dest), "old");
}
