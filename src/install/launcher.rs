//! Command-line launcher for an installed bundle.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::InstallError;

/// First line after the shebang of every wrapper we write.
const WRAPPER_MARKER: &str = "# appforge launcher";

const FORBIDDEN_CHARS: &[char] = &[
    '/', '\\', '$', '`', '"', '\'', ';', '&', '|', '<', '>', '(', ')', '{', '}', '*', '?', '[',
    ']', '!', '~', '#',
];

/// Reject names that are empty, contain whitespace, path separators or shell metacharacters.
pub fn validate_launcher_name(name: &str) -> Result<(), InstallError> {
    if name.is_empty() {
        return Err(InstallError::Launcher(
            "launcher name cannot be empty".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(InstallError::Launcher(format!(
            "'{}' is not a valid launcher name",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(InstallError::Launcher(format!(
            "launcher name '{}' contains forbidden character {:?}",
            name, bad
        )));
    }
    Ok(())
}

/// How the launcher reaches the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherKind {
    Symlink(PathBuf),
    Wrapper,
}

/// Create or replace `<launcher_dir>/<name>` for the bundle at `bundle`.
///
/// Links to `bundle/<launcher_binary>` when the bundle ships a CLI, otherwise
/// writes a shell wrapper that opens the bundle.
pub fn create_launcher(
    bundle: &Path,
    launcher_binary: Option<&str>,
    launcher_dir: &Path,
    name: &str,
) -> Result<PathBuf, InstallError> {
    validate_launcher_name(name)?;

    if !launcher_dir.is_dir() {
        return Err(InstallError::Launcher(format!(
            "launcher directory {} does not exist",
            launcher_dir.display()
        )));
    }

    let path = launcher_dir.join(name);
    ensure_replaceable(&path, bundle)?;

    let kind = match launcher_binary.map(|rel| bundle.join(rel)) {
        Some(binary) if binary.is_file() => LauncherKind::Symlink(binary),
        _ => LauncherKind::Wrapper,
    };

    // Built beside the final name, then renamed over it, so a failed write
    // leaves the previous launcher in place
    let staging = launcher_dir.join(format!(".{}.appforge-new", name));
    let _ = fs::remove_file(&staging);
    let created = match &kind {
        LauncherKind::Symlink(binary) => symlink(binary, &staging),
        LauncherKind::Wrapper => write_wrapper(bundle, &staging),
    };
    if let Err(e) = created {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    if let Err(e) = fs::rename(&staging, &path) {
        let _ = fs::remove_file(&staging);
        return Err(InstallError::Launcher(format!(
            "cannot replace {}: {} (elevated privileges may be required)",
            path.display(),
            e
        )));
    }

    log::info!(
        target: "parsed",
        "[Launcher] Created {} ({})",
        path.display(),
        match kind {
            LauncherKind::Symlink(_) => "symlink",
            LauncherKind::Wrapper => "wrapper",
        }
    );
    Ok(path)
}

/// Only a symlink into `bundle` or a wrapper we wrote may be replaced.
/// Anything else at `path` is left alone.
fn ensure_replaceable(path: &Path, bundle: &Path) -> Result<(), InstallError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Ok(()),
    };

    let ours = if meta.file_type().is_symlink() {
        fs::read_link(path)
            .map(|target| target.starts_with(bundle))
            .unwrap_or(false)
    } else {
        meta.is_file()
            && fs::read_to_string(path)
                .map(|content| content.lines().nth(1) == Some(WRAPPER_MARKER))
                .unwrap_or(false)
    };
    if !ours {
        return Err(InstallError::Launcher(format!(
            "{} already exists and was not created by appforge",
            path.display()
        )));
    }
    Ok(())
}

fn wrapper_script(bundle: &Path) -> String {
    let escaped = bundle.display().to_string().replace('\'', r"'\''");
    format!(
        "#!/bin/sh\n{}\nexec open -a '{}' --args \"$@\"\n",
        WRAPPER_MARKER, escaped
    )
}

fn write_wrapper(bundle: &Path, path: &Path) -> Result<(), InstallError> {
    fs::write(path, wrapper_script(bundle)).map_err(|e| {
        InstallError::Launcher(format!(
            "cannot write {}: {} (elevated privileges may be required)",
            path.display(),
            e
        ))
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| InstallError::Launcher(e.to_string()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<(), InstallError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| {
        InstallError::Launcher(format!(
            "cannot link {}: {} (elevated privileges may be required)",
            link.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> Result<(), InstallError> {
    Err(InstallError::Launcher(
        "symlinked launchers are only supported on Unix".to_string(),
    ))
}
