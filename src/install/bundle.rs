//! Application bundle customization.
//!
//! Renames the bundle's display name in `Contents/Info.plist` and installs a
//! custom icon, using the macOS `PlistBuddy` and `sips` tools with fixed argument
//! lists. On other platforms the step is skipped with a warning.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::TargetConfig;
use crate::error::InstallError;

pub const PLIST_BUDDY: &str = "/usr/libexec/PlistBuddy";
pub const SIPS: &str = "sips";

/// Info.plist edits and icon conversion for one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BundleCustomizer {
    pub display_name: Option<String>,
    pub icon_source: Option<PathBuf>,
}

impl BundleCustomizer {
    pub fn from_target(target: &TargetConfig) -> Self {
        let display_name = Some(target.display_name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        BundleCustomizer {
            display_name,
            icon_source: target.icon_source.clone(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.display_name.is_none() && self.icon_source.is_none()
    }

    /// Values written into `CFBundleName` and `CFBundleDisplayName`, plus the icon entry.
    pub fn plist_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        if let Some(name) = &self.display_name {
            entries.push(("CFBundleName", name.clone()));
            entries.push(("CFBundleDisplayName", name.clone()));
        }
        if let Some(icon) = self.icon_file_name() {
            entries.push(("CFBundleIconFile", icon));
        }
        entries
    }

    fn icon_file_name(&self) -> Option<String> {
        let stem = self.icon_source.as_ref()?.file_stem()?.to_str()?;
        Some(format!("{}.icns", stem))
    }

    /// Customize the bundle at `bundle` in place.
    pub fn customize(&self, bundle: &Path) -> Result<(), InstallError> {
        if self.is_noop() {
            return Ok(());
        }

        let plist = bundle.join("Contents/Info.plist");
        if !plist.is_file() {
            return Err(InstallError::Customize(format!(
                "{} not found",
                plist.display()
            )));
        }
        if let Some(icon) = &self.icon_source {
            if !icon.is_file() {
                return Err(InstallError::Customize(format!(
                    "icon source {} not found",
                    icon.display()
                )));
            }
        }

        if !cfg!(target_os = "macos") {
            log::warn!("[Bundle] Bundle customization requires macOS; skipping");
            return Ok(());
        }

        if let (Some(icon), Some(icon_name)) = (&self.icon_source, self.icon_file_name()) {
            let dest = bundle.join("Contents/Resources").join(&icon_name);
            log::info!("[Bundle] Converting icon {} -> {}", icon.display(), dest.display());
            run_tool(
                Command::new(SIPS)
                    .arg("-s")
                    .arg("format")
                    .arg("icns")
                    .arg(icon)
                    .arg("--out")
                    .arg(&dest),
            )?;
        }

        for (key, value) in self.plist_entries() {
            set_plist_string(&plist, key, &value)?;
        }

        log::info!(target: "parsed", "[Bundle] Customized {}", bundle.display());
        Ok(())
    }
}

/// `Set` the key, falling back to `Add` when the key does not exist yet.
fn set_plist_string(plist: &Path, key: &str, value: &str) -> Result<(), InstallError> {
    let set = Command::new(PLIST_BUDDY)
        .arg("-c")
        .arg(format!("Set :{} {}", key, value))
        .arg(plist)
        .output()
        .map_err(|e| InstallError::Customize(format!("{}: {}", PLIST_BUDDY, e)))?;
    if set.status.success() {
        return Ok(());
    }

    run_tool(
        Command::new(PLIST_BUDDY)
            .arg("-c")
            .arg(format!("Add :{} string {}", key, value))
            .arg(plist),
    )
}

fn run_tool(cmd: &mut Command) -> Result<(), InstallError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = cmd
        .output()
        .map_err(|e| InstallError::Customize(format!("{}: {}", program, e)))?;
    if !output.status.success() {
        return Err(InstallError::Customize(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetDb;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_from_target_ignores_blank_display_name() {
        let mut target = TargetDb::new().get("zed").unwrap().clone();
        target.display_name = "   ".to_string();
        assert!(BundleCustomizer::from_target(&target).is_noop());
    }

    #[test]
    fn test_plist_entries() {
        let customizer = BundleCustomizer {
            display_name: Some("Zed Dev".to_string()),
            icon_source: Some(PathBuf::from("/tmp/icons/zed-dev.png")),
        };
        assert_eq!(
            customizer.plist_entries(),
            vec![
                ("CFBundleName", "Zed Dev".to_string()),
                ("CFBundleDisplayName", "Zed Dev".to_string()),
                ("CFBundleIconFile", "zed-dev.icns".to_string()),
            ]
        );
    }

    #[test]
    fn test_noop_does_not_touch_bundle() {
        let dir = TempDir::new().unwrap();
        BundleCustomizer::default()
            .customize(&dir.path().join("missing.app"))
            .unwrap();
    }

    #[test]
    fn test_missing_plist_is_error() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("App.app");
        fs::create_dir_all(bundle.join("Contents")).unwrap();
        let customizer = BundleCustomizer {
            display_name: Some("App".to_string()),
            icon_source: None,
        };
        assert!(matches!(
            customizer.customize(&bundle),
            Err(InstallError::Customize(_))
        ));
    }

    #[test]
    fn test_missing_icon_is_error() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("App.app");
        fs::create_dir_all(bundle.join("Contents")).unwrap();
        fs::write(bundle.join("Contents/Info.plist"), "<plist/>").unwrap();
        let customizer = BundleCustomizer {
            display_name: None,
            icon_source: Some(dir.path().join("nope.png")),
        };
        let err = customizer.customize(&bundle).unwrap_err();
        assert!(err.to_string().contains("nope.png"));
    }
}
