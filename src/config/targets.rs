//! Built-in target presets.
//!
//! Maps target names to the repository, build command and bundle layout used to
//! produce a customized application bundle.

use std::collections::HashMap;
use std::path::PathBuf;

use super::TargetConfig;

/// Built-in target database.
pub struct TargetDb {
    targets: HashMap<String, TargetConfig>,
}

impl TargetDb {
    /// Create the database with all known presets.
    pub fn new() -> Self {
        let mut targets = HashMap::new();

        // Zed editor, bundled with cargo-bundle
        targets.insert(
            "zed".to_string(),
            TargetConfig {
                name: "zed".to_string(),
                repo_url: "https://github.com/zed-industries/zed.git".to_string(),
                branch: "main".to_string(),
                build_program: "cargo".to_string(),
                build_args: vec![
                    "bundle".to_string(),
                    "--package".to_string(),
                    "zed".to_string(),
                ],
                release_args: vec!["--release".to_string()],
                release: true,
                artifact: "target/{profile}/bundle/osx/Zed.app".to_string(),
                bundle_name: "Zed Dev.app".to_string(),
                display_name: "Zed Dev".to_string(),
                icon_source: None,
                install_dir: PathBuf::from("/Applications"),
                launcher_dir: PathBuf::from("/usr/local/bin"),
                launcher_binary: Some("Contents/MacOS/cli".to_string()),
            },
        );

        // Alacritty terminal; its Makefile always builds release
        targets.insert(
            "alacritty".to_string(),
            TargetConfig {
                name: "alacritty".to_string(),
                repo_url: "https://github.com/alacritty/alacritty.git".to_string(),
                branch: "master".to_string(),
                build_program: "make".to_string(),
                build_args: vec!["app".to_string()],
                release_args: Vec::new(),
                release: true,
                artifact: "target/{profile}/osx/Alacritty.app".to_string(),
                bundle_name: "Alacritty.app".to_string(),
                display_name: String::new(),
                icon_source: None,
                install_dir: PathBuf::from("/Applications"),
                launcher_dir: PathBuf::from("/usr/local/bin"),
                launcher_binary: Some("Contents/MacOS/alacritty".to_string()),
            },
        );

        TargetDb { targets }
    }

    pub fn get(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name.trim())
    }

    /// Sorted preset names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

impl Default for TargetDb {
    fn default() -> Self {
        Self::new()
    }
}
