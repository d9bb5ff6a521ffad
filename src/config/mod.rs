//! Configuration management: persisted settings, per-target build recipes and the
//! resolved runtime configuration handed to the orchestrator.

pub mod loader;
pub mod targets;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::RetryPolicy;

pub use targets::TargetDb;

/// Environment variable that selects the target to build.
pub const TARGET_ENV: &str = "APPFORGE_TARGET";

/// Build recipe for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Short name, also used for the working-copy directory and record file.
    pub name: String,
    /// Git remote to clone and poll.
    pub repo_url: String,
    /// Branch to build.
    pub branch: String,
    /// Build tool program, resolved relative to the working copy when it contains a `/`.
    pub build_program: String,
    /// Arguments always passed to the build tool.
    #[serde(default)]
    pub build_args: Vec<String>,
    /// Extra arguments appended in release mode.
    #[serde(default)]
    pub release_args: Vec<String>,
    /// Build in release mode.
    #[serde(default = "default_true")]
    pub release: bool,
    /// Artifact path relative to the working copy; `{profile}` expands to `release` or `debug`.
    pub artifact: String,
    /// Name of the installed bundle, e.g. `Zed.app`.
    pub bundle_name: String,
    /// Value written to `CFBundleName`/`CFBundleDisplayName`; unchanged when empty.
    #[serde(default)]
    pub display_name: String,
    /// Image converted to the bundle icon; skipped when absent.
    #[serde(default)]
    pub icon_source: Option<PathBuf>,
    /// Directory the bundle is installed into.
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    /// Directory launchers are created in.
    #[serde(default = "default_launcher_dir")]
    pub launcher_dir: PathBuf,
    /// CLI binary inside the bundle the launcher links to; a wrapper script is written when absent.
    #[serde(default)]
    pub launcher_binary: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("/Applications")
}

fn default_launcher_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}

impl TargetConfig {
    /// `release` or `debug`.
    pub fn profile(&self) -> &'static str {
        if self.release {
            "release"
        } else {
            "debug"
        }
    }

    /// Artifact location inside `working_copy` for the configured profile.
    pub fn artifact_path(&self, working_copy: &Path) -> PathBuf {
        working_copy.join(self.artifact.replace("{profile}", self.profile()))
    }

    /// Final installation path of the bundle.
    pub fn install_path(&self) -> PathBuf {
        self.install_dir.join(&self.bundle_name)
    }

    /// Full argument list for the build tool.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.build_args.clone();
        if self.release {
            args.extend(self.release_args.iter().cloned());
        }
        args
    }

    /// Reject recipes that cannot possibly build.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Target name cannot be empty".to_string(),
            ));
        }
        if self.name.contains('/') || self.name.contains("..") {
            return Err(ConfigError::ValidationFailed(format!(
                "Target name '{}' must not contain path separators",
                self.name
            )));
        }
        if self.repo_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "Target '{}' has no repository URL",
                self.name
            )));
        }
        if self.branch.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "Target '{}' has no branch",
                self.name
            )));
        }
        if self.build_program.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "Target '{}' has no build program",
                self.name
            )));
        }
        if self.artifact.trim().is_empty() || Path::new(&self.artifact).is_absolute() {
            return Err(ConfigError::ValidationFailed(format!(
                "Target '{}' artifact must be a relative path",
                self.name
            )));
        }
        if self.bundle_name.trim().is_empty() || self.bundle_name.contains('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "Target '{}' bundle name must be a plain file name",
                self.name
            )));
        }
        Ok(())
    }
}

/// Settings persisted at `~/.config/appforge/settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Target built when `APPFORGE_TARGET` is unset.
    pub default_target: String,
    /// Parent directory of all working copies.
    pub workspace_dir: Option<PathBuf>,
    /// Directory holding the persisted build records.
    pub state_dir: Option<PathBuf>,
    /// Directory for full and parsed build logs.
    pub log_dir: Option<PathBuf>,
    /// Seconds between upstream polls while compiling.
    pub poll_interval_secs: u64,
    /// Seconds to wait after SIGTERM before killing the build tool.
    pub termination_grace_secs: u64,
    pub retry: RetryPolicy,
    /// User-defined targets; shadow built-in presets of the same name.
    pub targets: HashMap<String, TargetConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_target: "zed".to_string(),
            workspace_dir: None,
            state_dir: None,
            log_dir: None,
            poll_interval_secs: 60,
            termination_grace_secs: 30,
            retry: RetryPolicy::default(),
            targets: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        for (key, target) in &self.targets {
            if key != &target.name {
                return Err(ConfigError::ValidationFailed(format!(
                    "Target key '{}' does not match its name '{}'",
                    key, target.name
                )));
            }
            target.validate()?;
        }
        Ok(())
    }

    /// Look up a target, preferring user-defined recipes over built-in presets.
    pub fn resolve_target(&self, name: &str) -> Result<TargetConfig, ConfigError> {
        let target = match self.targets.get(name) {
            Some(target) => target.clone(),
            None => TargetDb::new()
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))?,
        };
        target.validate()?;
        Ok(target)
    }

    /// Resolve everything the orchestrator needs for `target_name`.
    pub fn forge_config(&self, target_name: &str) -> Result<ForgeConfig, ConfigError> {
        self.validate()?;
        let target = self.resolve_target(target_name)?;
        let data_dir = loader::get_data_dir()?;

        let workspace_dir = self
            .workspace_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("sources"));
        let state_dir = self
            .state_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("state"));

        Ok(ForgeConfig {
            working_copy: workspace_dir.join(&target.name),
            record_path: state_dir.join(format!("{}.last_build.json", target.name)),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            termination_grace: Duration::from_secs(self.termination_grace_secs),
            retry: self.retry.clone(),
            target,
        })
    }
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub target: TargetConfig,
    /// Local checkout used as compile input; reused across runs.
    pub working_copy: PathBuf,
    /// Persisted `BuildRecord` location.
    pub record_path: PathBuf,
    pub poll_interval: Duration,
    pub termination_grace: Duration,
    pub retry: RetryPolicy,
}
