/// System module: host tool checks and interactive prompts

pub mod prompt;

use std::path::PathBuf;

use crate::config::TargetConfig;
use crate::error::ConfigError;
use crate::install::bundle::{PLIST_BUDDY, SIPS};
use crate::install::BundleCustomizer;

/// Logging macros for convenient access
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::info!("{}", msg);
    }}
}

#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        // Use target="parsed" for high-level events
        log::info!(target: "parsed", "{}", msg);
    }}
}

/// External programs a target needs before a run can start.
///
/// `git` itself is not listed: source control goes through libgit2.
pub fn required_tools(target: &TargetConfig) -> Vec<String> {
    let mut tools = Vec::new();

    // Programs given as a path inside the repository only exist after sync
    if !target.build_program.contains('/') {
        tools.push(target.build_program.clone());
    }

    if cfg!(target_os = "macos") {
        let customizer = BundleCustomizer::from_target(target);
        if !customizer.is_noop() {
            tools.push(PLIST_BUDDY.to_string());
        }
        if customizer.icon_source.is_some() {
            tools.push(SIPS.to_string());
        }
    }
    tools
}

/// Resolve every required tool, failing on the first one that is missing.
pub fn check_dependencies(target: &TargetConfig) -> Result<Vec<PathBuf>, ConfigError> {
    let mut resolved = Vec::new();
    for tool in required_tools(target) {
        match which::which(&tool) {
            Ok(path) => {
                log::debug!("[System] [PREFLIGHT] {} -> {}", tool, path.display());
                resolved.push(path);
            }
            Err(_) => {
                log::error!("[System] [PREFLIGHT] Required tool not found: {}", tool);
                return Err(ConfigError::MissingTool(tool));
            }
        }
    }
    Ok(resolved)
}
