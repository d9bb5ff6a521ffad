//! appforge
//!
//! Builds a third-party application from its upstream repository, customizes the
//! resulting macOS bundle and installs it. While the compile runs, an update
//! watcher polls the remote; if upstream moves, the compile is cancelled and the
//! sync -> compile -> install sequence starts over.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **config**: Settings file, target presets and per-run configuration
//! - **source**: Version control (clone, fetch, hard reset, remote head probe)
//! - **orchestrator**: Build loop, compile execution and the update watcher
//! - **install**: Backup-then-replace installation, bundle customization, launchers
//! - **system**: Host tool checks and interactive prompts

// Core foundational modules
pub mod error;
pub mod models;

pub mod config;
pub mod install;
pub mod orchestrator;
pub mod source;
pub mod system;

// Robust, decoupled logging system
pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

// Re-export log collector for use throughout the system
pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    CompileError, ConfigError, ForgeError, InstallError, RecordError, Result, SyncError,
};

pub use models::{BuildPolicy, CompileOutcome, RetryPolicy, RevisionId};

pub use config::{ForgeConfig, Settings, TargetConfig, TargetDb};

pub use orchestrator::{
    BuildRecord, BuildStatus, BuildTool, Orchestrator, ProcessBuildTool, RunReport,
    UpdateWatcher, WatchOutcome,
};

pub use source::{GitSource, SourceControl};

pub use install::{Filesystem, InstallReport, Installer, LocalFs};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
