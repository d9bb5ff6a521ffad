//! Unified error type hierarchy for appforge
//!
//! Provides structured error handling with SyncError, CompileError, InstallError,
//! ConfigError, RecordError and the umbrella ForgeError returned by the orchestrator.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Version-control and network errors raised while synchronizing the working copy.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Clone failed: {0}")]
    Clone(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Remote query failed: {0}")]
    Remote(String),

    #[error("Reset of working copy failed: {0}")]
    Reset(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Background sync task failed: {0}")]
    Task(String),

    #[error("IO error during sync: {0}")]
    Io(#[from] io::Error),

    #[error("Git2 error: {0}")]
    Git2(#[from] git2::Error),
}

/// Errors raised by the build-tool invocation itself.
///
/// A nonzero exit code is not an error here: it is reported as
/// `CompileOutcome::Failed`, and a cancelled compile as `CompileOutcome::Cancelled`.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Failed to spawn build tool '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Build tool output could not be captured: {0}")]
    Output(String),

    #[error("Failed to wait for build tool: {0}")]
    Wait(String),

    #[error("Build succeeded but artifact is missing: {0}")]
    ArtifactMissing(PathBuf),
}

/// Installation, bundle customization and launcher errors.
///
/// Every variant that can happen after an existing installation has been moved
/// aside carries the backup location so the user can roll back manually.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Build artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    #[error("Destination not writable (elevated privileges may be required): {0}")]
    NotWritable(PathBuf),

    #[error("Copy to {dest} failed: {reason}")]
    CopyFailed {
        dest: PathBuf,
        reason: String,
        backup: Option<PathBuf>,
    },

    #[error("Replacing installation at {dest} failed: {reason}")]
    ReplaceFailed {
        dest: PathBuf,
        reason: String,
        backup: Option<PathBuf>,
    },

    #[error("Bundle customization failed: {0}")]
    Customize(String),

    #[error("Launcher creation failed: {0}")]
    Launcher(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Background install task failed: {0}")]
    Task(String),
}

impl InstallError {
    /// Location of the preserved previous installation, if one was moved aside.
    pub fn backup(&self) -> Option<&PathBuf> {
        match self {
            InstallError::CopyFailed { backup, .. } | InstallError::ReplaceFailed { backup, .. } => {
                backup.as_ref()
            }
            _ => None,
        }
    }
}

/// Settings file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Required tool not found on PATH: {0}")]
    MissingTool(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Errors loading or saving the persisted build record.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid build record JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("IO error on build record: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),
}

/// Top-level error for one orchestrated run. Every variant maps to exit code 1.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Build failed with exit code {exit_code}")]
    CompileFailed { exit_code: i32 },

    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Build record error: {0}")]
    Record(#[from] RecordError),

    #[error("Upstream kept changing: gave up after {restarts} restarts")]
    RestartLimitExceeded { restarts: u32 },

    #[error("Build aborted by user")]
    Aborted,
}

impl ForgeError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// User-facing message, including rollback hints where a backup exists.
    pub fn user_message(&self) -> String {
        match self {
            ForgeError::Install(e) => match e.backup() {
                Some(backup) => format!(
                    "{}\nYour previous installation was preserved at {}; move it back to roll back.",
                    e,
                    backup.display()
                ),
                None => e.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Top-level result type for operations that may fail.
pub type Result<T> = std::result::Result<T, ForgeError>;
