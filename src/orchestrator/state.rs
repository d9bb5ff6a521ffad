//! Build State Management and Status Tracking
//!
//! **Architecture**:
//! - `BuildStatus`: discrete states of one build attempt
//! - `BuildRecord`: revision being built, its status and the last successful revision
//! - Transitions are validated; the orchestrator is the only writer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::models::RevisionId;

/// Status of the current build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildStatus {
    /// Nothing running; the next step is a sync
    Idle,

    /// Compile process running for the current revision
    InProgress,

    /// Compile finished with exit code 0
    Succeeded,

    /// Compile finished with a nonzero exit code
    Failed,

    /// Upstream advanced during the compile; the attempt is abandoned
    RestartRequested,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Idle => "idle",
            BuildStatus::InProgress => "in-progress",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::RestartRequested => "restart-requested",
        }
    }

    /// Get all valid transitions FROM this status.
    pub fn valid_next(&self) -> &'static [BuildStatus] {
        match self {
            BuildStatus::Idle => &[BuildStatus::InProgress],
            BuildStatus::InProgress => &[
                BuildStatus::Succeeded,
                BuildStatus::Failed,
                BuildStatus::RestartRequested,
            ],
            BuildStatus::RestartRequested => &[BuildStatus::Idle],
            BuildStatus::Succeeded | BuildStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: BuildStatus) -> bool {
        self.valid_next().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_next().is_empty()
    }
}

/// Revision being built, its status, and the last successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Revision of the current attempt, set by sync
    pub revision: Option<RevisionId>,

    pub status: BuildStatus,

    /// Last revision that was built and installed, persisted across runs
    pub last_successful: Option<RevisionId>,

    /// Number of compile attempts in this run
    pub attempts: u32,

    pub updated_at: DateTime<Utc>,
}

impl BuildRecord {
    pub fn new(last_successful: Option<RevisionId>) -> Self {
        BuildRecord {
            revision: None,
            status: BuildStatus::Idle,
            last_successful,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }

    /// Attempt a status transition.
    pub fn transition_to(&mut self, next: BuildStatus) -> Result<(), RecordError> {
        if !self.status.can_transition_to(next) {
            return Err(RecordError::InvalidTransition(format!(
                "{} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        if next == BuildStatus::InProgress {
            self.attempts += 1;
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the revision produced by a sync. Only valid while idle.
    pub fn set_revision(&mut self, revision: RevisionId) -> Result<(), RecordError> {
        if self.status != BuildStatus::Idle {
            return Err(RecordError::InvalidTransition(format!(
                "revision changed while {}",
                self.status.as_str()
            )));
        }
        self.revision = Some(revision);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True when the synced revision was already built and installed.
    pub fn is_current(&self) -> bool {
        matches!((&self.revision, &self.last_successful), (Some(a), Some(b)) if a == b)
    }

    /// Promote the current revision to last successful. Requires `Succeeded`.
    pub fn mark_installed(&mut self) -> Result<(), RecordError> {
        if self.status != BuildStatus::Succeeded {
            return Err(RecordError::InvalidTransition(format!(
                "cannot mark installed while {}",
                self.status.as_str()
            )));
        }
        self.last_successful = self.revision.clone();
        self.updated_at = Utc::now();
        Ok(())
    }
}
