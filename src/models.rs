//! Core data types for appforge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Identifier of a point in the remote source history (a commit sha for git).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        RevisionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(7).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<git2::Oid> for RevisionId {
    fn from(oid: git2::Oid) -> Self {
        RevisionId(oid.to_string())
    }
}

/// Result of one compile attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Build tool exited 0; the artifact exists at this path.
    Succeeded(PathBuf),
    /// Build tool exited nonzero (or was killed by a signal, reported as -1).
    Failed(i32),
    /// The cancel signal fired and the process was terminated.
    Cancelled,
}

/// Policy decisions supplied by the caller instead of asked mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPolicy {
    /// Rebuild even when the last successful build matches upstream.
    pub rebuild_if_current: bool,
    /// Create a command-line launcher after installing.
    pub create_launcher: bool,
    /// File name of the launcher inside the launcher directory.
    pub launcher_name: String,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        BuildPolicy {
            rebuild_if_current: false,
            create_launcher: false,
            launcher_name: String::new(),
        }
    }
}

/// Bound on compile restarts caused by upstream changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// `None` restarts forever.
    pub max_restarts: Option<u32>,
    /// Base delay; restart `n` waits `n * backoff`.
    #[serde(with = "duration_secs")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_restarts: Some(10),
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before restart number `restart` (1-based).
    pub fn delay_for(&self, restart: u32) -> Duration {
        self.backoff.saturating_mul(restart)
    }

    /// Whether another restart is allowed after `restarts` have already happened.
    pub fn allows(&self, restarts: u32) -> bool {
        match self.max_restarts {
            Some(max) => restarts < max,
            None => true,
        }
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
