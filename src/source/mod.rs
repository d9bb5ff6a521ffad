//! Upstream source management.
//!
//! `SourceControl` is the seam between the orchestrator and version control: the
//! orchestrator syncs the working copy through it and the update watcher polls the
//! remote head through it. `GitSource` is the production implementation.

pub mod git;

use futures::future::BoxFuture;

use crate::error::SyncError;
use crate::models::RevisionId;

pub use git::{GitManager, GitSource};

/// Version-control operations needed by a build run.
pub trait SourceControl: Send + Sync {
    /// Bring the local working copy to the remote branch head, cloning it first if
    /// missing, and return the revision now checked out.
    ///
    /// Must be idempotent with respect to partial state left by a cancelled compile.
    fn sync(&self) -> BoxFuture<'_, Result<RevisionId, SyncError>>;

    /// Query the remote branch head without touching the working copy.
    fn fetch_head(&self) -> BoxFuture<'_, Result<RevisionId, SyncError>>;
}
