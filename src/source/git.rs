//! Native git management using the `git2` crate.
//!
//! Wraps `libgit2` for working-copy management so no `git` binary is required.

use futures::future::{BoxFuture, FutureExt};
use git2::{build::CheckoutBuilder, build::RepoBuilder, Direction, Repository, ResetType};
use std::path::{Path, PathBuf};

use super::SourceControl;
use crate::error::SyncError;
use crate::models::RevisionId;

/// Result type for git operations
pub type GitResult<T> = Result<T, SyncError>;

/// Query the head of `branch` on the remote at `url` (`git ls-remote` semantics).
///
/// Uses a detached remote so no local repository is read or written.
pub fn remote_head(url: &str, branch: &str) -> GitResult<RevisionId> {
    let mut remote = git2::Remote::create_detached(url).map_err(|e| {
        SyncError::Remote(format!("Failed to create remote for {}: {}", url, e))
    })?;

    remote
        .connect(Direction::Fetch)
        .map_err(|e| SyncError::Remote(format!("Failed to connect to {}: {}", url, e)))?;

    let wanted = format!("refs/heads/{}", branch);
    let head = remote
        .list()
        .map_err(|e| {
            SyncError::Remote(format!("Failed to list remote references for {}: {}", url, e))
        })?
        .iter()
        .find(|r| r.name() == wanted)
        .map(|r| RevisionId::from(r.oid()));

    let _ = remote.disconnect();

    head.ok_or_else(|| {
        SyncError::Remote(format!("Branch '{}' not found on remote {}", branch, url))
    })
}

/// Manages the local working copy using native git bindings
pub struct GitManager {
    repo_path: PathBuf,
}

impl GitManager {
    /// Creates a new GitManager for an existing repository
    pub fn new(repo_path: impl AsRef<Path>) -> GitResult<Self> {
        let repo_path = repo_path.as_ref().to_path_buf();

        if repo_path.exists() {
            Repository::open(&repo_path).map_err(|e| {
                SyncError::Repository(format!(
                    "Failed to open repository at {:?}: {}",
                    repo_path, e
                ))
            })?;
        }

        Ok(GitManager { repo_path })
    }

    /// Clones `branch` of `url` into `target_path`, trying a shallow clone first.
    pub fn clone(url: &str, branch: &str, target_path: impl AsRef<Path>) -> GitResult<Self> {
        let target_path = target_path.as_ref();

        log::info!("[Git] [CLONE] Cloning {} ({}) into {:?}", url, branch, target_path);

        Self::clone_with_depth(url, branch, target_path, Some(1)).or_else(|shallow_err| {
            log::warn!("[Git] [CLONE] Shallow clone failed: {}", shallow_err);
            log::warn!("[Git] [CLONE] Falling back to full clone");

            // libgit2 may leave a partial checkout behind
            if target_path.exists() {
                std::fs::remove_dir_all(target_path)?;
            }
            Self::clone_with_depth(url, branch, target_path, None)
        })?;

        log::info!("[Git] [CLONE] Clone completed");
        GitManager::new(target_path)
    }

    fn clone_with_depth(
        url: &str,
        branch: &str,
        target_path: &Path,
        depth: Option<i32>,
    ) -> GitResult<()> {
        let mut fetch_options = git2::FetchOptions::new();
        if let Some(depth) = depth {
            fetch_options.depth(depth);
        }

        let mut callbacks = git2::RemoteCallbacks::new();
        let mut last_percent = 0u32;
        callbacks.transfer_progress(move |progress| {
            let total = progress.total_objects();
            if total > 0 {
                let percent = (progress.received_objects() as f32 / total as f32 * 100.0) as u32;
                if percent >= last_percent + 10 || percent == 100 && last_percent != 100 {
                    log::debug!(
                        "[Git] [CLONE] [PROGRESS] {}/{} objects - {}%",
                        progress.received_objects(),
                        total,
                        percent
                    );
                    last_percent = percent;
                }
            }
            true
        });
        fetch_options.remote_callbacks(callbacks);

        let mut builder = RepoBuilder::new();
        builder.branch(branch);
        builder.fetch_options(fetch_options);
        builder
            .clone(url, target_path)
            .map_err(|e| SyncError::Clone(format!("Clone of {} failed: {}", url, e)))?;
        Ok(())
    }

    fn open(&self) -> GitResult<Repository> {
        Repository::open(&self.repo_path)
            .map_err(|e| SyncError::Repository(format!("Failed to open repository: {}", e)))
    }

    /// Point `origin` at `url`, creating it when missing.
    pub fn ensure_origin(&self, url: &str) -> GitResult<()> {
        let repo = self.open()?;
        let current = match repo.find_remote("origin") {
            Ok(remote) => remote.url().map(|s| s.to_string()),
            Err(_) => {
                repo.remote("origin", url)?;
                return Ok(());
            }
        };
        if current.as_deref() != Some(url) {
            log::info!("[Git] [SYNC] Updating origin URL to {}", url);
            repo.remote_set_url("origin", url)?;
        }
        Ok(())
    }

    /// Fetches `branch` from origin into `refs/remotes/origin/<branch>`.
    pub fn fetch(&self, branch: &str) -> GitResult<()> {
        let repo = self.open()?;

        let mut remote = repo
            .find_remote("origin")
            .map_err(|e| SyncError::Fetch(format!("Failed to find origin remote: {}", e)))?;

        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);
        remote
            .fetch(&[refspec.as_str()], None, None)
            .map_err(|e| SyncError::Fetch(format!("Fetch of '{}' failed: {}", branch, e)))?;

        Ok(())
    }

    /// Hard-resets the working copy to the fetched `origin/<branch>`.
    ///
    /// Tracked files touched by an interrupted build are restored; untracked
    /// build outputs are kept so the next compile stays incremental.
    pub fn reset_to_remote(&self, branch: &str) -> GitResult<RevisionId> {
        let repo = self.open()?;

        let remote_ref = format!("refs/remotes/origin/{}", branch);
        let commit = repo
            .find_reference(&remote_ref)
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| SyncError::Reset(format!("Cannot resolve {}: {}", remote_ref, e)))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))
            .map_err(|e| SyncError::Reset(format!("Reset to {} failed: {}", commit.id(), e)))?;

        Ok(RevisionId::from(commit.id()))
    }

    /// Gets the current HEAD commit hash
    pub fn get_head_commit(&self) -> GitResult<RevisionId> {
        let repo = self.open()?;

        let head = repo
            .head()
            .map_err(|e| SyncError::Repository(format!("Failed to read HEAD: {}", e)))?;

        let commit_id = head.target().ok_or_else(|| {
            SyncError::Repository("HEAD is not a direct reference".to_string())
        })?;

        Ok(RevisionId::from(commit_id))
    }

    /// Returns the path to the repository
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}

/// Clone or update the working copy at `path` to the head of `branch`.
pub fn sync_working_copy(url: &str, branch: &str, path: &Path) -> GitResult<RevisionId> {
    if !path.join(".git").exists() {
        let occupied = path.exists()
            && std::fs::read_dir(path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(true);
        if occupied {
            return Err(SyncError::Repository(format!(
                "{} exists but is not a git working copy",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = GitManager::clone(url, branch, path)?;
        return manager.get_head_commit();
    }

    log::info!("[Git] [SYNC] Updating working copy at {}", path.display());
    let manager = GitManager::new(path)?;
    manager.ensure_origin(url)?;
    manager.fetch(branch)?;
    manager.reset_to_remote(branch)
}

/// `SourceControl` backed by a git remote and a local working copy.
#[derive(Debug, Clone)]
pub struct GitSource {
    url: String,
    branch: String,
    working_copy: PathBuf,
}

impl GitSource {
    pub fn new(url: impl Into<String>, branch: impl Into<String>, working_copy: PathBuf) -> Self {
        GitSource {
            url: url.into(),
            branch: branch.into(),
            working_copy,
        }
    }

    pub fn working_copy(&self) -> &Path {
        &self.working_copy
    }
}

impl SourceControl for GitSource {
    fn sync(&self) -> BoxFuture<'_, Result<RevisionId, SyncError>> {
        let this = self.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                sync_working_copy(&this.url, &this.branch, &this.working_copy)
            })
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
        }
        .boxed()
    }

    fn fetch_head(&self) -> BoxFuture<'_, Result<RevisionId, SyncError>> {
        let url = self.url.clone();
        let branch = self.branch.clone();
        async move {
            tokio::task::spawn_blocking(move || remote_head(&url, &branch))
                .await
                .map_err(|e| SyncError::Task(e.to_string()))?
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_manager_creation_on_missing_path() {
        let repo_path = PathBuf::from("/tmp/appforge_nonexistent_repo");
        assert!(GitManager::new(&repo_path).is_ok());
    }

    #[test]
    fn test_sync_refuses_foreign_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "not a repo").unwrap();

        let result = sync_working_copy("/nonexistent/remote", "main", temp_dir.path());
        assert!(matches!(result, Err(SyncError::Repository(_))));
    }

    #[test]
    fn test_remote_head_unreachable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("no-such-remote");
        assert!(remote_head(missing.to_str().unwrap(), "main").is_err());
    }
}
