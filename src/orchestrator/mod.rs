//! Build orchestration: sync -> compile (watched for upstream changes) -> install.
//!
//! A compile that is cancelled because upstream moved loops back to a fresh
//! sync. A nonzero compile exit, an install error or a user abort ends the run.

pub mod checkpoint;
pub mod executor;
pub mod state;
pub mod watcher;

use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

pub use checkpoint::Checkpoint;
pub use executor::{BuildTool, ProcessBuildTool};
pub use state::{BuildRecord, BuildStatus};
pub use watcher::{UpdateWatcher, WatchOutcome, WatcherHandle};

use crate::config::ForgeConfig;
use crate::error::{ForgeError, InstallError, RecordError, Result};
use crate::install::{launcher, BundleCustomizer, InstallReport, Installer};
use crate::log_parsed;
use crate::models::{BuildPolicy, CompileOutcome, RevisionId};
use crate::source::{GitSource, SourceControl};
use crate::LogCollector;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub revision: RevisionId,
    pub installed: PathBuf,
    /// Previous installation moved aside by this run
    pub backup: Option<PathBuf>,
    pub launcher: Option<PathBuf>,
    /// Compiles abandoned because upstream advanced
    pub restarts: u32,
    /// Nothing was built because the installation already matched upstream
    pub up_to_date: bool,
}

/// Last successfully installed revision for the configured target, if any.
pub fn load_last_successful(
    config: &ForgeConfig,
) -> std::result::Result<Option<RevisionId>, RecordError> {
    Ok(checkpoint::load(&config.record_path)?
        .filter(|c| c.target == config.target.name)
        .map(|c| c.revision))
}

/// Drives one target from sync to installed bundle.
pub struct Orchestrator {
    config: ForgeConfig,
    policy: BuildPolicy,
    source: Arc<dyn SourceControl>,
    build_tool: Arc<dyn BuildTool>,
    installer: Installer,
    customizer: BundleCustomizer,

    /// Only the orchestrator writes the record
    record: Arc<RwLock<BuildRecord>>,

    /// Flipped to `true` on Ctrl-C
    abort_rx: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    pub fn new(
        config: ForgeConfig,
        policy: BuildPolicy,
        source: Arc<dyn SourceControl>,
        build_tool: Arc<dyn BuildTool>,
        installer: Installer,
        last_successful: Option<RevisionId>,
    ) -> Self {
        Orchestrator {
            customizer: BundleCustomizer::from_target(&config.target),
            config,
            policy,
            source,
            build_tool,
            installer,
            record: Arc::new(RwLock::new(BuildRecord::new(last_successful))),
            abort_rx: None,
        }
    }

    /// Production wiring: git working copy, process build tool, local disk.
    pub fn from_config(
        config: ForgeConfig,
        policy: BuildPolicy,
        log_collector: Option<Arc<LogCollector>>,
    ) -> Result<Self> {
        let last_successful = load_last_successful(&config)?;
        let source = Arc::new(GitSource::new(
            config.target.repo_url.clone(),
            config.target.branch.clone(),
            config.working_copy.clone(),
        ));
        let build_tool = Arc::new(ProcessBuildTool::from_config(&config, log_collector));
        Ok(Orchestrator::new(
            config,
            policy,
            source,
            build_tool,
            Installer::default(),
            last_successful,
        ))
    }

    pub fn with_abort(mut self, abort_rx: watch::Receiver<bool>) -> Self {
        self.abort_rx = Some(abort_rx);
        self
    }

    pub fn with_customizer(mut self, customizer: BundleCustomizer) -> Self {
        self.customizer = customizer;
        self
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Snapshot of the build record.
    pub async fn record(&self) -> BuildRecord {
        self.record.read().await.clone()
    }

    /// Verify the external programs this target needs are installed.
    pub fn preflight(&self) -> Result<()> {
        crate::system::check_dependencies(&self.config.target)?;
        Ok(())
    }

    /// Bring the working copy to the remote branch head.
    pub async fn sync(&self) -> Result<RevisionId> {
        log_parsed!(
            "[Sync] Syncing {} ({})",
            self.config.target.repo_url,
            self.config.target.branch
        );
        let revision = self.source.sync().await?;
        self.record.write().await.set_revision(revision.clone())?;
        log_parsed!("[Sync] Working copy at {}", revision.short());
        Ok(revision)
    }

    /// Compile `revision` while the update watcher polls upstream.
    ///
    /// Returns the compile outcome together with how the watcher ended.
    pub async fn compile(&self, revision: &RevisionId) -> Result<(CompileOutcome, WatchOutcome)> {
        self.record
            .write()
            .await
            .transition_to(BuildStatus::InProgress)?;
        log_parsed!("[Build] Compiling {}", revision.short());

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let watcher = UpdateWatcher::start(
            revision.clone(),
            Arc::clone(&cancel_tx),
            Arc::clone(&self.source),
            self.config.poll_interval,
        );

        let compile = self.build_tool.compile(revision, cancel_rx);
        let result = forward_abort(compile, self.abort_rx.clone(), &cancel_tx).await;
        let watch_outcome = watcher.join().await;

        match result {
            Ok(outcome) => Ok((outcome, watch_outcome)),
            Err(e) => {
                self.record.write().await.transition_to(BuildStatus::Failed)?;
                Err(e.into())
            }
        }
    }

    /// Customize the artifact bundle and copy it into place.
    ///
    /// Tool invocations and the bundle copy block, so they run on the blocking pool.
    pub async fn install(&self, artifact: &Path) -> Result<InstallReport> {
        let customizer = self.customizer.clone();
        let installer = self.installer.clone();
        let artifact = artifact.to_path_buf();
        let dest = self.config.target.install_path();

        let report = tokio::task::spawn_blocking(
            move || -> std::result::Result<InstallReport, InstallError> {
                customizer.customize(&artifact)?;
                installer.install(&artifact, &dest)
            },
        )
        .await
        .map_err(|e| InstallError::Task(e.to_string()))??;
        Ok(report)
    }

    /// Run until the target is installed or a fatal error occurs.
    pub async fn run(&self) -> Result<RunReport> {
        let mut restarts = 0u32;

        loop {
            if self.abort_requested() {
                return Err(ForgeError::Aborted);
            }

            let revision = self.sync().await?;

            if restarts == 0 && self.is_up_to_date().await {
                log_parsed!(
                    "[Forge] {} is already up to date at {}",
                    self.config.target.name,
                    revision.short()
                );
                return Ok(RunReport {
                    revision,
                    installed: self.config.target.install_path(),
                    backup: None,
                    launcher: None,
                    restarts,
                    up_to_date: true,
                });
            }

            let (outcome, watch_outcome) = self.compile(&revision).await?;

            match outcome {
                CompileOutcome::Succeeded(artifact) => {
                    self.record
                        .write()
                        .await
                        .transition_to(BuildStatus::Succeeded)?;
                    log_parsed!("[Build] Compile of {} succeeded", revision.short());
                    return self.finish(revision, &artifact, restarts).await;
                }
                CompileOutcome::Failed(exit_code) => {
                    self.record.write().await.transition_to(BuildStatus::Failed)?;
                    log::error!(
                        "[Build] Compile of {} failed with exit code {}",
                        revision.short(),
                        exit_code
                    );
                    return Err(ForgeError::CompileFailed { exit_code });
                }
                CompileOutcome::Cancelled => {
                    let upstream = match watch_outcome {
                        WatchOutcome::UpstreamAdvanced(head) if !self.abort_requested() => head,
                        _ => {
                            self.record.write().await.transition_to(BuildStatus::Failed)?;
                            log::warn!("[Build] Compile of {} aborted", revision.short());
                            return Err(ForgeError::Aborted);
                        }
                    };

                    self.record
                        .write()
                        .await
                        .transition_to(BuildStatus::RestartRequested)?;

                    if !self.config.retry.allows(restarts) {
                        log::error!(
                            "[Forge] Upstream keeps moving; giving up after {} restarts",
                            restarts
                        );
                        return Err(ForgeError::RestartLimitExceeded { restarts });
                    }
                    restarts += 1;

                    let delay = self.config.retry.delay_for(restarts);
                    log_parsed!(
                        "[Forge] Upstream advanced to {}, restart {} in {}s",
                        upstream.short(),
                        restarts,
                        delay.as_secs()
                    );
                    self.sleep_unless_aborted(delay).await?;

                    self.record.write().await.transition_to(BuildStatus::Idle)?;
                }
            }
        }
    }

    async fn finish(
        &self,
        revision: RevisionId,
        artifact: &Path,
        restarts: u32,
    ) -> Result<RunReport> {
        let report = self.install(artifact).await?;

        self.record.write().await.mark_installed()?;
        checkpoint::save(
            &self.config.record_path,
            &Checkpoint {
                target: self.config.target.name.clone(),
                revision: revision.clone(),
                installed_at: report.installed.clone(),
                built_at: Utc::now(),
            },
        )?;

        let launcher = if self.policy.create_launcher {
            Some(launcher::create_launcher(
                &report.installed,
                self.config.target.launcher_binary.as_deref(),
                &self.config.target.launcher_dir,
                &self.policy.launcher_name,
            )?)
        } else {
            None
        };

        log_parsed!(
            "[Forge] Installed {} at {}",
            revision.short(),
            report.installed.display()
        );
        Ok(RunReport {
            revision,
            installed: report.installed,
            backup: report.backup,
            launcher,
            restarts,
            up_to_date: false,
        })
    }

    async fn is_up_to_date(&self) -> bool {
        !self.policy.rebuild_if_current
            && self.record.read().await.is_current()
            && self
                .installer
                .filesystem()
                .exists(&self.config.target.install_path())
    }

    fn abort_requested(&self) -> bool {
        self.abort_rx.as_ref().map_or(false, |rx| *rx.borrow())
    }

    async fn sleep_unless_aborted(&self, delay: Duration) -> Result<()> {
        let Some(mut abort_rx) = self.abort_rx.clone() else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let mut listening = true;
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = abort_rx.changed(), if listening => match changed {
                    Ok(()) if *abort_rx.borrow_and_update() => return Err(ForgeError::Aborted),
                    Ok(()) => {}
                    Err(_) => listening = false,
                },
            }
        }
    }
}

/// Await `fut`, turning an abort request into the compile's cancel signal.
async fn forward_abort<F: Future>(
    fut: F,
    abort_rx: Option<watch::Receiver<bool>>,
    cancel_tx: &watch::Sender<bool>,
) -> F::Output {
    tokio::pin!(fut);
    let Some(mut abort_rx) = abort_rx else {
        return fut.await;
    };

    if *abort_rx.borrow_and_update() {
        cancel_tx.send_replace(true);
    }

    let mut listening = true;
    loop {
        tokio::select! {
            out = &mut fut => return out,
            changed = abort_rx.changed(), if listening => match changed {
                Ok(()) => {
                    if *abort_rx.borrow_and_update() {
                        log::warn!("[Build] Abort requested, cancelling compile");
                        cancel_tx.send_replace(true);
                    }
                }
                Err(_) => listening = false,
            },
        }
    }
}
