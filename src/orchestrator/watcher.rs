//! Concurrent update watcher.
//!
//! Polls the remote head at a fixed interval while a compile is running. When the
//! remote moves past the revision being compiled it fires the compile's cancel
//! signal once and stops. Poll failures are logged and retried at the next tick.
//! The watcher only talks to the remote, never to the working copy.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::RevisionId;
use crate::source::SourceControl;

/// How a watcher run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Stopped by the orchestrator; every successful poll matched.
    Stopped { polls: u32 },
    /// Remote head moved to this revision; cancellation was requested.
    UpstreamAdvanced(RevisionId),
}

/// Handle to a running watcher task.
pub struct WatcherHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<WatchOutcome>,
}

impl WatcherHandle {
    /// Halt polling. Idempotent and safe while a poll is in flight.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Stop the watcher and wait for its outcome.
    pub async fn join(self) -> WatchOutcome {
        self.stop();
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("[Watcher] Watcher task ended abnormally: {}", e);
                WatchOutcome::Stopped { polls: 0 }
            }
        }
    }
}

/// Polls `probe` for changes to the branch being compiled.
pub struct UpdateWatcher;

impl UpdateWatcher {
    /// Begin polling every `interval`. `cancel_tx` is the compile's cancel signal.
    pub fn start(
        watched: RevisionId,
        cancel_tx: Arc<watch::Sender<bool>>,
        probe: Arc<dyn SourceControl>,
        interval: Duration,
    ) -> WatcherHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(watched, cancel_tx, probe, interval, stop_rx));
        WatcherHandle { stop_tx, task }
    }
}

async fn poll_loop(
    watched: RevisionId,
    cancel_tx: Arc<watch::Sender<bool>>,
    probe: Arc<dyn SourceControl>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> WatchOutcome {
    let mut polls = 0u32;
    log::debug!(
        "[Watcher] Watching {} every {:?}",
        watched.short(),
        interval
    );

    loop {
        if *stop_rx.borrow() {
            return WatchOutcome::Stopped { polls };
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return WatchOutcome::Stopped { polls };
                }
                continue;
            }
        }

        // An in-flight poll is abandoned when stop arrives
        let fetched = tokio::select! {
            result = probe.fetch_head() => result,
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return WatchOutcome::Stopped { polls };
                }
                continue;
            }
        };
        polls += 1;

        match fetched {
            Ok(head) if head == watched => {
                log::debug!("[Watcher] Poll {}: remote still at {}", polls, head.short());
            }
            Ok(head) => {
                log::info!(
                    target: "parsed",
                    "[Watcher] Upstream advanced {} -> {}, cancelling build",
                    watched.short(),
                    head.short()
                );
                cancel_tx.send_replace(true);
                return WatchOutcome::UpstreamAdvanced(head);
            }
            Err(e) => {
                log::warn!("[Watcher] Poll {} failed, will retry: {}", polls, e);
            }
        }
    }
}
