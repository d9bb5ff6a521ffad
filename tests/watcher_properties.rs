//! Property tests for the update watcher, run on a paused-clock runtime.

use appforge::error::SyncError;
use appforge::models::RevisionId;
use appforge::orchestrator::{UpdateWatcher, WatchOutcome};
use appforge::source::SourceControl;
use futures::future::{BoxFuture, FutureExt};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Remote that answers poll `i` with `script[i]` (`None` is a failed poll),
/// repeating the last answer once the script runs out.
struct ScriptedRemote {
    script: Vec<Option<RevisionId>>,
    polls: AtomicUsize,
}

impl ScriptedRemote {
    fn new(script: Vec<Option<RevisionId>>) -> Arc<Self> {
        Arc::new(ScriptedRemote {
            script,
            polls: AtomicUsize::new(0),
        })
    }
}

impl SourceControl for ScriptedRemote {
    fn sync(&self) -> BoxFuture<'_, Result<RevisionId, SyncError>> {
        async move { Ok(RevisionId::new("A")) }.boxed()
    }

    fn fetch_head(&self) -> BoxFuture<'_, Result<RevisionId, SyncError>> {
        async move {
            let i = self.polls.fetch_add(1, Ordering::SeqCst);
            let answer = self
                .script
                .get(i)
                .or_else(|| self.script.last())
                .cloned()
                .flatten();
            answer.ok_or_else(|| SyncError::Remote("timeout".to_string()))
        }
        .boxed()
    }
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

/// Count cancel signals by watching every change on the receiver.
async fn count_cancels(mut cancel_rx: watch::Receiver<bool>) -> u32 {
    let mut count = 0;
    while cancel_rx.changed().await.is_ok() {
        if *cancel_rx.borrow_and_update() {
            count += 1;
        }
    }
    count
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_stable_remote_never_cancels(
        failures in proptest::collection::vec(any::<bool>(), 0..30),
        interval_ms in 10u64..2_000,
        compile_ms in 0u64..30_000,
    ) {
        let script: Vec<Option<RevisionId>> = failures
            .iter()
            .map(|failed| if *failed { None } else { Some(RevisionId::new("A")) })
            .chain(std::iter::once(Some(RevisionId::new("A"))))
            .collect();

        let (outcome, cancels) = paused_runtime().block_on(async move {
            let remote = ScriptedRemote::new(script);
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let counter = tokio::spawn(count_cancels(cancel_rx));

            let handle = UpdateWatcher::start(
                RevisionId::new("A"),
                Arc::new(cancel_tx),
                remote,
                Duration::from_millis(interval_ms),
            );
            tokio::time::sleep(Duration::from_millis(compile_ms)).await;
            let outcome = handle.join().await;
            (outcome, counter.await.unwrap())
        });

        let is_stopped = matches!(outcome, WatchOutcome::Stopped { .. });
        prop_assert!(is_stopped);
        prop_assert_eq!(cancels, 0);
    }

    #[test]
    fn prop_first_mismatch_cancels_exactly_once(
        stable_polls in 0usize..20,
        failures_before in 0usize..5,
        later in proptest::collection::vec("[A-D]", 0..10),
    ) {
        // Stable polls (some failing), then "B", then arbitrary revisions
        let mut script: Vec<Option<RevisionId>> = Vec::new();
        script.extend((0..failures_before).map(|_| None));
        script.extend((0..stable_polls).map(|_| Some(RevisionId::new("A"))));
        script.push(Some(RevisionId::new("B")));
        script.extend(later.iter().map(|rev| Some(RevisionId::new(rev.as_str()))));
        let expected_polls = failures_before + stable_polls + 1;

        let (outcome, cancels, polls) = paused_runtime().block_on(async move {
            let remote = ScriptedRemote::new(script);
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let counter = tokio::spawn(count_cancels(cancel_rx));

            let handle = UpdateWatcher::start(
                RevisionId::new("A"),
                Arc::new(cancel_tx),
                remote.clone(),
                Duration::from_secs(1),
            );
            // Far longer than the script; the watcher must stop on its own
            tokio::time::sleep(Duration::from_secs(120)).await;
            let outcome = handle.join().await;
            (outcome, counter.await.unwrap(), remote.polls.load(Ordering::SeqCst))
        });

        prop_assert_eq!(outcome, WatchOutcome::UpstreamAdvanced(RevisionId::new("B")));
        prop_assert_eq!(cancels, 1);
        prop_assert_eq!(polls, expected_polls);
    }
}
