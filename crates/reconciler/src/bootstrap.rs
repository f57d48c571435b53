//! Startup sweep that must succeed before event watching starts.

use crate::error::{ReconcileError, ReconcileResult};
use crate::shutdown::{self, ShutdownSignal};
use crate::sweep::{SweepStats, Sweeper};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Tracks whether the startup sweep has completed.
#[derive(Debug, Default)]
pub struct BootstrapState {
    completed: AtomicBool,
}

impl BootstrapState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn mark_complete(&self) {
        self.completed.store(true, Ordering::Release);
    }

    /// Forget completion, e.g. on teardown before a restart in-process.
    pub fn reset(&self) {
        self.completed.store(false, Ordering::Release);
    }
}

/// Retry backoff for the startup sweep.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Run the startup sweep until it succeeds.
///
/// An attempt succeeds when the tracked set was enumerated, every account was
/// collected from every source and every chunk submission landed. Only then is
/// `state` marked complete. Fails only on shutdown.
pub async fn run_bootstrap(
    sweeper: &Sweeper,
    state: &BootstrapState,
    config: &BootstrapConfig,
    shutdown: &ShutdownSignal,
) -> ReconcileResult<SweepStats> {
    let mut backoff = config.initial_backoff;
    let mut attempt: u32 = 1;

    loop {
        info!(attempt, "Running bootstrap sweep");
        match sweeper.run_sweep(shutdown).await {
            Ok(stats) if stats.is_clean() => {
                state.mark_complete();
                info!(attempt, tracked = stats.tracked, updated = stats.updated, "Bootstrap complete");
                return Ok(stats);
            }
            Ok(stats) => {
                warn!(
                    attempt,
                    errored = stats.errored,
                    failed_submissions = stats.failed_submissions,
                    retry_in_secs = backoff.as_secs(),
                    "Bootstrap sweep incomplete"
                );
            }
            Err(ReconcileError::Shutdown) => return Err(ReconcileError::Shutdown),
            Err(e) => {
                warn!(
                    attempt,
                    error = %e,
                    retry_in_secs = backoff.as_secs(),
                    "Bootstrap sweep failed"
                );
            }
        }

        if !shutdown::sleep_or_shutdown(backoff, shutdown).await {
            return Err(ReconcileError::Shutdown);
        }
        backoff = (backoff * 2).min(config.max_backoff);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BlockStream, DestinationChain, DestinationEvent, SubmissionReceipt};
    use crate::engine::{Reconciler, SourceBinding};
    use crate::error::{ChainError, ChainResult, SubmissionResult};
    use crate::registry::AccountRegistry;
    use crate::sweep::SweepConfig;
    use crate::test_support::{FakeDestination, FakeSource};
    use async_trait::async_trait;
    use noter_types::{AccountId32, BlockRef, Source, StakingCall, StakingSnapshot};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Destination whose tracked-set enumeration fails a fixed number of times.
    struct FlakyRegistry {
        inner: FakeDestination,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl DestinationChain for FlakyRegistry {
        async fn tracked_accounts(&self) -> ChainResult<Vec<AccountId32>> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ChainError::Rpc("iteration failed".to_string()));
            }
            self.inner.tracked_accounts().await
        }

        async fn cached_snapshots(
            &self,
            keys: &[(AccountId32, Source)],
        ) -> ChainResult<Vec<Option<StakingSnapshot>>> {
            self.inner.cached_snapshots(keys).await
        }

        async fn finalized_blocks(&self) -> ChainResult<BlockStream> {
            self.inner.finalized_blocks().await
        }

        async fn block_events(&self, block: &BlockRef) -> ChainResult<Vec<DestinationEvent>> {
            self.inner.block_events(block).await
        }

        async fn submit(&self, call: &StakingCall) -> SubmissionResult<SubmissionReceipt> {
            self.inner.submit(call).await
        }

        async fn wait_ready(&self) {}
    }

    fn sweeper(destination: Arc<dyn DestinationChain>) -> Sweeper {
        sweeper_with_source(destination, Arc::new(FakeSource::default()))
    }

    fn sweeper_with_source(destination: Arc<dyn DestinationChain>, source: Arc<FakeSource>) -> Sweeper {
        let reconciler = Arc::new(Reconciler::new(
            vec![SourceBinding::combined(source)],
            destination.clone(),
        ));
        Sweeper::new(reconciler, AccountRegistry::new(destination), SweepConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_retries_until_enumeration_succeeds() {
        let inner = FakeDestination::default();
        inner.track(AccountId32::new([1; 32]));
        let destination = Arc::new(FlakyRegistry {
            inner,
            failures_left: AtomicUsize::new(2),
        });

        let state = BootstrapState::new();
        let (_tx, rx) = shutdown::channel();
        let stats = run_bootstrap(&sweeper(destination), &state, &BootstrapConfig::default(), &rx)
            .await
            .unwrap();

        assert!(state.is_complete());
        assert_eq!(stats.tracked, 1);
        assert_eq!(stats.updated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_incomplete_on_shutdown() {
        let destination = Arc::new(FlakyRegistry {
            inner: FakeDestination::default(),
            failures_left: AtomicUsize::new(usize::MAX),
        });

        let (tx, rx) = shutdown::channel();
        let handle = {
            let sweeper = sweeper(destination);
            tokio::spawn(async move {
                let state = BootstrapState::new();
                let result = run_bootstrap(&sweeper, &state, &BootstrapConfig::default(), &rx).await;
                (result.is_err(), state.is_complete())
            })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        tx.send(true).unwrap();

        let (failed, complete) = handle.await.unwrap();
        assert!(failed);
        assert!(!complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_not_complete_while_accounts_fail() {
        let destination = Arc::new(FakeDestination::default());
        destination.track(AccountId32::new([1; 32]));
        destination.track(AccountId32::new([2; 32]));
        let source = Arc::new(FakeSource::default());
        source.fail_direct(true);

        let state = Arc::new(BootstrapState::new());
        let (_tx, rx) = shutdown::channel();
        let handle = {
            let sweeper = sweeper_with_source(destination.clone(), source.clone());
            let state = state.clone();
            tokio::spawn(async move {
                run_bootstrap(&sweeper, &state, &BootstrapConfig::default(), &rx).await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!state.is_complete());
        assert!(destination.submitted().is_empty());

        source.fail_direct(false);
        let stats = handle.await.unwrap().unwrap();

        assert!(state.is_complete());
        assert_eq!(stats.errored, 0);
        assert_eq!(stats.updated, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_not_complete_while_submissions_fail() {
        let destination = Arc::new(FakeDestination::default());
        destination.track(AccountId32::new([1; 32]));
        destination.fail_submissions(true);

        let state = Arc::new(BootstrapState::new());
        let (_tx, rx) = shutdown::channel();
        let handle = {
            let sweeper = sweeper(destination.clone());
            let state = state.clone();
            tokio::spawn(async move {
                run_bootstrap(&sweeper, &state, &BootstrapConfig::default(), &rx).await
            })
        };

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!state.is_complete());

        destination.fail_submissions(false);
        let stats = handle.await.unwrap().unwrap();

        assert!(state.is_complete());
        assert_eq!(stats.failed_submissions, 0);
        assert_eq!(destination.submitted().len(), 1);
    }
}
