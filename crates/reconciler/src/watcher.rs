//! Fast path for newly tracked accounts.
//!
//! Follows finalized blocks on the destination chain and reconciles every
//! account named in a `TrackingStarted` event without waiting for the next
//! sweep.

use crate::chain::{BlockStream, DestinationChain, DestinationEvent};
use crate::engine::{ReconcileScope, Reconciler};
use crate::error::ReconcileResult;
use crate::shutdown::{self, ShutdownSignal};
use futures::StreamExt;
use noter_types::{short_account, BlockRef};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Subscription state of the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Not subscribed; waiting for the connection to come back.
    Idle,
    /// Following finalized blocks.
    Subscribed,
}

/// Configuration for the event watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay before re-subscribing after the stream ended.
    pub resubscribe_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            resubscribe_delay: Duration::from_secs(5),
        }
    }
}

/// What happened while processing one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockReport {
    /// `TrackingStarted` events seen.
    pub tracking_started: usize,
    /// Records written.
    pub updated: usize,
    /// Accounts already handled earlier in the same block.
    pub duplicates: usize,
    /// Accounts with at least one source not reconciled.
    pub errored: usize,
    /// Submissions that failed.
    pub failed_submissions: usize,
}

enum FollowEnd {
    StreamEnded,
    Shutdown,
}

/// Destination event watcher.
pub struct EventWatcher {
    reconciler: Arc<Reconciler>,
    destination: Arc<dyn DestinationChain>,
    config: WatcherConfig,
    state: WatcherState,
    shutdown: Option<ShutdownSignal>,
}

impl EventWatcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        destination: Arc<dyn DestinationChain>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            reconciler,
            destination,
            config,
            state: WatcherState::Idle,
            shutdown: None,
        }
    }

    /// Set the shutdown receiver for graceful termination.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Follow finalized blocks until shutdown, re-subscribing whenever the
    /// stream ends.
    pub async fn run(&mut self) -> ReconcileResult<()> {
        let (_keepalive, idle) = shutdown::channel();
        let mut shutdown = self.shutdown.clone().unwrap_or(idle);

        info!("Starting event watcher");

        loop {
            tokio::select! {
                _ = self.destination.wait_ready() => {}
                _ = shutdown::requested(&mut shutdown) => break,
            }

            match self.destination.finalized_blocks().await {
                Ok(stream) => {
                    self.state = WatcherState::Subscribed;
                    info!("Subscribed to finalized blocks");

                    let end = self.follow(stream, &mut shutdown).await;
                    self.state = WatcherState::Idle;
                    if let FollowEnd::Shutdown = end {
                        break;
                    }
                    warn!("Finalized block stream ended, re-subscribing");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to subscribe to finalized blocks");
                }
            }

            if !shutdown::sleep_or_shutdown(self.config.resubscribe_delay, &shutdown).await {
                break;
            }
        }

        self.state = WatcherState::Idle;
        info!("Event watcher stopped");
        Ok(())
    }

    async fn follow(&self, mut stream: BlockStream, shutdown: &mut ShutdownSignal) -> FollowEnd {
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown::requested(shutdown) => return FollowEnd::Shutdown,
            };

            match next {
                Some(Ok(block)) => {
                    if let Err(e) = self.process_block(&block).await {
                        warn!(block = block.number, error = %e, "Skipping block");
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Finalized block subscription failed");
                    return FollowEnd::StreamEnded;
                }
                None => return FollowEnd::StreamEnded,
            }
        }
    }

    /// Reconcile every account that started tracking in `block`.
    ///
    /// Fails only if the block's events cannot be fetched; per-account
    /// failures are counted in the report.
    pub async fn process_block(&self, block: &BlockRef) -> ReconcileResult<BlockReport> {
        let events = self.destination.block_events(block).await?;
        trace!(block = block.number, events = events.len(), "Processing block");

        let mut scope = ReconcileScope::new();
        let mut report = BlockReport::default();

        for event in events {
            let DestinationEvent::TrackingStarted { account } = event else {
                continue;
            };
            report.tracking_started += 1;
            info!(block = block.number, account = %short_account(&account), "Tracking started");

            match self.reconciler.reconcile_and_submit(&account, &mut scope).await {
                Ok(Some(account_report)) => {
                    if !account_report.plan.is_complete() {
                        report.errored += 1;
                    }
                    report.updated += account_report.outcome.written();
                    if account_report.outcome.is_failed() {
                        report.failed_submissions += 1;
                    }
                }
                Ok(None) => report.duplicates += 1,
                Err(e) => {
                    warn!(
                        block = block.number,
                        account = %short_account(&account),
                        error = %e,
                        "Reconciliation of newly tracked account failed"
                    );
                    report.errored += 1;
                }
            }
        }

        if report.tracking_started > 0 {
            debug!(
                block = block.number,
                tracking_started = report.tracking_started,
                updated = report.updated,
                "Block processed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceBinding;
    use crate::test_support::{FakeDestination, FakeSource};
    use noter_types::{AccountId32, Source, StakingSnapshot, H256};

    fn block(number: u32) -> BlockRef {
        BlockRef {
            number,
            hash: H256::repeat_byte(number as u8),
        }
    }

    fn watcher(destination: Arc<FakeDestination>, source: Arc<FakeSource>) -> EventWatcher {
        let reconciler = Arc::new(Reconciler::new(
            vec![SourceBinding::combined(source)],
            destination.clone(),
        ));
        EventWatcher::new(reconciler, destination, WatcherConfig::default())
    }

    #[tokio::test]
    async fn test_tracking_started_reconciled_once_per_block() {
        let destination = Arc::new(FakeDestination::default());
        let source = Arc::new(FakeSource::default());
        let alice = AccountId32::new([1; 32]);
        source.set_ledger(alice.clone(), alice.clone(), 70, 0);

        destination.set_events(
            block(5).hash,
            vec![
                DestinationEvent::Other {
                    pallet: "System".to_string(),
                    variant: "ExtrinsicSuccess".to_string(),
                },
                DestinationEvent::TrackingStarted {
                    account: alice.clone(),
                },
                DestinationEvent::TrackingStarted {
                    account: alice.clone(),
                },
            ],
        );

        let report = watcher(destination.clone(), source)
            .process_block(&block(5))
            .await
            .unwrap();

        assert_eq!(report.tracking_started, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(destination.submitted().len(), 1);
        assert_eq!(
            destination.cached(&alice, Source::Combined),
            Some(StakingSnapshot::new(70, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_account_failure_does_not_fail_block() {
        let destination = Arc::new(FakeDestination::default());
        let source = Arc::new(FakeSource::default());
        source.fail_direct(true);
        destination.set_events(
            block(6).hash,
            vec![DestinationEvent::TrackingStarted {
                account: AccountId32::new([2; 32]),
            }],
        );

        let report = watcher(destination.clone(), source)
            .process_block(&block(6))
            .await
            .unwrap();
        assert_eq!(report.errored, 1);
        assert!(destination.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_block_is_an_error() {
        let destination = Arc::new(FakeDestination::default());
        let watcher = watcher(destination, Arc::new(FakeSource::default()));
        assert!(watcher.process_block(&block(9)).await.is_err());
        assert_eq!(watcher.state(), WatcherState::Idle);
    }
}
