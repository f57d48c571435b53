//! Test harness wiring mock chains to a real reconciler.
//!
//! Provides a high-level API for the noter's scenarios: seed staking state,
//! opt accounts in, run sweeps and the watcher, inspect the cache.

use std::sync::Arc;
use std::time::Duration;

use noter_reconciler::{
    run_bootstrap, AccountRegistry, BootstrapConfig, BootstrapState, EventWatcher, ReconcileError,
    Reconciler, Scheduler, SourceBinding, SweepConfig, SweepStats, Sweeper, WatcherConfig,
};
use noter_types::{AccountId32, Source, StakingSnapshot};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::mocks::{MockDestinationChain, MockSourceChain};

/// Errors from harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A reconciliation step failed.
    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
    /// A condition was not reached in time.
    #[error("timed out waiting for {0}")]
    Timeout(String),
    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub sweep: SweepConfig,
    pub bootstrap: BootstrapConfig,
    pub watcher: WatcherConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sweep: SweepConfig {
                interval: Duration::from_secs(3600),
                batch_size: 10,
                batch_pause: Duration::from_millis(5),
            },
            bootstrap: BootstrapConfig {
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(100),
            },
            watcher: WatcherConfig {
                resubscribe_delay: Duration::from_millis(10),
            },
        }
    }
}

/// Mock relay chain, asset hub and destination chain behind one reconciler.
pub struct NoterHarness {
    /// Legacy direct-staking source.
    pub relay: Arc<MockSourceChain>,
    /// Direct staking plus pools.
    pub asset_hub: Arc<MockSourceChain>,
    /// Destination chain.
    pub destination: Arc<MockDestinationChain>,
    pub reconciler: Arc<Reconciler>,
    pub sweeper: Arc<Sweeper>,
    pub bootstrap_state: Arc<BootstrapState>,
    config: HarnessConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for NoterHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl NoterHarness {
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::default())
    }

    pub fn with_config(config: HarnessConfig) -> Self {
        let relay = Arc::new(MockSourceChain::new("relay"));
        let asset_hub = Arc::new(MockSourceChain::new("asset-hub"));
        let destination = Arc::new(MockDestinationChain::new());

        let reconciler = Arc::new(Reconciler::new(
            vec![
                SourceBinding::direct(relay.clone()),
                SourceBinding::combined(asset_hub.clone()),
            ],
            destination.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(
            reconciler.clone(),
            AccountRegistry::new(destination.clone()),
            config.sweep.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = noter_reconciler::shutdown::channel();

        Self {
            relay,
            asset_hub,
            destination,
            reconciler,
            sweeper,
            bootstrap_state: Arc::new(BootstrapState::new()),
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Track `account` without an event, as if it opted in before startup.
    pub fn track(&self, account: &AccountId32) {
        self.destination.track(account);
    }

    /// Current cache record.
    pub fn cached(&self, account: &AccountId32, source: Source) -> Option<StakingSnapshot> {
        self.destination.cached(account, source)
    }

    /// Run one full sweep.
    pub async fn run_sweep(&self) -> HarnessResult<SweepStats> {
        Ok(self.sweeper.run_sweep(&self.shutdown_rx).await?)
    }

    /// Run the startup sweep until it succeeds.
    pub async fn bootstrap(&self) -> HarnessResult<SweepStats> {
        Ok(run_bootstrap(
            &self.sweeper,
            &self.bootstrap_state,
            &self.config.bootstrap,
            &self.shutdown_rx,
        )
        .await?)
    }

    /// Spawn the event watcher.
    pub fn spawn_watcher(&self) -> JoinHandle<Result<(), ReconcileError>> {
        let mut watcher = EventWatcher::new(
            self.reconciler.clone(),
            self.destination.clone(),
            self.config.watcher.clone(),
        )
        .with_shutdown(self.shutdown_rx.clone());
        tokio::spawn(async move { watcher.run().await })
    }

    /// Spawn the periodic sweep scheduler.
    pub fn spawn_scheduler(&self) -> JoinHandle<usize> {
        let scheduler = Scheduler::new(self.sweeper.clone()).with_shutdown(self.shutdown_rx.clone());
        tokio::spawn(scheduler.run())
    }

    /// Signal every spawned loop to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Poll `condition` until it holds or `timeout` elapses.
    pub async fn wait_until<F>(&self, what: &str, timeout: Duration, mut condition: F) -> HarnessResult<()>
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while !condition() {
            if tokio::time::Instant::now() >= deadline {
                return Err(HarnessError::Timeout(what.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        Ok(())
    }
}

/// Deterministic test account.
pub fn account(seed: u8) -> AccountId32 {
    AccountId32::new([seed; 32])
}

/// Await a spawned harness task.
pub async fn join<T>(handle: JoinHandle<T>) -> HarnessResult<T> {
    handle.await.map_err(|e| HarnessError::Task(e.to_string()))
}
