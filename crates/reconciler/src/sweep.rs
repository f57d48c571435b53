//! Full reconciliation sweep and the timer that repeats it.

use crate::cache::CachedRecords;
use crate::engine::{ReconcileScope, Reconciler};
use crate::error::{ReconcileError, ReconcileResult};
use crate::registry::AccountRegistry;
use crate::shutdown::{self, ShutdownSignal};
use crate::submitter::SubmissionOutcome;
use futures::future::join_all;
use noter_types::{short_account, AccountId32, PendingUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Sweep tuning.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Accounts reconciled concurrently and submitted together.
    pub batch_size: usize,
    /// Pause between chunks.
    pub batch_pause: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 10,
            batch_pause: Duration::from_millis(1000),
        }
    }
}

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Tracked accounts enumerated.
    pub tracked: usize,
    /// Records written.
    pub updated: usize,
    /// Records that already matched.
    pub unchanged: usize,
    /// Records kept because incomplete data would have lowered them.
    pub skipped_downgrades: usize,
    /// Accounts with at least one source not reconciled.
    pub errored: usize,
    /// Records skipped because their source chain failed.
    pub source_failures: usize,
    /// Chunk submissions that failed.
    pub failed_submissions: usize,
    /// Extrinsics submitted successfully.
    pub submissions: usize,
}

impl SweepStats {
    /// Every account was fully collected and every chunk landed.
    pub fn is_clean(&self) -> bool {
        self.errored == 0 && self.failed_submissions == 0
    }
}

/// Reconciles every tracked account.
pub struct Sweeper {
    reconciler: Arc<Reconciler>,
    registry: AccountRegistry,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(reconciler: Arc<Reconciler>, registry: AccountRegistry, config: SweepConfig) -> Self {
        Self {
            reconciler,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one full sweep.
    ///
    /// Fails only if the tracked set cannot be enumerated or shutdown is
    /// requested between chunks. Per-account and per-chunk failures are
    /// counted in the returned stats.
    pub async fn run_sweep(&self, shutdown: &ShutdownSignal) -> ReconcileResult<SweepStats> {
        let accounts = self.registry.tracked_accounts().await?;
        let batch_size = self.config.batch_size.max(1);

        let mut stats = SweepStats {
            tracked: accounts.len(),
            ..Default::default()
        };
        info!(tracked = stats.tracked, batch_size, "Starting sweep");

        for (index, chunk) in accounts.chunks(batch_size).enumerate() {
            if shutdown::is_requested(shutdown) {
                info!(chunk = index, "Sweep interrupted by shutdown");
                return Err(ReconcileError::Shutdown);
            }
            if index > 0 && !shutdown::sleep_or_shutdown(self.config.batch_pause, shutdown).await {
                info!(chunk = index, "Sweep interrupted by shutdown");
                return Err(ReconcileError::Shutdown);
            }

            self.sweep_chunk(index, chunk, &mut stats).await;
        }

        info!(
            tracked = stats.tracked,
            updated = stats.updated,
            unchanged = stats.unchanged,
            skipped_downgrades = stats.skipped_downgrades,
            errored = stats.errored,
            source_failures = stats.source_failures,
            failed_submissions = stats.failed_submissions,
            "Sweep complete"
        );
        Ok(stats)
    }

    async fn sweep_chunk(&self, index: usize, chunk: &[AccountId32], stats: &mut SweepStats) {
        let mut scope = ReconcileScope::new();
        self.reconciler.prime_scope(&mut scope).await;

        let prefetched: Vec<Option<CachedRecords>> = match self.reconciler.cache().read_accounts(chunk).await {
            Ok(records) => records.into_iter().map(Some).collect(),
            Err(e) => {
                warn!(chunk = index, error = %e, "Cache prefetch failed, reading per account");
                vec![None; chunk.len()]
            }
        };

        let scope = &scope;
        let results = join_all(chunk.iter().zip(prefetched).map(|(account, cached)| async move {
            let result = self.reconciler.reconcile_account(account, cached, scope).await;
            (account, result)
        }))
        .await;

        let mut updates: Vec<PendingUpdate> = Vec::new();
        for (account, result) in results {
            match result {
                Ok(plan) => {
                    stats.unchanged += plan.unchanged;
                    stats.skipped_downgrades += plan.skipped_downgrades;
                    if !plan.is_complete() {
                        stats.errored += 1;
                        stats.source_failures += plan.failed_sources.len();
                    }
                    updates.extend(plan.updates);
                }
                Err(e) => {
                    warn!(account = %short_account(account), error = %e, "Account reconciliation failed");
                    stats.errored += 1;
                    stats.source_failures += self.reconciler.source_count();
                }
            }
        }

        debug!(chunk = index, pending = updates.len(), "Chunk reconciled");

        match self.reconciler.submitter().submit(&updates).await {
            SubmissionOutcome::Nothing => {}
            SubmissionOutcome::Included { calls, .. } => {
                stats.updated += calls;
                stats.submissions += 1;
            }
            SubmissionOutcome::Failed { .. } => stats.failed_submissions += 1,
        }
    }
}

/// Repeats the sweep on a fixed interval.
///
/// The first tick fires one interval after start; the startup sweep is run
/// separately as the bootstrap. Sweeps run inline in the timer loop so two
/// sweeps never overlap, and ticks missed during a long sweep are skipped.
pub struct Scheduler {
    sweeper: Arc<Sweeper>,
    shutdown: Option<ShutdownSignal>,
}

impl Scheduler {
    pub fn new(sweeper: Arc<Sweeper>) -> Self {
        Self {
            sweeper,
            shutdown: None,
        }
    }

    /// Set the shutdown receiver for graceful termination.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run until shutdown. Returns the number of sweeps completed.
    pub async fn run(self) -> usize {
        let period = self.sweeper.config().interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (_keepalive, idle) = shutdown::channel();
        let mut shutdown = self.shutdown.clone().unwrap_or(idle);
        let mut completed = 0;

        info!(interval_secs = period.as_secs(), "Sweep scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown::requested(&mut shutdown) => break,
            }

            match self.sweeper.run_sweep(&shutdown).await {
                Ok(_) => completed += 1,
                Err(ReconcileError::Shutdown) => break,
                Err(e) => warn!(error = %e, "Sweep failed, retrying at next interval"),
            }
        }

        info!(completed, "Sweep scheduler stopped");
        completed
    }
}
