//! Per-account reconciliation routine shared by the sweep and the watcher.
//!
//! ```text
//! collect (direct, pool) → combine → read cache → diff → pending updates → submit
//! ```

use crate::aggregator::combine;
use crate::cache::{CacheReader, CachedRecords};
use crate::chain::{DestinationChain, SourceChain};
use crate::collector::{collect_direct, collect_pool};
use crate::diff::{retired_source_decision, should_update, Decision, SuppressReason};
use crate::error::{CollectionError, CollectionResult, ReconcileResult};
use crate::memo::{ScopedMemo, SeenAccounts};
use crate::submitter::{SubmissionOutcome, Submitter};
use noter_types::{short_account, AccountId32, PartialCollectionResult, PendingUpdate, Source, StakingSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A source chain bound to the cache source it feeds.
#[derive(Clone)]
pub struct SourceBinding {
    /// Cache source written from this chain.
    pub source: Source,
    /// Chain access.
    pub chain: Arc<dyn SourceChain>,
    /// Add nomination pool membership to direct staking.
    pub include_pools: bool,
}

impl SourceBinding {
    /// Direct staking only. Zeroed once its staking pallet is removed.
    pub fn direct(chain: Arc<dyn SourceChain>) -> Self {
        Self {
            source: Source::Direct,
            chain,
            include_pools: false,
        }
    }

    /// Direct staking plus pool membership.
    pub fn combined(chain: Arc<dyn SourceChain>) -> Self {
        Self {
            source: Source::Combined,
            chain,
            include_pools: true,
        }
    }

    /// Whether a missing staking pallet retires this binding's record.
    fn retires_without_staking(&self) -> bool {
        !self.include_pools
    }
}

/// Staking availability of one source as probed for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The staking pallet is in the runtime.
    Present,
    /// The staking pallet was removed.
    Absent,
    /// The probe failed. The source is skipped for the rest of the scope.
    Unreachable,
}

/// State memoized for one block or one sweep chunk.
#[derive(Debug, Default, Clone)]
pub struct ReconcileScope {
    availability: ScopedMemo<Source, Availability>,
    seen: SeenAccounts,
}

impl ReconcileScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `account` as handled. False if it was already handled in this scope.
    pub fn first_sighting(&mut self, account: &AccountId32) -> bool {
        self.seen.first_sighting(account)
    }

    /// Memoized staking availability of a source, if probed in this scope.
    pub fn availability(&self, source: Source) -> Option<Availability> {
        self.availability.get(&source)
    }
}

/// Pending updates and suppression tallies for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPlan {
    /// Writes to submit, at most one per source.
    pub updates: Vec<PendingUpdate>,
    /// Sources whose cache already matched.
    pub unchanged: usize,
    /// Sources left alone because incomplete data would have lowered the stake.
    pub skipped_downgrades: usize,
    /// Sources whose collection failed. Their records are left untouched.
    pub failed_sources: Vec<Source>,
}

impl AccountPlan {
    /// Every source was collected.
    pub fn is_complete(&self) -> bool {
        self.failed_sources.is_empty()
    }
}

/// Result of reconciling and submitting one account.
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub plan: AccountPlan,
    pub outcome: SubmissionOutcome,
}

/// Reconciles staking state for tracked accounts.
pub struct Reconciler {
    bindings: Vec<SourceBinding>,
    cache: CacheReader,
    submitter: Submitter,
}

impl Reconciler {
    /// Create a reconciler over `bindings`, writing to `destination`.
    pub fn new(bindings: Vec<SourceBinding>, destination: Arc<dyn DestinationChain>) -> Self {
        Self {
            bindings,
            cache: CacheReader::new(destination.clone()),
            submitter: Submitter::new(destination),
        }
    }

    /// Set the inclusion timeout for submissions.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submitter = self.submitter.with_timeout(timeout);
        self
    }

    /// Number of bound source chains.
    pub fn source_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn cache(&self) -> &CacheReader {
        &self.cache
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Probe staking availability of every source once for this scope.
    ///
    /// A failed probe is memoized as [`Availability::Unreachable`], so the
    /// other sources are still reconciled and the failing chain is not asked
    /// again until the next scope.
    pub async fn prime_scope(&self, scope: &mut ReconcileScope) {
        for binding in &self.bindings {
            if scope.availability(binding.source).is_some() {
                continue;
            }
            let availability = match self.probe(binding).await {
                Ok(true) => Availability::Present,
                Ok(false) => {
                    info!(
                        chain = binding.chain.label(),
                        source = %binding.source,
                        "Staking pallet absent from runtime"
                    );
                    Availability::Absent
                }
                Err(e) => {
                    warn!(
                        chain = binding.chain.label(),
                        source = %binding.source,
                        error = %e,
                        "Staking availability unknown, skipping source for this scope"
                    );
                    Availability::Unreachable
                }
            };
            scope.availability.insert(binding.source, availability);
        }
    }

    async fn probe(&self, binding: &SourceBinding) -> CollectionResult<bool> {
        binding
            .chain
            .staking_available()
            .await
            .map_err(|error| CollectionError::Availability {
                chain: binding.chain.label().to_string(),
                error,
            })
    }

    async fn staking_available(
        &self,
        binding: &SourceBinding,
        scope: &ReconcileScope,
    ) -> CollectionResult<bool> {
        match scope.availability(binding.source) {
            Some(Availability::Present) => Ok(true),
            Some(Availability::Absent) => Ok(false),
            Some(Availability::Unreachable) => Err(CollectionError::Unreachable {
                chain: binding.chain.label().to_string(),
            }),
            None => self.probe(binding).await,
        }
    }

    /// Compute the pending updates for `account`.
    ///
    /// `cached` may carry records prefetched for a whole chunk; when absent the
    /// cache is read here. Fails only if the cache cannot be read. A failing
    /// source chain is recorded in [`AccountPlan::failed_sources`] and the
    /// other sources are still reconciled.
    pub async fn reconcile_account(
        &self,
        account: &AccountId32,
        cached: Option<CachedRecords>,
        scope: &ReconcileScope,
    ) -> ReconcileResult<AccountPlan> {
        let cached = match cached {
            Some(records) => records,
            None => self.cache.read_account(account).await?,
        };

        let mut plan = AccountPlan::default();
        for binding in &self.bindings {
            let cached_record = cached.get(binding.source);
            let (fresh, decision) = match self.evaluate(binding, account, cached_record, scope).await {
                Ok(evaluated) => evaluated,
                Err(e) => {
                    warn!(
                        account = %short_account(account),
                        source = %binding.source,
                        error = %e,
                        "Source collection failed, record left as is"
                    );
                    plan.failed_sources.push(binding.source);
                    continue;
                }
            };

            match decision {
                Decision::Submit => {
                    debug!(
                        account = %short_account(account),
                        source = %binding.source,
                        staked = %fresh.staked_amount,
                        cached = ?cached_record.map(|c| c.staked_amount.to_string()),
                        "Staking details changed"
                    );
                    plan.updates
                        .push(PendingUpdate::new(account.clone(), binding.source, fresh));
                }
                Decision::Suppress(SuppressReason::IncompleteDowngrade) => {
                    warn!(
                        account = %short_account(account),
                        source = %binding.source,
                        fresh = %fresh.staked_amount,
                        cached = ?cached_record.map(|c| c.staked_amount.to_string()),
                        "Skipping downgrade computed from incomplete pool data"
                    );
                    plan.skipped_downgrades += 1;
                }
                Decision::Suppress(_) => plan.unchanged += 1,
            }
        }

        Ok(plan)
    }

    async fn evaluate(
        &self,
        binding: &SourceBinding,
        account: &AccountId32,
        cached: Option<&StakingSnapshot>,
        scope: &ReconcileScope,
    ) -> CollectionResult<(StakingSnapshot, Decision)> {
        let available = self.staking_available(binding, scope).await?;
        if !available && binding.retires_without_staking() {
            return Ok((StakingSnapshot::ZERO, retired_source_decision(cached)));
        }
        let (fresh, failed) = self.collect(binding, account, available).await?;
        Ok((fresh, should_update(&fresh, cached, failed)))
    }

    async fn collect(
        &self,
        binding: &SourceBinding,
        account: &AccountId32,
        staking_available: bool,
    ) -> CollectionResult<(StakingSnapshot, bool)> {
        let chain = binding.chain.as_ref();
        let direct = if staking_available {
            collect_direct(chain, account).await?
        } else {
            PartialCollectionResult::zero()
        };

        if !binding.include_pools {
            return Ok((direct.snapshot, false));
        }

        let pool = collect_pool(chain, account).await;
        Ok(combine(&direct, &pool))
    }

    /// Reconcile one account and submit its updates immediately.
    ///
    /// Returns `None` when the account was already handled in this scope.
    pub async fn reconcile_and_submit(
        &self,
        account: &AccountId32,
        scope: &mut ReconcileScope,
    ) -> ReconcileResult<Option<AccountReport>> {
        if !scope.first_sighting(account) {
            debug!(account = %short_account(account), "Account already reconciled in scope");
            return Ok(None);
        }

        self.prime_scope(scope).await;
        let plan = self.reconcile_account(account, None, scope).await?;
        let outcome = self.submitter.submit(&plan.updates).await;

        Ok(Some(AccountReport { plan, outcome }))
    }
}
