//! Mock source chain holding direct staking and pool membership.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use noter_reconciler::{ChainError, ChainResult, LedgerInfo, PoolMembership, SourceChain};
use noter_types::AccountId32;

/// Staking storage of a mock source chain.
#[derive(Debug, Clone, Default)]
pub struct MockStakingState {
    /// `Staking.Ledger`, keyed by controller.
    pub ledgers: HashMap<AccountId32, LedgerInfo>,
    /// `Staking.Bonded`, stash to controller.
    pub bonded: HashMap<AccountId32, AccountId32>,
    /// `Staking.Nominators`, stash to target count.
    pub nominations: HashMap<AccountId32, u32>,
    /// `NominationPools.PoolMembers`.
    pub pool_members: HashMap<AccountId32, PoolMembership>,
    /// `Staking` pallet removed from the runtime.
    pub staking_retired: bool,
}

/// Mock source chain for simulation testing.
///
/// All state sits behind a mutex so the mock can be shared through an `Arc`
/// with the reconciler while the test keeps mutating it.
#[derive(Debug, Default)]
pub struct MockSourceChain {
    label: String,
    state: Mutex<MockStakingState>,
    fail_direct: Mutex<bool>,
    fail_pools: Mutex<bool>,
    failing_accounts: Mutex<HashSet<AccountId32>>,
    ledger_queries: AtomicUsize,
    availability_queries: AtomicUsize,
}

impl MockSourceChain {
    /// Create an empty chain.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Configure failure of every direct staking query.
    pub fn with_fail_direct(self, fail: bool) -> Self {
        self.set_fail_direct(fail);
        self
    }

    pub fn set_fail_direct(&self, fail: bool) {
        *self.fail_direct.lock().expect("mock state lock poisoned") = fail;
    }

    /// Configure failure of pool membership queries.
    pub fn set_fail_pools(&self, fail: bool) {
        *self.fail_pools.lock().expect("mock state lock poisoned") = fail;
    }

    /// Make direct staking queries for one account fail.
    pub fn set_account_failure(&self, account: &AccountId32, fail: bool) {
        let mut failing = self.failing_accounts.lock().expect("mock state lock poisoned");
        if fail {
            failing.insert(account.clone());
        } else {
            failing.remove(account);
        }
    }

    /// Bond `active` from `stash` (acting as its own controller) with
    /// `nominations` targets and `unlocking` pending chunks.
    pub fn stake(&self, stash: &AccountId32, active: u128, nominations: u32, unlocking: u32) {
        self.stake_with_controller(stash, stash, active, nominations, unlocking);
    }

    /// Bond from `stash` through a separate `controller`.
    pub fn stake_with_controller(
        &self,
        stash: &AccountId32,
        controller: &AccountId32,
        active: u128,
        nominations: u32,
        unlocking: u32,
    ) {
        let mut state = self.state.lock().expect("mock state lock poisoned");
        state.ledgers.insert(
            controller.clone(),
            LedgerInfo {
                stash: stash.clone(),
                active,
                unlocking_chunks: unlocking,
            },
        );
        state.bonded.insert(stash.clone(), controller.clone());
        if nominations > 0 {
            state.nominations.insert(stash.clone(), nominations);
        } else {
            state.nominations.remove(stash);
        }
    }

    /// Fully unbond `stash`.
    pub fn unstake(&self, stash: &AccountId32) {
        let mut state = self.state.lock().expect("mock state lock poisoned");
        if let Some(controller) = state.bonded.remove(stash) {
            state.ledgers.remove(&controller);
        }
        state.ledgers.remove(stash);
        state.nominations.remove(stash);
    }

    /// Add `account` to pool `pool_id` with `points`.
    pub fn join_pool(&self, account: &AccountId32, pool_id: u32, points: u128, unbonding_eras: u32) {
        self.state.lock().expect("mock state lock poisoned").pool_members.insert(
            account.clone(),
            PoolMembership {
                pool_id,
                points,
                unbonding_eras,
            },
        );
    }

    /// Remove the staking pallet from the runtime.
    pub fn retire_staking(&self) {
        self.state.lock().expect("mock state lock poisoned").staking_retired = true;
    }

    /// Snapshot of the current storage.
    pub fn state(&self) -> MockStakingState {
        self.state.lock().expect("mock state lock poisoned").clone()
    }

    /// Number of `Staking.Ledger` reads served.
    pub fn ledger_queries(&self) -> usize {
        self.ledger_queries.load(Ordering::SeqCst)
    }

    /// Number of runtime metadata probes served.
    pub fn availability_queries(&self) -> usize {
        self.availability_queries.load(Ordering::SeqCst)
    }

    fn direct_guard(&self, account: &AccountId32) -> ChainResult<()> {
        let failing = *self.fail_direct.lock().expect("mock state lock poisoned")
            || self
                .failing_accounts
                .lock()
                .expect("mock state lock poisoned")
                .contains(account);
        if failing {
            return Err(ChainError::Rpc(format!("{}: staking query failed", self.label)));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceChain for MockSourceChain {
    fn label(&self) -> &str {
        &self.label
    }

    async fn staking_available(&self) -> ChainResult<bool> {
        self.availability_queries.fetch_add(1, Ordering::SeqCst);
        Ok(!self.state.lock().expect("mock state lock poisoned").staking_retired)
    }

    async fn ledger(&self, account: &AccountId32) -> ChainResult<Option<LedgerInfo>> {
        self.direct_guard(account)?;
        self.ledger_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().expect("mock state lock poisoned").ledgers.get(account).cloned())
    }

    async fn bonded_controller(&self, stash: &AccountId32) -> ChainResult<Option<AccountId32>> {
        self.direct_guard(stash)?;
        Ok(self.state.lock().expect("mock state lock poisoned").bonded.get(stash).cloned())
    }

    async fn nomination_count(&self, stash: &AccountId32) -> ChainResult<Option<u32>> {
        self.direct_guard(stash)?;
        Ok(self.state.lock().expect("mock state lock poisoned").nominations.get(stash).copied())
    }

    async fn pool_member(&self, account: &AccountId32) -> ChainResult<Option<PoolMembership>> {
        if *self.fail_pools.lock().expect("mock state lock poisoned") {
            return Err(ChainError::Rpc(format!("{}: pool query failed", self.label)));
        }
        Ok(self.state.lock().expect("mock state lock poisoned").pool_members.get(account).cloned())
    }
}
