//! Minimal in-memory chains for unit tests.

use crate::chain::{
    BlockStream, DestinationChain, DestinationEvent, LedgerInfo, PoolMembership,
    SubmissionReceipt, SourceChain,
};
use crate::error::{ChainError, ChainResult, DispatchFailure, SubmissionError, SubmissionResult};
use async_trait::async_trait;
use noter_types::{AccountId32, BlockRef, Source, StakingCall, StakingSnapshot, H256};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeSource {
    retired: Mutex<bool>,
    ledgers: Mutex<HashMap<AccountId32, LedgerInfo>>,
    bonded: Mutex<HashMap<AccountId32, AccountId32>>,
    nominations: Mutex<HashMap<AccountId32, u32>>,
    pools: Mutex<HashMap<AccountId32, PoolMembership>>,
    fail_direct: Mutex<bool>,
    fail_pools: Mutex<bool>,
    fail_probes: Mutex<bool>,
    availability_probes: Mutex<usize>,
}

impl FakeSource {
    pub fn set_ledger(&self, controller: AccountId32, stash: AccountId32, active: u128, unlocking: u32) {
        self.ledgers.lock().unwrap().insert(
            controller,
            LedgerInfo {
                stash,
                active,
                unlocking_chunks: unlocking,
            },
        );
    }

    pub fn set_bonded(&self, stash: AccountId32, controller: AccountId32) {
        self.bonded.lock().unwrap().insert(stash, controller);
    }

    pub fn set_nominations(&self, stash: AccountId32, count: u32) {
        self.nominations.lock().unwrap().insert(stash, count);
    }

    pub fn set_pool_member(&self, account: AccountId32, member: PoolMembership) {
        self.pools.lock().unwrap().insert(account, member);
    }

    pub fn retire(&self) {
        *self.retired.lock().unwrap() = true;
    }

    pub fn fail_direct(&self, fail: bool) {
        *self.fail_direct.lock().unwrap() = fail;
    }

    pub fn fail_pools(&self, fail: bool) {
        *self.fail_pools.lock().unwrap() = fail;
    }

    pub fn fail_probes(&self, fail: bool) {
        *self.fail_probes.lock().unwrap() = fail;
    }

    pub fn availability_probes(&self) -> usize {
        *self.availability_probes.lock().unwrap()
    }

    fn check_direct(&self) -> ChainResult<()> {
        if *self.fail_direct.lock().unwrap() {
            return Err(ChainError::Rpc("direct query failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceChain for FakeSource {
    fn label(&self) -> &str {
        "fake"
    }

    async fn staking_available(&self) -> ChainResult<bool> {
        *self.availability_probes.lock().unwrap() += 1;
        if *self.fail_probes.lock().unwrap() {
            return Err(ChainError::Rpc("metadata unavailable".to_string()));
        }
        Ok(!*self.retired.lock().unwrap())
    }

    async fn ledger(&self, account: &AccountId32) -> ChainResult<Option<LedgerInfo>> {
        self.check_direct()?;
        Ok(self.ledgers.lock().unwrap().get(account).cloned())
    }

    async fn bonded_controller(&self, stash: &AccountId32) -> ChainResult<Option<AccountId32>> {
        self.check_direct()?;
        Ok(self.bonded.lock().unwrap().get(stash).cloned())
    }

    async fn nomination_count(&self, stash: &AccountId32) -> ChainResult<Option<u32>> {
        self.check_direct()?;
        Ok(self.nominations.lock().unwrap().get(stash).copied())
    }

    async fn pool_member(&self, account: &AccountId32) -> ChainResult<Option<PoolMembership>> {
        if *self.fail_pools.lock().unwrap() {
            return Err(ChainError::Rpc("pool query failed".to_string()));
        }
        Ok(self.pools.lock().unwrap().get(account).cloned())
    }
}

#[derive(Default)]
pub struct FakeDestination {
    tracked: Mutex<Vec<AccountId32>>,
    cache: Mutex<HashMap<(AccountId32, Source), StakingSnapshot>>,
    submitted: Mutex<Vec<StakingCall>>,
    events: Mutex<HashMap<H256, Vec<DestinationEvent>>>,
    fail_submissions: Mutex<bool>,
}

impl FakeDestination {
    pub fn track(&self, account: AccountId32) {
        self.tracked.lock().unwrap().push(account);
    }

    pub fn set_cached(&self, account: AccountId32, source: Source, snapshot: StakingSnapshot) {
        self.cache.lock().unwrap().insert((account, source), snapshot);
    }

    pub fn cached(&self, account: &AccountId32, source: Source) -> Option<StakingSnapshot> {
        self.cache.lock().unwrap().get(&(account.clone(), source)).copied()
    }

    pub fn set_events(&self, block: H256, events: Vec<DestinationEvent>) {
        self.events.lock().unwrap().insert(block, events);
    }

    pub fn fail_submissions(&self, fail: bool) {
        *self.fail_submissions.lock().unwrap() = fail;
    }

    pub fn submitted(&self) -> Vec<StakingCall> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationChain for FakeDestination {
    async fn tracked_accounts(&self) -> ChainResult<Vec<AccountId32>> {
        Ok(self.tracked.lock().unwrap().clone())
    }

    async fn cached_snapshots(
        &self,
        keys: &[(AccountId32, Source)],
    ) -> ChainResult<Vec<Option<StakingSnapshot>>> {
        Ok(keys.iter().map(|(a, s)| self.cached(a, *s)).collect())
    }

    async fn finalized_blocks(&self) -> ChainResult<BlockStream> {
        Err(ChainError::Subscription("not supported".to_string()))
    }

    async fn block_events(&self, block: &BlockRef) -> ChainResult<Vec<DestinationEvent>> {
        self.events
            .lock()
            .unwrap()
            .get(&block.hash)
            .cloned()
            .ok_or_else(|| ChainError::Rpc("unknown block".to_string()))
    }

    async fn submit(&self, call: &StakingCall) -> SubmissionResult<SubmissionReceipt> {
        if *self.fail_submissions.lock().unwrap() {
            return Err(SubmissionError::Dispatch(DispatchFailure::Module {
                pallet: "StakingScores".to_string(),
                error: "CallerNotNoter".to_string(),
            }));
        }
        for update in call.flatten() {
            self.set_cached(update.account.clone(), update.source, update.snapshot);
        }
        self.submitted.lock().unwrap().push(call.clone());
        Ok(SubmissionReceipt {
            block_hash: H256::repeat_byte(1),
            extrinsic_hash: H256::repeat_byte(2),
            finalized: false,
        })
    }

    async fn wait_ready(&self) {}
}
