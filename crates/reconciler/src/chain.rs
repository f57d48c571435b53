//! Chain access seams.
//!
//! The reconciler only talks to chains through these traits. The live
//! implementations wrap subxt clients; tests substitute in-memory mocks.

use crate::error::{ChainResult, SubmissionResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use noter_types::{AccountId32, BlockRef, Source, StakingCall, StakingSnapshot};

/// Decoded prefix of a `Staking.Ledger` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerInfo {
    /// Stash account the ledger belongs to.
    pub stash: AccountId32,
    /// Actively bonded balance.
    pub active: u128,
    /// Number of pending unlocking chunks.
    pub unlocking_chunks: u32,
}

/// Decoded prefix of a `NominationPools.PoolMembers` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMembership {
    /// Pool the account belongs to.
    pub pool_id: u32,
    /// Member points.
    pub points: u128,
    /// Number of eras with pending unbonding.
    pub unbonding_eras: u32,
}

/// Read-only view of a source chain's staking storage.
#[async_trait]
pub trait SourceChain: Send + Sync {
    /// Human readable chain label used in logs.
    fn label(&self) -> &str;

    /// Whether the chain's runtime still carries the `Staking` pallet.
    async fn staking_available(&self) -> ChainResult<bool>;

    /// `Staking.Ledger(account)`.
    async fn ledger(&self, account: &AccountId32) -> ChainResult<Option<LedgerInfo>>;

    /// `Staking.Bonded(stash)`, the controller of a stash.
    async fn bonded_controller(&self, stash: &AccountId32) -> ChainResult<Option<AccountId32>>;

    /// Number of targets in `Staking.Nominators(stash)`.
    async fn nomination_count(&self, stash: &AccountId32) -> ChainResult<Option<u32>>;

    /// `NominationPools.PoolMembers(account)`.
    async fn pool_member(&self, account: &AccountId32) -> ChainResult<Option<PoolMembership>>;
}

/// Event observed on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationEvent {
    /// An account opted into score tracking.
    TrackingStarted {
        /// The newly tracked account.
        account: AccountId32,
    },
    /// Any other event, kept for logging.
    Other {
        /// Pallet name.
        pallet: String,
        /// Event variant name.
        variant: String,
    },
}

/// Proof that a submitted call was included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Hash of the block the extrinsic landed in.
    pub block_hash: noter_types::H256,
    /// Hash of the extrinsic.
    pub extrinsic_hash: noter_types::H256,
    /// Inclusion was observed in a finalized block rather than a best block.
    pub finalized: bool,
}

/// Finalized block stream handed out by [`DestinationChain::finalized_blocks`].
pub type BlockStream = BoxStream<'static, ChainResult<BlockRef>>;

/// Access to the destination chain: tracked set, cache, events and writes.
#[async_trait]
pub trait DestinationChain: Send + Sync {
    /// Every key of `TrackedAccounts`.
    async fn tracked_accounts(&self) -> ChainResult<Vec<AccountId32>>;

    /// `StakingDetails` for many keys in one round trip. The result is index
    /// aligned with `keys`.
    async fn cached_snapshots(
        &self,
        keys: &[(AccountId32, Source)],
    ) -> ChainResult<Vec<Option<StakingSnapshot>>>;

    /// Subscribe to finalized blocks. The stream ends when the transport drops.
    async fn finalized_blocks(&self) -> ChainResult<BlockStream>;

    /// Decoded events of one block.
    async fn block_events(&self, block: &BlockRef) -> ChainResult<Vec<DestinationEvent>>;

    /// Sign and submit one call, waiting for inclusion.
    async fn submit(&self, call: &StakingCall) -> SubmissionResult<SubmissionReceipt>;

    /// Resolve once the connection is usable again.
    async fn wait_ready(&self);
}
