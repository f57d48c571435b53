//! Core types for the stake noter
//!
//! Shared definitions used by the chain client, the reconciliation engine and
//! the simulation harness.

use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sp_core::crypto::Ss58Codec;
pub use sp_core::crypto::AccountId32;
pub use sp_core::H256;

/// Origin of a cached staking record on the destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    /// Direct staking on the legacy relay chain.
    #[serde(rename = "DirectStaking")]
    Direct,
    /// Direct staking plus nomination pool membership on asset hub.
    #[serde(rename = "PoolStakingCombined")]
    Combined,
}

impl Source {
    /// Every source, in submission order.
    pub const ALL: [Source; 2] = [Source::Direct, Source::Combined];

    /// Variant name of the destination pallet's source enum.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Source::Direct => "DirectStaking",
            Source::Combined => "PoolStakingCombined",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Staking state of one account for one source.
///
/// Field order matches the leading fields of the destination cache record so
/// the value can be decoded straight from storage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub struct StakingSnapshot {
    /// Actively bonded amount in plancks.
    pub staked_amount: u128,
    /// Number of nomination targets.
    pub nominations_count: u32,
    /// Number of unlocking chunks.
    pub unlocking_chunks_count: u32,
}

impl StakingSnapshot {
    /// The "not staking" snapshot.
    pub const ZERO: StakingSnapshot = StakingSnapshot {
        staked_amount: 0,
        nominations_count: 0,
        unlocking_chunks_count: 0,
    };

    pub fn new(staked_amount: u128, nominations_count: u32, unlocking_chunks_count: u32) -> Self {
        Self {
            staked_amount,
            nominations_count,
            unlocking_chunks_count,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl std::fmt::Display for StakingSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "staked={} nominations={} unlocking={}",
            self.staked_amount, self.nominations_count, self.unlocking_chunks_count
        )
    }
}

/// Snapshot gathered from one sub-source before combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialCollectionResult {
    /// Collected values. Always zero when `collection_failed` is set.
    pub snapshot: StakingSnapshot,
    /// The sub-source query failed; the zero snapshot is not ground truth.
    pub collection_failed: bool,
}

impl PartialCollectionResult {
    /// Successful collection.
    pub fn collected(snapshot: StakingSnapshot) -> Self {
        Self {
            snapshot,
            collection_failed: false,
        }
    }

    /// Successful collection that found nothing (not staking).
    pub fn zero() -> Self {
        Self::collected(StakingSnapshot::ZERO)
    }

    /// Failed collection.
    pub fn failed() -> Self {
        Self {
            snapshot: StakingSnapshot::ZERO,
            collection_failed: true,
        }
    }
}

/// A cache write awaiting submission within one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub account: AccountId32,
    pub source: Source,
    pub snapshot: StakingSnapshot,
}

impl PendingUpdate {
    pub fn new(account: AccountId32, source: Source, snapshot: StakingSnapshot) -> Self {
        Self {
            account,
            source,
            snapshot,
        }
    }
}

/// Destination call shapes produced by the noter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakingCall {
    /// `receive_staking_details` for one `(account, source)` record.
    ReceiveStakingDetails(PendingUpdate),
    /// `Utility.batch_all`: every inner call lands or none does.
    BatchAll(Vec<StakingCall>),
}

impl StakingCall {
    /// Wrap updates in the smallest call shape: nothing, one call, or a batch.
    pub fn from_updates(updates: &[PendingUpdate]) -> Option<StakingCall> {
        match updates {
            [] => None,
            [single] => Some(StakingCall::ReceiveStakingDetails(single.clone())),
            many => Some(StakingCall::BatchAll(
                many.iter()
                    .cloned()
                    .map(StakingCall::ReceiveStakingDetails)
                    .collect(),
            )),
        }
    }

    /// Unwrap nested batches into the detail updates they carry.
    pub fn flatten(&self) -> Vec<&PendingUpdate> {
        match self {
            StakingCall::ReceiveStakingDetails(update) => vec![update],
            StakingCall::BatchAll(calls) => calls.iter().flat_map(StakingCall::flatten).collect(),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, StakingCall::BatchAll(_))
    }
}

/// Finalized block reference on the destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub number: u32,
    pub hash: H256,
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({:?})", self.number, self.hash)
    }
}

/// Shortened SS58 rendering of an account for log lines.
pub fn short_account(account: &AccountId32) -> String {
    let full = account.to_ss58check();
    if full.len() <= 10 {
        return full;
    }
    format!("{}…{}", &full[..4], &full[full.len() - 4..])
}
