//! Staking storage reads on a source chain.

use crate::connector::ChainConnector;
use crate::{decode_value, fetch_raw};
use async_trait::async_trait;
use codec::Decode;
use noter_reconciler::{ChainResult, LedgerInfo, PoolMembership, SourceChain};
use noter_types::AccountId32;
use std::collections::BTreeMap;
use std::sync::Arc;
use subxt::dynamic::Value;

const STAKING: &str = "Staking";
const NOMINATION_POOLS: &str = "NominationPools";

#[derive(Debug, Clone, Decode)]
struct UnlockChunk {
    #[codec(compact)]
    #[allow(dead_code)]
    value: u128,
    #[codec(compact)]
    #[allow(dead_code)]
    era: u32,
}

/// Leading fields of `StakingLedger`; later fields are not read.
#[derive(Debug, Clone, Decode)]
struct StakingLedger {
    stash: AccountId32,
    #[codec(compact)]
    #[allow(dead_code)]
    total: u128,
    #[codec(compact)]
    active: u128,
    unlocking: Vec<UnlockChunk>,
}

/// Leading field of `Nominations`.
#[derive(Debug, Clone, Decode)]
struct Nominations {
    targets: Vec<AccountId32>,
}

#[derive(Debug, Clone, Decode)]
struct PoolMember {
    pool_id: u32,
    points: u128,
    #[allow(dead_code)]
    last_recorded_reward_counter: u128,
    unbonding_eras: BTreeMap<u32, u128>,
}

impl From<StakingLedger> for LedgerInfo {
    fn from(ledger: StakingLedger) -> Self {
        LedgerInfo {
            stash: ledger.stash,
            active: ledger.active,
            unlocking_chunks: ledger.unlocking.len() as u32,
        }
    }
}

impl From<PoolMember> for PoolMembership {
    fn from(member: PoolMember) -> Self {
        PoolMembership {
            pool_id: member.pool_id,
            points: member.points,
            unbonding_eras: member.unbonding_eras.len() as u32,
        }
    }
}

/// A source chain read through a supervised connection.
pub struct SubstrateSource {
    connector: Arc<ChainConnector>,
}

impl SubstrateSource {
    pub fn new(connector: Arc<ChainConnector>) -> Self {
        Self { connector }
    }

    async fn fetch<T: Decode>(&self, pallet: &str, entry: &str, key: &AccountId32) -> ChainResult<Option<T>> {
        let client = self.connector.client().await?;
        let raw = fetch_raw(&client, pallet, entry, vec![Value::from_bytes(key)]).await?;
        Ok(raw.map(|bytes| decode_value::<T>(&bytes)).transpose()?)
    }
}

#[async_trait]
impl SourceChain for SubstrateSource {
    fn label(&self) -> &str {
        self.connector.label()
    }

    async fn staking_available(&self) -> ChainResult<bool> {
        let client = self.connector.client().await?;
        Ok(client.metadata().pallet_by_name(STAKING).is_some())
    }

    async fn ledger(&self, account: &AccountId32) -> ChainResult<Option<LedgerInfo>> {
        let ledger: Option<StakingLedger> = self.fetch(STAKING, "Ledger", account).await?;
        Ok(ledger.map(Into::into))
    }

    async fn bonded_controller(&self, stash: &AccountId32) -> ChainResult<Option<AccountId32>> {
        self.fetch(STAKING, "Bonded", stash).await
    }

    async fn nomination_count(&self, stash: &AccountId32) -> ChainResult<Option<u32>> {
        let nominations: Option<Nominations> = self.fetch(STAKING, "Nominators", stash).await?;
        Ok(nominations.map(|n| n.targets.len() as u32))
    }

    async fn pool_member(&self, account: &AccountId32) -> ChainResult<Option<PoolMembership>> {
        let client = self.connector.client().await?;
        // Chains without pools have no members.
        if client.metadata().pallet_by_name(NOMINATION_POOLS).is_none() {
            return Ok(None);
        }
        let member: Option<PoolMember> = self.fetch(NOMINATION_POOLS, "PoolMembers", account).await?;
        Ok(member.map(Into::into))
    }
}
