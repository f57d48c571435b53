//! Reads cached staking records from the destination chain.

use crate::chain::DestinationChain;
use crate::error::ChainResult;
use noter_types::{AccountId32, Source, StakingSnapshot};
use std::sync::Arc;

/// Cached records of one account, one slot per source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedRecords {
    pub direct: Option<StakingSnapshot>,
    pub combined: Option<StakingSnapshot>,
}

impl CachedRecords {
    pub fn get(&self, source: Source) -> Option<&StakingSnapshot> {
        match source {
            Source::Direct => self.direct.as_ref(),
            Source::Combined => self.combined.as_ref(),
        }
    }

    fn set(&mut self, source: Source, snapshot: Option<StakingSnapshot>) {
        match source {
            Source::Direct => self.direct = snapshot,
            Source::Combined => self.combined = snapshot,
        }
    }
}

/// Typed reader over the destination `StakingDetails` map.
///
/// Always reads fresh state; nothing is cached locally between cycles.
#[derive(Clone)]
pub struct CacheReader {
    destination: Arc<dyn DestinationChain>,
}

impl CacheReader {
    pub fn new(destination: Arc<dyn DestinationChain>) -> Self {
        Self { destination }
    }

    /// Both records of `account` in one round trip.
    pub async fn read_account(&self, account: &AccountId32) -> ChainResult<CachedRecords> {
        let mut records = self.read_accounts(std::slice::from_ref(account)).await?;
        Ok(records.pop().unwrap_or_default())
    }

    /// Both records of every account in one round trip, index aligned with
    /// `accounts`.
    pub async fn read_accounts(&self, accounts: &[AccountId32]) -> ChainResult<Vec<CachedRecords>> {
        let keys: Vec<(AccountId32, Source)> = accounts
            .iter()
            .flat_map(|account| Source::ALL.into_iter().map(move |s| (account.clone(), s)))
            .collect();

        let values = self.destination.cached_snapshots(&keys).await?;

        let mut records = vec![CachedRecords::default(); accounts.len()];
        for (index, ((_, source), value)) in keys.iter().zip(values).enumerate() {
            records[index / Source::ALL.len()].set(*source, value);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDestination;

    #[tokio::test]
    async fn test_read_accounts_aligns_records() {
        let destination = Arc::new(FakeDestination::default());
        let alice = AccountId32::new([1; 32]);
        let bob = AccountId32::new([2; 32]);
        destination.set_cached(alice.clone(), Source::Combined, StakingSnapshot::new(7, 1, 0));
        destination.set_cached(bob.clone(), Source::Direct, StakingSnapshot::new(3, 0, 1));

        let reader = CacheReader::new(destination);
        let records = reader.read_accounts(&[alice.clone(), bob]).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].direct, None);
        assert_eq!(records[0].combined, Some(StakingSnapshot::new(7, 1, 0)));
        assert_eq!(records[1].direct, Some(StakingSnapshot::new(3, 0, 1)));
        assert_eq!(records[1].combined, None);

        let single = reader.read_account(&alice).await.unwrap();
        assert_eq!(single, records[0]);
    }
}
