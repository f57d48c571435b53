//! Enumerates accounts that opted into score tracking.

use crate::chain::DestinationChain;
use crate::error::ChainResult;
use noter_types::AccountId32;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Read-only view of the destination tracked set.
#[derive(Clone)]
pub struct AccountRegistry {
    destination: Arc<dyn DestinationChain>,
}

impl AccountRegistry {
    pub fn new(destination: Arc<dyn DestinationChain>) -> Self {
        Self { destination }
    }

    /// Every tracked account, deduplicated, in a stable order.
    pub async fn tracked_accounts(&self) -> ChainResult<Vec<AccountId32>> {
        let raw = self.destination.tracked_accounts().await?;
        let fetched = raw.len();
        let accounts: Vec<AccountId32> = raw.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        debug!(fetched, unique = accounts.len(), "Enumerated tracked accounts");
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDestination;

    #[tokio::test]
    async fn test_tracked_accounts_deduplicated() {
        let destination = Arc::new(FakeDestination::default());
        destination.track(AccountId32::new([2; 32]));
        destination.track(AccountId32::new([1; 32]));
        destination.track(AccountId32::new([2; 32]));

        let registry = AccountRegistry::new(destination);
        let accounts = registry.tracked_accounts().await.unwrap();
        assert_eq!(
            accounts,
            vec![AccountId32::new([1; 32]), AccountId32::new([2; 32])]
        );
    }
}
