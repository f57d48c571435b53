//! Collects staking state for one account from a source chain.

use crate::chain::{LedgerInfo, SourceChain};
use crate::error::{ChainError, CollectionError, CollectionResult};
use noter_types::{short_account, AccountId32, PartialCollectionResult, StakingSnapshot};
use tracing::{debug, warn};

/// Direct staking state of `account`.
///
/// The account is first looked up as a controller. If it has no ledger it is
/// treated as a stash and resolved through `Bonded`. Nominations are read for
/// the stash recorded in the ledger. Any query failure is returned as an error:
/// direct staking is the authoritative half of every snapshot.
pub async fn collect_direct(
    chain: &dyn SourceChain,
    account: &AccountId32,
) -> CollectionResult<PartialCollectionResult> {
    let direct_err = |error: ChainError| CollectionError::Direct {
        chain: chain.label().to_string(),
        error,
    };

    let Some(ledger) = resolve_ledger(chain, account).await.map_err(direct_err)? else {
        return Ok(PartialCollectionResult::zero());
    };

    let nominations = chain
        .nomination_count(&ledger.stash)
        .await
        .map_err(direct_err)?
        .unwrap_or(0);

    debug!(
        chain = chain.label(),
        account = %short_account(account),
        active = %ledger.active,
        nominations,
        unlocking = ledger.unlocking_chunks,
        "Collected direct staking"
    );

    Ok(PartialCollectionResult::collected(StakingSnapshot::new(
        ledger.active,
        nominations,
        ledger.unlocking_chunks,
    )))
}

async fn resolve_ledger(
    chain: &dyn SourceChain,
    account: &AccountId32,
) -> Result<Option<LedgerInfo>, ChainError> {
    if let Some(ledger) = chain.ledger(account).await? {
        return Ok(Some(ledger));
    }

    match chain.bonded_controller(account).await? {
        Some(controller) if &controller != account => chain.ledger(&controller).await,
        _ => Ok(None),
    }
}

/// Nomination pool state of `account`.
///
/// Pool points are reported as balance 1:1. This is an approximation: a pool
/// whose points-to-balance ratio has drifted (slashing, rewards bonded to the
/// pool) reports points rather than the member's share of the bonded balance.
/// Failures are not fatal; they yield a failed result and a warning.
pub async fn collect_pool(chain: &dyn SourceChain, account: &AccountId32) -> PartialCollectionResult {
    match chain.pool_member(account).await {
        Ok(None) => PartialCollectionResult::zero(),
        Ok(Some(member)) => {
            debug!(
                chain = chain.label(),
                account = %short_account(account),
                pool_id = member.pool_id,
                points = %member.points,
                "Collected pool membership"
            );
            PartialCollectionResult::collected(StakingSnapshot::new(
                member.points,
                0,
                member.unbonding_eras,
            ))
        }
        Err(e) => {
            warn!(
                chain = chain.label(),
                account = %short_account(account),
                error = %e,
                "Pool membership query failed, treating pool stake as unknown"
            );
            PartialCollectionResult::failed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PoolMembership;
    use crate::test_support::FakeSource;

    fn account(byte: u8) -> AccountId32 {
        AccountId32::new([byte; 32])
    }

    #[tokio::test]
    async fn test_direct_via_controller_ledger() {
        let source = FakeSource::default();
        source.set_ledger(account(1), account(1), 500, 2);
        source.set_nominations(account(1), 16);

        let result = collect_direct(&source, &account(1)).await.unwrap();
        assert_eq!(result, PartialCollectionResult::collected(StakingSnapshot::new(500, 16, 2)));
    }

    #[tokio::test]
    async fn test_direct_resolves_stash_through_bonded() {
        let source = FakeSource::default();
        let stash = account(1);
        let controller = account(2);
        source.set_ledger(controller.clone(), stash.clone(), 900, 0);
        source.set_bonded(stash.clone(), controller);
        source.set_nominations(stash.clone(), 3);

        let result = collect_direct(&source, &stash).await.unwrap();
        assert_eq!(result.snapshot, StakingSnapshot::new(900, 3, 0));
    }

    #[tokio::test]
    async fn test_direct_not_staking_is_zero() {
        let source = FakeSource::default();
        let result = collect_direct(&source, &account(9)).await.unwrap();
        assert_eq!(result, PartialCollectionResult::zero());
    }

    #[tokio::test]
    async fn test_direct_missing_nominations_counts_zero() {
        let source = FakeSource::default();
        source.set_ledger(account(1), account(1), 10, 0);

        let result = collect_direct(&source, &account(1)).await.unwrap();
        assert_eq!(result.snapshot.nominations_count, 0);
    }

    #[tokio::test]
    async fn test_direct_rpc_error_is_hard_error() {
        let source = FakeSource::default();
        source.fail_direct(true);

        let err = collect_direct(&source, &account(1)).await.unwrap_err();
        assert!(matches!(err, CollectionError::Direct { .. }));
    }

    #[tokio::test]
    async fn test_pool_member_points_as_stake() {
        let source = FakeSource::default();
        source.set_pool_member(
            account(3),
            PoolMembership {
                pool_id: 7,
                points: 250,
                unbonding_eras: 2,
            },
        );

        let result = collect_pool(&source, &account(3)).await;
        assert_eq!(result, PartialCollectionResult::collected(StakingSnapshot::new(250, 0, 2)));
        assert_eq!(collect_pool(&source, &account(4)).await, PartialCollectionResult::zero());
    }

    #[tokio::test]
    async fn test_pool_error_is_soft() {
        let source = FakeSource::default();
        source.fail_pools(true);

        let result = collect_pool(&source, &account(3)).await;
        assert!(result.collection_failed);
        assert!(result.snapshot.is_zero());
    }
}
