//! Combines direct and pool partial results into one snapshot.

use noter_types::{PartialCollectionResult, StakingSnapshot};

/// Merge direct staking with pool membership.
///
/// Staked and unlocking are summed; nominations come from direct staking only,
/// since pool members do not nominate. The returned flag is set when the pool
/// half could not be collected.
pub fn combine(
    direct: &PartialCollectionResult,
    pool: &PartialCollectionResult,
) -> (StakingSnapshot, bool) {
    let snapshot = StakingSnapshot {
        staked_amount: direct
            .snapshot
            .staked_amount
            .saturating_add(pool.snapshot.staked_amount),
        nominations_count: direct.snapshot.nominations_count,
        unlocking_chunks_count: direct
            .snapshot
            .unlocking_chunks_count
            .saturating_add(pool.snapshot.unlocking_chunks_count),
    };

    (snapshot, pool.collection_failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_sums_staked_and_unlocking() {
        let direct = PartialCollectionResult::collected(StakingSnapshot::new(100, 2, 1));
        let pool = PartialCollectionResult::collected(StakingSnapshot::new(50, 0, 0));

        let (combined, failed) = combine(&direct, &pool);
        assert_eq!(combined, StakingSnapshot::new(150, 2, 1));
        assert!(!failed);
    }

    #[test]
    fn test_combine_ignores_pool_nominations() {
        let direct = PartialCollectionResult::collected(StakingSnapshot::new(0, 3, 0));
        let pool = PartialCollectionResult::collected(StakingSnapshot::new(10, 7, 2));

        let (combined, _) = combine(&direct, &pool);
        assert_eq!(combined.nominations_count, 3);
        assert_eq!(combined.unlocking_chunks_count, 2);
    }

    #[test]
    fn test_combine_propagates_pool_failure() {
        let direct = PartialCollectionResult::collected(StakingSnapshot::new(400, 1, 0));
        let (combined, failed) = combine(&direct, &PartialCollectionResult::failed());

        assert_eq!(combined, StakingSnapshot::new(400, 1, 0));
        assert!(failed);
    }

    #[test]
    fn test_combine_saturates() {
        let direct = PartialCollectionResult::collected(StakingSnapshot::new(u128::MAX, 0, 0));
        let pool = PartialCollectionResult::collected(StakingSnapshot::new(1, 0, 0));

        let (combined, _) = combine(&direct, &pool);
        assert_eq!(combined.staked_amount, u128::MAX);
    }
}
