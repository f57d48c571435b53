//! Decides whether a fresh snapshot should overwrite the cached one.

use noter_types::StakingSnapshot;

/// Outcome of comparing a fresh snapshot with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Write the snapshot.
    Submit,
    /// Leave the cache as it is.
    Suppress(SuppressReason),
}

/// Why a write was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Fresh and cached values are equal.
    Unchanged,
    /// Pool data was missing and the fresh value would lower the cached stake.
    IncompleteDowngrade,
    /// The source is retired and the cache holds nothing worth zeroing.
    RetiredNothingToClear,
}

impl Decision {
    pub fn is_submit(&self) -> bool {
        matches!(self, Decision::Submit)
    }
}

/// Compare a fresh snapshot against the cached record.
///
/// A missing record is always written. Equal values are never rewritten. When
/// part of the fresh value could not be collected, a drop in staked amount is
/// not trusted and the cached record is kept.
pub fn should_update(
    fresh: &StakingSnapshot,
    cached: Option<&StakingSnapshot>,
    collection_failed: bool,
) -> Decision {
    let Some(cached) = cached else {
        return Decision::Submit;
    };

    if fresh == cached {
        return Decision::Suppress(SuppressReason::Unchanged);
    }

    if collection_failed && fresh.staked_amount < cached.staked_amount {
        return Decision::Suppress(SuppressReason::IncompleteDowngrade);
    }

    Decision::Submit
}

/// Decision for a source whose staking pallet has been removed.
///
/// The record is zeroed once if it still carries data; absent or zero records
/// are left alone.
pub fn retired_source_decision(cached: Option<&StakingSnapshot>) -> Decision {
    match cached {
        Some(snapshot) if !snapshot.is_zero() => Decision::Submit,
        Some(_) => Decision::Suppress(SuppressReason::Unchanged),
        None => Decision::Suppress(SuppressReason::RetiredNothingToClear),
    }
}
