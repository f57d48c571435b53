//! Submits pending cache updates to the destination chain.
//!
//! Every nonempty update set becomes exactly one extrinsic: a single
//! `receive_staking_details` call, or a `batch_all` wrapping several of them so
//! the set lands atomically.

use crate::chain::{DestinationChain, SubmissionReceipt};
use crate::error::{DispatchFailure, SubmissionError};
use noter_types::{short_account, PendingUpdate, StakingCall};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default time to wait for inclusion.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of one submission attempt.
#[derive(Debug, Clone)]
pub enum SubmissionOutcome {
    /// No updates; nothing was sent.
    Nothing,
    /// The extrinsic was included and dispatched successfully.
    Included {
        /// Inclusion proof.
        receipt: SubmissionReceipt,
        /// Number of detail calls carried.
        calls: usize,
    },
    /// Submission or dispatch failed. No update in the set was applied.
    Failed {
        /// Failure cause.
        error: SubmissionError,
        /// Number of detail calls that were lost.
        calls: usize,
    },
}

impl SubmissionOutcome {
    /// Number of records written.
    pub fn written(&self) -> usize {
        match self {
            SubmissionOutcome::Included { calls, .. } => *calls,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SubmissionOutcome::Failed { .. })
    }
}

/// Wraps updates into calls and submits them.
#[derive(Clone)]
pub struct Submitter {
    destination: Arc<dyn DestinationChain>,
    timeout: Duration,
}

impl Submitter {
    pub fn new(destination: Arc<dyn DestinationChain>) -> Self {
        Self {
            destination,
            timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    /// Set the inclusion timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Submit `updates` as one extrinsic.
    pub async fn submit(&self, updates: &[PendingUpdate]) -> SubmissionOutcome {
        let Some(call) = StakingCall::from_updates(updates) else {
            return SubmissionOutcome::Nothing;
        };
        let calls = updates.len();

        for update in updates {
            debug!(
                account = %short_account(&update.account),
                source = %update.source,
                staked = %update.snapshot.staked_amount,
                nominations = update.snapshot.nominations_count,
                unlocking = update.snapshot.unlocking_chunks_count,
                "Queueing staking details"
            );
        }

        let result = match tokio::time::timeout(self.timeout, self.destination.submit(&call)).await {
            Ok(result) => result,
            Err(_) => Err(SubmissionError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        };

        match result {
            Ok(receipt) => {
                info!(
                    calls,
                    batched = call.is_batch(),
                    block = ?receipt.block_hash,
                    extrinsic = ?receipt.extrinsic_hash,
                    finalized = receipt.finalized,
                    "Staking details submitted"
                );
                SubmissionOutcome::Included { receipt, calls }
            }
            Err(e) => {
                match &e {
                    SubmissionError::Dispatch(DispatchFailure::Module { pallet, error }) => {
                        error!(
                            calls,
                            pallet = %pallet,
                            error = %error,
                            "Staking details dispatch failed"
                        );
                    }
                    other => {
                        error!(calls, error = %other, "Staking details submission failed");
                    }
                }
                SubmissionOutcome::Failed { error: e, calls }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDestination;
    use noter_types::{AccountId32, Source, StakingSnapshot};

    fn update(byte: u8) -> PendingUpdate {
        PendingUpdate::new(
            AccountId32::new([byte; 32]),
            Source::Combined,
            StakingSnapshot::new(byte as u128, 1, 0),
        )
    }

    #[tokio::test]
    async fn test_empty_submits_nothing() {
        let destination = Arc::new(FakeDestination::default());
        let submitter = Submitter::new(destination.clone());

        assert!(matches!(submitter.submit(&[]).await, SubmissionOutcome::Nothing));
        assert!(destination.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_single_update_is_not_batched() {
        let destination = Arc::new(FakeDestination::default());
        let submitter = Submitter::new(destination.clone());

        let outcome = submitter.submit(&[update(1)]).await;
        assert_eq!(outcome.written(), 1);

        let submitted = destination.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(!submitted[0].is_batch());
    }

    #[tokio::test]
    async fn test_many_updates_one_batch() {
        let destination = Arc::new(FakeDestination::default());
        let submitter = Submitter::new(destination.clone());

        let outcome = submitter.submit(&[update(1), update(2), update(3)]).await;
        assert_eq!(outcome.written(), 3);

        let submitted = destination.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].is_batch());
        assert_eq!(submitted[0].flatten().len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_failure_reported() {
        let destination = Arc::new(FakeDestination::default());
        destination.fail_submissions(true);
        let submitter = Submitter::new(destination);

        let outcome = submitter.submit(&[update(1), update(2)]).await;
        match outcome {
            SubmissionOutcome::Failed { error, calls } => {
                assert_eq!(calls, 2);
                assert!(matches!(
                    error,
                    SubmissionError::Dispatch(DispatchFailure::Module { .. })
                ));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
