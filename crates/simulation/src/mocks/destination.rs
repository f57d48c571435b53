//! Mock destination chain: tracked set, staking cache, finalized blocks and
//! extrinsic recording.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use noter_reconciler::{
    BlockStream, ChainError, ChainResult, DestinationChain, DestinationEvent, DispatchFailure,
    SubmissionError, SubmissionReceipt, SubmissionResult,
};
use noter_types::{AccountId32, BlockRef, Source, StakingCall, StakingSnapshot, H256};
use tokio::sync::watch;

/// A submitted extrinsic for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedExtrinsic {
    /// The call as submitted.
    pub call: StakingCall,
    /// Block it was included in.
    pub block: u32,
}

impl SubmittedExtrinsic {
    /// Number of `receive_staking_details` calls carried.
    pub fn detail_count(&self) -> usize {
        self.call.flatten().len()
    }
}

/// How submissions should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitFailure {
    /// The pallet rejects the call (e.g. signer is not the noter).
    Dispatch {
        pallet: String,
        error: String,
    },
    /// The pool drops the transaction.
    Rejected(String),
}

/// Mock destination chain for simulation testing.
///
/// Submissions apply atomically to the in-memory cache, the way `batch_all`
/// does on chain: either every inner call lands or none does.
pub struct MockDestinationChain {
    tracked: Mutex<BTreeSet<AccountId32>>,
    cache: Mutex<HashMap<(AccountId32, Source), StakingSnapshot>>,
    submitted: Mutex<VecDeque<SubmittedExtrinsic>>,
    events: Mutex<HashMap<H256, Vec<DestinationEvent>>>,
    subscriber: Mutex<Option<mpsc::UnboundedSender<ChainResult<BlockRef>>>>,
    subscriptions: AtomicUsize,
    best_block: AtomicU32,
    submit_failure: Mutex<Option<SubmitFailure>>,
    enumeration_failures: AtomicUsize,
    cache_reads: AtomicUsize,
    ready: watch::Sender<bool>,
}

impl Default for MockDestinationChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDestinationChain {
    /// Create an empty destination chain that is ready.
    pub fn new() -> Self {
        let (ready, _) = watch::channel(true);
        Self {
            tracked: Mutex::new(BTreeSet::new()),
            cache: Mutex::new(HashMap::new()),
            submitted: Mutex::new(VecDeque::new()),
            events: Mutex::new(HashMap::new()),
            subscriber: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            best_block: AtomicU32::new(0),
            submit_failure: Mutex::new(None),
            enumeration_failures: AtomicUsize::new(0),
            cache_reads: AtomicUsize::new(0),
            ready,
        }
    }

    /// Add `account` to the tracked set without emitting an event.
    pub fn track(&self, account: &AccountId32) {
        self.tracked.lock().expect("tracked lock poisoned").insert(account.clone());
    }

    /// Seed a cache record.
    pub fn set_cached(&self, account: &AccountId32, source: Source, snapshot: StakingSnapshot) {
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .insert((account.clone(), source), snapshot);
    }

    /// Current cache record.
    pub fn cached(&self, account: &AccountId32, source: Source) -> Option<StakingSnapshot> {
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .get(&(account.clone(), source))
            .copied()
    }

    /// Make submissions fail until cleared with `None`.
    pub fn set_submit_failure(&self, failure: Option<SubmitFailure>) {
        *self.submit_failure.lock().expect("failure lock poisoned") = failure;
    }

    /// Fail the next `count` tracked-set enumerations.
    pub fn fail_enumerations(&self, count: usize) {
        self.enumeration_failures.store(count, Ordering::SeqCst);
    }

    /// Mark the connection down or up.
    pub fn set_ready(&self, ready: bool) {
        self.ready.send_replace(ready);
    }

    /// Every submitted extrinsic, oldest first.
    pub fn submitted(&self) -> Vec<SubmittedExtrinsic> {
        self.submitted
            .lock()
            .expect("submitted lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.lock().expect("submitted lock poisoned").len()
    }

    pub fn clear_submissions(&self) {
        self.submitted.lock().expect("submitted lock poisoned").clear();
    }

    /// Finalized-block subscriptions opened so far.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// `StakingDetails` reads served, counting each key of a multi-read.
    pub fn cache_reads(&self) -> usize {
        self.cache_reads.load(Ordering::SeqCst)
    }

    /// Finalize a new block carrying `events` and deliver it to the current
    /// subscriber. Returns the block.
    pub fn finalize_block(&self, events: Vec<DestinationEvent>) -> BlockRef {
        let number = self.best_block.fetch_add(1, Ordering::SeqCst) + 1;
        let block = BlockRef {
            number,
            hash: H256::from_low_u64_be(number as u64),
        };

        for event in &events {
            if let DestinationEvent::TrackingStarted { account } = event {
                self.track(account);
            }
        }
        self.events.lock().expect("events lock poisoned").insert(block.hash, events);

        if let Some(subscriber) = self.subscriber.lock().expect("subscriber lock poisoned").as_ref() {
            let _ = subscriber.unbounded_send(Ok(block));
        }
        block
    }

    /// Opt `account` in: add it to the tracked set and finalize a block
    /// carrying `TrackingStarted`.
    pub fn start_tracking(&self, account: &AccountId32) -> BlockRef {
        self.finalize_block(vec![DestinationEvent::TrackingStarted {
            account: account.clone(),
        }])
    }

    /// End the current subscription as a transport drop would.
    pub fn drop_subscription(&self) {
        self.subscriber.lock().expect("subscriber lock poisoned").take();
    }

    fn apply(&self, call: &StakingCall) -> SubmissionResult<SubmissionReceipt> {
        if let Some(failure) = self.submit_failure.lock().expect("failure lock poisoned").clone() {
            return Err(match failure {
                SubmitFailure::Dispatch { pallet, error } => {
                    SubmissionError::Dispatch(DispatchFailure::Module { pallet, error })
                }
                SubmitFailure::Rejected(reason) => SubmissionError::Rejected(reason),
            });
        }

        let mut cache = self.cache.lock().expect("cache lock poisoned");
        for update in call.flatten() {
            cache.insert((update.account.clone(), update.source), update.snapshot);
        }
        drop(cache);

        let block = self.best_block.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted
            .lock()
            .expect("submitted lock poisoned")
            .push_back(SubmittedExtrinsic {
                call: call.clone(),
                block,
            });

        Ok(SubmissionReceipt {
            block_hash: H256::from_low_u64_be(block as u64),
            extrinsic_hash: H256::from_low_u64_be(u64::MAX - block as u64),
            finalized: false,
        })
    }
}

#[async_trait]
impl DestinationChain for MockDestinationChain {
    async fn tracked_accounts(&self) -> ChainResult<Vec<AccountId32>> {
        if self
            .enumeration_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainError::Rpc("TrackedAccounts iteration failed".to_string()));
        }
        Ok(self
            .tracked
            .lock()
            .expect("tracked lock poisoned")
            .iter()
            .cloned()
            .collect())
    }

    async fn cached_snapshots(
        &self,
        keys: &[(AccountId32, Source)],
    ) -> ChainResult<Vec<Option<StakingSnapshot>>> {
        self.cache_reads.fetch_add(keys.len(), Ordering::SeqCst);
        Ok(keys
            .iter()
            .map(|(account, source)| self.cached(account, *source))
            .collect())
    }

    async fn finalized_blocks(&self) -> ChainResult<BlockStream> {
        let (tx, rx) = mpsc::unbounded();
        *self.subscriber.lock().expect("subscriber lock poisoned") = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx.boxed())
    }

    async fn block_events(&self, block: &BlockRef) -> ChainResult<Vec<DestinationEvent>> {
        self.events
            .lock()
            .expect("events lock poisoned")
            .get(&block.hash)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("block {} not found", block.number)))
    }

    async fn submit(&self, call: &StakingCall) -> SubmissionResult<SubmissionReceipt> {
        self.apply(call)
    }

    async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|up| *up).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noter_types::PendingUpdate;

    #[tokio::test]
    async fn test_batch_applies_atomically() {
        let chain = MockDestinationChain::new();
        let updates: Vec<_> = (1..=3)
            .map(|b| {
                PendingUpdate::new(
                    AccountId32::new([b; 32]),
                    Source::Combined,
                    StakingSnapshot::new(b as u128, 0, 0),
                )
            })
            .collect();
        let call = StakingCall::from_updates(&updates).unwrap();

        chain.set_submit_failure(Some(SubmitFailure::Rejected("pool full".to_string())));
        assert!(chain.submit(&call).await.is_err());
        assert_eq!(chain.cached(&AccountId32::new([1; 32]), Source::Combined), None);

        chain.set_submit_failure(None);
        chain.submit(&call).await.unwrap();
        assert_eq!(chain.submission_count(), 1);
        assert_eq!(chain.submitted()[0].detail_count(), 3);
        assert_eq!(
            chain.cached(&AccountId32::new([3; 32]), Source::Combined),
            Some(StakingSnapshot::new(3, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_finalized_blocks_delivered_to_subscriber() {
        let chain = MockDestinationChain::new();
        let mut blocks = chain.finalized_blocks().await.unwrap();

        let alice = AccountId32::new([1; 32]);
        let block = chain.start_tracking(&alice);
        assert_eq!(blocks.next().await.unwrap().unwrap(), block);
        assert_eq!(chain.tracked_accounts().await.unwrap(), vec![alice]);

        chain.drop_subscription();
        assert!(blocks.next().await.is_none());
    }
}
