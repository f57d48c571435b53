//! Destination chain access: tracked set, staking cache, events and writes.

use crate::connector::ChainConnector;
use crate::error::{submission_error, ChainClientError};
use crate::{account_from_key, decode_value};
use async_trait::async_trait;
use futures::StreamExt;
use noter_reconciler::{
    BlockStream, ChainError, ChainResult, DestinationChain, DestinationEvent, SubmissionError,
    SubmissionReceipt, SubmissionResult,
};
use noter_types::{AccountId32, BlockRef, PendingUpdate, Source, StakingCall, StakingSnapshot};
use sp_core::sr25519;
use std::collections::HashMap;
use std::sync::Arc;
use subxt::client::OnlineClientT;
use subxt::dynamic::{storage, tx, Value};
use subxt::tx::{DynamicPayload, PairSigner, TxStatus};
use subxt::PolkadotConfig;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default destination pallet.
pub const DEFAULT_PALLET: &str = "StakingScores";

const TRACKING_STARTED: &str = "TrackingStarted";

/// Destination chain client signing with the noter key.
pub struct SubstrateDestination {
    connector: Arc<ChainConnector>,
    pallet: String,
    signer: PairSigner<PolkadotConfig, sr25519::Pair>,
    // One extrinsic in flight at a time so nonces never collide.
    submit_lock: Mutex<()>,
}

impl SubstrateDestination {
    pub fn new(connector: Arc<ChainConnector>, pallet: impl Into<String>, keypair: sr25519::Pair) -> Self {
        Self {
            connector,
            pallet: pallet.into(),
            signer: PairSigner::new(keypair),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn pallet(&self) -> &str {
        &self.pallet
    }

    /// Account the noter signs with.
    pub fn signer_account(&self) -> AccountId32 {
        AccountId32::from(self.signer.account_id().0)
    }

    fn details_call(&self, update: &PendingUpdate) -> DynamicPayload {
        tx(
            self.pallet.as_str(),
            "receive_staking_details",
            vec![
                Value::from_bytes(&update.account),
                source_value(update.source),
                Value::u128(update.snapshot.staked_amount),
                Value::u128(update.snapshot.nominations_count as u128),
                Value::u128(update.snapshot.unlocking_chunks_count as u128),
            ],
        )
    }

    fn build_call(&self, call: &StakingCall) -> DynamicPayload {
        match call {
            StakingCall::ReceiveStakingDetails(update) => self.details_call(update),
            StakingCall::BatchAll(calls) => tx(
                "Utility",
                "batch_all",
                vec![Value::unnamed_composite(
                    calls.iter().map(|inner| self.build_call(inner).into_value()),
                )],
            ),
        }
    }
}

/// Decode one destination event, recognising `TrackingStarted` of `tracked_pallet`.
fn decode_event(
    tracked_pallet: &str,
    pallet: &str,
    variant: &str,
    fields: &[u8],
) -> Result<DestinationEvent, ChainClientError> {
    if pallet == tracked_pallet && variant == TRACKING_STARTED {
        let account = decode_value::<AccountId32>(fields)?;
        return Ok(DestinationEvent::TrackingStarted { account });
    }
    Ok(DestinationEvent::Other {
        pallet: pallet.to_string(),
        variant: variant.to_string(),
    })
}

fn source_value(source: Source) -> Value {
    Value::unnamed_variant(source.wire_name(), Vec::new())
}

fn details_keys(account: &AccountId32, source: Source) -> Vec<Value> {
    vec![Value::from_bytes(account), source_value(source)]
}

#[async_trait]
impl DestinationChain for SubstrateDestination {
    async fn tracked_accounts(&self) -> ChainResult<Vec<AccountId32>> {
        let client = self.connector.client().await?;
        let query = storage(self.pallet.as_str(), "TrackedAccounts", Vec::<Value>::new());
        let mut iter = client
            .storage()
            .at_latest()
            .await
            .map_err(ChainClientError::from)?
            .iter(query)
            .await
            .map_err(ChainClientError::from)?;

        let mut accounts = Vec::new();
        while let Some(entry) = iter.next().await {
            let (key_bytes, _) = entry.map_err(ChainClientError::from)?;
            accounts.push(account_from_key(&key_bytes)?);
        }

        debug!(count = accounts.len(), "Fetched tracked accounts");
        Ok(accounts)
    }

    async fn cached_snapshots(
        &self,
        keys: &[(AccountId32, Source)],
    ) -> ChainResult<Vec<Option<StakingSnapshot>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.connector.client().await?;

        let mut storage_keys = Vec::with_capacity(keys.len());
        for (account, source) in keys {
            let address = storage(self.pallet.as_str(), "StakingDetails", details_keys(account, *source));
            storage_keys.push(
                client
                    .storage()
                    .address_bytes(&address)
                    .map_err(ChainClientError::from)?,
            );
        }

        let at = client
            .backend()
            .latest_finalized_block_ref()
            .await
            .map_err(ChainClientError::from)?
            .hash();
        let mut responses = client
            .backend()
            .storage_fetch_values(storage_keys.clone(), at)
            .await
            .map_err(ChainClientError::from)?;

        let mut found: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        while let Some(response) = responses.next().await {
            let response = response.map_err(ChainClientError::from)?;
            found.insert(response.key, response.value);
        }

        storage_keys
            .iter()
            .map(|key| {
                found
                    .get(key)
                    .map(|bytes| decode_value::<StakingSnapshot>(bytes))
                    .transpose()
                    .map_err(ChainError::from)
            })
            .collect()
    }

    async fn finalized_blocks(&self) -> ChainResult<BlockStream> {
        let client = self.connector.client().await?;
        let blocks = client
            .blocks()
            .subscribe_finalized()
            .await
            .map_err(|e| ChainError::Subscription(e.to_string()))?;

        Ok(blocks
            .map(|block| {
                block
                    .map(|block| BlockRef {
                        number: block.number(),
                        hash: block.hash(),
                    })
                    .map_err(|e| ChainError::Subscription(e.to_string()))
            })
            .boxed())
    }

    async fn block_events(&self, block: &BlockRef) -> ChainResult<Vec<DestinationEvent>> {
        let client = self.connector.client().await?;
        let events = client
            .blocks()
            .at(block.hash)
            .await
            .map_err(ChainClientError::from)?
            .events()
            .await
            .map_err(ChainClientError::from)?;

        let mut decoded = Vec::new();
        for event in events.iter() {
            let event = event.map_err(ChainClientError::from)?;
            decoded.push(decode_event(
                &self.pallet,
                event.pallet_name(),
                event.variant_name(),
                event.field_bytes(),
            )?);
        }
        Ok(decoded)
    }

    async fn submit(&self, call: &StakingCall) -> SubmissionResult<SubmissionReceipt> {
        let client = self.connector.client().await?;
        let payload = self.build_call(call);

        let _guard = self.submit_lock.lock().await;
        debug!(calls = call.flatten().len(), batched = call.is_batch(), "Submitting extrinsic");

        let mut progress = client
            .tx()
            .sign_and_submit_then_watch_default(&payload, &self.signer)
            .await
            .map_err(submission_error)?;

        while let Some(status) = progress.next().await {
            let (in_block, finalized) = match status.map_err(submission_error)? {
                TxStatus::InBestBlock(in_block) => (in_block, false),
                TxStatus::InFinalizedBlock(in_block) => (in_block, true),
                TxStatus::Error { message }
                | TxStatus::Invalid { message }
                | TxStatus::Dropped { message } => {
                    return Err(SubmissionError::Rejected(message));
                }
                _ => continue,
            };

            let receipt = SubmissionReceipt {
                block_hash: in_block.block_hash(),
                extrinsic_hash: in_block.extrinsic_hash(),
                finalized,
            };
            in_block.wait_for_success().await.map_err(submission_error)?;

            info!(
                block = ?receipt.block_hash,
                extrinsic = ?receipt.extrinsic_hash,
                finalized,
                "Extrinsic included"
            );
            return Ok(receipt);
        }

        Err(SubmissionError::Rejected(
            "transaction status stream ended before inclusion".to_string(),
        ))
    }

    async fn wait_ready(&self) {
        self.connector.wait_ready().await;
    }
}
