//! Chain client for the stake noter.
//!
//! Implements the reconciler's chain traits over subxt: staking reads on the
//! source chains, and tracked-set enumeration, cache reads, event decoding and
//! signed submissions on the destination chain. Every chain is reached through
//! a supervised [`ChainConnector`].

pub mod connector;
pub mod destination;
pub mod error;
pub mod source;

pub use connector::{ChainConnector, ConnectorConfig};
pub use destination::{SubstrateDestination, DEFAULT_PALLET};
pub use error::ChainClientError;
pub use source::SubstrateSource;

use codec::Decode;
use noter_types::AccountId32;
use subxt::dynamic::{storage, Value};
use subxt::{OnlineClient, PolkadotConfig};

/// Raw value of one storage entry at the latest block.
pub(crate) async fn fetch_raw(
    client: &OnlineClient<PolkadotConfig>,
    pallet: &str,
    entry: &str,
    keys: Vec<Value>,
) -> Result<Option<Vec<u8>>, ChainClientError> {
    let address = storage(pallet, entry, keys);
    let value = client.storage().at_latest().await?.fetch(&address).await?;
    Ok(value.map(|thunk| thunk.encoded().to_vec()))
}

/// Account id from the tail of a concat-hashed map key.
pub(crate) fn account_from_key(key_bytes: &[u8]) -> Result<AccountId32, ChainClientError> {
    if key_bytes.len() < 32 {
        return Err(ChainClientError::InvalidKey);
    }
    let start = key_bytes.len() - 32;
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&key_bytes[start..]);
    Ok(AccountId32::from(bytes))
}

/// Decode the leading fields of a storage value; trailing bytes are ignored.
pub(crate) fn decode_value<T: Decode>(bytes: &[u8]) -> Result<T, ChainClientError> {
    Decode::decode(&mut &bytes[..]).map_err(|err| ChainClientError::Decode(err.to_string()))
}
