use noter_reconciler::{ChainError, DispatchFailure, SubmissionError};
use subxt::error::DispatchError;
use thiserror::Error;

/// Errors returned by the subxt-backed chain clients.
#[derive(Debug, Error)]
pub enum ChainClientError {
    #[error("Subxt error: {0}")]
    Subxt(#[from] subxt::Error),
    #[error("Storage decode error: {0}")]
    Decode(String),
    #[error("Invalid storage key bytes")]
    InvalidKey,
}

impl From<ChainClientError> for ChainError {
    fn from(err: ChainClientError) -> Self {
        match err {
            ChainClientError::Subxt(e) => ChainError::Rpc(e.to_string()),
            ChainClientError::Decode(reason) => ChainError::Decode(reason),
            ChainClientError::InvalidKey => ChainError::Decode("invalid storage key bytes".to_string()),
        }
    }
}

/// Classify a subxt error raised while submitting or watching an extrinsic.
pub(crate) fn submission_error(err: subxt::Error) -> SubmissionError {
    match err {
        subxt::Error::Runtime(DispatchError::Module(module)) => match module.details() {
            Ok(details) => SubmissionError::Dispatch(DispatchFailure::Module {
                pallet: details.pallet.name().to_string(),
                error: details.variant.name.clone(),
            }),
            Err(_) => SubmissionError::Dispatch(DispatchFailure::Other(format!("{module:?}"))),
        },
        subxt::Error::Runtime(other) => SubmissionError::Dispatch(DispatchFailure::Other(other.to_string())),
        subxt::Error::Rpc(e) => SubmissionError::Transport(ChainError::Rpc(e.to_string())),
        other => SubmissionError::Rejected(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_maps_to_chain_error() {
        let err: ChainError = ChainClientError::InvalidKey.into();
        assert!(matches!(err, ChainError::Decode(_)));

        let err: ChainError = ChainClientError::Decode("short input".to_string()).into();
        assert!(err.to_string().contains("short input"));
    }

    #[test]
    fn test_other_errors_are_rejections() {
        let err = submission_error(subxt::Error::Other("nonce too low".to_string()));
        assert!(matches!(err, SubmissionError::Rejected(msg) if msg.contains("nonce too low")));
    }
}
