//! Error types for staking reconciliation.
//!
//! Mirrors the failure taxonomy of the noter: transport failures on a chain
//! connection, collection failures on a source chain, dispatch failures on the
//! destination chain, and the top-level error that aborts one account's cycle.

use thiserror::Error;

/// Top-level error for one reconciliation cycle.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Remote chain access failed.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Direct staking collection failed.
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    /// Cache update submission failed.
    #[error("submission error: {0}")]
    Submission(#[from] SubmissionError),

    /// Reconciliation was interrupted by shutdown.
    #[error("shutdown requested")]
    Shutdown,
}

/// Errors reported by a chain connection.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Connecting to the node failed.
    #[error("connection to {endpoint} failed: {reason}")]
    Connection {
        /// Endpoint URL.
        endpoint: String,
        /// Underlying reason.
        reason: String,
    },

    /// The connection is down and has not come back yet.
    #[error("chain {0} is not ready")]
    NotReady(String),

    /// RPC call failed.
    #[error("rpc call failed: {0}")]
    Rpc(String),

    /// Storage or event payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Block subscription failed or ended.
    #[error("subscription failed: {0}")]
    Subscription(String),
}

/// Errors while collecting staking state from a source chain.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// Direct staking ledger lookup failed. Direct data is not optional.
    #[error("direct staking query on {chain} failed: {error}")]
    Direct {
        /// Source chain name.
        chain: String,
        /// Underlying chain error.
        error: ChainError,
    },

    /// Staking availability probe failed.
    #[error("staking availability probe on {chain} failed: {error}")]
    Availability {
        /// Source chain name.
        chain: String,
        /// Underlying chain error.
        error: ChainError,
    },

    /// The availability probe already failed earlier in the same scope.
    #[error("source chain {chain} unreachable in this scope")]
    Unreachable {
        /// Source chain name.
        chain: String,
    },
}

/// Decoded dispatch failure of a submitted extrinsic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchFailure {
    /// A pallet error with resolved names.
    #[error("{pallet}::{error}")]
    Module {
        /// Pallet that raised the error.
        pallet: String,
        /// Error variant name.
        error: String,
    },

    /// Any dispatch error that could not be resolved against metadata.
    #[error("{0}")]
    Other(String),
}

/// Errors while submitting cache updates to the destination chain.
#[derive(Debug, Clone, Error)]
pub enum SubmissionError {
    /// The extrinsic was included but its dispatch failed.
    #[error("dispatch failed: {0}")]
    Dispatch(DispatchFailure),

    /// The transaction pool rejected or dropped the extrinsic.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// Inclusion was not observed in time.
    #[error("no inclusion observed after {secs}s")]
    Timeout {
        /// Timeout in seconds.
        secs: u64,
    },

    /// The connection failed while submitting or watching.
    #[error("transport error: {0}")]
    Transport(#[from] ChainError),
}

/// Result type alias for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Result type alias for chain access.
pub type ChainResult<T> = Result<T, ChainError>;

/// Result type alias for collection.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Result type alias for submission.
pub type SubmissionResult<T> = Result<T, SubmissionError>;
