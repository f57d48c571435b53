//! # Staking Cache Reconciliation
//!
//! Keeps the destination chain's per-account staking cache consistent with
//! the staking state of the source chains, for every account that opted into
//! score tracking.
//!
//! ## Architecture
//!
//! ```text
//!                   ┌──────────────┐
//!  Scheduler ──────▶│              │   collect ─▶ combine ─▶ cache ─▶ diff
//!  (full sweep)     │  Reconciler  │──────────────────────────────────────▶ Submitter
//!  EventWatcher ───▶│              │
//!  (TrackingStarted)└──────────────┘
//! ```
//!
//! ## Components
//!
//! - [`engine::Reconciler`]: per-account reconciliation shared by both entry points
//! - [`sweep::Sweeper`] / [`sweep::Scheduler`]: periodic full sweep in batched chunks
//! - [`watcher::EventWatcher`]: fast path for accounts that just started tracking
//! - [`bootstrap`]: startup sweep gating the watcher
//! - [`chain`]: the traits chain clients implement
//!
//! ## Guarantees
//!
//! - A record is only written when it differs from the cache, or the cache is empty.
//! - A stake drop computed from incomplete pool data never overwrites the cache.
//! - Each chunk or event-triggered account lands in exactly one extrinsic.

#![warn(clippy::all)]

pub mod aggregator;
pub mod bootstrap;
pub mod cache;
pub mod chain;
pub mod collector;
pub mod diff;
pub mod engine;
pub mod error;
pub mod memo;
pub mod registry;
pub mod shutdown;
pub mod submitter;
pub mod sweep;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use bootstrap::{run_bootstrap, BootstrapConfig, BootstrapState};
pub use chain::{
    BlockStream, DestinationChain, DestinationEvent, LedgerInfo, PoolMembership, SourceChain,
    SubmissionReceipt,
};
pub use engine::{
    AccountPlan, AccountReport, Availability, ReconcileScope, Reconciler, SourceBinding,
};
pub use error::{
    ChainError, ChainResult, CollectionError, DispatchFailure, ReconcileError, ReconcileResult,
    SubmissionError, SubmissionResult,
};
pub use registry::AccountRegistry;
pub use submitter::{SubmissionOutcome, Submitter};
pub use sweep::{Scheduler, SweepConfig, SweepStats, Sweeper};
pub use watcher::{BlockReport, EventWatcher, WatcherConfig, WatcherState};
