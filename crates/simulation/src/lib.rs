//! # Noter Simulation Crate
//!
//! In-memory chains for end-to-end testing of the stake noter without a node.
//!
//! - [`mocks::MockSourceChain`]: direct staking and pool storage, with failure injection
//! - [`mocks::MockDestinationChain`]: tracked set, staking cache, finalized
//!   blocks and atomic batch application
//! - [`NoterHarness`]: wires the mocks to a real [`noter_reconciler::Reconciler`]
//!
//! ```rust,ignore
//! use noter_simulation::{account, NoterHarness};
//!
//! let harness = NoterHarness::new();
//! harness.asset_hub.stake(&account(1), 100, 2, 1);
//! harness.track(&account(1));
//! harness.bootstrap().await?;
//! ```

pub mod harness;
pub mod mocks;

pub use harness::{account, join, HarnessConfig, HarnessError, HarnessResult, NoterHarness};
pub use mocks::{MockDestinationChain, MockSourceChain, SubmitFailure, SubmittedExtrinsic};
