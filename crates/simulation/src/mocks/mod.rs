//! Reusable mock implementations of the noter's chain seams.

pub mod destination;
pub mod source;

pub use destination::{MockDestinationChain, SubmitFailure, SubmittedExtrinsic};
pub use source::{MockSourceChain, MockStakingState};
