//! Error types for the LiquidLong client core.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the economics facade.
#[derive(Debug, Error)]
pub enum Error {
    /// A polled value failed to fetch or has been shut down
    #[error(transparent)]
    Poll(#[from] PollError),

    /// A cached input needed for a computation has never been fetched
    #[error("{0} is not available yet")]
    NotReady(&'static str),

    /// Caller supplied a value outside the domain of the computation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The contract answered in a way the client's ABI does not expect
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A submitted transaction was mined but reverted
    #[error("transaction {0} reverted")]
    Reverted(alloy::primitives::B256),

    /// Contract binding I/O failure, propagated unchanged
    #[error(transparent)]
    Contract(#[from] anyhow::Error),
}

/// Outcome of a failed fetch cycle, shared by every caller awaiting it.
#[derive(Debug, Clone, Error)]
pub enum PollError {
    /// The fetch function returned an error (or panicked)
    #[error("fetch of {name} failed: {cause}")]
    Fetch {
        name: String,
        cause: Arc<anyhow::Error>,
    },

    /// The value no longer polls
    #[error("{0} has been shut down")]
    ShutDown(String),
}

/// A [`Scheduler::delay`](crate::scheduler::Scheduler::delay) whose timer was
/// cancelled before it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("scheduled delay was cancelled")]
pub struct DelayCancelled;
