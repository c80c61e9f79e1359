//! LiquidLong client core.
//!
//! This crate provides the client-side access layer for LiquidLong:
//! - Pluggable scheduling (real tokio timers or a virtual clock for tests)
//! - Self-refreshing cached values with at-most-one fetch in flight
//! - Position economics (liquidation price, fees, cost estimates)
//! - The `LiquidLong` facade tying both to the contract binding
//! - Profile-based configuration

pub mod config;
pub mod economics;
mod error;
mod liquid_long;
mod polled_value;
mod position;
pub mod scheduler;
pub mod u256_math;

pub use config::{ContractConfig, LiquidLongConfig, PollingConfig, PositionsConfig};
pub use economics::{CostEstimate, PositionQuote};
pub use error::{DelayCancelled, Error, PollError, Result};
pub use liquid_long::{LiquidLong, LiquidLongBuilder, DEFAULT_PAGE_SIZE, DEFAULT_POLLING_INTERVAL};
pub use polled_value::{PolledValue, PolledValueWithDefault};
pub use position::Position;
pub use scheduler::{Scheduler, TaskId, TokioScheduler, VirtualScheduler};
