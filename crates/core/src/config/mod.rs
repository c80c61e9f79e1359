//! Client configuration.
//!
//! - Runtime configuration with profiles (polling cadence, page size)
//! - Contract location (address, RPC endpoint, chain id)

mod app;
mod contract;

pub use app::{LiquidLongConfig, PollingConfig, PositionsConfig};
pub use contract::ContractConfig;
