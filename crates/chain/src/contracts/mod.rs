//! Contract bindings for the LiquidLong protocol.
//!
//! Only the subset of the LiquidLong ABI used by the client is declared here.
//! Calls are encoded with [`alloy::sol_types::SolCall`] and pushed through a
//! [`ContractBinding`](crate::ContractBinding); events are pulled back out of
//! receipts with [`TxReceipt::find_event`](crate::TxReceipt::find_event).

mod liquid_long;

pub use liquid_long::{ILiquidLong, CDP};
