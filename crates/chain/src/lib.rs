//! LiquidLong chain interaction layer.
//!
//! This crate provides:
//! - The [`ContractBinding`] boundary used by the client core
//! - LiquidLong contract bindings (`sol!` generated)
//! - An RPC-backed binding for reads and transaction submission
//! - Transaction signing and sending

mod binding;
pub mod contracts;
mod provider;
mod signer;

pub use binding::{ContractBinding, TxReceipt};
pub use contracts::{ILiquidLong, CDP};
pub use provider::RpcBinding;
pub use signer::TransactionSender;
