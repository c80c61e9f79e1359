//! Transaction signer and sender.
//! Uses Alloy providers for type-safe RPC interactions.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::binding::TxReceipt;

/// Default gas limit for position management calls.
/// Opening a position trades against the order book and locks collateral in
/// one transaction, so budget generously.
const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

/// Signs and sends contract calls, waiting for their receipts.
pub struct TransactionSender {
    /// RPC URL for sending transactions
    rpc_url: String,
    /// Signer wallet
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    /// Chain ID
    chain_id: u64,
    /// Gas limit applied to every transaction
    gas_limit: u64,
}

impl TransactionSender {
    /// Create a new transaction sender from a private key (with or without `0x`).
    pub fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let address = signer.address();

        info!(address = %address, chain_id = chain_id, "Transaction sender initialized");

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
            gas_limit: DEFAULT_GAS_LIMIT,
        })
    }

    /// Override the gas limit.
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Sign, send and wait for the receipt of a contract call.
    ///
    /// A reverted transaction is returned as a receipt with `status == false`;
    /// interpreting it is up to the caller.
    pub async fn send_call(&self, to: Address, calldata: Bytes, value: U256) -> Result<TxReceipt> {
        let start = Instant::now();
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let nonce = provider.get_transaction_count(self.address).await?;
        let gas_price = provider.get_gas_price().await?;

        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_value(value)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        debug!(to = %to, value = %value, nonce = nonce, "Sending transaction");

        let pending = provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, "Transaction submitted, waiting for confirmation");

        let receipt = pending.get_receipt().await?;
        let logs = receipt
            .inner
            .logs()
            .iter()
            .map(|log| log.inner.clone())
            .collect();

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = start.elapsed().as_millis(),
                "Transaction confirmed"
            );
        } else {
            warn!(tx_hash = %tx_hash, total_ms = start.elapsed().as_millis(), "Transaction reverted");
        }

        Ok(TxReceipt {
            tx_hash,
            status: receipt.status(),
            block_number: receipt.block_number,
            logs,
        })
    }

    /// Get the RPC URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_address_from_key() {
        // Well-known development key (DO NOT USE IN PRODUCTION)
        let private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let sender = TransactionSender::new(private_key, "http://localhost:8545", 1).unwrap();

        assert_eq!(
            format!("{:?}", sender.address).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(sender.gas_limit, DEFAULT_GAS_LIMIT);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(TransactionSender::new("not-a-key", "http://localhost:8545", 1).is_err());
    }
}
