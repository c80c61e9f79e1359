//! RPC-backed [`ContractBinding`] built on Alloy HTTP providers.

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::binding::{ContractBinding, TxReceipt};
use crate::signer::TransactionSender;

/// Contract binding over a JSON-RPC endpoint.
///
/// Reads go through a plain HTTP provider. Submissions need a
/// [`TransactionSender`]; a binding without one is read-only.
#[derive(Clone)]
pub struct RpcBinding {
    /// RPC URL used for `eth_call`
    read_url: String,
    /// Transaction sender (optional)
    sender: Option<Arc<TransactionSender>>,
}

impl RpcBinding {
    /// Create a read-only binding and verify the endpoint answers.
    pub async fn new(rpc_url: &str) -> Result<Self> {
        info!(rpc = rpc_url, "Initializing RPC binding");

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let block = provider.get_block_number().await?;
        info!(block = block, "RPC connection verified");

        Ok(Self {
            read_url: rpc_url.to_string(),
            sender: None,
        })
    }

    /// Attach a transaction sender, enabling [`ContractBinding::submit`].
    pub fn with_sender(mut self, sender: Arc<TransactionSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Whether this binding can submit transactions.
    pub fn can_submit(&self) -> bool {
        self.sender.is_some()
    }

    /// Get the read URL.
    pub fn read_url(&self) -> &str {
        &self.read_url
    }

    /// Get current block number.
    pub async fn block_number(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.read_url.parse()?);
        Ok(provider.get_block_number().await?)
    }

    /// Get chain ID.
    pub async fn chain_id(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.read_url.parse()?);
        Ok(provider.get_chain_id().await?)
    }
}

#[async_trait]
impl ContractBinding for RpcBinding {
    #[instrument(skip(self, calldata), fields(calldata_len = calldata.len()))]
    async fn read(&self, target: Address, calldata: Bytes) -> Result<Bytes> {
        let provider = ProviderBuilder::new().on_http(self.read_url.parse()?);
        let tx = TransactionRequest::default().to(target).input(calldata.into());
        let output = provider.call(tx).await?;

        debug!(target = %target, output_len = output.len(), "Contract read complete");
        Ok(output)
    }

    async fn submit(&self, target: Address, calldata: Bytes, value: U256) -> Result<TxReceipt> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("RPC binding is read-only: no transaction sender configured"))?;
        sender.send_call(target, calldata, value).await
    }
}

impl std::fmt::Debug for RpcBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcBinding")
            .field("read_url", &self.read_url)
            .field("sender", &self.sender.as_ref().map(|s| s.address))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_binding_creation() {
        let binding = RpcBinding::new("https://eth.llamarpc.com").await;
        assert!(binding.is_ok());
        assert!(!binding.unwrap().can_submit());
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_read_weth_total_supply() {
        let binding = RpcBinding::new("https://eth.llamarpc.com").await.unwrap();
        let weth: Address = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".parse().unwrap();
        // totalSupply()
        let calldata = Bytes::from(hex::decode("18160ddd").unwrap());
        let output = binding.read(weth, calldata).await.unwrap();
        assert_eq!(output.len(), 32);
    }
}
