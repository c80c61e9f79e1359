//! Where the LiquidLong contract lives.

use alloy::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Contract location. String values may reference environment variables as
/// `${VAR}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// LiquidLong contract address
    #[serde(default = "default_address")]
    pub address: String,

    /// HTTP RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Expected chain id; checked against the node when set
    #[serde(default)]
    pub chain_id: Option<u64>,
}

fn default_address() -> String {
    "${LIQUID_LONG_ADDRESS}".to_string()
}
fn default_rpc_url() -> String {
    "${RPC_URL}".to_string()
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            rpc_url: default_rpc_url(),
            chain_id: None,
        }
    }
}

impl ContractConfig {
    /// Expand environment variables in config values.
    pub fn expand_env_vars(&mut self) {
        self.address = expand_env(&self.address);
        self.rpc_url = expand_env(&self.rpc_url);
    }

    /// Parsed contract address.
    pub fn address(&self) -> anyhow::Result<Address> {
        let address = expand_env(&self.address);
        address
            .parse()
            .with_context(|| format!("invalid LiquidLong contract address {address:?}"))
    }

    /// RPC endpoint with environment variables expanded.
    pub fn rpc_url(&self) -> anyhow::Result<String> {
        let url = expand_env(&self.rpc_url);
        if url.is_empty() || url.contains("${") {
            anyhow::bail!("RPC URL is not configured (got {url:?})");
        }
        Ok(url)
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left as-is.
fn expand_env(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");
    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
