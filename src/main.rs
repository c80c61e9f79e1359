//! LiquidLong client
//!
//! Connects to a deployed LiquidLong contract, keeps the ETH/USD price and
//! provider fee fresh, and reports position economics.
//! Features:
//! - Quote for a prospective leveraged position (`LEVERAGE`, `SIZE_ETH`)
//! - Position listing for a holder (`HOLDER`)
//! - Price change logging until Ctrl-C

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquid_long_chain::{ContractBinding, RpcBinding, TransactionSender};
use liquid_long_core::{CostEstimate, LiquidLong, LiquidLongConfig};

/// Environment variable names.
mod env {
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const LEVERAGE: &str = "LEVERAGE";
    pub const SIZE_ETH: &str = "SIZE_ETH";
    pub const HOLDER: &str = "HOLDER";
}

const DEFAULT_LEVERAGE: f64 = 2.0;
const DEFAULT_SIZE_ETH: f64 = 1.0;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,liquid_long_core=debug,liquid_long_chain=debug")
            }),
        )
        .init();

    // LIQUID_LONG_CONFIG (file) or LIQUID_LONG_PROFILE (testing, production)
    let config = LiquidLongConfig::from_env()?;
    config.log_config();

    let client = connect(&config).await?;

    info!("Waiting for price and fee...");
    client.ready().await.context("initial fetch failed")?;

    report_quote(&client).await?;

    if let Some(holder) = optional_env::<Address>(env::HOLDER)? {
        let positions = client.get_positions(holder).await?;
        info!(holder = %holder, count = positions.len(), "Positions");
        for position in &positions {
            info!(
                position = %serde_json::to_string(position)?,
                liquidation_price = ?position.liquidation_price(),
                "Position"
            );
        }
    }

    client.on_eth_price_change(|new, previous| match previous {
        Some(previous) if previous != new => {
            info!(price = new, previous, "ETH price changed");
        }
        Some(_) => {}
        None => info!(price = new, "ETH price"),
    });

    info!("Watching prices, Ctrl-C to exit");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    client.shutdown().await;
    Ok(())
}

/// Build the RPC binding (with signer if a key is configured) and the client.
async fn connect(config: &LiquidLongConfig) -> Result<LiquidLong> {
    let rpc_url = config.contract.rpc_url()?;
    let address = config.contract.address()?;

    let mut binding = RpcBinding::new(&rpc_url).await?;

    let chain_id = binding.chain_id().await?;
    if let Some(expected) = config.contract.chain_id {
        anyhow::ensure!(
            chain_id == expected,
            "RPC endpoint is on chain {chain_id}, expected {expected}"
        );
    }

    match std::env::var(env::PRIVATE_KEY) {
        Ok(key) => {
            let sender = TransactionSender::new(&key, &rpc_url, chain_id)?;
            info!(address = %sender.address, "Transaction sender ready");
            binding = binding.with_sender(Arc::new(sender));
        }
        Err(_) => warn!("PRIVATE_KEY not set, running read-only"),
    }

    let binding: Arc<dyn ContractBinding> = Arc::new(binding);
    Ok(LiquidLong::builder(binding, address).config(config).build()?)
}

async fn report_quote(client: &LiquidLong) -> Result<()> {
    let leverage = optional_env::<f64>(env::LEVERAGE)?.unwrap_or(DEFAULT_LEVERAGE);
    let size = optional_env::<f64>(env::SIZE_ETH)?.unwrap_or(DEFAULT_SIZE_ETH);

    let quote = client.quote(leverage, size)?;
    info!(
        price = quote.price,
        leverage = quote.multiplier,
        size = quote.size,
        loan = quote.loan_size,
        fee = quote.fee_in_eth,
        liquidation_price = quote.liquidation_price,
        penalty = quote.liquidation_penalty_percent,
        "Position quote"
    );

    match client.estimated_costs(leverage, size).await? {
        CostEstimate::Band { low, high } => info!(low, high, "Estimated trade cost (ETH)"),
        CostEstimate::InsufficientDepth => warn!("Not enough order book depth for this size"),
    }
    Ok(())
}

/// Parse an environment variable if it is set.
fn optional_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(None),
    }
}
