//! LiquidLong client facade.
//!
//! Keeps the ETH/USD price and the provider fee rate fresh in memory,
//! derives position economics from them, and turns open/close intents into
//! single contract calls.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use liquid_long_chain::{ContractBinding, ILiquidLong};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::config::LiquidLongConfig;
use crate::economics::{self, CostEstimate, PositionQuote};
use crate::error::{Error, Result};
use crate::polled_value::PolledValue;
use crate::position::Position;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::u256_math::{dai_to_attodai, eth_to_attoeth, multiplier_to_percent, wad_to_f64};

/// Default refresh interval of the cached on-chain values.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(10_000);

/// Default number of positions requested per `getCdps` call.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Binding plus address: everything needed to talk to the contract.
#[derive(Debug, Clone)]
struct Contract {
    binding: Arc<dyn ContractBinding>,
    address: Address,
}

impl Contract {
    /// Execute a read-only call and decode its return data.
    async fn call<C: SolCall>(&self, call: C) -> Result<C::Return> {
        let data = self
            .binding
            .read(self.address, Bytes::from(call.abi_encode()))
            .await?;
        C::abi_decode_returns(&data, true).map_err(|e| {
            Error::ProtocolViolation(format!("undecodable {} return data: {e}", C::SIGNATURE))
        })
    }
}

/// Builder for [`LiquidLong`].
#[derive(Debug)]
pub struct LiquidLongBuilder {
    contract: Contract,
    scheduler: Option<Arc<dyn Scheduler>>,
    eth_price_interval: Duration,
    provider_fee_interval: Duration,
    page_size: u64,
}

impl LiquidLongBuilder {
    pub fn new(binding: Arc<dyn ContractBinding>, address: Address) -> Self {
        Self {
            contract: Contract { binding, address },
            scheduler: None,
            eth_price_interval: DEFAULT_POLLING_INTERVAL,
            provider_fee_interval: DEFAULT_POLLING_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Scheduler shared by both cached values. Defaults to a
    /// [`TokioScheduler`] owned by the facade.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn eth_price_polling_interval(mut self, interval: Duration) -> Self {
        self.eth_price_interval = interval;
        self
    }

    pub fn provider_fee_polling_interval(mut self, interval: Duration) -> Self {
        self.provider_fee_interval = interval;
        self
    }

    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Apply polling and paging settings from a loaded configuration.
    pub fn config(self, config: &LiquidLongConfig) -> Self {
        self.eth_price_polling_interval(config.polling.eth_price_interval())
            .provider_fee_polling_interval(config.polling.provider_fee_interval())
            .page_size(config.positions.page_size)
    }

    /// Create the facade and start polling.
    ///
    /// Fails with [`Error::InvalidInput`] outside a tokio runtime.
    pub fn build(self) -> Result<LiquidLong> {
        // Polling spawns its fetches even with an injected scheduler.
        let handle = Handle::try_current().map_err(|e| {
            Error::InvalidInput(format!("LiquidLong must be built inside a tokio runtime: {e}"))
        })?;
        if self.page_size == 0 {
            return Err(Error::InvalidInput("page size must be positive".to_string()));
        }
        if self.eth_price_interval.is_zero() || self.provider_fee_interval.is_zero() {
            return Err(Error::InvalidInput(
                "polling intervals must be positive".to_string(),
            ));
        }

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| {
                Arc::new(TokioScheduler::with_handle(handle)) as Arc<dyn Scheduler>
            });

        let eth_price = {
            let contract = self.contract.clone();
            PolledValue::new(
                "eth_price",
                Arc::clone(&scheduler),
                self.eth_price_interval,
                move || {
                    let contract = contract.clone();
                    async move {
                        let price = contract.call(ILiquidLong::ethPriceInUsdCall {}).await?;
                        Ok::<_, anyhow::Error>(wad_to_f64(price.attousd))
                    }
                },
            )
        };

        let provider_fee = {
            let contract = self.contract.clone();
            PolledValue::new(
                "provider_fee",
                Arc::clone(&scheduler),
                self.provider_fee_interval,
                move || {
                    let contract = contract.clone();
                    async move {
                        let fee = contract.call(ILiquidLong::providerFeePerEthCall {}).await?;
                        Ok::<_, anyhow::Error>(wad_to_f64(fee.attoethPerEth))
                    }
                },
            )
        };

        info!(
            address = %self.contract.address,
            eth_price_ms = self.eth_price_interval.as_millis() as u64,
            provider_fee_ms = self.provider_fee_interval.as_millis() as u64,
            page_size = self.page_size,
            "LiquidLong client started"
        );

        Ok(LiquidLong {
            contract: self.contract,
            scheduler,
            eth_price,
            provider_fee,
            page_size: self.page_size,
        })
    }
}

/// Client for one deployed LiquidLong contract.
pub struct LiquidLong {
    contract: Contract,
    scheduler: Arc<dyn Scheduler>,
    /// ETH/USD
    eth_price: PolledValue<f64>,
    /// ETH charged per ETH borrowed
    provider_fee: PolledValue<f64>,
    page_size: u64,
}

impl LiquidLong {
    pub fn builder(binding: Arc<dyn ContractBinding>, address: Address) -> LiquidLongBuilder {
        LiquidLongBuilder::new(binding, address)
    }

    pub fn address(&self) -> Address {
        self.contract.address
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Resolves once both cached values have been fetched.
    pub async fn ready(&self) -> Result<()> {
        futures::try_join!(self.eth_price.latest(), self.provider_fee.latest())?;
        Ok(())
    }

    /// Last known ETH/USD price.
    pub fn eth_price(&self) -> Result<f64> {
        self.eth_price
            .last_known_good()
            .ok_or(Error::NotReady("ETH price"))
    }

    /// Last known provider fee per ETH borrowed.
    pub fn fee_rate(&self) -> Result<f64> {
        self.provider_fee
            .last_known_good()
            .ok_or(Error::NotReady("provider fee rate"))
    }

    /// Fresh ETH/USD price, fetched now.
    pub async fn latest_eth_price(&self) -> Result<f64> {
        Ok(self.eth_price.latest().await?)
    }

    /// Fresh provider fee rate, fetched now.
    pub async fn latest_fee_rate(&self) -> Result<f64> {
        Ok(self.provider_fee.latest().await?)
    }

    /// Call `listener` with `(new, previous)` whenever the price is refreshed.
    pub fn on_eth_price_change<F>(&self, listener: F)
    where
        F: Fn(f64, Option<f64>) + Send + Sync + 'static,
    {
        self.eth_price
            .register_listener(move |new, previous| listener(*new, previous.copied()));
    }

    /// Call `listener` with `(new, previous)` whenever the fee rate is
    /// refreshed.
    pub fn on_fee_rate_change<F>(&self, listener: F)
    where
        F: Fn(f64, Option<f64>) + Send + Sync + 'static,
    {
        self.provider_fee
            .register_listener(move |new, previous| listener(*new, previous.copied()));
    }

    pub fn liquidation_price(&self, multiplier: f64) -> Result<f64> {
        economics::liquidation_price(self.eth_price()?, multiplier)
    }

    pub fn future_price_for_percent_change(&self, percent: f64, multiplier: f64) -> Result<f64> {
        economics::future_price_for_percent_change(self.eth_price()?, percent, multiplier)
    }

    pub fn percent_change_for_future_price(&self, future_price: f64, multiplier: f64) -> Result<f64> {
        economics::percent_change_for_future_price(self.eth_price()?, future_price, multiplier)
    }

    pub fn position_value_at_future_price(
        &self,
        future_price: f64,
        multiplier: f64,
        size: f64,
    ) -> Result<f64> {
        economics::position_value_at_future_price(self.eth_price()?, future_price, multiplier, size)
    }

    pub fn change_in_position_value(
        &self,
        future_price: f64,
        multiplier: f64,
        size: f64,
    ) -> Result<f64> {
        economics::change_in_position_value(self.eth_price()?, future_price, multiplier, size)
    }

    pub fn loan_size(&self, multiplier: f64, size: f64) -> Result<f64> {
        economics::loan_size(multiplier, size)
    }

    pub fn fee_in_eth(&self, multiplier: f64, size: f64) -> Result<f64> {
        economics::fee_in_eth(self.fee_rate()?, multiplier, size)
    }

    pub fn liquidation_penalty_percent(&self, multiplier: f64) -> Result<f64> {
        economics::liquidation_penalty_percent(multiplier)
    }

    /// All cached-input economics of a prospective position at once.
    pub fn quote(&self, multiplier: f64, size: f64) -> Result<PositionQuote> {
        PositionQuote::compute(self.eth_price()?, self.fee_rate()?, multiplier, size)
    }

    /// Estimate what acquiring the leveraged ETH will cost.
    ///
    /// Simulates selling the borrowed DAI for WETH against the order book.
    /// Before the first price arrives this waits for it.
    #[instrument(skip(self))]
    pub async fn estimated_costs(&self, multiplier: f64, size: f64) -> Result<CostEstimate> {
        let price = self.eth_price.cached().await?;
        let loan = economics::loan_size(multiplier, size)?;
        if loan == 0.0 {
            return Ok(economics::cost_band(0.0, 0.0));
        }

        let attodai_to_sell = dai_to_attodai(loan * price)?;
        let proceeds = self
            .contract
            .call(ILiquidLong::estimateDaiSaleProceedsCall {
                attodaiToSell: attodai_to_sell,
            })
            .await?;

        if proceeds.daiPaid < attodai_to_sell || proceeds.wethBought.is_zero() {
            warn!(
                dai_paid = %proceeds.daiPaid,
                dai_to_sell = %attodai_to_sell,
                "Order book too thin for this position"
            );
            return Ok(CostEstimate::InsufficientDepth);
        }

        let cost = loan - wad_to_f64(proceeds.wethBought);
        debug!(loan, cost, "Estimated trade cost");
        Ok(economics::cost_band(loan, cost))
    }

    /// Every position held by `holder`, in contract order.
    #[instrument(skip(self))]
    pub async fn get_positions(&self, holder: Address) -> Result<Vec<Position>> {
        let mut positions = Vec::new();
        let mut offset = 0u64;

        loop {
            let page = self
                .contract
                .call(ILiquidLong::getCdpsCall {
                    owner: holder,
                    offset: U256::from(offset),
                    pageSize: U256::from(self.page_size),
                })
                .await?
                .cdps;

            let returned = page.len() as u64;
            for cdp in page {
                positions.push(Position::try_from(cdp)?);
            }
            debug!(offset, returned, "Fetched position page");

            if returned < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        Ok(positions)
    }

    /// Open a leveraged position and return its CDP id.
    ///
    /// Sends `size + cost_limit + fee_limit` ETH; whatever the trade and
    /// fee do not consume is refunded by the contract.
    #[instrument(skip(self))]
    pub async fn open_position(
        &self,
        multiplier: f64,
        size: f64,
        cost_limit: f64,
        fee_limit: f64,
        affiliate: Address,
    ) -> Result<u64> {
        let leverage = multiplier_to_percent(multiplier)?;
        let size_attoeth = eth_to_attoeth(size)?;
        let cost_attoeth = eth_to_attoeth(cost_limit)?;
        let fee_attoeth = eth_to_attoeth(fee_limit)?;
        let value = size_attoeth + cost_attoeth + fee_attoeth;

        let call = ILiquidLong::openCdpCall {
            leverage,
            leverageSizeInAttoeth: size_attoeth,
            allowedFeeInAttoeth: fee_attoeth,
            affiliateAddress: affiliate,
        };
        let receipt = self
            .contract
            .binding
            .submit(self.contract.address, Bytes::from(call.abi_encode()), value)
            .await?;
        if !receipt.status {
            return Err(Error::Reverted(receipt.tx_hash));
        }

        let event = receipt
            .find_event::<ILiquidLong::NewCup>()
            .ok_or_else(|| {
                Error::ProtocolViolation(format!(
                    "transaction {} emitted no NewCup event",
                    receipt.tx_hash
                ))
            })?;
        let id = cup_id(event.cup)?;
        info!(cup = id, tx = %receipt.tx_hash, "Position opened");
        Ok(id)
    }

    /// Close a position, refusing to accept less than `minimum_value` ETH.
    /// Returns the id reported by the contract.
    #[instrument(skip(self))]
    pub async fn close_position(
        &self,
        id: u64,
        minimum_value: f64,
        affiliate: Address,
    ) -> Result<u64> {
        let call = ILiquidLong::closeCdpCall {
            cupId: U256::from(id),
            minimumValueInAttoeth: eth_to_attoeth(minimum_value)?,
            affiliateAddress: affiliate,
        };
        let receipt = self
            .contract
            .binding
            .submit(self.contract.address, Bytes::from(call.abi_encode()), U256::ZERO)
            .await?;
        if !receipt.status {
            return Err(Error::Reverted(receipt.tx_hash));
        }

        let event = receipt
            .find_event::<ILiquidLong::CloseCup>()
            .ok_or_else(|| {
                Error::ProtocolViolation(format!(
                    "transaction {} emitted no CloseCup event",
                    receipt.tx_hash
                ))
            })?;
        let closed = cup_id(event.cup)?;
        info!(cup = closed, tx = %receipt.tx_hash, "Position closed");
        Ok(closed)
    }

    /// Stop polling both cached values.
    pub async fn shutdown(&self) {
        tokio::join!(self.eth_price.shutdown(), self.provider_fee.shutdown());
        info!(address = %self.contract.address, "LiquidLong client stopped");
    }
}

impl std::fmt::Debug for LiquidLong {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidLong")
            .field("address", &self.contract.address)
            .field("eth_price", &self.eth_price.last_known_good())
            .field("fee_rate", &self.provider_fee.last_known_good())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

fn cup_id(cup: U256) -> Result<u64> {
    u64::try_from(cup)
        .map_err(|_| Error::ProtocolViolation(format!("CDP id {cup} does not fit in u64")))
}
