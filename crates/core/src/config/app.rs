//! Runtime configuration with profile support.
//!
//! Profiles (default, testing, production) are selected with
//! `LIQUID_LONG_PROFILE`; `LIQUID_LONG_CONFIG` points at a TOML file that
//! takes precedence over any profile.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::ContractConfig;

/// Environment variable selecting a built-in profile.
pub const PROFILE_ENV: &str = "LIQUID_LONG_PROFILE";

/// Environment variable naming a TOML config file.
pub const CONFIG_FILE_ENV: &str = "LIQUID_LONG_CONFIG";

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidLongConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Contract location
    #[serde(default)]
    pub contract: ContractConfig,

    /// Refresh cadence of the cached on-chain values
    #[serde(default)]
    pub polling: PollingConfig,

    /// Position listing
    #[serde(default)]
    pub positions: PositionsConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Refresh intervals of the cached on-chain values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// ETH/USD price refresh interval
    #[serde(default = "default_poll_interval")]
    pub eth_price_interval_ms: u64,

    /// Provider fee rate refresh interval
    #[serde(default = "default_poll_interval")]
    pub provider_fee_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    10_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            eth_price_interval_ms: default_poll_interval(),
            provider_fee_interval_ms: default_poll_interval(),
        }
    }
}

impl PollingConfig {
    pub fn eth_price_interval(&self) -> Duration {
        Duration::from_millis(self.eth_price_interval_ms)
    }
    pub fn provider_fee_interval(&self) -> Duration {
        Duration::from_millis(self.provider_fee_interval_ms)
    }
}

/// Position listing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsConfig {
    /// Positions requested per `getCdps` call
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page_size() -> u64 {
    1000
}

impl Default for PositionsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for LiquidLongConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            contract: ContractConfig::default(),
            polling: PollingConfig::default(),
            positions: PositionsConfig::default(),
        }
    }
}

impl LiquidLongConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse configuration from TOML text and expand environment variables.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.contract.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Create a testing profile with fast polling and small pages.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            contract: ContractConfig::default(),
            polling: PollingConfig {
                eth_price_interval_ms: 2_000,
                provider_fee_interval_ms: 2_000,
            },
            positions: PositionsConfig { page_size: 100 },
        }
    }

    /// Create a production profile; the fee rate changes rarely.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            contract: ContractConfig::default(),
            polling: PollingConfig {
                eth_price_interval_ms: 10_000,
                provider_fee_interval_ms: 60_000,
            },
            positions: PositionsConfig::default(),
        }
    }

    /// Load from `LIQUID_LONG_CONFIG` if set, else the profile named by
    /// `LIQUID_LONG_PROFILE` (testing, production), else the default.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            return Self::from_file(path);
        }
        let profile = std::env::var(PROFILE_ENV).unwrap_or_else(|_| "default".to_string());
        Ok(Self::from_profile(&profile))
    }

    /// Built-in profile by name; unknown names fall back to the default.
    pub fn from_profile(profile: &str) -> Self {
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.polling.eth_price_interval_ms == 0 || self.polling.provider_fee_interval_ms == 0 {
            anyhow::bail!("polling intervals must be positive");
        }
        if self.positions.page_size == 0 {
            anyhow::bail!("positions.page_size must be positive");
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "LiquidLong configuration loaded");
        tracing::info!(
            address = %self.contract.address,
            chain_id = ?self.contract.chain_id,
            "Contract"
        );
        tracing::info!(
            eth_price_ms = self.polling.eth_price_interval_ms,
            provider_fee_ms = self.polling.provider_fee_interval_ms,
            "Polling intervals"
        );
        tracing::info!(page_size = self.positions.page_size, "Position listing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LiquidLongConfig::default();
        assert_eq!(config.profile, "default");
        assert_eq!(config.polling.eth_price_interval(), Duration::from_secs(10));
        assert_eq!(config.polling.provider_fee_interval(), Duration::from_secs(10));
        assert_eq!(config.positions.page_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profiles() {
        assert_eq!(LiquidLongConfig::from_profile("TEST").positions.page_size, 100);
        assert_eq!(
            LiquidLongConfig::from_profile("prod").polling.provider_fee_interval_ms,
            60_000
        );
        assert_eq!(LiquidLongConfig::from_profile("unknown").profile, "default");
    }

    #[test]
    fn test_from_toml_fills_missing_sections() {
        std::env::set_var("LL_APP_TEST_ADDRESS", "0x0000000000000000000000000000000000000002");
        let config = LiquidLongConfig::from_toml(
            r#"
            profile = "custom"

            [contract]
            address = "${LL_APP_TEST_ADDRESS}"
            rpc_url = "http://localhost:8545"
            chain_id = 1

            [polling]
            eth_price_interval_ms = 500
            "#,
        )
        .unwrap();
        std::env::remove_var("LL_APP_TEST_ADDRESS");

        assert_eq!(config.profile, "custom");
        assert_eq!(config.contract.address, "0x0000000000000000000000000000000000000002");
        assert_eq!(config.contract.chain_id, Some(1));
        assert_eq!(config.polling.eth_price_interval_ms, 500);
        assert_eq!(config.polling.provider_fee_interval_ms, 10_000);
        assert_eq!(config.positions.page_size, 1000);
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let result = LiquidLongConfig::from_toml("[positions]\npage_size = 0\n");
        assert!(result.is_err());
    }
}
