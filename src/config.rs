//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub aging: AgingConfig,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub buy: BuyConfig,
    #[serde(default)]
    pub sell: SellConfig,
    #[serde(default)]
    pub auto_sell: AutoSellConfig,
}

/// Target network for broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Mainnet,
    Devnet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Devnet => write!(f, "devnet"),
        }
    }
}

/// Engine-wide scheduling knobs
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum concurrent per-wallet operations within a stage
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Stage join barrier timeout
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            stage_timeout_ms: default_stage_timeout_ms(),
        }
    }
}

/// Wallet aging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgingConfig {
    /// Transfers issued per wallet before it is considered aged
    #[serde(default = "default_aging_tx_count")]
    pub tx_count: u32,
    /// Lamports moved per aging transfer (jittered up to 2x)
    #[serde(default = "default_aging_amount")]
    pub amount_lamports: u64,
    /// Base spacing between aging transfers on one wallet
    #[serde(default = "default_aging_spacing_ms")]
    pub spacing_ms: u64,
    /// Retry attempts for a transient broadcast failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial retry backoff delay
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            tx_count: default_aging_tx_count(),
            amount_lamports: default_aging_amount(),
            spacing_ms: default_aging_spacing_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Funding dispatch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FundingConfig {
    /// Fraction of wallets that must fund successfully (1.0 = all)
    #[serde(default = "default_threshold")]
    pub success_threshold: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            success_threshold: default_threshold(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Bundle buy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BuyConfig {
    /// Fraction of wallets that must buy successfully (1.0 = all)
    #[serde(default = "default_threshold")]
    pub success_threshold: f64,
    /// Priority tip bounds in lamports
    #[serde(default = "default_min_tip")]
    pub min_tip_lamports: u64,
    #[serde(default = "default_max_tip")]
    pub max_tip_lamports: u64,
}

impl Default for BuyConfig {
    fn default() -> Self {
        Self {
            success_threshold: default_threshold(),
            min_tip_lamports: default_min_tip(),
            max_tip_lamports: default_max_tip(),
        }
    }
}

/// Sell configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SellConfig {
    #[serde(default = "default_threshold")]
    pub success_threshold: f64,
}

impl Default for SellConfig {
    fn default() -> Self {
        Self {
            success_threshold: default_threshold(),
        }
    }
}

/// Auto-sell monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AutoSellConfig {
    /// Price poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AutoSellConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// Default value functions

fn default_parallelism() -> usize {
    10
}

fn default_stage_timeout_ms() -> u64 {
    60_000
}

fn default_aging_tx_count() -> u32 {
    5
}

fn default_aging_amount() -> u64 {
    10_000 // 0.00001 SOL dust transfer
}

fn default_aging_spacing_ms() -> u64 {
    2_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_threshold() -> f64 {
    1.0
}

fn default_min_tip() -> u64 {
    100_000 // 0.0001 SOL
}

fn default_max_tip() -> u64 {
    5_000_000 // 0.005 SOL
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix BUNDLER_)
            .add_source(
                config::Environment::with_prefix("BUNDLER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.parallelism == 0 {
            anyhow::bail!("engine.parallelism must be at least 1");
        }

        for (name, threshold) in [
            ("funding", self.funding.success_threshold),
            ("buy", self.buy.success_threshold),
            ("sell", self.sell.success_threshold),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("{}.success_threshold must be within [0.0, 1.0]", name);
            }
        }

        if self.buy.min_tip_lamports > self.buy.max_tip_lamports {
            anyhow::bail!("buy.min_tip_lamports exceeds buy.max_tip_lamports");
        }

        if self.aging.tx_count == 0 {
            anyhow::bail!("aging.tx_count must be at least 1");
        }

        Ok(())
    }

    /// Clamp a requested priority tip to the configured bounds
    pub fn clamp_tip(&self, tip: u64) -> u64 {
        tip.clamp(self.buy.min_tip_lamports, self.buy.max_tip_lamports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.parallelism, 10);
        assert_eq!(config.aging.tx_count, 5);
        assert_eq!(config.funding.success_threshold, 1.0);
        assert_eq!(config.auto_sell.poll_interval_ms, 30_000);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = Config::default();
        config.funding.success_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tip_clamping() {
        let config = Config::default();
        assert_eq!(config.clamp_tip(1), 100_000); // Below min
        assert_eq!(config.clamp_tip(500_000), 500_000); // In range
        assert_eq!(config.clamp_tip(10_000_000), 5_000_000); // Above max
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("does-not-exist.toml").unwrap();
        assert_eq!(config.engine.parallelism, 10);
    }
}
