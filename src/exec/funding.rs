//! Funding dispatcher - disburses launch capital to bundle wallets
//!
//! Transfers a fixed per-wallet amount from the funding wallet to every
//! bundle address with bounded concurrency. Already-funded wallets are
//! skipped so a rerun after partial failure only touches what failed.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, FundingConfig};
use crate::error::Result;
use crate::wallet::WalletRegistry;

use super::fanout::{run_fanout, Outcome};
use super::submit::SubmitPipeline;

/// Per-wallet funding status
#[derive(Debug, Clone)]
pub enum FundingStatus {
    /// Transfer confirmed
    Sent { signature: String },
    /// Already funded at or above the requested amount
    Skipped,
    Failed(String),
    Timeout,
    Cancelled,
}

impl FundingStatus {
    pub fn is_funded(&self) -> bool {
        matches!(self, FundingStatus::Sent { .. } | FundingStatus::Skipped)
    }
}

/// Per-wallet funding result
#[derive(Debug, Clone)]
pub struct FundingResult {
    pub address: Pubkey,
    pub amount_sent: u64,
    pub status: FundingStatus,
}

/// Aggregate result of a funding stage
#[derive(Debug, Clone)]
pub struct FundingReport {
    pub results: Vec<FundingResult>,
    /// Fraction of wallets funded (skipped wallets count as funded)
    pub success_fraction: f64,
    /// Whether the configured threshold was met
    pub threshold_met: bool,
    /// Whether the stage was cut short by cancellation
    pub cancelled: bool,
}

impl FundingReport {
    /// Addresses that are still unfunded
    pub fn unfunded(&self) -> Vec<Pubkey> {
        self.results
            .iter()
            .filter(|r| !r.status.is_funded())
            .map(|r| r.address)
            .collect()
    }

    pub fn funded_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_funded()).count()
    }
}

/// Dispatches funding transfers from the funding wallet
pub struct FundingDispatcher {
    pipeline: SubmitPipeline,
    registry: Arc<WalletRegistry>,
    config: FundingConfig,
    engine: EngineConfig,
}

impl FundingDispatcher {
    pub fn new(
        pipeline: SubmitPipeline,
        registry: Arc<WalletRegistry>,
        config: FundingConfig,
        engine: EngineConfig,
    ) -> Self {
        Self {
            pipeline,
            registry,
            config,
            engine,
        }
    }

    /// Fund every address with `amount_per_wallet` lamports
    ///
    /// Wallets already showing `funded_amount >= amount_per_wallet` are
    /// skipped. All transfers are joined before the report is built; the
    /// caller decides what a missed threshold means for the launch.
    pub async fn fund(
        &self,
        funding_wallet: &Pubkey,
        addresses: &[Pubkey],
        amount_per_wallet: u64,
        cancel: CancellationToken,
    ) -> Result<FundingReport> {
        let mut to_fund = Vec::new();
        let mut skipped = Vec::new();

        for address in addresses {
            match self.registry.get(address).await {
                Some(w) if w.funded_amount >= amount_per_wallet => {
                    debug!("Skipping already-funded wallet {}", address);
                    skipped.push(*address);
                }
                _ => to_fund.push(*address),
            }
        }

        info!(
            "Funding {} wallets with {} lamports each ({} already funded)",
            to_fund.len(),
            amount_per_wallet,
            skipped.len()
        );

        let pipeline = self.pipeline.clone();
        let funding_wallet = *funding_wallet;
        let max_retries = self.config.max_retries;
        let base_delay = self.config.retry_base_delay_ms;

        let report = run_fanout(
            to_fund,
            self.engine.parallelism,
            Duration::from_millis(self.engine.stage_timeout_ms),
            cancel,
            move |address| {
                let pipeline = pipeline.clone();
                async move {
                    pipeline
                        .transfer_with_retry(
                            &funding_wallet,
                            &address,
                            amount_per_wallet,
                            max_retries,
                            base_delay,
                        )
                        .await
                }
            },
        )
        .await;

        let cancelled = report.was_cancelled();
        let mut results: Vec<FundingResult> = skipped
            .into_iter()
            .map(|address| FundingResult {
                address,
                amount_sent: 0,
                status: FundingStatus::Skipped,
            })
            .collect();

        for wallet_result in report.results {
            let (amount_sent, status) = match wallet_result.outcome {
                Outcome::Success(signature) => {
                    self.registry
                        .record_funding(&wallet_result.wallet, amount_per_wallet)
                        .await?;
                    (amount_per_wallet, FundingStatus::Sent { signature })
                }
                Outcome::Failed(e) => {
                    warn!("Funding failed for {}: {}", wallet_result.wallet, e);
                    (0, FundingStatus::Failed(e.to_string()))
                }
                Outcome::Timeout => (0, FundingStatus::Timeout),
                Outcome::Cancelled => (0, FundingStatus::Cancelled),
            };
            results.push(FundingResult {
                address: wallet_result.wallet,
                amount_sent,
                status,
            });
        }

        let funded = results.iter().filter(|r| r.status.is_funded()).count();
        let success_fraction = if results.is_empty() {
            1.0
        } else {
            funded as f64 / results.len() as f64
        };
        let threshold_met = success_fraction >= self.config.success_threshold;

        info!(
            "Funding stage complete: {}/{} funded (threshold {})",
            funded,
            results.len(),
            if threshold_met { "met" } else { "missed" }
        );

        Ok(FundingReport {
            results,
            success_fraction,
            threshold_met,
            cancelled,
        })
    }
}
