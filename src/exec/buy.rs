//! Bundle buy executor - near-simultaneous buys from every bundle wallet
//!
//! Fans out one buy per wallet with bounded concurrency. Simultaneity is
//! best-effort: all wallets' first attempts are dispatched before any
//! retry is processed, but exact on-chain ordering cannot be guaranteed.
//! Each wallet gets exactly one retry on a transient error; wallets that
//! have not completed by the stage deadline are marked Timeout rather
//! than blocking the batch.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{BuyConfig, EngineConfig};
use crate::error::Result;
use crate::services::{SwapVenue, Venue, Venues, NATIVE_SOL};
use crate::wallet::WalletRegistry;

use super::fanout::{run_fanout, Outcome, WalletResult};

/// Per-wallet buy status
#[derive(Debug, Clone)]
pub enum BuyStatus {
    Bought { signature: String, tokens: u64 },
    Failed(String),
    Timeout,
    Cancelled,
}

impl BuyStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BuyStatus::Bought { .. })
    }
}

/// Per-wallet buy result
#[derive(Debug, Clone)]
pub struct BuyResult {
    pub wallet: Pubkey,
    pub status: BuyStatus,
}

/// Aggregate result of a buy stage
#[derive(Debug, Clone)]
pub struct BuyReport {
    pub results: Vec<BuyResult>,
    pub success_fraction: f64,
    pub threshold_met: bool,
    pub cancelled: bool,
    /// Tip actually used, after clamping to configured bounds
    pub tip_lamports: u64,
}

impl BuyReport {
    pub fn bought_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_success()).count()
    }

    pub fn failed_wallets(&self) -> Vec<Pubkey> {
        self.results
            .iter()
            .filter(|r| !r.status.is_success())
            .map(|r| r.wallet)
            .collect()
    }
}

/// Executes coordinated buys across the bundle wallet set
pub struct BundleBuyExecutor {
    venues: Venues,
    registry: Arc<WalletRegistry>,
    config: BuyConfig,
    engine: EngineConfig,
}

impl BundleBuyExecutor {
    pub fn new(
        venues: Venues,
        registry: Arc<WalletRegistry>,
        config: BuyConfig,
        engine: EngineConfig,
    ) -> Self {
        Self {
            venues,
            registry,
            config,
            engine,
        }
    }

    /// Buy `amount_per_wallet` lamports worth of `token` from every wallet
    ///
    /// `threshold` overrides the configured success threshold when the
    /// caller opts into a partial-success policy.
    pub async fn execute_bundle_buy(
        &self,
        wallets: &[Pubkey],
        token: &Pubkey,
        amount_per_wallet: u64,
        venue: Venue,
        tip_lamports: u64,
        threshold: Option<f64>,
        cancel: CancellationToken,
    ) -> Result<BuyReport> {
        let tip = tip_lamports.clamp(self.config.min_tip_lamports, self.config.max_tip_lamports);
        let threshold = threshold.unwrap_or(self.config.success_threshold);
        let timeout = Duration::from_millis(self.engine.stage_timeout_ms);

        info!(
            "Bundle buy: {} wallets, {} lamports each, venue {}, tip {}",
            wallets.len(),
            amount_per_wallet,
            venue,
            tip
        );

        // Phase 1: every wallet's first attempt, no retries. Retrying
        // inside the fan-out would let one wallet's second attempt jump
        // ahead of another wallet's first and break the simultaneity
        // property under a bounded pool.
        let first_pass = self
            .dispatch_buys(wallets.to_vec(), token, amount_per_wallet, venue, tip, &cancel, timeout)
            .await;

        // Phase 2: one retry for transient failures only.
        let retryable: Vec<Pubkey> = first_pass
            .iter()
            .filter(|r| matches!(&r.outcome, Outcome::Failed(e) if e.is_retryable()))
            .map(|r| r.wallet)
            .collect();

        let retry_pass = if retryable.is_empty() || cancel.is_cancelled() {
            Vec::new()
        } else {
            warn!("Retrying {} wallets after transient buy failures", retryable.len());
            self.dispatch_buys(retryable, token, amount_per_wallet, venue, tip, &cancel, timeout)
                .await
        };

        let mut results = Vec::with_capacity(first_pass.len());
        let mut cancelled = false;
        for wallet_result in first_pass {
            let retried = retry_pass
                .iter()
                .find(|r| r.wallet == wallet_result.wallet);
            let effective = retried.unwrap_or(&wallet_result);

            let status = match &effective.outcome {
                Outcome::Success((signature, tokens)) => {
                    self.registry
                        .credit_balance(&effective.wallet, *tokens)
                        .await?;
                    BuyStatus::Bought {
                        signature: signature.clone(),
                        tokens: *tokens,
                    }
                }
                Outcome::Failed(e) => BuyStatus::Failed(e.to_string()),
                Outcome::Timeout => BuyStatus::Timeout,
                Outcome::Cancelled => {
                    cancelled = true;
                    BuyStatus::Cancelled
                }
            };
            results.push(BuyResult {
                wallet: wallet_result.wallet,
                status,
            });
        }

        let bought = results.iter().filter(|r| r.status.is_success()).count();
        let success_fraction = if results.is_empty() {
            1.0
        } else {
            bought as f64 / results.len() as f64
        };
        let threshold_met = success_fraction >= threshold;

        info!(
            "Buy stage complete: {}/{} bought (threshold {})",
            bought,
            results.len(),
            if threshold_met { "met" } else { "missed" }
        );

        Ok(BuyReport {
            results,
            success_fraction,
            threshold_met,
            cancelled,
            tip_lamports: tip,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_buys(
        &self,
        wallets: Vec<Pubkey>,
        token: &Pubkey,
        amount: u64,
        venue: Venue,
        tip: u64,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Vec<WalletResult<(String, u64)>> {
        let venue_impl: Arc<dyn SwapVenue> = self.venues.get(venue).clone();
        let token = *token;

        run_fanout(
            wallets,
            self.engine.parallelism,
            timeout,
            cancel.clone(),
            move |wallet| {
                let venue_impl = venue_impl.clone();
                async move {
                    let quote = venue_impl.quote(&NATIVE_SOL, &token, amount).await?;
                    let receipt = venue_impl.execute(&wallet, &quote, tip).await?;
                    Ok((receipt.signature, receipt.amount_out))
                }
            },
        )
        .await
        .results
    }
}
