//! Sell executor - proportional sells from a designated wallet set
//!
//! Sells a percentage of each wallet's token holdings, either across the
//! full bundle pool or from the dev wallet alone. Fan-out and threshold
//! semantics match the buy stage. Invoked manually after the buy stage
//! or automatically by the auto-sell monitor.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, SellConfig};
use crate::error::{Error, Result};
use crate::services::{SwapVenue, Venue, Venues, NATIVE_SOL};
use crate::wallet::WalletRegistry;

use super::fanout::{run_fanout, Outcome};

/// Sell order lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum SellStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed(String),
}

/// One per-wallet sell order
#[derive(Debug, Clone)]
pub struct SellOrder {
    pub id: Uuid,
    pub wallet: Pubkey,
    pub percentage: f64,
    /// Token base units sold
    pub amount: u64,
    pub signature: Option<String>,
    pub status: SellStatus,
}

/// Aggregate result of a sell dispatch
#[derive(Debug, Clone)]
pub struct SellReport {
    pub orders: Vec<SellOrder>,
    pub success_fraction: f64,
    pub threshold_met: bool,
}

impl SellReport {
    pub fn confirmed_count(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| o.status == SellStatus::Confirmed)
            .count()
    }
}

/// Executes proportional sells through a swap venue
pub struct SellExecutor {
    venues: Venues,
    registry: Arc<WalletRegistry>,
    config: SellConfig,
    engine: EngineConfig,
}

impl SellExecutor {
    pub fn new(
        venues: Venues,
        registry: Arc<WalletRegistry>,
        config: SellConfig,
        engine: EngineConfig,
    ) -> Self {
        Self {
            venues,
            registry,
            config,
            engine,
        }
    }

    /// Sell `percentage` of each wallet's `token` holdings
    pub async fn sell(
        &self,
        wallets: &[Pubkey],
        token: &Pubkey,
        percentage: f64,
        venue: Venue,
        cancel: CancellationToken,
    ) -> Result<SellReport> {
        if !(percentage > 0.0 && percentage <= 100.0) {
            return Err(Error::Validation(format!(
                "sell percentage must be in (0, 100], got {}",
                percentage
            )));
        }

        // Size each order from the registry's last known balance; wallets
        // with nothing to sell are skipped rather than failed.
        let mut orders: Vec<SellOrder> = Vec::new();
        let mut to_sell: Vec<(Pubkey, u64)> = Vec::new();
        for wallet in wallets {
            let balance = self
                .registry
                .get(wallet)
                .await
                .map(|w| w.last_known_balance)
                .unwrap_or(0);
            let amount = (balance as f64 * percentage / 100.0).floor() as u64;
            if amount == 0 {
                debug!("Skipping {} with no sellable balance", wallet);
                continue;
            }
            to_sell.push((*wallet, amount));
            orders.push(SellOrder {
                id: Uuid::new_v4(),
                wallet: *wallet,
                percentage,
                amount,
                signature: None,
                status: SellStatus::Pending,
            });
        }

        info!(
            "Selling {}% of {} from {} wallets via {}",
            percentage,
            token,
            to_sell.len(),
            venue
        );

        let venue_impl: Arc<dyn SwapVenue> = self.venues.get(venue).clone();
        let token = *token;
        let amounts: std::collections::HashMap<Pubkey, u64> = to_sell.iter().copied().collect();

        let report = run_fanout(
            to_sell.iter().map(|(w, _)| *w).collect(),
            self.engine.parallelism,
            Duration::from_millis(self.engine.stage_timeout_ms),
            cancel,
            move |wallet| {
                let venue_impl = venue_impl.clone();
                let amount = amounts.get(&wallet).copied().unwrap_or(0);
                async move {
                    let quote = venue_impl.quote(&token, &NATIVE_SOL, amount).await?;
                    let receipt = venue_impl.execute(&wallet, &quote, 0).await?;
                    Ok(receipt.signature)
                }
            },
        )
        .await;

        for (order, wallet_result) in orders.iter_mut().zip(report.results) {
            match wallet_result.outcome {
                Outcome::Success(signature) => {
                    order.signature = Some(signature);
                    order.status = SellStatus::Confirmed;

                    // Reduce the wallet's tracked balance by what was sold
                    if let Some(w) = self.registry.get(&order.wallet).await {
                        let remaining = w.last_known_balance.saturating_sub(order.amount);
                        self.registry.record_balance(&order.wallet, remaining).await?;
                    }
                }
                Outcome::Failed(e) => {
                    warn!("Sell failed for {}: {}", order.wallet, e);
                    order.status = SellStatus::Failed(e.to_string());
                }
                Outcome::Timeout => order.status = SellStatus::Failed("timeout".to_string()),
                Outcome::Cancelled => order.status = SellStatus::Failed("cancelled".to_string()),
            }
        }

        let confirmed = orders
            .iter()
            .filter(|o| o.status == SellStatus::Confirmed)
            .count();
        let success_fraction = if orders.is_empty() {
            1.0
        } else {
            confirmed as f64 / orders.len() as f64
        };
        let threshold_met = success_fraction >= self.config.success_threshold;

        info!(
            "Sell complete: {}/{} confirmed (threshold {})",
            confirmed,
            orders.len(),
            if threshold_met { "met" } else { "missed" }
        );

        Ok(SellReport {
            orders,
            success_fraction,
            threshold_met,
        })
    }
}
