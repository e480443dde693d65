//! Auto-sell monitor - price-triggered sell with a one-shot rule
//!
//! A cancellable periodic poll over the price oracle. When the price
//! crosses the rule's trigger, the sell executor is invoked exactly once
//! and the monitor disarms itself; a rule fires at most once per
//! enablement. Triggering is best-effort at the poll interval: a fast
//! spike can cross and retrace between ticks.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AutoSellConfig;
use crate::error::{Error, Result};
use crate::exec::SellExecutor;
use crate::services::{PriceOracle, Venue};

/// One-shot sell rule
#[derive(Debug, Clone)]
pub struct AutoSellRule {
    pub trigger_price: f64,
    pub sell_percentage: f64,
    pub enabled: bool,
}

/// Monitor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Armed,
    Triggered,
    Disarmed,
}

/// Watches the market price and fires the sell executor on a crossing
///
/// Checks never overlap: each runs inline on the single poll task, and
/// ticks that pile up behind a slow check are skipped rather than
/// replayed.
pub struct AutoSellMonitor {
    oracle: Arc<dyn PriceOracle>,
    seller: Arc<SellExecutor>,
    config: AutoSellConfig,
    state: Arc<RwLock<MonitorState>>,
    shutdown: broadcast::Sender<()>,
}

impl AutoSellMonitor {
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        seller: Arc<SellExecutor>,
        config: AutoSellConfig,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            oracle,
            seller,
            config,
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            shutdown,
        }
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    /// Arm the monitor and start polling
    ///
    /// Valid from Idle or Disarmed (re-arming is a fresh enablement and
    /// may fire again). `wallets` is the set the sell will target when
    /// the rule triggers.
    pub async fn arm(
        &self,
        rule: AutoSellRule,
        token: Pubkey,
        wallets: Vec<Pubkey>,
        venue: Venue,
    ) -> Result<()> {
        if !rule.enabled {
            return Err(Error::Validation("auto-sell rule is disabled".to_string()));
        }
        if rule.trigger_price <= 0.0 {
            return Err(Error::Validation("trigger price must be positive".to_string()));
        }

        {
            let mut state = self.state.write().await;
            match *state {
                MonitorState::Idle | MonitorState::Disarmed => *state = MonitorState::Armed,
                _ => {
                    return Err(Error::Validation(
                        "auto-sell monitor is already armed".to_string(),
                    ))
                }
            }
        }

        info!(
            "Auto-sell armed: trigger {} for {}% of holdings, polling every {}ms",
            rule.trigger_price, rule.sell_percentage, self.config.poll_interval_ms
        );

        let oracle = self.oracle.clone();
        let seller = self.seller.clone();
        let state = self.state.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut rule = rule;
            let mut ticker = interval(poll_interval);
            // Ticks delayed by a slow check are skipped, not replayed
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick fires immediately; skip it so the
            // first check happens one interval after arming
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let price = match oracle.get_price(&token).await {
                            Ok(p) => p,
                            Err(e) => {
                                // Never a false trigger, never a stop:
                                // just wait for the next tick
                                warn!("Auto-sell price fetch failed: {}", e);
                                continue;
                            }
                        };

                        // cancel() may have landed while the fetch was in
                        // flight; a disarmed rule must never fire
                        if *state.read().await == MonitorState::Disarmed {
                            debug!("Auto-sell disarmed during check, not selling");
                            break;
                        }

                        if price < rule.trigger_price {
                            debug!("Price {} below trigger {}", price, rule.trigger_price);
                            continue;
                        }

                        info!(
                            "Auto-sell triggered at price {} (trigger {})",
                            price, rule.trigger_price
                        );
                        *state.write().await = MonitorState::Triggered;
                        rule.enabled = false;

                        match seller
                            .sell(
                                &wallets,
                                &token,
                                rule.sell_percentage,
                                venue,
                                CancellationToken::new(),
                            )
                            .await
                        {
                            Ok(report) => info!(
                                "Auto-sell complete: {}/{} orders confirmed",
                                report.confirmed_count(),
                                report.orders.len()
                            ),
                            // The rule stays spent either way; re-arm to try again
                            Err(e) => error!("Auto-sell dispatch failed: {}", e),
                        }

                        *state.write().await = MonitorState::Disarmed;
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Auto-sell monitor shut down");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop polling immediately without selling; callable from any state
    pub async fn cancel(&self) {
        info!("Auto-sell cancelled");
        *self.state.write().await = MonitorState::Disarmed;
        let _ = self.shutdown.send(());
    }
}
