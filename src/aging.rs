//! Aging coordinator - builds organic-looking history on bundle wallets
//!
//! Before a wallet joins a coordinated buy it issues a handful of small,
//! spaced-out self-transfers so its first visible activity is not the
//! buy itself. Amounts and spacing are jittered. Aging state only moves
//! forward; a wallet that fails mid-sequence keeps its partial count and
//! resumes from there on the next call.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AgingConfig, EngineConfig};
use crate::exec::fanout::{run_fanout, Outcome};
use crate::exec::submit::SubmitPipeline;
use crate::error::Error;
use crate::wallet::{AgingState, WalletRegistry};

/// Terminal state of one wallet's aging pass
#[derive(Debug, Clone)]
pub enum AgingOutcome {
    /// Wallet completed the full transfer sequence
    Aged { transfers: u32 },
    /// Wallet was already aged; nothing was done
    AlreadyAged,
    /// Sequence stopped early; wallet remains Aging with `completed`
    /// transfers recorded and can be resumed by a later call
    Failed {
        completed: u32,
        /// True for signing failures, which no retry can fix
        fatal: bool,
        reason: String,
    },
}

impl AgingOutcome {
    pub fn is_aged(&self) -> bool {
        matches!(self, AgingOutcome::Aged { .. } | AgingOutcome::AlreadyAged)
    }
}

/// Per-wallet result of an `age_all` batch
#[derive(Debug, Clone)]
pub struct AgingResult {
    pub wallet: Pubkey,
    pub outcome: AgingOutcome,
}

/// Drives bundle wallets through their aging sequence
pub struct AgingCoordinator {
    pipeline: SubmitPipeline,
    registry: Arc<WalletRegistry>,
    config: AgingConfig,
    engine: EngineConfig,
}

impl AgingCoordinator {
    pub fn new(
        pipeline: SubmitPipeline,
        registry: Arc<WalletRegistry>,
        config: AgingConfig,
        engine: EngineConfig,
    ) -> Self {
        Self {
            pipeline,
            registry,
            config,
            engine,
        }
    }

    /// Age a single wallet; a no-op if it is already Aged
    pub async fn age_wallet(&self, wallet: &Pubkey) -> AgingOutcome {
        let snapshot = match self.registry.get(wallet).await {
            Some(w) => w,
            None => {
                return AgingOutcome::Failed {
                    completed: 0,
                    fatal: true,
                    reason: format!("wallet not registered: {}", wallet),
                }
            }
        };

        if snapshot.aging_state == AgingState::Aged {
            debug!("Wallet {} already aged", wallet);
            return AgingOutcome::AlreadyAged;
        }

        let mut completed = snapshot.aging_tx_count;
        if let Err(e) = self
            .registry
            .advance_aging(wallet, AgingState::Aging, completed)
            .await
        {
            return AgingOutcome::Failed {
                completed,
                fatal: true,
                reason: e.to_string(),
            };
        }

        info!(
            "Aging wallet {} ({} of {} transfers done)",
            wallet, completed, self.config.tx_count
        );

        while completed < self.config.tx_count {
            // Jitter both spacing and amount so the sequence does not
            // look machine-generated
            let (delay_ms, amount) = {
                let mut rng = rand::thread_rng();
                (
                    rng.gen_range(self.config.spacing_ms / 2..=self.config.spacing_ms * 3 / 2),
                    rng.gen_range(self.config.amount_lamports..=self.config.amount_lamports * 2),
                )
            };
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            match self
                .pipeline
                .transfer_with_retry(
                    wallet,
                    wallet,
                    amount,
                    self.config.max_retries,
                    self.config.retry_base_delay_ms,
                )
                .await
            {
                Ok(_) => {
                    completed += 1;
                    if let Err(e) = self
                        .registry
                        .advance_aging(wallet, AgingState::Aging, completed)
                        .await
                    {
                        return AgingOutcome::Failed {
                            completed,
                            fatal: true,
                            reason: e.to_string(),
                        };
                    }
                }
                Err(Error::Signing { reason, .. }) => {
                    warn!("Fatal signing error aging {}: {}", wallet, reason);
                    return AgingOutcome::Failed {
                        completed,
                        fatal: true,
                        reason,
                    };
                }
                Err(e) => {
                    warn!(
                        "Aging stalled for {} after {} transfers: {}",
                        wallet, completed, e
                    );
                    return AgingOutcome::Failed {
                        completed,
                        fatal: false,
                        reason: e.to_string(),
                    };
                }
            }
        }

        if let Err(e) = self
            .registry
            .advance_aging(wallet, AgingState::Aged, completed)
            .await
        {
            return AgingOutcome::Failed {
                completed,
                fatal: true,
                reason: e.to_string(),
            };
        }

        info!("Wallet {} aged after {} transfers", wallet, completed);
        AgingOutcome::Aged {
            transfers: completed,
        }
    }

    /// Age every not-yet-aged wallet in the set with bounded concurrency
    ///
    /// One wallet failing never aborts its siblings; each wallet gets its
    /// own outcome in the returned list (input order preserved for the
    /// wallets that were processed).
    pub async fn age_all(
        &self,
        wallets: &[Pubkey],
        cancel: CancellationToken,
    ) -> Vec<AgingResult> {
        let coordinator = self.clone_for_task();

        let report = run_fanout(
            wallets.to_vec(),
            self.engine.parallelism,
            Duration::from_millis(self.engine.stage_timeout_ms),
            cancel,
            move |wallet| {
                let coordinator = coordinator.clone();
                async move { Ok(coordinator.age_wallet(&wallet).await) }
            },
        )
        .await;

        report
            .results
            .into_iter()
            .map(|r| AgingResult {
                wallet: r.wallet,
                outcome: match r.outcome {
                    Outcome::Success(outcome) => outcome,
                    Outcome::Failed(e) => AgingOutcome::Failed {
                        completed: 0,
                        fatal: false,
                        reason: e.to_string(),
                    },
                    Outcome::Timeout => AgingOutcome::Failed {
                        completed: 0,
                        fatal: false,
                        reason: "timed out at the aging barrier".to_string(),
                    },
                    Outcome::Cancelled => AgingOutcome::Failed {
                        completed: 0,
                        fatal: false,
                        reason: "cancelled".to_string(),
                    },
                },
            })
            .collect()
    }

    fn clone_for_task(&self) -> Arc<Self> {
        Arc::new(Self {
            pipeline: self.pipeline.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            engine: self.engine.clone(),
        })
    }
}
