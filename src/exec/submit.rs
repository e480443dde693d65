//! Sign-and-broadcast pipeline for plain transfers
//!
//! Aging and funding both move lamports through the external signing and
//! broadcast collaborators. Transient network failures are retried with
//! exponential backoff; signing failures are permanent for that wallet's
//! operation and surface immediately.

use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::config::Network;
use crate::error::{Error, Result};
use crate::services::{BroadcastService, SigningService, WalletOp};

/// Shared transfer pipeline over the signing/broadcast collaborators
#[derive(Clone)]
pub struct SubmitPipeline {
    signer: Arc<dyn SigningService>,
    broadcaster: Arc<dyn BroadcastService>,
    network: Network,
}

impl SubmitPipeline {
    pub fn new(
        signer: Arc<dyn SigningService>,
        broadcaster: Arc<dyn BroadcastService>,
        network: Network,
    ) -> Self {
        Self {
            signer,
            broadcaster,
            network,
        }
    }

    /// Sign and submit a lamport transfer, retrying transient broadcast
    /// failures with exponential backoff
    ///
    /// Returns the confirmation signature. Signing errors are never
    /// retried.
    pub async fn transfer_with_retry(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        lamports: u64,
        max_retries: u32,
        base_delay_ms: u64,
    ) -> Result<String> {
        let op = WalletOp::Transfer { to: *to, lamports };
        let payload = self.signer.sign(from, &op).await?;

        // Retry budget: base delay doubled per attempt, capped overall
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(base_delay_ms),
            max_interval: Duration::from_millis(base_delay_ms * 8),
            max_elapsed_time: Some(Duration::from_millis(
                base_delay_ms * 2u64.saturating_pow(max_retries + 1),
            )),
            ..Default::default()
        };

        let from = *from;
        let network = self.network;
        retry(backoff, || async {
            match self.broadcaster.submit(&payload, network).await {
                Ok(signature) => Ok(signature),
                Err(e) if e.is_retryable() => {
                    warn!("Retryable broadcast error for {}: {}", from, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
        .map_err(|e| match e {
            Error::Network(msg) => Error::Network(format!("retries exhausted: {}", msg)),
            other => other,
        })
    }
}
