//! Mock collaborators shared across the crate's tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::config::Network;
use crate::error::{Error, Result};
use crate::launch::types::TokenMetadata;

use super::{
    BroadcastService, PriceOracle, Quote, SignedPayload, SigningService, SwapReceipt, SwapVenue,
    TokenCreationService, WalletOp, WalletStore,
};

/// Signer that fails for a configured set of wallets
#[derive(Default)]
pub struct MockSigner {
    pub fail_for: HashSet<Pubkey>,
}

impl MockSigner {
    pub fn failing_for(wallets: &[Pubkey]) -> Self {
        Self {
            fail_for: wallets.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl SigningService for MockSigner {
    async fn sign(&self, wallet: &Pubkey, op: &WalletOp) -> Result<SignedPayload> {
        if self.fail_for.contains(wallet) {
            return Err(Error::Signing {
                wallet: wallet.to_string(),
                reason: "invalid credential".to_string(),
            });
        }
        Ok(SignedPayload {
            signer: *wallet,
            bytes: serde_json::to_vec(op)?,
        })
    }
}

/// Broadcast stub with programmable transient and permanent failures
///
/// Failures can be keyed on the signer (aging self-transfers) or on the
/// transfer recipient (funding disbursements, where every payload is
/// signed by the same funding wallet).
#[derive(Default)]
pub struct MockBroadcast {
    /// Fail this many submissions per signer before succeeding
    pub transient_failures: Mutex<HashMap<Pubkey, u32>>,
    /// Signers whose submissions always fail
    pub always_fail: HashSet<Pubkey>,
    /// Transfer recipients whose submissions always fail
    pub fail_recipients: HashSet<Pubkey>,
    /// Sleep this long at the start of every submission
    pub delay: Duration,
    /// Successful submissions, in completion order
    pub submitted: Mutex<Vec<(Pubkey, WalletOp)>>,
}

impl MockBroadcast {
    pub async fn set_transient_failures(&self, wallet: Pubkey, count: u32) {
        self.transient_failures.lock().await.insert(wallet, count);
    }

    /// Successful submissions signed by `wallet`
    pub async fn submission_count(&self, wallet: &Pubkey) -> usize {
        self.submitted
            .lock()
            .await
            .iter()
            .filter(|(signer, _)| signer == wallet)
            .count()
    }

    /// Successful transfers received by `wallet`
    pub async fn received_count(&self, wallet: &Pubkey) -> usize {
        self.submitted
            .lock()
            .await
            .iter()
            .filter(|(_, op)| matches!(op, WalletOp::Transfer { to, .. } if to == wallet))
            .count()
    }
}

#[async_trait]
impl BroadcastService for MockBroadcast {
    async fn submit(&self, payload: &SignedPayload, _network: Network) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let op: WalletOp = serde_json::from_slice(&payload.bytes)?;
        let WalletOp::Transfer { to, .. } = op;

        if self.always_fail.contains(&payload.signer) || self.fail_recipients.contains(&to) {
            return Err(Error::Network("broadcast rejected".to_string()));
        }

        {
            let mut failures = self.transient_failures.lock().await;
            if let Some(remaining) = failures.get_mut(&payload.signer) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Network("transient broadcast failure".to_string()));
                }
            }
        }

        self.submitted.lock().await.push((payload.signer, op));
        Ok(format!("sig-{}", uuid::Uuid::new_v4()))
    }
}

/// Token creator stub
#[derive(Default)]
pub struct MockTokenCreator {
    pub fail: bool,
}

#[async_trait]
impl TokenCreationService for MockTokenCreator {
    async fn create_token(&self, _dev: &Pubkey, metadata: &TokenMetadata) -> Result<Pubkey> {
        if self.fail {
            return Err(Error::TokenCreation("creation rejected".to_string()));
        }
        if metadata.name.is_empty() || metadata.symbol.is_empty() {
            return Err(Error::Validation("name and symbol required".to_string()));
        }
        Ok(Pubkey::new_unique())
    }
}

/// Recorded venue call, tagged with the attempt number for that wallet
#[derive(Debug, Clone)]
pub struct VenueCall {
    pub wallet: Pubkey,
    pub attempt: usize,
    /// Global dispatch sequence number
    pub seq: usize,
    pub tip_lamports: u64,
    pub in_amount: u64,
}

/// Swap venue stub with programmable per-wallet behavior
#[derive(Default)]
pub struct MockVenue {
    /// Wallets whose first attempt fails with a transient error
    pub fail_first_attempt: HashSet<Pubkey>,
    /// Wallets whose every attempt fails with a transient error
    pub always_fail: HashSet<Pubkey>,
    /// Wallets whose execution never completes (for timeout tests)
    pub hang: HashSet<Pubkey>,
    /// Tokens received per lamport spent
    pub tokens_per_lamport: u64,
    pub calls: Mutex<Vec<VenueCall>>,
    seq: AtomicUsize,
    attempts: Mutex<HashMap<Pubkey, usize>>,
}

impl MockVenue {
    pub fn new() -> Self {
        Self {
            tokens_per_lamport: 1,
            ..Default::default()
        }
    }

    pub async fn calls(&self) -> Vec<VenueCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl SwapVenue for MockVenue {
    async fn quote(&self, input: &Pubkey, output: &Pubkey, amount: u64) -> Result<Quote> {
        Ok(Quote {
            input: *input,
            output: *output,
            in_amount: amount,
            estimated_out: amount.saturating_mul(self.tokens_per_lamport.max(1)),
        })
    }

    async fn execute(
        &self,
        wallet: &Pubkey,
        quote: &Quote,
        tip_lamports: u64,
    ) -> Result<SwapReceipt> {
        let attempt = {
            let mut attempts = self.attempts.lock().await;
            let entry = attempts.entry(*wallet).or_insert(0);
            *entry += 1;
            *entry
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);

        self.calls.lock().await.push(VenueCall {
            wallet: *wallet,
            attempt,
            seq,
            tip_lamports,
            in_amount: quote.in_amount,
        });

        if self.hang.contains(wallet) {
            // Far beyond any test deadline
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        if self.always_fail.contains(wallet)
            || (attempt == 1 && self.fail_first_attempt.contains(wallet))
        {
            return Err(Error::Network("venue unreachable".to_string()));
        }

        Ok(SwapReceipt {
            signature: format!("swap-{}", uuid::Uuid::new_v4()),
            amount_out: quote.estimated_out,
        })
    }
}

/// Price oracle that replays a scripted sequence, then repeats the last value
#[derive(Default)]
pub struct ScriptedOracle {
    prices: Mutex<VecDeque<Result<f64>>>,
    last: Mutex<Option<f64>>,
    pub fetch_count: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedOracle {
    pub fn new(sequence: &[f64]) -> Self {
        Self {
            prices: Mutex::new(sequence.iter().map(|p| Ok(*p)).collect()),
            last: Mutex::new(None),
            fetch_count: AtomicUsize::new(0),
            gate: Mutex::new(None),
        }
    }

    /// Make every fetch block on a permit from `gate` before returning
    pub async fn hold_fetches(&self, gate: Arc<Semaphore>) {
        *self.gate.lock().await = Some(gate);
    }

    pub async fn push_price(&self, price: f64) {
        self.prices.lock().await.push_back(Ok(price));
    }

    pub async fn push_error(&self, message: &str) {
        self.prices
            .lock()
            .await
            .push_back(Err(Error::PriceFetch(message.to_string())));
    }
}

#[async_trait]
impl PriceOracle for ScriptedOracle {
    async fn get_price(&self, _token: &Pubkey) -> Result<f64> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().await.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let next = self.prices.lock().await.pop_front();
        match next {
            Some(Ok(price)) => {
                *self.last.lock().await = Some(price);
                Ok(price)
            }
            Some(Err(e)) => Err(e),
            None => {
                let last = *self.last.lock().await;
                last.ok_or_else(|| Error::PriceFetch("no price available".to_string()))
            }
        }
    }
}

/// In-memory wallet store
#[derive(Default)]
pub struct MemoryWalletStore {
    pub saved: Mutex<Vec<Pubkey>>,
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn load(&self, _credential: &str) -> Result<Vec<Pubkey>> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, wallets: &[Pubkey], _credential: &str) -> Result<()> {
        *self.saved.lock().await = wallets.to_vec();
        Ok(())
    }

    async fn generate(&self) -> Result<Pubkey> {
        Ok(Pubkey::new_unique())
    }

    async fn import(&self, secret: &str) -> Result<Pubkey> {
        if secret.is_empty() {
            return Err(Error::WalletStore("empty secret".to_string()));
        }
        Ok(Pubkey::new_unique())
    }
}
