//! External collaborator interfaces
//!
//! The engine never signs, broadcasts, creates tokens, quotes swaps, or
//! fetches prices itself. Each of those concerns sits behind a narrow
//! trait implemented by the host application. Swap venues are a closed
//! set: adding a venue means adding a variant, not a string tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::config::Network;
use crate::error::Result;
use crate::launch::types::TokenMetadata;

#[cfg(test)]
pub mod mock;

/// Wrapped SOL mint - the input asset for buys and output asset for sells
pub const NATIVE_SOL: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

/// An operation to be signed on behalf of a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletOp {
    /// Plain lamport transfer (aging dust, funding disbursement)
    Transfer { to: Pubkey, lamports: u64 },
}

/// A signed, broadcast-ready payload
#[derive(Debug, Clone)]
pub struct SignedPayload {
    /// Fee payer / signer identity
    pub signer: Pubkey,
    /// Opaque wire bytes
    pub bytes: Vec<u8>,
}

/// Signs operations on behalf of registered wallets
///
/// Key material never enters this crate; a signing failure is fatal for
/// that wallet's operation and is never retried.
#[async_trait]
pub trait SigningService: Send + Sync {
    async fn sign(&self, wallet: &Pubkey, op: &WalletOp) -> Result<SignedPayload>;
}

/// Submits signed payloads to the network
///
/// `Error::Network` returns are transient and retried with backoff;
/// anything else is terminal for the operation.
#[async_trait]
pub trait BroadcastService: Send + Sync {
    async fn submit(&self, payload: &SignedPayload, network: Network) -> Result<String>;
}

/// Creates the launch token from the dev wallet
#[async_trait]
pub trait TokenCreationService: Send + Sync {
    async fn create_token(&self, dev_wallet: &Pubkey, metadata: &TokenMetadata) -> Result<Pubkey>;
}

/// Named swap integrations (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Jupiter,
    Photon,
    Orca,
    Raydium,
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::Jupiter => write!(f, "jupiter"),
            Venue::Photon => write!(f, "photon"),
            Venue::Orca => write!(f, "orca"),
            Venue::Raydium => write!(f, "raydium"),
        }
    }
}

/// A swap quote from a venue
#[derive(Debug, Clone)]
pub struct Quote {
    pub input: Pubkey,
    pub output: Pubkey,
    pub in_amount: u64,
    pub estimated_out: u64,
}

/// Settled swap result
#[derive(Debug, Clone)]
pub struct SwapReceipt {
    pub signature: String,
    pub amount_out: u64,
}

/// One swap integration
///
/// The venue owns transaction construction, signing delegation, and
/// submission for swaps; the priority tip is threaded through because
/// the venue is the one building the transaction that carries it.
#[async_trait]
pub trait SwapVenue: Send + Sync {
    async fn quote(&self, input: &Pubkey, output: &Pubkey, amount: u64) -> Result<Quote>;

    async fn execute(&self, wallet: &Pubkey, quote: &Quote, tip_lamports: u64)
        -> Result<SwapReceipt>;
}

/// Router over the closed venue set
#[derive(Clone)]
pub struct Venues {
    pub jupiter: Arc<dyn SwapVenue>,
    pub photon: Arc<dyn SwapVenue>,
    pub orca: Arc<dyn SwapVenue>,
    pub raydium: Arc<dyn SwapVenue>,
}

impl Venues {
    pub fn get(&self, venue: Venue) -> &Arc<dyn SwapVenue> {
        match venue {
            Venue::Jupiter => &self.jupiter,
            Venue::Photon => &self.photon,
            Venue::Orca => &self.orca,
            Venue::Raydium => &self.raydium,
        }
    }

    /// Route every venue to the same implementation
    pub fn uniform(venue: Arc<dyn SwapVenue>) -> Self {
        Self {
            jupiter: venue.clone(),
            photon: venue.clone(),
            orca: venue.clone(),
            raydium: venue,
        }
    }
}

/// Market price feed for the auto-sell monitor
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_price(&self, token: &Pubkey) -> Result<f64>;
}

/// Wallet persistence and key provisioning (both external concerns)
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Load the persisted wallet set
    async fn load(&self, credential: &str) -> Result<Vec<Pubkey>>;

    /// Persist the wallet set
    async fn save(&self, wallets: &[Pubkey], credential: &str) -> Result<()>;

    /// Generate a fresh wallet and return its address
    async fn generate(&self) -> Result<Pubkey>;

    /// Import a wallet from secret material and return its address
    async fn import(&self, secret: &str) -> Result<Pubkey>;
}
