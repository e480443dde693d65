//! Core types for launch wallets
//!
//! Defines wallet roles, aging states, and the per-wallet record
//! owned by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Role a wallet plays in a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletRole {
    /// Creates the token and may perform the dev sell
    Dev,

    /// Holds launch capital and disburses it to bundle wallets
    Funding,

    /// Participates in the coordinated buy/sell
    Bundle,
}

impl WalletRole {
    /// Roles that may be held by at most one wallet at a time
    pub fn is_exclusive(&self) -> bool {
        matches!(self, WalletRole::Dev | WalletRole::Funding)
    }
}

impl std::fmt::Display for WalletRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletRole::Dev => write!(f, "dev"),
            WalletRole::Funding => write!(f, "funding"),
            WalletRole::Bundle => write!(f, "bundle"),
        }
    }
}

/// Aging lifecycle of a bundle wallet
///
/// Transitions are strictly forward: NotAged -> Aging -> Aged.
/// The registry rejects any regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingState {
    NotAged,
    Aging,
    Aged,
}

impl AgingState {
    /// Check whether moving to `next` is a forward transition
    pub fn can_advance_to(&self, next: AgingState) -> bool {
        next >= *self
    }
}

impl std::fmt::Display for AgingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgingState::NotAged => write!(f, "not_aged"),
            AgingState::Aging => write!(f, "aging"),
            AgingState::Aged => write!(f, "aged"),
        }
    }
}

/// Per-wallet record owned by the registry
///
/// Mutated only through registry methods: the aging coordinator updates
/// aging state and counts, the funding dispatcher updates funded amounts,
/// the buy executor updates the last known token balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleWallet {
    /// Wallet address
    pub address: Pubkey,

    /// Role in the launch
    pub role: WalletRole,

    /// Aging lifecycle state
    pub aging_state: AgingState,

    /// Aging transfers completed so far (resumable on partial failure)
    pub aging_tx_count: u32,

    /// Lamports received from the funding wallet
    pub funded_amount: u64,

    /// Last known token balance in base units (updated after buys)
    pub last_known_balance: u64,

    /// When the wallet was registered
    pub created_at: DateTime<Utc>,
}

impl BundleWallet {
    pub fn new(address: Pubkey, role: WalletRole) -> Self {
        Self {
            address,
            role,
            aging_state: AgingState::NotAged,
            aging_tx_count: 0,
            funded_amount: 0,
            last_known_balance: 0,
            created_at: Utc::now(),
        }
    }
}
