//! Launch lifecycle types
//!
//! A launch moves strictly forward through its states; Failed is
//! reachable from any non-terminal state. Progress percentages are
//! anchored to stage boundaries and never decrease within a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Token metadata submitted by the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub telegram: Option<String>,
}

impl TokenMetadata {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            description: None,
            image_url: None,
            website: None,
            twitter: None,
            telegram: None,
        }
    }
}

/// Launch lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchState {
    Draft,
    Created,
    Funding,
    Buying,
    Live,
    Failed,
}

impl LaunchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LaunchState::Live | LaunchState::Failed)
    }

    /// Forward transitions only; Failed is reachable from any
    /// non-terminal state
    pub fn can_transition_to(&self, next: LaunchState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, LaunchState::Failed) => true,
            (LaunchState::Draft, LaunchState::Created) => true,
            (LaunchState::Created, LaunchState::Funding) => true,
            (LaunchState::Funding, LaunchState::Buying) => true,
            (LaunchState::Buying, LaunchState::Live) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LaunchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchState::Draft => write!(f, "draft"),
            LaunchState::Created => write!(f, "created"),
            LaunchState::Funding => write!(f, "funding"),
            LaunchState::Buying => write!(f, "buying"),
            LaunchState::Live => write!(f, "live"),
            LaunchState::Failed => write!(f, "failed"),
        }
    }
}

/// The work stages of a launch (used in stage-level failure detail)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStage {
    Created,
    Funding,
    Buying,
}

impl std::fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchStage::Created => write!(f, "created"),
            LaunchStage::Funding => write!(f, "funding"),
            LaunchStage::Buying => write!(f, "buying"),
        }
    }
}

/// One launch, owned by a single orchestrator run
#[derive(Debug, Clone)]
pub struct TokenLaunch {
    pub id: uuid::Uuid,
    /// Absent until the Created stage completes
    pub token_address: Option<Pubkey>,
    pub metadata: TokenMetadata,
    pub state: LaunchState,
    pub created_at: DateTime<Utc>,
}

impl TokenLaunch {
    pub fn draft(metadata: TokenMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            token_address: None,
            metadata,
            state: LaunchState::Draft,
            created_at: Utc::now(),
        }
    }
}

/// Per-wallet outcome surfaced to the progress subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletStageResult {
    pub wallet: String,
    pub ok: bool,
    pub detail: String,
}

/// Read-only progress snapshot published at stage boundaries
///
/// `percent_complete` is anchored to stage boundaries and is
/// monotonically non-decreasing within a run regardless of per-wallet
/// failures inside a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchProgress {
    pub state: LaunchState,
    pub percent_complete: u8,
    #[serde(default)]
    pub wallet_results: Vec<WalletStageResult>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl LaunchProgress {
    pub fn idle() -> Self {
        Self {
            state: LaunchState::Draft,
            percent_complete: 0,
            wallet_results: Vec::new(),
            last_error: None,
        }
    }
}

/// Progress anchors per stage boundary
pub mod anchors {
    pub const CREATED: u8 = 10;
    pub const FUNDED: u8 = 30;
    pub const BOUGHT: u8 = 70;
    pub const LIVE: u8 = 100;
}
