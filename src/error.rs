//! Error types for the launch orchestration engine

use thiserror::Error;

use crate::launch::types::LaunchStage;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the orchestration engine
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Precondition errors - surfaced before any stage starts
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Role conflict: {role} is already assigned to {existing}")]
    RoleConflict { role: String, existing: String },

    #[error("Launch already in progress")]
    LaunchInProgress,

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    // Per-wallet operation errors
    #[error("Signing failed for {wallet}: {reason}")]
    Signing { wallet: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    // Stage-level aggregate errors
    #[error("Stage {stage} below success threshold: {failed} of {total} wallets failed")]
    PartialFailure {
        stage: LaunchStage,
        failed: usize,
        total: usize,
        /// Addresses that did not complete the stage
        unfinished: Vec<String>,
    },

    #[error("Cancelled")]
    Cancelled,

    // Collaborator errors
    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Price fetch failed: {0}")]
    PriceFetch(String),

    #[error("Wallet store error: {0}")]
    WalletStore(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout(_) | Error::PriceFetch(_)
        )
    }

    /// Check if this error is a fatal precondition failure
    /// (surfaced immediately, never retried, no stage is started)
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::RoleConflict { .. }
                | Error::LaunchInProgress
                | Error::WalletNotFound(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {}", e))
    }
}
