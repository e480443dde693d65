//! Launch lifecycle: types and the stage orchestrator

pub mod orchestrator;
pub mod types;

pub use orchestrator::{LaunchOrchestrator, LaunchPlan};
pub use types::{
    LaunchProgress, LaunchStage, LaunchState, TokenLaunch, TokenMetadata, WalletStageResult,
};
