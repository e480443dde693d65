//! Wallet state module
//!
//! The registry is the only resource shared across launch components:
//! single-writer mutation, cloned snapshots for readers, and an RAII
//! launch guard that blocks removals while a launch is running.

pub mod registry;
pub mod types;

pub use registry::{LaunchGuard, WalletRegistry};
pub use types::{AgingState, BundleWallet, WalletRole};
