//! Bundle Launch Orchestration Engine
//!
//! Coordinates multi-wallet token launches: wallet aging, capital
//! disbursement, near-simultaneous bundle buys, proportional sells and a
//! price-triggered auto-sell monitor.

pub mod aging;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod launch;
pub mod monitor;
pub mod services;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use engine::{Collaborators, LaunchEngine};
pub use error::{Error, Result};
pub use launch::{LaunchPlan, LaunchProgress, LaunchState};

/// Initialize tracing for host binaries
///
/// Respects `RUST_LOG`; defaults this crate to info.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bundle_launcher=info".parse().expect("static directive")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
