//! Stage execution module
//!
//! One fan-out primitive and the three stage executors built on it.
//! Funding and aging move lamports through the sign/broadcast pipeline;
//! buys and sells go through the swap venues, which own their own
//! transaction construction.

pub mod buy;
pub mod fanout;
pub mod funding;
pub mod sell;
pub mod submit;

pub use buy::{BundleBuyExecutor, BuyReport, BuyResult, BuyStatus};
pub use fanout::{run_fanout, FanoutReport, Outcome, WalletResult};
pub use funding::{FundingDispatcher, FundingReport, FundingResult, FundingStatus};
pub use sell::{SellExecutor, SellOrder, SellReport, SellStatus};
pub use submit::SubmitPipeline;
