//! Bounded concurrent fan-out with a join barrier
//!
//! Every stage that touches the wallet set (aging, funding, buying,
//! selling) dispatches through this primitive: at most `parallelism`
//! per-wallet operations in flight, results joined against a deadline.
//! Operations still running when the deadline passes are marked Timeout
//! and excluded from the success count; they are not aborted, so a late
//! completion is harmless. A cancellation signal stops new dispatches
//! but lets in-flight work finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;

/// Terminal state of one per-wallet operation
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failed(Error),
    /// Not finished when the join barrier closed
    Timeout,
    /// Never dispatched because the stage was cancelled
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Result of one per-wallet operation within a stage
#[derive(Debug, Clone)]
pub struct WalletResult<T> {
    pub wallet: Pubkey,
    pub outcome: Outcome<T>,
}

/// Aggregate view of a completed fan-out
#[derive(Debug, Clone)]
pub struct FanoutReport<T> {
    pub results: Vec<WalletResult<T>>,
}

impl<T> FanoutReport<T> {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn success_fraction(&self) -> f64 {
        if self.results.is_empty() {
            return 1.0;
        }
        self.success_count() as f64 / self.results.len() as f64
    }

    /// Addresses that did not succeed
    pub fn unfinished(&self) -> Vec<Pubkey> {
        self.results
            .iter()
            .filter(|r| !r.outcome.is_success())
            .map(|r| r.wallet)
            .collect()
    }

    /// Whether any operation was cut off by cancellation
    pub fn was_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.outcome, Outcome::Cancelled))
    }
}

/// Dispatch `op` over `wallets` with bounded concurrency and join with a
/// deadline. Result order matches input order.
pub async fn run_fanout<T, F, Fut>(
    wallets: Vec<Pubkey>,
    parallelism: usize,
    timeout: Duration,
    cancel: CancellationToken,
    op: F,
) -> FanoutReport<T>
where
    T: Send + 'static,
    F: Fn(Pubkey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<T>> + Send + 'static,
{
    let total = wallets.len();
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Outcome<T>)>();
    let op = Arc::new(op);

    for (idx, wallet) in wallets.iter().copied().enumerate() {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        let op = op.clone();

        // Detached on purpose: in-flight work outlives the barrier.
        tokio::spawn(async move {
            // A permit marks the dispatch point; a cancelled stage stops
            // admitting new work here.
            let _permit = match semaphore.acquire().await {
                Ok(p) => p,
                Err(_) => return,
            };

            if cancel.is_cancelled() {
                let _ = tx.send((idx, Outcome::Cancelled));
                return;
            }

            let outcome = match op(wallet).await {
                Ok(value) => Outcome::Success(value),
                Err(e) => Outcome::Failed(e),
            };
            let _ = tx.send((idx, outcome));
        });
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let mut slots: Vec<Option<Outcome<T>>> = (0..total).map(|_| None).collect();
    let mut received = 0usize;

    while received < total {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some((idx, outcome))) => {
                slots[idx] = Some(outcome);
                received += 1;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "Join barrier timed out with {} of {} operations unfinished",
                    total - received,
                    total
                );
                break;
            }
        }
    }

    debug!("Fan-out joined: {}/{} completed", received, total);

    let results = wallets
        .into_iter()
        .zip(slots)
        .map(|(wallet, slot)| WalletResult {
            wallet,
            outcome: slot.unwrap_or(Outcome::Timeout),
        })
        .collect();

    FanoutReport { results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_all_succeed_in_input_order() {
        let wallets: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
        let report = run_fanout(
            wallets.clone(),
            3,
            Duration::from_secs(5),
            CancellationToken::new(),
            |wallet| async move { Ok(wallet) },
        )
        .await;

        assert_eq!(report.success_count(), 8);
        assert_eq!(report.success_fraction(), 1.0);
        for (result, wallet) in report.results.iter().zip(&wallets) {
            assert_eq!(result.wallet, *wallet);
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let wallets: Vec<Pubkey> = (0..20).map(|_| Pubkey::new_unique()).collect();

        let in_flight2 = in_flight.clone();
        let peak2 = peak.clone();
        let report = run_fanout(
            wallets,
            4,
            Duration::from_secs(5),
            CancellationToken::new(),
            move |_wallet| {
                let in_flight = in_flight2.clone();
                let peak = peak2.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(report.success_count(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stragglers_marked_timeout() {
        let fast = Pubkey::new_unique();
        let slow = Pubkey::new_unique();

        let report = run_fanout(
            vec![fast, slow],
            2,
            Duration::from_millis(100),
            CancellationToken::new(),
            move |wallet| async move {
                if wallet == slow {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(())
            },
        )
        .await;

        assert_eq!(report.success_count(), 1);
        assert!(matches!(report.results[0].outcome, Outcome::Success(())));
        assert!(matches!(report.results[1].outcome, Outcome::Timeout));
        assert_eq!(report.unfinished(), vec![slow]);
    }

    #[tokio::test]
    async fn test_cancel_stops_new_dispatches() {
        let cancel = CancellationToken::new();
        let wallets: Vec<Pubkey> = (0..10).map(|_| Pubkey::new_unique()).collect();
        let started = Arc::new(AtomicUsize::new(0));

        let started2 = started.clone();
        let cancel2 = cancel.clone();
        let report = run_fanout(
            wallets,
            1,
            Duration::from_secs(5),
            cancel.clone(),
            move |_wallet| {
                let started = started2.clone();
                let cancel = cancel2.clone();
                async move {
                    // First operation cancels the stage mid-flight
                    if started.fetch_add(1, Ordering::SeqCst) == 0 {
                        cancel.cancel();
                    }
                    Ok(())
                }
            },
        )
        .await;

        // The in-flight operation finished; the rest never dispatched
        assert_eq!(report.success_count(), 1);
        assert!(report.was_cancelled());
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_siblings() {
        let bad = Pubkey::new_unique();
        let wallets = vec![Pubkey::new_unique(), bad, Pubkey::new_unique()];

        let report = run_fanout(
            wallets,
            3,
            Duration::from_secs(5),
            CancellationToken::new(),
            move |wallet| async move {
                if wallet == bad {
                    Err(Error::Network("boom".to_string()))
                } else {
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(report.success_count(), 2);
        assert!(matches!(report.results[1].outcome, Outcome::Failed(_)));
    }
}
