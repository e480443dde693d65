//! Launch orchestrator - drives a launch through its stages
//!
//! One orchestrator run owns the registry (via the launch guard) from
//! validation to a terminal state. Stages run strictly in order: token
//! creation, funding, bundle buy. A stage failure below its threshold
//! moves the launch to Failed with the offending wallets attached;
//! nothing is rolled back, so a rerun picks up where the failed run
//! stopped (funding skips already-funded wallets).

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::exec::{BundleBuyExecutor, FundingDispatcher};
use crate::services::{TokenCreationService, Venue};
use crate::wallet::{LaunchGuard, WalletRegistry, WalletRole};

use super::types::{
    anchors, LaunchProgress, LaunchStage, LaunchState, TokenLaunch, TokenMetadata,
    WalletStageResult,
};

/// Everything the operator chooses for one launch
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub metadata: TokenMetadata,
    /// Lamports disbursed to each bundle wallet
    pub funding_per_wallet: u64,
    /// Lamports each bundle wallet spends on the buy
    pub buy_per_wallet: u64,
    pub venue: Venue,
    /// Requested priority tip; clamped by the buy executor
    pub tip_lamports: u64,
    /// Optional partial-success policy for the buy stage
    pub buy_threshold: Option<f64>,
}

/// Drives one launch at a time through creation, funding and buying
pub struct LaunchOrchestrator {
    registry: Arc<WalletRegistry>,
    token_creator: Arc<dyn TokenCreationService>,
    funder: FundingDispatcher,
    buyer: BundleBuyExecutor,
    progress_tx: watch::Sender<LaunchProgress>,
}

impl LaunchOrchestrator {
    pub fn new(
        registry: Arc<WalletRegistry>,
        token_creator: Arc<dyn TokenCreationService>,
        funder: FundingDispatcher,
        buyer: BundleBuyExecutor,
    ) -> Self {
        let (progress_tx, _) = watch::channel(LaunchProgress::idle());
        Self {
            registry,
            token_creator,
            funder,
            buyer,
            progress_tx,
        }
    }

    /// Subscribe to progress snapshots published at stage boundaries
    pub fn subscribe(&self) -> watch::Receiver<LaunchProgress> {
        self.progress_tx.subscribe()
    }

    /// Run a launch to a terminal state
    ///
    /// Fails with LaunchInProgress if another run owns the registry, and
    /// with Validation before any state change if the wallet set or plan
    /// is incomplete. After the first stage starts, every failure lands
    /// the launch in Failed and is reported through both the returned
    /// error and the progress channel.
    pub async fn run(&self, plan: LaunchPlan, cancel: CancellationToken) -> Result<TokenLaunch> {
        let guard = self.registry.acquire_launch_guard()?;
        self.run_guarded(guard, plan, cancel).await
    }

    /// Run a launch with an already-acquired registry guard
    ///
    /// Lets callers reserve the launch slot before handing the run to a
    /// background task, so admission is decided at call time rather than
    /// whenever the task gets scheduled.
    pub async fn run_guarded(
        &self,
        guard: LaunchGuard,
        plan: LaunchPlan,
        cancel: CancellationToken,
    ) -> Result<TokenLaunch> {
        let _guard = guard;

        // Preconditions: checked before any state is touched
        let dev = self
            .registry
            .dev_wallet()
            .await
            .ok_or_else(|| Error::Validation("no dev wallet registered".to_string()))?;
        let funding_wallet = self
            .registry
            .funding_wallet()
            .await
            .ok_or_else(|| Error::Validation("no funding wallet registered".to_string()))?;
        let bundle: Vec<Pubkey> = self
            .registry
            .list_by_role(WalletRole::Bundle)
            .await
            .into_iter()
            .map(|w| w.address)
            .collect();
        if bundle.is_empty() {
            return Err(Error::Validation("bundle wallet set is empty".to_string()));
        }
        if plan.metadata.name.is_empty() || plan.metadata.symbol.is_empty() {
            return Err(Error::Validation(
                "token name and symbol are required".to_string(),
            ));
        }
        if plan.funding_per_wallet == 0 || plan.buy_per_wallet == 0 {
            return Err(Error::Validation(
                "funding and buy amounts must be positive".to_string(),
            ));
        }

        let mut launch = TokenLaunch::draft(plan.metadata.clone());
        let mut progress = Tracker::new(&self.progress_tx);
        info!(
            "Launch {} starting: {} bundle wallets, venue {}",
            launch.id,
            bundle.len(),
            plan.venue
        );

        // Stage: token creation. Any error here is fatal for the run.
        if cancel.is_cancelled() {
            return self.fail(&mut launch, &mut progress, Error::Cancelled);
        }
        let token = match self
            .token_creator
            .create_token(&dev.address, &plan.metadata)
            .await
        {
            Ok(token) => token,
            Err(e) => return self.fail(&mut launch, &mut progress, e),
        };
        launch.token_address = Some(token);
        launch.state = LaunchState::Created;
        progress.advance(LaunchState::Created, anchors::CREATED);
        info!("Launch {}: token {} created", launch.id, token);

        // Stage: funding
        if cancel.is_cancelled() {
            return self.fail(&mut launch, &mut progress, Error::Cancelled);
        }
        launch.state = LaunchState::Funding;
        progress.advance(LaunchState::Funding, anchors::CREATED);

        let report = match self
            .funder
            .fund(
                &funding_wallet.address,
                &bundle,
                plan.funding_per_wallet,
                cancel.clone(),
            )
            .await
        {
            Ok(report) => report,
            Err(e) => return self.fail(&mut launch, &mut progress, e),
        };
        progress.record(report.results.iter().map(|r| WalletStageResult {
            wallet: r.address.to_string(),
            ok: r.status.is_funded(),
            detail: format!("funding: {:?}", r.status),
        }));
        if report.cancelled {
            return self.fail(&mut launch, &mut progress, Error::Cancelled);
        }
        if !report.threshold_met {
            let unfunded = report.unfunded();
            let err = Error::PartialFailure {
                stage: LaunchStage::Funding,
                failed: unfunded.len(),
                total: bundle.len(),
                unfinished: unfunded.iter().map(|a| a.to_string()).collect(),
            };
            return self.fail(&mut launch, &mut progress, err);
        }
        progress.advance(LaunchState::Funding, anchors::FUNDED);

        // Stage: bundle buy
        if cancel.is_cancelled() {
            return self.fail(&mut launch, &mut progress, Error::Cancelled);
        }
        launch.state = LaunchState::Buying;
        progress.advance(LaunchState::Buying, anchors::FUNDED);

        let report = match self
            .buyer
            .execute_bundle_buy(
                &bundle,
                &token,
                plan.buy_per_wallet,
                plan.venue,
                plan.tip_lamports,
                plan.buy_threshold,
                cancel.clone(),
            )
            .await
        {
            Ok(report) => report,
            Err(e) => return self.fail(&mut launch, &mut progress, e),
        };
        progress.record(report.results.iter().map(|r| WalletStageResult {
            wallet: r.wallet.to_string(),
            ok: r.status.is_success(),
            detail: format!("buy: {:?}", r.status),
        }));
        if report.cancelled {
            return self.fail(&mut launch, &mut progress, Error::Cancelled);
        }
        if !report.threshold_met {
            let failed = report.failed_wallets();
            let err = Error::PartialFailure {
                stage: LaunchStage::Buying,
                failed: failed.len(),
                total: bundle.len(),
                unfinished: failed.iter().map(|a| a.to_string()).collect(),
            };
            return self.fail(&mut launch, &mut progress, err);
        }
        progress.advance(LaunchState::Buying, anchors::BOUGHT);

        launch.state = LaunchState::Live;
        progress.advance(LaunchState::Live, anchors::LIVE);
        info!("Launch {} is live: token {}", launch.id, token);

        Ok(launch)
    }

    fn fail(
        &self,
        launch: &mut TokenLaunch,
        progress: &mut Tracker<'_>,
        err: Error,
    ) -> Result<TokenLaunch> {
        match &err {
            Error::Cancelled => warn!("Launch {} cancelled", launch.id),
            e => error!("Launch {} failed: {}", launch.id, e),
        }
        launch.state = LaunchState::Failed;
        progress.fail(err.to_string());
        Err(err)
    }
}

/// Progress publisher enforcing monotonic percentages within a run
///
/// Publications go through `send_replace` so the latest snapshot is
/// stored even when nobody is subscribed yet; a late subscriber always
/// sees the run's most recent state.
struct Tracker<'a> {
    tx: &'a watch::Sender<LaunchProgress>,
    snapshot: LaunchProgress,
}

impl<'a> Tracker<'a> {
    fn new(tx: &'a watch::Sender<LaunchProgress>) -> Self {
        let snapshot = LaunchProgress::idle();
        tx.send_replace(snapshot.clone());
        Self { tx, snapshot }
    }

    fn advance(&mut self, state: LaunchState, percent: u8) {
        self.snapshot.state = state;
        self.snapshot.percent_complete = self.snapshot.percent_complete.max(percent);
        self.tx.send_replace(self.snapshot.clone());
    }

    fn record(&mut self, results: impl Iterator<Item = WalletStageResult>) {
        self.snapshot.wallet_results.extend(results);
    }

    /// Terminal failure: percent holds where it was
    fn fail(&mut self, error: String) {
        self.snapshot.state = LaunchState::Failed;
        self.snapshot.last_error = Some(error);
        self.tx.send_replace(self.snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuyConfig, EngineConfig, FundingConfig, Network};
    use crate::exec::SubmitPipeline;
    use crate::services::mock::{MockBroadcast, MockSigner, MockTokenCreator, MockVenue};
    use crate::services::Venues;
    use std::time::Duration;

    struct Harness {
        orchestrator: LaunchOrchestrator,
        registry: Arc<WalletRegistry>,
        bundles: Vec<Pubkey>,
    }

    async fn harness(
        bundle_count: usize,
        creator: MockTokenCreator,
        broadcast: MockBroadcast,
        venue: MockVenue,
    ) -> Harness {
        let registry = Arc::new(WalletRegistry::new());
        registry
            .add_wallet(Pubkey::new_unique(), WalletRole::Dev)
            .await
            .unwrap();
        registry
            .add_wallet(Pubkey::new_unique(), WalletRole::Funding)
            .await
            .unwrap();
        let mut bundles = Vec::new();
        for _ in 0..bundle_count {
            let addr = Pubkey::new_unique();
            registry.add_wallet(addr, WalletRole::Bundle).await.unwrap();
            bundles.push(addr);
        }

        let pipeline = SubmitPipeline::new(
            Arc::new(MockSigner::default()),
            Arc::new(broadcast),
            Network::Devnet,
        );
        let funder = FundingDispatcher::new(
            pipeline,
            registry.clone(),
            FundingConfig {
                retry_base_delay_ms: 1,
                ..FundingConfig::default()
            },
            EngineConfig::default(),
        );
        let buyer = BundleBuyExecutor::new(
            Venues::uniform(Arc::new(venue)),
            registry.clone(),
            BuyConfig::default(),
            EngineConfig::default(),
        );

        Harness {
            orchestrator: LaunchOrchestrator::new(
                registry.clone(),
                Arc::new(creator),
                funder,
                buyer,
            ),
            registry,
            bundles,
        }
    }

    fn plan() -> LaunchPlan {
        LaunchPlan {
            metadata: TokenMetadata::new("Moon Token", "MOON"),
            funding_per_wallet: 1_000_000,
            buy_per_wallet: 500_000,
            venue: Venue::Jupiter,
            tip_lamports: 200_000,
            buy_threshold: None,
        }
    }

    #[tokio::test]
    async fn test_happy_path_reaches_live() {
        let h = harness(
            3,
            MockTokenCreator::default(),
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;

        let mut rx = h.orchestrator.subscribe();
        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let p = rx.borrow_and_update().clone();
                let terminal = p.state.is_terminal();
                seen.push(p);
                if terminal {
                    break;
                }
            }
            seen
        });

        let launch = h
            .orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(launch.state, LaunchState::Live);
        assert!(launch.token_address.is_some());

        // Progress observed by a subscriber never moves backwards and
        // terminates at 100
        let seen = collector.await.unwrap();
        let percents: Vec<u8> = seen.iter().map(|p| p.percent_complete).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        let last = seen.last().unwrap();
        assert_eq!(last.state, LaunchState::Live);
        assert_eq!(last.percent_complete, 100);
        assert!(last.last_error.is_none());

        // Registry reflects both stages
        for addr in &h.bundles {
            let w = h.registry.get(addr).await.unwrap();
            assert_eq!(w.funded_amount, 1_000_000);
            assert_eq!(w.last_known_balance, 500_000);
        }
        // Guard released: a second launch can start
        assert!(!h.registry.launch_active());
    }

    #[tokio::test]
    async fn test_funding_shortfall_fails_launch_with_addresses() {
        let h = harness(
            5,
            MockTokenCreator::default(),
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;
        // Rebuild the funder with one poisoned recipient; the harness
        // can't know the address before the wallets exist
        let mut broadcast = MockBroadcast::default();
        broadcast.fail_recipients.insert(h.bundles[3]);
        let h2 = Harness {
            orchestrator: LaunchOrchestrator::new(
                h.registry.clone(),
                Arc::new(MockTokenCreator::default()),
                FundingDispatcher::new(
                    SubmitPipeline::new(
                        Arc::new(MockSigner::default()),
                        Arc::new(broadcast),
                        Network::Devnet,
                    ),
                    h.registry.clone(),
                    FundingConfig {
                        retry_base_delay_ms: 1,
                        ..FundingConfig::default()
                    },
                    EngineConfig::default(),
                ),
                BundleBuyExecutor::new(
                    Venues::uniform(Arc::new(MockVenue::new())),
                    h.registry.clone(),
                    BuyConfig::default(),
                    EngineConfig::default(),
                ),
            ),
            registry: h.registry.clone(),
            bundles: h.bundles.clone(),
        };

        let err = h2
            .orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::PartialFailure {
                stage,
                failed,
                total,
                unfinished,
            } => {
                assert_eq!(stage, LaunchStage::Funding);
                assert_eq!(failed, 1);
                assert_eq!(total, 5);
                assert_eq!(unfinished, vec![h2.bundles[3].to_string()]);
            }
            other => panic!("expected PartialFailure, got {other:?}"),
        }

        let progress = h2.orchestrator.subscribe().borrow().clone();
        assert_eq!(progress.state, LaunchState::Failed);
        assert!(progress.last_error.is_some());
        // The four funded wallets keep their funding for a rerun
        assert_eq!(
            h2.registry.get(&h2.bundles[0]).await.unwrap().funded_amount,
            1_000_000
        );
    }

    #[tokio::test]
    async fn test_buy_shortfall_fails_launch() {
        let h = harness(
            3,
            MockTokenCreator::default(),
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;
        let mut venue = MockVenue::new();
        venue.always_fail.insert(h.bundles[1]);
        let orchestrator = LaunchOrchestrator::new(
            h.registry.clone(),
            Arc::new(MockTokenCreator::default()),
            FundingDispatcher::new(
                SubmitPipeline::new(
                    Arc::new(MockSigner::default()),
                    Arc::new(MockBroadcast::default()),
                    Network::Devnet,
                ),
                h.registry.clone(),
                FundingConfig {
                    retry_base_delay_ms: 1,
                    ..FundingConfig::default()
                },
                EngineConfig::default(),
            ),
            BundleBuyExecutor::new(
                Venues::uniform(Arc::new(venue)),
                h.registry.clone(),
                BuyConfig::default(),
                EngineConfig::default(),
            ),
        );

        let err = orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::PartialFailure {
                stage: LaunchStage::Buying,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_wallets_rejected_before_any_stage() {
        let registry = Arc::new(WalletRegistry::new());
        let orchestrator = LaunchOrchestrator::new(
            registry.clone(),
            Arc::new(MockTokenCreator::default()),
            FundingDispatcher::new(
                SubmitPipeline::new(
                    Arc::new(MockSigner::default()),
                    Arc::new(MockBroadcast::default()),
                    Network::Devnet,
                ),
                registry.clone(),
                FundingConfig::default(),
                EngineConfig::default(),
            ),
            BundleBuyExecutor::new(
                Venues::uniform(Arc::new(MockVenue::new())),
                registry.clone(),
                BuyConfig::default(),
                EngineConfig::default(),
            ),
        );

        let err = orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // No state change was published
        let progress = orchestrator.subscribe().borrow().clone();
        assert_eq!(progress.state, LaunchState::Draft);
        assert_eq!(progress.percent_complete, 0);
        // Guard was released despite the early return
        assert!(!registry.launch_active());
    }

    #[tokio::test]
    async fn test_second_launch_rejected_while_first_owns_registry() {
        let h = harness(
            2,
            MockTokenCreator::default(),
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;

        let guard = h.registry.acquire_launch_guard().unwrap();
        let err = h
            .orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LaunchInProgress));
        drop(guard);

        // Once released, the launch goes through
        let launch = h
            .orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(launch.state, LaunchState::Live);
    }

    #[tokio::test]
    async fn test_token_creation_failure_is_fatal() {
        let h = harness(
            2,
            MockTokenCreator { fail: true },
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;

        let err = h
            .orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenCreation(_)));

        let progress = h.orchestrator.subscribe().borrow().clone();
        assert_eq!(progress.state, LaunchState::Failed);
        assert_eq!(progress.percent_complete, 0);
        // Nothing was funded
        assert_eq!(h.registry.get(&h.bundles[0]).await.unwrap().funded_amount, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_funding_stops_queued_transfers() {
        let h = harness(
            3,
            MockTokenCreator::default(),
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;
        // Single-permit fan-out over a slow broadcaster: the first
        // transfer is in flight when the cancel lands, the other two are
        // still queued behind the semaphore
        let broadcast = MockBroadcast {
            delay: Duration::from_millis(200),
            ..Default::default()
        };
        let orchestrator = Arc::new(LaunchOrchestrator::new(
            h.registry.clone(),
            Arc::new(MockTokenCreator::default()),
            FundingDispatcher::new(
                SubmitPipeline::new(
                    Arc::new(MockSigner::default()),
                    Arc::new(broadcast),
                    Network::Devnet,
                ),
                h.registry.clone(),
                FundingConfig {
                    retry_base_delay_ms: 1,
                    ..FundingConfig::default()
                },
                EngineConfig {
                    parallelism: 1,
                    ..EngineConfig::default()
                },
            ),
            BundleBuyExecutor::new(
                Venues::uniform(Arc::new(MockVenue::new())),
                h.registry.clone(),
                BuyConfig::default(),
                EngineConfig::default(),
            ),
        ));

        let cancel = CancellationToken::new();
        let task = {
            let orchestrator = orchestrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.run(plan(), cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let progress = orchestrator.subscribe().borrow().clone();
        assert_eq!(progress.state, LaunchState::Failed);
        // The in-flight transfer still finished and was recorded; the
        // queued wallets never dispatched
        assert_eq!(progress.wallet_results.len(), 3);
        assert!(progress.wallet_results.iter().any(|r| r.ok));
        assert!(progress.wallet_results.iter().any(|r| !r.ok));
    }

    #[tokio::test]
    async fn test_stage_error_inside_funding_publishes_failed() {
        let h = harness(
            2,
            MockTokenCreator::default(),
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;
        // Funder wired to a registry that doesn't know the bundle
        // wallets: recording a confirmed transfer fails mid-stage, after
        // the launch has left Draft
        let orphan = Arc::new(WalletRegistry::new());
        let orchestrator = LaunchOrchestrator::new(
            h.registry.clone(),
            Arc::new(MockTokenCreator::default()),
            FundingDispatcher::new(
                SubmitPipeline::new(
                    Arc::new(MockSigner::default()),
                    Arc::new(MockBroadcast::default()),
                    Network::Devnet,
                ),
                orphan,
                FundingConfig {
                    retry_base_delay_ms: 1,
                    ..FundingConfig::default()
                },
                EngineConfig::default(),
            ),
            BundleBuyExecutor::new(
                Venues::uniform(Arc::new(MockVenue::new())),
                h.registry.clone(),
                BuyConfig::default(),
                EngineConfig::default(),
            ),
        );

        let err = orchestrator
            .run(plan(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WalletNotFound(_)));

        // The failure reached subscribers, not just the caller
        let progress = orchestrator.subscribe().borrow().clone();
        assert_eq!(progress.state, LaunchState::Failed);
        assert!(progress.last_error.is_some());
    }

    #[tokio::test]
    async fn test_cancel_before_stages_fails_with_cancelled() {
        let h = harness(
            2,
            MockTokenCreator::default(),
            MockBroadcast::default(),
            MockVenue::new(),
        )
        .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = h.orchestrator.run(plan(), cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let progress = h.orchestrator.subscribe().borrow().clone();
        assert_eq!(progress.state, LaunchState::Failed);
    }
}
