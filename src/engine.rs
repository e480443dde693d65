//! Engine facade - one handle over the whole launch machinery
//!
//! The host application hands over its collaborator implementations once
//! and drives everything through this facade: wallet provisioning,
//! aging, launching, selling and the auto-sell monitor. Launches run on
//! a background task; progress is consumed through the watch
//! subscription.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aging::{AgingCoordinator, AgingResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exec::{BundleBuyExecutor, FundingDispatcher, SellExecutor, SellReport, SubmitPipeline};
use crate::launch::{LaunchOrchestrator, LaunchPlan, LaunchProgress};
use crate::monitor::{AutoSellMonitor, AutoSellRule};
use crate::services::{
    BroadcastService, PriceOracle, SigningService, TokenCreationService, Venue, Venues,
    WalletStore,
};
use crate::wallet::{WalletRegistry, WalletRole};

/// The host-provided service implementations
#[derive(Clone)]
pub struct Collaborators {
    pub signer: Arc<dyn SigningService>,
    pub broadcaster: Arc<dyn BroadcastService>,
    pub token_creator: Arc<dyn TokenCreationService>,
    pub venues: Venues,
    pub oracle: Arc<dyn PriceOracle>,
    pub wallet_store: Arc<dyn WalletStore>,
}

/// Facade over registry, aging, launch, sell and auto-sell
pub struct LaunchEngine {
    registry: Arc<WalletRegistry>,
    wallet_store: Arc<dyn WalletStore>,
    aging: AgingCoordinator,
    orchestrator: Arc<LaunchOrchestrator>,
    seller: Arc<SellExecutor>,
    monitor: AutoSellMonitor,
    /// Cancellation token of the launch currently in flight, if any
    launch_cancel: Mutex<Option<CancellationToken>>,
}

impl LaunchEngine {
    pub fn new(config: Config, services: Collaborators) -> Self {
        let registry = Arc::new(WalletRegistry::new());
        let pipeline = SubmitPipeline::new(
            services.signer.clone(),
            services.broadcaster.clone(),
            config.network,
        );

        let aging = AgingCoordinator::new(
            pipeline.clone(),
            registry.clone(),
            config.aging.clone(),
            config.engine.clone(),
        );
        let funder = FundingDispatcher::new(
            pipeline,
            registry.clone(),
            config.funding.clone(),
            config.engine.clone(),
        );
        let buyer = BundleBuyExecutor::new(
            services.venues.clone(),
            registry.clone(),
            config.buy.clone(),
            config.engine.clone(),
        );
        let seller = Arc::new(SellExecutor::new(
            services.venues,
            registry.clone(),
            config.sell.clone(),
            config.engine.clone(),
        ));
        let orchestrator = Arc::new(LaunchOrchestrator::new(
            registry.clone(),
            services.token_creator,
            funder,
            buyer,
        ));
        let monitor = AutoSellMonitor::new(services.oracle, seller.clone(), config.auto_sell);

        Self {
            registry,
            wallet_store: services.wallet_store,
            aging,
            orchestrator,
            seller,
            monitor,
            launch_cancel: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<WalletRegistry> {
        &self.registry
    }

    // Wallet provisioning

    /// Generate a fresh bundle wallet and register it
    pub async fn add_bundle_wallet(&self) -> Result<Pubkey> {
        let address = self.wallet_store.generate().await?;
        self.registry.add_wallet(address, WalletRole::Bundle).await?;
        Ok(address)
    }

    /// Import a bundle wallet from secret material and register it
    pub async fn import_bundle_wallet(&self, secret: &str) -> Result<Pubkey> {
        let address = self.wallet_store.import(secret).await?;
        self.registry.add_wallet(address, WalletRole::Bundle).await?;
        Ok(address)
    }

    pub async fn set_dev_wallet(&self, address: Pubkey) -> Result<()> {
        self.registry.add_wallet(address, WalletRole::Dev).await
    }

    pub async fn set_funding_wallet(&self, address: Pubkey) -> Result<()> {
        self.registry.add_wallet(address, WalletRole::Funding).await
    }

    pub async fn remove_wallet(&self, address: &Pubkey) -> Result<()> {
        self.registry.remove_wallet(address).await
    }

    /// Persist the bundle wallet set through the host's store
    pub async fn persist_wallets(&self, credential: &str) -> Result<()> {
        let wallets: Vec<Pubkey> = self
            .registry
            .list_by_role(WalletRole::Bundle)
            .await
            .into_iter()
            .map(|w| w.address)
            .collect();
        self.wallet_store.save(&wallets, credential).await
    }

    /// Restore a previously persisted bundle wallet set
    ///
    /// Returns how many wallets were registered; already-registered
    /// bundle wallets are no-ops.
    pub async fn restore_wallets(&self, credential: &str) -> Result<usize> {
        let addresses = self.wallet_store.load(credential).await?;
        for address in &addresses {
            self.registry.add_wallet(*address, WalletRole::Bundle).await?;
        }
        info!("Restored {} bundle wallets", addresses.len());
        Ok(addresses.len())
    }

    // Aging

    /// Age every bundle wallet; already-aged wallets are no-ops
    pub async fn age_all_wallets(&self) -> Vec<AgingResult> {
        let wallets: Vec<Pubkey> = self
            .registry
            .list_by_role(WalletRole::Bundle)
            .await
            .into_iter()
            .map(|w| w.address)
            .collect();
        self.aging.age_all(&wallets, CancellationToken::new()).await
    }

    // Launch

    /// Start a launch on a background task
    ///
    /// Returns a progress receiver immediately; the launch outcome is
    /// observed through it. The registry guard is acquired here, before
    /// the task is spawned, so a second call fails with LaunchInProgress
    /// no matter how the tasks get scheduled and can never clobber the
    /// running launch's cancellation token.
    pub async fn launch(&self, plan: LaunchPlan) -> Result<watch::Receiver<LaunchProgress>> {
        let guard = self.registry.acquire_launch_guard()?;

        let cancel = CancellationToken::new();
        *self.launch_cancel.lock().await = Some(cancel.clone());

        let orchestrator = self.orchestrator.clone();
        let rx = orchestrator.subscribe();
        tokio::spawn(async move {
            // The run reports its own outcome through the progress
            // channel; the error here is already published there.
            if let Err(e) = orchestrator.run_guarded(guard, plan, cancel).await {
                warn!("Launch ended with error: {}", e);
            }
        });

        Ok(rx)
    }

    /// Cancel the launch currently in flight, if any
    pub async fn cancel_launch(&self) {
        if let Some(cancel) = self.launch_cancel.lock().await.take() {
            info!("Cancelling in-flight launch");
            cancel.cancel();
        }
    }

    /// Latest progress snapshot subscription
    pub fn subscribe(&self) -> watch::Receiver<LaunchProgress> {
        self.orchestrator.subscribe()
    }

    // Selling

    /// Sell a percentage of every bundle wallet's holdings
    pub async fn sell_now(
        &self,
        token: &Pubkey,
        percentage: f64,
        venue: Venue,
    ) -> Result<SellReport> {
        let wallets: Vec<Pubkey> = self
            .registry
            .list_by_role(WalletRole::Bundle)
            .await
            .into_iter()
            .map(|w| w.address)
            .collect();
        self.seller
            .sell(&wallets, token, percentage, venue, CancellationToken::new())
            .await
    }

    /// Sell a percentage of the dev wallet's holdings
    pub async fn sell_dev(
        &self,
        token: &Pubkey,
        percentage: f64,
        venue: Venue,
    ) -> Result<SellReport> {
        let dev = self
            .registry
            .dev_wallet()
            .await
            .ok_or_else(|| Error::Validation("no dev wallet registered".to_string()))?;
        self.seller
            .sell(&[dev.address], token, percentage, venue, CancellationToken::new())
            .await
    }

    // Auto-sell

    /// Arm the auto-sell monitor over the bundle wallet set
    pub async fn arm_auto_sell(
        &self,
        rule: AutoSellRule,
        token: Pubkey,
        venue: Venue,
    ) -> Result<()> {
        let wallets: Vec<Pubkey> = self
            .registry
            .list_by_role(WalletRole::Bundle)
            .await
            .into_iter()
            .map(|w| w.address)
            .collect();
        if wallets.is_empty() {
            return Err(Error::Validation("bundle wallet set is empty".to_string()));
        }
        self.monitor.arm(rule, token, wallets, venue).await
    }

    pub async fn disarm_auto_sell(&self) {
        self.monitor.cancel().await;
    }
}
