//! Wallet registry - single-writer wallet state
//!
//! Holds every wallet known to a launch and enforces the role invariants:
//! exactly one dev and one funding wallet, each wallet holds one role,
//! aging state never regresses. All reads return cloned snapshots; all
//! mutations go through dedicated methods behind one write lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::types::{AgingState, BundleWallet, WalletRole};

/// Registry of wallets participating in a launch
pub struct WalletRegistry {
    wallets: RwLock<Vec<BundleWallet>>,
    /// Set while a launch orchestrator owns this registry
    launch_active: Arc<AtomicBool>,
}

impl Default for WalletRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self {
            wallets: RwLock::new(Vec::new()),
            launch_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a wallet with a role
    ///
    /// Fails with RoleConflict if an exclusive role (dev/funding) is already
    /// held by a different wallet, or if the wallet already holds a
    /// different role.
    pub async fn add_wallet(&self, address: Pubkey, role: WalletRole) -> Result<()> {
        let mut wallets = self.wallets.write().await;

        if let Some(existing) = wallets.iter().find(|w| w.address == address) {
            if existing.role == role {
                debug!("Wallet {} already registered as {}", address, role);
                return Ok(());
            }
            return Err(Error::RoleConflict {
                role: existing.role.to_string(),
                existing: address.to_string(),
            });
        }

        if role.is_exclusive() {
            if let Some(holder) = wallets.iter().find(|w| w.role == role) {
                return Err(Error::RoleConflict {
                    role: role.to_string(),
                    existing: holder.address.to_string(),
                });
            }
        }

        info!("Registered {} wallet {}", role, address);
        wallets.push(BundleWallet::new(address, role));
        Ok(())
    }

    /// Remove a wallet from the registry
    ///
    /// Fails with LaunchInProgress while an orchestrator owns the registry.
    pub async fn remove_wallet(&self, address: &Pubkey) -> Result<()> {
        if self.launch_active.load(Ordering::SeqCst) {
            return Err(Error::LaunchInProgress);
        }

        let mut wallets = self.wallets.write().await;
        let before = wallets.len();
        wallets.retain(|w| w.address != *address);

        if wallets.len() == before {
            return Err(Error::WalletNotFound(address.to_string()));
        }

        info!("Removed wallet {}", address);
        Ok(())
    }

    /// Snapshot of all wallets holding a role (cloned, never a live handle)
    pub async fn list_by_role(&self, role: WalletRole) -> Vec<BundleWallet> {
        let wallets = self.wallets.read().await;
        wallets.iter().filter(|w| w.role == role).cloned().collect()
    }

    /// Snapshot of a single wallet
    pub async fn get(&self, address: &Pubkey) -> Option<BundleWallet> {
        let wallets = self.wallets.read().await;
        wallets.iter().find(|w| w.address == *address).cloned()
    }

    /// The dev wallet, if one is registered
    pub async fn dev_wallet(&self) -> Option<BundleWallet> {
        self.list_by_role(WalletRole::Dev).await.into_iter().next()
    }

    /// The funding wallet, if one is registered
    pub async fn funding_wallet(&self) -> Option<BundleWallet> {
        self.list_by_role(WalletRole::Funding)
            .await
            .into_iter()
            .next()
    }

    /// Advance a wallet's aging state, recording completed transfer count
    ///
    /// Regressions are rejected: aging only ever moves forward.
    pub async fn advance_aging(
        &self,
        address: &Pubkey,
        state: AgingState,
        tx_count: u32,
    ) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .iter_mut()
            .find(|w| w.address == *address)
            .ok_or_else(|| Error::WalletNotFound(address.to_string()))?;

        if !wallet.aging_state.can_advance_to(state) {
            return Err(Error::Validation(format!(
                "aging regression for {}: {} -> {}",
                address, wallet.aging_state, state
            )));
        }

        wallet.aging_state = state;
        wallet.aging_tx_count = wallet.aging_tx_count.max(tx_count);
        Ok(())
    }

    /// Record a completed funding transfer
    ///
    /// Funded amount only accumulates from dispatched transfers; there is
    /// no path that sets it directly, so a wallet can never show more than
    /// the sum of what was actually sent.
    pub async fn record_funding(&self, address: &Pubkey, amount: u64) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .iter_mut()
            .find(|w| w.address == *address)
            .ok_or_else(|| Error::WalletNotFound(address.to_string()))?;

        wallet.funded_amount = wallet.funded_amount.saturating_add(amount);
        Ok(())
    }

    /// Credit tokens received by a wallet after a buy settles
    pub async fn credit_balance(&self, address: &Pubkey, delta: u64) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .iter_mut()
            .find(|w| w.address == *address)
            .ok_or_else(|| Error::WalletNotFound(address.to_string()))?;

        wallet.last_known_balance = wallet.last_known_balance.saturating_add(delta);
        Ok(())
    }

    /// Record a wallet's token balance after a buy or sell settles
    pub async fn record_balance(&self, address: &Pubkey, balance: u64) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .iter_mut()
            .find(|w| w.address == *address)
            .ok_or_else(|| Error::WalletNotFound(address.to_string()))?;

        wallet.last_known_balance = balance;
        Ok(())
    }

    /// Acquire exclusive launch ownership of this registry
    ///
    /// While the guard lives, `remove_wallet` fails with LaunchInProgress
    /// and no second launch can claim the registry.
    pub fn acquire_launch_guard(&self) -> Result<LaunchGuard> {
        if self
            .launch_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::LaunchInProgress);
        }

        Ok(LaunchGuard {
            flag: self.launch_active.clone(),
        })
    }

    /// Whether a launch currently owns the registry
    pub fn launch_active(&self) -> bool {
        self.launch_active.load(Ordering::SeqCst)
    }
}

/// RAII guard marking the registry as owned by a running launch
#[derive(Debug)]
pub struct LaunchGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
