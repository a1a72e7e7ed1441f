//! Multi-account signal synchronization.
//!
//! The manager tracks which accounts exist, which are enabled, how they are
//! grouped, and where each one is in the sync cycle:
//!
//! ```text
//! unknown ──► pending ──► synced
//!                │
//!                └──────► error ──(reset)──► unknown
//! ```
//!
//! A round marks every ready account pending, spawns one execution task per
//! account before awaiting any of them, and joins them all. A failing,
//! panicking or timed-out task only affects its own account.

use crate::engine::{AccountExecutor, ExecutionOutcome};
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smm_core::{AccountRecord, AccountStore, Side, SignalEvent, SyncConfig};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

// =============================================================================
// Account state
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Unknown,
    Pending,
    Synced,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness of an account for the next round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCheck {
    NotFound,
    Disabled,
    Cooldown,
    Error,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountState {
    pub account_id: String,
    pub enabled: bool,
    pub position_side: Option<Side>,
    pub position_qty: u32,
    pub unrealized_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub last_signal_time: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    /// Why the last round did not place an order, if it didn't.
    pub last_message: Option<String>,
}

impl AccountState {
    #[must_use]
    pub fn new(account_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            account_id: account_id.into(),
            enabled,
            position_side: None,
            position_qty: 0,
            unrealized_pnl: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            last_signal_time: None,
            sync_status: SyncStatus::Unknown,
            last_message: None,
        }
    }
}

/// Named optional updates to an [`AccountState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountPatch {
    pub enabled: Option<bool>,
    /// `Some(None)` marks the account flat.
    pub position_side: Option<Option<Side>>,
    pub position_qty: Option<u32>,
    pub unrealized_pnl: Option<Decimal>,
    pub daily_pnl: Option<Decimal>,
}

impl AccountPatch {
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_position(mut self, side: Option<Side>, qty: u32) -> Self {
        self.position_side = Some(side);
        self.position_qty = Some(qty);
        self
    }

    #[must_use]
    pub fn with_pnl(mut self, unrealized: Decimal, daily: Decimal) -> Self {
        self.unrealized_pnl = Some(unrealized);
        self.daily_pnl = Some(daily);
        self
    }

    fn apply(&self, state: &mut AccountState) {
        if let Some(enabled) = self.enabled {
            state.enabled = enabled;
        }
        if let Some(side) = self.position_side {
            state.position_side = side;
        }
        if let Some(qty) = self.position_qty {
            state.position_qty = qty;
        }
        if let Some(pnl) = self.unrealized_pnl {
            state.unrealized_pnl = pnl;
        }
        if let Some(pnl) = self.daily_pnl {
            state.daily_pnl = pnl;
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatistics {
    pub total_accounts: usize,
    pub enabled_accounts: usize,
    pub sync_groups: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub cooldown_count: usize,
    pub sync_timeout_secs: f64,
    pub sync_cooldown_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountPositionSummary {
    pub position_side: Option<Side>,
    pub position_qty: u32,
    pub unrealized_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub sync_status: SyncStatus,
    pub last_signal_time: Option<DateTime<Utc>>,
}

// =============================================================================
// Manager
// =============================================================================

pub struct AccountSyncManager {
    config: SyncConfig,
    executor: Arc<dyn AccountExecutor>,
    store: Arc<dyn AccountStore>,
    accounts: RwLock<HashMap<String, AccountState>>,
    groups: RwLock<HashMap<String, Vec<String>>>,
}

impl AccountSyncManager {
    /// Build the manager from whatever the store holds.
    ///
    /// # Errors
    /// Returns `SyncError::Store` if the store cannot be read.
    pub fn new(
        config: SyncConfig,
        executor: Arc<dyn AccountExecutor>,
        store: Arc<dyn AccountStore>,
    ) -> Result<Self, SyncError> {
        let persisted = store.load()?;
        let accounts = persisted
            .accounts
            .into_iter()
            .map(|r| (r.account_id.clone(), AccountState::new(r.account_id, r.enabled)))
            .collect::<HashMap<_, _>>();
        info!(
            accounts = accounts.len(),
            groups = persisted.sync_groups.len(),
            "Loaded account sync state"
        );
        Ok(Self {
            config,
            executor,
            store,
            accounts: RwLock::new(accounts),
            groups: RwLock::new(persisted.sync_groups),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ==================== Accounts ====================

    /// Add an account, replacing any existing state for it.
    ///
    /// # Errors
    /// Returns `SyncError::Store` if the record cannot be persisted.
    pub fn add_account(&self, account_id: &str, enabled: bool) -> Result<(), SyncError> {
        self.store.save_account(&AccountRecord {
            account_id: account_id.to_string(),
            enabled,
        })?;
        self.accounts
            .write()
            .insert(account_id.to_string(), AccountState::new(account_id, enabled));
        info!(account = %account_id, enabled, "Account added");
        Ok(())
    }

    /// Remove an account and drop it from every group. Groups left empty are
    /// deleted. Returns whether the account existed.
    ///
    /// # Errors
    /// Returns `SyncError::Store` if the change cannot be persisted.
    pub fn remove_account(&self, account_id: &str) -> Result<bool, SyncError> {
        self.store.remove_account(account_id)?;
        let existed = self.accounts.write().remove(account_id).is_some();

        let groups = {
            let mut groups = self.groups.write();
            for members in groups.values_mut() {
                members.retain(|id| id != account_id);
            }
            groups.retain(|_, members| !members.is_empty());
            groups.clone()
        };
        self.store.save_sync_groups(&groups)?;
        Ok(existed)
    }

    /// # Errors
    /// Returns `AccountNotFound` or `Store`.
    pub fn set_account_enabled(&self, account_id: &str, enabled: bool) -> Result<(), SyncError> {
        self.update_account(account_id, &AccountPatch::default().with_enabled(enabled))
    }

    /// Apply a patch. Enablement changes are persisted.
    ///
    /// # Errors
    /// Returns `AccountNotFound` or `Store`.
    pub fn update_account(&self, account_id: &str, patch: &AccountPatch) -> Result<(), SyncError> {
        let record = {
            let mut accounts = self.accounts.write();
            let state = accounts
                .get_mut(account_id)
                .ok_or_else(|| SyncError::AccountNotFound(account_id.to_string()))?;
            let before = state.enabled;
            patch.apply(state);
            (state.enabled != before).then(|| AccountRecord {
                account_id: account_id.to_string(),
                enabled: state.enabled,
            })
        };
        if let Some(record) = record {
            self.store.save_account(&record)?;
            info!(account = %account_id, enabled = record.enabled, "Account enablement changed");
        }
        Ok(())
    }

    #[must_use]
    pub fn account(&self, account_id: &str) -> Option<AccountState> {
        self.accounts.read().get(account_id).cloned()
    }

    #[must_use]
    pub fn enabled_accounts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .accounts
            .read()
            .values()
            .filter(|a| a.enabled)
            .map(|a| a.account_id.clone())
            .collect();
        ids.sort();
        ids
    }

    // ==================== Sync groups ====================

    /// Create or replace a group. Unknown ids are dropped.
    ///
    /// # Errors
    /// Returns `EmptyGroup` when none of `account_ids` exist, or `Store`.
    pub fn create_sync_group(&self, name: &str, account_ids: &[String]) -> Result<(), SyncError> {
        let valid: Vec<String> = {
            let accounts = self.accounts.read();
            account_ids
                .iter()
                .filter(|id| accounts.contains_key(id.as_str()))
                .cloned()
                .collect()
        };
        if valid.is_empty() {
            warn!(group = %name, "No valid accounts for sync group");
            return Err(SyncError::EmptyGroup(name.to_string()));
        }

        let groups = {
            let mut groups = self.groups.write();
            groups.insert(name.to_string(), valid.clone());
            groups.clone()
        };
        self.store.save_sync_groups(&groups)?;
        info!(group = %name, accounts = valid.len(), "Sync group created");
        Ok(())
    }

    /// # Errors
    /// Returns `GroupNotFound` or `Store`.
    pub fn delete_sync_group(&self, name: &str) -> Result<(), SyncError> {
        let groups = {
            let mut groups = self.groups.write();
            if groups.remove(name).is_none() {
                return Err(SyncError::GroupNotFound(name.to_string()));
            }
            groups.clone()
        };
        self.store.save_sync_groups(&groups)?;
        Ok(())
    }

    /// Members of `name`, empty when the group does not exist.
    #[must_use]
    pub fn sync_group_accounts(&self, name: &str) -> Vec<String> {
        self.groups.read().get(name).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn sync_groups(&self) -> HashMap<String, Vec<String>> {
        self.groups.read().clone()
    }

    /// Groups containing missing or disabled members, with those members.
    #[must_use]
    pub fn validate_sync_groups(&self) -> BTreeMap<String, Vec<String>> {
        let accounts = self.accounts.read();
        self.groups
            .read()
            .iter()
            .filter_map(|(name, members)| {
                let invalid: Vec<String> = members
                    .iter()
                    .filter(|id| !accounts.get(id.as_str()).is_some_and(|a| a.enabled))
                    .cloned()
                    .collect();
                (!invalid.is_empty()).then(|| (name.clone(), invalid))
            })
            .collect()
    }

    // ==================== Synchronization ====================

    fn check_one(&self, state: Option<&AccountState>, now: DateTime<Utc>) -> SyncCheck {
        let Some(state) = state else {
            return SyncCheck::NotFound;
        };
        if !state.enabled {
            return SyncCheck::Disabled;
        }
        if state.sync_status == SyncStatus::Pending {
            return SyncCheck::Cooldown;
        }
        if state
            .last_signal_time
            .is_some_and(|last| now - last < self.config.cooldown())
        {
            return SyncCheck::Cooldown;
        }
        if state.sync_status == SyncStatus::Error {
            return SyncCheck::Error;
        }
        SyncCheck::Ready
    }

    #[must_use]
    pub fn check_sync_status(
        &self,
        account_ids: &[String],
        now: DateTime<Utc>,
    ) -> HashMap<String, SyncCheck> {
        let accounts = self.accounts.read();
        account_ids
            .iter()
            .map(|id| (id.clone(), self.check_one(accounts.get(id), now)))
            .collect()
    }

    /// Execute `signal` on every ready account in `account_ids` concurrently.
    ///
    /// Readiness and cooldown are judged at the signal timestamp. Only
    /// accounts that were dispatched appear in the result: `true` when an
    /// order was placed. A risk rejection still counts as a completed round
    /// (`synced`); an execution error, panic or timeout marks the account
    /// `error`.
    pub async fn synchronize_accounts(
        &self,
        account_ids: &[String],
        signal: &SignalEvent,
    ) -> HashMap<String, bool> {
        let now = signal.timestamp;

        let ready: Vec<String> = {
            let mut accounts = self.accounts.write();
            let ready: Vec<String> = account_ids
                .iter()
                .filter(|id| self.check_one(accounts.get(id.as_str()), now) == SyncCheck::Ready)
                .cloned()
                .collect();
            for id in &ready {
                if let Some(state) = accounts.get_mut(id) {
                    state.sync_status = SyncStatus::Pending;
                    state.last_signal_time = Some(now);
                }
            }
            ready
        };

        if ready.is_empty() {
            warn!(requested = account_ids.len(), "No accounts ready for synchronization");
            return HashMap::new();
        }

        info!(
            accounts = ready.len(),
            side = %signal.side,
            symbol = %signal.symbol,
            "Synchronizing signal across accounts"
        );

        let signal = Arc::new(signal.clone());
        let timeout = self.config.task_timeout();
        let handles: Vec<_> = ready
            .iter()
            .map(|id| {
                let executor = Arc::clone(&self.executor);
                let signal = Arc::clone(&signal);
                let id = id.clone();
                tokio::spawn(async move {
                    tokio::time::timeout(timeout, executor.execute(&id, &signal)).await
                })
            })
            .collect();
        let joined = join_all(handles).await;

        let mut results = HashMap::with_capacity(ready.len());
        let mut accounts = self.accounts.write();
        for (id, joined) in ready.into_iter().zip(joined) {
            let (placed, status, message) = match joined {
                Ok(Ok(Ok(ExecutionOutcome::Submitted(intent)))) => {
                    info!(
                        account = %id,
                        coid = %intent.client_order_id,
                        qty = intent.qty,
                        "Account synced"
                    );
                    (true, SyncStatus::Synced, None)
                }
                Ok(Ok(Ok(ExecutionOutcome::Rejected(reason)))) => {
                    warn!(account = %id, reason = %reason, "Signal rejected for account");
                    (false, SyncStatus::Synced, Some(reason.code().to_string()))
                }
                Ok(Ok(Err(e))) => {
                    error!(account = %id, error = %e, "Signal execution failed");
                    (false, SyncStatus::Error, Some(e.to_string()))
                }
                Ok(Err(_elapsed)) => {
                    error!(
                        account = %id,
                        timeout_secs = timeout.as_secs_f64(),
                        "Signal execution timed out"
                    );
                    (false, SyncStatus::Error, Some("timeout".to_string()))
                }
                Err(join_error) => {
                    error!(account = %id, error = %join_error, "Signal execution task aborted");
                    (false, SyncStatus::Error, Some(join_error.to_string()))
                }
            };
            if let Some(state) = accounts.get_mut(&id) {
                state.sync_status = status;
                state.last_message = message;
            }
            results.insert(id, placed);
        }
        results
    }

    /// [`Self::synchronize_accounts`] over the members of a group.
    ///
    /// # Errors
    /// Returns `GroupNotFound` if the group does not exist.
    pub async fn synchronize_group(
        &self,
        name: &str,
        signal: &SignalEvent,
    ) -> Result<HashMap<String, bool>, SyncError> {
        let members = self
            .groups
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::GroupNotFound(name.to_string()))?;
        Ok(self.synchronize_accounts(&members, signal).await)
    }

    /// Clear the status of one account, or of every account when `None`.
    pub fn reset_account_sync_status(&self, account_id: Option<&str>) {
        let mut accounts = self.accounts.write();
        let reset = |state: &mut AccountState| {
            state.sync_status = SyncStatus::Unknown;
            state.last_message = None;
        };
        match account_id {
            Some(id) => {
                if let Some(state) = accounts.get_mut(id) {
                    reset(state);
                }
            }
            None => accounts.values_mut().for_each(reset),
        }
    }

    // ==================== Reporting ====================

    #[must_use]
    pub fn statistics(&self, now: DateTime<Utc>) -> SyncStatistics {
        let accounts = self.accounts.read();
        let mut status_counts = BTreeMap::new();
        for state in accounts.values() {
            *status_counts
                .entry(state.sync_status.as_str().to_string())
                .or_insert(0) += 1;
        }
        let cooldown = self.config.cooldown();
        SyncStatistics {
            total_accounts: accounts.len(),
            enabled_accounts: accounts.values().filter(|a| a.enabled).count(),
            sync_groups: self.groups.read().len(),
            status_counts,
            cooldown_count: accounts
                .values()
                .filter(|a| a.last_signal_time.is_some_and(|t| now - t < cooldown))
                .count(),
            sync_timeout_secs: self.config.task_timeout_secs,
            sync_cooldown_secs: self.config.sync_cooldown_secs,
        }
    }

    /// Position view of enabled accounts.
    #[must_use]
    pub fn positions_summary(&self) -> BTreeMap<String, AccountPositionSummary> {
        self.accounts
            .read()
            .values()
            .filter(|a| a.enabled)
            .map(|a| {
                (
                    a.account_id.clone(),
                    AccountPositionSummary {
                        position_side: a.position_side,
                        position_qty: a.position_qty,
                        unrealized_pnl: a.unrealized_pnl,
                        daily_pnl: a.daily_pnl,
                        sync_status: a.sync_status,
                        last_signal_time: a.last_signal_time,
                    },
                )
            })
            .collect()
    }
}
