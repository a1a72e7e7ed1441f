//! Gatekeeper between the signal layer and account synchronization.
//!
//! Each signal passes the direction filters, duplicate suppression, the
//! minimum spacing between dispatches and the per-minute cap before it is
//! fanned out to the target accounts.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use smm_core::{AccountStore, DispatchConfig, Side, SignalEvent, SignalFilters, StoreError};
use smm_execution::{AccountSyncManager, SyncCheck};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RATE_WINDOW_SECS: i64 = 60;

/// Why a signal never reached the accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchRejection {
    LongDisabled,
    ShortDisabled,
    Duplicate,
    Cooldown,
    RateCapped,
    NoAccounts,
    /// Every target is cooling down, disabled or in error.
    NoReadyAccounts,
}

impl DispatchRejection {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::LongDisabled => "long_disabled",
            Self::ShortDisabled => "short_disabled",
            Self::Duplicate => "duplicate",
            Self::Cooldown => "cooldown",
            Self::RateCapped => "rate_capped",
            Self::NoAccounts => "no_accounts",
            Self::NoReadyAccounts => "no_ready_accounts",
        }
    }
}

impl fmt::Display for DispatchRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DispatchOutcome {
    /// Fanned out; `true` per account that placed an order.
    Dispatched(BTreeMap<String, bool>),
    Rejected(DispatchRejection),
}

impl DispatchOutcome {
    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched(_))
    }

    /// Accounts that placed an order.
    #[must_use]
    pub fn placed(&self) -> usize {
        match self {
            Self::Dispatched(results) => results.values().filter(|ok| **ok).count(),
            Self::Rejected(_) => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub filters: SignalFilters,
    pub total_processed: u64,
    pub total_rejected: u64,
    pub rejections: BTreeMap<String, u64>,
    pub recent_signals: usize,
    pub last_processed: Option<DateTime<Utc>>,
    pub max_signals_per_minute: usize,
    pub cooldown_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignalKey {
    source: String,
    symbol: String,
    side: Side,
    timestamp: DateTime<Utc>,
}

impl SignalKey {
    fn of(signal: &SignalEvent) -> Self {
        Self {
            source: signal.source.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            timestamp: signal.timestamp,
        }
    }
}

pub struct SignalDispatcher {
    config: DispatchConfig,
    filters: SignalFilters,
    store: Arc<dyn AccountStore>,
    sync: Arc<AccountSyncManager>,
    seen: HashSet<SignalKey>,
    recent: VecDeque<DateTime<Utc>>,
    last_processed: Option<DateTime<Utc>>,
    total_processed: u64,
    rejections: HashMap<DispatchRejection, u64>,
}

impl SignalDispatcher {
    /// Persisted filters win over the configured defaults.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be read.
    pub fn new(
        config: DispatchConfig,
        store: Arc<dyn AccountStore>,
        sync: Arc<AccountSyncManager>,
    ) -> Result<Self, StoreError> {
        let filters = store.load()?.filters.unwrap_or(SignalFilters {
            long_enabled: config.long_enabled,
            short_enabled: config.short_enabled,
        });
        info!(
            long = filters.long_enabled,
            short = filters.short_enabled,
            "Signal filters loaded"
        );
        Ok(Self {
            config,
            filters,
            store,
            sync,
            seen: HashSet::new(),
            recent: VecDeque::new(),
            last_processed: None,
            total_processed: 0,
            rejections: HashMap::new(),
        })
    }

    #[must_use]
    pub const fn filters(&self) -> SignalFilters {
        self.filters
    }

    /// Persist then apply new direction filters.
    ///
    /// # Errors
    /// Returns `StoreError` if the filters cannot be saved; the old filters
    /// stay active.
    pub fn update_filters(&mut self, filters: SignalFilters) -> Result<(), StoreError> {
        self.store.save_filters(&filters)?;
        self.filters = filters;
        info!(
            long = filters.long_enabled,
            short = filters.short_enabled,
            "Signal filters updated"
        );
        Ok(())
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = now - Duration::seconds(RATE_WINDOW_SECS);
        while self.recent.front().is_some_and(|t| *t <= horizon) {
            self.recent.pop_front();
        }
        // Older repeats are already stopped by the cooldown.
        self.seen.retain(|key| key.timestamp > horizon);
    }

    /// Every admission check, in order. Returns the target accounts.
    fn admit(&mut self, signal: &SignalEvent) -> Result<Vec<String>, DispatchRejection> {
        match signal.side {
            Side::Buy if !self.filters.long_enabled => return Err(DispatchRejection::LongDisabled),
            Side::Sell if !self.filters.short_enabled => {
                return Err(DispatchRejection::ShortDisabled)
            }
            _ => {}
        }

        if self.seen.contains(&SignalKey::of(signal)) {
            return Err(DispatchRejection::Duplicate);
        }

        let now = signal.timestamp;
        if self
            .last_processed
            .is_some_and(|last| now - last < self.config.cooldown())
        {
            return Err(DispatchRejection::Cooldown);
        }

        self.prune(now);
        if self.recent.len() >= self.config.max_signals_per_minute {
            return Err(DispatchRejection::RateCapped);
        }

        let targets = match &self.config.sync_group {
            Some(group) => self.sync.sync_group_accounts(group),
            None => self.sync.enabled_accounts(),
        };
        if targets.is_empty() {
            return Err(DispatchRejection::NoAccounts);
        }

        let checks = self.sync.check_sync_status(&targets, now);
        if !checks.values().any(|check| *check == SyncCheck::Ready) {
            debug!(?checks, "No target account ready");
            return Err(DispatchRejection::NoReadyAccounts);
        }
        Ok(targets)
    }

    /// Filter `signal` and, if admitted, synchronize it across the target
    /// accounts. Time checks use the signal timestamp.
    pub async fn dispatch(&mut self, signal: &SignalEvent) -> DispatchOutcome {
        let targets = match self.admit(signal) {
            Ok(targets) => targets,
            Err(reason) => {
                *self.rejections.entry(reason).or_insert(0) += 1;
                debug!(
                    reason = %reason,
                    side = %signal.side,
                    source = %signal.source,
                    "Signal not dispatched"
                );
                return DispatchOutcome::Rejected(reason);
            }
        };

        let now = signal.timestamp;
        self.seen.insert(SignalKey::of(signal));
        self.recent.push_back(now);
        self.last_processed = Some(now);
        self.total_processed += 1;

        info!(
            side = %signal.side,
            symbol = %signal.symbol,
            source = %signal.source,
            confidence = signal.confidence,
            accounts = targets.len(),
            "Dispatching signal"
        );
        let results: BTreeMap<String, bool> = self
            .sync
            .synchronize_accounts(&targets, signal)
            .await
            .into_iter()
            .collect();
        let placed = results.values().filter(|ok| **ok).count();
        if placed < results.len() {
            warn!(placed, dispatched = results.len(), "Signal placed on a subset of accounts");
        }
        DispatchOutcome::Dispatched(results)
    }

    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> DispatchStats {
        let horizon = now - Duration::seconds(RATE_WINDOW_SECS);
        DispatchStats {
            filters: self.filters,
            total_processed: self.total_processed,
            total_rejected: self.rejections.values().sum(),
            rejections: self
                .rejections
                .iter()
                .map(|(reason, count)| (reason.code().to_string(), *count))
                .collect(),
            recent_signals: self.recent.iter().filter(|t| **t > horizon).count(),
            last_processed: self.last_processed,
            max_signals_per_minute: self.config.max_signals_per_minute,
            cooldown_secs: self.config.dispatch_cooldown_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use smm_core::SyncConfig;
    use smm_execution::{
        AccountExecutor, ExecutionError, ExecutionOutcome, MemoryAccountStore, RejectReason,
    };

    struct RejectAll;

    #[async_trait]
    impl AccountExecutor for RejectAll {
        async fn execute(
            &self,
            _account_id: &str,
            _signal: &SignalEvent,
        ) -> Result<ExecutionOutcome, ExecutionError> {
            Ok(ExecutionOutcome::Rejected(RejectReason::RateLimited))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap()
    }

    fn signal(side: Side, secs: i64) -> SignalEvent {
        SignalEvent {
            symbol: "NQH5".to_string(),
            side,
            price: 20_000.0,
            signal_price: None,
            confidence: 0.7,
            atr: 10.0,
            reason: "test".to_string(),
            source: "1m".to_string(),
            timestamp: t0() + Duration::seconds(secs),
        }
    }

    fn dispatcher(
        config: DispatchConfig,
        accounts: &[&str],
    ) -> (SignalDispatcher, Arc<MemoryAccountStore>) {
        dispatcher_with_sync_cooldown(config, 0.0, accounts)
    }

    fn dispatcher_with_sync_cooldown(
        config: DispatchConfig,
        sync_cooldown_secs: f64,
        accounts: &[&str],
    ) -> (SignalDispatcher, Arc<MemoryAccountStore>) {
        let store = Arc::new(MemoryAccountStore::new());
        let sync_config = SyncConfig {
            sync_cooldown_secs,
            ..SyncConfig::default()
        };
        let sync = Arc::new(
            AccountSyncManager::new(sync_config, Arc::new(RejectAll), store.clone()).unwrap(),
        );
        for id in accounts {
            sync.add_account(id, true).unwrap();
        }
        let dispatcher = SignalDispatcher::new(config, store.clone(), sync).unwrap();
        (dispatcher, store)
    }

    // ==================== Filter Tests ====================

    #[tokio::test]
    async fn test_direction_filters() {
        let (mut dispatcher, store) = dispatcher(DispatchConfig::default(), &["A"]);
        dispatcher
            .update_filters(SignalFilters {
                long_enabled: false,
                short_enabled: true,
            })
            .unwrap();
        assert_eq!(store.snapshot().filters.map(|f| f.long_enabled), Some(false));

        assert_eq!(
            dispatcher.dispatch(&signal(Side::Buy, 0)).await,
            DispatchOutcome::Rejected(DispatchRejection::LongDisabled)
        );
        assert!(dispatcher.dispatch(&signal(Side::Sell, 0)).await.is_dispatched());
    }

    #[tokio::test]
    async fn test_persisted_filters_override_config() {
        let store = Arc::new(MemoryAccountStore::new());
        store
            .save_filters(&SignalFilters {
                long_enabled: true,
                short_enabled: false,
            })
            .unwrap();
        let sync = Arc::new(
            AccountSyncManager::new(SyncConfig::default(), Arc::new(RejectAll), store.clone())
                .unwrap(),
        );
        let dispatcher = SignalDispatcher::new(DispatchConfig::default(), store, sync).unwrap();
        assert!(!dispatcher.filters().short_enabled);
    }

    // ==================== Throttle Tests ====================

    #[tokio::test]
    async fn test_duplicate_then_cooldown() {
        let (mut dispatcher, _) = dispatcher(DispatchConfig::default(), &["A"]);
        let outcome = dispatcher.dispatch(&signal(Side::Buy, 0)).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched(BTreeMap::from([("A".to_string(), false)]))
        );
        assert_eq!(outcome.placed(), 0);

        assert_eq!(
            dispatcher.dispatch(&signal(Side::Buy, 0)).await,
            DispatchOutcome::Rejected(DispatchRejection::Duplicate)
        );
        assert_eq!(
            dispatcher.dispatch(&signal(Side::Buy, 3)).await,
            DispatchOutcome::Rejected(DispatchRejection::Cooldown)
        );
        assert!(dispatcher.dispatch(&signal(Side::Buy, 5)).await.is_dispatched());
    }

    #[tokio::test]
    async fn test_rate_cap() {
        let config = DispatchConfig {
            dispatch_cooldown_secs: 0.0,
            max_signals_per_minute: 2,
            ..DispatchConfig::default()
        };
        let (mut dispatcher, _) = dispatcher(config, &["A"]);
        assert!(dispatcher.dispatch(&signal(Side::Buy, 0)).await.is_dispatched());
        assert!(dispatcher.dispatch(&signal(Side::Buy, 1)).await.is_dispatched());
        assert_eq!(
            dispatcher.dispatch(&signal(Side::Buy, 2)).await,
            DispatchOutcome::Rejected(DispatchRejection::RateCapped)
        );
        // the first entry has left the window
        assert!(dispatcher.dispatch(&signal(Side::Buy, 60)).await.is_dispatched());

        let stats = dispatcher.stats(t0() + Duration::seconds(60));
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.total_rejected, 1);
        assert_eq!(stats.rejections["rate_capped"], 1);
        assert_eq!(stats.recent_signals, 2);
    }

    // ==================== Target Tests ====================

    #[tokio::test]
    async fn test_no_accounts() {
        let (mut dispatcher, _) = dispatcher(DispatchConfig::default(), &[]);
        assert_eq!(
            dispatcher.dispatch(&signal(Side::Buy, 0)).await,
            DispatchOutcome::Rejected(DispatchRejection::NoAccounts)
        );
        assert_eq!(dispatcher.stats(t0()).total_processed, 0);
    }

    #[tokio::test]
    async fn test_no_ready_accounts_is_not_charged() {
        let config = DispatchConfig {
            dispatch_cooldown_secs: 0.0,
            ..DispatchConfig::default()
        };
        let (mut dispatcher, _) = dispatcher_with_sync_cooldown(config, 30.0, &["A"]);
        assert!(dispatcher.dispatch(&signal(Side::Buy, 0)).await.is_dispatched());

        // A is still in its sync cooldown
        assert_eq!(
            dispatcher.dispatch(&signal(Side::Buy, 10)).await,
            DispatchOutcome::Rejected(DispatchRejection::NoReadyAccounts)
        );
        // not remembered as seen, so a resend is judged again
        assert_eq!(
            dispatcher.dispatch(&signal(Side::Buy, 10)).await,
            DispatchOutcome::Rejected(DispatchRejection::NoReadyAccounts)
        );

        let stats = dispatcher.stats(t0() + Duration::seconds(10));
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.recent_signals, 1);
        assert_eq!(stats.last_processed, Some(t0()));
        assert_eq!(stats.rejections["no_ready_accounts"], 2);

        assert!(dispatcher.dispatch(&signal(Side::Buy, 30)).await.is_dispatched());
    }

    #[tokio::test]
    async fn test_sync_group_targets() {
        let config = DispatchConfig {
            sync_group: Some("main".to_string()),
            ..DispatchConfig::default()
        };
        let (mut dispatcher, _) = dispatcher(config, &["A", "B"]);
        dispatcher
            .sync
            .create_sync_group("main", &["B".to_string()])
            .unwrap();

        let outcome = dispatcher.dispatch(&signal(Side::Sell, 0)).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Dispatched(BTreeMap::from([("B".to_string(), false)]))
        );
    }
}
