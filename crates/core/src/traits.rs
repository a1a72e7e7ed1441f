use crate::error::{BrokerError, StoreError};
use crate::events::{BrokerOrder, BrokerPosition, MarketEvent, OrderAck, OrderRequest};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Market data collaborator. `Ok(None)` means the feed is exhausted.
#[async_trait]
pub trait MarketDataSource: Send {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>>;
}

/// Broker/order collaborator.
///
/// Implementations own session handling and any vendor-specific field mapping;
/// callers only ever see the normalized records from [`crate::events`].
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError>;

    async fn list_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
}

/// Persisted per-account settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    pub account_id: String,
    pub enabled: bool,
}

/// Direction toggles applied before any signal is dispatched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalFilters {
    pub long_enabled: bool,
    pub short_enabled: bool,
}

impl Default for SignalFilters {
    fn default() -> Self {
        Self {
            long_enabled: true,
            short_enabled: true,
        }
    }
}

/// Everything the store hands back at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    pub accounts: Vec<AccountRecord>,
    pub sync_groups: HashMap<String, Vec<String>>,
    pub filters: Option<SignalFilters>,
}

/// Persistence collaborator: read once at init, written on every mutation.
pub trait AccountStore: Send + Sync {
    /// # Errors
    /// Returns `StoreError` if the backing store cannot be read.
    fn load(&self) -> Result<PersistedState, StoreError>;

    /// # Errors
    /// Returns `StoreError` if the write fails.
    fn save_account(&self, record: &AccountRecord) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if the write fails.
    fn remove_account(&self, account_id: &str) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if the write fails.
    fn save_sync_groups(&self, groups: &HashMap<String, Vec<String>>) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if the write fails.
    fn save_filters(&self, filters: &SignalFilters) -> Result<(), StoreError>;
}
