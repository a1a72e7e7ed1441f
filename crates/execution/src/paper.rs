//! In-process broker for paper trading and tests.
//!
//! Orders are acknowledged immediately and rest as working orders until
//! [`PaperBroker::drain_fills`] fills them at a supplied price. Positions
//! follow the fills. Accounts can be set to reject every submission.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use smm_core::{
    BrokerClient, BrokerError, BrokerOrder, BrokerPosition, FillEvent, OrderAck, OrderRequest,
};
use std::collections::HashMap;

#[derive(Debug, Default)]
struct PaperState {
    next_id: u64,
    submitted: Vec<OrderRequest>,
    working: Vec<BrokerOrder>,
    positions: HashMap<(String, String), i64>,
    rejected_accounts: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

impl PaperBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every submission for `account_id` with `reason`.
    pub fn reject_account(&self, account_id: impl Into<String>, reason: impl Into<String>) {
        self.state
            .lock()
            .rejected_accounts
            .insert(account_id.into(), reason.into());
    }

    pub fn accept_account(&self, account_id: &str) {
        self.state.lock().rejected_accounts.remove(account_id);
    }

    /// Every request the broker accepted, in arrival order.
    #[must_use]
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.state.lock().submitted.clone()
    }

    /// Replace the working-order listing.
    pub fn set_working_orders(&self, orders: Vec<BrokerOrder>) {
        self.state.lock().working = orders;
    }

    /// Replace the position listing.
    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        self.state.lock().positions = positions
            .into_iter()
            .map(|p| ((p.account_id, p.symbol), p.net_qty))
            .collect();
    }

    /// Move a position by `delta` contracts, e.g. when a bracket closes it.
    pub fn adjust_position(&self, account_id: &str, symbol: &str, delta: i64) {
        let mut state = self.state.lock();
        let key = (account_id.to_string(), symbol.to_string());
        let net = state.positions.get(&key).copied().unwrap_or(0) + delta;
        if net == 0 {
            state.positions.remove(&key);
        } else {
            state.positions.insert(key, net);
        }
    }

    /// Fill every working order at `price`.
    pub fn drain_fills(&self, price: f64, timestamp: DateTime<Utc>) -> Vec<FillEvent> {
        let mut state = self.state.lock();
        let working = std::mem::take(&mut state.working);
        let mut fills = Vec::with_capacity(working.len());
        for order in working {
            *state
                .positions
                .entry((order.account_id.clone(), order.symbol.clone()))
                .or_insert(0) += i64::from(order.qty) * order.side.sign();
            fills.push(FillEvent {
                account_id: order.account_id,
                client_order_id: order.client_order_id,
                qty: order.qty,
                price,
                timestamp,
            });
        }
        fills
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.rejected_accounts.get(&order.account_id) {
            return Err(BrokerError::Rejected {
                reason: reason.clone(),
            });
        }

        state.next_id += 1;
        let broker_order_id = format!("paper-{}", state.next_id);
        state.submitted.push(order.clone());
        state.working.push(BrokerOrder {
            account_id: order.account_id.clone(),
            client_order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            qty: order.qty,
        });

        Ok(OrderAck {
            client_order_id: order.client_order_id.clone(),
            broker_order_id,
            accepted_at: Utc::now(),
        })
    }

    async fn list_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        Ok(self.state.lock().working.clone())
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let state = self.state.lock();
        let mut positions: Vec<BrokerPosition> = state
            .positions
            .iter()
            .map(|((account_id, symbol), net_qty)| BrokerPosition {
                account_id: account_id.clone(),
                symbol: symbol.clone(),
                net_qty: *net_qty,
            })
            .collect();
        positions.sort_by(|a, b| (&a.account_id, &a.symbol).cmp(&(&b.account_id, &b.symbol)));
        Ok(positions)
    }
}
