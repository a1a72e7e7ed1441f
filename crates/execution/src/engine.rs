//! Per-account order execution.
//!
//! The engine owns one [`AccountBook`] per account: risk state plus the
//! open-order table. Each book sits behind its own mutex so accounts never
//! serialize on each other; the outer map lock is only held for lookups and
//! no lock is held across a broker call.

use crate::brackets::{calculate_bracket, Bracket};
use crate::error::ExecutionError;
use crate::exits::{check_exit_conditions, ExitReason, ExitTracking};
use crate::risk::{AccountRisk, RejectReason, RiskGate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use smm_core::{
    calculate_contract_size, AppConfig, BracketConfig, BrokerClient, ExitConfig, FillEvent,
    OrderRequest, RiskConfig, Side, SignalEvent, SizingConfig, TradingWindowConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

// =============================================================================
// Settings
// =============================================================================

/// The configuration sections the engine reads.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSettings {
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub bracket: BracketConfig,
    pub exit: ExitConfig,
    pub trading_window: TradingWindowConfig,
}

impl ExecutionSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            risk: config.risk.clone(),
            sizing: config.sizing.clone(),
            bracket: config.bracket.clone(),
            exit: config.exit.clone(),
            trading_window: config.trading_window.clone(),
        }
    }

    #[must_use]
    pub fn with_risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    #[must_use]
    pub fn with_sizing(mut self, sizing: SizingConfig) -> Self {
        self.sizing = sizing;
        self
    }
}

// =============================================================================
// Order intents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Created locally, broker has not acknowledged it.
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
}

/// An order that passed every risk gate.
#[derive(Debug, Clone, Serialize)]
pub struct OrderIntent {
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: u32,
    pub client_order_id: String,
    pub target_ticks: u32,
    pub stop_ticks: u32,
    pub confidence_score: f64,
    pub atr_value: f64,
    pub entry_price: f64,
    pub exit: ExitTracking,
    pub status: IntentStatus,
    pub broker_order_id: Option<String>,
    pub filled_qty: u32,
    pub avg_fill_price: Option<f64>,
    /// Last broker failure. The intent stays pending; nothing retries it.
    pub last_error: Option<String>,
}

impl OrderIntent {
    fn to_request(&self) -> OrderRequest {
        OrderRequest {
            account_id: self.account_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            qty: self.qty,
            client_order_id: self.client_order_id.clone(),
            target_ticks: self.target_ticks,
            stop_ticks: self.stop_ticks,
        }
    }

    /// Open P&L of the filled quantity at `price`.
    #[must_use]
    pub fn unrealized_pnl(&self, price: f64, tick_size: f64, tick_value: Decimal) -> Decimal {
        let Some(avg) = self.avg_fill_price else {
            return Decimal::ZERO;
        };
        if self.filled_qty == 0 || tick_size <= 0.0 {
            return Decimal::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let ticks = (price - avg) * self.side.sign() as f64 / tick_size;
        let ticks = Decimal::from_f64_retain(ticks)
            .unwrap_or(Decimal::ZERO)
            .round_dp(2);
        ticks * tick_value * Decimal::from(self.filled_qty)
    }
}

fn new_client_order_id(account_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{account_id}-{}", &suffix[..12])
}

/// Result of running one signal through one account.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Submitted(OrderIntent),
    Rejected(RejectReason),
}

impl ExecutionOutcome {
    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted(_))
    }
}

/// Capability the sync manager invokes once per account.
#[async_trait]
pub trait AccountExecutor: Send + Sync {
    async fn execute(
        &self,
        account_id: &str,
        signal: &SignalEvent,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

// =============================================================================
// Summaries
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ActivePosition {
    pub account_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: u32,
    pub filled_qty: u32,
    pub status: IntentStatus,
    pub entry_time: DateTime<Utc>,
    pub minutes_in_position: f64,
    pub target_ticks: u32,
    pub stop_ticks: u32,
    pub confidence_score: f64,
    pub atr_value: f64,
    pub breakeven_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub enabled: bool,
    pub position: i64,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub kill_switch: bool,
    pub open_orders: usize,
}

/// An exit condition that fired for an open intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitSignal {
    pub account_id: String,
    pub client_order_id: String,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub accounts: usize,
    pub orders: usize,
    /// Local intents the broker no longer reports.
    pub dropped: usize,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug)]
struct AccountBook {
    risk: AccountRisk,
    orders: HashMap<String, OrderIntent>,
}

pub struct ExecutionEngine {
    settings: ExecutionSettings,
    gate: RiskGate,
    broker: Arc<dyn BrokerClient>,
    books: RwLock<HashMap<String, Arc<Mutex<AccountBook>>>>,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(settings: ExecutionSettings, broker: Arc<dyn BrokerClient>) -> Self {
        let gate = RiskGate::new(settings.risk.clone(), settings.trading_window.clone());
        Self {
            settings,
            gate,
            broker,
            books: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Register an account, or update its enabled flag if already known.
    pub fn register_account(&self, account_id: impl Into<String>, enabled: bool) {
        let account_id = account_id.into();
        let mut books = self.books.write();
        if let Some(book) = books.get(&account_id) {
            book.lock().risk.enabled = enabled;
            return;
        }
        info!(account = %account_id, enabled, "Registered execution account");
        books.insert(
            account_id,
            Arc::new(Mutex::new(AccountBook {
                risk: AccountRisk::new(&self.settings.risk, enabled),
                orders: HashMap::new(),
            })),
        );
    }

    pub fn remove_account(&self, account_id: &str) -> bool {
        self.books.write().remove(account_id).is_some()
    }

    #[must_use]
    pub fn accounts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.books.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn book(&self, account_id: &str) -> Result<Arc<Mutex<AccountBook>>, ExecutionError> {
        self.books
            .read()
            .get(account_id)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownAccount(account_id.to_string()))
    }

    /// # Errors
    /// Returns `UnknownAccount` if the account is not registered.
    pub fn set_account_enabled(
        &self,
        account_id: &str,
        enabled: bool,
    ) -> Result<(), ExecutionError> {
        self.book(account_id)?.lock().risk.enabled = enabled;
        Ok(())
    }

    /// Size the order, run the risk gates and record a pending intent.
    ///
    /// Time-dependent gates use the signal timestamp, so a replay sees the
    /// same decisions a live session would have.
    ///
    /// # Errors
    /// Returns `UnknownAccount` if the account is not registered.
    pub fn prepare_order(
        &self,
        account_id: &str,
        signal: &SignalEvent,
    ) -> Result<Result<OrderIntent, RejectReason>, ExecutionError> {
        let book = self.book(account_id)?;
        let now = signal.timestamp;

        let qty = calculate_contract_size(
            &self.settings.sizing,
            &self.settings.risk,
            account_id,
            signal.confidence,
            signal.atr,
            signal.price,
        );
        let Bracket {
            target_ticks,
            stop_ticks,
            mode,
        } = calculate_bracket(
            &self.settings.bracket,
            signal.price,
            signal.side,
            signal.atr,
            signal.signal_price,
        );

        let mut book = book.lock();
        if let Err(reason) = self.gate.check(account_id, &mut book.risk, signal.side, qty, now) {
            warn!(
                account = %account_id,
                reason = %reason,
                side = %signal.side,
                qty,
                "Order vetoed"
            );
            return Ok(Err(reason));
        }
        if qty == 0 {
            warn!(account = %account_id, "Order vetoed: zero quantity");
            return Ok(Err(RejectReason::ZeroQuantity));
        }

        let intent = OrderIntent {
            account_id: account_id.to_string(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            qty,
            client_order_id: new_client_order_id(account_id),
            target_ticks,
            stop_ticks,
            confidence_score: signal.confidence,
            atr_value: signal.atr,
            entry_price: signal.price,
            exit: ExitTracking::new(&self.settings.exit, now),
            status: IntentStatus::Pending,
            broker_order_id: None,
            filled_qty: 0,
            avg_fill_price: None,
            last_error: None,
        };
        book.risk.rate.record(now);
        book.orders
            .insert(intent.client_order_id.clone(), intent.clone());

        debug!(
            account = %account_id,
            coid = %intent.client_order_id,
            qty,
            target_ticks,
            stop_ticks,
            ?mode,
            "Order intent created"
        );
        Ok(Ok(intent))
    }

    /// Run a signal through the gates and submit the resulting order.
    ///
    /// A broker failure leaves the intent pending with the error recorded and
    /// is reported as `Err`; nothing retries it.
    ///
    /// # Errors
    /// Returns `UnknownAccount` or `Submission`.
    pub async fn submit_signal(
        &self,
        account_id: &str,
        signal: &SignalEvent,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let mut intent = match self.prepare_order(account_id, signal)? {
            Ok(intent) => intent,
            Err(reason) => return Ok(ExecutionOutcome::Rejected(reason)),
        };

        let request = intent.to_request();
        let result = self.broker.submit_order(&request).await;

        let book = self.book(account_id)?;
        let mut book = book.lock();
        match result {
            Ok(ack) => {
                info!(
                    account = %account_id,
                    coid = %ack.client_order_id,
                    broker_id = %ack.broker_order_id,
                    side = %request.side,
                    qty = request.qty,
                    "Order submitted"
                );
                if let Some(local) = book.orders.get_mut(&request.client_order_id) {
                    if local.status == IntentStatus::Pending {
                        local.status = IntentStatus::Submitted;
                    }
                    local.broker_order_id = Some(ack.broker_order_id.clone());
                    intent = local.clone();
                } else {
                    intent.status = IntentStatus::Submitted;
                    intent.broker_order_id = Some(ack.broker_order_id);
                }
                Ok(ExecutionOutcome::Submitted(intent))
            }
            Err(source) => {
                warn!(
                    account = %account_id,
                    coid = %request.client_order_id,
                    error = %source,
                    "Order submission failed"
                );
                if let Some(local) = book.orders.get_mut(&request.client_order_id) {
                    local.last_error = Some(source.to_string());
                }
                Err(ExecutionError::Submission {
                    account_id: account_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Apply a fill to its intent and the account position.
    ///
    /// # Errors
    /// Returns `UnknownAccount` or `UnknownOrder`.
    pub fn on_fill(&self, fill: &FillEvent) -> Result<(), ExecutionError> {
        let book = self.book(&fill.account_id)?;
        let mut book = book.lock();

        let (side, applied) = {
            let intent = book.orders.get_mut(&fill.client_order_id).ok_or_else(|| {
                ExecutionError::UnknownOrder {
                    account_id: fill.account_id.clone(),
                    client_order_id: fill.client_order_id.clone(),
                }
            })?;

            let remaining = intent.qty.saturating_sub(intent.filled_qty);
            let applied = fill.qty.min(remaining);
            if applied > 0 {
                let prev = f64::from(intent.filled_qty);
                let add = f64::from(applied);
                let avg = intent
                    .avg_fill_price
                    .map_or(fill.price, |avg| (avg * prev + fill.price * add) / (prev + add));
                intent.avg_fill_price = Some(avg);
                intent.filled_qty += applied;
            }
            intent.status = if intent.filled_qty >= intent.qty {
                IntentStatus::Filled
            } else {
                IntentStatus::PartiallyFilled
            };
            (intent.side, applied)
        };

        book.risk.position += i64::from(applied) * side.sign();
        info!(
            account = %fill.account_id,
            coid = %fill.client_order_id,
            qty = applied,
            price = fill.price,
            position = book.risk.position,
            "Fill applied"
        );
        Ok(())
    }

    /// Remove an intent from the open-order table.
    pub fn close_intent(&self, account_id: &str, client_order_id: &str) -> Option<OrderIntent> {
        let book = self.book(account_id).ok()?;
        let removed = book.lock().orders.remove(client_order_id);
        removed
    }

    /// Record broker-reported P&L. Returns `true` when this update tripped
    /// the drawdown kill-switch.
    ///
    /// # Errors
    /// Returns `UnknownAccount` if the account is not registered.
    pub fn update_account_pnl(
        &self,
        account_id: &str,
        realized: Option<Decimal>,
        unrealized: Option<Decimal>,
    ) -> Result<bool, ExecutionError> {
        let book = self.book(account_id)?;
        let mut book = book.lock();
        let tripped = book.risk.drawdown.update(realized, unrealized);
        if tripped {
            warn!(
                account = %account_id,
                realized = %book.risk.drawdown.realized_pnl(),
                "Daily drawdown breached, account disabled until reset"
            );
        }
        Ok(tripped)
    }

    /// # Errors
    /// Returns `UnknownAccount` if the account is not registered.
    pub fn update_account_position(
        &self,
        account_id: &str,
        position: i64,
    ) -> Result<(), ExecutionError> {
        self.book(account_id)?.lock().risk.position = position;
        Ok(())
    }

    /// # Errors
    /// Returns `UnknownAccount` if the account is not registered.
    pub fn reset_kill_switch(&self, account_id: &str) -> Result<(), ExecutionError> {
        self.book(account_id)?.lock().risk.drawdown.reset();
        info!(account = %account_id, "Drawdown kill-switch reset");
        Ok(())
    }

    #[must_use]
    pub fn is_kill_switch_active(&self, account_id: &str) -> bool {
        self.book(account_id).is_ok_and(|book| {
            let book = book.lock();
            book.risk.drawdown.is_tripped()
        })
    }

    #[must_use]
    pub fn position(&self, account_id: &str) -> Option<i64> {
        let book = self.book(account_id).ok()?;
        let position = book.lock().risk.position;
        Some(position)
    }

    /// # Errors
    /// Returns `UnknownAccount` or `UnknownOrder`.
    pub fn update_position_momentum(
        &self,
        account_id: &str,
        client_order_id: &str,
        momentum_score: f64,
    ) -> Result<(), ExecutionError> {
        let book = self.book(account_id)?;
        let mut book = book.lock();
        let intent = book
            .orders
            .get_mut(client_order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder {
                account_id: account_id.to_string(),
                client_order_id: client_order_id.to_string(),
            })?;
        intent.exit.momentum_score = Some(momentum_score);
        Ok(())
    }

    /// Score every filled intent on `symbol` from bar order flow: the
    /// aggressive-buy ratio for longs, its complement for shorts. Returns the
    /// number of intents scored.
    pub fn apply_flow_momentum(&self, symbol: &str, aggressive_buy_ratio: f64) -> usize {
        let buy_ratio = aggressive_buy_ratio.clamp(0.0, 1.0);
        let books: Vec<Arc<Mutex<AccountBook>>> = self.books.read().values().cloned().collect();

        let mut scored = 0;
        for book in books {
            let mut book = book.lock();
            for intent in book.orders.values_mut() {
                if intent.filled_qty == 0 || intent.symbol != symbol {
                    continue;
                }
                intent.exit.momentum_score = Some(match intent.side {
                    Side::Buy => buy_ratio,
                    Side::Sell => 1.0 - buy_ratio,
                });
                scored += 1;
            }
        }
        scored
    }

    /// Evaluate exit conditions for one intent at `price`.
    ///
    /// # Errors
    /// Returns `UnknownAccount` or `UnknownOrder`.
    pub fn check_exit_conditions(
        &self,
        account_id: &str,
        client_order_id: &str,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<ExitReason>, ExecutionError> {
        let book = self.book(account_id)?;
        let mut book = book.lock();
        let intent = book
            .orders
            .get_mut(client_order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder {
                account_id: account_id.to_string(),
                client_order_id: client_order_id.to_string(),
            })?;
        Ok(self.evaluate_exit(intent, price, now))
    }

    fn evaluate_exit(
        &self,
        intent: &mut OrderIntent,
        price: f64,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        let pnl = intent.unrealized_pnl(
            price,
            self.settings.bracket.tick_size,
            self.settings.exit.tick_value,
        );
        check_exit_conditions(&self.settings.exit, &mut intent.exit, pnl, now)
    }

    /// Check every filled intent of every account at `price`.
    #[must_use]
    pub fn scan_exits(&self, price: f64, now: DateTime<Utc>) -> Vec<ExitSignal> {
        let books: Vec<(String, Arc<Mutex<AccountBook>>)> = self
            .books
            .read()
            .iter()
            .map(|(id, book)| (id.clone(), Arc::clone(book)))
            .collect();

        let mut exits = Vec::new();
        for (account_id, book) in books {
            let mut book = book.lock();
            for intent in book.orders.values_mut() {
                if intent.filled_qty == 0 {
                    continue;
                }
                if let Some(reason) = self.evaluate_exit(intent, price, now) {
                    exits.push(ExitSignal {
                        account_id: account_id.clone(),
                        client_order_id: intent.client_order_id.clone(),
                        reason,
                    });
                }
            }
        }
        exits.sort_by(|a, b| {
            (&a.account_id, &a.client_order_id).cmp(&(&b.account_id, &b.client_order_id))
        });
        exits
    }

    #[must_use]
    pub fn open_intents(&self, account_id: &str) -> Vec<OrderIntent> {
        let Ok(book) = self.book(account_id) else {
            return Vec::new();
        };
        let mut intents: Vec<OrderIntent> = book.lock().orders.values().cloned().collect();
        intents.sort_by(|a, b| a.exit.entry_time.cmp(&b.exit.entry_time));
        intents
    }

    #[must_use]
    pub fn account_snapshot(&self, account_id: &str) -> Option<AccountSnapshot> {
        let book = self.book(account_id).ok()?;
        let book = book.lock();
        Some(AccountSnapshot {
            account_id: account_id.to_string(),
            enabled: book.risk.enabled,
            position: book.risk.position,
            realized_pnl: book.risk.drawdown.realized_pnl(),
            unrealized_pnl: book.risk.drawdown.unrealized_pnl(),
            kill_switch: book.risk.drawdown.is_tripped(),
            open_orders: book.orders.len(),
        })
    }

    /// Every open intent across accounts, for monitoring.
    #[must_use]
    pub fn active_positions_summary(&self, now: DateTime<Utc>) -> Vec<ActivePosition> {
        let mut summary = Vec::new();
        for account_id in self.accounts() {
            for intent in self.open_intents(&account_id) {
                #[allow(clippy::cast_precision_loss)]
                let minutes = (now - intent.exit.entry_time).num_seconds() as f64 / 60.0;
                summary.push(ActivePosition {
                    account_id: intent.account_id,
                    client_order_id: intent.client_order_id,
                    symbol: intent.symbol,
                    side: intent.side,
                    qty: intent.qty,
                    filled_qty: intent.filled_qty,
                    status: intent.status,
                    entry_time: intent.exit.entry_time,
                    minutes_in_position: minutes,
                    target_ticks: intent.target_ticks,
                    stop_ticks: intent.stop_ticks,
                    confidence_score: intent.confidence_score,
                    atr_value: intent.atr_value,
                    breakeven_at: intent.exit.breakeven_at,
                });
            }
        }
        summary
    }

    /// Replace every known account's open orders and position with the
    /// broker's listings.
    ///
    /// Local state is stale after a disconnect, so nothing is merged: intents
    /// the broker no longer reports are dropped and accounts missing from the
    /// position listing are flat. Exit bookkeeping is kept for orders that
    /// survive.
    ///
    /// # Errors
    /// Returns `Reconcile` if either listing fails; local state is untouched.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport, ExecutionError> {
        let (orders, positions) =
            tokio::join!(self.broker.list_orders(), self.broker.list_positions());
        let orders = orders.map_err(ExecutionError::Reconcile)?;
        let positions = positions.map_err(ExecutionError::Reconcile)?;

        let mut report = ReconcileReport::default();
        let books: Vec<(String, Arc<Mutex<AccountBook>>)> = self
            .books
            .read()
            .iter()
            .map(|(id, book)| (id.clone(), Arc::clone(book)))
            .collect();

        for (account_id, book) in books {
            let mut book = book.lock();
            let mut previous = std::mem::take(&mut book.orders);

            for order in orders.iter().filter(|o| o.account_id == account_id) {
                let intent = match previous.remove(&order.client_order_id) {
                    Some(mut local) => {
                        local.side = order.side;
                        local.qty = order.qty;
                        if local.status == IntentStatus::Pending {
                            local.status = IntentStatus::Submitted;
                        }
                        local
                    }
                    None => OrderIntent {
                        account_id: account_id.clone(),
                        symbol: order.symbol.clone(),
                        side: order.side,
                        qty: order.qty,
                        client_order_id: order.client_order_id.clone(),
                        target_ticks: 0,
                        stop_ticks: 0,
                        confidence_score: 0.0,
                        atr_value: 0.0,
                        entry_price: 0.0,
                        exit: ExitTracking::new(&self.settings.exit, now),
                        status: IntentStatus::Submitted,
                        broker_order_id: None,
                        filled_qty: 0,
                        avg_fill_price: None,
                        last_error: None,
                    },
                };
                book.orders.insert(intent.client_order_id.clone(), intent);
            }

            book.risk.position = positions
                .iter()
                .filter(|p| p.account_id == account_id)
                .map(|p| p.net_qty)
                .sum();

            report.accounts += 1;
            report.orders += book.orders.len();
            report.dropped += previous.len();
        }

        info!(
            accounts = report.accounts,
            orders = report.orders,
            dropped = report.dropped,
            "Reconciled with broker"
        );
        Ok(report)
    }
}

#[async_trait]
impl AccountExecutor for ExecutionEngine {
    async fn execute(
        &self,
        account_id: &str,
        signal: &SignalEvent,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        self.submit_signal(account_id, signal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperBroker;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use smm_core::{BrokerOrder, BrokerPosition};

    fn signal(side: Side) -> SignalEvent {
        SignalEvent {
            symbol: "NQH5".into(),
            side,
            price: 20_000.0,
            signal_price: None,
            confidence: 0.6,
            atr: 4.0,
            reason: "test".into(),
            source: "1m".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 14, 45, 0).unwrap(),
        }
    }

    fn engine(broker: Arc<PaperBroker>) -> ExecutionEngine {
        let engine = ExecutionEngine::new(ExecutionSettings::default(), broker);
        engine.register_account("A", true);
        engine.register_account("B", true);
        engine
    }

    // ==================== Submission Tests ====================

    #[tokio::test]
    async fn test_submit_creates_intent() {
        let broker = Arc::new(PaperBroker::new());
        let engine = engine(Arc::clone(&broker));

        let outcome = engine.submit_signal("A", &signal(Side::Buy)).await.unwrap();
        let ExecutionOutcome::Submitted(intent) = outcome else {
            panic!("expected submission");
        };
        assert_eq!(intent.qty, 1);
        assert_eq!(intent.status, IntentStatus::Submitted);
        assert!(intent.client_order_id.starts_with("A-"));
        assert_eq!(intent.client_order_id.len(), "A-".len() + 12);
        assert_eq!((intent.target_ticks, intent.stop_ticks), (24, 12));

        assert_eq!(broker.submitted().len(), 1);
        assert_eq!(engine.open_intents("A").len(), 1);
    }

    #[tokio::test]
    async fn test_client_order_ids_unique() {
        let engine = engine(Arc::new(PaperBroker::new()));
        let a = engine.prepare_order("A", &signal(Side::Buy)).unwrap().unwrap();
        let b = engine.prepare_order("A", &signal(Side::Buy)).unwrap().unwrap();
        assert_ne!(a.client_order_id, b.client_order_id);
    }

    #[tokio::test]
    async fn test_broker_failure_keeps_intent_pending() {
        let broker = Arc::new(PaperBroker::new());
        broker.reject_account("A", "margin");
        let engine = engine(Arc::clone(&broker));

        let result = engine.submit_signal("A", &signal(Side::Buy)).await;
        assert!(matches!(result, Err(ExecutionError::Submission { .. })));

        let intents = engine.open_intents("A");
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].status, IntentStatus::Pending);
        assert!(intents[0].last_error.as_deref().unwrap().contains("margin"));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let engine = engine(Arc::new(PaperBroker::new()));
        let result = engine.submit_signal("Z", &signal(Side::Buy)).await;
        assert_eq!(result.unwrap_err(), ExecutionError::UnknownAccount("Z".into()));
    }

    // ==================== Risk Tests ====================

    #[tokio::test]
    async fn test_disabled_account_rejected() {
        let engine = engine(Arc::new(PaperBroker::new()));
        engine.set_account_enabled("B", false).unwrap();
        let outcome = engine.submit_signal("B", &signal(Side::Buy)).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Rejected(RejectReason::AccountDisabled)
        ));
    }

    #[tokio::test]
    async fn test_drawdown_kill_switch_persists_until_reset() {
        let engine = engine(Arc::new(PaperBroker::new()));
        assert!(engine.update_account_pnl("A", Some(dec!(-250)), None).unwrap());
        assert!(engine.is_kill_switch_active("A"));

        engine.update_account_pnl("A", Some(dec!(75)), None).unwrap();
        for _ in 0..2 {
            let outcome = engine.submit_signal("A", &signal(Side::Buy)).await.unwrap();
            assert!(matches!(
                outcome,
                ExecutionOutcome::Rejected(RejectReason::DisabledByDrawdown)
            ));
        }

        engine.reset_kill_switch("A").unwrap();
        let outcome = engine.submit_signal("A", &signal(Side::Buy)).await.unwrap();
        assert!(outcome.is_submitted());
    }

    #[tokio::test]
    async fn test_not_test_account_rejected() {
        let settings = ExecutionSettings::default()
            .with_risk(RiskConfig::default().with_test_accounts(vec!["A".into()]));
        let engine = ExecutionEngine::new(settings, Arc::new(PaperBroker::new()));
        engine.register_account("B", true);
        let outcome = engine.submit_signal("B", &signal(Side::Buy)).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Rejected(RejectReason::NotTestAccount)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_counts_admitted_orders() {
        let settings = ExecutionSettings::default()
            .with_risk(RiskConfig::default().with_max_orders_per_minute(2));
        let engine = ExecutionEngine::new(settings, Arc::new(PaperBroker::new()));
        engine.register_account("A", true);

        let buy = signal(Side::Buy);
        let sell = signal(Side::Sell);
        assert!(engine.submit_signal("A", &buy).await.unwrap().is_submitted());
        assert!(engine.submit_signal("A", &sell).await.unwrap().is_submitted());
        let outcome = engine.submit_signal("A", &buy).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Rejected(RejectReason::RateLimited)
        ));
    }

    // ==================== Fill and Exit Tests ====================

    #[tokio::test]
    async fn test_fill_updates_position_and_position_cap() {
        let settings = ExecutionSettings::default()
            .with_risk(RiskConfig::default().with_max_position(1));
        let engine = ExecutionEngine::new(settings, Arc::new(PaperBroker::new()));
        engine.register_account("A", true);

        let ExecutionOutcome::Submitted(intent) =
            engine.submit_signal("A", &signal(Side::Buy)).await.unwrap()
        else {
            panic!("expected submission");
        };
        engine
            .on_fill(&FillEvent {
                account_id: "A".into(),
                client_order_id: intent.client_order_id.clone(),
                qty: 1,
                price: 20_000.0,
                timestamp: intent.exit.entry_time,
            })
            .unwrap();
        assert_eq!(engine.position("A"), Some(1));
        assert_eq!(engine.open_intents("A")[0].status, IntentStatus::Filled);

        let outcome = engine.submit_signal("A", &signal(Side::Buy)).await.unwrap();
        assert!(matches!(
            outcome,
            ExecutionOutcome::Rejected(RejectReason::MaxPositionExceeded)
        ));

        assert!(engine.close_intent("A", &intent.client_order_id).is_some());
        assert!(engine.open_intents("A").is_empty());
    }

    #[tokio::test]
    async fn test_fill_for_unknown_order() {
        let engine = engine(Arc::new(PaperBroker::new()));
        let result = engine.on_fill(&FillEvent {
            account_id: "A".into(),
            client_order_id: "A-missing".into(),
            qty: 1,
            price: 1.0,
            timestamp: Utc::now(),
        });
        assert!(matches!(result, Err(ExecutionError::UnknownOrder { .. })));
    }

    #[tokio::test]
    async fn test_exit_scan_reports_early_profit() {
        let engine = engine(Arc::new(PaperBroker::new()));
        let ExecutionOutcome::Submitted(intent) =
            engine.submit_signal("A", &signal(Side::Buy)).await.unwrap()
        else {
            panic!("expected submission");
        };
        let now = intent.exit.entry_time;
        engine
            .on_fill(&FillEvent {
                account_id: "A".into(),
                client_order_id: intent.client_order_id.clone(),
                qty: 1,
                price: 20_000.0,
                timestamp: now,
            })
            .unwrap();

        // 10 ticks × $5 clears the early target
        let exits = engine.scan_exits(20_002.5, now);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::EarlyProfit);

        engine
            .update_position_momentum("A", &intent.client_order_id, 0.1)
            .unwrap();
        assert_eq!(
            engine
                .check_exit_conditions("A", &intent.client_order_id, 20_000.0, now)
                .unwrap(),
            Some(ExitReason::MomentumExit)
        );
    }

    #[tokio::test]
    async fn test_flow_momentum_scores_filled_intents_by_side() {
        let engine = engine(Arc::new(PaperBroker::new()));
        let ExecutionOutcome::Submitted(long) =
            engine.submit_signal("A", &signal(Side::Buy)).await.unwrap()
        else {
            panic!("expected submission");
        };
        let ExecutionOutcome::Submitted(short) =
            engine.submit_signal("B", &signal(Side::Sell)).await.unwrap()
        else {
            panic!("expected submission");
        };
        // unfilled intents are left alone
        assert_eq!(engine.apply_flow_momentum("NQH5", 0.8), 0);

        let now = long.exit.entry_time;
        for intent in [&long, &short] {
            engine
                .on_fill(&FillEvent {
                    account_id: intent.account_id.clone(),
                    client_order_id: intent.client_order_id.clone(),
                    qty: 1,
                    price: 20_000.0,
                    timestamp: now,
                })
                .unwrap();
        }
        assert_eq!(engine.apply_flow_momentum("ESH5", 0.8), 0);
        assert_eq!(engine.apply_flow_momentum("NQH5", 0.8), 2);

        // buyers in control: the long holds, the short is out
        assert_eq!(
            engine
                .check_exit_conditions("A", &long.client_order_id, 20_000.0, now)
                .unwrap(),
            None
        );
        assert_eq!(
            engine
                .check_exit_conditions("B", &short.client_order_id, 20_000.0, now)
                .unwrap(),
            Some(ExitReason::MomentumExit)
        );
    }

    // ==================== Reconciliation Tests ====================

    #[tokio::test]
    async fn test_reconcile_overwrites_local_state() {
        let broker = Arc::new(PaperBroker::new());
        let engine = engine(Arc::clone(&broker));

        // Local-only intent that the broker never saw
        engine.prepare_order("A", &signal(Side::Buy)).unwrap().unwrap();
        engine.update_account_position("B", 3).unwrap();

        broker.set_working_orders(vec![BrokerOrder {
            account_id: "A".into(),
            client_order_id: "A-broker000001".into(),
            symbol: "NQH5".into(),
            side: Side::Sell,
            qty: 2,
        }]);
        broker.set_positions(vec![BrokerPosition {
            account_id: "A".into(),
            symbol: "NQH5".into(),
            net_qty: -2,
        }]);

        let report = engine.reconcile(Utc::now()).await.unwrap();
        assert_eq!(report.accounts, 2);
        assert_eq!(report.orders, 1);
        assert_eq!(report.dropped, 1);

        let intents = engine.open_intents("A");
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].client_order_id, "A-broker000001");
        assert_eq!(engine.position("A"), Some(-2));
        // Missing from the listing means flat
        assert_eq!(engine.position("B"), Some(0));
    }
}
