use crate::commands::{TraderCommand, TraderState, TraderStatus};
use crate::dispatcher::{DispatchOutcome, SignalDispatcher};
use crate::events::TraderEvent;
use crate::pipeline::InstrumentPipeline;
use crate::trader_handle::TraderHandle;
use crate::venue::ExecutionVenue;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use smm_core::{
    resolve_front_month, AccountStore, AppConfig, FillEvent, Side, SignalEvent, Tick,
};
use smm_execution::{
    AccountPatch, AccountSyncManager, ExecutionEngine, ExecutionSettings, ExitReason,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const RECENT_EVENTS: usize = 10;

/// One instrument, many accounts.
///
/// Commands are handled strictly in arrival order; the only concurrency is
/// the per-account fan-out inside a dispatch.
pub struct TraderActor {
    symbol: String,
    venue: ExecutionVenue,
    rx: mpsc::Receiver<TraderCommand>,
    pipeline: InstrumentPipeline,
    dispatcher: SignalDispatcher,
    engine: Arc<ExecutionEngine>,
    sync: Arc<AccountSyncManager>,
    started_at: DateTime<Utc>,
    state: TraderState,

    // Event streaming
    event_tx: broadcast::Sender<TraderEvent>,
    status_tx: watch::Sender<TraderStatus>,
    recent_events: VecDeque<TraderEvent>,
}

impl TraderActor {
    /// Wires pipeline, dispatcher, sync manager and execution engine
    /// together. Accounts already in `store` are registered with execution.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the store cannot
    /// be read.
    pub fn new(
        config: &AppConfig,
        venue: ExecutionVenue,
        store: Arc<dyn AccountStore>,
        rx: mpsc::Receiver<TraderCommand>,
        event_tx: broadcast::Sender<TraderEvent>,
    ) -> Result<(Self, watch::Receiver<TraderStatus>)> {
        config.validate().context("Invalid trader configuration")?;

        let started_at = Utc::now();
        let symbol = config
            .symbol
            .contract
            .clone()
            .unwrap_or_else(|| resolve_front_month(&config.symbol.root, started_at));

        let engine = Arc::new(ExecutionEngine::new(
            ExecutionSettings::from_config(config),
            venue.client(),
        ));
        let persisted = store.load().context("Failed to load account state")?;
        for record in &persisted.accounts {
            engine.register_account(record.account_id.clone(), record.enabled);
        }
        let sync = Arc::new(
            AccountSyncManager::new(config.sync.clone(), engine.clone(), store.clone())
                .context("Failed to build account sync manager")?,
        );
        let dispatcher = SignalDispatcher::new(config.dispatch.clone(), store, sync.clone())
            .context("Failed to build signal dispatcher")?;
        let pipeline = InstrumentPipeline::new(symbol.clone(), config)
            .context("Failed to build market data pipeline")?;

        tracing::info!(
            symbol = %symbol,
            mode = ?venue.mode(),
            accounts = persisted.accounts.len(),
            sources = config.bars.sources.len(),
            "Trader initialized"
        );

        let (status_tx, status_rx) = watch::channel(TraderStatus::default());
        let actor = Self {
            symbol,
            venue,
            rx,
            pipeline,
            dispatcher,
            engine,
            sync,
            started_at,
            state: TraderState::Running,
            event_tx,
            status_tx,
            recent_events: VecDeque::with_capacity(RECENT_EVENTS),
        };
        actor.publish_status();
        Ok((actor, status_rx))
    }

    fn market_time(&self) -> DateTime<Utc> {
        self.pipeline.status().last_tick_at.unwrap_or_else(Utc::now)
    }

    fn status(&self) -> TraderStatus {
        let now = self.market_time();
        TraderStatus {
            symbol: self.symbol.clone(),
            state: self.state,
            execution_mode: self.venue.mode(),
            last_heartbeat: Utc::now(),
            started_at: self.started_at,
            pipeline: self.pipeline.status(),
            dispatch: self.dispatcher.stats(now),
            sync: self.sync.statistics(now),
            accounts: self
                .engine
                .accounts()
                .iter()
                .filter_map(|id| self.engine.account_snapshot(id))
                .collect(),
            open_positions: self.engine.active_positions_summary(now),
            recent_events: self.recent_events.iter().cloned().collect(),
        }
    }

    fn publish_status(&self) {
        // Ignore if no receivers
        let _ = self.status_tx.send(self.status());
    }

    /// Adds an event to recent events and broadcasts it
    fn add_event(&mut self, event: TraderEvent) {
        if self.recent_events.len() >= RECENT_EVENTS {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event.clone());

        // Broadcast to subscribers (ignore if no receivers)
        let _ = self.event_tx.send(event);
    }

    fn emit_error_event(&mut self, message: String) {
        self.add_event(TraderEvent::Error {
            message,
            timestamp: Utc::now(),
        });
    }

    // ==================== Market data ====================

    async fn on_tick(&mut self, tick: Tick) {
        let outcome = self.pipeline.on_tick(&tick);
        let closed_bars = !outcome.bars.is_empty();

        for closed in outcome.bars {
            if let Some(features) = closed.features {
                self.engine
                    .apply_flow_momentum(&self.symbol, features.flow.aggressive_buy_ratio);
            }
            self.add_event(TraderEvent::BarClosed {
                source: closed.source,
                bar: closed.bar,
                reason: closed.decision.reason,
            });
        }
        for signal in outcome.signals {
            self.add_event(TraderEvent::SignalGenerated(signal.clone()));
            self.dispatch(signal).await;
        }

        if tick.symbol == self.symbol {
            if let Some(price) = self.pipeline.last_price() {
                let fills = self.venue.simulate_fills(price, tick.timestamp);
                for fill in fills {
                    self.apply_fill(fill);
                }
                self.check_exits(price, tick.timestamp);
            }
        }

        if closed_bars {
            self.publish_status();
        }
    }

    async fn dispatch(&mut self, signal: SignalEvent) -> DispatchOutcome {
        let outcome = self.dispatcher.dispatch(&signal).await;
        let event = match &outcome {
            DispatchOutcome::Dispatched(results) => TraderEvent::SignalDispatched {
                signal,
                results: results.clone(),
            },
            DispatchOutcome::Rejected(reason) => TraderEvent::SignalRejected {
                signal,
                reason: *reason,
            },
        };
        self.add_event(event);
        outcome
    }

    // ==================== Fills and exits ====================

    fn apply_fill(&mut self, fill: FillEvent) {
        if let Err(e) = self.engine.on_fill(&fill) {
            tracing::warn!(account = %fill.account_id, error = %e, "Fill not applied");
            return;
        }
        self.sync_position(&fill.account_id);
        self.add_event(TraderEvent::OrderFilled(fill));
    }

    /// Mirror the execution position onto the account's sync state.
    fn sync_position(&self, account_id: &str) {
        let Some(position) = self.engine.position(account_id) else {
            return;
        };
        let side = match position {
            p if p > 0 => Some(Side::Buy),
            p if p < 0 => Some(Side::Sell),
            _ => None,
        };
        let qty = u32::try_from(position.unsigned_abs()).unwrap_or(u32::MAX);
        let patch = AccountPatch::default().with_position(side, qty);
        if let Err(e) = self.sync.update_account(account_id, &patch) {
            tracing::warn!(account = %account_id, error = %e, "Account position not updated");
        }
    }

    fn check_exits(&mut self, price: f64, now: DateTime<Utc>) {
        for exit in self.engine.scan_exits(price, now) {
            tracing::info!(
                account = %exit.account_id,
                coid = %exit.client_order_id,
                reason = %exit.reason,
                price,
                "Exit condition"
            );
            if exit.reason != ExitReason::BreakevenActivated {
                self.close_position(&exit.account_id, &exit.client_order_id);
            }
            self.add_event(TraderEvent::ExitTriggered(exit));
        }
    }

    /// Drop the intent. On paper the position is flattened here; a live
    /// broker closes it through the bracket and reconciliation catches up.
    fn close_position(&self, account_id: &str, client_order_id: &str) {
        let Some(intent) = self.engine.close_intent(account_id, client_order_id) else {
            return;
        };
        let ExecutionVenue::Paper(broker) = &self.venue else {
            return;
        };
        let delta = -(i64::from(intent.filled_qty) * intent.side.sign());
        broker.adjust_position(account_id, &intent.symbol, delta);
        let position = self.engine.position(account_id).unwrap_or(0) + delta;
        if self
            .engine
            .update_account_position(account_id, position)
            .is_ok()
        {
            self.sync_position(account_id);
        }
    }

    // ==================== Main loop ====================

    /// Runs the trader actor's main event loop, processing commands from the channel.
    ///
    /// # Errors
    /// Returns an error if command processing fails.
    #[allow(clippy::cognitive_complexity)]
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(symbol = %self.symbol, "Trader starting");

        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                TraderCommand::Tick(tick) => self.on_tick(tick).await,
                TraderCommand::Depth(depth) => self.pipeline.on_depth(&depth),
                TraderCommand::Signal(signal, reply) => {
                    tracing::info!(
                        side = %signal.side,
                        source = %signal.source,
                        "External signal received"
                    );
                    self.add_event(TraderEvent::SignalGenerated((*signal).clone()));
                    let outcome = self.dispatch(*signal).await;
                    let _ = reply.send(outcome);
                    self.publish_status();
                }
                TraderCommand::Reconcile(reply) => {
                    let result = self.engine.reconcile(self.market_time()).await;
                    match &result {
                        Ok(report) => {
                            for account_id in self.engine.accounts() {
                                self.sync_position(&account_id);
                            }
                            self.add_event(TraderEvent::Reconciled(*report));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Reconciliation failed");
                            self.emit_error_event(format!("Reconciliation failed: {e}"));
                        }
                    }
                    let _ = reply.send(result);
                    self.publish_status();
                }
                TraderCommand::SetFilters(filters, reply) => {
                    let _ = reply.send(self.dispatcher.update_filters(filters));
                    self.publish_status();
                }
                TraderCommand::AddAccount {
                    account_id,
                    enabled,
                    reply,
                } => {
                    let result = self.sync.add_account(&account_id, enabled);
                    if result.is_ok() {
                        self.engine.register_account(account_id, enabled);
                    }
                    let _ = reply.send(result);
                    self.publish_status();
                }
                TraderCommand::SetAccountEnabled {
                    account_id,
                    enabled,
                    reply,
                } => {
                    let result = self.sync.set_account_enabled(&account_id, enabled);
                    if result.is_ok() {
                        self.engine.register_account(account_id, enabled);
                    }
                    let _ = reply.send(result);
                    self.publish_status();
                }
                TraderCommand::UpdatePnl {
                    account_id,
                    realized,
                    unrealized,
                } => {
                    match self
                        .engine
                        .update_account_pnl(&account_id, realized, unrealized)
                    {
                        Ok(true) => {
                            self.add_event(TraderEvent::KillSwitchTripped { account_id });
                        }
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(account = %account_id, error = %e, "P&L update ignored");
                        }
                    }
                    self.publish_status();
                }
                TraderCommand::ResetKillSwitch(account_id) => {
                    if let Err(e) = self.engine.reset_kill_switch(&account_id) {
                        tracing::warn!(
                            account = %account_id,
                            error = %e,
                            "Kill-switch reset ignored"
                        );
                    }
                    self.publish_status();
                }
                TraderCommand::ResetSyncStatus(account_id) => {
                    self.sync.reset_account_sync_status(account_id.as_deref());
                    tracing::info!(
                        account = account_id.as_deref().unwrap_or("all"),
                        "Sync status reset"
                    );
                    self.publish_status();
                }
                TraderCommand::GetStatus(tx) => {
                    let _ = tx.send(self.status());
                }
                TraderCommand::Shutdown => {
                    tracing::info!(symbol = %self.symbol, "Trader shutting down");
                    break;
                }
            }
        }

        self.state = TraderState::Stopped;
        self.publish_status();
        tracing::info!(symbol = %self.symbol, "Trader stopped");
        Ok(())
    }
}

/// Builds a trader and spawns its actor on the current runtime.
///
/// # Errors
/// Returns an error if the trader cannot be initialized.
pub fn spawn_trader(
    config: &AppConfig,
    venue: ExecutionVenue,
    store: Arc<dyn AccountStore>,
) -> Result<(TraderHandle, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel(1024);
    let (event_tx, _event_rx) = broadcast::channel(1000);
    let (actor, status_rx) = TraderActor::new(config, venue, store, rx, event_tx.clone())?;
    let handle = TraderHandle::new(tx, event_tx, status_rx);

    let task = tokio::spawn(async move {
        if let Err(e) = actor.run().await {
            tracing::error!("Trader error: {e:#}");
        }
    });
    Ok((handle, task))
}
