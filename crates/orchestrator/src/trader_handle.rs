use crate::commands::{TraderCommand, TraderStatus};
use crate::dispatcher::DispatchOutcome;
use crate::events::TraderEvent;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use smm_core::{DepthUpdate, MarketDataSource, MarketEvent, SignalEvent, SignalFilters, Tick};
use smm_execution::ReconcileReport;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

#[derive(Clone)]
pub struct TraderHandle {
    tx: mpsc::Sender<TraderCommand>,
    event_tx: broadcast::Sender<TraderEvent>,
    status_rx: watch::Receiver<TraderStatus>,
}

impl TraderHandle {
    /// Creates a new trader handle over the actor's channels.
    #[must_use]
    pub const fn new(
        tx: mpsc::Sender<TraderCommand>,
        event_tx: broadcast::Sender<TraderEvent>,
        status_rx: watch::Receiver<TraderStatus>,
    ) -> Self {
        Self {
            tx,
            event_tx,
            status_rx,
        }
    }

    /// Live stream of trader events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TraderEvent> {
        self.event_tx.subscribe()
    }

    /// Last status the actor published, without a round trip.
    #[must_use]
    pub fn latest_status(&self) -> TraderStatus {
        self.status_rx.borrow().clone()
    }

    /// Feeds one trade print.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the trader actor.
    pub async fn tick(&self, tick: Tick) -> Result<()> {
        self.tx.send(TraderCommand::Tick(tick)).await?;
        Ok(())
    }

    /// Feeds one depth snapshot.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the trader actor.
    pub async fn depth(&self, depth: DepthUpdate) -> Result<()> {
        self.tx.send(TraderCommand::Depth(depth)).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the trader actor.
    pub async fn market_event(&self, event: MarketEvent) -> Result<()> {
        match event {
            MarketEvent::Tick(tick) => self.tick(tick).await,
            MarketEvent::Depth(depth) => self.depth(depth).await,
        }
    }

    /// Dispatches a signal produced outside the bar pipeline.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn submit_signal(&self, signal: SignalEvent) -> Result<DispatchOutcome> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TraderCommand::Signal(Box::new(signal), tx))
            .await?;
        Ok(rx.await?)
    }

    /// Replaces local order tables and positions with the broker's view.
    ///
    /// # Errors
    /// Returns an error if the actor is gone or either broker listing fails.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(TraderCommand::Reconcile(tx)).await?;
        let report = rx.await?.context("Reconciliation failed")?;
        Ok(report)
    }

    /// # Errors
    /// Returns an error if the actor is gone or the filters cannot be persisted.
    pub async fn set_filters(&self, filters: SignalFilters) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(TraderCommand::SetFilters(filters, tx)).await?;
        rx.await?.context("Failed to persist signal filters")?;
        Ok(())
    }

    /// Adds an account to both synchronization and execution.
    ///
    /// # Errors
    /// Returns an error if the actor is gone or the account cannot be persisted.
    pub async fn add_account(&self, account_id: impl Into<String>, enabled: bool) -> Result<()> {
        let account_id = account_id.into();
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TraderCommand::AddAccount {
                account_id: account_id.clone(),
                enabled,
                reply: tx,
            })
            .await?;
        rx.await?
            .with_context(|| format!("Failed to add account {account_id}"))?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the actor is gone or the account is unknown.
    pub async fn set_account_enabled(
        &self,
        account_id: impl Into<String>,
        enabled: bool,
    ) -> Result<()> {
        let account_id = account_id.into();
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TraderCommand::SetAccountEnabled {
                account_id: account_id.clone(),
                enabled,
                reply: tx,
            })
            .await?;
        rx.await?
            .with_context(|| format!("Failed to update account {account_id}"))?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the trader actor.
    pub async fn update_pnl(
        &self,
        account_id: impl Into<String>,
        realized: Option<Decimal>,
        unrealized: Option<Decimal>,
    ) -> Result<()> {
        self.tx
            .send(TraderCommand::UpdatePnl {
                account_id: account_id.into(),
                realized,
                unrealized,
            })
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the command cannot be sent to the trader actor.
    pub async fn reset_kill_switch(&self, account_id: impl Into<String>) -> Result<()> {
        self.tx
            .send(TraderCommand::ResetKillSwitch(account_id.into()))
            .await?;
        Ok(())
    }

    /// Puts accounts left in `error` by a failed round back into rotation.
    /// `None` resets every account.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the trader actor.
    pub async fn reset_sync_status(&self, account_id: Option<&str>) -> Result<()> {
        self.tx
            .send(TraderCommand::ResetSyncStatus(account_id.map(str::to_string)))
            .await?;
        Ok(())
    }

    /// Gets the current status of the trader.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn get_status(&self) -> Result<TraderStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(TraderCommand::GetStatus(tx)).await?;
        let status = rx.await?;
        Ok(status)
    }

    /// Shuts down the trader.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the trader actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(TraderCommand::Shutdown).await?;
        Ok(())
    }

    /// Pumps `source` into the trader until it is exhausted. Returns the
    /// number of events forwarded.
    ///
    /// # Errors
    /// Returns an error if the source fails or the trader actor has stopped.
    pub async fn run_feed<S: MarketDataSource>(&self, mut source: S) -> Result<u64> {
        let mut forwarded = 0;
        while let Some(event) = source
            .next_event()
            .await
            .context("Market data source failed")?
        {
            self.market_event(event).await?;
            forwarded += 1;
        }
        tracing::info!(events = forwarded, "Market data feed exhausted");
        Ok(forwarded)
    }
}
