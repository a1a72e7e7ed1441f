//! Replay CLI command.
//!
//! Streams a recorded tick file through a trader wired to the paper broker
//! and prints the final trader status. The CSV needs a header row with
//! `timestamp,symbol,price,size,bid,ask`; `bid`/`ask` may be empty.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use serde::Serialize;
use smm_core::{ConfigLoader, MarketDataSource, MarketEvent, Tick};
use smm_execution::{MemoryAccountStore, PaperBroker};
use smm_orchestrator::{spawn_trader, ExecutionVenue, TraderEvent, TraderStatus};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Arguments for the replay command.
#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Tick CSV file
    #[arg(short, long)]
    pub data: String,

    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Paper accounts to trade (repeatable)
    #[arg(short, long = "account", default_value = "PAPER-1")]
    pub accounts: Vec<String>,
}

/// Recorded ticks served in timestamp order.
pub struct CsvTickSource {
    ticks: std::vec::IntoIter<Tick>,
}

impl CsvTickSource {
    /// # Errors
    /// Returns an error if the file cannot be opened or a row does not parse.
    pub fn from_path(path: &str) -> Result<Self> {
        let file =
            std::fs::File::open(path).with_context(|| format!("Failed to open tick file {path}"))?;
        Self::from_reader(file)
    }

    /// # Errors
    /// Returns an error if a row does not parse.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut ticks = Vec::new();
        for (row, result) in reader.deserialize::<Tick>().enumerate() {
            let tick = result.with_context(|| format!("Bad tick at row {}", row + 1))?;
            ticks.push(tick);
        }
        // Stable, so prints sharing a timestamp keep file order
        ticks.sort_by_key(|t| t.timestamp);

        Ok(Self {
            ticks: ticks.into_iter(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }
}

#[async_trait]
impl MarketDataSource for CsvTickSource {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>> {
        Ok(self.ticks.next().map(MarketEvent::Tick))
    }
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    events: u64,
    orders_submitted: usize,
    status: TraderStatus,
}

/// Runs the replay command.
///
/// # Errors
/// Returns an error if the config or data cannot be loaded or the trader fails.
pub async fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.config)?;
    let source = CsvTickSource::from_path(&args.data)?;
    tracing::info!(ticks = source.len(), file = %args.data, "Loaded tick file");

    let broker = Arc::new(PaperBroker::new());
    let (handle, task) = spawn_trader(
        &config,
        ExecutionVenue::Paper(Arc::clone(&broker)),
        Arc::new(MemoryAccountStore::new()),
    )?;

    for account in &args.accounts {
        handle
            .add_account(account.as_str(), true)
            .await
            .with_context(|| format!("Failed to add account {account}"))?;
    }

    let mut events = handle.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TraderEvent::SignalDispatched { signal, results }) => {
                    tracing::info!(
                        side = %signal.side,
                        source = %signal.source,
                        ?results,
                        "Dispatched"
                    );
                }
                Ok(TraderEvent::OrderFilled(fill)) => {
                    tracing::info!(
                        account = %fill.account_id,
                        qty = fill.qty,
                        price = fill.price,
                        "Filled"
                    );
                }
                Ok(TraderEvent::ExitTriggered(exit)) => {
                    tracing::info!(account = %exit.account_id, reason = ?exit.reason, "Exit");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let events = handle.run_feed(source).await?;
    let status = handle.get_status().await?;
    handle.shutdown().await?;
    task.await.context("Trader task panicked")?;
    logger.abort();

    let summary = ReplaySummary {
        events,
        orders_submitted: broker.submitted().len(),
        status,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
