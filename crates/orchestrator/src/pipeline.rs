//! Per-instrument market-data pipeline.
//!
//! Every tick is classified into buy/sell volume, folded into the tick-level
//! feature engine and handed to each configured bar source. A closed bar
//! feeds that source's bar-level features and signal engines, and a decision
//! with a side leaves the pipeline as a [`SignalEvent`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use smm_core::{AppConfig, Bar, ConfigError, DepthUpdate, SignalEvent, Tick};
use smm_signals::{
    build_aggregator, BarAggregator, BarData, BarFeatureEngine, BarFeatureSnapshot,
    CombinedDecision, CombinedEngine, FeatureEngine, FeatureSnapshot, TradeClassifier,
};
use tracing::{debug, info};

struct SourcePipeline {
    name: String,
    aggregator: Box<dyn BarAggregator>,
    features: BarFeatureEngine,
    /// Classified volume since this source's last closed bar.
    buy_volume: f64,
    sell_volume: f64,
    bars: u64,
    last_bar: Option<Bar>,
}

impl SourcePipeline {
    fn take_volume(&mut self) -> (f64, f64) {
        let split = (self.buy_volume, self.sell_volume);
        self.buy_volume = 0.0;
        self.sell_volume = 0.0;
        split
    }
}

/// A closed bar together with what the signal layer made of it.
#[derive(Debug, Clone)]
pub struct BarOutcome {
    pub source: String,
    pub bar: Bar,
    pub decision: CombinedDecision,
    /// Bar-level order flow, once the source has enough bars.
    pub features: Option<BarFeatureSnapshot>,
}

/// Everything one tick produced.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub bars: Vec<BarOutcome>,
    pub signals: Vec<SignalEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub bars: u64,
    pub rejected_ticks: u64,
    pub features_ready: bool,
    pub last_close: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatus {
    pub symbol: String,
    pub ticks: u64,
    pub last_price: Option<f64>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceStatus>,
    pub flow: FeatureSnapshot,
}

pub struct InstrumentPipeline {
    symbol: String,
    classifier: TradeClassifier,
    tick_features: FeatureEngine,
    sources: Vec<SourcePipeline>,
    combined: CombinedEngine,
    ticks: u64,
    last_price: Option<f64>,
    last_tick_at: Option<DateTime<Utc>>,
}

impl InstrumentPipeline {
    /// Build one pipeline per configured bar source for `symbol`.
    ///
    /// # Errors
    /// Returns `ConfigError` if any aggregator, feature or signal engine
    /// rejects its configuration.
    pub fn new(symbol: impl Into<String>, config: &AppConfig) -> Result<Self, ConfigError> {
        let mut sources = Vec::with_capacity(config.bars.sources.len());
        for source in &config.bars.sources {
            sources.push(SourcePipeline {
                name: source.name.clone(),
                aggregator: build_aggregator(&source.kind)?,
                features: BarFeatureEngine::new(config.features.bar_window)?,
                buy_volume: 0.0,
                sell_volume: 0.0,
                bars: 0,
                last_bar: None,
            });
        }
        let combined = CombinedEngine::new(
            &config.strategy,
            config.bars.sources.iter().map(|s| s.name.clone()),
        )?;

        Ok(Self {
            symbol: symbol.into(),
            classifier: TradeClassifier::new(),
            tick_features: FeatureEngine::with_weights(
                config.features.tick_window,
                config.features.weights,
            )?,
            sources,
            combined,
            ticks: 0,
            last_price: None,
            last_tick_at: None,
        })
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub const fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    /// Engines behind the pipeline, e.g. to switch testing mode.
    pub fn combined_mut(&mut self) -> &mut CombinedEngine {
        &mut self.combined
    }

    /// Feed one trade print. Ticks for another symbol are ignored.
    pub fn on_tick(&mut self, tick: &Tick) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if tick.symbol != self.symbol {
            debug!(
                symbol = %tick.symbol,
                expected = %self.symbol,
                "Tick for another symbol ignored"
            );
            return outcome;
        }

        // Invalid prints still reach the aggregators so they are counted there.
        if smm_signals::bars::validate_tick(tick.price, tick.size).is_ok() {
            let (buy, sell) = self
                .classifier
                .split(tick.price, tick.size, tick.bid, tick.ask);
            self.tick_features.update_trades(buy, sell);
            for source in &mut self.sources {
                source.buy_volume += buy;
                source.sell_volume += sell;
            }
            self.ticks += 1;
            self.last_price = Some(tick.price);
            self.last_tick_at = Some(tick.timestamp);
        }

        let tick_flow = self.tick_features.snapshot();
        for source in &mut self.sources {
            let closed = source.aggregator.update(tick.price, tick.size, tick.timestamp);
            for bar in closed {
                // A tick closing several bars attributes its volume to the first.
                let (buy_volume, sell_volume) = source.take_volume();
                let data = BarData {
                    bar,
                    buy_volume,
                    sell_volume,
                };
                source.features.add_bar(data);
                source.bars += 1;
                source.last_bar = Some(bar);
                self.combined.on_bar(&source.name, &bar, data.delta());

                let features = source
                    .features
                    .is_ready()
                    .then(|| source.features.snapshot());
                let flow = features.map_or(tick_flow, |f| f.flow);
                let Some(decision) =
                    self.combined
                        .evaluate(&source.name, bar.close, &flow, bar.end_ts)
                else {
                    continue;
                };

                info!(
                    symbol = %self.symbol,
                    source = %source.name,
                    close = bar.close,
                    volume = bar.volume,
                    reason = %decision.reason,
                    "Bar closed"
                );

                if let Some(side) = decision.side {
                    outcome.signals.push(SignalEvent {
                        symbol: self.symbol.clone(),
                        side,
                        price: bar.close,
                        signal_price: None,
                        confidence: decision.confidence,
                        atr: decision.atr,
                        reason: decision.reason.clone(),
                        source: source.name.clone(),
                        timestamp: bar.end_ts,
                    });
                }
                outcome.bars.push(BarOutcome {
                    source: source.name.clone(),
                    bar,
                    decision,
                    features,
                });
            }
        }
        outcome
    }

    /// Feed a depth snapshot into the tick-level features.
    pub fn on_depth(&mut self, depth: &DepthUpdate) {
        if depth.symbol != self.symbol {
            debug!(
                symbol = %depth.symbol,
                expected = %self.symbol,
                "Depth for another symbol ignored"
            );
            return;
        }
        self.tick_features.update_orderbook(&depth.bids, &depth.asks);
    }

    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            symbol: self.symbol.clone(),
            ticks: self.ticks,
            last_price: self.last_price,
            last_tick_at: self.last_tick_at,
            sources: self
                .sources
                .iter()
                .map(|s| SourceStatus {
                    name: s.name.clone(),
                    bars: s.bars,
                    rejected_ticks: s.aggregator.rejected_ticks(),
                    features_ready: s.features.is_ready(),
                    last_close: s.last_bar.map(|b| b.close),
                })
                .collect(),
            flow: self.tick_features.snapshot(),
        }
    }
}
