//! Market-data side of the SMM trader: ticks become bars, bars and ticks
//! become order-flow features, and features become trade decisions.

pub mod bars;
pub mod engine;
pub mod features;
pub mod indicators;
pub mod window;

pub use bars::{build_aggregator, BarAggregator, TbarsAggregator, TickError, TimeTickAggregator};
pub use engine::{
    BackgroundTrend, BaselineDecision, BaselineEngine, CombinedDecision, CombinedEngine,
    CrossSourceOutcome, DebounceGate, EnhancedEngine, EnhancedResult, MainDecision, MainEngine,
    TrendState,
};
pub use features::{
    BarData, BarFeatureEngine, BarFeatureSnapshot, FeatureEngine, FeatureSnapshot, TradeClassifier,
};
