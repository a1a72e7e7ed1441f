//! Order-flow feature engines.
//!
//! [`FeatureEngine`] works on the raw tick and depth stream; [`BarFeatureEngine`]
//! works on completed bars with their buy/sell split. Both hand out immutable
//! snapshots whose `delta_confidence` is always inside `[0, 1]`.

pub mod bar;
pub mod tick;

pub use bar::{BarData, BarFeatureEngine, BarFeatureSnapshot};
pub use tick::{
    aggressive_buy_ratio, depth_imbalance, depth_weighted_slope, FeatureEngine, FeatureSnapshot,
    TradeClassifier,
};
