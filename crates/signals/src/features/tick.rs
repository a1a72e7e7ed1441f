use crate::window::{least_squares_slope, RollingWindow};
use serde::{Deserialize, Serialize};
use smm_core::error::{ensure_period, ConfigError};
use smm_core::{FeatureWeights, Side};

const EPSILON: f64 = 1e-9;

/// Order-flow features at one instant. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub cvd: f64,
    pub cvd_slope: f64,
    pub depth_imbalance: f64,
    pub depth_slope: f64,
    pub aggressive_buy_ratio: f64,
    /// 0.5 neutral, above bullish, below bearish.
    pub delta_confidence: f64,
}

impl FeatureSnapshot {
    /// No information: every factor at its neutral value.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            cvd: 0.0,
            cvd_slope: 0.0,
            depth_imbalance: 0.0,
            depth_slope: 0.0,
            aggressive_buy_ratio: 0.5,
            delta_confidence: 0.5,
        }
    }

    /// Copy with `delta_confidence` replaced.
    #[must_use]
    pub const fn with_delta_confidence(mut self, delta_confidence: f64) -> Self {
        self.delta_confidence = delta_confidence;
        self
    }
}

impl Default for FeatureSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Buy share of total volume, 0.5 when nothing traded.
#[must_use]
pub fn aggressive_buy_ratio(buy: f64, sell: f64) -> f64 {
    let total = buy + sell;
    if total.abs() < EPSILON {
        0.5
    } else {
        (buy / total).clamp(0.0, 1.0)
    }
}

/// `(Σbid - Σask) / (Σbid + Σask + ε)`
#[must_use]
pub fn depth_imbalance(bids: &[f64], asks: &[f64]) -> f64 {
    let bid: f64 = bids.iter().sum();
    let ask: f64 = asks.iter().sum();
    (bid - ask) / (bid + ask + EPSILON)
}

/// Imbalance with level `i` (best = 0) weighted `i + 1`, so deeper levels count more.
#[must_use]
pub fn depth_weighted_slope(bids: &[f64], asks: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let weighted = |levels: &[f64]| -> f64 {
        levels
            .iter()
            .enumerate()
            .map(|(i, q)| (i + 1) as f64 * q)
            .sum()
    };
    let bid = weighted(bids);
    let ask = weighted(asks);
    (bid - ask) / (bid + ask + EPSILON)
}

/// Tick-level order-flow engine over ring buffers of trades and depth.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    weights: FeatureWeights,
    buy_volume: RollingWindow<f64>,
    sell_volume: RollingWindow<f64>,
    cvd_series: RollingWindow<f64>,
    imbalance: RollingWindow<f64>,
    depth_slope: RollingWindow<f64>,
    cvd: f64,
}

impl FeatureEngine {
    /// # Errors
    /// Returns `ConfigError` when `window == 0`.
    pub fn new(window: usize) -> Result<Self, ConfigError> {
        Self::with_weights(window, FeatureWeights::default())
    }

    /// # Errors
    /// Returns `ConfigError` when `window == 0`.
    pub fn with_weights(window: usize, weights: FeatureWeights) -> Result<Self, ConfigError> {
        let window = ensure_period("features.tick_window", window)?;
        Ok(Self {
            weights,
            buy_volume: RollingWindow::new(window),
            sell_volume: RollingWindow::new(window),
            cvd_series: RollingWindow::new(window),
            imbalance: RollingWindow::new(window),
            depth_slope: RollingWindow::new(window),
            cvd: 0.0,
        })
    }

    pub fn update_trades(&mut self, buy_qty: f64, sell_qty: f64) {
        let buy = if buy_qty.is_finite() { buy_qty.max(0.0) } else { 0.0 };
        let sell = if sell_qty.is_finite() { sell_qty.max(0.0) } else { 0.0 };
        self.buy_volume.push(buy);
        self.sell_volume.push(sell);
        self.cvd += buy - sell;
        self.cvd_series.push(self.cvd);
    }

    pub fn update_orderbook(&mut self, bids: &[f64], asks: &[f64]) {
        self.imbalance.push(depth_imbalance(bids, asks));
        self.depth_slope.push(depth_weighted_slope(bids, asks));
    }

    #[must_use]
    pub const fn cvd(&self) -> f64 {
        self.cvd
    }

    #[must_use]
    pub fn snapshot(&self) -> FeatureSnapshot {
        let cvd_slope = least_squares_slope(&self.cvd_series.to_vec());
        let depth_imbalance = self.imbalance.last().copied().unwrap_or(0.0);
        let depth_slope = self.depth_slope.last().copied().unwrap_or(0.0);
        let buy: f64 = self.buy_volume.iter().sum();
        let sell: f64 = self.sell_volume.iter().sum();
        let abr = aggressive_buy_ratio(buy, sell);

        let w = self.weights;
        let score = w.cvd_slope * (sigmoid(cvd_slope) - 0.5) * 2.0
            + w.depth_imbalance * depth_imbalance
            + w.aggressive_buy_ratio * (abr - 0.5) * 2.0;
        let delta_confidence = (0.5 * (score + 1.0)).clamp(0.0, 1.0);

        FeatureSnapshot {
            cvd: self.cvd,
            cvd_slope,
            depth_imbalance,
            depth_slope,
            aggressive_buy_ratio: abr,
            delta_confidence: if delta_confidence.is_nan() {
                0.5
            } else {
                delta_confidence
            },
        }
    }
}

/// Assigns an aggressor side to trade prints that arrive without one.
///
/// At or through the ask is a buy, at or through the bid is a sell. Inside
/// the spread (or without quotes) the tick rule decides, and an unchanged
/// price repeats the previous side.
#[derive(Debug, Clone, Default)]
pub struct TradeClassifier {
    last_price: Option<f64>,
    last_side: Option<Side>,
}

impl TradeClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the aggressor side, or `None` for the very first print
    /// without quotes.
    pub fn classify(&mut self, price: f64, bid: Option<f64>, ask: Option<f64>) -> Option<Side> {
        let side = match (bid, ask) {
            (_, Some(ask)) if price >= ask => Some(Side::Buy),
            (Some(bid), _) if price <= bid => Some(Side::Sell),
            _ => match self.last_price {
                Some(last) if price > last => Some(Side::Buy),
                Some(last) if price < last => Some(Side::Sell),
                _ => self.last_side,
            },
        };
        self.last_price = Some(price);
        if side.is_some() {
            self.last_side = side;
        }
        side
    }

    /// `(buy_qty, sell_qty)` for one print; unclassified prints split evenly.
    pub fn split(
        &mut self,
        price: f64,
        size: f64,
        bid: Option<f64>,
        ask: Option<f64>,
    ) -> (f64, f64) {
        match self.classify(price, bid, ask) {
            Some(Side::Buy) => (size, 0.0),
            Some(Side::Sell) => (0.0, size),
            None => (size / 2.0, size / 2.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Snapshot Tests ====================

    #[test]
    fn test_empty_engine_is_neutral() {
        let engine = FeatureEngine::new(256).unwrap();
        let snap = engine.snapshot();
        assert_eq!(snap.delta_confidence, 0.5);
        assert_eq!(snap.aggressive_buy_ratio, 0.5);
    }

    #[test]
    fn test_all_zero_volumes_are_neutral() {
        let mut engine = FeatureEngine::new(16).unwrap();
        for _ in 0..20 {
            engine.update_trades(0.0, 0.0);
            engine.update_orderbook(&[0.0, 0.0], &[0.0, 0.0]);
        }
        let snap = engine.snapshot();
        assert!((snap.delta_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_buying_pressure_is_bullish() {
        let mut engine = FeatureEngine::new(64).unwrap();
        for _ in 0..30 {
            engine.update_trades(7.0, 3.0);
            engine.update_orderbook(&[20.0, 15.0, 10.0], &[10.0, 8.0, 5.0]);
        }
        let snap = engine.snapshot();
        assert!(snap.cvd_slope > 0.0);
        assert!(snap.depth_imbalance > 0.0);
        assert!((snap.aggressive_buy_ratio - 0.7).abs() < 1e-9);
        assert!(snap.delta_confidence > 0.6);
        assert_eq!(snap.cvd, 120.0);
    }

    #[test]
    fn test_selling_pressure_is_bearish() {
        let mut engine = FeatureEngine::new(64).unwrap();
        for _ in 0..30 {
            engine.update_trades(2.0, 8.0);
            engine.update_orderbook(&[5.0], &[15.0]);
        }
        assert!(engine.snapshot().delta_confidence < 0.4);
    }

    #[test]
    fn test_delta_confidence_bounded_for_extreme_inputs() {
        let mut engine = FeatureEngine::new(8).unwrap();
        let inputs = [
            (1e12, 0.0),
            (0.0, 1e12),
            (f64::NAN, 5.0),
            (-3.0, 2.0),
            (f64::INFINITY, 1.0),
        ];
        for (buy, sell) in inputs {
            engine.update_trades(buy, sell);
            engine.update_orderbook(&[1e9], &[0.0]);
            let dc = engine.snapshot().delta_confidence;
            assert!((0.0..=1.0).contains(&dc), "dc = {dc}");
        }
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(FeatureEngine::new(0).is_err());
    }

    // ==================== Depth Tests ====================

    #[test]
    fn test_depth_helpers() {
        assert!((depth_imbalance(&[3.0, 1.0], &[1.0, 1.0]) - (2.0 / 6.0)).abs() < 1e-6);
        assert_eq!(depth_imbalance(&[], &[]), 0.0);
        // bids: 1*1 + 2*1 = 3, asks: 1*2 = 2
        assert!((depth_weighted_slope(&[1.0, 1.0], &[2.0]) - 0.2).abs() < 1e-6);
    }

    // ==================== Classifier Tests ====================

    #[test]
    fn test_classifier_quotes_then_tick_rule() {
        let mut c = TradeClassifier::new();
        assert_eq!(c.classify(100.25, Some(100.0), Some(100.25)), Some(Side::Buy));
        assert_eq!(c.classify(100.0, Some(100.0), Some(100.25)), Some(Side::Sell));
        assert_eq!(c.classify(100.5, None, None), Some(Side::Buy));
        assert_eq!(c.classify(100.5, None, None), Some(Side::Buy));
        assert_eq!(c.classify(100.25, None, None), Some(Side::Sell));
    }

    #[test]
    fn test_classifier_first_print_splits() {
        let mut c = TradeClassifier::new();
        assert_eq!(c.split(100.0, 4.0, None, None), (2.0, 2.0));
        assert_eq!(c.split(100.25, 4.0, None, None), (4.0, 0.0));
    }
}
