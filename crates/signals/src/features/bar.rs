use super::tick::{aggressive_buy_ratio, FeatureSnapshot};
use crate::window::{least_squares_slope, RollingWindow};
use serde::{Deserialize, Serialize};
use smm_core::error::{ensure_period, ConfigError};
use smm_core::Bar;

const MOMENTUM_BARS: usize = 5;
const BUY_RATIO_BARS: usize = 10;
const READY_BARS: usize = 5;

/// A completed bar with its aggressor volume split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarData {
    pub bar: Bar,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl BarData {
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.buy_volume - self.sell_volume
    }
}

/// Bar-level features: the order-flow snapshot plus bar statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarFeatureSnapshot {
    pub flow: FeatureSnapshot,
    pub bar_count: usize,
    pub avg_bar_size: f64,
    pub volume_trend: f64,
    pub price_momentum: f64,
}

impl BarFeatureSnapshot {
    #[must_use]
    pub fn neutral(bar_count: usize) -> Self {
        Self {
            flow: FeatureSnapshot::neutral(),
            bar_count,
            avg_bar_size: 0.0,
            volume_trend: 0.0,
            price_momentum: 0.0,
        }
    }

    #[must_use]
    pub const fn delta_confidence(&self) -> f64 {
        self.flow.delta_confidence
    }
}

#[derive(Debug, Clone)]
pub struct BarFeatureEngine {
    bars: RollingWindow<BarData>,
    cvd_series: RollingWindow<f64>,
    volumes: RollingWindow<f64>,
    closes: RollingWindow<f64>,
    cvd: f64,
}

impl BarFeatureEngine {
    /// # Errors
    /// Returns `ConfigError` when `window == 0`.
    pub fn new(window: usize) -> Result<Self, ConfigError> {
        let window = ensure_period("features.bar_window", window)?;
        Ok(Self {
            bars: RollingWindow::new(window),
            cvd_series: RollingWindow::new(window),
            volumes: RollingWindow::new(window),
            closes: RollingWindow::new(window),
            cvd: 0.0,
        })
    }

    pub fn add_bar(&mut self, data: BarData) {
        self.cvd += data.delta();
        self.cvd_series.push(self.cvd);
        self.volumes.push(data.bar.volume);
        self.closes.push(data.bar.close);
        self.bars.push(data);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.bars.len() >= READY_BARS
    }

    #[must_use]
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// The newest `n` bars, oldest first.
    #[must_use]
    pub fn recent_bars(&self, n: usize) -> Vec<BarData> {
        self.bars.tail(n).copied().collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> BarFeatureSnapshot {
        let count = self.bars.len();
        if count < 2 {
            let mut neutral = BarFeatureSnapshot::neutral(count);
            neutral.flow.cvd = self.cvd;
            return neutral;
        }

        let cvd_slope = least_squares_slope(&self.cvd_series.to_vec());
        let volume_trend = least_squares_slope(&self.volumes.to_vec());

        let closes: Vec<f64> = self.closes.tail(MOMENTUM_BARS).copied().collect();
        let price_momentum = match (closes.first(), closes.last()) {
            (Some(&first), Some(&last)) if closes.len() >= MOMENTUM_BARS && first != 0.0 => {
                (last - first) / first
            }
            _ => 0.0,
        };

        let (buy, sell) = self
            .bars
            .tail(BUY_RATIO_BARS)
            .fold((0.0, 0.0), |(b, s), d| (b + d.buy_volume, s + d.sell_volume));
        let abr = aggressive_buy_ratio(buy, sell);

        #[allow(clippy::cast_precision_loss)]
        let avg_bar_size = self.bars.iter().map(|d| d.bar.range()).sum::<f64>() / count as f64;

        let cvd_factor = (cvd_slope * 0.01).tanh();
        let volume_factor = (volume_trend * 0.1).tanh();
        let ratio_factor = (abr - 0.5) * 2.0;
        let score = 0.4 * cvd_factor + 0.3 * volume_factor + 0.3 * ratio_factor;
        let delta_confidence = (0.5 * (score + 1.0)).clamp(0.0, 1.0);

        BarFeatureSnapshot {
            flow: FeatureSnapshot {
                cvd: self.cvd,
                cvd_slope,
                depth_imbalance: 0.0,
                depth_slope: 0.0,
                aggressive_buy_ratio: abr,
                delta_confidence: if delta_confidence.is_nan() {
                    0.5
                } else {
                    delta_confidence
                },
            },
            bar_count: count,
            avg_bar_size,
            volume_trend,
            price_momentum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar_data(i: i64, close: f64, volume: f64, buy_share: f64) -> BarData {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap() + Duration::minutes(i);
        BarData {
            bar: Bar {
                open: close - 0.5,
                high: close + 0.5,
                low: close - 1.0,
                close,
                volume,
                start_ts: start,
                end_ts: start + Duration::minutes(1),
            },
            buy_volume: volume * buy_share,
            sell_volume: volume * (1.0 - buy_share),
        }
    }

    #[test]
    fn test_neutral_until_two_bars() {
        let mut engine = BarFeatureEngine::new(20).unwrap();
        assert_eq!(engine.snapshot().delta_confidence(), 0.5);
        engine.add_bar(bar_data(0, 100.0, 100.0, 0.7));
        let snap = engine.snapshot();
        assert_eq!(snap.delta_confidence(), 0.5);
        assert_eq!(snap.bar_count, 1);
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_bullish_bars() {
        let mut engine = BarFeatureEngine::new(20).unwrap();
        for i in 0..10 {
            engine.add_bar(bar_data(i, 100.0 + i as f64, 100.0, 0.7));
        }
        assert!(engine.is_ready());
        let snap = engine.snapshot();
        assert!(snap.flow.cvd_slope > 0.0);
        assert!((snap.flow.aggressive_buy_ratio - 0.7).abs() < 1e-9);
        assert!(snap.delta_confidence() > 0.6);
        assert!((snap.avg_bar_size - 1.5).abs() < 1e-9);
        // closes 105..109 over the last five bars
        assert!((snap.price_momentum - 4.0 / 105.0).abs() < 1e-9);
        assert_eq!(snap.volume_trend, 0.0);
    }

    #[test]
    fn test_bearish_bars() {
        let mut engine = BarFeatureEngine::new(20).unwrap();
        for i in 0..10 {
            engine.add_bar(bar_data(i, 100.0 - i as f64, 100.0, 0.3));
        }
        let snap = engine.snapshot();
        assert!(snap.delta_confidence() < 0.4);
        assert!(snap.price_momentum < 0.0);
    }

    #[test]
    fn test_window_bounds_history() {
        let mut engine = BarFeatureEngine::new(5).unwrap();
        for i in 0..12 {
            engine.add_bar(bar_data(i, 100.0, 10.0, 0.5));
        }
        assert_eq!(engine.bar_count(), 5);
        assert_eq!(engine.recent_bars(3).len(), 3);
        assert_eq!(engine.recent_bars(30).len(), 5);
    }
}
