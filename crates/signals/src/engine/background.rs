use crate::indicators::{
    update_heiken_ashi, AverageTrueRange, ExponentialMa, HeikenAshiState, MoneyFlowIndex,
};
use serde::Serialize;
use smm_core::{BackgroundTrendConfig, Bar, ConfigError, Side};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendState {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendState {
    #[must_use]
    pub const fn side(self) -> Option<Side> {
        match self {
            Self::Bullish => Some(Side::Buy),
            Self::Bearish => Some(Side::Sell),
            Self::Neutral => None,
        }
    }
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "bull"),
            Self::Bearish => write!(f, "bear"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Mode latched on a trend flip and cleared once price closes back
/// through the slow EMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum TrendMode {
    #[default]
    None,
    Buy,
    Sell,
}

/// Slow ATR trailing-band trend on Heiken-Ashi candles.
///
/// Each bar computes `up = mid - k·ATR` and `dn = mid + k·ATR`. The bands
/// trail while price stays on their side; a close through the previous
/// opposite band flips the trend.
#[derive(Debug, Clone)]
pub struct BackgroundTrend {
    atr_multiplier: f64,
    ema_fast: ExponentialMa,
    ema_slow: ExponentialMa,
    atr: AverageTrueRange,
    mfi: MoneyFlowIndex,
    heiken_ashi: HeikenAshiState,
    trend_up: Option<f64>,
    trend_down: Option<f64>,
    bullish: bool,
    state: TrendState,
    mode: TrendMode,
}

impl BackgroundTrend {
    /// # Errors
    /// Returns `ConfigError` for zero periods.
    pub fn new(config: &BackgroundTrendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            atr_multiplier: config.atr_multiplier,
            ema_fast: ExponentialMa::new(config.ema_fast)?,
            ema_slow: ExponentialMa::new(config.ema_slow)?,
            atr: AverageTrueRange::new(config.atr_period)?,
            mfi: MoneyFlowIndex::new(config.mfi_period)?,
            heiken_ashi: None,
            trend_up: None,
            trend_down: None,
            bullish: true,
            state: TrendState::Neutral,
            mode: TrendMode::None,
        })
    }

    pub fn on_bar(&mut self, bar: &Bar) {
        let ha = update_heiken_ashi(&mut self.heiken_ashi, bar.open, bar.high, bar.low, bar.close);
        self.ema_fast.update(ha.close);
        let ema_slow = self.ema_slow.update(ha.close);
        let atr = self.atr.update(ha.high, ha.low, ha.close);
        self.mfi.update(ha.high, ha.low, ha.close, bar.volume);

        let mid = (ha.high + ha.low) / 2.0;
        let up = mid - self.atr_multiplier * atr;
        let down = mid + self.atr_multiplier * atr;
        let prev_up = self.trend_up.unwrap_or(up);
        let prev_down = self.trend_down.unwrap_or(down);

        self.trend_up = Some(if ha.close > prev_up { up.max(prev_up) } else { up });
        self.trend_down = Some(if ha.close < prev_down { down.min(prev_down) } else { down });

        let was_bullish = self.bullish;
        if ha.close > prev_down {
            self.bullish = true;
        } else if ha.close < prev_up {
            self.bullish = false;
        }
        self.state = if self.bullish {
            TrendState::Bullish
        } else {
            TrendState::Bearish
        };

        if self.bullish != was_bullish {
            self.mode = if self.bullish {
                TrendMode::Buy
            } else {
                TrendMode::Sell
            };
            tracing::info!(trend = %self.state, "Background trend flipped");
        } else if (self.mode == TrendMode::Buy && bar.close < ema_slow && ha.close < ema_slow)
            || (self.mode == TrendMode::Sell && bar.close > ema_slow && ha.close > ema_slow)
        {
            self.mode = TrendMode::None;
        }
    }

    #[must_use]
    pub const fn state(&self) -> TrendState {
        self.state
    }

    #[must_use]
    pub const fn mode(&self) -> TrendMode {
        self.mode
    }

    /// `(trailing up band, trailing down band)` after the last bar.
    #[must_use]
    pub const fn bands(&self) -> (Option<f64>, Option<f64>) {
        (self.trend_up, self.trend_down)
    }

    #[must_use]
    pub const fn ema_fast(&self) -> Option<f64> {
        self.ema_fast.value()
    }

    #[must_use]
    pub const fn ema_slow(&self) -> Option<f64> {
        self.ema_slow.value()
    }

    #[must_use]
    pub const fn mfi(&self) -> f64 {
        self.mfi.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, close: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap() + Duration::minutes(i);
        Bar {
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 50.0,
            start_ts: start,
            end_ts: start + Duration::minutes(1),
        }
    }

    #[test]
    fn test_neutral_before_first_bar() {
        let trend = BackgroundTrend::new(&BackgroundTrendConfig::default()).unwrap();
        assert_eq!(trend.state(), TrendState::Neutral);
        assert_eq!(trend.state().side(), None);
    }

    #[test]
    fn test_rising_market_is_bullish() {
        let mut trend = BackgroundTrend::new(&BackgroundTrendConfig::default()).unwrap();
        for i in 0..20 {
            trend.on_bar(&bar(i, 100.0 + i as f64));
        }
        assert_eq!(trend.state(), TrendState::Bullish);
        assert_eq!(trend.state().side(), Some(Side::Buy));
        let (up, down) = trend.bands();
        assert!(up.unwrap() < down.unwrap());
    }

    #[test]
    fn test_sell_off_flips_bearish() {
        let mut trend = BackgroundTrend::new(&BackgroundTrendConfig::default()).unwrap();
        for i in 0..20 {
            trend.on_bar(&bar(i, 100.0 + i as f64));
        }
        for i in 0..20 {
            trend.on_bar(&bar(20 + i, 119.0 - 3.0 * i as f64));
        }
        assert_eq!(trend.state(), TrendState::Bearish);
        assert_eq!(trend.mode(), TrendMode::Sell);
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = BackgroundTrendConfig {
            atr_period: 0,
            ..BackgroundTrendConfig::default()
        };
        assert!(BackgroundTrend::new(&config).is_err());
    }
}
