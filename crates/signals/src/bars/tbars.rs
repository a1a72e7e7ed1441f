//! Heiken-Ashi breakout bars ("TBars").
//!
//! A bar stays open while price remains inside `[min, max]`. When price
//! breaks a bound the bar closes exactly at that bound and a new bar opens
//! with a synthetic open `openOffset` behind the close, so every continuation
//! bar shows a full body. Bounds of the new bar sit `trendOffset` ahead in the
//! breakout direction and `reversalOffset` behind it: continuing is easier
//! than reversing.
//!
//! Offsets derive from `base_size` (in ticks) and `tick_size`:
//!
//! | offset    | value                      |
//! |-----------|----------------------------|
//! | open      | `base_size * tick_size`     |
//! | trend     | `base_size / 2 * tick_size` |
//! | reversal  | `base_size * 2 * tick_size` |

use super::{validate_tick, BarAggregator};
use crate::indicators::{update_heiken_ashi, HeikenAshiBar, HeikenAshiState};
use chrono::{DateTime, Utc};
use smm_core::error::ensure_positive;
use smm_core::{Bar, ConfigError};

/// Upper bound on bars emitted for a single tick that gaps through many bounds.
const MAX_BARS_PER_TICK: usize = 512;

#[derive(Debug, Clone)]
struct OpenTbar {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    max: f64,
    min: f64,
    start_ts: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TbarsAggregator {
    open_offset: f64,
    trend_offset: f64,
    reversal_offset: f64,
    current: Option<OpenTbar>,
    /// +1 after an upside break, -1 after a downside break, 0 before any.
    direction: i8,
    heiken_ashi: HeikenAshiState,
    rejected: u64,
}

impl TbarsAggregator {
    /// # Errors
    /// Returns `ConfigError` when `base_size` or `tick_size` is not strictly positive.
    pub fn new(base_size: f64, tick_size: f64) -> Result<Self, ConfigError> {
        let base_size = ensure_positive("bars.tbars.base_size", base_size)?;
        let tick_size = ensure_positive("bars.tbars.tick_size", tick_size)?;
        Ok(Self {
            open_offset: base_size * tick_size,
            trend_offset: base_size / 2.0 * tick_size,
            reversal_offset: base_size * 2.0 * tick_size,
            current: None,
            direction: 0,
            heiken_ashi: None,
            rejected: 0,
        })
    }

    #[must_use]
    pub const fn open_offset(&self) -> f64 {
        self.open_offset
    }

    #[must_use]
    pub const fn trend_offset(&self) -> f64 {
        self.trend_offset
    }

    #[must_use]
    pub const fn reversal_offset(&self) -> f64 {
        self.reversal_offset
    }

    #[must_use]
    pub const fn direction(&self) -> i8 {
        self.direction
    }

    /// Heiken-Ashi candle of the most recently completed bar.
    #[must_use]
    pub const fn heiken_ashi(&self) -> Option<HeikenAshiBar> {
        self.heiken_ashi
    }

    fn bounds_after(&self, close: f64, direction: i8) -> (f64, f64) {
        match direction {
            d if d > 0 => (close - self.reversal_offset, close + self.trend_offset),
            d if d < 0 => (close - self.trend_offset, close + self.reversal_offset),
            _ => (close, close),
        }
    }
}

impl BarAggregator for TbarsAggregator {
    fn update(&mut self, price: f64, size: f64, ts: DateTime<Utc>) -> Vec<Bar> {
        if let Err(err) = validate_tick(price, size) {
            self.rejected += 1;
            tracing::warn!(%err, price, size, "Skipping tick in TBars aggregator");
            return Vec::new();
        }

        let Some(mut bar) = self.current.take() else {
            let (min, max) = self.bounds_after(price, self.direction);
            self.current = Some(OpenTbar {
                open: price,
                high: price,
                low: price,
                close: price,
                volume: size,
                max,
                min,
                start_ts: ts,
            });
            return Vec::new();
        };

        bar.volume += size;
        let mut completed = Vec::new();

        loop {
            let (close, direction) = if price > bar.max {
                (bar.max, 1_i8)
            } else if price < bar.min {
                (bar.min, -1_i8)
            } else {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                break;
            };

            bar.high = bar.high.max(close);
            bar.low = bar.low.min(close);
            bar.close = close;
            self.direction = direction;
            update_heiken_ashi(&mut self.heiken_ashi, bar.open, bar.high, bar.low, close);
            completed.push(Bar {
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close,
                volume: bar.volume,
                start_ts: bar.start_ts,
                end_ts: ts,
            });

            let fake_open = close - self.open_offset * f64::from(direction);
            let (min, max) = self.bounds_after(close, direction);
            bar = OpenTbar {
                open: fake_open,
                high: fake_open.max(close),
                low: fake_open.min(close),
                close,
                volume: 0.0,
                max,
                min,
                start_ts: ts,
            };

            if completed.len() >= MAX_BARS_PER_TICK {
                tracing::warn!(
                    price,
                    bars = completed.len(),
                    "TBars gap exceeded per-tick bar limit, resuming on next tick"
                );
                break;
            }
        }

        self.current = Some(bar);
        if let Some(last) = completed.last() {
            tracing::debug!(
                bars = completed.len(),
                close = last.close,
                direction = self.direction,
                "TBars closed"
            );
        }
        completed
    }

    fn rejected_ticks(&self) -> u64 {
        self.rejected
    }
}
