use super::{validate_tick, BarAggregator};
use chrono::{DateTime, Duration, Utc};
use smm_core::error::{ensure_period, ensure_positive};
use smm_core::{Bar, ConfigError};

/// Close rule for [`TimeTickAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarMode {
    /// Close once the bar has been open this long.
    Time(Duration),
    /// Close once the bar holds this many ticks.
    Ticks(u32),
}

#[derive(Debug, Clone)]
struct OpenBar {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    ticks: u32,
    start_ts: DateTime<Utc>,
}

impl OpenBar {
    fn seed(price: f64, volume: f64, ticks: u32, ts: DateTime<Utc>) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            ticks,
            start_ts: ts,
        }
    }

    fn extend(&mut self, price: f64, size: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += size;
        self.ticks += 1;
    }

    fn finish(&self, end_ts: DateTime<Utc>) -> Bar {
        Bar {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            start_ts: self.start_ts,
            end_ts,
        }
    }
}

/// Time-window or tick-count bars.
///
/// The closing tick belongs to the bar it closes; the next bar opens at that
/// tick's price with zero volume, so consecutive bars never gap.
#[derive(Debug, Clone)]
pub struct TimeTickAggregator {
    mode: BarMode,
    current: Option<OpenBar>,
    rejected: u64,
}

impl TimeTickAggregator {
    /// Bars spanning `seconds` of wall-clock time.
    ///
    /// # Errors
    /// Returns `ConfigError` when `seconds` is not strictly positive.
    pub fn time(seconds: f64) -> Result<Self, ConfigError> {
        let seconds = ensure_positive("bars.time.seconds", seconds)?;
        #[allow(clippy::cast_possible_truncation)]
        let millis = (seconds * 1000.0).round() as i64;
        Ok(Self::with_mode(BarMode::Time(Duration::milliseconds(
            millis.max(1),
        ))))
    }

    /// Bars of `count` ticks each.
    ///
    /// # Errors
    /// Returns `ConfigError` when `count == 0`.
    pub fn ticks(count: u32) -> Result<Self, ConfigError> {
        ensure_period("bars.ticks.count", count as usize)?;
        Ok(Self::with_mode(BarMode::Ticks(count)))
    }

    const fn with_mode(mode: BarMode) -> Self {
        Self {
            mode,
            current: None,
            rejected: 0,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> BarMode {
        self.mode
    }

    fn should_close(&self, bar: &OpenBar, ts: DateTime<Utc>) -> bool {
        match self.mode {
            BarMode::Time(duration) => ts - bar.start_ts >= duration,
            BarMode::Ticks(count) => bar.ticks >= count,
        }
    }
}

impl BarAggregator for TimeTickAggregator {
    fn update(&mut self, price: f64, size: f64, ts: DateTime<Utc>) -> Vec<Bar> {
        if let Err(err) = validate_tick(price, size) {
            self.rejected += 1;
            tracing::warn!(%err, price, size, "Skipping tick in time/tick aggregator");
            return Vec::new();
        }

        let bar = match self.current.as_mut() {
            Some(bar) => {
                bar.extend(price, size);
                bar.clone()
            }
            None => {
                let bar = OpenBar::seed(price, size, 1, ts);
                self.current = Some(bar.clone());
                bar
            }
        };

        if !self.should_close(&bar, ts) {
            return Vec::new();
        }

        let completed = bar.finish(ts);
        self.current = Some(OpenBar::seed(price, 0.0, 0, ts));
        tracing::debug!(
            open = completed.open,
            close = completed.close,
            volume = completed.volume,
            "Time/tick bar closed"
        );
        vec![completed]
    }

    fn rejected_ticks(&self) -> u64 {
        self.rejected
    }
}
