//! Tick-to-bar aggregation.
//!
//! Three aggregators share the [`BarAggregator`] contract: fixed time windows,
//! fixed tick counts, and Heiken-Ashi breakout bars ("TBars"). Each consumes
//! `(price, size, timestamp)` and returns the bars completed by that tick,
//! oldest first.
//!
//! Ticks with a non-finite price or a non-positive size are skipped, logged at
//! `warn` and counted; the bar in progress is left untouched.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use smm_signals::bars::{BarAggregator, TimeTickAggregator};
//!
//! let mut bars = TimeTickAggregator::ticks(3).unwrap();
//! let t0 = Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap();
//! assert!(bars.update(100.0, 1.0, t0).is_empty());
//! assert!(bars.update(100.5, 2.0, t0 + Duration::seconds(1)).is_empty());
//! let closed = bars.update(100.25, 1.0, t0 + Duration::seconds(2));
//! assert_eq!(closed.len(), 1);
//! assert_eq!(closed[0].volume, 4.0);
//! ```

pub mod tbars;
pub mod time_tick;

pub use tbars::TbarsAggregator;
pub use time_tick::{BarMode, TimeTickAggregator};

use chrono::{DateTime, Utc};
use smm_core::{Bar, BarKind, ConfigError};
use thiserror::Error;

/// Why a tick was refused by an aggregator.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum TickError {
    #[error("non-finite tick price {0}")]
    NonFinitePrice(f64),

    #[error("non-positive tick size {0}")]
    NonPositiveSize(f64),
}

/// Checks a raw tick before it touches any bar state.
///
/// # Errors
/// Returns the first problem found with the tick.
pub fn validate_tick(price: f64, size: f64) -> Result<(), TickError> {
    if !price.is_finite() {
        return Err(TickError::NonFinitePrice(price));
    }
    if !size.is_finite() || size <= 0.0 {
        return Err(TickError::NonPositiveSize(size));
    }
    Ok(())
}

pub trait BarAggregator: Send {
    /// Folds one tick in and returns any bars it completed.
    fn update(&mut self, price: f64, size: f64, ts: DateTime<Utc>) -> Vec<Bar>;

    /// Ticks refused by [`validate_tick`] since construction.
    fn rejected_ticks(&self) -> u64;
}

/// Builds the aggregator described by a configured bar source.
///
/// # Errors
/// Returns `ConfigError` for non-positive durations, counts or sizes.
pub fn build_aggregator(kind: &BarKind) -> Result<Box<dyn BarAggregator>, ConfigError> {
    Ok(match *kind {
        BarKind::Time { seconds } => Box::new(TimeTickAggregator::time(seconds)?),
        BarKind::Ticks { count } => Box::new(TimeTickAggregator::ticks(count)?),
        BarKind::Tbars {
            base_size,
            tick_size,
        } => Box::new(TbarsAggregator::new(base_size, tick_size)?),
    })
}
