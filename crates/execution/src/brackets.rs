use serde::Serialize;
use smm_core::{BracketConfig, Side};

/// Which rule produced a bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketMode {
    SignalPrice,
    Atr,
    Fallback,
}

/// Target/stop distances in ticks from the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bracket {
    pub target_ticks: u32,
    pub stop_ticks: u32,
    pub mode: BracketMode,
}

/// Compute bracket distances for an entry at `entry_price`.
///
/// Tries, in order:
/// * signal-price mode when `signal_price` is usable: target and stop prices
///   are `signal_price × multiplier` with the multipliers swapped for sells,
///   converted to ticks and floored at `min_signal_ticks`
/// * ATR mode when enabled and `atr > 0`: `atr × multiplier / tick_size`,
///   floored at `min_atr_target_ticks` / `min_atr_stop_ticks`
/// * static fallback ticks
#[must_use]
pub fn calculate_bracket(
    config: &BracketConfig,
    entry_price: f64,
    side: Side,
    atr: f64,
    signal_price: Option<f64>,
) -> Bracket {
    if let Some(signal_price) = signal_price.filter(|p| p.is_finite() && *p > 0.0) {
        let (target_mult, stop_mult) = match side {
            Side::Buy => (config.signal_target_multiplier, config.signal_stop_multiplier),
            Side::Sell => (config.signal_stop_multiplier, config.signal_target_multiplier),
        };
        let target_price = signal_price * target_mult;
        let stop_price = signal_price * stop_mult;

        return Bracket {
            target_ticks: price_to_ticks((target_price - entry_price).abs(), config.tick_size)
                .max(config.min_signal_ticks),
            stop_ticks: price_to_ticks((stop_price - entry_price).abs(), config.tick_size)
                .max(config.min_signal_ticks),
            mode: BracketMode::SignalPrice,
        };
    }

    if config.use_atr && atr.is_finite() && atr > 0.0 {
        return Bracket {
            target_ticks: atr_ticks(atr * config.target_atr_multiplier, config.tick_size)
                .max(config.min_atr_target_ticks),
            stop_ticks: atr_ticks(atr * config.stop_atr_multiplier, config.tick_size)
                .max(config.min_atr_stop_ticks),
            mode: BracketMode::Atr,
        };
    }

    Bracket {
        target_ticks: config.fallback_target_ticks,
        stop_ticks: config.fallback_stop_ticks,
        mode: BracketMode::Fallback,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn price_to_ticks(distance: f64, tick_size: f64) -> u32 {
    let ticks = (distance / tick_size).round();
    if ticks.is_finite() {
        ticks.clamp(0.0, f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

// ATR distances truncate to whole ticks
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn atr_ticks(distance: f64, tick_size: f64) -> u32 {
    let ticks = (distance / tick_size).floor();
    if ticks.is_finite() {
        ticks.clamp(0.0, f64::from(u32::MAX)) as u32
    } else {
        0
    }
}
