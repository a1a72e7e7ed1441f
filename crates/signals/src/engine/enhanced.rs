//! DI chop filter + order-flow surge engine with debounce and cooldown.
//!
//! A raw long needs the chop gate, a delta z-score surge and a bullish price
//! bias on the same bar. [`DebounceGate`] then requires `confirm_bars`
//! consecutive raw bars before it fires, blocks the opposite side for
//! `cooldown` bars after firing, and never lets both sides out at once.

use crate::indicators::{
    update_heiken_ashi, wilder_directional_index, ExponentialMa, HeikenAshiState,
};
use crate::window::{mean_std, RollingWindow};
use serde::Serialize;
use smm_core::{Bar, ConfigError, EnhancedConfig, Side};

const BIAS_EMA_PERIOD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateOutput {
    pub long_confirmed: bool,
    pub short_confirmed: bool,
    pub long_signal: bool,
    pub short_signal: bool,
    pub side: Option<Side>,
}

/// Per-side confirmation counters and opposite-side cooldowns.
#[derive(Debug, Clone, Default)]
pub struct DebounceGate {
    confirm_bars: u32,
    cooldown: u32,
    long_count: u32,
    short_count: u32,
    long_cooldown: u32,
    short_cooldown: u32,
}

impl DebounceGate {
    #[must_use]
    pub const fn new(confirm_bars: u32, cooldown: u32) -> Self {
        Self {
            confirm_bars,
            cooldown,
            long_count: 0,
            short_count: 0,
            long_cooldown: 0,
            short_cooldown: 0,
        }
    }

    #[must_use]
    pub const fn counts(&self) -> (u32, u32) {
        (self.long_count, self.short_count)
    }

    #[must_use]
    pub const fn cooldowns(&self) -> (u32, u32) {
        (self.long_cooldown, self.short_cooldown)
    }

    /// Advances one bar. `z` breaks the tie when both sides confirm.
    pub fn step(&mut self, long_raw: bool, short_raw: bool, z: f64) -> GateOutput {
        match (long_raw, short_raw) {
            (true, true) => {
                self.long_count += 1;
                self.short_count += 1;
            }
            (true, false) => {
                self.long_count += 1;
                self.short_count = 0;
            }
            (false, true) => {
                self.short_count += 1;
                self.long_count = 0;
            }
            (false, false) => {
                self.long_count = 0;
                self.short_count = 0;
            }
        }

        let long_confirmed = self.long_count >= self.confirm_bars;
        let short_confirmed = self.short_count >= self.confirm_bars;

        self.long_cooldown = self.long_cooldown.saturating_sub(1);
        self.short_cooldown = self.short_cooldown.saturating_sub(1);

        let mut long_signal = long_confirmed && self.long_cooldown == 0;
        let mut short_signal = short_confirmed && self.short_cooldown == 0;

        if long_signal && short_signal {
            if z > 0.0 {
                short_signal = false;
            } else if z < 0.0 {
                long_signal = false;
            } else {
                long_signal = false;
                short_signal = false;
            }
        }

        let side = if long_signal {
            self.short_cooldown = self.cooldown;
            Some(Side::Buy)
        } else if short_signal {
            self.long_cooldown = self.cooldown;
            Some(Side::Sell)
        } else {
            None
        };

        GateOutput {
            long_confirmed,
            short_confirmed,
            long_signal,
            short_signal,
            side,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EnhancedBar {
    high: f64,
    low: f64,
    close: f64,
    delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancedResult {
    pub di_plus: f64,
    pub di_minus: f64,
    pub chop_long: bool,
    pub chop_short: bool,
    pub delta: f64,
    pub delta_z: f64,
    pub surge_long: bool,
    pub surge_short: bool,
    pub bias_long: bool,
    pub bias_short: bool,
    pub long_raw: bool,
    pub short_raw: bool,
    pub long_signal: bool,
    pub short_signal: bool,
    pub side: Option<Side>,
}

impl EnhancedResult {
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            di_plus: 0.0,
            di_minus: 0.0,
            chop_long: false,
            chop_short: false,
            delta: 0.0,
            delta_z: 0.0,
            surge_long: false,
            surge_short: false,
            bias_long: false,
            bias_short: false,
            long_raw: false,
            short_raw: false,
            long_signal: false,
            short_signal: false,
            side: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnhancedEngine {
    config: EnhancedConfig,
    bars: RollingWindow<EnhancedBar>,
    deltas: RollingWindow<f64>,
    heiken_ashi: HeikenAshiState,
    bias_ema: ExponentialMa,
    wave_fast: ExponentialMa,
    wave_slow: ExponentialMa,
    gate: DebounceGate,
}

impl EnhancedEngine {
    /// # Errors
    /// Returns `ConfigError` when the config does not validate.
    pub fn new(config: &EnhancedConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let history = config.delta_lookback.max(config.profit_wave_slow) + 10;
        Ok(Self {
            bars: RollingWindow::new(history),
            deltas: RollingWindow::new(config.delta_lookback),
            heiken_ashi: None,
            bias_ema: ExponentialMa::new(BIAS_EMA_PERIOD)?,
            wave_fast: ExponentialMa::new(config.profit_wave_fast)?,
            wave_slow: ExponentialMa::new(config.profit_wave_slow)?,
            gate: DebounceGate::new(config.confirm_bars, config.cooldown),
            config: config.clone(),
        })
    }

    /// Appends a completed bar and its order-flow delta (buy − sell volume).
    pub fn add_bar(&mut self, bar: &Bar, delta: f64) {
        let delta = if delta.is_finite() { delta } else { 0.0 };
        update_heiken_ashi(&mut self.heiken_ashi, bar.open, bar.high, bar.low, bar.close);
        self.bias_ema.update(bar.close);
        self.wave_fast.update(bar.close);
        self.wave_slow.update(bar.close);
        self.bars.push(EnhancedBar {
            high: bar.high,
            low: bar.low,
            close: bar.close,
            delta,
        });
        self.deltas.push(delta);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.bars.len() >= self.min_bars()
    }

    fn min_bars(&self) -> usize {
        self.config.di_len.max(self.config.confirm_bars as usize)
    }

    #[must_use]
    pub const fn gate(&self) -> &DebounceGate {
        &self.gate
    }

    fn delta_zscore(&self, delta: f64) -> f64 {
        if self.deltas.len() < self.config.delta_lookback / 2 {
            return 0.0;
        }
        let (mean, std) = mean_std(&self.deltas.to_vec());
        if std == 0.0 {
            0.0
        } else {
            (delta - mean) / std
        }
    }

    /// Evaluates the newest bar. Call once per bar: the debounce counters
    /// advance on every call.
    pub fn generate_signal(&mut self) -> EnhancedResult {
        if !self.is_ready() {
            tracing::debug!(
                bars = self.bars.len(),
                need = self.min_bars(),
                "Enhanced engine not ready"
            );
            return EnhancedResult::neutral();
        }
        let Some(current) = self.bars.last().copied() else {
            return EnhancedResult::neutral();
        };

        let points: Vec<(f64, f64, f64)> = self
            .bars
            .iter()
            .map(|b| (b.high, b.low, b.close))
            .collect();
        let di = wilder_directional_index(&points, self.config.di_len);
        let chop_long = di.bullish(self.config.di_threshold);
        let chop_short = di.bearish(self.config.di_threshold);

        let delta_z = self.delta_zscore(current.delta);
        let surge_long = delta_z >= self.config.delta_z;
        let surge_short = delta_z <= -self.config.delta_z;

        let (mut bias_long, mut bias_short) = if self.config.use_heiken_ashi {
            self.heiken_ashi
                .map_or((false, false), |ha| (ha.is_bullish(), ha.is_bearish()))
        } else {
            let ema = self.bias_ema.value().unwrap_or(current.close);
            (current.close > ema, current.close < ema)
        };

        if self.config.use_profit_wave {
            if let (Some(fast), Some(slow)) = (self.wave_fast.value(), self.wave_slow.value()) {
                bias_long = bias_long && current.close >= fast && fast >= slow;
                bias_short = bias_short && current.close <= fast && fast <= slow;
            }
        }

        let long_raw = chop_long && surge_long && bias_long;
        let short_raw = chop_short && surge_short && bias_short;
        let gate = self.gate.step(long_raw, short_raw, delta_z);

        if let Some(side) = gate.side {
            tracing::info!(
                %side,
                di_plus = di.plus,
                di_minus = di.minus,
                delta_z,
                "Enhanced engine signal"
            );
        } else {
            tracing::debug!(
                di_plus = di.plus,
                di_minus = di.minus,
                delta_z,
                chop_long,
                chop_short,
                surge_long,
                surge_short,
                bias_long,
                bias_short,
                long_confirmed = gate.long_confirmed,
                short_confirmed = gate.short_confirmed,
                "Enhanced engine holding"
            );
        }

        EnhancedResult {
            di_plus: di.plus,
            di_minus: di.minus,
            chop_long,
            chop_short,
            delta: current.delta,
            delta_z,
            surge_long,
            surge_short,
            bias_long,
            bias_short,
            long_raw,
            short_raw,
            long_signal: gate.long_signal,
            short_signal: gate.short_signal,
            side: gate.side,
        }
    }
}
