use crate::features::FeatureSnapshot;
use crate::indicators::{
    update_heiken_ashi, AverageTrueRange, DirectionalIndex, DirectionalMovement, ExponentialMa,
    HeikenAshiBar, HeikenAshiState, MoneyFlowIndex,
};
use serde::Serialize;
use smm_core::{Bar, ConfigError, MainEngineConfig, Side, TestingMode};

const CANDLE_EPSILON: f64 = 1e-9;

/// Gate results and indicator readings behind one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainDecision {
    pub side: Option<Side>,
    pub reason: String,
    pub delta_confidence: f64,
    pub ema_fast: f64,
    pub ema_medium: f64,
    pub ema_slow: f64,
    pub ema_trend: f64,
    pub ema_slow_slope: f64,
    pub ema_trend_slope: f64,
    pub atr: f64,
    /// `NaN` while the MFI warms up.
    pub mfi: f64,
    pub di_plus: f64,
    pub di_minus: f64,
    pub trend_bull: bool,
    pub trend_bear: bool,
    pub delta_bull: bool,
    pub delta_bear: bool,
    pub strong_bull: bool,
    pub strong_bear: bool,
    pub chop_bull: bool,
    pub chop_bear: bool,
    pub mfi_bull: bool,
    pub mfi_bear: bool,
    pub ma_bull: bool,
    pub ma_bear: bool,
}

impl MainDecision {
    fn warming_up(delta_confidence: f64) -> Self {
        Self {
            side: None,
            reason: "warming_up".to_string(),
            delta_confidence,
            ema_fast: f64::NAN,
            ema_medium: f64::NAN,
            ema_slow: f64::NAN,
            ema_trend: f64::NAN,
            ema_slow_slope: 0.0,
            ema_trend_slope: 0.0,
            atr: 0.0,
            mfi: f64::NAN,
            di_plus: 0.0,
            di_minus: 0.0,
            trend_bull: false,
            trend_bear: false,
            delta_bull: false,
            delta_bear: false,
            strong_bull: false,
            strong_bear: false,
            chop_bull: false,
            chop_bear: false,
            mfi_bull: false,
            mfi_bear: false,
            ma_bull: false,
            ma_bear: false,
        }
    }

    /// Direction of the EMA trend filter, if any.
    #[must_use]
    pub const fn trend_side(&self) -> Option<Side> {
        if self.trend_bull {
            Some(Side::Buy)
        } else if self.trend_bear {
            Some(Side::Sell)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn delta_agrees(&self, side: Side) -> bool {
        match side {
            Side::Buy => self.delta_bull,
            Side::Sell => self.delta_bear,
        }
    }

    /// Candle, chop, MFI and MA gates for `side`, relaxed per `mode`.
    #[must_use]
    pub fn filters_agree(&self, side: Side, mode: TestingMode) -> bool {
        let relax_candle = mode != TestingMode::Off;
        let relax_all = mode == TestingMode::RelaxedAll;
        let (candle, chop, mfi, ma) = match side {
            Side::Buy => (self.strong_bull, self.chop_bull, self.mfi_bull, self.ma_bull),
            Side::Sell => (self.strong_bear, self.chop_bear, self.mfi_bear, self.ma_bear),
        };
        (candle || relax_candle) && ((chop && mfi && ma) || relax_all)
    }
}

/// Multi-indicator engine: EMA 8/13/21/55 trend, strong-candle pattern,
/// DI chop filter, MFI and optional MA filter, gated by order-flow delta.
#[derive(Debug, Clone)]
pub struct MainEngine {
    config: MainEngineConfig,
    ema_fast: ExponentialMa,
    ema_medium: ExponentialMa,
    ema_slow: ExponentialMa,
    ema_trend: ExponentialMa,
    atr: AverageTrueRange,
    mfi: MoneyFlowIndex,
    directional: DirectionalMovement,
    heiken_ashi: HeikenAshiState,
    /// Candle that fed the indicators on the last bar (Heiken-Ashi or raw).
    candle: Option<HeikenAshiBar>,
}

impl MainEngine {
    /// # Errors
    /// Returns `ConfigError` when the config does not validate.
    pub fn new(config: &MainEngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            ema_fast: ExponentialMa::new(config.ema_fast)?,
            ema_medium: ExponentialMa::new(config.ema_medium)?,
            ema_slow: ExponentialMa::new(config.ema_slow)?,
            ema_trend: ExponentialMa::new(config.ema_trend)?,
            atr: AverageTrueRange::new(config.atr_period)?,
            mfi: MoneyFlowIndex::new(config.mfi_period)?,
            directional: DirectionalMovement::new(),
            heiken_ashi: None,
            candle: None,
            config: config.clone(),
        })
    }

    pub fn on_bar(&mut self, bar: &Bar) {
        let candle = if self.config.use_heiken_ashi {
            update_heiken_ashi(&mut self.heiken_ashi, bar.open, bar.high, bar.low, bar.close)
        } else {
            HeikenAshiBar {
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            }
        };

        self.ema_fast.update(candle.close);
        self.ema_medium.update(candle.close);
        self.ema_slow.update(candle.close);
        self.ema_trend.update(candle.close);
        self.atr.update(candle.high, candle.low, candle.close);
        self.mfi.update(candle.high, candle.low, candle.close, bar.volume);
        self.directional.update(candle.high, candle.low, candle.close);
        self.candle = Some(candle);
    }

    #[must_use]
    pub fn atr(&self) -> f64 {
        self.atr.value()
    }

    #[must_use]
    pub const fn di(&self) -> DirectionalIndex {
        self.directional.value()
    }

    #[must_use]
    pub fn evaluate(&self, price: f64, features: &FeatureSnapshot) -> MainDecision {
        let dc = features.delta_confidence;
        let (Some(candle), Some(e8), Some(e13), Some(e21), Some(e55)) = (
            self.candle,
            self.ema_fast.value(),
            self.ema_medium.value(),
            self.ema_slow.value(),
            self.ema_trend.value(),
        ) else {
            return MainDecision::warming_up(dc);
        };

        let s21 = self.ema_slow.slope();
        let s55 = self.ema_trend.slope();
        let di = self.directional.value();
        let mfi = self.mfi.value();
        let threshold = self.config.delta_threshold;

        let trend_bull = price > e21 && s21 >= 0.0 && price > e55 && s55 >= 0.0;
        let trend_bear = price < e21 && s21 <= 0.0 && price < e55 && s55 <= 0.0;
        let delta_bull = dc >= threshold;
        let delta_bear = 1.0 - dc >= threshold;
        let strong_bull =
            (candle.open - candle.low).abs() <= CANDLE_EPSILON && price > e8 && price > e21;
        let strong_bear =
            (candle.open - candle.high).abs() <= CANDLE_EPSILON && price < e8 && price < e21;
        let chop_bull = di.bullish(self.config.di_threshold);
        let chop_bear = di.bearish(self.config.di_threshold);
        let mfi_bull = mfi.is_nan() || mfi > self.config.mfi_bull;
        let mfi_bear = mfi.is_nan() || mfi < self.config.mfi_bear;
        let ma_bull = !self.config.use_ma_filter || price > e13;
        let ma_bear = !self.config.use_ma_filter || price < e13;

        let mut decision = MainDecision {
            side: None,
            reason: String::new(),
            delta_confidence: dc,
            ema_fast: e8,
            ema_medium: e13,
            ema_slow: e21,
            ema_trend: e55,
            ema_slow_slope: s21,
            ema_trend_slope: s55,
            atr: self.atr.value(),
            mfi,
            di_plus: di.plus,
            di_minus: di.minus,
            trend_bull,
            trend_bear,
            delta_bull,
            delta_bear,
            strong_bull,
            strong_bear,
            chop_bull,
            chop_bear,
            mfi_bull,
            mfi_bear,
            ma_bull,
            ma_bear,
        };

        let Some(side) = decision.trend_side() else {
            decision.reason = "no_trend".to_string();
            return decision;
        };
        let (trend_tag, delta_tag, candle_tag) = match side {
            Side::Buy => ("trend_up", "delta>=thr", "strong_bull"),
            Side::Sell => ("trend_dn", "delta<=1-thr", "strong_bear"),
        };
        let (delta_ok, candle_ok, chop_ok, mfi_ok, ma_ok) = match side {
            Side::Buy => (delta_bull, strong_bull, chop_bull, mfi_bull, ma_bull),
            Side::Sell => (delta_bear, strong_bear, chop_bear, mfi_bear, ma_bear),
        };

        let failed = [
            (delta_ok, "delta_weak"),
            (candle_ok, "no_strong_candle"),
            (chop_ok, "chop"),
            (mfi_ok, "mfi_gate"),
            (ma_ok, "ma_filter"),
        ]
        .into_iter()
        .find(|(ok, _)| !ok);

        match failed {
            Some((_, gate)) => {
                decision.reason = format!("{trend_tag} & {gate}");
            }
            None => {
                decision.side = Some(side);
                decision.reason =
                    format!("{trend_tag} & {delta_tag} & {candle_tag} & di_ok & mfi_ok");
            }
        }

        tracing::debug!(
            price,
            dc,
            ema21 = e21,
            ema55 = e55,
            di_plus = di.plus,
            di_minus = di.minus,
            mfi,
            reason = %decision.reason,
            "Main engine evaluated"
        );
        decision
    }
}
