use crate::error::{ensure_period, ensure_positive, ensure_unit_interval, ConfigError};
use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level settings for one trader process (one instrument, many accounts).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub symbol: SymbolConfig,
    pub bars: BarConfig,
    pub features: FeatureConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub bracket: BracketConfig,
    pub exit: ExitConfig,
    pub trading_window: TradingWindowConfig,
    pub sync: SyncConfig,
    pub dispatch: DispatchConfig,
    pub execution_mode: ExecutionMode,
}

impl AppConfig {
    /// Validates every section.
    ///
    /// # Errors
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.root.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol.root must not be empty".into()));
        }
        self.bars.validate()?;
        self.features.validate()?;
        self.strategy.validate()?;
        self.risk.validate()?;
        self.sizing.validate()?;
        self.bracket.validate()?;
        self.exit.validate()?;
        self.sync.validate()?;
        self.dispatch.validate()?;
        if let Some(primary) = &self.strategy.combined.primary_source {
            if !self.bars.sources.iter().any(|s| &s.name == primary) {
                return Err(ConfigError::Invalid(format!(
                    "primary source '{primary}' is not a configured bar source"
                )));
            }
        }
        Ok(())
    }
}

/// Execution mode for order routing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Orders go to the in-process paper broker
    #[default]
    Paper,
    /// Orders go to the live broker adapter supplied by the host
    Live,
}

// =============================================================================
// Instrument
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    /// Futures root, e.g. `NQ`.
    pub root: String,
    /// Explicit contract. When absent the front month is resolved from the root.
    pub contract: Option<String>,
    pub exchange: String,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            root: "NQ".to_string(),
            contract: None,
            exchange: "CME".to_string(),
        }
    }
}

// =============================================================================
// Bars and features
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BarKind {
    /// Fixed wall-clock window.
    Time { seconds: f64 },
    /// Fixed number of ticks per bar.
    Ticks { count: u32 },
    /// Heiken-Ashi breakout bars.
    Tbars { base_size: f64, tick_size: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BarSourceConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: BarKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarConfig {
    pub sources: Vec<BarSourceConfig>,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                BarSourceConfig {
                    name: "1m".to_string(),
                    kind: BarKind::Time { seconds: 60.0 },
                },
                BarSourceConfig {
                    name: "233t".to_string(),
                    kind: BarKind::Ticks { count: 233 },
                },
                BarSourceConfig {
                    name: "tbars".to_string(),
                    kind: BarKind::Tbars {
                        base_size: 12.0,
                        tick_size: 0.25,
                    },
                },
            ],
        }
    }
}

impl BarConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one bar source is required".into()));
        }
        for (i, source) in self.sources.iter().enumerate() {
            if self.sources[..i].iter().any(|s| s.name == source.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate bar source '{}'",
                    source.name
                )));
            }
            match source.kind {
                BarKind::Time { seconds } => {
                    ensure_positive("bars.time.seconds", seconds)?;
                }
                BarKind::Ticks { count } => {
                    ensure_period("bars.ticks.count", count as usize)?;
                }
                BarKind::Tbars {
                    base_size,
                    tick_size,
                } => {
                    ensure_positive("bars.tbars.base_size", base_size)?;
                    ensure_positive("bars.tbars.tick_size", tick_size)?;
                }
            }
        }
        Ok(())
    }
}

/// Relative weights of the three order-flow factors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureWeights {
    pub cvd_slope: f64,
    pub depth_imbalance: f64,
    pub aggressive_buy_ratio: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            cvd_slope: 0.4,
            depth_imbalance: 0.3,
            aggressive_buy_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Ring buffer length of the tick-level engine.
    pub tick_window: usize,
    /// Bar window of the bar-level engine.
    pub bar_window: usize,
    pub weights: FeatureWeights,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            tick_window: 256,
            bar_window: 20,
            weights: FeatureWeights::default(),
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure_period("features.tick_window", self.tick_window)?;
        ensure_period("features.bar_window", self.bar_window)?;
        let w = self.weights;
        for (name, value) in [
            ("features.weights.cvd_slope", w.cvd_slope),
            ("features.weights.depth_imbalance", w.depth_imbalance),
            ("features.weights.aggressive_buy_ratio", w.aggressive_buy_ratio),
        ] {
            ensure_unit_interval(name, value)?;
        }
        Ok(())
    }
}

// =============================================================================
// Strategy
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrategyConfig {
    pub baseline: BaselineConfig,
    pub main: MainEngineConfig,
    pub enhanced: EnhancedConfig,
    pub combined: CombinedConfig,
}

impl StrategyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.baseline.validate()?;
        self.main.validate()?;
        self.enhanced.validate()?;
        self.combined.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaselineConfig {
    pub ema_period: usize,
    pub delta_threshold: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            ema_period: 21,
            delta_threshold: 0.6,
        }
    }
}

impl BaselineConfig {
    /// # Errors
    /// Returns `ConfigError` for a zero period or a threshold outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_period("baseline.ema_period", self.ema_period)?;
        ensure_unit_interval("baseline.delta_threshold", self.delta_threshold)?;
        Ok(())
    }
}

/// Multi-indicator engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MainEngineConfig {
    pub ema_fast: usize,
    pub ema_medium: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub atr_period: usize,
    pub mfi_period: usize,
    pub delta_threshold: f64,
    /// Minimum DI of the dominant side for the chop filter.
    pub di_threshold: f64,
    pub mfi_bull: f64,
    pub mfi_bear: f64,
    /// Feed indicators from the Heiken-Ashi transform instead of raw bars.
    pub use_heiken_ashi: bool,
    /// Require price on the trade side of the medium EMA.
    pub use_ma_filter: bool,
}

impl Default for MainEngineConfig {
    fn default() -> Self {
        Self {
            ema_fast: 8,
            ema_medium: 13,
            ema_slow: 21,
            ema_trend: 55,
            atr_period: 8,
            mfi_period: 10,
            delta_threshold: 0.6,
            di_threshold: 45.0,
            mfi_bull: 52.0,
            mfi_bear: 48.0,
            use_heiken_ashi: true,
            use_ma_filter: false,
        }
    }
}

impl MainEngineConfig {
    /// # Errors
    /// Returns `ConfigError` for zero periods or out-of-range thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_period("main.ema_fast", self.ema_fast)?;
        ensure_period("main.ema_medium", self.ema_medium)?;
        ensure_period("main.ema_slow", self.ema_slow)?;
        ensure_period("main.ema_trend", self.ema_trend)?;
        ensure_period("main.atr_period", self.atr_period)?;
        ensure_period("main.mfi_period", self.mfi_period)?;
        ensure_unit_interval("main.delta_threshold", self.delta_threshold)?;
        if !(0.0..=100.0).contains(&self.di_threshold) {
            return Err(ConfigError::InvalidThreshold {
                name: "main.di_threshold",
                value: self.di_threshold,
                expected: "[0, 100]",
            });
        }
        if self.mfi_bear > self.mfi_bull {
            return Err(ConfigError::Invalid(
                "main.mfi_bear must not exceed main.mfi_bull".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_delta_threshold(mut self, threshold: f64) -> Self {
        self.delta_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_heiken_ashi(mut self, enabled: bool) -> Self {
        self.use_heiken_ashi = enabled;
        self
    }

    #[must_use]
    pub fn with_ma_filter(mut self, enabled: bool) -> Self {
        self.use_ma_filter = enabled;
        self
    }
}

/// DI chop + order-flow surge engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnhancedConfig {
    /// Attach an enhanced engine to every bar source as an extra confirmer.
    pub enabled: bool,
    pub di_len: usize,
    pub di_threshold: f64,
    pub delta_lookback: usize,
    /// Z-score needed for an order-flow surge.
    pub delta_z: f64,
    pub confirm_bars: u32,
    pub cooldown: u32,
    pub use_heiken_ashi: bool,
    pub use_profit_wave: bool,
    pub profit_wave_fast: usize,
    pub profit_wave_slow: usize,
}

impl Default for EnhancedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            di_len: 14,
            di_threshold: 45.0,
            delta_lookback: 50,
            delta_z: 2.0,
            confirm_bars: 2,
            cooldown: 3,
            use_heiken_ashi: true,
            use_profit_wave: true,
            profit_wave_fast: 34,
            profit_wave_slow: 144,
        }
    }
}

impl EnhancedConfig {
    /// Looser preset used for paper sessions: lower DI and z-score gates.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            di_threshold: 25.0,
            delta_z: 1.5,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_confirm_bars(mut self, bars: u32) -> Self {
        self.confirm_bars = bars;
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, bars: u32) -> Self {
        self.cooldown = bars;
        self
    }

    /// # Errors
    /// Returns `ConfigError` for zero lengths or inconsistent profit-wave spans.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_period("enhanced.di_len", self.di_len)?;
        ensure_period("enhanced.delta_lookback", self.delta_lookback)?;
        ensure_period("enhanced.confirm_bars", self.confirm_bars as usize)?;
        ensure_period("enhanced.profit_wave_fast", self.profit_wave_fast)?;
        ensure_period("enhanced.profit_wave_slow", self.profit_wave_slow)?;
        ensure_positive("enhanced.delta_z", self.delta_z)?;
        if self.profit_wave_fast >= self.profit_wave_slow {
            return Err(ConfigError::Invalid(
                "enhanced.profit_wave_fast must be shorter than profit_wave_slow".into(),
            ));
        }
        Ok(())
    }
}

/// Gate relaxation for paper sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestingMode {
    #[default]
    Off,
    /// Strong-candle gate always passes.
    RelaxedCandle,
    /// Candle, chop, MFI and MA gates pass and cross-source confirmation is skipped.
    RelaxedAll,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackgroundTrendConfig {
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub mfi_period: usize,
}

impl Default for BackgroundTrendConfig {
    fn default() -> Self {
        Self {
            atr_period: 8,
            atr_multiplier: 1.3,
            ema_fast: 8,
            ema_slow: 21,
            mfi_period: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CombinedConfig {
    /// Source whose agreement alone confirms a candidate.
    pub primary_source: Option<String>,
    pub confirmation_window_secs: f64,
    pub testing_mode: TestingMode,
    pub background: BackgroundTrendConfig,
}

impl Default for CombinedConfig {
    fn default() -> Self {
        Self {
            primary_source: Some("1m".to_string()),
            confirmation_window_secs: 10.0,
            testing_mode: TestingMode::Off,
            background: BackgroundTrendConfig::default(),
        }
    }
}

impl CombinedConfig {
    #[must_use]
    pub fn with_primary_source(mut self, source: Option<&str>) -> Self {
        self.primary_source = source.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_testing_mode(mut self, mode: TestingMode) -> Self {
        self.testing_mode = mode;
        self
    }

    #[must_use]
    pub fn confirmation_window(&self) -> chrono::Duration {
        secs_to_duration(self.confirmation_window_secs)
    }

    /// # Errors
    /// Returns `ConfigError` for a non-positive window or zero periods.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive(
            "combined.confirmation_window_secs",
            self.confirmation_window_secs,
        )?;
        ensure_period("combined.background.atr_period", self.background.atr_period)?;
        ensure_period("combined.background.ema_fast", self.background.ema_fast)?;
        ensure_period("combined.background.ema_slow", self.background.ema_slow)?;
        ensure_period("combined.background.mfi_period", self.background.mfi_period)?;
        ensure_positive(
            "combined.background.atr_multiplier",
            self.background.atr_multiplier,
        )?;
        Ok(())
    }
}

// =============================================================================
// Risk and execution
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskConfig {
    /// Realized daily loss that latches an account off.
    #[serde(default = "default_max_daily_drawdown")]
    pub max_daily_drawdown: Decimal,
    /// Largest absolute net position per account, in contracts.
    #[serde(default = "default_max_position")]
    pub max_position: i64,
    #[serde(default = "default_max_orders_per_minute")]
    pub max_orders_per_minute: usize,
    /// Accounts allowed to trade. Empty means every account.
    #[serde(default)]
    pub test_accounts: Vec<String>,
}

fn default_max_daily_drawdown() -> Decimal {
    Decimal::from(250)
}

const fn default_max_position() -> i64 {
    4
}

const fn default_max_orders_per_minute() -> usize {
    60
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_drawdown: default_max_daily_drawdown(),
            max_position: default_max_position(),
            max_orders_per_minute: default_max_orders_per_minute(),
            test_accounts: Vec::new(),
        }
    }
}

impl RiskConfig {
    /// Tight limits for a first session on a funded account.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            max_daily_drawdown: Decimal::from(100),
            max_position: 1,
            max_orders_per_minute: 10,
            test_accounts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_max_daily_drawdown(mut self, drawdown: Decimal) -> Self {
        self.max_daily_drawdown = drawdown;
        self
    }

    #[must_use]
    pub fn with_max_position(mut self, max_position: i64) -> Self {
        self.max_position = max_position;
        self
    }

    #[must_use]
    pub fn with_max_orders_per_minute(mut self, max_orders: usize) -> Self {
        self.max_orders_per_minute = max_orders;
        self
    }

    #[must_use]
    pub fn with_test_accounts(mut self, accounts: Vec<String>) -> Self {
        self.test_accounts = accounts;
        self
    }

    /// Whether `account_id` passes the allow-list.
    #[must_use]
    pub fn is_allowed(&self, account_id: &str) -> bool {
        self.test_accounts.is_empty() || self.test_accounts.iter().any(|a| a == account_id)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_daily_drawdown <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "risk.max_daily_drawdown must be positive".into(),
            ));
        }
        if self.max_position <= 0 {
            return Err(ConfigError::Invalid("risk.max_position must be positive".into()));
        }
        ensure_period("risk.max_orders_per_minute", self.max_orders_per_minute)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizingConfig {
    pub base_size: u32,
    pub max_size: u32,
    pub confidence_multiplier: bool,
    pub volatility_adjustment: bool,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_size: 1,
            max_size: 2,
            confidence_multiplier: true,
            volatility_adjustment: true,
        }
    }
}

impl SizingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure_period("sizing.base_size", self.base_size as usize)?;
        ensure_period("sizing.max_size", self.max_size as usize)?;
        if self.base_size > self.max_size {
            return Err(ConfigError::Invalid(
                "sizing.base_size must not exceed sizing.max_size".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BracketConfig {
    pub tick_size: f64,
    pub use_atr: bool,
    pub target_atr_multiplier: f64,
    pub stop_atr_multiplier: f64,
    pub signal_target_multiplier: f64,
    pub signal_stop_multiplier: f64,
    pub min_signal_ticks: u32,
    pub min_atr_target_ticks: u32,
    pub min_atr_stop_ticks: u32,
    pub fallback_target_ticks: u32,
    pub fallback_stop_ticks: u32,
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            use_atr: true,
            target_atr_multiplier: 1.5,
            stop_atr_multiplier: 0.8,
            signal_target_multiplier: 1.5,
            signal_stop_multiplier: 0.8,
            min_signal_ticks: 4,
            min_atr_target_ticks: 8,
            min_atr_stop_ticks: 4,
            fallback_target_ticks: 16,
            fallback_stop_ticks: 8,
        }
    }
}

impl BracketConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("bracket.tick_size", self.tick_size)?;
        ensure_positive("bracket.target_atr_multiplier", self.target_atr_multiplier)?;
        ensure_positive("bracket.stop_atr_multiplier", self.stop_atr_multiplier)?;
        ensure_positive(
            "bracket.signal_target_multiplier",
            self.signal_target_multiplier,
        )?;
        ensure_positive("bracket.signal_stop_multiplier", self.signal_stop_multiplier)?;
        ensure_period("bracket.fallback_target_ticks", self.fallback_target_ticks as usize)?;
        ensure_period("bracket.fallback_stop_ticks", self.fallback_stop_ticks as usize)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExitConfig {
    pub time_based_exit: bool,
    pub max_hold_minutes: i64,
    pub profit_target_early_ticks: u32,
    pub breakeven_activation_ticks: u32,
    pub momentum_exit: bool,
    pub momentum_threshold: f64,
    /// Currency value of one tick per contract.
    pub tick_value: Decimal,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            time_based_exit: true,
            max_hold_minutes: 15,
            profit_target_early_ticks: 8,
            breakeven_activation_ticks: 6,
            momentum_exit: true,
            momentum_threshold: 0.3,
            tick_value: Decimal::from(5),
        }
    }
}

impl ExitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_hold_minutes <= 0 {
            return Err(ConfigError::Invalid("exit.max_hold_minutes must be positive".into()));
        }
        if self.tick_value <= Decimal::ZERO {
            return Err(ConfigError::Invalid("exit.tick_value must be positive".into()));
        }
        ensure_unit_interval("exit.momentum_threshold", self.momentum_threshold)?;
        Ok(())
    }
}

/// Session window in exchange-local time; orders outside it are refused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TradingWindowConfig {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub timezone: Tz,
}

impl Default for TradingWindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: chrono_tz::America::New_York,
        }
    }
}

impl TradingWindowConfig {
    /// Whether `now` falls inside `[start, end]` local time. Always true when disabled.
    #[must_use]
    pub fn contains(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        let local = now.with_timezone(&self.timezone).time();
        if self.start <= self.end {
            self.start <= local && local <= self.end
        } else {
            // Window wraps midnight
            local >= self.start || local <= self.end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between signals for one account.
    pub sync_cooldown_secs: f64,
    /// Per-account execution task timeout.
    pub task_timeout_secs: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_cooldown_secs: 5.0,
            task_timeout_secs: 30.0,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn cooldown(&self) -> chrono::Duration {
        secs_to_duration(self.sync_cooldown_secs)
    }

    #[must_use]
    pub fn task_timeout(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.task_timeout_secs.max(0.0))
            .unwrap_or(std::time::Duration::from_secs_f64(MAX_DURATION_SECS))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure_duration_secs("sync.sync_cooldown_secs", self.sync_cooldown_secs, true)?;
        ensure_duration_secs("sync.task_timeout_secs", self.task_timeout_secs, false)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    pub long_enabled: bool,
    pub short_enabled: bool,
    pub dispatch_cooldown_secs: f64,
    pub max_signals_per_minute: usize,
    /// Route signals to this sync group instead of every enabled account.
    pub sync_group: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            long_enabled: true,
            short_enabled: true,
            dispatch_cooldown_secs: 5.0,
            max_signals_per_minute: 10,
            sync_group: None,
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn cooldown(&self) -> chrono::Duration {
        secs_to_duration(self.dispatch_cooldown_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure_duration_secs(
            "dispatch.dispatch_cooldown_secs",
            self.dispatch_cooldown_secs,
            true,
        )?;
        ensure_period("dispatch.max_signals_per_minute", self.max_signals_per_minute)?;
        Ok(())
    }
}

/// Longest cooldown or timeout accepted from configuration: one day.
const MAX_DURATION_SECS: f64 = 86_400.0;

fn ensure_duration_secs(
    name: &'static str,
    value: f64,
    allow_zero: bool,
) -> Result<(), ConfigError> {
    let above_floor = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !value.is_finite() || !above_floor || value > MAX_DURATION_SECS {
        return Err(ConfigError::InvalidThreshold {
            name,
            value,
            expected: if allow_zero { "in [0, 86400]" } else { "in (0, 86400]" },
        });
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn secs_to_duration(secs: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}
