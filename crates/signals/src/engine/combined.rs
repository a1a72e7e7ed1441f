//! Combined signal layer: one set of engines per named bar source.
//!
//! Per evaluation a source moves `IDLE → ARMED(side) → CONFIRMED(side)`:
//!
//! 1. An armed side is dropped when the main trend no longer agrees or the
//!    baseline shows the opposite side.
//! 2. From idle, a baseline side that agrees with the main trend arms.
//! 3. An armed side confirms when the delta still agrees and either the main
//!    engine's candle/chop/MFI/MA filters or the enhanced engine agree.
//! 4. A confirmed side must pass the cross-source check and agree with the
//!    background trend before it is emitted.
//!
//! Confirmation never outlives one emission: the armed side is cleared as
//! soon as it confirms.

use super::background::{BackgroundTrend, TrendState};
use super::baseline::{BaselineDecision, BaselineEngine};
use super::enhanced::{EnhancedEngine, EnhancedResult};
use super::main_engine::{MainDecision, MainEngine};
use crate::features::FeatureSnapshot;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use smm_core::{Bar, ConfigError, Side, StrategyConfig, TestingMode};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrossSourceOutcome {
    /// No other source has reported yet.
    Bootstrap,
    Primary,
    Majority,
    /// Skipped by `TestingMode::RelaxedAll`.
    Skipped,
    Unconfirmed,
}

impl CrossSourceOutcome {
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        !matches!(self, Self::Unconfirmed)
    }

    #[must_use]
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Bootstrap => "xsource_bootstrap",
            Self::Primary => "xsource_primary",
            Self::Majority => "xsource_majority",
            Self::Skipped => "xsource_skipped",
            Self::Unconfirmed => "xsource_unconfirmed",
        }
    }
}

/// Last confirmed side per source, used to cross-check new candidates.
#[derive(Debug, Clone)]
pub struct SourceActivity {
    primary: Option<String>,
    non_primary: usize,
    window: Duration,
    last: HashMap<String, (Side, DateTime<Utc>)>,
}

impl SourceActivity {
    #[must_use]
    pub fn new(primary: Option<String>, sources: &[String], window: Duration) -> Self {
        let non_primary = sources
            .iter()
            .filter(|s| primary.as_deref() != Some(s.as_str()))
            .count();
        Self {
            primary,
            non_primary,
            window,
            last: HashMap::new(),
        }
    }

    #[must_use]
    pub fn last_seen(&self, source: &str) -> Option<(Side, DateTime<Utc>)> {
        self.last.get(source).copied()
    }

    /// Records `side` for `source`, then checks it against the other sources.
    pub fn confirm(&mut self, source: &str, side: Side, now: DateTime<Utc>) -> CrossSourceOutcome {
        let others_seen = self.last.keys().any(|k| k != source);
        self.last.insert(source.to_string(), (side, now));
        if !others_seen {
            return CrossSourceOutcome::Bootstrap;
        }

        let window = self.window;
        let agrees = |entry: &(Side, DateTime<Utc>)| entry.0 == side && now - entry.1 <= window;

        if let Some(primary) = self.primary.as_deref() {
            if self.last.get(primary).is_some_and(agrees) {
                return CrossSourceOutcome::Primary;
            }
        }

        let matches = self
            .last
            .iter()
            .filter(|(name, _)| self.primary.as_deref() != Some(name.as_str()))
            .filter(|(_, entry)| agrees(entry))
            .count();
        if self.non_primary > 0 && matches * 2 > self.non_primary {
            CrossSourceOutcome::Majority
        } else {
            CrossSourceOutcome::Unconfirmed
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedDecision {
    pub source: String,
    pub side: Option<Side>,
    pub reason: String,
    /// Armed side carried into the next bar, if any.
    pub armed: Option<Side>,
    pub trend: TrendState,
    pub cross_source: Option<CrossSourceOutcome>,
    /// Delta confidence in the direction of `side` (raw value on hold).
    pub confidence: f64,
    pub atr: f64,
    pub main: MainDecision,
    pub baseline: BaselineDecision,
    pub enhanced: Option<EnhancedResult>,
}

#[derive(Debug, Clone)]
struct SourceEngines {
    baseline: BaselineEngine,
    main: MainEngine,
    background: BackgroundTrend,
    enhanced: Option<EnhancedEngine>,
    last_enhanced: Option<EnhancedResult>,
    armed: Option<Side>,
}

impl SourceEngines {
    fn new(config: &StrategyConfig) -> Result<Self, ConfigError> {
        let enhanced = if config.enhanced.enabled {
            Some(EnhancedEngine::new(&config.enhanced)?)
        } else {
            None
        };
        Ok(Self {
            baseline: BaselineEngine::new(&config.baseline)?,
            main: MainEngine::new(&config.main)?,
            background: BackgroundTrend::new(&config.combined.background)?,
            enhanced,
            last_enhanced: None,
            armed: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CombinedEngine {
    testing_mode: TestingMode,
    sources: HashMap<String, SourceEngines>,
    activity: SourceActivity,
}

impl CombinedEngine {
    /// # Errors
    /// Returns `ConfigError` when any engine config fails validation.
    pub fn new<I, S>(config: &StrategyConfig, sources: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        config.combined.validate()?;
        let names: Vec<String> = sources.into_iter().map(Into::into).collect();
        let mut engines = HashMap::with_capacity(names.len());
        for name in &names {
            engines.insert(name.clone(), SourceEngines::new(config)?);
        }
        Ok(Self {
            testing_mode: config.combined.testing_mode,
            activity: SourceActivity::new(
                config.combined.primary_source.clone(),
                &names,
                config.combined.confirmation_window(),
            ),
            sources: engines,
        })
    }

    #[must_use]
    pub fn sources(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub const fn testing_mode(&self) -> TestingMode {
        self.testing_mode
    }

    pub fn set_testing_mode(&mut self, mode: TestingMode) {
        self.testing_mode = mode;
    }

    #[must_use]
    pub fn armed(&self, source: &str) -> Option<Side> {
        self.sources.get(source).and_then(|s| s.armed)
    }

    #[must_use]
    pub fn trend(&self, source: &str) -> Option<TrendState> {
        self.sources.get(source).map(|s| s.background.state())
    }

    #[must_use]
    pub const fn activity(&self) -> &SourceActivity {
        &self.activity
    }

    /// Feeds a completed bar and its order-flow delta to `source`'s engines.
    pub fn on_bar(&mut self, source: &str, bar: &Bar, delta: f64) {
        let Some(engines) = self.sources.get_mut(source) else {
            tracing::warn!(source, "Bar for unknown source ignored");
            return;
        };
        engines.main.on_bar(bar);
        engines.background.on_bar(bar);
        if let Some(enhanced) = engines.enhanced.as_mut() {
            enhanced.add_bar(bar, delta);
            engines.last_enhanced = Some(enhanced.generate_signal());
        }
    }

    /// Runs one evaluation for `source`. Returns `None` for an unknown source.
    pub fn evaluate(
        &mut self,
        source: &str,
        price: f64,
        features: &FeatureSnapshot,
        now: DateTime<Utc>,
    ) -> Option<CombinedDecision> {
        let mode = self.testing_mode;
        let Some(engines) = self.sources.get_mut(source) else {
            tracing::warn!(source, "Evaluation for unknown source ignored");
            return None;
        };

        let baseline = engines.baseline.evaluate(price, features);
        let main = engines.main.evaluate(price, features);
        let trend_side = main.trend_side();
        let enhanced = engines.last_enhanced.clone();
        let mut decision = CombinedDecision {
            source: source.to_string(),
            side: None,
            reason: String::new(),
            armed: None,
            trend: engines.background.state(),
            cross_source: None,
            confidence: features.delta_confidence,
            atr: engines.main.atr(),
            main,
            baseline,
            enhanced,
        };

        if let Some(armed) = engines.armed {
            if trend_side != Some(armed) || decision.baseline.side == Some(armed.opposite()) {
                tracing::debug!(source, %armed, "Disarmed");
                engines.armed = None;
            }
        }

        if engines.armed.is_none() {
            engines.armed = decision.baseline.side.filter(|s| trend_side == Some(*s));
        }

        let Some(candidate) = engines.armed else {
            decision.reason = format!("idle: {}", decision.main.reason);
            return Some(decision);
        };

        let filters_ok = decision.main.filters_agree(candidate, mode);
        let enhanced_ok = decision
            .enhanced
            .as_ref()
            .is_some_and(|e| e.side == Some(candidate));
        if !decision.main.delta_agrees(candidate) || !(filters_ok || enhanced_ok) {
            decision.armed = Some(candidate);
            decision.reason = match candidate {
                Side::Buy => "armed_buy".to_string(),
                Side::Sell => "armed_sell".to_string(),
            };
            return Some(decision);
        }
        engines.armed = None;

        let cross_source = if mode == TestingMode::RelaxedAll {
            CrossSourceOutcome::Skipped
        } else {
            self.activity.confirm(source, candidate, now)
        };
        decision.cross_source = Some(cross_source);
        if !cross_source.is_confirmed() {
            tracing::debug!(source, %candidate, "Cross-source confirmation missing");
            decision.reason = cross_source.as_tag().to_string();
            return Some(decision);
        }

        if decision.trend.side() != Some(candidate) {
            tracing::debug!(
                source,
                %candidate,
                trend = %decision.trend,
                "Background trend disagrees"
            );
            decision.reason = "dash_trend_mismatch".to_string();
            return Some(decision);
        }

        let (trend_tag, delta_tag) = match candidate {
            Side::Buy => ("trend_up", "delta>=thr"),
            Side::Sell => ("trend_dn", "delta<=1-thr"),
        };
        let confirm_tag = if filters_ok {
            "confirm_filters"
        } else {
            "confirm_enhanced"
        };
        decision.side = Some(candidate);
        decision.confidence = match candidate {
            Side::Buy => features.delta_confidence,
            Side::Sell => 1.0 - features.delta_confidence,
        };
        decision.reason = format!(
            "{trend_tag} & {delta_tag} & {confirm_tag} & {} & dash_{}",
            cross_source.as_tag(),
            decision.trend
        );
        tracing::info!(
            source,
            side = %candidate,
            price,
            confidence = decision.confidence,
            reason = %decision.reason,
            "Combined signal"
        );
        Some(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{BarData, BarFeatureEngine};
    use chrono::TimeZone;
    use smm_core::CombinedConfig;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap()
    }

    fn rising_bar(i: i64) -> Bar {
        let close = 100.0 + i as f64;
        let start = t0() + Duration::minutes(i);
        Bar {
            open: close - 1.0,
            high: close,
            low: close - 1.0,
            close,
            volume: 100.0,
            start_ts: start,
            end_ts: start + Duration::minutes(1),
        }
    }

    fn falling_bar(i: i64) -> Bar {
        let close = 100.0 - i as f64;
        let start = t0() + Duration::minutes(i);
        Bar {
            open: close + 1.0,
            high: close + 1.0,
            low: close,
            close,
            volume: 100.0,
            start_ts: start,
            end_ts: start + Duration::minutes(1),
        }
    }

    fn features(dc: f64) -> FeatureSnapshot {
        FeatureSnapshot::neutral().with_delta_confidence(dc)
    }

    // ==================== Cross-source Tests ====================

    fn activity() -> SourceActivity {
        let sources = vec!["1m".to_string(), "233t".to_string(), "tbars".to_string()];
        SourceActivity::new(Some("1m".to_string()), &sources, Duration::seconds(10))
    }

    #[test]
    fn test_first_source_bootstraps() {
        let mut activity = activity();
        assert_eq!(
            activity.confirm("233t", Side::Buy, t0()),
            CrossSourceOutcome::Bootstrap
        );
        assert_eq!(activity.last_seen("233t"), Some((Side::Buy, t0())));
    }

    #[test]
    fn test_non_primary_majority() {
        let mut activity = activity();
        activity.confirm("233t", Side::Buy, t0());
        assert_eq!(
            activity.confirm("tbars", Side::Buy, t0() + Duration::seconds(2)),
            CrossSourceOutcome::Majority
        );
        // one of two non-primary sources is not a strict majority
        assert_eq!(
            activity.confirm("tbars", Side::Sell, t0() + Duration::seconds(3)),
            CrossSourceOutcome::Unconfirmed
        );
    }

    #[test]
    fn test_primary_confirms_alone() {
        let mut activity = activity();
        activity.confirm("233t", Side::Buy, t0());
        assert_eq!(
            activity.confirm("1m", Side::Sell, t0() + Duration::seconds(4)),
            CrossSourceOutcome::Primary
        );
        assert_eq!(
            activity.confirm("233t", Side::Sell, t0() + Duration::seconds(5)),
            CrossSourceOutcome::Primary
        );
    }

    #[test]
    fn test_stale_activity_does_not_confirm() {
        let mut activity = activity();
        activity.confirm("1m", Side::Buy, t0());
        activity.confirm("tbars", Side::Buy, t0());
        assert_eq!(
            activity.confirm("233t", Side::Buy, t0() + Duration::seconds(30)),
            CrossSourceOutcome::Unconfirmed
        );
    }

    // ==================== Combined Flow Tests ====================

    #[test]
    fn test_bullish_bars_emit_buy_only() {
        let config = StrategyConfig::default();
        let mut engine = CombinedEngine::new(&config, ["1m"]).unwrap();
        let mut bar_features = BarFeatureEngine::new(20).unwrap();

        let mut buys = Vec::new();
        let mut sells = 0;
        for i in 0..30 {
            let bar = rising_bar(i);
            let data = BarData {
                bar,
                buy_volume: bar.volume * 0.7,
                sell_volume: bar.volume * 0.3,
            };
            bar_features.add_bar(data);
            engine.on_bar("1m", &bar, data.delta());
            let snapshot = bar_features.snapshot();
            let decision = engine
                .evaluate("1m", bar.close, &snapshot.flow, bar.end_ts)
                .unwrap();
            match decision.side {
                Some(Side::Buy) => buys.push(decision),
                Some(Side::Sell) => sells += 1,
                None => {}
            }
        }

        assert!(!buys.is_empty());
        assert_eq!(sells, 0);
        let first = &buys[0];
        assert!(first.reason.contains("trend_up"), "{}", first.reason);
        assert!(first.reason.contains("delta>=thr"), "{}", first.reason);
        assert_eq!(first.cross_source, Some(CrossSourceOutcome::Bootstrap));
        assert!(first.confidence >= 0.6);
    }

    #[test]
    fn test_armed_until_filters_agree() {
        let config = StrategyConfig::default();
        let mut engine = CombinedEngine::new(&config, ["1m"]).unwrap();
        for i in 0..=5 {
            engine.on_bar("1m", &rising_bar(i), 40.0);
            if i >= 4 {
                let bar = rising_bar(i);
                let decision = engine
                    .evaluate("1m", bar.close, &features(0.8), bar.end_ts)
                    .unwrap();
                if i == 5 {
                    // single-bar DI has decayed below the chop threshold
                    assert!(!decision.main.chop_bull);
                    assert_eq!(decision.side, None);
                    assert_eq!(decision.reason, "armed_buy");
                    assert_eq!(decision.armed, Some(Side::Buy));
                }
            }
        }
        assert_eq!(engine.armed("1m"), Some(Side::Buy));
    }

    #[test]
    fn test_relaxed_all_skips_filters_and_cross_source() {
        let mut config = StrategyConfig::default();
        config.combined = CombinedConfig::default().with_testing_mode(TestingMode::RelaxedAll);
        let mut engine = CombinedEngine::new(&config, ["1m", "233t"]).unwrap();
        let mut last = None;
        for i in 0..=5 {
            engine.on_bar("1m", &rising_bar(i), 40.0);
            if i >= 4 {
                let bar = rising_bar(i);
                last = engine.evaluate("1m", bar.close, &features(0.8), bar.end_ts);
            }
        }
        let decision = last.unwrap();
        assert_eq!(decision.side, Some(Side::Buy));
        assert_eq!(decision.cross_source, Some(CrossSourceOutcome::Skipped));
        assert!(decision.reason.contains("xsource_skipped"));
    }

    #[test]
    fn test_background_mismatch_holds() {
        let config = StrategyConfig::default();
        let mut engine = CombinedEngine::new(&config, ["1m"]).unwrap();
        let mut last = None;
        for i in 0..2 {
            let bar = falling_bar(i);
            engine.on_bar("1m", &bar, -40.0);
            last = engine.evaluate("1m", bar.close, &features(0.2), bar.end_ts);
        }
        let decision = last.unwrap();
        assert_eq!(decision.main.side, Some(Side::Sell));
        assert_eq!(decision.trend, TrendState::Bullish);
        assert_eq!(decision.side, None);
        assert_eq!(decision.reason, "dash_trend_mismatch");
    }

    #[test]
    fn test_unknown_source() {
        let mut engine = CombinedEngine::new(&StrategyConfig::default(), ["1m"]).unwrap();
        engine.on_bar("5m", &rising_bar(0), 0.0);
        assert!(engine
            .evaluate("5m", 100.0, &features(0.9), t0())
            .is_none());
    }
}
