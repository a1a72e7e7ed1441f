use crate::features::FeatureSnapshot;
use crate::indicators::ExponentialMa;
use serde::Serialize;
use smm_core::{BaselineConfig, ConfigError, Side};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineDecision {
    pub side: Option<Side>,
    pub delta_confidence: f64,
    pub ema: f64,
    pub ema_slope: f64,
    pub reason: &'static str,
}

/// Order-flow delta gated by a single EMA trend.
///
/// The EMA advances on every evaluation, so call it once per bar.
#[derive(Debug, Clone)]
pub struct BaselineEngine {
    ema: ExponentialMa,
    delta_threshold: f64,
}

impl BaselineEngine {
    /// # Errors
    /// Returns `ConfigError` when the config does not validate.
    pub fn new(config: &BaselineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            ema: ExponentialMa::new(config.ema_period)?,
            delta_threshold: config.delta_threshold,
        })
    }

    pub fn evaluate(&mut self, price: f64, features: &FeatureSnapshot) -> BaselineDecision {
        let ema = self.ema.update(price);
        let ema_slope = self.ema.slope();
        let dc = features.delta_confidence;

        let (side, reason) = if dc >= self.delta_threshold && price > ema && ema_slope >= 0.0 {
            (Some(Side::Buy), "delta>=thr & trend_up")
        } else if 1.0 - dc >= self.delta_threshold && price < ema && ema_slope <= 0.0 {
            (Some(Side::Sell), "delta<=1-thr & trend_dn")
        } else {
            (None, "hold")
        };

        BaselineDecision {
            side,
            delta_confidence: dc,
            ema,
            ema_slope,
            reason,
        }
    }
}
