use crate::window::RollingWindow;
use smm_core::error::{ensure_period, ConfigError};

/// Money Flow Index over `period` typical-price changes.
///
/// Needs `period + 1` samples; returns `NaN` before that.
#[derive(Debug, Clone)]
pub struct MoneyFlowIndex {
    samples: RollingWindow<(f64, f64)>,
    last: f64,
}

impl MoneyFlowIndex {
    /// # Errors
    /// Returns `ConfigError::InvalidPeriod` when `period == 0`.
    pub fn new(period: usize) -> Result<Self, ConfigError> {
        let period = ensure_period("mfi.period", period)?;
        Ok(Self {
            samples: RollingWindow::new(period + 1),
            last: f64::NAN,
        })
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64, volume: f64) -> f64 {
        let typical = (high + low + close) / 3.0;
        self.samples.push((typical, volume));
        if !self.samples.is_full() {
            return f64::NAN;
        }

        let mut positive = 0.0;
        let mut negative = 0.0;
        let mut prev: Option<f64> = None;
        for &(tp, vol) in self.samples.iter() {
            if let Some(p) = prev {
                let flow = tp * vol;
                if tp > p {
                    positive += flow;
                } else if tp < p {
                    negative += flow;
                }
            }
            prev = Some(tp);
        }

        let mfi = if negative == 0.0 {
            0.0
        } else {
            100.0 - 100.0 / (1.0 + positive / negative)
        };
        self.last = mfi.clamp(0.0, 100.0);
        self.last
    }

    /// Latest value, `NaN` while warming up.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_until_window_full() {
        let mut mfi = MoneyFlowIndex::new(3).unwrap();
        for i in 0..3 {
            let p = 100.0 + f64::from(i);
            assert!(mfi.update(p + 1.0, p - 1.0, p, 10.0).is_nan());
        }
        assert!(!mfi.update(104.0, 102.0, 103.0, 10.0).is_nan());
    }

    #[test]
    fn test_range_and_value() {
        let mut mfi = MoneyFlowIndex::new(2).unwrap();
        mfi.update(10.0, 10.0, 10.0, 1.0);
        mfi.update(12.0, 12.0, 12.0, 1.0); // +12
        let value = mfi.update(11.0, 11.0, 11.0, 1.0); // -11
        let expected = 100.0 - 100.0 / (1.0 + 12.0 / 11.0);
        assert!((value - expected).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_no_negative_flow_reports_zero() {
        let mut mfi = MoneyFlowIndex::new(2).unwrap();
        mfi.update(10.0, 10.0, 10.0, 1.0);
        mfi.update(11.0, 11.0, 11.0, 1.0);
        assert_eq!(mfi.update(12.0, 12.0, 12.0, 1.0), 0.0);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(MoneyFlowIndex::new(0).is_err());
    }
}
