use smm_core::error::{ensure_period, ConfigError};

/// Wilder average true range.
///
/// The divisor grows with the sample count until it reaches `period`, so the
/// first output equals the first true range.
#[derive(Debug, Clone)]
pub struct AverageTrueRange {
    period: usize,
    samples: usize,
    prev_close: Option<f64>,
    value: Option<f64>,
}

impl AverageTrueRange {
    /// # Errors
    /// Returns `ConfigError::InvalidPeriod` when `period == 0`.
    pub fn new(period: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            period: ensure_period("atr.period", period)?,
            samples: 0,
            prev_close: None,
            value: None,
        })
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> f64 {
        let tr = true_range(high, low, self.prev_close);
        self.samples += 1;
        let window = self.samples.min(self.period);
        #[allow(clippy::cast_precision_loss)]
        let n = window as f64;
        let atr = match self.value {
            None => tr,
            Some(prev) => ((n - 1.0) * prev + tr) / n,
        };
        self.prev_close = Some(close);
        self.value = Some(atr);
        atr
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.samples >= self.period
    }
}

/// `high - low` without a previous close, else the classic three-way maximum.
#[must_use]
pub fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    let range = high - low;
    match prev_close {
        None => range,
        Some(pc) => range.max((high - pc).abs()).max((low - pc).abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_is_range() {
        let mut atr = AverageTrueRange::new(8).unwrap();
        assert_eq!(atr.update(105.0, 100.0, 102.0), 5.0);
    }

    #[test]
    fn test_wilder_average() {
        let mut atr = AverageTrueRange::new(2).unwrap();
        atr.update(10.0, 8.0, 9.0); // tr 2
        // gap up: tr = max(2, |13-9|, |11-9|) = 4, window 2 -> (2 + 4) / 2
        assert!((atr.update(13.0, 11.0, 12.0) - 3.0).abs() < 1e-12);
        assert!(atr.is_ready());
        // tr = 1, (3 + 1) / 2
        assert!((atr.update(12.5, 11.5, 12.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_never_negative() {
        let mut atr = AverageTrueRange::new(5).unwrap();
        let bars = [
            (10.0, 10.0, 10.0),
            (11.0, 9.0, 9.5),
            (9.5, 9.5, 9.5),
            (20.0, 1.0, 3.0),
            (3.0, 3.0, 3.0),
        ];
        for (h, l, c) in bars {
            assert!(atr.update(h, l, c) >= 0.0);
        }
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(AverageTrueRange::new(0).is_err());
    }
}
