use smm_core::error::{ensure_period, ConfigError};

/// Streaming exponential moving average seeded with its first input.
#[derive(Debug, Clone)]
pub struct ExponentialMa {
    period: usize,
    k: f64,
    value: Option<f64>,
    previous: Option<f64>,
}

impl ExponentialMa {
    /// # Errors
    /// Returns `ConfigError::InvalidPeriod` when `period == 0`.
    pub fn new(period: usize) -> Result<Self, ConfigError> {
        let period = ensure_period("ema.period", period)?;
        #[allow(clippy::cast_precision_loss)]
        let k = 2.0 / (period as f64 + 1.0);
        Ok(Self {
            period,
            k,
            value: None,
            previous: None,
        })
    }

    /// Folds `value` in and returns the new average.
    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.value {
            None => value,
            Some(ema) => value * self.k + ema * (1.0 - self.k),
        };
        self.previous = self.value;
        self.value = Some(next);
        next
    }

    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    /// Change over the last update; 0 until two updates have been seen.
    #[must_use]
    pub fn slope(&self) -> f64 {
        match (self.value, self.previous) {
            (Some(now), Some(prev)) => now - prev,
            _ => 0.0,
        }
    }

    #[must_use]
    pub const fn period(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_period_rejected() {
        assert!(ExponentialMa::new(0).is_err());
    }

    #[test]
    fn test_first_update_seeds() {
        let mut ema = ExponentialMa::new(21).unwrap();
        assert_eq!(ema.update(101.25), 101.25);
        assert_eq!(ema.slope(), 0.0);
    }

    #[test]
    fn test_recurrence() {
        let mut ema = ExponentialMa::new(3).unwrap();
        ema.update(10.0);
        // k = 0.5
        assert!((ema.update(20.0) - 15.0).abs() < 1e-12);
        assert!((ema.slope() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_converges_on_constant_stream() {
        for period in [1_usize, 5, 21, 55] {
            let mut ema = ExponentialMa::new(period).unwrap();
            ema.update(0.0);
            let mut last = 0.0;
            for _ in 0..(period * 20) {
                last = ema.update(50.0);
            }
            assert!((last - 50.0).abs() < 1e-3, "period {period} -> {last}");
        }
    }
}
