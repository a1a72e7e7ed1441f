use thiserror::Error;

/// Invalid construction parameters. Always fatal: callers must not swallow these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// A period, window or count that must be strictly positive was not.
    #[error("invalid period for {name}: {value} (must be > 0)")]
    InvalidPeriod {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: i64,
    },

    /// A numeric threshold outside its allowed range.
    #[error("invalid threshold for {name}: {value} (expected {expected})")]
    InvalidThreshold {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Human-readable allowed range.
        expected: &'static str,
    },

    /// Any other inconsistent setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn period(name: &'static str, value: usize) -> Self {
        Self::InvalidPeriod {
            name,
            value: i64::try_from(value).unwrap_or(i64::MAX),
        }
    }
}

/// Checks that a period-like parameter is non-zero.
///
/// # Errors
/// Returns `ConfigError::InvalidPeriod` when `value == 0`.
pub fn ensure_period(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::period(name, value));
    }
    Ok(value)
}

/// Checks that a float parameter is finite and strictly positive.
///
/// # Errors
/// Returns `ConfigError::InvalidThreshold` otherwise.
pub fn ensure_positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidThreshold {
            name,
            value,
            expected: "> 0",
        });
    }
    Ok(value)
}

/// Checks that a float parameter lies in `[0, 1]`.
///
/// # Errors
/// Returns `ConfigError::InvalidThreshold` otherwise.
pub fn ensure_unit_interval(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidThreshold {
            name,
            value,
            expected: "[0, 1]",
        });
    }
    Ok(value)
}

/// Failures reported by the broker collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Broker refused the order.
    #[error("order rejected by broker: {reason}")]
    Rejected {
        /// Broker-supplied reason.
        reason: String,
    },

    /// Transport failure while talking to the broker.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// Broker did not answer in time.
    #[error("broker request timed out")]
    Timeout,

    /// Unknown account on the broker side.
    #[error("unknown account: {0}")]
    UnknownAccount(String),
}

/// Failures reported by the persistence collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record for {key}: {message}")]
    Corrupt {
        /// Account id or group name.
        key: String,
        /// Parser message.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_period_rejects_zero() {
        assert!(ensure_period("ema", 0).is_err());
        assert_eq!(ensure_period("ema", 8), Ok(8));
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("tick_size", 0.0).is_err());
        assert!(ensure_positive("tick_size", f64::NAN).is_err());
        assert!(ensure_positive("tick_size", 0.25).is_ok());
    }

    #[test]
    fn test_ensure_unit_interval() {
        assert!(ensure_unit_interval("delta_threshold", 1.2).is_err());
        assert!(ensure_unit_interval("delta_threshold", 0.6).is_ok());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::period("atr", 0);
        assert_eq!(err.to_string(), "invalid period for atr: 0 (must be > 0)");
        let err = BrokerError::Rejected {
            reason: "margin".to_string(),
        };
        assert!(err.to_string().contains("margin"));
    }
}
