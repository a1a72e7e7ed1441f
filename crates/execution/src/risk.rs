//! Per-account risk gates.
//!
//! Every order passes the gates in a fixed order and the first failure wins:
//!
//! 1. account enabled
//! 2. drawdown kill-switch (latched until reset)
//! 3. allow-list
//! 4. trading window
//! 5. resulting position size
//! 6. orders per trailing minute
//!
//! A rejection is a value carrying a stable reason code, not an error.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smm_core::{RiskConfig, Side, TradingWindowConfig};
use std::collections::VecDeque;
use std::fmt;

// =============================================================================
// Reject reasons
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AccountDisabled,
    DisabledByDrawdown,
    NotTestAccount,
    OutsideTradingWindow,
    MaxPositionExceeded,
    RateLimited,
    ZeroQuantity,
}

impl RejectReason {
    /// Machine-readable reason code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AccountDisabled => "account_disabled",
            Self::DisabledByDrawdown => "disabled_by_drawdown",
            Self::NotTestAccount => "not_test_account",
            Self::OutsideTradingWindow => "outside_trading_window",
            Self::MaxPositionExceeded => "max_position_exceeded",
            Self::RateLimited => "rate_limited",
            Self::ZeroQuantity => "zero_quantity",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Drawdown latch
// =============================================================================

/// Daily realized-loss kill-switch.
///
/// Once realized P&L reaches `-max_daily_drawdown` the latch trips and stays
/// tripped, even if P&L later recovers, until [`DrawdownLatch::reset`].
#[derive(Debug, Clone)]
pub struct DrawdownLatch {
    max_daily_drawdown: Decimal,
    realized_pnl: Decimal,
    unrealized_pnl: Decimal,
    tripped: bool,
}

impl DrawdownLatch {
    #[must_use]
    pub fn new(max_daily_drawdown: Decimal) -> Self {
        Self {
            max_daily_drawdown: max_daily_drawdown.abs(),
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            tripped: false,
        }
    }

    /// Replace the P&L figures the broker reported. Returns `true` when this
    /// update tripped the latch.
    pub fn update(&mut self, realized: Option<Decimal>, unrealized: Option<Decimal>) -> bool {
        if let Some(realized) = realized {
            self.realized_pnl = realized;
        }
        if let Some(unrealized) = unrealized {
            self.unrealized_pnl = unrealized;
        }
        if !self.tripped && self.realized_pnl <= -self.max_daily_drawdown {
            self.tripped = true;
            return true;
        }
        false
    }

    #[must_use]
    pub const fn is_tripped(&self) -> bool {
        self.tripped
    }

    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    #[must_use]
    pub const fn unrealized_pnl(&self) -> Decimal {
        self.unrealized_pnl
    }

    /// Clear the latch. P&L figures are kept; a still-breached balance trips
    /// again on the next update.
    pub fn reset(&mut self) {
        self.tripped = false;
    }
}

// =============================================================================
// Rate limiter
// =============================================================================

/// Sliding one-minute window of order timestamps.
#[derive(Debug, Clone)]
pub struct OrderRateLimiter {
    max_per_window: usize,
    window: Duration,
    times: VecDeque<DateTime<Utc>>,
}

impl OrderRateLimiter {
    #[must_use]
    pub fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_window: max_per_minute,
            window: Duration::seconds(60),
            times: VecDeque::with_capacity(max_per_minute),
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(&oldest) = self.times.front() {
            if now - oldest > self.window {
                self.times.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether one more order at `now` would exceed the limit.
    pub fn is_limited(&mut self, now: DateTime<Utc>) -> bool {
        self.prune(now);
        self.times.len() >= self.max_per_window
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.times.push_back(now);
    }

    /// Orders inside the trailing window at `now`.
    pub fn count(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.times.len()
    }
}

// =============================================================================
// Account risk state and gate
// =============================================================================

/// Mutable risk state owned by one account.
#[derive(Debug, Clone)]
pub struct AccountRisk {
    pub enabled: bool,
    pub position: i64,
    pub drawdown: DrawdownLatch,
    pub rate: OrderRateLimiter,
}

impl AccountRisk {
    #[must_use]
    pub fn new(config: &RiskConfig, enabled: bool) -> Self {
        Self {
            enabled,
            position: 0,
            drawdown: DrawdownLatch::new(config.max_daily_drawdown),
            rate: OrderRateLimiter::new(config.max_orders_per_minute),
        }
    }
}

/// Stateless gate evaluating [`AccountRisk`] against configured limits.
#[derive(Debug, Clone)]
pub struct RiskGate {
    risk: RiskConfig,
    window: TradingWindowConfig,
}

impl RiskGate {
    #[must_use]
    pub const fn new(risk: RiskConfig, window: TradingWindowConfig) -> Self {
        Self { risk, window }
    }

    #[must_use]
    pub const fn config(&self) -> &RiskConfig {
        &self.risk
    }

    /// Run every gate for an order of `qty` contracts on `side`.
    ///
    /// Does not record the order; call [`OrderRateLimiter::record`] once the
    /// intent is created.
    ///
    /// # Errors
    /// Returns the first failing [`RejectReason`].
    pub fn check(
        &self,
        account_id: &str,
        state: &mut AccountRisk,
        side: Side,
        qty: u32,
        now: DateTime<Utc>,
    ) -> Result<(), RejectReason> {
        if !state.enabled {
            return Err(RejectReason::AccountDisabled);
        }
        if state.drawdown.is_tripped() {
            return Err(RejectReason::DisabledByDrawdown);
        }
        if !self.risk.is_allowed(account_id) {
            return Err(RejectReason::NotTestAccount);
        }
        if !self.window.contains(now) {
            return Err(RejectReason::OutsideTradingWindow);
        }

        let signed = i64::from(qty) * side.sign();
        if (state.position + signed).abs() > self.risk.max_position.abs() {
            return Err(RejectReason::MaxPositionExceeded);
        }

        if state.rate.is_limited(now) {
            return Err(RejectReason::RateLimited);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 14, 45, 0).unwrap()
    }

    fn gate(risk: RiskConfig) -> RiskGate {
        RiskGate::new(risk, TradingWindowConfig::default())
    }

    // ==================== Drawdown Tests ====================

    #[test]
    fn test_drawdown_latches_until_reset() {
        let mut latch = DrawdownLatch::new(dec!(250));
        assert!(!latch.update(Some(dec!(-100)), None));
        assert!(latch.update(Some(dec!(-250)), None));
        assert!(latch.is_tripped());

        // Recovery does not clear the latch
        assert!(!latch.update(Some(dec!(50)), None));
        assert!(latch.is_tripped());

        latch.reset();
        assert!(!latch.is_tripped());
    }

    #[test]
    fn test_drawdown_rejects_every_order_after_breach() {
        let gate = gate(RiskConfig::default());
        let mut state = AccountRisk::new(gate.config(), true);
        state.drawdown.update(Some(dec!(-300)), None);
        state.drawdown.update(Some(dec!(100)), None);

        for _ in 0..3 {
            assert_eq!(
                gate.check("A", &mut state, Side::Buy, 1, now()),
                Err(RejectReason::DisabledByDrawdown)
            );
        }
    }

    // ==================== Gate Order Tests ====================

    #[test]
    fn test_disabled_account_checked_first() {
        let gate = gate(RiskConfig::default());
        let mut state = AccountRisk::new(gate.config(), false);
        state.drawdown.update(Some(dec!(-1000)), None);
        assert_eq!(
            gate.check("A", &mut state, Side::Buy, 1, now()),
            Err(RejectReason::AccountDisabled)
        );
    }

    #[test]
    fn test_allow_list() {
        let gate = gate(RiskConfig::default().with_test_accounts(vec!["A".into()]));
        let mut state = AccountRisk::new(gate.config(), true);
        assert!(gate.check("A", &mut state, Side::Buy, 1, now()).is_ok());
        assert_eq!(
            gate.check("B", &mut state, Side::Buy, 1, now()),
            Err(RejectReason::NotTestAccount)
        );
    }

    #[test]
    fn test_outside_trading_window() {
        let window = TradingWindowConfig {
            enabled: true,
            start: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            ..TradingWindowConfig::default()
        };
        let gate = RiskGate::new(RiskConfig::default(), window);
        let mut state = AccountRisk::new(gate.config(), true);

        // 14:45 UTC is 09:45 in New York (EST)
        assert!(gate.check("A", &mut state, Side::Buy, 1, now()).is_ok());
        let late = now() + Duration::hours(1);
        assert_eq!(
            gate.check("A", &mut state, Side::Buy, 1, late),
            Err(RejectReason::OutsideTradingWindow)
        );
    }

    #[test]
    fn test_max_position() {
        let gate = gate(RiskConfig::default().with_max_position(2));
        let mut state = AccountRisk::new(gate.config(), true);
        state.position = 2;
        assert_eq!(
            gate.check("A", &mut state, Side::Buy, 1, now()),
            Err(RejectReason::MaxPositionExceeded)
        );
        // Reducing the position is fine
        assert!(gate.check("A", &mut state, Side::Sell, 2, now()).is_ok());
    }

    // ==================== Rate Limit Tests ====================

    #[test]
    fn test_rate_limit_sliding_window() {
        let gate = gate(RiskConfig::default().with_max_orders_per_minute(2));
        let mut state = AccountRisk::new(gate.config(), true);
        let t0 = now();

        state.rate.record(t0);
        state.rate.record(t0 + Duration::seconds(10));
        assert_eq!(
            gate.check("A", &mut state, Side::Buy, 1, t0 + Duration::seconds(30)),
            Err(RejectReason::RateLimited)
        );

        // First order ages out of the window
        assert!(gate
            .check("A", &mut state, Side::Buy, 1, t0 + Duration::seconds(61))
            .is_ok());
        assert_eq!(state.rate.count(t0 + Duration::seconds(61)), 1);
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(RejectReason::DisabledByDrawdown.to_string(), "disabled_by_drawdown");
        assert_eq!(RejectReason::ZeroQuantity.code(), "zero_quantity");
    }
}
