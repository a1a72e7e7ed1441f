use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use smm_core::ExitConfig;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TimeExit,
    EarlyProfit,
    BreakevenActivated,
    MomentumExit,
}

impl ExitReason {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::TimeExit => "time_exit",
            Self::EarlyProfit => "early_profit",
            Self::BreakevenActivated => "breakeven_activated",
            Self::MomentumExit => "momentum_exit",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Exit bookkeeping carried by each open intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitTracking {
    pub entry_time: DateTime<Utc>,
    pub max_hold_until: DateTime<Utc>,
    /// Set once breakeven has been activated.
    pub breakeven_at: Option<DateTime<Utc>>,
    /// Latest momentum score pushed by the strategy. `None` never exits.
    pub momentum_score: Option<f64>,
}

impl ExitTracking {
    #[must_use]
    pub fn new(config: &ExitConfig, entry_time: DateTime<Utc>) -> Self {
        Self {
            entry_time,
            max_hold_until: entry_time + chrono::Duration::minutes(config.max_hold_minutes),
            breakeven_at: None,
            momentum_score: None,
        }
    }
}

/// Check whether an open position should be exited.
///
/// Priority: time → early profit → breakeven (once) → momentum. Only the
/// first condition that holds is reported.
pub fn check_exit_conditions(
    config: &ExitConfig,
    tracking: &mut ExitTracking,
    unrealized_pnl: Decimal,
    now: DateTime<Utc>,
) -> Option<ExitReason> {
    if config.time_based_exit && now >= tracking.max_hold_until {
        return Some(ExitReason::TimeExit);
    }

    if unrealized_pnl >= Decimal::from(config.profit_target_early_ticks) * config.tick_value {
        return Some(ExitReason::EarlyProfit);
    }

    if tracking.breakeven_at.is_none()
        && unrealized_pnl >= Decimal::from(config.breakeven_activation_ticks) * config.tick_value
    {
        tracking.breakeven_at = Some(now);
        return Some(ExitReason::BreakevenActivated);
    }

    if config.momentum_exit
        && tracking
            .momentum_score
            .is_some_and(|score| score < config.momentum_threshold)
    {
        return Some(ExitReason::MomentumExit);
    }

    None
}
