use crate::config::{RiskConfig, SizingConfig};

/// Confidence at which the confidence factor reaches 1.0.
const CONFIDENCE_PIVOT: f64 = 0.6;
const MAX_CONFIDENCE_FACTOR: f64 = 1.5;
const MIN_VOLATILITY_FACTOR: f64 = 0.5;

/// Calculate contract quantity for one account
///
/// `qty = clamp(round(base × confidence_factor × volatility_factor), 1, max_size)`
///
/// # Arguments
/// * `sizing` - Base/max size and which factors are enabled
/// * `risk` - Supplies the account allow-list
/// * `account_id` - Account the order is for
/// * `confidence` - Delta confidence of the signal (0.0-1.0)
/// * `atr` - Current ATR in price units
/// * `price` - Current price
///
/// # Returns
/// Contracts to trade, or 0 when the account is outside a non-empty allow-list
#[must_use]
pub fn calculate_contract_size(
    sizing: &SizingConfig,
    risk: &RiskConfig,
    account_id: &str,
    confidence: f64,
    atr: f64,
    price: f64,
) -> u32 {
    if !risk.is_allowed(account_id) {
        return 0;
    }

    let confidence_factor = if sizing.confidence_multiplier {
        confidence_factor(confidence)
    } else {
        1.0
    };
    let volatility_factor = if sizing.volatility_adjustment {
        volatility_factor(atr, price)
    } else {
        1.0
    };

    let raw = f64::from(sizing.base_size) * confidence_factor * volatility_factor;
    if !raw.is_finite() {
        return sizing.base_size.clamp(1, sizing.max_size.max(1));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = raw.round().max(0.0) as u32;
    rounded.clamp(1, sizing.max_size.max(1))
}

/// `min(confidence / 0.6, 1.5)`
#[must_use]
pub fn confidence_factor(confidence: f64) -> f64 {
    (confidence / CONFIDENCE_PIVOT).min(MAX_CONFIDENCE_FACTOR)
}

/// `max(0.5, 1 - (atr / price) × 100)`; neutral when either input is unusable
#[must_use]
pub fn volatility_factor(atr: f64, price: f64) -> f64 {
    if atr <= 0.0 || price <= 0.0 || !atr.is_finite() || !price.is_finite() {
        return 1.0;
    }
    (1.0 - (atr / price) * 100.0).max(MIN_VOLATILITY_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizing(base: u32, max: u32) -> SizingConfig {
        SizingConfig {
            base_size: base,
            max_size: max,
            ..SizingConfig::default()
        }
    }

    #[test]
    fn test_base_size_at_pivot_confidence() {
        // conf 0.6 -> factor 1.0, tiny atr -> factor ~1.0
        let qty = calculate_contract_size(
            &sizing(1, 2),
            &RiskConfig::default(),
            "SIM-1",
            0.6,
            1.0,
            20_000.0,
        );
        assert_eq!(qty, 1);
    }

    #[test]
    fn test_high_confidence_scales_up_and_caps() {
        // base 2 × 1.5 × ~1.0 = 3 -> capped at max 2
        let qty = calculate_contract_size(
            &sizing(2, 2),
            &RiskConfig::default(),
            "SIM-1",
            0.95,
            0.0,
            20_000.0,
        );
        assert_eq!(qty, 2);

        let qty = calculate_contract_size(
            &sizing(2, 5),
            &RiskConfig::default(),
            "SIM-1",
            0.95,
            0.0,
            20_000.0,
        );
        assert_eq!(qty, 3);
    }

    #[test]
    fn test_high_volatility_halves_size() {
        // atr/price = 1% -> 1 - 1.0 = 0 -> floored at 0.5; 4 × 1.0 × 0.5 = 2
        let qty = calculate_contract_size(
            &sizing(4, 10),
            &RiskConfig::default(),
            "SIM-1",
            0.6,
            200.0,
            20_000.0,
        );
        assert_eq!(qty, 2);
    }

    #[test]
    fn test_never_below_one() {
        let qty = calculate_contract_size(
            &sizing(1, 2),
            &RiskConfig::default(),
            "SIM-1",
            0.0,
            0.0,
            20_000.0,
        );
        assert_eq!(qty, 1);
    }

    #[test]
    fn test_allow_list_blocks_other_accounts() {
        let risk = RiskConfig::default().with_test_accounts(vec!["SIM-1".to_string()]);
        assert_eq!(
            calculate_contract_size(&sizing(1, 2), &risk, "LIVE-9", 0.9, 0.0, 100.0),
            0
        );
        assert_eq!(
            calculate_contract_size(&sizing(1, 2), &risk, "SIM-1", 0.9, 0.0, 100.0),
            2
        );
    }

    #[test]
    fn test_factors() {
        assert!((confidence_factor(0.3) - 0.5).abs() < 1e-12);
        assert_eq!(confidence_factor(1.0), 1.5);
        assert_eq!(volatility_factor(0.0, 100.0), 1.0);
        assert!((volatility_factor(0.1, 100.0) - 0.9).abs() < 1e-12);
    }
}
