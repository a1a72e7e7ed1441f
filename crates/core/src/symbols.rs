//! Front-month contract naming for CME quarterly equity index futures.

use chrono::{DateTime, Datelike, Utc};

const QUARTER_CODES: [char; 4] = ['H', 'M', 'U', 'Z'];

/// Resolves the contract for `root` in the calendar quarter containing `now`.
///
/// Uses the quarter's month code (H, M, U, Z) and the last digit of the year,
/// so `NQ` in November 2025 resolves to `NQZ5`.
#[must_use]
pub fn resolve_front_month(root: &str, now: DateTime<Utc>) -> String {
    let quarter = (now.month0() / 3) as usize;
    let code = QUARTER_CODES[quarter.min(3)];
    let year_digit = now.year().rem_euclid(10);
    format!("{root}{code}{year_digit}")
}
