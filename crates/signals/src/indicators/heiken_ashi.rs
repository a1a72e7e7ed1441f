/// One Heiken-Ashi candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeikenAshiBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl HeikenAshiBar {
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    #[must_use]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Running Heiken-Ashi state; `None` until the first bar.
pub type HeikenAshiState = Option<HeikenAshiBar>;

/// Advances `state` with a source bar and returns the new candle.
///
/// The first candle opens at the source open; later candles open at the
/// midpoint of the previous candle's body.
pub fn update_heiken_ashi(
    state: &mut HeikenAshiState,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
) -> HeikenAshiBar {
    let ha_close = (open + high + low + close) / 4.0;
    let ha_open = match state {
        None => open,
        Some(prev) => (prev.open + prev.close) / 2.0,
    };
    let bar = HeikenAshiBar {
        open: ha_open,
        high: high.max(ha_open).max(ha_close),
        low: low.min(ha_open).min(ha_close),
        close: ha_close,
    };
    *state = Some(bar);
    bar
}
