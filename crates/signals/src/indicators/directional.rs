use super::atr::true_range;

/// DI+ / DI- pair on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectionalIndex {
    pub plus: f64,
    pub minus: f64,
}

impl DirectionalIndex {
    /// Chop filter, bullish side: `DI+ > DI-` and `DI+ >= threshold`.
    #[must_use]
    pub fn bullish(&self, threshold: f64) -> bool {
        self.plus > self.minus && self.plus >= threshold
    }

    /// Chop filter, bearish side: `DI- > DI+` and `DI- >= threshold`.
    #[must_use]
    pub fn bearish(&self, threshold: f64) -> bool {
        self.minus > self.plus && self.minus >= threshold
    }
}

fn directional_moves(high: f64, low: f64, prev_high: f64, prev_low: f64) -> (f64, f64) {
    let up = high - prev_high;
    let down = prev_low - low;
    let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
    let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
    (plus_dm, minus_dm)
}

/// Single-bar DI approximation: this bar's directional move over its true range.
#[derive(Debug, Clone, Default)]
pub struct DirectionalMovement {
    prev: Option<(f64, f64, f64)>,
    current: DirectionalIndex,
}

impl DirectionalMovement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> DirectionalIndex {
        if let Some((prev_high, prev_low, prev_close)) = self.prev {
            let (plus_dm, minus_dm) = directional_moves(high, low, prev_high, prev_low);
            let tr = true_range(high, low, Some(prev_close));
            self.current = if tr > 0.0 {
                DirectionalIndex {
                    plus: 100.0 * plus_dm / tr,
                    minus: 100.0 * minus_dm / tr,
                }
            } else {
                DirectionalIndex::default()
            };
        }
        self.prev = Some((high, low, close));
        self.current
    }

    #[must_use]
    pub const fn value(&self) -> DirectionalIndex {
        self.current
    }
}

/// Wilder-smoothed DI over a whole window of `(high, low, close)` points.
///
/// Smoothing uses `alpha = 1 / len` seeded from the first directional move.
/// Returns zeros when the window holds fewer than `len` points.
#[must_use]
pub fn wilder_directional_index(points: &[(f64, f64, f64)], len: usize) -> DirectionalIndex {
    if len == 0 || points.len() < len || points.len() < 2 {
        return DirectionalIndex::default();
    }
    #[allow(clippy::cast_precision_loss)]
    let alpha = 1.0 / len as f64;

    let mut smoothed: Option<(f64, f64, f64)> = None;
    for pair in points.windows(2) {
        let (prev_high, prev_low, prev_close) = pair[0];
        let (high, low, _) = pair[1];
        let (plus_dm, minus_dm) = directional_moves(high, low, prev_high, prev_low);
        let tr = true_range(high, low, Some(prev_close));
        smoothed = Some(match smoothed {
            None => (plus_dm, minus_dm, tr),
            Some((sp, sm, st)) => (
                sp + alpha * (plus_dm - sp),
                sm + alpha * (minus_dm - sm),
                st + alpha * (tr - st),
            ),
        });
    }

    match smoothed {
        Some((sp, sm, st)) if st > 0.0 => DirectionalIndex {
            plus: 100.0 * sp / st,
            minus: 100.0 * sm / st,
        },
        _ => DirectionalIndex::default(),
    }
}
