use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction shared by decisions, intents and broker records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trade print from the market data collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// Raw depth snapshot: resting quantity per price level, best level first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub symbol: String,
    pub bids: Vec<f64>,
    pub asks: Vec<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    Tick(Tick),
    Depth(DepthUpdate),
}

impl MarketEvent {
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Tick(tick) => &tick.symbol,
            Self::Depth(depth) => &depth.symbol,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Tick(tick) => tick.timestamp,
            Self::Depth(depth) => depth.timestamp,
        }
    }
}

/// Completed OHLCV bar. Immutable once an aggregator emits it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
}

impl Bar {
    #[must_use]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Trade decision handed from the signal layer to dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalEvent {
    pub symbol: String,
    pub side: Side,
    /// Last traded price when the decision was made.
    pub price: f64,
    /// Reference price for signal-price brackets (external signals only).
    pub signal_price: Option<f64>,
    /// Delta confidence in `[0, 1]`.
    pub confidence: f64,
    pub atr: f64,
    pub reason: String,
    /// Bar source that produced the decision, e.g. `"1m"` or `"tbars"`.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Normalized order submission sent to the broker collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderRequest {
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: u32,
    pub client_order_id: String,
    pub target_ticks: u32,
    pub stop_ticks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub client_order_id: String,
    pub broker_order_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Working order as reported by the broker during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerOrder {
    pub account_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: u32,
}

/// Net position as reported by the broker during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerPosition {
    pub account_id: String,
    pub symbol: String,
    /// Signed contracts, positive long.
    pub net_qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub account_id: String,
    pub client_order_id: String,
    pub qty: u32,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_helpers() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.sign(), -1);
        assert_eq!(Side::Buy.to_string(), "BUY");
    }

    #[test]
    fn test_side_serializes_uppercase() {
        let json = serde_json::to_string(&Side::Sell).unwrap();
        assert_eq!(json, "\"SELL\"");
    }
}
