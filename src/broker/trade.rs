use serde::{Deserialize, Serialize};

/// Identifies a [`Trade`] across its open→close lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u64);

/// A position's round-trip from flat back to flat, or its still-open
/// in-progress state (§4.5 "Trade accounting").
///
/// Opening a position from flat creates one; additional same-direction
/// fills update its weighted entry and size in place; closing fills
/// realize PnL proportionally until size returns to zero, at which point
/// the trade closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub data: String,
    pub is_open: bool,
    pub size: f64,
    pub price: f64,
    pub pnl_realized: f64,
    pub open_datetime: f64,
    pub close_datetime: Option<f64>,
}

impl Trade {
    pub fn open(id: TradeId, data: impl Into<String>, size: f64, price: f64, datetime: f64) -> Self {
        Self {
            id,
            data: data.into(),
            is_open: true,
            size,
            price,
            pnl_realized: 0.0,
            open_datetime: datetime,
            close_datetime: None,
        }
    }
}
