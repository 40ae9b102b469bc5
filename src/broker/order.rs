use serde::{Deserialize, Serialize};

use crate::impl_from_primitive;

/// Identifies an [`super::Order`] across its lifetime, assigned by the
/// broker at submission and stable for cancel/notify lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl_from_primitive!(OrderId, u64);

/// How an order's fill price is determined against a bar's OHLC (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Next bar's open, unless `cheat_on_open` is set.
    Market,
    Limit { price: f64 },
    Stop { price: f64 },
    StopLimit { stop: f64, limit: f64 },
    /// Fills at the matching bar's close.
    Close,
}

/// Terminal and in-flight lifecycle states an [`Order`] passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    Completed,
    Canceled,
    /// Insufficient cash/margin to cover the fill.
    Margin,
    Rejected,
    /// The `valid` window elapsed with the order still open.
    Expired,
}

impl OrderStatus {
    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Submitted)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }
}

/// A single buy/sell instruction and its execution record (§4.5).
///
/// `size` is signed: positive buys, negative sells, matching the
/// reference implementation's convention that a single field carries
/// both direction and quantity rather than a separate `side` enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub data: String,
    pub size: f64,
    pub kind: OrderKind,
    pub status: OrderStatus,
    /// Absolute bar index this order was submitted on; it is never
    /// eligible to fill during the matching pass for this same index
    /// (no look-ahead), except a `Market` order when `cheat_on_open` is
    /// enabled.
    pub submitted_idx: usize,
    pub created_datetime: f64,
    /// Bar index after which the order expires if still open, if any.
    pub valid_until_idx: Option<usize>,
    pub executed_size: f64,
    pub executed_price: f64,
    pub executed_value: f64,
    pub commission: f64,
    pub executed_datetime: Option<f64>,
}

impl Order {
    pub fn new(
        id: OrderId,
        data: impl Into<String>,
        size: f64,
        kind: OrderKind,
        submitted_idx: usize,
        created_datetime: f64,
        valid_until_idx: Option<usize>,
    ) -> Self {
        Self {
            id,
            data: data.into(),
            size,
            kind,
            status: OrderStatus::Submitted,
            submitted_idx,
            created_datetime,
            valid_until_idx,
            executed_size: 0.0,
            executed_price: 0.0,
            executed_value: 0.0,
            commission: 0.0,
            executed_datetime: None,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.size > 0.0
    }
}
