use serde::{Deserialize, Serialize};

/// Commission schemes a [`super::sim::SimulatedBroker`] can be configured
/// with (§4.5 "per-commission-scheme").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommissionScheme {
    PerShare { rate: f64 },
    PerOrder { fee: f64 },
    PerContract { fee_per_contract: f64 },
}

impl CommissionScheme {
    pub fn commission(&self, size: f64, fill_price: f64) -> f64 {
        match *self {
            CommissionScheme::PerShare { rate } => size.abs() * rate,
            CommissionScheme::PerOrder { fee } => fee,
            CommissionScheme::PerContract { fee_per_contract } => size.abs() * fee_per_contract,
        }
    }
}
