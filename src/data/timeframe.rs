use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// The unit a [`DataSeries`](super::series::DataSeries)'s bars are measured
/// in (§3). Ordered coarsest-last so `Ord` derivation gives a sensible
/// "is this timeframe coarser" comparison for resample/replay validation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum TimeFrame {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeFrame {
    /// Wall-clock seconds per unit, for the sub-daily timeframes whose
    /// period buckets are a simple `floor(datetime / (unit * compression))`
    /// (§4.3). Daily-and-coarser timeframes use calendar bucketing instead
    /// and this value is unused for them.
    pub fn unit_seconds(self) -> Option<f64> {
        match self {
            TimeFrame::Seconds => Some(1.0),
            TimeFrame::Minutes => Some(60.0),
            TimeFrame::Hours => Some(3_600.0),
            TimeFrame::Days | TimeFrame::Weeks | TimeFrame::Months | TimeFrame::Years => None,
        }
    }
}

/// A `(timeframe, compression)` pair: compression is the positive integer
/// "n-of-timeframe per bar" multiplier (e.g. `(Minutes, 5)` = 5-minute bars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeFrameSpec {
    pub timeframe: TimeFrame,
    pub compression: u32,
}

impl TimeFrameSpec {
    pub fn new(timeframe: TimeFrame, compression: u32) -> Self {
        assert!(compression > 0, "compression must be a positive integer");
        Self {
            timeframe,
            compression,
        }
    }
}
