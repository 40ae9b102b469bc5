use serde::{Deserialize, Serialize};

/// One OHLCV+open-interest bar, the unit the engine and every feed
/// exchange (§3/GLOSSARY). `datetime` is the numeric encoding from
/// [`crate::datetime`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub datetime: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub openinterest: f64,
}

impl Bar {
    /// `high >= max(open, close)`, `low <= min(open, close)`,
    /// `low <= high` — the guarantee feeds must supply and which the
    /// engine itself does not re-validate (§4.2), but which resample
    /// aggregation relies on internally when folding bars together.
    pub fn is_valid_ohlc(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close) && self.low <= self.high
    }
}

/// The fixed seven-line schema every [`super::series::DataSeries`] carries,
/// in this order (§3): `datetime, open, high, low, close, volume,
/// openinterest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OhlcvLine {
    Datetime = 0,
    Open = 1,
    High = 2,
    Low = 3,
    Close = 4,
    Volume = 5,
    OpenInterest = 6,
}

impl OhlcvLine {
    pub const ALL: [OhlcvLine; 7] = [
        OhlcvLine::Datetime,
        OhlcvLine::Open,
        OhlcvLine::High,
        OhlcvLine::Low,
        OhlcvLine::Close,
        OhlcvLine::Volume,
        OhlcvLine::OpenInterest,
    ];

    pub fn alias(self) -> &'static str {
        match self {
            OhlcvLine::Datetime => "datetime",
            OhlcvLine::Open => "open",
            OhlcvLine::High => "high",
            OhlcvLine::Low => "low",
            OhlcvLine::Close => "close",
            OhlcvLine::Volume => "volume",
            OhlcvLine::OpenInterest => "openinterest",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}
