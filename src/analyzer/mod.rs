//! Run observers (C9): the [`Analyzer`] trait, the [`TimeFrameAnalyzer`]
//! period-bucketing base, and the built-in [`sqn::SqnAnalyzer`] /
//! [`time_return::TimeReturnAnalyzer`].

pub mod sqn;
pub mod time_return;
pub mod value;

pub use value::{AnalysisValue, OrderedMap};

use std::fmt::Debug;

use crate::{
    broker::{Order, Trade},
    strategy::StrategyContext,
};

/// A pure observer of the run: same hooks as [`crate::strategy::Strategy`]
/// minus the ability to act on the broker (§4.7).
pub trait Analyzer: Debug {
    fn start(&mut self, ctx: &StrategyContext) {
        let _ = ctx;
    }

    fn prenext(&mut self, ctx: &StrategyContext) {
        let _ = ctx;
    }

    fn next(&mut self, ctx: &StrategyContext) {
        let _ = ctx;
    }

    fn stop(&mut self, ctx: &StrategyContext) {
        let _ = ctx;
    }

    fn notify_order(&mut self, order: &Order) {
        let _ = order;
    }

    fn notify_trade(&mut self, trade: &Trade) {
        let _ = trade;
    }

    fn notify_cashvalue(&mut self, cash: f64, value: f64) {
        let _ = (cash, value);
    }

    /// The analyzer's final report: an ordered map of named metrics,
    /// nested maps permitted (§4.7, §6).
    fn get_analysis(&self) -> OrderedMap;
}

/// Base for analyzers that report one metric per period rather than per
/// bar (§4.7): buckets bars by `(timeframe, compression)` and calls
/// [`TimeFrameAnalyzer::on_dt_over`] exactly once per boundary crossing,
/// the way [`crate::resample`] buckets bars for aggregation but without
/// actually folding OHLCV — only the boundary detection is shared in
/// spirit.
pub trait TimeFrameAnalyzer: Debug {
    /// Computes the bucket key for `datetime` under this analyzer's
    /// configured timeframe (reusing the same rule as resample
    /// boundaries, §4.3).
    fn bucket_key(&self, datetime: f64) -> i64;

    /// Called once, on the first bar of a new bucket, with the *closing*
    /// key of the period that just ended (`None` on the very first bar
    /// of the run, since no period has ended yet).
    fn on_dt_over(&mut self, closed_key: Option<i64>, ctx: &StrategyContext);
}

/// Drives a [`TimeFrameAnalyzer`]'s boundary detection from a stream of
/// bar datetimes, tracking the last seen bucket key.
#[derive(Debug, Default)]
pub struct BucketTracker {
    last_key: Option<i64>,
}

impl BucketTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one bar's datetime through `key_fn`; if it opened a new
    /// bucket, returns the key of the period that just closed.
    pub fn observe(&mut self, key: i64) -> Option<Option<i64>> {
        match self.last_key {
            Some(prev) if prev == key => None,
            prev => {
                self.last_key = Some(key);
                Some(prev)
            }
        }
    }

    /// The most recent bucket key observed, if any — used to seal a
    /// still-open final period at run end.
    pub fn last_key(&self) -> Option<i64> {
        self.last_key
    }
}
