use crate::{
    analyzer::{value::OrderedMap, Analyzer, BucketTracker, TimeFrameAnalyzer},
    data::{TimeFrame, TimeFrameSpec},
    datetime,
    strategy::StrategyContext,
};

fn bucket_key(datetime_value: f64, spec: TimeFrameSpec) -> i64 {
    match spec.timeframe {
        TimeFrame::Years => (datetime::year_key(datetime_value) / spec.compression.max(1) as i32) as i64,
        TimeFrame::Months => {
            let (year, month) = datetime::month_key(datetime_value);
            (year as i64) * 12 + (month as i64) / spec.compression.max(1) as i64
        }
        TimeFrame::Weeks => {
            let (year, week) = datetime::iso_week_key(datetime_value);
            (year as i64) * 53 + (week as i64) / spec.compression.max(1) as i64
        }
        TimeFrame::Days => datetime::day_key(datetime_value) / spec.compression.max(1) as i64,
        TimeFrame::Seconds | TimeFrame::Minutes | TimeFrame::Hours => {
            let unit = spec.timeframe.unit_seconds().unwrap_or(1.0);
            (datetime_value * 86_400.0 / (unit * spec.compression.max(1) as f64)) as i64
        }
    }
}

/// Per-period portfolio return, keyed by the period's closing bucket
/// (§4.7 worked example, S6 scenario).
///
/// Resolves Open Question O4 (§9 of the expanded spec): an unchanged
/// portfolio value across an entire period still emits an explicit
/// `0.0` entry rather than a gap, since a silently missing bucket is
/// indistinguishable from "this analyzer never ran" to a downstream
/// consumer walking the ordered map.
#[derive(Debug)]
pub struct TimeReturnAnalyzer {
    spec: TimeFrameSpec,
    tracker: BucketTracker,
    period_open_value: Option<f64>,
    last_value: f64,
    returns: OrderedMap,
}

impl TimeReturnAnalyzer {
    pub fn new(spec: TimeFrameSpec) -> Self {
        Self {
            spec,
            tracker: BucketTracker::new(),
            period_open_value: None,
            last_value: 0.0,
            returns: OrderedMap::new(),
        }
    }

    fn seal_period(&mut self, closed_key: i64, closing_value: f64) {
        let open_value = self.period_open_value.unwrap_or(closing_value);
        let ret = if open_value == 0.0 { 0.0 } else { (closing_value - open_value) / open_value };
        self.returns.insert(closed_key.to_string(), ret);
    }
}

impl TimeFrameAnalyzer for TimeReturnAnalyzer {
    fn bucket_key(&self, datetime_value: f64) -> i64 {
        bucket_key(datetime_value, self.spec)
    }

    fn on_dt_over(&mut self, closed_key: Option<i64>, _ctx: &StrategyContext) {
        if let Some(key) = closed_key {
            self.seal_period(key, self.last_value);
        }
        self.period_open_value = Some(self.last_value);
    }
}

impl Analyzer for TimeReturnAnalyzer {
    fn next(&mut self, ctx: &StrategyContext) {
        let value = ctx.getvalue();
        let datetime_value = ctx.data(0).current_bar().datetime;
        let key = self.bucket_key(datetime_value);
        if let Some(closed) = self.tracker.observe(key) {
            self.on_dt_over(closed, ctx);
        }
        self.last_value = value;
    }

    fn stop(&mut self, _ctx: &StrategyContext) {
        // Seal whatever period was still open when the run ended — the
        // final bucket otherwise never gets a boundary crossing to
        // trigger `on_dt_over`.
        if let Some(key) = self.tracker.last_key() {
            self.seal_period(key, self.last_value);
        }
    }

    fn get_analysis(&self) -> OrderedMap {
        self.returns.clone()
    }
}
