//! Higher-timeframe bar aggregation with two delivery modes (C5): resample
//! (one output bar per completed period) and replay (the in-progress bar
//! is updated in place on every source tick, sealed at the boundary).

use chrono::NaiveTime;
use tracing::trace;

use crate::{
    data::{Bar, DataSeries, Feed, TimeFrame, TimeFrameSpec},
    datetime,
    error::{EngineResult, ResampleError},
};

/// The bucket a source bar's datetime falls into, for boundary detection
/// (§4.3). Sub-daily timeframes use a flat integer division; daily and
/// coarser use calendar keys, since wall-clock buckets stop being a
/// uniform-width division of the epoch once months have unequal lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodKey {
    Flat(i64),
    Daily { day: i64, after_session_end: bool },
    Weekly(i32, u32),
    Monthly(i32, u32),
    Yearly(i32),
}

fn period_key(datetime: f64, spec: TimeFrameSpec, session_end: Option<NaiveTime>) -> PeriodKey {
    match spec.timeframe {
        TimeFrame::Seconds | TimeFrame::Minutes | TimeFrame::Hours => {
            let unit = spec.timeframe.unit_seconds().expect("sub-daily timeframe has unit_seconds");
            let bucket_width_days = (unit * spec.compression as f64) / 86_400.0;
            PeriodKey::Flat((datetime / bucket_width_days).floor() as i64)
        }
        TimeFrame::Days => {
            let day = datetime::day_key(datetime) / spec.compression as i64;
            let after_session_end = match session_end {
                Some(end) => datetime::from_num(datetime).time() > end,
                None => false,
            };
            PeriodKey::Daily { day, after_session_end }
        }
        TimeFrame::Weeks => {
            let (year, week) = datetime::iso_week_key(datetime);
            PeriodKey::Weekly(year, week / spec.compression.max(1))
        }
        TimeFrame::Months => {
            let (year, month) = datetime::month_key(datetime);
            PeriodKey::Monthly(year, month / spec.compression.max(1))
        }
        TimeFrame::Years => PeriodKey::Yearly(datetime::year_key(datetime) / spec.compression.max(1) as i32),
    }
}

/// Accumulates source bars into one target-timeframe [`Bar`] (§4.3
/// "Aggregation fields" table), independent of whether the result is
/// delivered in resample or replay style.
#[derive(Debug, Clone)]
struct Accumulator {
    partial: Option<Bar>,
    key: Option<PeriodKey>,
}

impl Accumulator {
    fn new() -> Self {
        Self { partial: None, key: None }
    }

    /// Folds `bar` in. Returns `true` if this bar opened a new period
    /// (the prior partial, if any, should be considered sealed).
    fn fold(&mut self, bar: Bar, key: PeriodKey) -> bool {
        let is_new_period = match self.key {
            Some(prev) => prev != key,
            None => true,
        };

        if is_new_period {
            self.partial = Some(bar);
        } else {
            let p = self.partial.as_mut().expect("accumulator has a partial once a key is set");
            p.datetime = bar.datetime;
            p.high = p.high.max(bar.high);
            p.low = p.low.min(bar.low);
            p.close = bar.close;
            p.volume += bar.volume;
            p.openinterest = bar.openinterest;
        }
        self.key = Some(key);
        is_new_period
    }

    fn current(&self) -> Bar {
        self.partial.expect("fold must be called before current")
    }
}

/// Shared boundary-tracking and data-ordering validation for both
/// [`Resampler`] and [`Replayer`].
#[derive(Debug)]
struct AggregatorCore {
    target: TimeFrameSpec,
    session_end: Option<NaiveTime>,
    auto_skip: bool,
    last_source_datetime: Option<f64>,
    acc: Accumulator,
}

impl AggregatorCore {
    fn new(target: TimeFrameSpec, session_end: Option<NaiveTime>, auto_skip: bool) -> Self {
        Self {
            target,
            session_end,
            auto_skip,
            last_source_datetime: None,
            acc: Accumulator::new(),
        }
    }

    /// Validates ordering, folds `bar` in, and reports whether a new
    /// period was opened (the previous partial, if any, is now sealed).
    /// Returns `Ok(None)` when `auto_skip` swallowed a backward-in-time
    /// bar instead of failing the run.
    fn accept(&mut self, bar: Bar) -> EngineResult<Option<bool>> {
        if let Some(last) = self.last_source_datetime {
            if bar.datetime < last {
                if self.auto_skip {
                    trace!(bar = bar.datetime, last, "auto-skipping out-of-order source bar");
                    return Ok(None);
                }
                return Err(ResampleError::DataOrdering {
                    bar: bar.datetime.to_string(),
                    last: last.to_string(),
                }
                .into());
            }
        }
        self.last_source_datetime = Some(bar.datetime);

        let key = period_key(bar.datetime, self.target, self.session_end);
        let sealed_previous = self.acc.fold(bar, key);
        Ok(Some(sealed_previous))
    }
}

/// Resample mode: emits exactly one output bar per completed source
/// period (§4.3). Wraps a source [`DataSeries`] and is itself a [`Feed`],
/// so it drives a downstream `DataSeries` the same way any other source
/// does.
#[derive(Debug)]
pub struct Resampler {
    name: String,
    source: DataSeries,
    core: AggregatorCore,
    pending: Option<Bar>,
}

impl Resampler {
    pub fn new(source: DataSeries, target: TimeFrameSpec, session_end: Option<NaiveTime>, auto_skip: bool) -> Self {
        let name = format!("{}@{}", source.name(), target.timeframe);
        Self {
            name,
            source,
            core: AggregatorCore::new(target, session_end, auto_skip),
            pending: None,
        }
    }
}

impl Feed for Resampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> TimeFrameSpec {
        self.core.target
    }

    fn start(&mut self) -> EngineResult<()> {
        self.source.start()
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.source.stop()
    }

    fn islive(&self) -> bool {
        self.source.islive()
    }

    /// Pulls source bars, folding each into the running partial, until a
    /// boundary seals a completed bar — which may consume many source
    /// ticks for one emitted tick here (§4.3 "N:1").
    fn fetch_next(&mut self) -> EngineResult<Option<Bar>> {
        loop {
            if !self.source.next()? {
                // Source exhausted: flush whatever partial remains, once.
                return Ok(self.pending.take());
            }
            let bar = self.source.current_bar();
            match self.core.accept(bar)? {
                None => continue, // auto-skipped
                Some(sealed_previous) => {
                    if sealed_previous {
                        if let Some(completed) = self.pending.replace(self.core.acc.current()) {
                            return Ok(Some(completed));
                        }
                        // First period ever opened: nothing to flush yet.
                    } else {
                        self.pending = Some(self.core.acc.current());
                    }
                }
            }
        }
    }
}

/// Replay mode: the in-progress bar is delivered on every source tick,
/// updated in place, and "sealed" (a new bar begun) when a boundary is
/// crossed (§4.3). 1:1 with the source: every accepted source bar yields
/// exactly one replay tick.
#[derive(Debug)]
pub struct Replayer {
    name: String,
    source: DataSeries,
    core: AggregatorCore,
    last_seal: bool,
}

impl Replayer {
    pub fn new(source: DataSeries, target: TimeFrameSpec, session_end: Option<NaiveTime>, auto_skip: bool) -> Self {
        let name = format!("{}@{}[replay]", source.name(), target.timeframe);
        Self {
            name,
            source,
            core: AggregatorCore::new(target, session_end, auto_skip),
            last_seal: false,
        }
    }

    /// Whether the tick just produced by [`Feed::fetch_next`] sealed the
    /// previous bar (began a new period) rather than updating it in
    /// place. Downstream consumers that only care about completed bars
    /// gate on this (§4.3).
    pub fn sealed_previous(&self) -> bool {
        self.last_seal
    }
}

impl Feed for Replayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> TimeFrameSpec {
        self.core.target
    }

    fn start(&mut self) -> EngineResult<()> {
        self.source.start()
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.source.stop()
    }

    fn islive(&self) -> bool {
        self.source.islive()
    }

    fn fetch_next(&mut self) -> EngineResult<Option<Bar>> {
        loop {
            if !self.source.next()? {
                return Ok(None);
            }
            let bar = self.source.current_bar();
            match self.core.accept(bar)? {
                None => continue, // auto-skipped
                Some(sealed_previous) => {
                    self.last_seal = sealed_previous;
                    return Ok(Some(self.core.acc.current()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{TimeFrame, VecFeed};

    fn bar(dt: f64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Bar {
        Bar {
            datetime: dt,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
            openinterest: 0.0,
        }
    }

    fn daily_source(bars: Vec<Bar>) -> DataSeries {
        let feed = VecFeed::new("daily", TimeFrameSpec::new(TimeFrame::Days, 1), bars);
        let mut ds = DataSeries::new(Box::new(feed));
        ds.start().unwrap();
        ds
    }

    #[test]
    fn resample_emits_one_bar_per_completed_week() {
        // Mon..Fri of one ISO week, then Mon of the next.
        use chrono::{TimeZone, Utc};
        let d = |y, m, day| datetime::to_num(Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap());

        let bars = vec![
            bar(d(2023, 6, 12), 10.0, 12.0, 9.0, 11.0, 100.0), // Mon wk24
            bar(d(2023, 6, 13), 11.0, 13.0, 10.0, 12.0, 100.0),
            bar(d(2023, 6, 16), 12.0, 14.0, 11.0, 13.0, 100.0), // Fri wk24
            bar(d(2023, 6, 19), 20.0, 21.0, 19.0, 20.5, 100.0), // Mon wk25
        ];
        let source = daily_source(bars);
        let mut resampler = Resampler::new(source, TimeFrameSpec::new(TimeFrame::Weeks, 1), None, false);
        resampler.start().unwrap();

        let week1 = resampler.fetch_next().unwrap().expect("week 1 completes on the wk25 bar");
        assert_eq!(week1.open, 10.0);
        assert_eq!(week1.high, 14.0);
        assert_eq!(week1.low, 9.0);
        assert_eq!(week1.close, 13.0);
        assert_eq!(week1.volume, 300.0);

        // Source is now exhausted after folding the wk25 bar; the
        // partial (week 2, one bar so far) flushes on exhaustion.
        let week2 = resampler.fetch_next().unwrap().expect("trailing partial flushes on exhaustion");
        assert_eq!(week2.open, 20.0);
        assert_eq!(week2.close, 20.5);

        assert!(resampler.fetch_next().unwrap().is_none());
    }

    #[test]
    fn replay_updates_in_place_then_seals() {
        use chrono::{TimeZone, Utc};
        let d = |y, m, day| datetime::to_num(Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap());

        let bars = vec![
            bar(d(2023, 6, 12), 10.0, 12.0, 9.0, 11.0, 100.0),
            bar(d(2023, 6, 13), 11.0, 13.0, 10.0, 12.0, 100.0),
            bar(d(2023, 6, 19), 20.0, 21.0, 19.0, 20.5, 100.0),
        ];
        let source = daily_source(bars);
        let mut replayer = Replayer::new(source, TimeFrameSpec::new(TimeFrame::Weeks, 1), None, false);
        replayer.start().unwrap();

        let tick1 = replayer.fetch_next().unwrap().unwrap();
        assert_eq!(tick1.close, 11.0);
        assert_eq!(tick1.high, 12.0);

        let tick2 = replayer.fetch_next().unwrap().unwrap();
        assert_eq!(tick2.close, 12.0); // updated in place
        assert_eq!(tick2.high, 13.0); // high carried forward and maxed
        assert_eq!(tick2.open, 10.0); // open unchanged within the period

        let tick3 = replayer.fetch_next().unwrap().unwrap();
        assert_eq!(tick3.open, 20.0); // new period sealed, fresh bar
        assert_eq!(tick3.close, 20.5);
    }

    #[test]
    fn backward_datetime_without_auto_skip_fails() {
        let bars = vec![bar(2.0, 1.0, 1.0, 1.0, 1.0, 1.0), bar(1.0, 1.0, 1.0, 1.0, 1.0, 1.0)];
        // DataSeries itself rejects non-monotonic bars before the
        // aggregator ever sees them, so drive the aggregator core
        // directly to exercise its own ordering guard in isolation.
        let mut core = AggregatorCore::new(TimeFrameSpec::new(TimeFrame::Days, 1), None, false);
        core.accept(bars[0]).unwrap();
        assert!(core.accept(bars[1]).is_err());
    }

    #[test]
    fn tie_break_places_boundary_bar_in_the_new_period() {
        use chrono::{TimeZone, Utc};
        let d = |y, m, day| datetime::to_num(Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap());
        let k1 = period_key(d(2023, 6, 16), TimeFrameSpec::new(TimeFrame::Weeks, 1), None);
        let k2 = period_key(d(2023, 6, 19), TimeFrameSpec::new(TimeFrame::Weeks, 1), None);
        assert_ne!(k1, k2);
    }
}
