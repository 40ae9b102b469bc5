use std::fmt::Debug;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    data::{bar::Bar, bar::OhlcvLine, timeframe::TimeFrameSpec},
    error::EngineResult,
    line::{LineHandle, Lines},
};

/// Lifecycle status of a data feed (§3 supplement). Only `Live` changes
/// observable engine behavior (it forces streaming mode and disables
/// preload, §6) — live-trading semantics themselves are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedStatus {
    Disconnected,
    Connected,
    Historical,
    Live,
}

/// External collaborator that supplies bars to a [`DataSeries`]. Concrete
/// implementations (CSV, database, HTTP/API feeds, DataFrame adapters) are
/// out of scope (§1) — this trait is the contract they must obey.
pub trait Feed: Debug {
    fn name(&self) -> &str;

    fn timeframe(&self) -> TimeFrameSpec;

    /// Opens any external resource. Called once before the run.
    fn start(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Releases any external resource. Called once after the run,
    /// regardless of how the run ended (§5 scoped acquisition).
    fn stop(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Attempts to produce the next bar. `Ok(None)` signals exhaustion.
    fn fetch_next(&mut self) -> EngineResult<Option<Bar>>;

    /// Whether this feed is a live source, which forces streaming mode
    /// and disables preload (§6).
    fn islive(&self) -> bool {
        false
    }
}

/// A [`Lines`] collection with the fixed OHLCV+datetime+OI schema (C3),
/// backed by a [`Feed`] that actually produces bars.
#[derive(Debug)]
pub struct DataSeries {
    lines: Lines,
    source: Box<dyn Feed>,
    name: String,
    timeframe: TimeFrameSpec,
    session_start: Option<NaiveTime>,
    session_end: Option<NaiveTime>,
    status: FeedStatus,
}

impl DataSeries {
    pub fn new(source: Box<dyn Feed>) -> Self {
        let mut lines = Lines::new();
        for line in OhlcvLine::ALL {
            lines.declare(line.alias());
        }
        let name = source.name().to_string();
        let timeframe = source.timeframe();
        Self {
            lines,
            source,
            name,
            timeframe,
            session_start: None,
            session_end: None,
            status: FeedStatus::Disconnected,
        }
    }

    pub fn with_session(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.session_start = Some(start);
        self.session_end = Some(end);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeframe(&self) -> TimeFrameSpec {
        self.timeframe
    }

    pub fn session_end(&self) -> Option<NaiveTime> {
        self.session_end
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn islive(&self) -> bool {
        self.source.islive()
    }

    pub fn line(&self, ohlcv: OhlcvLine) -> LineHandle {
        self.lines
            .by_index(ohlcv.index())
            .expect("fixed OHLCV schema always has all seven lines")
    }

    pub fn lines(&self) -> &Lines {
        &self.lines
    }

    /// The bar currently under the cursor (`ago = 0` of every line),
    /// assembled back into a [`Bar`] value. Used by the resample/replay
    /// aggregators, which fold a source series bar by bar rather than
    /// reading its lines directly.
    pub fn current_bar(&self) -> Bar {
        Bar {
            datetime: self.lines.by_index(OhlcvLine::Datetime.index()).unwrap().borrow().get(0),
            open: self.lines.by_index(OhlcvLine::Open.index()).unwrap().borrow().get(0),
            high: self.lines.by_index(OhlcvLine::High.index()).unwrap().borrow().get(0),
            low: self.lines.by_index(OhlcvLine::Low.index()).unwrap().borrow().get(0),
            close: self.lines.by_index(OhlcvLine::Close.index()).unwrap().borrow().get(0),
            volume: self.lines.by_index(OhlcvLine::Volume.index()).unwrap().borrow().get(0),
            openinterest: self
                .lines
                .by_index(OhlcvLine::OpenInterest.index())
                .unwrap()
                .borrow()
                .get(0),
        }
    }

    /// Opens the feed and positions the cursor before the first bar (§4.2).
    pub fn start(&mut self) -> EngineResult<()> {
        self.source.start()?;
        self.status = if self.source.islive() {
            FeedStatus::Live
        } else {
            FeedStatus::Historical
        };
        Ok(())
    }

    pub fn stop(&mut self) -> EngineResult<()> {
        self.source.stop()?;
        self.status = FeedStatus::Disconnected;
        Ok(())
    }

    /// Attempts to load the next bar: on success appends one value to each
    /// of the seven lines and advances the cursor; returns `true`. Returns
    /// `false` on exhaustion (§4.2).
    pub fn next(&mut self) -> EngineResult<bool> {
        match self.source.fetch_next()? {
            Some(bar) => {
                self.accept(bar)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Loads every bar up front, then homes the cursor to 0 for the
    /// vectorized path (§4.2).
    pub fn preload(&mut self) -> EngineResult<()> {
        while self.next()? {}
        for handle in self.lines.iter() {
            handle.borrow_mut().home();
        }
        Ok(())
    }

    /// Appends `bar` to the lines without re-validating its shape or
    /// datetime ordering (§4.2) — a feed is trusted to supply valid,
    /// time-ordered bars; the Resampler/Replayer aggregators are the
    /// layer that polices ordering against their own accumulator state.
    fn accept(&mut self, bar: Bar) -> EngineResult<()> {
        trace!(feed = %self.name, datetime = bar.datetime, "accepted bar");
        self.lines.append_row(&[
            bar.datetime,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            bar.openinterest,
        ]);
        Ok(())
    }
}

/// A minimal in-memory [`Feed`] over a pre-built `Vec<Bar>`. Not a
/// "concrete file-format feed" in the sense excluded by §1 — it exists
/// purely so the framework itself (and its tests/demos) has something to
/// drive without depending on an external file-format or network adapter.
#[derive(Debug, Clone)]
pub struct VecFeed {
    name: String,
    timeframe: TimeFrameSpec,
    bars: std::collections::VecDeque<Bar>,
}

impl VecFeed {
    pub fn new(name: impl Into<String>, timeframe: TimeFrameSpec, bars: Vec<Bar>) -> Self {
        Self {
            name: name.into(),
            timeframe,
            bars: bars.into(),
        }
    }
}

impl Feed for VecFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> TimeFrameSpec {
        self.timeframe
    }

    fn fetch_next(&mut self) -> EngineResult<Option<Bar>> {
        Ok(self.bars.pop_front())
    }
}
