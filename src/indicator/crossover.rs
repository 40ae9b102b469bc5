use tracing::instrument;

use crate::{
    indicator::Indicator,
    line::{LineHandle, Lines},
};

/// Detects `data0` crossing `data1`: `+1.0` on an upward cross, `-1.0` on
/// a downward cross, `0.0` otherwise (§4.4 worked example; drives the SMA
/// crossover entry signal in the S1/S2 scenarios).
///
/// Grounded in the reference implementation's `CrossOver`/`CrossUp`/
/// `CrossDown`/`NonZeroDifference` family, collapsed into a single
/// indicator that tracks the last nonzero `data0 - data1` difference
/// directly rather than composing three sub-indicators — the "carry
/// forward the last nonzero diff" trick is what lets a cross register
/// even across a bar where the two lines sit exactly equal.
#[derive(Debug)]
pub struct Crossover {
    data0: LineHandle,
    data1: LineHandle,
    minperiod: usize,
    outputs: Lines,
    last_nonzero_diff: f64,
}

impl Crossover {
    pub fn new(data0: LineHandle, data1: LineHandle) -> Self {
        let mut outputs = Lines::new();
        outputs.declare("crossover");
        Self {
            data0,
            data1,
            minperiod: 2,
            outputs,
            last_nonzero_diff: 0.0,
        }
    }

    pub fn line(&self) -> LineHandle {
        self.outputs
            .by_index(0)
            .expect("crossover always declares its output line")
    }

    fn diff(&self) -> f64 {
        self.data0.borrow().get(0) - self.data1.borrow().get(0)
    }
}

impl Indicator for Crossover {
    fn window(&self) -> usize {
        2
    }

    fn minperiod(&self) -> usize {
        self.minperiod
    }

    fn set_minperiod(&mut self, minperiod: usize) {
        self.minperiod = minperiod;
    }

    fn outputs(&self) -> &Lines {
        &self.outputs
    }

    fn prenext(&mut self, _idx: usize) {
        self.outputs.by_index(0).unwrap().borrow_mut().append(f64::NAN);
    }

    /// No prior bar exists to compare against yet, so the first valid
    /// bar can never itself be a cross.
    #[instrument(level = "trace", skip(self))]
    fn nextstart(&mut self, _idx: usize) {
        let diff = self.diff();
        if diff != 0.0 {
            self.last_nonzero_diff = diff;
        }
        self.outputs.by_index(0).unwrap().borrow_mut().append(0.0);
    }

    #[instrument(level = "trace", skip(self))]
    fn next(&mut self, _idx: usize) {
        let prev = self.last_nonzero_diff;
        let data0 = self.data0.borrow().get(0);
        let data1 = self.data1.borrow().get(0);

        let crossed_up = prev < 0.0 && data0 > data1;
        let crossed_down = prev > 0.0 && data0 < data1;
        let signal = match (crossed_up, crossed_down) {
            (true, _) => 1.0,
            (_, true) => -1.0,
            _ => 0.0,
        };

        let diff = data0 - data1;
        if diff != 0.0 {
            self.last_nonzero_diff = diff;
        }

        self.outputs.by_index(0).unwrap().borrow_mut().append(signal);
    }

    #[instrument(level = "trace", skip(self))]
    fn once(&mut self, start: usize, end: usize) {
        let data0 = self.data0.borrow();
        let data1 = self.data1.borrow();
        let output = self.outputs.by_index(0).unwrap();
        let mut output = output.borrow_mut();

        for idx in start..end {
            if idx + 1 < self.minperiod {
                output.append(f64::NAN);
                continue;
            }
            let diff = data0.at(idx) - data1.at(idx);
            if idx + 1 == self.minperiod {
                if diff != 0.0 {
                    self.last_nonzero_diff = diff;
                }
                output.append(0.0);
                continue;
            }

            let prev = self.last_nonzero_diff;
            let crossed_up = prev < 0.0 && data0.at(idx) > data1.at(idx);
            let crossed_down = prev > 0.0 && data0.at(idx) < data1.at(idx);
            let signal = match (crossed_up, crossed_down) {
                (true, _) => 1.0,
                (_, true) => -1.0,
                _ => 0.0,
            };
            if diff != 0.0 {
                self.last_nonzero_diff = diff;
            }
            output.append(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::{lifecycle_stage, LifecycleStage};
    use crate::line::LineBuffer;
    use std::{cell::RefCell, rc::Rc};

    fn feed_with(values: &[f64]) -> LineHandle {
        let buf = Rc::new(RefCell::new(LineBuffer::new()));
        for &v in values {
            buf.borrow_mut().append(v);
        }
        buf
    }

    #[test]
    fn detects_upward_and_downward_crosses() {
        // data0 under data1, crosses above at idx 2, then back below at idx 4.
        let data0 = feed_with(&[1.0, 2.0, 4.0, 5.0, 3.0]);
        let data1 = feed_with(&[3.0, 3.0, 3.0, 3.0, 3.0]);
        let mut cross = Crossover::new(data0, data1);
        cross.set_minperiod(2);

        let mut signals = Vec::new();
        for idx in 0..5 {
            match lifecycle_stage(idx, 2) {
                LifecycleStage::PreNext => cross.prenext(idx),
                LifecycleStage::NextStart => cross.nextstart(idx),
                LifecycleStage::Next => cross.next(idx),
            }
            signals.push(cross.line().borrow().get(0));
        }

        assert!(signals[0].is_nan());
        assert_eq!(signals[1], 0.0);
        assert_eq!(signals[2], 1.0);
        assert_eq!(signals[3], 0.0);
        assert_eq!(signals[4], -1.0);
    }

    #[test]
    fn once_matches_streaming_signals() {
        let values0 = [1.0, 2.0, 4.0, 5.0, 3.0, 3.0, 6.0];
        let values1 = [3.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0];

        let mut streaming = Crossover::new(feed_with(&values0), feed_with(&values1));
        streaming.set_minperiod(2);
        for idx in 0..values0.len() {
            match lifecycle_stage(idx, 2) {
                LifecycleStage::PreNext => streaming.prenext(idx),
                LifecycleStage::NextStart => streaming.nextstart(idx),
                LifecycleStage::Next => streaming.next(idx),
            }
        }

        let mut vectorized = Crossover::new(feed_with(&values0), feed_with(&values1));
        vectorized.set_minperiod(2);
        vectorized.once(0, values0.len());

        for ago in 0..values0.len() {
            let ago = -(ago as isize);
            let a = streaming.line().borrow().get(ago);
            let b = vectorized.line().borrow().get(ago);
            assert_eq!(a.is_nan(), b.is_nan());
            if !a.is_nan() {
                assert_eq!(a, b);
            }
        }
    }
}
