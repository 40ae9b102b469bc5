use tracing::instrument;

use crate::{
    indicator::{lifecycle_stage, Indicator, LifecycleStage},
    line::{LineHandle, Lines},
};

/// Simple moving average over `period` bars of an upstream line (§4.4
/// worked example, and the indicator S1/S4/S5 scenarios are built on).
///
/// Grounded in the reference implementation's `SimpleMovingAverage`: a
/// single output line, `minperiod == period`, and a running-sum `once()`
/// that is genuinely faster than replaying `next()` bar by bar.
#[derive(Debug)]
pub struct Sma {
    input: LineHandle,
    period: usize,
    minperiod: usize,
    outputs: Lines,
    running_sum: f64,
}

impl Sma {
    pub fn new(input: LineHandle, period: usize) -> Self {
        assert!(period >= 1, "period must be at least 1");
        let mut outputs = Lines::new();
        outputs.declare("sma");
        Self {
            input,
            period,
            minperiod: period,
            outputs,
            running_sum: 0.0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Convenience accessor for the single output line.
    pub fn line(&self) -> LineHandle {
        self.outputs.by_index(0).expect("sma always declares its output line")
    }
}

impl Indicator for Sma {
    fn window(&self) -> usize {
        self.period
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

    #[instrument(level = "trace", skip(self))]
    fn prenext(&mut self, _idx: usize) {
        self.outputs.by_index(0).unwrap().borrow_mut().append(f64::NAN);
    }

    #[instrument(level = "trace", skip(self))]
    fn next(&mut self, _idx: usize) {
        let input = self.input.borrow();
        let sum: f64 = (0..self.period).map(|ago| input.get(-(ago as isize))).sum();
        drop(input);
        self.outputs
            .by_index(0)
            .unwrap()
            .borrow_mut()
            .append(sum / self.period as f64);
    }

    /// True single-pass vectorized fill: a running sum slides across the
    /// preloaded input instead of re-summing the whole window every bar,
    /// the way the streaming `next()` above does (which is the point of
    /// having a distinct `once()` at all — see I3 mode equivalence).
    ///
    /// Reads the input by absolute position rather than cursor-relative
    /// `ago`: a vectorized pass processes the whole `[start, end)` range
    /// in one call, with no shared per-bar clock stepping the input's
    /// cursor in lockstep the way the streaming path has.
    #[instrument(level = "trace", skip(self))]
    fn once(&mut self, start: usize, end: usize) {
        let input = self.input.borrow();
        let output = self.outputs.by_index(0).unwrap();
        let mut output = output.borrow_mut();

        for idx in start..end {
            match lifecycle_stage(idx, self.minperiod) {
                LifecycleStage::PreNext => {
                    output.append(f64::NAN);
                }
                LifecycleStage::NextStart => {
                    self.running_sum = (0..self.period).map(|back| input.at(idx - back)).sum();
                    output.append(self.running_sum / self.period as f64);
                }
                LifecycleStage::Next => {
                    self.running_sum += input.at(idx) - input.at(idx - self.period);
                    output.append(self.running_sum / self.period as f64);
                }
            }
        }
    }
}
