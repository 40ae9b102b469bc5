use crate::{
    analyzer::{Analyzer, OrderedMap},
    broker::Trade,
    strategy::StrategyContext,
};

/// System Quality Number: `sqrt(N) * mean(trade PnL) / stddev(trade PnL)`
/// over closed trades (§4.7 worked example, S3 scenario).
///
/// Grounded in the reference implementation's `SQN` analyzer, which
/// accumulates PnL incrementally rather than materializing the whole
/// trade history — this keeps the analyzer's memory flat in the number
/// of bars, matching its counterpart's streaming accumulation style.
#[derive(Debug, Default)]
pub struct SqnAnalyzer {
    count: u64,
    sum: f64,
    sum_sq: f64,
}

impl SqnAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Population standard deviation of closed-trade PnL.
    fn stddev(&self) -> f64 {
        let mean = self.mean();
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        variance.max(0.0).sqrt()
    }

    pub fn sqn(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let stddev = self.stddev();
        if stddev == 0.0 {
            return None;
        }
        Some((self.count as f64).sqrt() * self.mean() / stddev)
    }
}

impl Analyzer for SqnAnalyzer {
    fn notify_trade(&mut self, trade: &Trade) {
        if trade.is_open {
            return;
        }
        self.count += 1;
        self.sum += trade.pnl_realized;
        self.sum_sq += trade.pnl_realized * trade.pnl_realized;
    }

    fn get_analysis(&self) -> OrderedMap {
        let mut map = OrderedMap::new();
        map.insert("trades", self.count as i64);
        match self.sqn() {
            Some(sqn) => map.insert("sqn", sqn),
            None => map.insert("sqn", f64::NAN),
        }
        map
    }
}
