//! Shared fixtures for the integration tests: a flat-bar feed builder and
//! a minimal SMA/close crossover strategy, built entirely on `barback`'s
//! public API the way a downstream user of the crate would assemble one.

use std::{cell::RefCell, rc::Rc};

use barback::{
    broker::{Order, OrderKind, OrderStatus, Trade},
    data::{Bar, OhlcvLine, TimeFrame, TimeFrameSpec, VecFeed},
    error::EngineResult,
    indicator::{crossover::Crossover, sma::Sma, IndicatorGraph, IndicatorId},
    strategy::{Strategy, StrategyContext},
};

/// A single-price bar (`open == high == low == close`), which keeps
/// market-order fill arithmetic trivial to verify by hand: the fill
/// price is always exactly the bar's one quoted price.
pub fn flat_bar(dt: f64, price: f64) -> Bar {
    Bar {
        datetime: dt,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 100.0,
        openinterest: 0.0,
    }
}

/// A daily feed of flat bars, one per day starting at day 1, from a
/// slice of closing prices.
pub fn daily_feed(name: &str, closes: &[f64]) -> VecFeed {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| flat_bar(i as f64 + 1.0, c))
        .collect();
    VecFeed::new(name, TimeFrameSpec::new(TimeFrame::Days, 1), bars)
}

/// Everything a test needs to observe out of a [`SmaCrossStrategy`] run,
/// shared by `Rc` since `Cerebro::run` takes the strategy by trait object
/// and never hands it back downcastable.
#[derive(Debug, Default, Clone)]
pub struct TradeLog {
    pub signals: Vec<f64>,
    pub buy_fills: Vec<f64>,
    pub sell_fills: Vec<f64>,
    pub closed_trade_pnls: Vec<f64>,
}

pub type SharedLog = Rc<RefCell<TradeLog>>;

/// Enters long when `close` crosses above `SMA(period)`, exits (flattens)
/// when it crosses back below — the S1/S2 worked-example strategy shape
/// (§4.4, §8), built from the crate's own [`Sma`]/[`Crossover`]
/// indicators and [`StrategyContext`] order API rather than anything
/// test-only.
#[derive(Debug)]
pub struct SmaCrossStrategy {
    graph: IndicatorGraph,
    period: usize,
    sma_id: Option<IndicatorId>,
    cross_id: Option<IndicatorId>,
    data_name: String,
    size: f64,
    minperiod: usize,
    log: SharedLog,
}

impl SmaCrossStrategy {
    pub fn new(data_name: impl Into<String>, period: usize, size: f64, log: SharedLog) -> Self {
        Self {
            graph: IndicatorGraph::new(),
            period,
            sma_id: None,
            cross_id: None,
            data_name: data_name.into(),
            size,
            minperiod: 1,
            log,
        }
    }

    fn cross_signal(&self) -> f64 {
        let cross_id = self.cross_id.expect("init() registers the crossover before any bar runs");
        self.graph.get(cross_id).outputs().by_index(0).unwrap().borrow().get(0)
    }
}

impl Strategy for SmaCrossStrategy {
    fn minperiod(&self) -> usize {
        self.minperiod
    }

    fn set_minperiod(&mut self, minperiod: usize) {
        self.minperiod = minperiod;
    }

    fn indicator_graph(&self) -> &IndicatorGraph {
        &self.graph
    }

    fn indicator_graph_mut(&mut self) -> &mut IndicatorGraph {
        &mut self.graph
    }

    fn init(&mut self, ctx: &mut StrategyContext) -> EngineResult<()> {
        let close = ctx
            .data_by_name(&self.data_name)
            .expect("data feed attached under this name")
            .line(OhlcvLine::Close);

        let sma = Sma::new(close.clone(), self.period);
        let sma_id = self.graph.register(Box::new(sma), vec![]);
        let sma_line = self.graph.get(sma_id).outputs().by_index(0).unwrap();

        let cross = Crossover::new(close, sma_line);
        let cross_id = self.graph.register(Box::new(cross), vec![sma_id]);

        self.sma_id = Some(sma_id);
        self.cross_id = Some(cross_id);
        Ok(())
    }

    fn next(&mut self, ctx: &mut StrategyContext) -> EngineResult<()> {
        let signal = self.cross_signal();
        self.log.borrow_mut().signals.push(signal);

        let position = ctx.getposition(&self.data_name);
        if position.is_flat() && signal > 0.0 {
            ctx.buy(&self.data_name, self.size, 0.0, OrderKind::Market);
        } else if position.size > 0.0 && signal < 0.0 {
            ctx.close(&self.data_name);
        }
        Ok(())
    }

    fn notify_order(&mut self, order: &Order) {
        if order.status != OrderStatus::Completed {
            return;
        }
        let mut log = self.log.borrow_mut();
        if order.size > 0.0 {
            log.buy_fills.push(order.executed_price);
        } else {
            log.sell_fills.push(order.executed_price);
        }
    }

    fn notify_trade(&mut self, trade: &Trade) {
        if !trade.is_open {
            self.log.borrow_mut().closed_trade_pnls.push(trade.pnl_realized);
        }
    }
}
