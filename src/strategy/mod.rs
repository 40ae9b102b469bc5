//! The strategy base (C8): user extension points plus the broker-bound
//! public API (`buy`/`sell`/`close`/`cancel`/`getposition`/`getcash`/
//! `getvalue`/`len`/`data`) every strategy implementation is handed
//! through a [`StrategyContext`] each call.

use std::fmt::Debug;

use crate::{
    broker::{Order, OrderId, OrderKind, Position, SimulatedBroker, Trade},
    data::DataSeries,
    error::EngineResult,
    indicator::IndicatorGraph,
};

/// Everything a [`Strategy`] call needs to read the run's current state
/// and act on the broker, without the strategy holding its own
/// reference to the engine internals (§4.6).
pub struct StrategyContext<'a> {
    broker: &'a mut SimulatedBroker,
    datas: &'a [DataSeries],
    bar_idx: usize,
    current_datetime: f64,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        broker: &'a mut SimulatedBroker,
        datas: &'a [DataSeries],
        bar_idx: usize,
        current_datetime: f64,
    ) -> Self {
        Self { broker, datas, bar_idx, current_datetime }
    }

    /// The i-th attached data feed (§4.6 `data(i)`).
    pub fn data(&self, index: usize) -> &DataSeries {
        &self.datas[index]
    }

    pub fn data_by_name(&self, name: &str) -> Option<&DataSeries> {
        self.datas.iter().find(|d| d.name() == name)
    }

    /// Current bar index, 1-based count of bars seen (§4.6 `len()`).
    pub fn len(&self) -> usize {
        self.bar_idx + 1
    }

    pub fn getposition(&self, data: &str) -> Position {
        self.broker.position(data)
    }

    pub fn getcash(&self) -> f64 {
        self.broker.cash()
    }

    /// Portfolio value marked to each attached data feed's last close.
    pub fn getvalue(&self) -> f64 {
        let marks: std::collections::HashMap<String, f64> = self
            .datas
            .iter()
            .map(|d| (d.name().to_string(), d.current_bar().close))
            .collect();
        self.broker.value(&marks)
    }

    pub fn buy(&mut self, data: &str, size: f64, price_hint: f64, kind: OrderKind) -> Order {
        self.broker.buy(data, size, price_hint, kind, self.bar_idx, self.current_datetime, None)
    }

    pub fn sell(&mut self, data: &str, size: f64, price_hint: f64, kind: OrderKind) -> Order {
        self.broker.sell(data, size, price_hint, kind, self.bar_idx, self.current_datetime, None)
    }

    pub fn close(&mut self, data: &str) -> Order {
        self.broker.close(data, self.bar_idx, self.current_datetime)
    }

    pub fn cancel(&mut self, id: OrderId) -> EngineResult<()> {
        self.broker.cancel(id)
    }
}

/// User-defined trading logic, driven one bar at a time (§4.6).
///
/// Object-safe so Cerebro can run a heterogeneous set of strategy
/// instances (one per factory) uniformly. `minperiod` follows the same
/// propagation discipline as [`crate::indicator::Indicator`]: the
/// engine computes `max(attached data minperiods, child indicator
/// minperiods)` once every indicator the strategy's `init()` attached
/// has been registered, and gates `prenext`/`nextstart`/`next` on it.
pub trait Strategy: Debug {
    fn minperiod(&self) -> usize {
        1
    }

    fn set_minperiod(&mut self, minperiod: usize);

    /// The indicators this strategy's `init()` attached, owned by the
    /// strategy itself rather than by Cerebro (§4.8: indicator compute is
    /// driven strategy-tree-wide, in topological order, each bar). A
    /// strategy with no indicators returns an empty graph.
    fn indicator_graph(&self) -> &IndicatorGraph;

    fn indicator_graph_mut(&mut self) -> &mut IndicatorGraph;

    /// Indicator construction and any one-time setup. Called once,
    /// before `start()`.
    fn init(&mut self, ctx: &mut StrategyContext) -> EngineResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called once data feeds are open, before the bar loop begins.
    fn start(&mut self, ctx: &mut StrategyContext) -> EngineResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Warm-up hook: called while the current bar index is below
    /// `minperiod - 1`.
    fn prenext(&mut self, ctx: &mut StrategyContext) -> EngineResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called exactly once, at the first bar where `minperiod` is
    /// satisfied. Default forwards to [`Self::next`].
    fn nextstart(&mut self, ctx: &mut StrategyContext) -> EngineResult<()> {
        self.next(ctx)
    }

    /// The strategy's main per-bar decision point.
    fn next(&mut self, ctx: &mut StrategyContext) -> EngineResult<()>;

    /// Called once after the bar loop ends, regardless of how it ended
    /// (§5 scoped acquisition — cleanup hooks always run).
    fn stop(&mut self, ctx: &mut StrategyContext) -> EngineResult<()> {
        let _ = ctx;
        Ok(())
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
}
