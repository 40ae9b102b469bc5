use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    broker::{
        commission::CommissionScheme,
        order::{Order, OrderId, OrderKind, OrderStatus},
        position::Position,
        trade::{Trade, TradeId},
    },
    data::Bar,
    error::{BrokerError, EngineResult},
};

/// Whether a data feed's fills transact full notional cash (stock-like)
/// or only move cash on realized PnL against a per-contract margin
/// reserve (futures-like) — §4.5 "Portfolio valuation".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MarketMode {
    Stock,
    Futures { margin_per_contract: f64, multiplier: f64 },
}

/// An event the broker emits for a strategy to observe via its
/// `notify_order`/`notify_trade`/`notify_cashvalue` hooks (§4.5, §5).
#[derive(Debug, Clone)]
pub enum Notification {
    Order(Order),
    Trade(Trade),
    CashValue { cash: f64, value: f64 },
}

/// Single-data-feed-scoped broker state: cash, positions, open order
/// queue, history, and trades, driven one bar at a time by
/// [`SimulatedBroker::match_bar`] (§4.5).
#[derive(Debug)]
pub struct SimulatedBroker {
    cash: f64,
    mode: HashMap<String, MarketMode>,
    default_mode: MarketMode,
    commission: CommissionScheme,
    positions: HashMap<String, Position>,
    open_orders: Vec<Order>,
    history: Vec<Order>,
    trades: Vec<Trade>,
    open_trade: HashMap<String, TradeId>,
    mailbox: VecDeque<Notification>,
    next_order_id: u64,
    next_trade_id: u64,
    cheat_on_open: bool,
}

impl SimulatedBroker {
    pub fn new(starting_cash: f64, default_mode: MarketMode, commission: CommissionScheme) -> Self {
        Self {
            cash: starting_cash,
            mode: HashMap::new(),
            default_mode,
            commission,
            positions: HashMap::new(),
            open_orders: Vec::new(),
            history: Vec::new(),
            trades: Vec::new(),
            open_trade: HashMap::new(),
            mailbox: VecDeque::new(),
            next_order_id: 1,
            next_trade_id: 1,
            cheat_on_open: false,
        }
    }

    pub fn with_cheat_on_open(mut self, enabled: bool) -> Self {
        self.cheat_on_open = enabled;
        self
    }

    /// Overrides the market mode for one named data feed (the broker's
    /// `default_mode` otherwise applies to every feed).
    pub fn set_mode(&mut self, data: impl Into<String>, mode: MarketMode) {
        self.mode.insert(data.into(), mode);
    }

    pub fn set_cash(&mut self, cash: f64) {
        self.cash = cash;
    }

    pub fn set_commission(&mut self, commission: CommissionScheme) {
        self.commission = commission;
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, data: &str) -> Position {
        self.positions
            .get(data)
            .copied()
            .unwrap_or_else(|| Position::flat(self.multiplier_for(data)))
    }

    fn mode_for(&self, data: &str) -> MarketMode {
        self.mode.get(data).copied().unwrap_or(self.default_mode)
    }

    fn multiplier_for(&self, data: &str) -> f64 {
        match self.mode_for(data) {
            MarketMode::Stock => 1.0,
            MarketMode::Futures { multiplier, .. } => multiplier,
        }
    }

    /// Portfolio value: cash plus marked-to-market stock holdings plus
    /// futures unrealized PnL (§4.5). `mark_price` is supplied per data
    /// feed by the caller (defaults to last close per the spec).
    pub fn value(&self, mark_prices: &HashMap<String, f64>) -> f64 {
        let mut value = self.cash;
        for (data, position) in &self.positions {
            if position.is_flat() {
                continue;
            }
            let Some(&mark) = mark_prices.get(data) else { continue };
            value += match self.mode_for(data) {
                MarketMode::Stock => position.size * mark,
                MarketMode::Futures { .. } => position.unrealized_pnl(mark),
            };
        }
        value
    }

    /// Resolves an order size of `0.0` via the configured sizer: stock
    /// mode allocates as much of current cash as `price` allows, futures
    /// mode defaults to a single contract. A size request for the
    /// `sizer` is the spec's documented escape hatch (§4.5); callers
    /// that want a specific size just pass it directly.
    fn resolve_size(&self, data: &str, requested: f64, price: f64) -> f64 {
        if requested != 0.0 {
            return requested;
        }
        match self.mode_for(data) {
            MarketMode::Stock => (self.cash / price).floor(),
            MarketMode::Futures { .. } => 1.0,
        }
    }

    fn next_order_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    fn next_trade_id(&mut self) -> TradeId {
        let id = TradeId(self.next_trade_id);
        self.next_trade_id += 1;
        id
    }

    /// Submits a buy (positive size) order (§4.5 order admission).
    #[instrument(level = "debug", skip(self))]
    pub fn buy(
        &mut self,
        data: &str,
        size: f64,
        price_hint: f64,
        kind: OrderKind,
        submitted_idx: usize,
        created_datetime: f64,
        valid_until_idx: Option<usize>,
    ) -> Order {
        let resolved = self.resolve_size(data, size, price_hint).abs();
        self.submit(data, resolved, kind, submitted_idx, created_datetime, valid_until_idx)
    }

    /// Submits a sell (negative size) order.
    #[instrument(level = "debug", skip(self))]
    pub fn sell(
        &mut self,
        data: &str,
        size: f64,
        price_hint: f64,
        kind: OrderKind,
        submitted_idx: usize,
        created_datetime: f64,
        valid_until_idx: Option<usize>,
    ) -> Order {
        let resolved = self.resolve_size(data, size, price_hint).abs();
        self.submit(data, -resolved, kind, submitted_idx, created_datetime, valid_until_idx)
    }

    /// Queues an order that flattens the current position (§4.5).
    pub fn close(&mut self, data: &str, submitted_idx: usize, created_datetime: f64) -> Order {
        let size = -self.position(data).size;
        self.submit(data, size, OrderKind::Market, submitted_idx, created_datetime, None)
    }

    fn submit(
        &mut self,
        data: &str,
        size: f64,
        kind: OrderKind,
        submitted_idx: usize,
        created_datetime: f64,
        valid_until_idx: Option<usize>,
    ) -> Order {
        let id = self.next_order_id();
        let order = Order::new(id, data, size, kind, submitted_idx, created_datetime, valid_until_idx);
        self.open_orders.push(order.clone());
        order
    }

    /// Marks an order Canceled if it is still open (§4.5).
    pub fn cancel(&mut self, id: OrderId) -> EngineResult<()> {
        let Some(pos) = self.open_orders.iter().position(|o| o.id == id) else {
            return Err(BrokerError::UnknownOrder(id).into());
        };
        let mut order = self.open_orders.remove(pos);
        order.status = OrderStatus::Canceled;
        self.mailbox.push_back(Notification::Order(order.clone()));
        self.history.push(order);
        Ok(())
    }

    /// Drains accumulated notifications in emission order, for Cerebro
    /// to deliver to `strategy.notify_order`/`notify_trade` (§4.5, §5).
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.mailbox.drain(..).collect()
    }

    /// Pushes a `CashValue` notification carrying current cash and
    /// portfolio value against `mark_prices`, for Cerebro to emit once
    /// per bar after order matching (§4.5, §4.6, §4.7).
    pub fn notify_cashvalue(&mut self, mark_prices: &HashMap<String, f64>) {
        let value = self.value(mark_prices);
        self.mailbox.push_back(Notification::CashValue { cash: self.cash, value });
    }

    /// Runs the per-bar matching algorithm for one data feed's open
    /// orders against `bar` (§4.5). Called once per bar, after
    /// `strategy.next()` has had a chance to submit new orders.
    #[instrument(level = "debug", skip(self, bar))]
    pub fn match_bar(&mut self, data: &str, bar: Bar, bar_idx: usize) -> EngineResult<()> {
        let pending = std::mem::take(&mut self.open_orders);
        let (mine, mut others): (Vec<_>, Vec<_>) = pending.into_iter().partition(|o| o.data == data);

        for mut order in mine {
            if let Some(valid) = order.valid_until_idx {
                if bar_idx > valid {
                    order.status = OrderStatus::Expired;
                    self.mailbox.push_back(Notification::Order(order.clone()));
                    self.history.push(order);
                    continue;
                }
            }

            let eligible = match order.kind {
                OrderKind::Market if self.cheat_on_open => bar_idx >= order.submitted_idx,
                _ => bar_idx > order.submitted_idx,
            };
            if !eligible {
                others.push(order);
                continue;
            }

            let fill_price = match fill_price_for(&order, &bar) {
                Some(price) => price,
                None => {
                    others.push(order);
                    continue;
                }
            };

            self.execute_fill(&mut order, fill_price, bar.datetime, bar_idx)?;
            others.push(order);
        }

        self.open_orders = others;
        Ok(())
    }

    fn execute_fill(&mut self, order: &mut Order, fill_price: f64, datetime: f64, bar_idx: usize) -> EngineResult<()> {
        let mode = self.mode_for(&order.data);
        let required = match mode {
            MarketMode::Stock => order.size.abs() * fill_price,
            MarketMode::Futures { margin_per_contract, .. } => order.size.abs() * margin_per_contract,
        };
        if required > self.cash {
            warn!(data = %order.data, required, cash = self.cash, "order rejected: insufficient margin");
            order.status = OrderStatus::Margin;
            self.mailbox.push_back(Notification::Order(order.clone()));
            self.history.push(order.clone());
            return Ok(());
        }

        let commission = self.commission.commission(order.size, fill_price);

        let multiplier = self.multiplier_for(&order.data);
        let position = self
            .positions
            .entry(order.data.clone())
            .or_insert_with(|| Position::flat(multiplier));
        let before = *position;
        let realized = position.apply_fill(order.size, fill_price);
        let after = *position;

        match mode {
            MarketMode::Stock => {
                self.cash -= order.size * fill_price;
                self.cash -= commission;
            }
            MarketMode::Futures { .. } => {
                self.cash += realized;
                self.cash -= commission;
            }
        }

        self.record_trade(&order.data, before, after, realized, datetime);

        order.status = OrderStatus::Completed;
        order.executed_size = order.size;
        order.executed_price = fill_price;
        order.executed_value = order.size * fill_price;
        order.commission = commission;
        order.executed_datetime = Some(datetime);

        debug!(
            data = %order.data,
            bar_idx,
            size = order.size,
            fill_price,
            commission,
            cash = self.cash,
            "order filled"
        );

        self.mailbox.push_back(Notification::Order(order.clone()));
        self.history.push(order.clone());
        Ok(())
    }

    fn record_trade(&mut self, data: &str, before: Position, after: Position, realized: f64, datetime: f64) {
        if before.is_flat() && !after.is_flat() {
            let id = self.next_trade_id();
            let trade = Trade::open(id, data, after.size, after.price, datetime);
            self.open_trade.insert(data.to_string(), id);
            self.trades.push(trade.clone());
            self.mailbox.push_back(Notification::Trade(trade));
            return;
        }

        if after.is_flat() {
            if let Some(id) = self.open_trade.remove(data) {
                if let Some(trade) = self.trades.iter_mut().find(|t| t.id == id) {
                    trade.is_open = false;
                    trade.pnl_realized += realized;
                    trade.size = 0.0;
                    trade.close_datetime = Some(datetime);
                    self.mailbox.push_back(Notification::Trade(trade.clone()));
                }
            }
            return;
        }

        if !before.is_flat() && before.size.signum() != after.size.signum() {
            // Flipped through flat in one fill: close the old trade, open a new one.
            if let Some(id) = self.open_trade.remove(data) {
                if let Some(trade) = self.trades.iter_mut().find(|t| t.id == id) {
                    trade.is_open = false;
                    trade.pnl_realized += realized;
                    trade.close_datetime = Some(datetime);
                    self.mailbox.push_back(Notification::Trade(trade.clone()));
                }
            }
            let id = self.next_trade_id();
            let trade = Trade::open(id, data, after.size, after.price, datetime);
            self.open_trade.insert(data.to_string(), id);
            self.trades.push(trade.clone());
            self.mailbox.push_back(Notification::Trade(trade));
            return;
        }

        if let Some(id) = self.open_trade.get(data).copied() {
            if let Some(trade) = self.trades.iter_mut().find(|t| t.id == id) {
                trade.size = after.size;
                trade.price = after.price;
                trade.pnl_realized += realized;
                self.mailbox.push_back(Notification::Trade(trade.clone()));
            }
        }
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn history(&self) -> &[Order] {
        &self.history
    }

    pub fn open_orders(&self) -> &[Order] {
        &self.open_orders
    }
}

/// Determines whether `order` fills against `bar` and at what price,
/// implementing the per-type rules of §4.5 step 1a. Returns `None` when
/// an intrabar-conditional order (Limit/Stop/StopLimit) doesn't trigger.
fn fill_price_for(order: &Order, bar: &Bar) -> Option<f64> {
    match order.kind {
        OrderKind::Market => Some(bar.open),
        OrderKind::Close => Some(bar.close),
        OrderKind::Limit { price } => limit_fill(order.is_buy(), price, bar),
        OrderKind::Stop { price } => stop_fill(order.is_buy(), price, bar),
        OrderKind::StopLimit { stop, limit } => {
            stop_fill(order.is_buy(), stop, bar)?;
            limit_fill(order.is_buy(), limit, bar)
        }
    }
}

fn limit_fill(is_buy: bool, limit: f64, bar: &Bar) -> Option<f64> {
    if is_buy {
        (bar.low <= limit).then(|| limit.min(bar.low))
    } else {
        (bar.high >= limit).then(|| limit.max(bar.high))
    }
}

fn stop_fill(is_buy: bool, stop: f64, bar: &Bar) -> Option<f64> {
    if is_buy {
        (bar.high >= stop).then(|| stop.max(bar.open))
    } else {
        (bar.low <= stop).then(|| stop.min(bar.open))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar { datetime: 1.0, open: o, high: h, low: l, close: c, volume: 100.0, openinterest: 0.0 }
    }

    #[test]
    fn market_order_fills_next_bar_open_by_default() {
        let mut broker = SimulatedBroker::new(10_000.0, MarketMode::Stock, CommissionScheme::PerShare { rate: 0.0 });
        broker.buy("AAPL", 10.0, 100.0, OrderKind::Market, 0, 0.0, None);

        // Same-bar matching: not eligible yet (no cheat_on_open).
        broker.match_bar("AAPL", bar(100.0, 101.0, 99.0, 100.5), 0).unwrap();
        assert_eq!(broker.position("AAPL").size, 0.0);

        // Next bar: fills at this bar's open.
        broker.match_bar("AAPL", bar(105.0, 106.0, 104.0, 105.5), 1).unwrap();
        let pos = broker.position("AAPL");
        assert_eq!(pos.size, 10.0);
        assert_eq!(pos.price, 105.0);
        assert_eq!(broker.cash(), 10_000.0 - 10.0 * 105.0);
    }

    #[test]
    fn cheat_on_open_fills_market_orders_same_bar() {
        let mut broker = SimulatedBroker::new(10_000.0, MarketMode::Stock, CommissionScheme::PerShare { rate: 0.0 })
            .with_cheat_on_open(true);
        broker.buy("AAPL", 10.0, 100.0, OrderKind::Market, 0, 0.0, None);
        broker.match_bar("AAPL", bar(100.0, 101.0, 99.0, 100.5), 0).unwrap();
        assert_eq!(broker.position("AAPL").size, 10.0);
        assert_eq!(broker.position("AAPL").price, 100.0);
    }

    #[test]
    fn insufficient_cash_rejects_with_margin_status() {
        let mut broker = SimulatedBroker::new(50.0, MarketMode::Stock, CommissionScheme::PerShare { rate: 0.0 });
        broker.buy("AAPL", 10.0, 100.0, OrderKind::Market, 0, 0.0, None);
        broker.match_bar("AAPL", bar(100.0, 101.0, 99.0, 100.5), 1).unwrap();
        assert_eq!(broker.position("AAPL").size, 0.0);
        assert_eq!(broker.history()[0].status, OrderStatus::Margin);
    }

    #[test]
    fn limit_buy_fills_only_when_low_touches_limit() {
        let mut broker = SimulatedBroker::new(10_000.0, MarketMode::Stock, CommissionScheme::PerShare { rate: 0.0 });
        broker.buy("AAPL", 10.0, 100.0, OrderKind::Limit { price: 95.0 }, 0, 0.0, None);

        broker.match_bar("AAPL", bar(100.0, 102.0, 96.0, 99.0), 1).unwrap();
        assert_eq!(broker.position("AAPL").size, 0.0, "low never reached the limit");

        broker.match_bar("AAPL", bar(98.0, 99.0, 93.0, 94.0), 2).unwrap();
        assert_eq!(broker.position("AAPL").size, 10.0);
        assert_eq!(broker.position("AAPL").price, 93.0); // min(limit, low): the more favorable price
    }

    #[test]
    fn closing_a_position_realizes_pnl_and_notifies_trade_close() {
        let mut broker = SimulatedBroker::new(10_000.0, MarketMode::Stock, CommissionScheme::PerShare { rate: 0.0 });
        broker.buy("AAPL", 10.0, 100.0, OrderKind::Market, 0, 0.0, None);
        broker.match_bar("AAPL", bar(100.0, 101.0, 99.0, 100.5), 1).unwrap();
        broker.drain_notifications();

        broker.close("AAPL", 1, 2.0);
        broker.match_bar("AAPL", bar(110.0, 111.0, 109.0, 110.5), 2).unwrap();

        assert!(broker.position("AAPL").is_flat());
        let trade = broker.trades().last().unwrap();
        assert!(!trade.is_open);
        assert_eq!(trade.pnl_realized, 10.0 * (110.0 - 100.0));

        let notifications = broker.drain_notifications();
        assert!(notifications
            .iter()
            .any(|n| matches!(n, Notification::Trade(t) if !t.is_open)));
    }

    #[test]
    fn futures_mode_only_moves_cash_on_realized_pnl() {
        let mut broker = SimulatedBroker::new(
            10_000.0,
            MarketMode::Futures { margin_per_contract: 500.0, multiplier: 1.0 },
            CommissionScheme::PerOrder { fee: 0.0 },
        );
        broker.buy("ES", 1.0, 4_000.0, OrderKind::Market, 0, 0.0, None);
        broker.match_bar("ES", bar(4_000.0, 4_010.0, 3_990.0, 4_005.0), 1).unwrap();
        assert_eq!(broker.cash(), 10_000.0); // opening a futures position doesn't spend cash

        broker.close("ES", 1, 2.0);
        broker.match_bar("ES", bar(4_100.0, 4_110.0, 4_090.0, 4_105.0), 2).unwrap();
        assert_eq!(broker.cash(), 10_000.0 + (4_100.0 - 4_000.0));
    }

    #[test]
    fn futures_multiplier_scales_cash_movement() {
        let mut broker = SimulatedBroker::new(
            10_000.0,
            MarketMode::Futures { margin_per_contract: 1_000.0, multiplier: 10.0 },
            CommissionScheme::PerContract { fee_per_contract: 2.0 },
        );
        broker.buy("ES", 1.0, 4_000.0, OrderKind::Market, 0, 0.0, None);
        broker.match_bar("ES", bar(4_000.0, 4_010.0, 3_990.0, 4_005.0), 1).unwrap();
        assert_eq!(broker.cash(), 10_000.0 - 2.0);

        broker.close("ES", 1, 2.0);
        broker.match_bar("ES", bar(4_010.0, 4_020.0, 4_000.0, 4_015.0), 2).unwrap();
        assert_eq!(broker.cash(), 10_000.0 - 2.0 + 10.0 * 10.0 - 2.0);
    }
}
