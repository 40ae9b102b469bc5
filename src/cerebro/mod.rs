//! The engine (C10): validates configuration, instantiates strategies and
//! analyzers from factories, drives data feeds and indicators through a
//! single bar loop in either the vectorized or streaming dispatch order,
//! and always runs every component's `stop()` hook before returning
//! (§4.8, §5).

pub mod config;
pub mod optimize;

pub use config::CerebroConfig;
pub use optimize::{optimize, OptReturn};

use std::collections::{HashMap, HashSet};

use tracing::{instrument, warn};

use crate::{
    analyzer::Analyzer,
    broker::{Notification, SimulatedBroker},
    data::{DataSeries, OhlcvLine},
    error::{ConfigError, EngineResult},
    indicator::{lifecycle_stage, LifecycleStage},
    strategy::{Strategy, StrategyContext},
    writer::{CsvWriter, Writer},
};

/// The final state of one completed run: every instantiated strategy
/// (carrying whatever state it accumulated — positions are read from the
/// shared broker, not the strategy itself) and every instantiated
/// analyzer, ready for `get_analysis()` (§4.8 step 7).
#[derive(Debug)]
pub struct RunResult {
    pub strategies: Vec<Box<dyn Strategy>>,
    pub analyzers: Vec<Box<dyn Analyzer>>,
}

/// Builds and runs a single backtest (§4.8). Data feeds, strategy
/// factories, and analyzer factories are registered before `run()`
/// consumes `self`; a fresh `Cerebro` (or [`optimize::optimize`]) is used
/// per parameter tuple rather than re-running one instance, matching the
/// "each run fully isolated" rule of §5.
pub struct Cerebro {
    config: CerebroConfig,
    datas: Vec<DataSeries>,
    broker: SimulatedBroker,
    strategy_factories: Vec<Box<dyn Fn() -> Box<dyn Strategy>>>,
    analyzer_factories: Vec<Box<dyn Fn() -> Box<dyn Analyzer>>>,
}

impl std::fmt::Debug for Cerebro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cerebro")
            .field("config", &self.config)
            .field("datas", &self.datas)
            .field("broker", &self.broker)
            .field("strategy_factories", &self.strategy_factories.len())
            .field("analyzer_factories", &self.analyzer_factories.len())
            .finish()
    }
}

impl Cerebro {
    pub fn new(broker: SimulatedBroker, config: CerebroConfig) -> Self {
        Self {
            config,
            datas: Vec::new(),
            broker,
            strategy_factories: Vec::new(),
            analyzer_factories: Vec::new(),
        }
    }

    pub fn config(&self) -> &CerebroConfig {
        &self.config
    }

    pub fn add_data(&mut self, data: DataSeries) -> &mut Self {
        self.datas.push(data);
        self
    }

    pub fn add_strategy(&mut self, factory: impl Fn() -> Box<dyn Strategy> + 'static) -> &mut Self {
        self.strategy_factories.push(Box::new(factory));
        self
    }

    pub fn add_analyzer(&mut self, factory: impl Fn() -> Box<dyn Analyzer> + 'static) -> &mut Self {
        self.analyzer_factories.push(Box::new(factory));
        self
    }

    fn validate(&self) -> EngineResult<()> {
        if self.datas.is_empty() {
            return Err(ConfigError::NoDataFeeds.into());
        }
        if self.strategy_factories.is_empty() {
            return Err(ConfigError::NoStrategies.into());
        }
        let mut seen = HashSet::new();
        for data in &self.datas {
            if !seen.insert(data.name().to_string()) {
                return Err(ConfigError::DuplicateDataFeedName(data.name().to_string()).into());
            }
            // `TimeFrameSpec`'s fields are public, so a feed can be built
            // with a struct literal that bypasses `TimeFrameSpec::new`'s
            // assertion; a zero compression would divide-by-zero the
            // resample bucket math (§4.3), so it's caught here instead.
            if data.timeframe().compression == 0 {
                return Err(ConfigError::IncompatibleTimeframe(data.name().to_string()).into());
            }
        }
        Ok(())
    }

    /// Runs the single-backtest algorithm of §4.8 steps 1–7.
    ///
    /// `stop()` is invoked on every strategy, analyzer, writer, and data
    /// feed regardless of whether the bar loop finished normally or
    /// returned early via `?` (§5 scoped acquisition): the fallible setup
    /// and bar-loop phase runs first and its result is held, then cleanup
    /// always runs, and only then is the original error (if any)
    /// propagated — the cleanup result is also surfaced if it itself
    /// fails, so an `ExternalIOError` closing a writer is never silently
    /// swallowed.
    #[instrument(level = "debug", skip(self))]
    pub fn run(self) -> EngineResult<RunResult> {
        self.validate()?;

        let Cerebro { config, mut datas, mut broker, strategy_factories, analyzer_factories } = self;

        let any_live = datas.iter().any(|d| d.islive());
        let runonce = config.effective_runonce(any_live);
        // A vectorized pass over indicator `once(start, end)` requires
        // every line already filled, so `runonce` always implies preload
        // even if the `preload` flag alone would not have.
        let preloaded = config.effective_preload(any_live) || runonce;

        let mut strategies: Vec<Box<dyn Strategy>> =
            strategy_factories.iter().map(|factory| factory()).collect();
        let mut analyzers: Vec<Box<dyn Analyzer>> =
            analyzer_factories.iter().map(|factory| factory()).collect();
        let mut writer: Option<Box<dyn Writer>> = match &config.writer_csv {
            Some(path) => Some(Box::new(CsvWriter::to_file(path)?)),
            None => None,
        };

        let mut last_bar_idx = 0usize;
        let mut last_datetime = 0.0f64;

        let run_result: EngineResult<()> = (|| {
            for data in datas.iter_mut() {
                data.start()?;
            }

            let mut init_ctx = StrategyContext::new(&mut broker, &datas, 0, 0.0);
            for strategy in strategies.iter_mut() {
                strategy.init(&mut init_ctx)?;
            }
            for strategy in strategies.iter_mut() {
                strategy.start(&mut init_ctx)?;
            }
            drop(init_ctx);

            if preloaded {
                for data in datas.iter_mut() {
                    data.preload()?;
                }
            }

            for strategy in strategies.iter_mut() {
                strategy.indicator_graph_mut().propagate_minperiods()?;
                let minperiod = strategy.indicator_graph().max_minperiod();
                strategy.set_minperiod(minperiod);
            }

            let analyzer_start_ctx = StrategyContext::new(&mut broker, &datas, 0, 0.0);
            for analyzer in analyzers.iter_mut() {
                analyzer.start(&analyzer_start_ctx);
            }
            drop(analyzer_start_ctx);

            if let Some(w) = writer.as_deref_mut() {
                let columns = writer_columns(&datas, &strategies);
                w.start(&columns)?;
            }

            run_bars(
                &mut datas,
                &mut broker,
                &mut strategies,
                &mut analyzers,
                writer.as_deref_mut(),
                preloaded,
                runonce,
                &mut last_bar_idx,
                &mut last_datetime,
            )
        })();

        let cleanup_result: EngineResult<()> = (|| {
            let mut ctx = StrategyContext::new(&mut broker, &datas, last_bar_idx, last_datetime);
            for strategy in strategies.iter_mut() {
                strategy.stop(&mut ctx)?;
            }
            for analyzer in analyzers.iter_mut() {
                analyzer.stop(&ctx);
            }
            if let Some(w) = writer.as_deref_mut() {
                w.stop()?;
            }
            Ok(())
        })();

        for data in datas.iter_mut() {
            if let Err(err) = data.stop() {
                warn!(%err, feed = data.name(), "feed stop() failed during cleanup");
            }
        }

        run_result?;
        cleanup_result?;

        Ok(RunResult { strategies, analyzers })
    }
}

/// Drives the bar loop itself, in either dispatch style (§4.8 step 6):
///
/// - `preloaded`: cursors advance with `forward(1)` over buffers already
///   filled by `preload()`, rather than pulling from the feed again.
/// - `runonce`: indicators are computed once up front via `once(0, N)` in
///   topological order; otherwise every indicator takes its
///   `prenext`/`nextstart`/`next` step each bar, same as the strategies.
#[allow(clippy::too_many_arguments)]
fn run_bars(
    datas: &mut [DataSeries],
    broker: &mut SimulatedBroker,
    strategies: &mut [Box<dyn Strategy>],
    analyzers: &mut [Box<dyn Analyzer>],
    mut writer: Option<&mut dyn Writer>,
    preloaded: bool,
    runonce: bool,
    last_bar_idx: &mut usize,
    last_datetime: &mut f64,
) -> EngineResult<()> {
    let total_bars = if preloaded {
        datas
            .iter()
            .map(|d| d.line(OhlcvLine::Datetime).borrow().size())
            .min()
            .unwrap_or(0)
    } else {
        usize::MAX
    };

    if runonce {
        for strategy in strategies.iter_mut() {
            let graph = strategy.indicator_graph_mut();
            if graph.is_empty() {
                continue;
            }
            let order = graph.topological_order()?;
            for id in order {
                graph.get_mut(id).once(0, total_bars);
            }
            // `once()` fills each output by repeated `append`, which
            // leaves every buffer's cursor parked at its last index
            // (same convention `next()` uses). Homing it to 0 here lets
            // the per-bar forward loop below track `bar_idx` exactly the
            // way the preloaded data lines already do.
            for node in graph.nodes() {
                for handle in node.outputs().iter() {
                    handle.borrow_mut().home();
                }
            }
        }
    }

    let mut bar_idx = 0usize;
    loop {
        if preloaded {
            if bar_idx >= total_bars {
                break;
            }
            if bar_idx > 0 {
                for data in datas.iter() {
                    for handle in data.lines().iter() {
                        handle.borrow_mut().forward(1);
                    }
                }
                if runonce {
                    for strategy in strategies.iter() {
                        for node in strategy.indicator_graph().nodes() {
                            for handle in node.outputs().iter() {
                                handle.borrow_mut().forward(1);
                            }
                        }
                    }
                }
            }
        } else {
            let mut any_advanced = false;
            for data in datas.iter_mut() {
                if data.next()? {
                    any_advanced = true;
                }
            }
            if !any_advanced {
                break;
            }
        }

        let datetime = datas[0].current_bar().datetime;
        *last_bar_idx = bar_idx;
        *last_datetime = datetime;

        if !runonce {
            for strategy in strategies.iter_mut() {
                let graph = strategy.indicator_graph_mut();
                if graph.is_empty() {
                    continue;
                }
                let order = graph.topological_order()?;
                for id in order {
                    let minperiod = graph.get(id).minperiod();
                    match lifecycle_stage(bar_idx, minperiod) {
                        LifecycleStage::PreNext => graph.get_mut(id).prenext(bar_idx),
                        LifecycleStage::NextStart => graph.get_mut(id).nextstart(bar_idx),
                        LifecycleStage::Next => graph.get_mut(id).next(bar_idx),
                    }
                }
            }
        }

        for strategy in strategies.iter_mut() {
            let minperiod = strategy.minperiod();
            let mut ctx = StrategyContext::new(broker, datas, bar_idx, datetime);
            match lifecycle_stage(bar_idx, minperiod) {
                LifecycleStage::PreNext => strategy.prenext(&mut ctx)?,
                LifecycleStage::NextStart => strategy.nextstart(&mut ctx)?,
                LifecycleStage::Next => strategy.next(&mut ctx)?,
            }
        }

        let mut mark_prices = HashMap::with_capacity(datas.len());
        for data in datas.iter() {
            let bar = data.current_bar();
            mark_prices.insert(data.name().to_string(), bar.close);
            broker.match_bar(data.name(), bar, bar_idx)?;
        }
        broker.notify_cashvalue(&mark_prices);

        let notifications = broker.drain_notifications();
        for notification in &notifications {
            for strategy in strategies.iter_mut() {
                dispatch_strategy_notification(strategy.as_mut(), notification);
            }
        }

        // Analyzers observe every bar regardless of strategy/indicator
        // warm-up gating — there is no equivalent of `prenext` for them.
        for analyzer in analyzers.iter_mut() {
            let ctx = StrategyContext::new(broker, datas, bar_idx, datetime);
            analyzer.next(&ctx);
            for notification in &notifications {
                dispatch_analyzer_notification(analyzer.as_mut(), notification);
            }
        }

        if let Some(w) = writer.as_deref_mut() {
            let values = row_values(datas, strategies);
            w.next(&values)?;
        }

        bar_idx += 1;
    }

    Ok(())
}

fn dispatch_strategy_notification(strategy: &mut dyn Strategy, notification: &Notification) {
    match notification {
        Notification::Order(order) => strategy.notify_order(order),
        Notification::Trade(trade) => strategy.notify_trade(trade),
        Notification::CashValue { cash, value } => strategy.notify_cashvalue(*cash, *value),
    }
}

fn dispatch_analyzer_notification(analyzer: &mut dyn Analyzer, notification: &Notification) {
    match notification {
        Notification::Order(order) => analyzer.notify_order(order),
        Notification::Trade(trade) => analyzer.notify_trade(trade),
        Notification::CashValue { cash, value } => analyzer.notify_cashvalue(*cash, *value),
    }
}

/// Column header derivation for the writer (§4.9): every attached data
/// feed's seven OHLCV columns, then every attached strategy's indicator
/// output lines, each prefixed to stay unique across strategies.
fn writer_columns(datas: &[DataSeries], strategies: &[Box<dyn Strategy>]) -> Vec<String> {
    let mut columns = Vec::new();
    for data in datas {
        for line in OhlcvLine::ALL {
            columns.push(format!("{}.{}", data.name(), line.alias()));
        }
    }
    for (strategy_idx, strategy) in strategies.iter().enumerate() {
        for (indicator_idx, node) in strategy.indicator_graph().nodes().enumerate() {
            let outputs = node.outputs();
            for line_idx in 0..outputs.len() {
                let alias = outputs.alias_of(line_idx).unwrap_or("line");
                columns.push(format!("strategy{strategy_idx}.indicator{indicator_idx}.{alias}"));
            }
        }
    }
    columns
}

fn row_values(datas: &[DataSeries], strategies: &[Box<dyn Strategy>]) -> Vec<f64> {
    let mut values = Vec::new();
    for data in datas {
        for line in OhlcvLine::ALL {
            values.push(data.line(line).borrow().get(0));
        }
    }
    for strategy in strategies {
        for node in strategy.indicator_graph().nodes() {
            for handle in node.outputs().iter() {
                values.push(handle.borrow().get(0));
            }
        }
    }
    values
}
