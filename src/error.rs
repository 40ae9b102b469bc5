use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error for the engine. Fans out to one enum per subsystem so
/// call sites can match narrowly while callers that only care about
/// "did the run fail" can use `?` against this type end to end.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Line(#[from] LineError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from the `LineBuffer`/`Lines` primitive (C1/C2).
#[derive(Debug, Error)]
pub enum LineError {
    #[error("unknown line alias: '{0}'")]
    UnknownAlias(String),

    #[error("line index {index} out of range (have {len} lines)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors raised before/while a `DataSeries` delivers bars (C3). The
/// engine does not re-validate bar shape or ordering (§4.2) — those are
/// a feed implementation's responsibility, not this layer's.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("external feed I/O failure for '{0}': {1}")]
    Io(String, String),
}

/// Errors from indicator graph construction and evaluation (C4).
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("cyclic dependency detected while topologically ordering indicators")]
    CyclicDependency,

    #[error("indicator '{name}' minperiod ({declared}) is less than its max child minperiod ({child})")]
    MinperiodBelowChildren {
        name: String,
        declared: usize,
        child: usize,
    },

    #[error("indicator '{0}' called once(start,end) with an invalid range")]
    InvalidOnceRange(String),
}

/// Errors from the `Resampler`/`Replayer` aggregators (C5).
#[derive(Debug, Error)]
pub enum ResampleError {
    #[error(
        "data ordering violation: source bar dated {bar} is strictly before last accepted {last}"
    )]
    DataOrdering { bar: String, last: String },
}

/// Errors from the simulated broker (C6/C7). Terminal order states
/// (Margin/Rejected/Expired) are NOT modeled as errors here — only
/// programmer-error conditions that should abort a run.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker invariant violated: {0}")]
    InvariantViolation(String),

    #[error("order {0:?} referenced an unknown data feed")]
    UnknownData(crate::broker::order::OrderId),

    #[error("attempted to cancel unknown order {0:?}")]
    UnknownOrder(crate::broker::order::OrderId),
}

/// Errors surfaced by a user `Strategy` implementation.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("strategy '{0}' raised: {1}")]
    UserHook(String, String),
}

/// Errors surfaced by an `Analyzer` implementation.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer '{0}' raised: {1}")]
    UserHook(String, String),
}

/// Errors from the `Writer` component (C11).
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("writer I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("writer was asked to emit a row before a header was written")]
    NoHeader,
}

/// Configuration errors, raised before `Cerebro::run` starts and always
/// recoverable by the caller (never corrupt partial state).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cerebro has no data feeds attached; at least one is required")]
    NoDataFeeds,

    #[error("Cerebro has no strategy factories registered")]
    NoStrategies,

    #[error("data feed '{0}' declares an incompatible timeframe/compression pairing")]
    IncompatibleTimeframe(String),

    #[error("two attached data feeds share the name '{0}', which the broker uses as a lookup key")]
    DuplicateDataFeedName(String),

    #[error("failed to build a rayon thread pool for optimize(): {0}")]
    ThreadPoolInit(String),
}
