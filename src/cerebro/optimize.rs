//! Parameter-grid fan-out (§5 "Concurrency — optimization"): runs one
//! independent [`Cerebro`] instance per parameter tuple across a rayon
//! thread pool, grounded in the grid-search pattern the news-breakout
//! agent builds (`args.into_par_iter().map(|arg| build_agent(arg))`),
//! generalized here to this engine's [`Cerebro::run`].

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
    cerebro::{Cerebro, RunResult},
    error::{ConfigError, EngineResult},
};

/// One parameter tuple's outcome. Deliberately generic over `R` rather
/// than carrying a [`RunResult`] directly: `Strategy`/`Analyzer` are
/// object-safe but not `Send` (§5 Design Notes — kept that way so Cerebro
/// can hold heterogeneous `Box<dyn Strategy>` collections), so they can
/// never cross the fan-out themselves. `summarize` extracts whatever
/// `Send`-safe report the caller needs (an analyzer's `get_analysis()`
/// map, a final portfolio value, …) before the run's trait objects are
/// dropped back on their own worker thread.
#[derive(Debug, Clone)]
pub struct OptReturn<P, R> {
    pub params: P,
    pub result: R,
}

/// Builds and runs one `Cerebro` per element of `params`, fully isolated
/// from every other run (§5: "each optimization run shares no broker or
/// strategy state").
///
/// `maxcpus == 0` uses rayon's own default pool sizing (every core);
/// `maxcpus == 1` runs sequentially and never spins up a pool at all,
/// matching [`super::config::CerebroConfig`]'s `maxcpus` convention.
pub fn optimize<P, R>(
    params: Vec<P>,
    maxcpus: usize,
    build: impl Fn(&P) -> EngineResult<Cerebro> + Sync,
    summarize: impl Fn(&P, EngineResult<RunResult>) -> R + Sync,
) -> EngineResult<Vec<OptReturn<P, R>>>
where
    P: Send,
    R: Send,
{
    let run_one = |p: P| {
        let outcome = build(&p).and_then(Cerebro::run);
        let result = summarize(&p, outcome);
        OptReturn { params: p, result }
    };

    if maxcpus == 1 {
        return Ok(params.into_iter().map(run_one).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(maxcpus)
        .build()
        .map_err(|err| ConfigError::ThreadPoolInit(err.to_string()))?;

    Ok(pool.install(|| params.into_par_iter().map(run_one).collect()))
}
