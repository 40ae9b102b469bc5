use tracing::debug;

use crate::{
    error::{EngineResult, IndicatorError},
    indicator::Indicator,
};

/// Stable handle into an [`IndicatorGraph`], returned by
/// [`IndicatorGraph::register`] so later registrations can declare it as a
/// dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndicatorId(usize);

/// The attached-indicator dependency graph (§4.4). Indicators are
/// registered in construction order together with the ids of whatever
/// they read from (other indicators only — reading directly from a
/// [`crate::data::DataSeries`] carries no minperiod cost, since a data
/// feed's first bar is always defined).
///
/// Owns every registered indicator and is the only place minperiod
/// propagation happens: a single topological pass computes each
/// indicator's effective minperiod from its dependencies before the run
/// starts, the way the reference implementation resolves `_minperiod`
/// once every indicator in a `Strategy.__init__` has been constructed.
#[derive(Debug, Default)]
pub struct IndicatorGraph {
    nodes: Vec<Box<dyn Indicator>>,
    deps: Vec<Vec<IndicatorId>>,
}

impl IndicatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an indicator with the ids of the other indicators in
    /// this graph it reads from. Dependencies on a bare data feed don't
    /// need to be declared here — they contribute a minperiod of `1`,
    /// which `propagate_minperiod`'s `unwrap_or(1)` already assumes.
    pub fn register(&mut self, indicator: Box<dyn Indicator>, deps: Vec<IndicatorId>) -> IndicatorId {
        let id = IndicatorId(self.nodes.len());
        self.nodes.push(indicator);
        self.deps.push(deps);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: IndicatorId) -> &dyn Indicator {
        self.nodes[id.0].as_ref()
    }

    pub fn get_mut(&mut self, id: IndicatorId) -> &mut dyn Indicator {
        self.nodes[id.0].as_mut()
    }

    /// Every registered indicator, in registration order — used by the
    /// writer to derive column headers from indicator output aliases.
    pub fn nodes(&self) -> impl Iterator<Item = &dyn Indicator> {
        self.nodes.iter().map(|n| n.as_ref())
    }

    /// Kahn's algorithm over the registration-order dependency edges.
    /// Returns indicators in an order where every dependency precedes
    /// its dependents, or [`IndicatorError::CyclicDependency`] if the
    /// graph isn't a DAG.
    pub fn topological_order(&self) -> EngineResult<Vec<IndicatorId>> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        for (i, deps) in self.deps.iter().enumerate() {
            indegree[i] = deps.len();
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in self.deps.iter().enumerate() {
            for dep in deps {
                dependents[dep.0].push(i);
            }
        }

        let mut queue: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop() {
            order.push(IndicatorId(i));
            for &dependent in &dependents[i] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if order.len() != n {
            return Err(IndicatorError::CyclicDependency.into());
        }
        Ok(order)
    }

    /// Computes and stores the effective minperiod of every indicator in
    /// the graph, in dependency order (§4.4). Must be called once, after
    /// every indicator an attached strategy will use has been
    /// registered, and before the run starts.
    pub fn propagate_minperiods(&mut self) -> EngineResult<()> {
        let order = self.topological_order()?;
        for id in order {
            let child_minperiods: Vec<usize> = self.deps[id.0]
                .iter()
                .map(|dep| self.nodes[dep.0].minperiod())
                .collect();
            let window = self.nodes[id.0].window();
            let effective = super::propagate_minperiod(&child_minperiods, window);
            debug!(indicator = id.0, minperiod = effective, "propagated minperiod");
            self.nodes[id.0].set_minperiod(effective);
        }
        Ok(())
    }

    /// The maximum minperiod across every registered indicator — the
    /// earliest absolute bar index at which every attached indicator's
    /// output (and therefore a strategy gated on all of them) is defined.
    pub fn max_minperiod(&self) -> usize {
        self.nodes.iter().map(|n| n.minperiod()).max().unwrap_or(1)
    }
}
