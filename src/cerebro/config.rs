use std::path::PathBuf;

/// Memory-vs-history trade-off for line storage (§6 `exactbars`).
/// `-1` preserves backward compatibility with code that indexes raw
/// bar offsets; `0`/`1` are documented as future optimizations — this
/// crate always keeps full history today (matching `Keep` below) and
/// reports which variant was requested for diagnostic purposes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExactBars {
    #[default]
    Keep,
    KeepOnlyIndicatorWindow,
    KeepNothing,
}

impl From<i8> for ExactBars {
    fn from(value: i8) -> Self {
        match value {
            v if v < 0 => ExactBars::Keep,
            0 => ExactBars::KeepOnlyIndicatorWindow,
            _ => ExactBars::KeepNothing,
        }
    }
}

/// Flat option set a [`super::Cerebro`] run carries (§6 "Configuration"),
/// built with `with_*` methods the way the teacher's `Environment` is
/// configured (`with_execution_bias`, `with_risk_metrics_cfg`), rather
/// than a stringly-typed options map.
#[derive(Debug, Clone)]
pub struct CerebroConfig {
    pub(crate) preload: bool,
    pub(crate) runonce: bool,
    pub(crate) live: bool,
    pub(crate) maxcpus: usize,
    pub(crate) stdstats: bool,
    pub(crate) exactbars: ExactBars,
    pub(crate) cheat_on_open: bool,
    pub(crate) writer_csv: Option<PathBuf>,
}

impl Default for CerebroConfig {
    fn default() -> Self {
        Self {
            preload: true,
            runonce: true,
            live: false,
            maxcpus: 0,
            stdstats: true,
            exactbars: ExactBars::Keep,
            cheat_on_open: false,
            writer_csv: None,
        }
    }
}

impl CerebroConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_runonce(mut self, runonce: bool) -> Self {
        self.runonce = runonce;
        self
    }

    /// Forcing `live` disables preload and the vectorized path
    /// regardless of `preload`/`runonce` (§6).
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn with_maxcpus(mut self, maxcpus: usize) -> Self {
        self.maxcpus = maxcpus;
        self
    }

    pub fn with_stdstats(mut self, stdstats: bool) -> Self {
        self.stdstats = stdstats;
        self
    }

    pub fn with_exactbars(mut self, exactbars: impl Into<ExactBars>) -> Self {
        self.exactbars = exactbars.into();
        self
    }

    pub fn with_cheat_on_open(mut self, cheat_on_open: bool) -> Self {
        self.cheat_on_open = cheat_on_open;
        self
    }

    pub fn with_writer_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.writer_csv = Some(path.into());
        self
    }

    /// Whether this run should actually preload feeds and take the
    /// vectorized path, once `live` is folded in (§6: "live forces
    /// streaming, disable preload").
    pub fn effective_preload(&self, any_feed_live: bool) -> bool {
        self.preload && !self.live && !any_feed_live
    }

    pub fn effective_runonce(&self, any_feed_live: bool) -> bool {
        self.runonce && !self.live && !any_feed_live
    }
}
