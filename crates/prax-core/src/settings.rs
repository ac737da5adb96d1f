//! Analysis settings
//!
//! One value carries every knob of an analysis run. Construction follows
//! the builder style; `validate` is called by the analysis driver before
//! any work starts.

use prax_mef::{Diagnostic, ErrorKind};
use serde::{Deserialize, Serialize};

/// Approximation used by the probability engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Approximation {
    /// Sum of product probabilities; accurate when the total mass is small.
    #[default]
    RareEvent,
    /// Min-cut upper bound: `1 - prod(1 - p_i)`.
    Mcub,
    /// Inclusion-exclusion series truncated at `num_sums` terms.
    Series,
}

/// Which analyses run after cut-set generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisMode {
    /// Analytic probability from expression means.
    #[default]
    Default,
    /// Monte-Carlo uncertainty over sampled expressions.
    MonteCarlo,
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// System mission time in hours.
    pub mission_time: f64,
    /// Maximum order of reported products.
    pub limit_order: usize,
    /// Truncation depth of the inclusion-exclusion series.
    pub num_sums: usize,
    /// Probability cutoff for product pruning; 0 disables pruning.
    pub cut_off: f64,
    /// Number of Monte-Carlo trials.
    pub trials: usize,
    /// Histogram bin count for uncertainty reports.
    pub bins: usize,
    /// Seed for the pseudo-random source.
    pub seed: u64,
    /// Dispatch Monte-Carlo trials to parallel worker contexts.
    pub parallel: bool,
    pub approximation: Approximation,
    pub mode: AnalysisMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mission_time: 8760.0,
            limit_order: 20,
            num_sums: 7,
            cut_off: 0.0,
            trials: 1000,
            bins: 20,
            seed: 0,
            parallel: false,
            approximation: Approximation::RareEvent,
            mode: AnalysisMode::Default,
        }
    }
}

impl Settings {
    pub fn with_mission_time(mut self, hours: f64) -> Self {
        self.mission_time = hours;
        self
    }

    pub fn with_limit_order(mut self, limit: usize) -> Self {
        self.limit_order = limit;
        self
    }

    pub fn with_num_sums(mut self, num_sums: usize) -> Self {
        self.num_sums = num_sums;
        self
    }

    pub fn with_cut_off(mut self, cut_off: f64) -> Self {
        self.cut_off = cut_off;
        self
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_approximation(mut self, approximation: Approximation) -> Self {
        self.approximation = approximation;
        self
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Range checks, run before analysis starts.
    pub fn validate(&self) -> Result<(), Diagnostic> {
        let invalid = |message: &str| Err(Diagnostic::new(ErrorKind::InvalidFormat, message));
        if !self.mission_time.is_finite() || self.mission_time < 0.0 {
            return invalid("mission time must be a non-negative number of hours");
        }
        if self.limit_order < 1 {
            return invalid("limit order must be at least 1");
        }
        if self.num_sums < 1 {
            return invalid("the number of series sums must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.cut_off) {
            return invalid("the cutoff probability must be within [0, 1]");
        }
        if self.trials < 1 {
            return invalid("the number of trials must be at least 1");
        }
        if self.bins < 1 {
            return invalid("the histogram bin count must be at least 1");
        }
        Ok(())
    }
}
