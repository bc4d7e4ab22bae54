//! Configuration search: strategies, surrogate model and the tuner state machine.

pub mod acquisition;
pub mod auto_tuner;
pub mod bayesian_search;
pub mod feature_vector;
pub mod full_search;
pub mod gaussian_process;
pub mod random_search;
pub mod record;
pub mod search_space;

pub use acquisition::AcquisitionFunction;
pub use auto_tuner::{AutoTuner, SelectorStrategy, TunerParams, TunerState};
pub use bayesian_search::BayesianSearch;
pub use feature_vector::FeatureVector;
pub use full_search::FullSearch;
pub use gaussian_process::GaussianProcess;
pub use random_search::RandomSearch;
pub use record::TuningRecord;
pub use search_space::{NumberSet, SearchSpace};

use crate::configuration::Configuration;
use crate::error::TuningError;
use crate::options::Newton3Option;
use std::collections::BTreeSet;

/// One way of walking the search space.
///
/// The caller loops `while strategy.tune() { measure; add_evidence }`. Once
/// `tune` returns `false` the current configuration is the best one seen.
pub trait TuningStrategy: Send {
    fn current_configuration(&self) -> Configuration;

    /// Time measured for the current configuration.
    fn add_evidence(&mut self, time: f64) -> Result<(), TuningError>;

    /// Moves to the next candidate. Returns `false` when tuning is over.
    fn tune(&mut self) -> bool;

    /// Forgets all evidence and starts a new tuning phase.
    fn reset(&mut self);

    fn remove_newton3_option(&mut self, option: Newton3Option);

    fn search_space_is_empty(&self) -> bool;

    /// Configurations measured in the current phase, with their times.
    fn evidence(&self) -> &[(Configuration, f64)];
}

/// Configuration used when nothing else is left, honouring the remaining
/// newton3 modes.
pub fn fallback_configuration(newton3: &BTreeSet<Newton3Option>) -> Configuration {
    let mut c = Configuration::fallback();
    if !newton3.is_empty() && !newton3.contains(&Newton3Option::Disabled) {
        c.newton3 = Newton3Option::Enabled;
    }
    c
}

/// Fastest entry of `evidence`; ties go to the earliest.
pub(crate) fn best_of(evidence: &[(Configuration, f64)]) -> Option<&Configuration> {
    evidence
        .iter()
        .fold(None::<&(Configuration, f64)>, |best, e| match best {
            Some(b) if b.1 <= e.1 => Some(b),
            _ => Some(e),
        })
        .map(|(c, _)| c)
}

/// Picks the global optimum from per-rank results, indexed by rank. Ties go
/// to the lowest rank.
pub fn optimize_configuration(per_rank: &[(Configuration, f64)]) -> Option<Configuration> {
    best_of(per_rank).cloned()
}
