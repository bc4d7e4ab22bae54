use super::TuningStrategy;
use crate::configuration::Configuration;
use crate::error::TuningError;
use crate::options::Newton3Option;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

/// Reduces the samples of one configuration to a single evidence value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorStrategy {
    #[default]
    FastestAbs,
    FastestMean,
    FastestMedian,
}

impl SelectorStrategy {
    pub fn reduce(self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        Some(match self {
            SelectorStrategy::FastestAbs => samples.iter().copied().fold(f64::INFINITY, f64::min),
            SelectorStrategy::FastestMean => samples.iter().sum::<f64>() / samples.len() as f64,
            SelectorStrategy::FastestMedian => {
                let mut sorted = samples.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    0.5 * (sorted[mid - 1] + sorted[mid])
                } else {
                    sorted[mid]
                }
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunerState {
    Exploring,
    Converged,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TunerParams {
    /// Traversals measured per configuration.
    pub num_samples: usize,
    pub selector: SelectorStrategy,
    /// Iterations spent on the converged configuration before retuning.
    pub tuning_interval: usize,
}

impl Default for TunerParams {
    fn default() -> Self {
        Self {
            num_samples: 3,
            selector: SelectorStrategy::FastestAbs,
            tuning_interval: 100,
        }
    }
}

/// Drives a strategy through alternating tuning phases and converged stretches.
pub struct AutoTuner {
    strategy: Box<dyn TuningStrategy>,
    params: TunerParams,
    state: TunerState,
    current: Configuration,
    samples: Vec<f64>,
    iterations_since_tuning: usize,
    /// Evidence of every phase, in order.
    history: Vec<(Configuration, f64)>,
}

impl AutoTuner {
    pub fn new(strategy: Box<dyn TuningStrategy>, params: TunerParams) -> Result<Self, TuningError> {
        if params.num_samples == 0 {
            return Err(TuningError::InvalidParameter("num_samples must be at least 1".into()));
        }
        if params.tuning_interval == 0 {
            return Err(TuningError::InvalidParameter("tuning_interval must be at least 1".into()));
        }
        let current = strategy.current_configuration();
        let mut tuner = Self {
            strategy,
            params,
            state: TunerState::Exploring,
            current,
            samples: Vec::new(),
            iterations_since_tuning: 0,
            history: Vec::new(),
        };
        tuner.start_phase();
        Ok(tuner)
    }

    fn start_phase(&mut self) {
        let _span = info_span!("AutoTuner::start_phase").entered();
        self.strategy.reset();
        self.samples.clear();
        self.iterations_since_tuning = 0;
        if self.strategy.tune() {
            self.state = TunerState::Exploring;
        } else {
            self.converge();
        }
        self.current = self.strategy.current_configuration();
    }

    fn converge(&mut self) {
        self.state = TunerState::Converged;
        self.iterations_since_tuning = 0;
        info!(config = %self.strategy.current_configuration(), "tuning converged");
    }

    /// Drops the newton3 modes the functor cannot run and restarts tuning.
    pub fn restrict_newton3(&mut self, allows_newton3: bool, allows_non_newton3: bool) -> Result<(), TuningError> {
        if !allows_newton3 && !allows_non_newton3 {
            return Err(TuningError::InvalidParameter(
                "functor allows neither newton3 mode".into(),
            ));
        }
        if !allows_newton3 {
            self.strategy.remove_newton3_option(Newton3Option::Enabled);
        }
        if !allows_non_newton3 {
            self.strategy.remove_newton3_option(Newton3Option::Disabled);
        }
        self.start_phase();
        Ok(())
    }

    pub fn current_configuration(&self) -> &Configuration {
        &self.current
    }

    pub fn state(&self) -> TunerState {
        self.state
    }

    pub fn is_tuning(&self) -> bool {
        self.state == TunerState::Exploring
    }

    pub fn params(&self) -> &TunerParams {
        &self.params
    }

    pub fn history(&self) -> &[(Configuration, f64)] {
        &self.history
    }

    pub fn search_space_is_empty(&self) -> bool {
        self.strategy.search_space_is_empty()
    }

    /// Ends the converged stretch early.
    pub fn force_retune(&mut self) {
        self.start_phase();
    }

    /// Reports the wall time of one traversal with the current
    /// configuration. Returns whether the next traversal is a tuning one.
    pub fn add_measurement(&mut self, time: f64) -> Result<bool, TuningError> {
        match self.state {
            TunerState::Exploring => {
                self.samples.push(time);
                if self.samples.len() < self.params.num_samples {
                    return Ok(true);
                }
                let Some(evidence) = self.params.selector.reduce(&self.samples) else {
                    return Ok(true);
                };
                self.samples.clear();
                self.strategy.add_evidence(evidence)?;
                self.history.push((self.current.clone(), evidence));
                debug!(config = %self.current, evidence, "evidence collected");
                if !self.strategy.tune() {
                    self.converge();
                }
                self.current = self.strategy.current_configuration();
            }
            TunerState::Converged => {
                self.iterations_since_tuning += 1;
                if self.iterations_since_tuning >= self.params.tuning_interval {
                    self.start_phase();
                }
            }
        }
        Ok(self.is_tuning())
    }
}
