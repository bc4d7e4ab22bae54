use crate::containers::ContainerParams;
use crate::error::{ConfigError, TuningError};
use crate::tuning::{
    AcquisitionFunction, AutoTuner, BayesianSearch, FullSearch, RandomSearch, SearchSpace,
    SelectorStrategy, TunerParams, TuningStrategy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

// Default heuristic values for this machine.
const DEFAULT_PARALLEL_THRESHOLD: usize = 300;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);
/// 0 selects the rayon thread count.
static SLICE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Particle count below which traversals run on the calling thread.
pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD.store(val, Ordering::Relaxed);
}

/// Slices used by the sliced traversal, resolved against the thread pool.
pub fn get_slice_count() -> usize {
    match SLICE_COUNT.load(Ordering::Relaxed) {
        0 => rayon::current_num_threads(),
        n => n,
    }
}

pub fn set_slice_count(val: usize) {
    SLICE_COUNT.store(val, Ordering::Relaxed);
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    FullSearch,
    RandomSearch {
        max_evidence: usize,
    },
    BayesianSearch {
        max_evidence: usize,
        #[serde(default)]
        acquisition: AcquisitionFunction,
        #[serde(default = "default_candidate_samples")]
        num_samples: usize,
        #[serde(default)]
        ei_threshold: Option<f64>,
    },
}

fn default_candidate_samples() -> usize {
    1000
}

fn default_rebuild_frequency() -> usize {
    10
}

/// Everything a run needs, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub box_min: [f64; 3],
    pub box_max: [f64; 3],
    pub cutoff: f64,
    #[serde(default)]
    pub skin: f64,
    #[serde(default = "default_rebuild_frequency")]
    pub rebuild_frequency: usize,
    #[serde(default)]
    pub search_space: SearchSpace,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub tuner: TunerParams,
    #[serde(default)]
    pub seed: u64,
}

impl EngineConfig {
    pub fn new(box_min: [f64; 3], box_max: [f64; 3], cutoff: f64) -> Self {
        Self {
            box_min,
            box_max,
            cutoff,
            skin: 0.0,
            rebuild_frequency: default_rebuild_frequency(),
            search_space: SearchSpace::default(),
            strategy: StrategyConfig::default(),
            tuner: TunerParams::default(),
            seed: 0,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.container_params()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.tuner.num_samples == 0 || self.tuner.tuning_interval == 0 {
            return Err(ConfigError::Invalid(
                "num_samples and tuning_interval must be at least 1".into(),
            ));
        }
        match &self.strategy {
            StrategyConfig::FullSearch if !self.search_space.cell_size_factors.is_finite() => {
                return Err(ConfigError::Invalid(
                    "full search needs a finite set of cell size factors".into(),
                ));
            }
            StrategyConfig::RandomSearch { max_evidence }
            | StrategyConfig::BayesianSearch { max_evidence, .. }
                if *max_evidence == 0 =>
            {
                return Err(ConfigError::Invalid("max_evidence must be at least 1".into()));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn container_params(&self) -> ContainerParams {
        ContainerParams::new(self.box_min, self.box_max, self.cutoff)
            .with_skin(self.skin)
            .with_rebuild_frequency(self.rebuild_frequency)
    }

    pub fn build_strategy(&self) -> Result<Box<dyn TuningStrategy>, TuningError> {
        let space = self.search_space.clone();
        Ok(match &self.strategy {
            StrategyConfig::FullSearch => Box::new(FullSearch::from_space(&space)?),
            StrategyConfig::RandomSearch { max_evidence } => {
                Box::new(RandomSearch::new(space, *max_evidence, self.seed)?)
            }
            StrategyConfig::BayesianSearch {
                max_evidence,
                acquisition,
                num_samples,
                ei_threshold,
            } => {
                let search = BayesianSearch::new(space, *max_evidence, *acquisition, *num_samples, self.seed)?;
                match ei_threshold {
                    Some(t) => Box::new(search.with_ei_threshold(*t)),
                    None => Box::new(search),
                }
            }
        })
    }

    pub fn build_tuner(&self) -> Result<AutoTuner, TuningError> {
        AutoTuner::new(self.build_strategy()?, self.tuner.clone())
    }

    pub fn selector(&self) -> SelectorStrategy {
        self.tuner.selector
    }
}
