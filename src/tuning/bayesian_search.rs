use super::acquisition::{AcquisitionFunction, expected_improvement};
use super::feature_vector::FeatureVector;
use super::gaussian_process::GaussianProcess;
use super::search_space::SearchSpace;
use super::{TuningStrategy, best_of, fallback_configuration};
use crate::configuration::Configuration;
use crate::error::TuningError;
use crate::options::Newton3Option;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Gaussian-process guided search over Latin-hypercube candidates.
#[derive(Clone, Debug)]
pub struct BayesianSearch {
    space: SearchSpace,
    max_evidence: usize,
    acquisition: AcquisitionFunction,
    /// Candidates drawn per proposal.
    num_samples: usize,
    /// Stop early once no candidate promises this much expected improvement.
    ei_threshold: Option<f64>,
    rng: ChaCha8Rng,
    gp: GaussianProcess,
    current: Configuration,
    evidence: Vec<(Configuration, f64)>,
}

impl BayesianSearch {
    pub fn new(
        space: SearchSpace,
        max_evidence: usize,
        acquisition: AcquisitionFunction,
        num_samples: usize,
        seed: u64,
    ) -> Result<Self, TuningError> {
        if max_evidence == 0 || num_samples == 0 {
            return Err(TuningError::InvalidParameter(
                "max_evidence and num_samples must be at least 1".into(),
            ));
        }
        let current = fallback_configuration(&space.newton3);
        Ok(Self {
            space,
            max_evidence,
            acquisition,
            num_samples,
            ei_threshold: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            gp: GaussianProcess::default(),
            current,
            evidence: Vec::new(),
        })
    }

    pub fn with_ei_threshold(mut self, threshold: f64) -> Self {
        self.ei_threshold = Some(threshold);
        self
    }

    pub fn gaussian_process(&self) -> &GaussianProcess {
        &self.gp
    }

    /// Unmeasured candidates in random order, without repeats. Small finite
    /// spaces are enumerated completely.
    fn candidates(&mut self) -> Vec<Configuration> {
        let evidence = &self.evidence;
        let fresh = |c: &Configuration| !evidence.iter().any(|(e, _)| e == c);
        match self.space.configurations() {
            Ok(mut all) if all.len() <= self.num_samples => {
                all.retain(|c| fresh(c));
                all.shuffle(&mut self.rng);
                all
            }
            _ => {
                let mut sampled = self.space.sample(self.num_samples, &mut self.rng);
                let mut seen = HashSet::new();
                sampled.retain(|c| fresh(c) && seen.insert(c.clone()));
                sampled
            }
        }
    }

    fn finish(&mut self) -> bool {
        self.current = match best_of(&self.evidence) {
            Some(best) => best.clone(),
            None => {
                warn!("no candidate configurations left, using the fallback configuration");
                fallback_configuration(&self.space.newton3)
            }
        };
        false
    }
}

impl TuningStrategy for BayesianSearch {
    fn current_configuration(&self) -> Configuration {
        self.current.clone()
    }

    fn add_evidence(&mut self, time: f64) -> Result<(), TuningError> {
        self.gp.add_evidence(FeatureVector::from(&self.current), time)?;
        self.evidence.push((self.current.clone(), time));
        Ok(())
    }

    fn tune(&mut self) -> bool {
        if self.evidence.len() >= self.max_evidence {
            return self.finish();
        }
        let candidates = self.candidates();
        if candidates.is_empty() {
            return self.finish();
        }
        let Some((_, best_time)) = self.gp.best() else {
            // Nothing measured yet, candidates come shuffled.
            self.current = candidates[0].clone();
            return true;
        };

        let scored: Vec<(f64, f64, &Configuration)> = candidates
            .iter()
            .map(|c| {
                let (mean, var) = self.gp.predict(&FeatureVector::from(c));
                let score = self.acquisition.evaluate(mean, var, best_time);
                (score, expected_improvement(mean, var.sqrt(), best_time), c)
            })
            .collect();

        if let Some(threshold) = self.ei_threshold {
            let max_ei = scored.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);
            if max_ei < threshold {
                debug!(max_ei, threshold, "expected improvement below threshold");
                return self.finish();
            }
        }

        let Some(&(score, _, chosen)) = scored.iter().fold(None, |best: Option<&(f64, f64, &Configuration)>, s| {
            match best {
                Some(b) if b.0 >= s.0 => Some(b),
                _ => Some(s),
            }
        }) else {
            return self.finish();
        };
        debug!(score, config = %chosen, "bayesian proposal");
        self.current = chosen.clone();
        true
    }

    fn reset(&mut self) {
        self.evidence.clear();
        self.gp.clear();
        self.current = fallback_configuration(&self.space.newton3);
    }

    fn remove_newton3_option(&mut self, option: Newton3Option) {
        self.space.remove_newton3(option);
        self.reset();
    }

    fn search_space_is_empty(&self) -> bool {
        self.space.is_empty()
    }

    fn evidence(&self) -> &[(Configuration, f64)] {
        &self.evidence
    }
}
