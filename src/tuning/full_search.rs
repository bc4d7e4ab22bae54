use super::search_space::SearchSpace;
use super::{TuningStrategy, best_of, fallback_configuration};
use crate::configuration::Configuration;
use crate::error::TuningError;
use crate::options::Newton3Option;
use std::collections::BTreeSet;
use tracing::warn;

/// Measures every configuration once, in order.
#[derive(Clone, Debug)]
pub struct FullSearch {
    configurations: Vec<Configuration>,
    newton3: BTreeSet<Newton3Option>,
    next: usize,
    current: Configuration,
    evidence: Vec<(Configuration, f64)>,
}

impl FullSearch {
    /// Invalid and duplicate entries are dropped.
    pub fn new(configurations: Vec<Configuration>) -> Self {
        let mut unique: Vec<Configuration> = Vec::with_capacity(configurations.len());
        for c in configurations {
            if c.is_valid() && !unique.contains(&c) {
                unique.push(c);
            }
        }
        let newton3 = unique.iter().map(|c| c.newton3).collect();
        let mut search = Self {
            configurations: unique,
            newton3,
            next: 0,
            current: Configuration::fallback(),
            evidence: Vec::new(),
        };
        search.current = search.initial();
        search
    }

    pub fn from_space(space: &SearchSpace) -> Result<Self, TuningError> {
        Ok(Self::new(space.configurations()?))
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    fn initial(&self) -> Configuration {
        match self.configurations.first() {
            Some(c) => c.clone(),
            None => {
                warn!("empty search space, using the fallback configuration");
                fallback_configuration(&self.newton3)
            }
        }
    }
}

impl TuningStrategy for FullSearch {
    fn current_configuration(&self) -> Configuration {
        self.current.clone()
    }

    fn add_evidence(&mut self, time: f64) -> Result<(), TuningError> {
        self.evidence.push((self.current.clone(), time));
        Ok(())
    }

    fn tune(&mut self) -> bool {
        if let Some(c) = self.configurations.get(self.next) {
            self.current = c.clone();
            self.next += 1;
            return true;
        }
        self.current = match best_of(&self.evidence) {
            Some(best) => best.clone(),
            None => self.initial(),
        };
        false
    }

    fn reset(&mut self) {
        self.next = 0;
        self.evidence.clear();
        self.current = self.initial();
    }

    fn remove_newton3_option(&mut self, option: Newton3Option) {
        self.configurations.retain(|c| c.newton3 != option);
        self.newton3.remove(&option);
        self.reset();
    }

    fn search_space_is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    fn evidence(&self) -> &[(Configuration, f64)] {
        &self.evidence
    }
}
