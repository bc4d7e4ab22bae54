use super::search_space::SearchSpace;
use super::{TuningStrategy, best_of, fallback_configuration};
use crate::configuration::Configuration;
use crate::error::TuningError;
use crate::options::Newton3Option;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

/// Draws of an interval space before giving up on finding a new configuration.
const MAX_DRAWS: usize = 64;

/// Measures up to `max_evidence` randomly drawn, distinct configurations.
#[derive(Clone, Debug)]
pub struct RandomSearch {
    space: SearchSpace,
    max_evidence: usize,
    rng: ChaCha8Rng,
    current: Configuration,
    evidence: Vec<(Configuration, f64)>,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, max_evidence: usize, seed: u64) -> Result<Self, TuningError> {
        if max_evidence == 0 {
            return Err(TuningError::InvalidParameter("max_evidence must be at least 1".into()));
        }
        let current = fallback_configuration(&space.newton3);
        Ok(Self {
            space,
            max_evidence,
            rng: ChaCha8Rng::seed_from_u64(seed),
            current,
            evidence: Vec::new(),
        })
    }

    fn draw(&mut self) -> Option<Configuration> {
        let evidence = &self.evidence;
        let seen = |c: &Configuration| evidence.iter().any(|(e, _)| e == c);
        let (space, rng) = (&self.space, &mut self.rng);
        match space.configurations() {
            Ok(all) => {
                let fresh: Vec<Configuration> = all.into_iter().filter(|c| !seen(c)).collect();
                fresh.choose(rng).cloned()
            }
            Err(_) => (0..MAX_DRAWS).find_map(|_| space.sample(1, &mut *rng).pop().filter(|c| !seen(c))),
        }
    }

    fn finish(&mut self) -> bool {
        self.current = match best_of(&self.evidence) {
            Some(best) => best.clone(),
            None => {
                warn!("no configuration could be drawn, using the fallback configuration");
                fallback_configuration(&self.space.newton3)
            }
        };
        false
    }
}

impl TuningStrategy for RandomSearch {
    fn current_configuration(&self) -> Configuration {
        self.current.clone()
    }

    fn add_evidence(&mut self, time: f64) -> Result<(), TuningError> {
        self.evidence.push((self.current.clone(), time));
        Ok(())
    }

    fn tune(&mut self) -> bool {
        if self.evidence.len() >= self.max_evidence {
            return self.finish();
        }
        match self.draw() {
            Some(c) => {
                self.current = c;
                true
            }
            None => self.finish(),
        }
    }

    fn reset(&mut self) {
        self.evidence.clear();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ContainerOption, DataLayoutOption, TraversalOption};
    use crate::tuning::search_space::NumberSet;

    fn space() -> SearchSpace {
        SearchSpace {
            containers: [ContainerOption::LinkedCells].into_iter().collect(),
            cell_size_factors: NumberSet::finite([1.0, 2.0, 3.0]),
            traversals: [TraversalOption::C08, TraversalOption::C18].into_iter().collect(),
            data_layouts: DataLayoutOption::ALL.into_iter().collect(),
            newton3: Newton3Option::ALL.into_iter().collect(),
            cluster_sizes: Default::default(),
        }
    }

    #[test]
    fn test_stops_at_max_evidence_with_best_seen() {
        let mut search = RandomSearch::new(space(), 5, 42).unwrap();
        let mut times = Vec::new();
        while search.tune() {
            let t = search.current_configuration().cell_size_factor * 10.0
                + times.len() as f64 * 0.1;
            search.add_evidence(t).unwrap();
            times.push(t);
        }
        assert_eq!(search.evidence().len(), 5);
        let best = times.iter().copied().fold(f64::INFINITY, f64::min);
        let chosen = search.current_configuration();
        let chosen_time = search
            .evidence()
            .iter()
            .find(|(c, _)| *c == chosen)
            .map(|(_, t)| *t);
        assert_eq!(chosen_time, Some(best));
    }

    #[test]
    fn test_exhausts_small_space_without_repeats() {
        let total = space().configurations().unwrap().len();
        let mut search = RandomSearch::new(space(), 1000, 7).unwrap();
        while search.tune() {
            search.add_evidence(1.0).unwrap();
        }
        assert_eq!(search.evidence().len(), total);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let run = |seed| {
            let mut s = RandomSearch::new(space(), 4, seed).unwrap();
            let mut seq = Vec::new();
            while s.tune() {
                seq.push(s.current_configuration());
                s.add_evidence(1.0).unwrap();
            }
            seq
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_interval_space_draws_valid_configurations() {
        let mut sp = space();
        sp.cell_size_factors = NumberSet::interval(1.0, 2.0).unwrap();
        let mut search = RandomSearch::new(sp, 6, 1).unwrap();
        while search.tune() {
            let c = search.current_configuration();
            assert!(c.is_valid());
            assert!((1.0..=2.0).contains(&c.cell_size_factor));
            search.add_evidence(c.cell_size_factor).unwrap();
        }
        assert_eq!(search.evidence().len(), 6);
    }
}
