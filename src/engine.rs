//! Ties a container to the auto-tuner: every pairwise traversal runs with the
//! tuner's current configuration and reports its wall time back.

use crate::config::EngineConfig;
use crate::configuration::Configuration;
use crate::containers::{ContainerParams, ParticleContainer};
use crate::error::{ContainerError, EngineError};
use crate::functor::PairwiseFunctor;
use crate::particle::Particle;
use crate::tuning::{AutoTuner, TuningRecord};
use std::time::Instant;
use tracing::{debug, info_span, warn};

pub struct PairwiseEngine {
    params: ContainerParams,
    container: ParticleContainer,
    tuner: AutoTuner,
    /// Newton3 permissions of the last functor the search space was cut for.
    functor_newton3: Option<(bool, bool)>,
    /// Owned particles that no longer fit any box, handed out by the next
    /// `update_container`.
    leaving: Vec<Particle>,
    iterations: usize,
}

impl PairwiseEngine {
    pub fn new(params: ContainerParams, tuner: AutoTuner) -> Result<Self, EngineError> {
        let container = ParticleContainer::for_configuration(tuner.current_configuration(), &params)?;
        Ok(Self {
            params,
            container,
            tuner,
            functor_newton3: None,
            leaving: Vec::new(),
            iterations: 0,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Self::new(config.container_params(), config.build_tuner()?)
    }

    pub fn add_particle(&mut self, p: Particle) -> Result<(), ContainerError> {
        self.container.add_particle(p)
    }

    pub fn add_halo_particle(&mut self, p: Particle) {
        self.container.add_halo_particle(p);
    }

    pub fn delete_halo_particles(&mut self) {
        self.container.delete_halo_particles();
    }

    /// Owned particles that left the box since the last call.
    pub fn update_container(&mut self) -> Vec<Particle> {
        let mut out = std::mem::take(&mut self.leaving);
        out.extend(self.container.update_container());
        out
    }

    pub fn num_particles(&self) -> usize {
        self.container.num_particles()
    }

    pub fn for_each(&self, f: impl FnMut(&Particle)) {
        self.container.for_each(f);
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut Particle)) {
        self.container.for_each_mut(f);
    }

    pub fn container(&self) -> &ParticleContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut ParticleContainer {
        &mut self.container
    }

    pub fn tuner(&self) -> &AutoTuner {
        &self.tuner
    }

    pub fn current_configuration(&self) -> &Configuration {
        self.tuner.current_configuration()
    }

    pub fn is_tuning(&self) -> bool {
        self.tuner.is_tuning()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// One traversal with the current configuration. Returns whether it was
    /// a tuning traversal.
    ///
    /// The first functor that forbids a newton3 mode removes that mode from
    /// the search space for the rest of the run.
    pub fn iterate_pairwise<F: PairwiseFunctor>(&mut self, functor: &mut F) -> Result<bool, EngineError> {
        let flags = (functor.allows_newton3(), functor.allows_non_newton3());
        if flags != (true, true) && self.functor_newton3 != Some(flags) {
            self.tuner.restrict_newton3(flags.0, flags.1)?;
            self.functor_newton3 = Some(flags);
        }

        let config = self.tuner.current_configuration().clone();
        self.ensure_container(&config)?;
        let tuning = self.tuner.is_tuning();

        let _span = info_span!("PairwiseEngine::iterate_pairwise", iteration = self.iterations, tuning).entered();
        let start = Instant::now();
        self.container.iterate_pairwise(functor, &config)?;
        let elapsed = start.elapsed().as_secs_f64();
        self.iterations += 1;

        if functor.is_relevant_for_tuning() {
            self.tuner.add_measurement(elapsed)?;
        } else {
            debug!(elapsed, "timing ignored for tuning");
        }
        Ok(tuning)
    }

    /// Swaps in a container built for `config`, moving every particle over.
    fn ensure_container(&mut self, config: &Configuration) -> Result<(), EngineError> {
        if self.container.matches(config) {
            return Ok(());
        }
        let _span = info_span!("PairwiseEngine::switch_container", config = %config).entered();
        let next = ParticleContainer::for_configuration(config, &self.params)?;
        let previous = std::mem::replace(&mut self.container, next);
        for p in previous.into_particles() {
            if p.is_halo() {
                self.container.add_halo_particle(p);
            } else if let Err(e) = self.container.add_particle(p) {
                warn!(error = %e, "particle outside the box while switching containers");
                self.leaving.push(p);
            }
        }
        Ok(())
    }

    /// The current configuration with the run parameters.
    pub fn record(&self) -> TuningRecord {
        TuningRecord::new(self.tuner.current_configuration().clone())
            .with_parameter("box-min", format!("{:?}", self.params.box_min))
            .with_parameter("box-max", format!("{:?}", self.params.box_max))
            .with_parameter("cutoff", self.params.cutoff)
            .with_parameter("skin", self.params.skin)
            .with_parameter("rebuild-frequency", self.params.rebuild_frequency)
            .with_parameter("iterations", self.iterations)
            .with_parameter("selector", format!("{:?}", self.tuner.params().selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::lj::LennardJones;
    use crate::options::{ContainerOption, Newton3Option};
    use crate::tuning::{NumberSet, SearchSpace, TunerParams};
    use nalgebra::Vector3;
    use std::collections::BTreeSet;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::new([0.0; 3], [6.0; 3], 1.5);
        config.search_space = SearchSpace {
            containers: BTreeSet::from([ContainerOption::LinkedCells, ContainerOption::VerletClusterLists]),
            cell_size_factors: NumberSet::finite([1.0]),
            ..SearchSpace::default()
        };
        config.strategy = StrategyConfig::FullSearch;
        config.tuner = TunerParams {
            num_samples: 1,
            tuning_interval: 50,
            ..TunerParams::default()
        };
        config
    }

    fn fill(engine: &mut PairwiseEngine) {
        let mut id = 0;
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..5 {
                    let pos = Vector3::new(x as f64, y as f64, z as f64) * 1.1 + Vector3::repeat(0.4);
                    engine.add_particle(Particle::new(id, pos, Vector3::zeros(), 0)).unwrap();
                    id += 1;
                }
            }
        }
    }

    #[test]
    fn test_tunes_through_every_configuration_and_keeps_particles() {
        let mut engine = PairwiseEngine::from_config(&config()).unwrap();
        fill(&mut engine);
        let mut functor = LennardJones::new(1.5, 1.0, 1.0, false);
        let mut seen = Vec::new();
        while engine.is_tuning() {
            seen.push(engine.current_configuration().clone());
            engine.iterate_pairwise(&mut functor).unwrap();
            assert_eq!(engine.num_particles(), 125);
        }
        assert!(seen.len() > 2);
        assert_eq!(engine.tuner().history().len(), seen.len());
        assert!(!engine.iterate_pairwise(&mut functor).unwrap());
        assert_eq!(engine.iterations(), seen.len() + 1);

        let record = engine.record();
        assert_eq!(&record.configuration, engine.current_configuration());
        assert!(record.parameters.contains_key("cutoff"));
    }

    struct OneWayOnly(LennardJones);

    impl PairwiseFunctor for OneWayOnly {
        fn cutoff(&self) -> f64 {
            self.0.cutoff()
        }

        fn aos_pair(&self, i: &mut Particle, j: &mut Particle, newton3: bool) {
            self.0.aos_pair(i, j, newton3);
        }

        fn allows_newton3(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_functor_without_newton3_restricts_space() {
        let mut engine = PairwiseEngine::from_config(&config()).unwrap();
        fill(&mut engine);
        let mut functor = OneWayOnly(LennardJones::new(1.5, 1.0, 1.0, false));
        for _ in 0..40 {
            engine.iterate_pairwise(&mut functor).unwrap();
            assert_eq!(engine.current_configuration().newton3, Newton3Option::Disabled);
        }
        assert!(engine.tuner().history().iter().all(|(c, _)| c.newton3 == Newton3Option::Disabled));
    }
}
