//! Particle containers. One closed enum, dispatched once per traversal.

pub mod cluster_lists;
pub mod direct_sum;
pub mod linked_cells;
pub mod verlet_lists;
pub mod verlet_lists_cells;

pub use cluster_lists::VerletClusterLists;
pub use direct_sum::DirectSum;
pub use linked_cells::LinkedCells;
pub use verlet_lists::VerletLists;
pub use verlet_lists_cells::VerletListsCells;

use crate::configuration::{Configuration, DEFAULT_CLUSTER_SIZE};
use crate::error::{ContainerError, EngineError, GeometryError};
use crate::functor::PairwiseFunctor;
use crate::options::ContainerOption;
use crate::particle::Particle;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::info_span;

/// Geometry and list parameters shared by every container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerParams {
    pub box_min: [f64; 3],
    pub box_max: [f64; 3],
    pub cutoff: f64,
    /// Verlet skin added to the cutoff for list-based containers and cell sizes.
    pub skin: f64,
    /// Traversals between neighbour list rebuilds.
    pub rebuild_frequency: usize,
}

impl ContainerParams {
    pub fn new(box_min: [f64; 3], box_max: [f64; 3], cutoff: f64) -> Self {
        Self {
            box_min,
            box_max,
            cutoff,
            skin: 0.0,
            rebuild_frequency: 1,
        }
    }

    pub fn with_skin(mut self, skin: f64) -> Self {
        self.skin = skin;
        self
    }

    pub fn with_rebuild_frequency(mut self, rebuild_frequency: usize) -> Self {
        self.rebuild_frequency = rebuild_frequency;
        self
    }

    pub fn interaction_length(&self) -> f64 {
        self.cutoff + self.skin
    }

    pub fn box_min_vec(&self) -> Vector3<f64> {
        Vector3::from(self.box_min)
    }

    pub fn box_max_vec(&self) -> Vector3<f64> {
        Vector3::from(self.box_max)
    }

    pub fn validate(&self) -> Result<(), ContainerError> {
        if (0..3).any(|d| !(self.box_max[d] > self.box_min[d])) {
            return Err(GeometryError::InvalidBox {
                min: self.box_min,
                max: self.box_max,
            }
            .into());
        }
        let il = self.interaction_length();
        if !(self.cutoff > 0.0) || !(self.skin >= 0.0) || !il.is_finite() {
            return Err(GeometryError::InvalidInteractionLength(il).into());
        }
        if self.rebuild_frequency == 0 {
            return Err(ContainerError::InvalidRebuildFrequency);
        }
        Ok(())
    }
}

pub enum ParticleContainer {
    DirectSum(DirectSum),
    LinkedCells(LinkedCells),
    VerletLists(VerletLists),
    VerletListsCells(VerletListsCells),
    VerletClusterLists(VerletClusterLists),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            ParticleContainer::DirectSum($c) => $body,
            ParticleContainer::LinkedCells($c) => $body,
            ParticleContainer::VerletLists($c) => $body,
            ParticleContainer::VerletListsCells($c) => $body,
            ParticleContainer::VerletClusterLists($c) => $body,
        }
    };
}

impl ParticleContainer {
    pub fn new(
        option: ContainerOption,
        params: &ContainerParams,
        cell_size_factor: f64,
        cluster_size: Option<u32>,
    ) -> Result<Self, ContainerError> {
        params.validate()?;
        let _span = info_span!("ParticleContainer::new", container = %option).entered();
        Ok(match option {
            ContainerOption::DirectSum => ParticleContainer::DirectSum(DirectSum::new(params)),
            ContainerOption::LinkedCells => {
                ParticleContainer::LinkedCells(LinkedCells::new(params, cell_size_factor)?)
            }
            ContainerOption::VerletLists => {
                ParticleContainer::VerletLists(VerletLists::new(params, cell_size_factor)?)
            }
            ContainerOption::VerletListsCells => {
                ParticleContainer::VerletListsCells(VerletListsCells::new(params, cell_size_factor)?)
            }
            ContainerOption::VerletClusterLists => ParticleContainer::VerletClusterLists(
                VerletClusterLists::new(params, cluster_size.unwrap_or(DEFAULT_CLUSTER_SIZE))?,
            ),
        })
    }

    /// Container matching the geometry knobs of `config`.
    pub fn for_configuration(
        config: &Configuration,
        params: &ContainerParams,
    ) -> Result<Self, ContainerError> {
        Self::new(
            config.container,
            params,
            config.cell_size_factor,
            config.cluster_size,
        )
    }

    pub fn option(&self) -> ContainerOption {
        match self {
            ParticleContainer::DirectSum(_) => ContainerOption::DirectSum,
            ParticleContainer::LinkedCells(_) => ContainerOption::LinkedCells,
            ParticleContainer::VerletLists(_) => ContainerOption::VerletLists,
            ParticleContainer::VerletListsCells(_) => ContainerOption::VerletListsCells,
            ParticleContainer::VerletClusterLists(_) => ContainerOption::VerletClusterLists,
        }
    }

    /// Whether this container was built for the geometry knobs of `config`.
    pub fn matches(&self, config: &Configuration) -> bool {
        match self {
            ParticleContainer::DirectSum(_) => config.container == ContainerOption::DirectSum,
            ParticleContainer::LinkedCells(c) => {
                config.container == ContainerOption::LinkedCells
                    && c.block().cell_size_factor() == config.cell_size_factor
            }
            ParticleContainer::VerletLists(c) => {
                config.container == ContainerOption::VerletLists
                    && c.cell_size_factor() == config.cell_size_factor
            }
            ParticleContainer::VerletListsCells(c) => {
                config.container == ContainerOption::VerletListsCells
                    && c.cell_size_factor() == config.cell_size_factor
            }
            ParticleContainer::VerletClusterLists(c) => {
                config.container == ContainerOption::VerletClusterLists
                    && Some(c.cluster_size() as u32) == config.cluster_size
            }
        }
    }

    /// Adds an owned particle; it must lie inside the box.
    pub fn add_particle(&mut self, p: Particle) -> Result<(), ContainerError> {
        dispatch!(self, c => c.add_particle(p))
    }

    pub fn add_halo_particle(&mut self, p: Particle) {
        dispatch!(self, c => c.add_halo_particle(p))
    }

    pub fn delete_halo_particles(&mut self) {
        dispatch!(self, c => c.delete_halo_particles())
    }

    /// Owned and halo particles, dummies excluded.
    pub fn num_particles(&self) -> usize {
        let mut n = 0;
        self.for_each(|_| n += 1);
        n
    }

    pub fn for_each(&self, f: impl FnMut(&Particle)) {
        dispatch!(self, c => c.for_each(f))
    }

    /// Mutable access to owned and halo particles. Moving particles is
    /// allowed; call `update_container` before the moves exceed half the skin.
    pub fn for_each_mut(&mut self, f: impl FnMut(&mut Particle)) {
        dispatch!(self, c => c.for_each_mut(f))
    }

    pub fn rebuild(&mut self) {
        dispatch!(self, c => c.rebuild())
    }

    /// Drops halo particles, re-sorts the rest and returns owned particles
    /// that left the box.
    pub fn update_container(&mut self) -> Vec<Particle> {
        dispatch!(self, c => c.update_container())
    }

    /// All non-dummy particles; consumes the container.
    pub fn into_particles(self) -> Vec<Particle> {
        dispatch!(self, c => c.into_particles())
    }

    /// One full pairwise traversal with `config`, bracketed by the functor's
    /// init/end hooks.
    pub fn iterate_pairwise<F: PairwiseFunctor>(
        &mut self,
        functor: &mut F,
        config: &Configuration,
    ) -> Result<(), EngineError> {
        config.validate()?;
        if !self.matches(config) {
            return Err(ContainerError::ConfigurationMismatch {
                container: self.option(),
                configuration: config.clone(),
            }
            .into());
        }
        config.check_functor(&*functor)?;

        let newton3 = config.newton3.is_enabled();
        let _span = info_span!("iterate_pairwise", config = %config).entered();
        functor.init_traversal();
        {
            let f: &F = functor;
            match self {
                ParticleContainer::DirectSum(c) => c.iterate(f, config.data_layout, newton3),
                ParticleContainer::LinkedCells(c) => {
                    c.iterate(f, config.traversal, config.data_layout, newton3)
                }
                ParticleContainer::VerletLists(c) => c.iterate(f, newton3),
                ParticleContainer::VerletListsCells(c) => c.iterate(f, config.traversal, newton3),
                ParticleContainer::VerletClusterLists(c) => {
                    c.iterate(f, config.traversal, config.data_layout, newton3)
                }
            }
        }
        functor.end_traversal(newton3)?;
        Ok(())
    }
}
