use super::ContainerParams;
use crate::cell::ParticleCell;
use crate::cell_block::CellBlock;
use crate::config::get_parallel_threshold;
use crate::error::ContainerError;
use crate::functor::PairwiseFunctor;
use crate::options::{DataLayoutOption, TraversalOption};
use crate::particle::{OwnershipState, Particle};
use crate::traversal::{CellFunctor, traverse_cell_grid};
use rayon::prelude::*;
use tracing::info_span;

pub struct LinkedCells {
    block: CellBlock,
    cells: Vec<ParticleCell>,
}

impl LinkedCells {
    pub fn new(params: &ContainerParams, cell_size_factor: f64) -> Result<Self, ContainerError> {
        let block = CellBlock::new(
            params.box_min_vec(),
            params.box_max_vec(),
            params.interaction_length(),
            cell_size_factor,
        )?;
        let cells = vec![ParticleCell::new(); block.num_cells()];
        Ok(Self { block, cells })
    }

    pub fn block(&self) -> &CellBlock {
        &self.block
    }

    pub fn cells(&self) -> &[ParticleCell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [ParticleCell] {
        &mut self.cells
    }

    pub fn add_particle(&mut self, p: Particle) -> Result<(), ContainerError> {
        if !p.in_box(self.block.box_min(), self.block.box_max()) {
            return Err(ContainerError::OutsideBox {
                id: p.id,
                position: p.position.into(),
            });
        }
        let idx = self.block.cell_index_of(&p.position);
        self.cells[idx].add(p);
        Ok(())
    }

    pub fn add_halo_particle(&mut self, mut p: Particle) {
        p.ownership = OwnershipState::Halo;
        let idx = self.block.cell_index_of(&p.position);
        self.cells[idx].add(p);
    }

    pub fn delete_halo_particles(&mut self) {
        for cell in &mut self.cells {
            cell.particles.retain(|p| !p.is_halo());
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&Particle)) {
        self.cells
            .iter()
            .flat_map(|c| c.iter())
            .filter(|p| !p.is_dummy())
            .for_each(|p| f(p));
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut Particle)) {
        self.cells
            .iter_mut()
            .flat_map(|c| c.iter_mut())
            .filter(|p| !p.is_dummy())
            .for_each(|p| f(p));
    }

    pub fn num_particles(&self) -> usize {
        self.cells.iter().map(|c| c.len()).sum()
    }

    fn take_all(&mut self) -> Vec<Particle> {
        let mut all = Vec::with_capacity(self.num_particles());
        for cell in &mut self.cells {
            all.append(&mut cell.particles);
            cell.soa.clear();
        }
        all
    }

    /// Re-sorts every particle into the cell its position maps to.
    pub fn rebuild(&mut self) {
        let _span = info_span!("LinkedCells::rebuild", n_particles = self.num_particles()).entered();
        for p in self.take_all() {
            let idx = self.block.cell_index_of(&p.position);
            self.cells[idx].add(p);
        }
    }

    pub fn update_container(&mut self) -> Vec<Particle> {
        let _span = info_span!("LinkedCells::update_container").entered();
        let mut leaving = Vec::new();
        for p in self.take_all() {
            if p.is_halo() || p.is_dummy() {
                continue;
            }
            if p.in_box(self.block.box_min(), self.block.box_max()) {
                let idx = self.block.cell_index_of(&p.position);
                self.cells[idx].add(p);
            } else {
                leaving.push(p);
            }
        }
        leaving
    }

    pub fn into_particles(mut self) -> Vec<Particle> {
        let mut all = self.take_all();
        all.retain(|p| !p.is_dummy());
        all
    }

    pub fn iterate<F: PairwiseFunctor>(
        &mut self,
        functor: &F,
        traversal: TraversalOption,
        layout: DataLayoutOption,
        newton3: bool,
    ) {
        let parallel = self.num_particles() >= get_parallel_threshold();
        let soa = layout == DataLayoutOption::Soa;
        if soa {
            self.cells.par_iter_mut().for_each(|c| c.load_soa());
        }
        // C01 owns one cell per worker and only ever writes to it.
        let bidirectional = traversal != TraversalOption::C01;
        let cf = CellFunctor::new(functor, layout, newton3, bidirectional);
        traverse_cell_grid(
            traversal,
            &mut self.cells,
            self.block.cells_per_dim(),
            &cf,
            parallel,
        );
        if soa {
            self.cells.par_iter_mut().for_each(|c| c.extract_soa());
        }
    }
}
