//! Verlet lists stored per base cell. Each list holds exactly the pairs one
//! base step of the consuming traversal processes.

use super::ContainerParams;
use super::linked_cells::LinkedCells;
use super::verlet_lists::{Slot, particle_pair_mut};
use crate::cell::ParticleCell;
use crate::cell_block::{one_to_three, three_to_one};
use crate::config::{get_parallel_threshold, get_slice_count};
use crate::error::ContainerError;
use crate::functor::PairwiseFunctor;
use crate::options::TraversalOption;
use crate::particle::Particle;
use crate::shared::SharedSlice;
use crate::traversal::offsets::{c01_offsets, c08_pair_offsets, c18_forward_offsets, shifted};
use crate::traversal::sliced::{c08_layer_bases, for_each_layer_colored, longest_dim};
use crate::traversal::{for_each_base, strided_bases};
use rayon::prelude::*;
use tracing::{debug, debug_span, info_span};

/// Which base step the lists were built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListShape {
    /// Both orders of every pair, kept with the cell of the first particle.
    Full,
    /// Each unordered pair once, kept with the base cell of its C18 step.
    C18,
    /// Each unordered pair once, kept with the base cell of its C08 block.
    C08,
}

impl ListShape {
    pub fn for_traversal(traversal: TraversalOption, newton3: bool) -> Self {
        match (traversal, newton3) {
            (_, false) => ListShape::Full,
            (TraversalOption::VlcC18, true) => ListShape::C18,
            _ => ListShape::C08,
        }
    }
}

pub struct VerletListsCells {
    linked: LinkedCells,
    /// pairs[base] is the work of the base step at `base`.
    pairs: Vec<Vec<(Slot, Slot)>>,
    interaction_length_squared: f64,
    rebuild_frequency: usize,
    traversals_since_rebuild: usize,
    /// `None` until built and after any particle change.
    shape: Option<ListShape>,
    rebuild_count: usize,
}

impl VerletListsCells {
    pub fn new(params: &ContainerParams, cell_size_factor: f64) -> Result<Self, ContainerError> {
        if params.rebuild_frequency == 0 {
            return Err(ContainerError::InvalidRebuildFrequency);
        }
        let il = params.interaction_length();
        Ok(Self {
            linked: LinkedCells::new(params, cell_size_factor)?,
            pairs: Vec::new(),
            interaction_length_squared: il * il,
            rebuild_frequency: params.rebuild_frequency,
            traversals_since_rebuild: 0,
            shape: None,
            rebuild_count: 0,
        })
    }

    pub fn cell_size_factor(&self) -> f64 {
        self.linked.block().cell_size_factor()
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    pub fn shape(&self) -> Option<ListShape> {
        self.shape
    }

    /// Total stored pairs over all base cells.
    pub fn num_pairs(&self) -> usize {
        self.pairs.iter().map(Vec::len).sum()
    }

    pub fn add_particle(&mut self, p: Particle) -> Result<(), ContainerError> {
        self.linked.add_particle(p)?;
        self.shape = None;
        Ok(())
    }

    pub fn add_halo_particle(&mut self, p: Particle) {
        self.linked.add_halo_particle(p);
        self.shape = None;
    }

    pub fn delete_halo_particles(&mut self) {
        self.linked.delete_halo_particles();
        self.shape = None;
    }

    pub fn for_each(&self, f: impl FnMut(&Particle)) {
        self.linked.for_each(f);
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut Particle)) {
        self.linked.for_each_mut(f);
    }

    pub fn rebuild(&mut self) {
        self.linked.rebuild();
        self.shape = None;
    }

    pub fn update_container(&mut self) -> Vec<Particle> {
        self.shape = None;
        self.linked.update_container()
    }

    pub fn into_particles(self) -> Vec<Particle> {
        self.linked.into_particles()
    }

    fn rebuild_lists(&mut self, shape: ListShape) {
        self.linked.rebuild();
        let _span = info_span!("VerletListsCells::rebuild_lists", ?shape).entered();

        let dims = self.linked.block().cells_per_dim();
        let cells = self.linked.cells();
        let il2 = self.interaction_length_squared;
        self.pairs = (0..cells.len())
            .into_par_iter()
            .map(|base| match shape {
                ListShape::Full => full_pairs(cells, base, dims, il2),
                ListShape::C18 => c18_pairs(cells, base, dims, il2),
                ListShape::C08 => c08_pairs(cells, base, dims, il2),
            })
            .collect();

        self.shape = Some(shape);
        self.traversals_since_rebuild = 0;
        self.rebuild_count += 1;
        debug!(rebuild_count = self.rebuild_count, pairs = self.num_pairs(), "cell verlet lists rebuilt");
    }

    pub fn iterate<F: PairwiseFunctor>(&mut self, functor: &F, traversal: TraversalOption, newton3: bool) {
        let shape = ListShape::for_traversal(traversal, newton3);
        if self.shape != Some(shape) || self.traversals_since_rebuild >= self.rebuild_frequency {
            self.rebuild_lists(shape);
        }
        let _span = debug_span!("VerletListsCells::iterate", %traversal, newton3).entered();
        let parallel = self.linked.num_particles() >= get_parallel_threshold();
        let dims = self.linked.block().cells_per_dim();
        let pairs = &self.pairs;
        let cells = self.linked.cells_mut();

        if newton3 {
            let shared = SharedSlice::new(cells);
            let step = |base: usize| {
                for &(a, b) in &pairs[base] {
                    let (pi, pj) = unsafe { particle_pair_mut(shared, a, b) };
                    functor.aos_pair(pi, pj, true);
                }
            };
            if traversal == TraversalOption::VlcC18 {
                for color in 0..18 {
                    let start = [color % 3, (color / 3) % 3, color / 9];
                    let bases = strided_bases(start, dims, [3, 3, 2], dims);
                    for_each_base(&bases, parallel, step);
                }
            } else {
                // C08 blocks reach one layer ahead along the slicing axis.
                let axis = longest_dim(dims);
                for_each_layer_colored(dims[axis] - 1, 1, parallel, get_slice_count(), |layer| {
                    c08_layer_bases(dims, axis, layer).into_iter().for_each(step);
                });
            }
        } else {
            // Each base cell writes only its own particles, so every schedule
            // reduces to independent cells reading a snapshot.
            let snapshot: Vec<Vec<Particle>> = cells.iter().map(|c| c.particles.clone()).collect();
            let work = |(base, cell): (usize, &mut ParticleCell)| {
                for &((_, i), (cj, j)) in &pairs[base] {
                    let mut pj = snapshot[cj as usize][j as usize];
                    functor.aos_pair(&mut cell.particles[i as usize], &mut pj, false);
                }
            };
            if parallel {
                cells.par_iter_mut().enumerate().for_each(work);
            } else {
                cells.iter_mut().enumerate().for_each(work);
            }
        }
        self.traversals_since_rebuild += 1;
    }
}

/// Pairs between cells `ca` and `cb` within the interaction length. Inside a
/// single cell `ordered` selects both orders instead of `i < j`.
fn close_pairs(
    cells: &[ParticleCell],
    ca: usize,
    cb: usize,
    il2: f64,
    ordered: bool,
    out: &mut Vec<(Slot, Slot)>,
) {
    for (i, pi) in cells[ca].iter().enumerate() {
        if pi.is_dummy() {
            continue;
        }
        for (j, pj) in cells[cb].iter().enumerate() {
            if pj.is_dummy() || (ca == cb && (j == i || (!ordered && j < i))) {
                continue;
            }
            if (pi.position - pj.position).norm_squared() <= il2 {
                out.push(((ca as u32, i as u32), (cb as u32, j as u32)));
            }
        }
    }
}

fn full_pairs(cells: &[ParticleCell], base: usize, dims: [usize; 3], il2: f64) -> Vec<(Slot, Slot)> {
    let c = one_to_three(base, dims);
    let mut out = Vec::new();
    for off in c01_offsets() {
        if let Some(n) = shifted(c, off, dims) {
            close_pairs(cells, base, three_to_one(n, dims), il2, true, &mut out);
        }
    }
    out
}

fn c18_pairs(cells: &[ParticleCell], base: usize, dims: [usize; 3], il2: f64) -> Vec<(Slot, Slot)> {
    let c = one_to_three(base, dims);
    let mut out = Vec::new();
    for off in c18_forward_offsets() {
        if let Some(n) = shifted(c, off, dims) {
            close_pairs(cells, base, three_to_one(n, dims), il2, false, &mut out);
        }
    }
    out
}

fn c08_pairs(cells: &[ParticleCell], base: usize, dims: [usize; 3], il2: f64) -> Vec<(Slot, Slot)> {
    let c = one_to_three(base, dims);
    let mut out = Vec::new();
    if (0..3).any(|d| c[d] + 1 >= dims[d]) {
        return out;
    }
    for (o1, o2) in c08_pair_offsets(dims) {
        close_pairs(cells, base + o1, base + o2, il2, false, &mut out);
    }
    out
}
