use super::ContainerParams;
use super::linked_cells::LinkedCells;
use crate::cell::ParticleCell;
use crate::config::get_parallel_threshold;
use crate::error::ContainerError;
use crate::functor::PairwiseFunctor;
use crate::particle::Particle;
use crate::shared::SharedSlice;
use crate::traversal::offsets::c08_pair_offsets;
use crate::traversal::{for_each_base, strided_bases};
use rayon::prelude::*;
use tracing::{debug, info_span};

/// (cell, index within cell)
pub type Slot = (u32, u32);

/// Per-particle neighbour lists over a linked-cells grid.
pub struct VerletLists {
    linked: LinkedCells,
    /// neighbors[cell][particle] lists partners within the interaction length.
    neighbors: Vec<Vec<Vec<Slot>>>,
    interaction_length_squared: f64,
    rebuild_frequency: usize,
    traversals_since_rebuild: usize,
    valid: bool,
    built_newton3: bool,
    rebuild_count: usize,
}

impl VerletLists {
    pub fn new(params: &ContainerParams, cell_size_factor: f64) -> Result<Self, ContainerError> {
        if params.rebuild_frequency == 0 {
            return Err(ContainerError::InvalidRebuildFrequency);
        }
        let il = params.interaction_length();
        Ok(Self {
            linked: LinkedCells::new(params, cell_size_factor)?,
            neighbors: Vec::new(),
            interaction_length_squared: il * il,
            rebuild_frequency: params.rebuild_frequency,
            traversals_since_rebuild: 0,
            valid: false,
            built_newton3: false,
            rebuild_count: 0,
        })
    }

    pub fn cell_size_factor(&self) -> f64 {
        self.linked.block().cell_size_factor()
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    pub fn add_particle(&mut self, p: Particle) -> Result<(), ContainerError> {
        self.linked.add_particle(p)?;
        self.valid = false;
        Ok(())
    }

    pub fn add_halo_particle(&mut self, p: Particle) {
        self.linked.add_halo_particle(p);
        self.valid = false;
    }

    pub fn delete_halo_particles(&mut self) {
        self.linked.delete_halo_particles();
        self.valid = false;
    }

    pub fn for_each(&self, f: impl FnMut(&Particle)) {
        self.linked.for_each(f);
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut Particle)) {
        self.linked.for_each_mut(f);
    }

    pub fn rebuild(&mut self) {
        self.linked.rebuild();
        self.valid = false;
    }

    pub fn update_container(&mut self) -> Vec<Particle> {
        self.valid = false;
        self.linked.update_container()
    }

    pub fn into_particles(self) -> Vec<Particle> {
        self.linked.into_particles()
    }

    fn needs_rebuild(&self, newton3: bool) -> bool {
        !self.valid
            || self.traversals_since_rebuild >= self.rebuild_frequency
            || self.built_newton3 != newton3
    }

    /// Re-sorts the cells and rebuilds every list.
    fn rebuild_lists(&mut self, newton3: bool) {
        self.linked.rebuild();
        let _span = info_span!("VerletLists::rebuild_lists", newton3).entered();

        let dims = self.linked.block().cells_per_dim();
        let cells = self.linked.cells();
        self.neighbors = cells.iter().map(|c| vec![Vec::new(); c.len()]).collect();

        let offsets = c08_pair_offsets(dims);
        let end = [dims[0] - 1, dims[1] - 1, dims[2] - 1];
        let il2 = self.interaction_length_squared;
        let mut push = |a: Slot, b: Slot| {
            self.neighbors[a.0 as usize][a.1 as usize].push(b);
            if !newton3 {
                self.neighbors[b.0 as usize][b.1 as usize].push(a);
            }
        };

        for base in strided_bases([0, 0, 0], end, [1, 1, 1], dims) {
            for &(o1, o2) in &offsets {
                let (c1, c2) = (base + o1, base + o2);
                let (ca, cb) = (&cells[c1], &cells[c2]);
                for (i, pi) in ca.iter().enumerate() {
                    if pi.is_dummy() {
                        continue;
                    }
                    let j_start = if c1 == c2 { i + 1 } else { 0 };
                    for (j, pj) in cb.iter().enumerate().skip(j_start) {
                        if pj.is_dummy() {
                            continue;
                        }
                        if (pi.position - pj.position).norm_squared() <= il2 {
                            push((c1 as u32, i as u32), (c2 as u32, j as u32));
                        }
                    }
                }
            }
        }

        self.valid = true;
        self.built_newton3 = newton3;
        self.traversals_since_rebuild = 0;
        self.rebuild_count += 1;
        debug!(rebuild_count = self.rebuild_count, "verlet lists rebuilt");
    }

    pub fn iterate<F: PairwiseFunctor>(&mut self, functor: &F, newton3: bool) {
        if self.needs_rebuild(newton3) {
            self.rebuild_lists(newton3);
        }
        let parallel = self.linked.num_particles() >= get_parallel_threshold();
        let dims = self.linked.block().cells_per_dim();
        let neighbors = &self.neighbors;
        let cells = self.linked.cells_mut();

        if newton3 {
            // Newton3 partners sit in x±1, y±1, z..=z+1 of the owning cell,
            // the C18 footprint, so the 18-color schedule keeps writers apart.
            let shared = SharedSlice::new(cells);
            for color in 0..18 {
                let start = [color % 3, (color / 3) % 3, color / 9];
                let bases = strided_bases(start, dims, [3, 3, 2], dims);
                for_each_base(&bases, parallel, |c| {
                    for (i, list) in neighbors[c].iter().enumerate() {
                        for &partner in list {
                            let (pi, pj) = unsafe { particle_pair_mut(shared, (c as u32, i as u32), partner) };
                            functor.aos_pair(pi, pj, true);
                        }
                    }
                });
            }
        } else {
            let snapshot: Vec<Vec<Particle>> = cells.iter().map(|c| c.particles.clone()).collect();
            let work = |(cell, lists): (&mut ParticleCell, &Vec<Vec<Slot>>)| {
                for (pi, list) in cell.particles.iter_mut().zip(lists) {
                    for &(cj, j) in list {
                        let mut pj = snapshot[cj as usize][j as usize];
                        functor.aos_pair(pi, &mut pj, false);
                    }
                }
            };
            if parallel {
                cells.par_iter_mut().zip(neighbors.par_iter()).for_each(work);
            } else {
                cells.iter_mut().zip(neighbors.iter()).for_each(work);
            }
        }
        self.traversals_since_rebuild += 1;
    }
}

/// Two distinct particles addressed by (cell, index).
///
/// # Safety
/// No other worker may touch either cell while the references live.
pub(crate) unsafe fn particle_pair_mut<'a>(
    cells: SharedSlice<'a, ParticleCell>,
    a: Slot,
    b: Slot,
) -> (&'a mut Particle, &'a mut Particle) {
    let (ca, ia, cb, ib) = (a.0 as usize, a.1 as usize, b.0 as usize, b.1 as usize);
    if ca == cb {
        debug_assert_ne!(ia, ib, "a particle cannot interact with itself");
        let ps = unsafe { &mut cells.get_mut(ca).particles };
        let (lo, hi) = ps.split_at_mut(ia.max(ib));
        if ia < ib {
            (&mut lo[ia], &mut hi[0])
        } else {
            (&mut hi[0], &mut lo[ib])
        }
    } else {
        unsafe { (&mut cells.get_mut(ca).particles[ia], &mut cells.get_mut(cb).particles[ib]) }
    }
}
