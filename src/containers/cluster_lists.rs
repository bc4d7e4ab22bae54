//! Verlet cluster lists: z-sorted towers cut into fixed-size clusters.

use super::ContainerParams;
use crate::cell::ParticleCell;
use crate::config::{get_parallel_threshold, get_slice_count};
use crate::error::ContainerError;
use crate::functor::PairwiseFunctor;
use crate::options::{DataLayoutOption, TraversalOption};
use crate::particle::{OwnershipState, Particle};
use crate::shared::SharedSlice;
use crate::soa::ForceScratch;
use crate::traversal::for_each_base;
use crate::traversal::sliced::for_each_layer_colored;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::ops::Range;
use tracing::{debug, debug_span, info_span};

/// (tower, cluster within tower)
pub type ClusterRef = (u32, u32);

#[derive(Clone, Debug, Default)]
pub struct Tower {
    /// Sorted by z and padded with dummies to a multiple of the cluster size.
    cell: ParticleCell,
    num_dummies: usize,
    /// neighbors[cluster] includes the cluster itself.
    neighbors: Vec<Vec<ClusterRef>>,
}

impl Tower {
    pub fn particles(&self) -> &[Particle] {
        &self.cell.particles
    }

    pub fn num_dummies(&self) -> usize {
        self.num_dummies
    }

    pub fn num_clusters(&self) -> usize {
        self.neighbors.len()
    }
}

pub struct VerletClusterLists {
    box_min: Vector3<f64>,
    box_max: Vector3<f64>,
    interaction_length: f64,
    cluster_size: usize,
    rebuild_frequency: usize,
    traversals_since_rebuild: usize,
    valid: bool,
    rebuild_count: usize,
    grid_side_length: f64,
    towers_per_dim: [usize; 2],
    tower_length: [f64; 2],
    tower_range: [usize; 2],
    towers: Vec<Tower>,
    /// Particles added since the last rebuild.
    pending: Vec<Particle>,
}

impl VerletClusterLists {
    pub fn new(params: &ContainerParams, cluster_size: u32) -> Result<Self, ContainerError> {
        if cluster_size == 0 {
            return Err(ContainerError::InvalidClusterSize);
        }
        if params.rebuild_frequency == 0 {
            return Err(ContainerError::InvalidRebuildFrequency);
        }
        let box_min = params.box_min_vec();
        let box_max = params.box_max_vec();
        let len = box_max - box_min;
        Ok(Self {
            box_min,
            box_max,
            interaction_length: params.interaction_length(),
            cluster_size: cluster_size as usize,
            rebuild_frequency: params.rebuild_frequency,
            traversals_since_rebuild: 0,
            valid: false,
            rebuild_count: 0,
            grid_side_length: len.x.max(len.y),
            towers_per_dim: [1, 1],
            tower_length: [len.x, len.y],
            tower_range: [1, 1],
            towers: vec![Tower::default()],
            pending: Vec::new(),
        })
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    pub fn grid_side_length(&self) -> f64 {
        self.grid_side_length
    }

    pub fn towers_per_dim(&self) -> [usize; 2] {
        self.towers_per_dim
    }

    pub fn towers(&self) -> &[Tower] {
        &self.towers
    }

    pub fn num_clusters(&self) -> usize {
        self.towers.iter().map(Tower::num_clusters).sum()
    }

    pub fn cluster_neighbors(&self, tower: usize, cluster: usize) -> &[ClusterRef] {
        &self.towers[tower].neighbors[cluster]
    }

    pub fn add_particle(&mut self, p: Particle) -> Result<(), ContainerError> {
        if !p.in_box(&self.box_min, &self.box_max) {
            return Err(ContainerError::OutsideBox {
                id: p.id,
                position: p.position.into(),
            });
        }
        self.pending.push(p);
        self.valid = false;
        Ok(())
    }

    pub fn add_halo_particle(&mut self, mut p: Particle) {
        p.ownership = OwnershipState::Halo;
        self.pending.push(p);
        self.valid = false;
    }

    pub fn delete_halo_particles(&mut self) {
        for t in &mut self.towers {
            t.cell.particles.retain(|p| !p.is_halo());
        }
        self.pending.retain(|p| !p.is_halo());
        self.valid = false;
    }

    pub fn for_each(&self, mut f: impl FnMut(&Particle)) {
        self.towers
            .iter()
            .flat_map(|t| t.cell.iter())
            .chain(self.pending.iter())
            .filter(|p| !p.is_dummy())
            .for_each(|p| f(p));
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut Particle)) {
        self.towers
            .iter_mut()
            .flat_map(|t| t.cell.iter_mut())
            .chain(self.pending.iter_mut())
            .filter(|p| !p.is_dummy())
            .for_each(|p| f(p));
    }

    fn take_all(&mut self) -> Vec<Particle> {
        let mut all: Vec<Particle> = std::mem::take(&mut self.pending);
        for t in &mut self.towers {
            all.extend(t.cell.particles.drain(..).filter(|p| !p.is_dummy()));
            t.cell.soa.clear();
            t.neighbors.clear();
            t.num_dummies = 0;
        }
        all
    }

    pub fn rebuild(&mut self) {
        self.rebuild_clusters();
    }

    pub fn update_container(&mut self) -> Vec<Particle> {
        let mut leaving = Vec::new();
        for p in self.take_all() {
            if p.is_halo() {
                continue;
            }
            if p.in_box(&self.box_min, &self.box_max) {
                self.pending.push(p);
            } else {
                leaving.push(p);
            }
        }
        self.valid = false;
        leaving
    }

    pub fn into_particles(mut self) -> Vec<Particle> {
        self.take_all()
    }

    fn tower_index_of(&self, pos: &Vector3<f64>) -> usize {
        let grid_min = self.grid_min();
        let mut idx = [0usize; 2];
        for d in 0..2 {
            let raw = ((pos[d] - grid_min[d]) / self.tower_length[d]).floor();
            let max = (self.towers_per_dim[d] - 1) as f64;
            idx[d] = if raw >= 0.0 { raw.min(max) as usize } else { 0 };
        }
        idx[0] + self.towers_per_dim[0] * idx[1]
    }

    fn grid_min(&self) -> Vector3<f64> {
        self.box_min.add_scalar(-self.interaction_length)
    }

    /// Re-bins every particle into towers and rebuilds the cluster lists.
    fn rebuild_clusters(&mut self) {
        let particles = self.take_all();
        let _span = info_span!("VerletClusterLists::rebuild", n_particles = particles.len()).entered();

        let box_len = self.box_max - self.box_min;
        let grid_len = box_len.add_scalar(2.0 * self.interaction_length);
        self.grid_side_length = if particles.is_empty() {
            box_len.x.max(box_len.y)
        } else {
            let density = particles.len() as f64 / (box_len.x * box_len.y * box_len.z);
            (self.cluster_size as f64 / density).cbrt()
        };
        for d in 0..2 {
            let n = ((grid_len[d] / self.grid_side_length).floor() as usize).max(1);
            self.towers_per_dim[d] = n;
            self.tower_length[d] = grid_len[d] / n as f64;
            self.tower_range[d] = (self.interaction_length / self.tower_length[d]).ceil() as usize;
        }
        self.towers = vec![Tower::default(); self.towers_per_dim[0] * self.towers_per_dim[1]];

        for p in particles {
            let idx = self.tower_index_of(&p.position);
            self.towers[idx].cell.add(p);
        }

        let grid_min = self.grid_min();
        let cs = self.cluster_size;
        let il = self.interaction_length;
        let z_top = self.box_max.z + il;
        for (idx, tower) in self.towers.iter_mut().enumerate() {
            tower.cell.sort_by_dim(2);
            let rest = tower.cell.len() % cs;
            if rest > 0 {
                let ix = idx % self.towers_per_dim[0];
                let iy = idx / self.towers_per_dim[0];
                let x = grid_min.x + (ix as f64 + 0.5) * self.tower_length[0];
                let y = grid_min.y + (iy as f64 + 0.5) * self.tower_length[1];
                for i in 0..(cs - rest) {
                    let z = z_top + 2.0 * il * (i + 1) as f64;
                    tower.cell.add(Particle::dummy(u64::MAX, Vector3::new(x, y, z)));
                }
                tower.num_dummies = cs - rest;
            }
            tower.neighbors = vec![Vec::new(); tower.cell.len() / cs];
        }

        self.build_neighbor_lists();
        self.valid = true;
        self.traversals_since_rebuild = 0;
        self.rebuild_count += 1;
        debug!(
            rebuild_count = self.rebuild_count,
            towers = self.towers.len(),
            clusters = self.num_clusters(),
            "cluster lists rebuilt"
        );
    }

    fn build_neighbor_lists(&mut self) {
        let cs = self.cluster_size;
        let [nx, ny] = self.towers_per_dim;
        let [rx, ry] = self.tower_range;
        let il2 = self.interaction_length * self.interaction_length;
        let bboxes: Vec<Vec<(f64, f64)>> = self
            .towers
            .iter()
            .map(|t| {
                t.cell
                    .particles
                    .chunks(cs)
                    .map(|cluster| z_extent(cluster))
                    .collect()
            })
            .collect();
        let tower_length = self.tower_length;

        let lists: Vec<Vec<Vec<ClusterRef>>> = (0..self.towers.len())
            .into_par_iter()
            .map(|ti| {
                let (ix, iy) = (ti % nx, ti / nx);
                let mut lists = vec![Vec::new(); bboxes[ti].len()];
                for jy in iy.saturating_sub(ry)..(iy + ry + 1).min(ny) {
                    for jx in ix.saturating_sub(rx)..(ix + rx + 1).min(nx) {
                        let gap_x = ix.abs_diff(jx).saturating_sub(1) as f64 * tower_length[0];
                        let gap_y = iy.abs_diff(jy).saturating_sub(1) as f64 * tower_length[1];
                        let dist_xy2 = gap_x * gap_x + gap_y * gap_y;
                        if dist_xy2 > il2 {
                            continue;
                        }
                        let tj = jx + nx * jy;
                        for (ci, bi) in bboxes[ti].iter().enumerate() {
                            for (cj, bj) in bboxes[tj].iter().enumerate() {
                                let dz = bbox_distance(*bi, *bj);
                                if dist_xy2 + dz * dz <= il2 {
                                    lists[ci].push((tj as u32, cj as u32));
                                }
                            }
                        }
                    }
                }
                lists
            })
            .collect();

        for (tower, l) in self.towers.iter_mut().zip(lists) {
            tower.neighbors = l;
        }
    }

    pub fn iterate<F: PairwiseFunctor>(
        &mut self,
        functor: &F,
        traversal: TraversalOption,
        layout: DataLayoutOption,
        newton3: bool,
    ) {
        if !self.valid || self.traversals_since_rebuild >= self.rebuild_frequency {
            self.rebuild_clusters();
        }
        let n_particles: usize = self.towers.iter().map(|t| t.cell.len()).sum();
        let parallel = n_particles >= get_parallel_threshold();
        let soa = layout == DataLayoutOption::Soa;
        if soa {
            self.towers.par_iter_mut().for_each(|t| t.cell.load_soa());
        }

        let cf = ClusterFunctor {
            functor,
            layout,
            cluster_size: self.cluster_size,
        };
        match (traversal, newton3) {
            (TraversalOption::VerletClustersSliced, _) => self.traverse_sliced(&cf, newton3, parallel),
            (_, true) => self.traverse_newton3(&cf, parallel),
            (_, false) => self.traverse_one_way(&cf, parallel),
        }

        if soa {
            self.towers.par_iter_mut().for_each(|t| t.cell.extract_soa());
        }
        self.traversals_since_rebuild += 1;
    }

    /// Each unordered cluster pair once. Towers are colored so that
    /// concurrently processed towers never share a write target.
    fn traverse_newton3<F: PairwiseFunctor>(&mut self, cf: &ClusterFunctor<'_, F>, parallel: bool) {
        let [nx, ny] = self.towers_per_dim;
        let stride = [2 * self.tower_range[0] + 1, 2 * self.tower_range[1] + 1];
        let shared = SharedSlice::new(&mut self.towers);

        for cy in 0..stride[1] {
            for cx in 0..stride[0] {
                let bases: Vec<usize> = (cy..ny)
                    .step_by(stride[1])
                    .flat_map(|y| (cx..nx).step_by(stride[0]).map(move |x| x + nx * y))
                    .collect();
                // Writes reach at most tower_range towers away in x and y.
                for_each_base(&bases, parallel, |ti| unsafe { newton3_tower_step(shared, ti, nx, 1, cf) });
            }
        }
    }

    /// Every ordered cluster pair; each tower only writes to itself.
    fn traverse_one_way<F: PairwiseFunctor>(&mut self, cf: &ClusterFunctor<'_, F>, parallel: bool) {
        let snapshot: Vec<ParticleCell> = self.towers.iter().map(|t| t.cell.clone()).collect();
        let work = |(ti, tower): (usize, &mut Tower)| one_way_tower_step(tower, ti, &snapshot, cf);
        if parallel {
            self.towers.par_iter_mut().enumerate().for_each(work);
        } else {
            self.towers.iter_mut().enumerate().for_each(work);
        }
    }

    /// Tower rows or columns along the longer of x and y, cut into two-colored
    /// slabs. With newton3 a tower's step reaches `tower_range` layers ahead.
    fn traverse_sliced<F: PairwiseFunctor>(&mut self, cf: &ClusterFunctor<'_, F>, newton3: bool, parallel: bool) {
        let [nx, ny] = self.towers_per_dim;
        let axis = if nx > ny { 0 } else { 1 };
        let layers = self.towers_per_dim[axis];
        let reach = if newton3 { self.tower_range[axis] } else { 1 };
        let layer_towers = move |layer: usize| -> Vec<usize> {
            if axis == 0 {
                (0..ny).map(|y| layer + nx * y).collect()
            } else {
                (0..nx).map(|x| x + nx * layer).collect()
            }
        };
        let _span = debug_span!("VerletClusterLists::traverse_sliced", axis, layers, newton3).entered();

        let snapshot: Vec<ParticleCell> = if newton3 {
            Vec::new()
        } else {
            self.towers.iter().map(|t| t.cell.clone()).collect()
        };
        let shared = SharedSlice::new(&mut self.towers);
        for_each_layer_colored(layers, reach, parallel, get_slice_count(), |layer| {
            for ti in layer_towers(layer) {
                if newton3 {
                    unsafe { newton3_tower_step(shared, ti, nx, axis, cf) };
                } else {
                    let tower = unsafe { shared.get_mut(ti) };
                    one_way_tower_step(tower, ti, &snapshot, cf);
                }
            }
        });
    }
}

/// Position of tower `t` with `axis` as the major coordinate.
fn tower_key(t: usize, nx: usize, axis: usize) -> (usize, usize) {
    let (x, y) = (t % nx, t / nx);
    if axis == 0 { (x, y) } else { (y, x) }
}

/// Newton3 pairs of every cluster in tower `ti` with partners that come at
/// or after it in `axis`-major order.
///
/// # Safety
/// No other worker may touch tower `ti` or the towers after it within
/// `tower_range` meanwhile.
unsafe fn newton3_tower_step<F: PairwiseFunctor>(
    towers: SharedSlice<'_, Tower>,
    ti: usize,
    nx: usize,
    axis: usize,
    cf: &ClusterFunctor<'_, F>,
) {
    let Tower { cell, neighbors, .. } = unsafe { towers.get_mut(ti) };
    let key = tower_key(ti, nx, axis);
    for (ci, list) in neighbors.iter().enumerate() {
        for &(tj, cj) in list.iter() {
            let (tj, cj) = (tj as usize, cj as usize);
            if (tower_key(tj, nx, axis), cj) < (key, ci) {
                continue;
            }
            if tj == ti && cj == ci {
                cf.cluster_single(cell, ci, true);
            } else if tj == ti {
                cf.cluster_pair_same_cell(cell, ci, cj);
            } else {
                let other = unsafe { towers.get_mut(tj) };
                cf.cluster_pair(cell, ci, &mut other.cell, cj);
            }
        }
    }
}

/// One-way pairs of every cluster in `tower`, partners read from `snapshot`.
fn one_way_tower_step<F: PairwiseFunctor>(
    tower: &mut Tower,
    ti: usize,
    snapshot: &[ParticleCell],
    cf: &ClusterFunctor<'_, F>,
) {
    let Tower { cell, neighbors, .. } = tower;
    let mut scratch = ForceScratch::default();
    for (ci, list) in neighbors.iter().enumerate() {
        for &(tj, cj) in list {
            let (tj, cj) = (tj as usize, cj as usize);
            if tj == ti && cj == ci {
                cf.cluster_single(cell, ci, false);
            } else {
                let other = if tj == ti { None } else { Some(&snapshot[tj]) };
                cf.cluster_pair_one_way(cell, ci, other, cj, &mut scratch);
            }
        }
    }
}

/// z range of the non-dummy particles of a cluster.
fn z_extent(cluster: &[Particle]) -> (f64, f64) {
    cluster
        .iter()
        .filter(|p| !p.is_dummy())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.position.z), hi.max(p.position.z))
        })
}

/// Gap between two intervals, zero when they overlap.
pub fn bbox_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    if a.1 < b.0 {
        b.0 - a.1
    } else if b.1 < a.0 {
        a.0 - b.1
    } else {
        0.0
    }
}

struct ClusterFunctor<'f, F: PairwiseFunctor> {
    functor: &'f F,
    layout: DataLayoutOption,
    cluster_size: usize,
}

impl<F: PairwiseFunctor> ClusterFunctor<'_, F> {
    fn range(&self, c: usize) -> Range<usize> {
        c * self.cluster_size..(c + 1) * self.cluster_size
    }

    fn cluster_single(&self, cell: &mut ParticleCell, c: usize, newton3: bool) {
        let r = self.range(c);
        match self.layout {
            DataLayoutOption::Aos => {
                let ps = &mut cell.particles[r];
                for j in 1..ps.len() {
                    let (head, tail) = ps.split_at_mut(j);
                    let pj = &mut tail[0];
                    for pi in head.iter_mut() {
                        if newton3 {
                            self.functor.aos_pair(pi, pj, true);
                        } else {
                            self.functor.aos_pair(pi, pj, false);
                            self.functor.aos_pair(pj, pi, false);
                        }
                    }
                }
            }
            DataLayoutOption::Soa => self.functor.soa_single(cell.soa.view_range(r), newton3),
        }
    }

    /// Newton3 pair of two clusters in the same tower.
    fn cluster_pair_same_cell(&self, cell: &mut ParticleCell, a: usize, b: usize) {
        let (ra, rb) = (self.range(a), self.range(b));
        match self.layout {
            DataLayoutOption::Aos => {
                let (lo, hi) = (ra.start.min(rb.start), ra.start.max(rb.start));
                let (first, second) = cell.particles.split_at_mut(hi);
                let first = &mut first[lo..lo + self.cluster_size];
                let second = &mut second[..self.cluster_size];
                for pi in first.iter_mut() {
                    for pj in second.iter_mut() {
                        self.functor.aos_pair(pi, pj, true);
                    }
                }
            }
            DataLayoutOption::Soa => {
                let (va, vb) = cell.soa.view_pair(ra, rb);
                self.functor.soa_pair(va, vb, true);
            }
        }
    }

    /// Newton3 pair of clusters in different towers.
    fn cluster_pair(&self, a: &mut ParticleCell, ca: usize, b: &mut ParticleCell, cb: usize) {
        let (ra, rb) = (self.range(ca), self.range(cb));
        match self.layout {
            DataLayoutOption::Aos => {
                for pi in a.particles[ra].iter_mut() {
                    for pj in b.particles[rb.clone()].iter_mut() {
                        self.functor.aos_pair(pi, pj, true);
                    }
                }
            }
            DataLayoutOption::Soa => {
                self.functor
                    .soa_pair(a.soa.view_range(ra), b.soa.view_range(rb), true);
            }
        }
    }

    /// Updates cluster `ca` of `a` only. `other` is `None` when the partner
    /// cluster lives in `a` itself.
    fn cluster_pair_one_way(
        &self,
        a: &mut ParticleCell,
        ca: usize,
        other: Option<&ParticleCell>,
        cb: usize,
        scratch: &mut ForceScratch,
    ) {
        let (ra, rb) = (self.range(ca), self.range(cb));
        match (self.layout, other) {
            (DataLayoutOption::Aos, Some(b)) => {
                for pi in a.particles[ra].iter_mut() {
                    for pj in &b.particles[rb.clone()] {
                        let mut pj = *pj;
                        self.functor.aos_pair(pi, &mut pj, false);
                    }
                }
            }
            (DataLayoutOption::Aos, None) => {
                for i in ra {
                    for j in rb.clone() {
                        let mut pj = a.particles[j];
                        self.functor.aos_pair(&mut a.particles[i], &mut pj, false);
                    }
                }
            }
            (DataLayoutOption::Soa, Some(b)) => {
                let vb = b.soa.view_with_scratch(rb, scratch);
                self.functor.soa_pair(a.soa.view_range(ra), vb, false);
            }
            (DataLayoutOption::Soa, None) => {
                let (va, vb) = a.soa.view_pair(ra, rb);
                self.functor.soa_pair(va, vb, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_container(n: u64, seed: u64) -> VerletClusterLists {
        let params = ContainerParams::new([0.0; 3], [6.0; 3], 1.0).with_skin(0.2);
        let mut vcl = VerletClusterLists::new(&params, 4).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for id in 0..n {
            let pos = [
                rng.gen_range(0.0..6.0),
                rng.gen_range(0.0..6.0),
                rng.gen_range(0.0..6.0),
            ];
            vcl.add_particle(Particle::at(id, pos)).unwrap();
        }
        vcl
    }

    #[test]
    fn test_bbox_distance() {
        assert_eq!(bbox_distance((0.0, 1.0), (0.5, 2.0)), 0.0);
        assert_eq!(bbox_distance((0.0, 1.0), (1.5, 2.0)), 0.5);
        assert_eq!(bbox_distance((3.0, 4.0), (1.5, 2.0)), 1.0);
    }

    #[test]
    fn test_towers_are_padded_and_sorted() {
        let mut vcl = random_container(103, 7);
        vcl.rebuild();
        let mut real = 0;
        for tower in vcl.towers() {
            assert_eq!(tower.particles().len() % 4, 0);
            let zs: Vec<f64> = tower.particles().iter().map(|p| p.position.z).collect();
            assert!(zs.windows(2).all(|w| w[0] <= w[1]));
            assert!(tower.num_dummies() < 4);
            real += tower.particles().iter().filter(|p| !p.is_dummy()).count();
        }
        assert_eq!(real, 103);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut vcl = random_container(200, 11);
        vcl.rebuild();
        let il2 = 1.2f64 * 1.2;

        let mut located = Vec::new();
        for (ti, tower) in vcl.towers().iter().enumerate() {
            for (k, p) in tower.particles().iter().enumerate() {
                if !p.is_dummy() {
                    located.push((p.position, ti, k / 4));
                }
            }
        }
        for a in &located {
            for b in &located {
                if (a.0 - b.0).norm_squared() <= il2 {
                    let list = vcl.cluster_neighbors(a.1, a.2);
                    assert!(list.contains(&(b.1 as u32, b.2 as u32)));
                }
            }
        }
    }

    #[test]
    fn test_neighbor_lists_are_symmetric() {
        let mut vcl = random_container(150, 3);
        vcl.rebuild();
        for (ti, tower) in vcl.towers().iter().enumerate() {
            for ci in 0..tower.num_clusters() {
                for &(tj, cj) in vcl.cluster_neighbors(ti, ci) {
                    let back = vcl.cluster_neighbors(tj as usize, cj as usize);
                    assert!(back.contains(&(ti as u32, ci as u32)));
                }
            }
        }
    }
}
