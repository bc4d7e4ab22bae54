#![allow(dead_code)]

use nalgebra::Vector3;
use pairtune_rs::options::{applicable_data_layouts, applicable_traversals};
use pairtune_rs::{
    Configuration, ContainerOption, ContainerParams, Newton3Option, PairwiseFunctor, Particle,
    ParticleContainer,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Records every pair within the cutoff, dummies excluded.
pub struct PairRecorder {
    cutoff: f64,
    pairs: Mutex<Vec<(u64, u64, bool)>>,
}

impl PairRecorder {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff,
            pairs: Mutex::new(Vec::new()),
        }
    }

    pub fn pairs(&self) -> Vec<(u64, u64, bool)> {
        let mut pairs = self.pairs.lock().unwrap().clone();
        pairs.sort_by_key(|&(i, j, _)| (i, j));
        pairs
    }

    /// How often each ordered `(i, j)` was evaluated.
    pub fn ordered_counts(&self) -> BTreeMap<(u64, u64), usize> {
        let mut counts = BTreeMap::new();
        for (i, j, _) in self.pairs() {
            *counts.entry((i, j)).or_insert(0) += 1;
        }
        counts
    }

    /// How often each unordered pair was evaluated.
    pub fn unordered_counts(&self) -> BTreeMap<(u64, u64), usize> {
        let mut counts = BTreeMap::new();
        for (i, j, _) in self.pairs() {
            *counts.entry((i.min(j), i.max(j))).or_insert(0) += 1;
        }
        counts
    }
}

impl PairwiseFunctor for PairRecorder {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn aos_pair(&self, i: &mut Particle, j: &mut Particle, newton3: bool) {
        if i.is_dummy() || j.is_dummy() {
            return;
        }
        if (i.position - j.position).norm_squared() > self.cutoff * self.cutoff {
            return;
        }
        self.pairs.lock().unwrap().push((i.id, j.id, newton3));
    }
}

/// Linear repulsive spring `k (cutoff - r)` along the separation.
pub struct SoftSpring {
    pub cutoff: f64,
    pub k: f64,
}

impl SoftSpring {
    pub fn force(&self, ri: &Vector3<f64>, rj: &Vector3<f64>) -> Option<Vector3<f64>> {
        let d = ri - rj;
        let r = d.norm();
        (r > 0.0 && r <= self.cutoff).then(|| d * (self.k * (self.cutoff - r) / r))
    }
}

impl PairwiseFunctor for SoftSpring {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn aos_pair(&self, i: &mut Particle, j: &mut Particle, newton3: bool) {
        if i.is_dummy() || j.is_dummy() {
            return;
        }
        if let Some(f) = self.force(&i.position, &j.position) {
            i.add_force(&f);
            if newton3 {
                j.sub_force(&f);
            }
        }
    }
}

pub fn random_particles(n: usize, box_max: f64, seed: u64) -> Vec<Particle> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n as u64)
        .map(|id| {
            let p = Vector3::new(
                rng.gen_range(0.0..box_max),
                rng.gen_range(0.0..box_max),
                rng.gen_range(0.0..box_max),
            );
            Particle::new(id, p, Vector3::zeros(), 0)
        })
        .collect()
}

/// Uniform particles in `[0, box_max)`, ids from 0.
pub fn random_particles_in(n: usize, box_max: [f64; 3], seed: u64) -> Vec<Particle> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n as u64)
        .map(|id| {
            let p = Vector3::from_fn(|d, _| rng.gen_range(0.0..box_max[d]));
            Particle::new(id, p, Vector3::zeros(), 0)
        })
        .collect()
}

/// `n` particles in the shell of `width` around the cube `[0, box_max)`,
/// ids from `first_id`.
pub fn halo_shell(n: usize, box_max: f64, width: f64, first_id: u64, seed: u64) -> Vec<Particle> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let p = Vector3::from_fn(|_, _| rng.gen_range(-width..box_max + width));
        if p.iter().all(|&x| (0.0..box_max).contains(&x)) {
            continue;
        }
        out.push(Particle::new(first_id + out.len() as u64, p, Vector3::zeros(), 0));
    }
    out
}

/// Simple cubic lattice with spacing `a`, jittered by up to `jitter`.
pub fn jittered_lattice(per_dim: usize, a: f64, jitter: f64, seed: u64) -> Vec<Particle> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(per_dim.pow(3));
    for x in 0..per_dim {
        for y in 0..per_dim {
            for z in 0..per_dim {
                let base = Vector3::new(x as f64, y as f64, z as f64).add_scalar(0.5) * a;
                let offset = Vector3::new(
                    rng.gen_range(-jitter..=jitter),
                    rng.gen_range(-jitter..=jitter),
                    rng.gen_range(-jitter..=jitter),
                );
                out.push(Particle::new(out.len() as u64, base + offset, Vector3::zeros(), 0));
            }
        }
    }
    out
}

/// Unordered pairs within `cutoff` by brute force.
pub fn naive_pairs(particles: &[Particle], cutoff: f64) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    for (a, pa) in particles.iter().enumerate() {
        for pb in &particles[a + 1..] {
            if (pa.position - pb.position).norm_squared() <= cutoff * cutoff {
                out.push((pa.id.min(pb.id), pa.id.max(pb.id)));
            }
        }
    }
    out.sort();
    out
}

pub fn naive_forces(particles: &[Particle], spring: &SoftSpring) -> BTreeMap<u64, Vector3<f64>> {
    let mut forces: BTreeMap<u64, Vector3<f64>> = particles.iter().map(|p| (p.id, Vector3::zeros())).collect();
    for (a, pa) in particles.iter().enumerate() {
        for pb in &particles[a + 1..] {
            if let Some(f) = spring.force(&pa.position, &pb.position) {
                *forces.get_mut(&pa.id).unwrap() += f;
                *forces.get_mut(&pb.id).unwrap() -= f;
            }
        }
    }
    forces
}

/// Every valid configuration, with cell size factors 1 and 1.5 and cluster
/// sizes 1, 4 and 8.
pub fn all_configurations() -> Vec<Configuration> {
    let mut out = Vec::new();
    for container in ContainerOption::ALL {
        for &traversal in applicable_traversals(container) {
            for &layout in applicable_data_layouts(container) {
                for newton3 in Newton3Option::ALL {
                    if !traversal.supports_newton3(newton3) {
                        continue;
                    }
                    let base = Configuration::new(container, 1.0, traversal, layout, newton3);
                    if container.uses_cell_size_factor() {
                        out.push(base.clone());
                        out.push(Configuration {
                            cell_size_factor: 1.5,
                            ..base
                        });
                    } else if container.uses_cluster_size() {
                        for n in [1, 4, 8] {
                            out.push(base.clone().with_cluster_size(n));
                        }
                    } else {
                        out.push(base);
                    }
                }
            }
        }
    }
    out
}

pub fn run<F: PairwiseFunctor>(
    config: &Configuration,
    params: &ContainerParams,
    particles: &[Particle],
    functor: &mut F,
) -> Vec<Particle> {
    let mut container = ParticleContainer::for_configuration(config, params).unwrap();
    for p in particles {
        container.add_particle(*p).unwrap();
    }
    container.iterate_pairwise(functor, config).unwrap();
    container.into_particles()
}
