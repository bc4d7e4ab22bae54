mod common;

use approx::assert_relative_eq;
use common::{
    PairRecorder, SoftSpring, all_configurations, halo_shell, naive_forces, naive_pairs, random_particles, run,
};
use nalgebra::Vector3;
use pairtune_rs::{ContainerParams, Particle, ParticleContainer};
use proptest::prelude::*;

const CUTOFF: f64 = 1.2;

fn params() -> ContainerParams {
    ContainerParams::new([0.0; 3], [6.0; 3], CUTOFF).with_skin(0.3)
}

fn check_pairs(particles: &[Particle]) {
    let expected = naive_pairs(particles, CUTOFF);
    for config in all_configurations() {
        let mut recorder = PairRecorder::new(CUTOFF);
        run(&config, &params(), particles, &mut recorder);
        if config.newton3.is_enabled() {
            let counts = recorder.unordered_counts();
            let got: Vec<(u64, u64)> = counts.keys().copied().collect();
            assert_eq!(got, expected, "{config}");
            assert!(counts.values().all(|&n| n == 1), "{config}: pair evaluated twice");
        } else {
            let counts = recorder.ordered_counts();
            assert_eq!(counts.len(), 2 * expected.len(), "{config}");
            for &(i, j) in &expected {
                assert_eq!(counts.get(&(i, j)), Some(&1), "{config}: ({i}, {j})");
                assert_eq!(counts.get(&(j, i)), Some(&1), "{config}: ({j}, {i})");
            }
        }
    }
}

#[test]
fn test_every_configuration_matches_brute_force_pairs() {
    check_pairs(&random_particles(300, 6.0, 42));
}

#[test]
fn test_every_configuration_matches_brute_force_forces() {
    let particles = random_particles(250, 6.0, 7);
    let spring = SoftSpring { cutoff: CUTOFF, k: 2.0 };
    let expected = naive_forces(&particles, &spring);
    for config in all_configurations() {
        let mut functor = SoftSpring { cutoff: CUTOFF, k: 2.0 };
        let out = run(&config, &params(), &particles, &mut functor);
        assert_eq!(out.len(), particles.len(), "{config}");
        for p in out {
            assert_relative_eq!(p.force, expected[&p.id], epsilon = 1e-9, max_relative = 1e-9);
        }
    }
}

#[test]
fn test_owned_forces_include_halo_neighbours() {
    let params = params();
    let width = params.interaction_length();
    let owned = random_particles(300, 6.0, 11);
    let halo = halo_shell(250, 6.0, width, 1000, 12);
    let spring = SoftSpring { cutoff: CUTOFF, k: 2.0 };
    let all: Vec<Particle> = owned.iter().chain(&halo).copied().collect();
    let expected = naive_forces(&all, &spring);

    for config in all_configurations() {
        let mut container = ParticleContainer::for_configuration(&config, &params).unwrap();
        for p in &owned {
            container.add_particle(*p).unwrap();
        }
        for p in &halo {
            container.add_halo_particle(*p);
        }
        let mut functor = SoftSpring { cutoff: CUTOFF, k: 2.0 };
        container.iterate_pairwise(&mut functor, &config).unwrap();

        let mut seen = 0;
        container.for_each(|p| {
            if p.is_halo() {
                return;
            }
            seen += 1;
            assert_relative_eq!(p.force, expected[&p.id], epsilon = 1e-9, max_relative = 1e-9);
        });
        assert_eq!(seen, owned.len(), "{config}");
    }
}

#[test]
fn test_empty_and_single_particle_containers() {
    check_pairs(&[]);
    check_pairs(&[Particle::at(0, [3.0, 3.0, 3.0])]);
}

#[test]
fn test_three_particles_one_pair() {
    let particles = [
        Particle::at(0, [0.0, 0.0, 0.0]),
        Particle::at(1, [1.0, 0.0, 0.0]),
        Particle::at(2, [5.0, 5.0, 5.0]),
    ];
    let params = ContainerParams::new([0.0; 3], [8.0; 3], 2.0);
    for config in all_configurations() {
        let mut recorder = PairRecorder::new(2.0);
        run(&config, &params, &particles, &mut recorder);
        let pairs: Vec<(u64, u64)> = recorder.pairs().iter().map(|&(i, j, _)| (i, j)).collect();
        if config.newton3.is_enabled() {
            assert!(pairs == vec![(0, 1)] || pairs == vec![(1, 0)], "{config}: {pairs:?}");
        } else {
            assert_eq!(pairs, vec![(0, 1), (1, 0)], "{config}");
        }
    }
}

#[test]
fn test_dense_corner_cluster() {
    // Everything in one corner cell plus a few strays.
    let mut particles: Vec<Particle> = random_particles(60, 1.0, 3);
    particles.extend(random_particles(20, 6.0, 4).into_iter().map(|mut p| {
        p.id += 60;
        p
    }));
    check_pairs(&particles);
}

#[test]
fn test_particles_on_cell_faces() {
    // Coordinates on multiples of the cell length exercise the half-open binning.
    let mut particles = Vec::new();
    for (id, x) in [0.0, 1.5, 3.0, 4.5].into_iter().enumerate() {
        particles.push(Particle::new(id as u64, Vector3::new(x, 1.5, 1.5), Vector3::zeros(), 0));
    }
    check_pairs(&particles);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_traversals_agree_with_brute_force(
        positions in prop::collection::vec((0.0..6.0f64, 0.0..6.0f64, 0.0..6.0f64), 0..40)
    ) {
        let particles: Vec<Particle> = positions
            .iter()
            .enumerate()
            .map(|(i, &(x, y, z))| Particle::at(i as u64, [x, y, z]))
            .collect();
        check_pairs(&particles);
    }
}
