mod common;

use approx::assert_relative_eq;
use common::{SoftSpring, naive_forces, random_particles_in};
use pairtune_rs::config::{get_parallel_threshold, get_slice_count, set_parallel_threshold, set_slice_count};
use pairtune_rs::traversal::sliced::slab_plan;
use pairtune_rs::{
    Configuration, ContainerOption, ContainerParams, DataLayoutOption, Newton3Option, ParticleContainer,
    TraversalOption,
};
use std::sync::{Mutex, MutexGuard, PoisonError};

// The slicing knobs are process-global.
static KNOBS: Mutex<()> = Mutex::new(());

fn knobs() -> MutexGuard<'static, ()> {
    KNOBS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restores the default knobs when dropped, also on a failed assertion.
struct ResetKnobs(usize);

impl Drop for ResetKnobs {
    fn drop(&mut self) {
        set_parallel_threshold(self.0);
        set_slice_count(0);
    }
}

const BOX: [f64; 3] = [12.0, 4.0, 4.0];
const CUTOFF: f64 = 1.0;

fn sliced_configurations() -> Vec<Configuration> {
    use DataLayoutOption::*;
    use Newton3Option::*;
    use TraversalOption::*;
    let lc = ContainerOption::LinkedCells;
    let vl = ContainerOption::VerletLists;
    let vlc = ContainerOption::VerletListsCells;
    let vcl = ContainerOption::VerletClusterLists;
    vec![
        Configuration::new(lc, 1.0, Sliced, Aos, Enabled),
        Configuration::new(lc, 1.0, Sliced, Soa, Disabled),
        Configuration::new(vl, 1.0, VerletLists, Aos, Enabled),
        Configuration::new(vlc, 1.0, VlcSliced, Aos, Enabled),
        Configuration::new(vlc, 1.0, VlcSliced, Aos, Disabled),
        Configuration::new(vlc, 1.0, VlcC18, Aos, Enabled),
        Configuration::new(vcl, 1.0, VerletClustersSliced, Aos, Enabled).with_cluster_size(4),
        Configuration::new(vcl, 1.0, VerletClustersSliced, Soa, Disabled).with_cluster_size(4),
    ]
}

#[test]
fn test_slice_count_override() {
    let _guard = knobs();
    let _reset = ResetKnobs(get_parallel_threshold());
    set_slice_count(3);
    assert_eq!(get_slice_count(), 3);
    set_slice_count(0);
    assert_eq!(get_slice_count(), rayon::current_num_threads());
}

#[test]
fn test_forced_slice_counts_match_brute_force() {
    let _guard = knobs();
    let _reset = ResetKnobs(get_parallel_threshold());
    set_parallel_threshold(0);

    let params = ContainerParams::new([0.0; 3], BOX, CUTOFF);
    let particles = random_particles_in(400, BOX, 21);
    let spring = SoftSpring { cutoff: CUTOFF, k: 3.0 };
    let expected = naive_forces(&particles, &spring);

    for slices in [2, 3, 5] {
        set_slice_count(slices);
        // 14 cells along x with the halo layer, so 13 base layers.
        assert!(slab_plan(13, 2, slices).is_some_and(|plan| plan.len() == slices));
        for config in sliced_configurations() {
            let mut container = ParticleContainer::for_configuration(&config, &params).unwrap();
            for p in &particles {
                container.add_particle(*p).unwrap();
            }
            let mut functor = SoftSpring { cutoff: CUTOFF, k: 3.0 };
            container.iterate_pairwise(&mut functor, &config).unwrap();
            let out = container.into_particles();
            assert_eq!(out.len(), particles.len(), "{config} with {slices} slices");
            for p in out {
                assert_relative_eq!(p.force, expected[&p.id], epsilon = 1e-9, max_relative = 1e-9);
            }
        }
    }
}

#[test]
fn test_repeated_sliced_steps_reuse_lists() {
    let _guard = knobs();
    let _reset = ResetKnobs(get_parallel_threshold());
    set_parallel_threshold(0);
    set_slice_count(4);

    let params = ContainerParams::new([0.0; 3], BOX, CUTOFF)
        .with_skin(0.2)
        .with_rebuild_frequency(5);
    let particles = random_particles_in(300, BOX, 5);
    let spring = SoftSpring { cutoff: CUTOFF, k: 1.0 };
    let expected = naive_forces(&particles, &spring);
    let config = Configuration::new(
        ContainerOption::VerletListsCells,
        1.0,
        TraversalOption::VlcSliced,
        DataLayoutOption::Aos,
        Newton3Option::Enabled,
    );
    let mut container = ParticleContainer::for_configuration(&config, &params).unwrap();
    for p in &particles {
        container.add_particle(*p).unwrap();
    }
    let mut functor = SoftSpring { cutoff: CUTOFF, k: 1.0 };
    for step in 1..=3 {
        container.iterate_pairwise(&mut functor, &config).unwrap();
        container.for_each(|p| {
            assert_relative_eq!(p.force, expected[&p.id] * step as f64, epsilon = 1e-9, max_relative = 1e-9);
        });
    }
    let ParticleContainer::VerletListsCells(vlc) = &container else {
        unreachable!()
    };
    assert_eq!(vlc.rebuild_count(), 1);
}
