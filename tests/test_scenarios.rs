mod common;

use approx::assert_relative_eq;
use common::{jittered_lattice, random_particles};
use nalgebra::Vector3;
use pairtune_rs::integrator::{position_update, velocity_update};
use pairtune_rs::octree::child_bounds;
use pairtune_rs::transport::{deserialize_particles, serialize_particles};
use pairtune_rs::{
    AdaptiveOctree, Configuration, ContainerOption, ContainerParams, DataLayoutOption, LennardJones,
    Newton3Option, OctreeParams, Particle, ParticleContainer, ParticleProperties, TraversalOption,
};

fn globals(config: &Configuration, particles: &[Particle], params: &ContainerParams) -> (f64, f64) {
    let mut functor = LennardJones::new(params.cutoff, 1.0, 1.0, true).with_globals();
    common::run(config, params, particles, &mut functor);
    (functor.potential_energy().unwrap(), functor.virial().unwrap())
}

#[test]
fn test_newton3_on_and_off_agree_on_globals() {
    let particles = jittered_lattice(6, 1.1, 0.1, 21);
    let params = ContainerParams::new([0.0; 3], [6.6; 3], 2.5).with_skin(0.2);
    let pairs = [
        (ContainerOption::DirectSum, TraversalOption::DirectSum),
        (ContainerOption::LinkedCells, TraversalOption::C08),
        (ContainerOption::LinkedCells, TraversalOption::C18),
        (ContainerOption::LinkedCells, TraversalOption::Sliced),
        (ContainerOption::VerletClusterLists, TraversalOption::VerletClusters),
        (ContainerOption::VerletClusterLists, TraversalOption::VerletClustersSliced),
    ];
    let reference = globals(
        &Configuration::new(
            ContainerOption::DirectSum,
            1.0,
            TraversalOption::DirectSum,
            DataLayoutOption::Aos,
            Newton3Option::Enabled,
        ),
        &particles,
        &params,
    );
    assert!(reference.0 < 0.0);
    for (container, traversal) in pairs {
        for layout in DataLayoutOption::ALL {
            for newton3 in Newton3Option::ALL {
                let config = Configuration::new(container, 1.0, traversal, layout, newton3);
                let (upot, virial) = globals(&config, &particles, &params);
                assert_relative_eq!(upot, reference.0, max_relative = 1e-9);
                assert_relative_eq!(virial, reference.1, max_relative = 1e-9);
            }
        }
    }
    let c01 = Configuration::new(
        ContainerOption::LinkedCells,
        1.0,
        TraversalOption::C01,
        DataLayoutOption::Soa,
        Newton3Option::Disabled,
    );
    let (upot, _) = globals(&c01, &particles, &params);
    assert_relative_eq!(upot, reference.0, max_relative = 1e-9);

    for (traversal, newton3) in [
        (TraversalOption::VlcC01, Newton3Option::Disabled),
        (TraversalOption::VlcC18, Newton3Option::Disabled),
        (TraversalOption::VlcC18, Newton3Option::Enabled),
        (TraversalOption::VlcSliced, Newton3Option::Disabled),
        (TraversalOption::VlcSliced, Newton3Option::Enabled),
    ] {
        let config = Configuration::new(
            ContainerOption::VerletListsCells,
            1.0,
            traversal,
            DataLayoutOption::Aos,
            newton3,
        );
        let (upot, virial) = globals(&config, &particles, &params);
        assert_relative_eq!(upot, reference.0, max_relative = 1e-9);
        assert_relative_eq!(virial, reference.1, max_relative = 1e-9);
    }
}

#[test]
fn test_cluster_lists_rebuild_every_third_traversal() {
    let params = ContainerParams::new([0.0; 3], [5.0; 3], 1.0)
        .with_skin(0.2)
        .with_rebuild_frequency(3);
    let config = Configuration::new(
        ContainerOption::VerletClusterLists,
        1.0,
        TraversalOption::VerletClusters,
        DataLayoutOption::Aos,
        Newton3Option::Enabled,
    );
    let mut container = ParticleContainer::for_configuration(&config, &params).unwrap();
    for p in random_particles(100, 5.0, 1) {
        container.add_particle(p).unwrap();
    }
    let rebuilds = |c: &ParticleContainer| match c {
        ParticleContainer::VerletClusterLists(vcl) => vcl.rebuild_count(),
        _ => unreachable!(),
    };
    let mut functor = LennardJones::new(1.0, 1.0, 0.5, false);
    let mut counts = Vec::new();
    for _ in 0..7 {
        container.iterate_pairwise(&mut functor, &config).unwrap();
        counts.push(rebuilds(&container));
    }
    assert_eq!(counts, vec![1, 1, 1, 2, 2, 2, 3]);

    // Adding a particle marks the lists dirty.
    container.add_particle(Particle::at(1000, [2.5, 2.5, 2.5])).unwrap();
    container.iterate_pairwise(&mut functor, &config).unwrap();
    assert_eq!(rebuilds(&container), 4);
}

#[test]
fn test_octree_only_crowded_octant_subdivides() {
    let mut positions = vec![Vector3::new(1.0, 1.0, 1.0), Vector3::new(3.0, 3.0, 3.0)];
    for code in 1..8u8 {
        let (lo, hi) = child_bounds(&Vector3::zeros(), &Vector3::repeat(8.0), code);
        positions.push(0.5 * (lo + hi));
    }
    let params = OctreeParams {
        max_particles_per_node: 1,
        ..OctreeParams::default()
    };
    let tree = AdaptiveOctree::build(&positions, [0.0; 3], [8.0; 3], params).unwrap();
    let children = *tree.root().children().unwrap();
    let internal: Vec<u8> = children
        .iter()
        .filter(|&&c| !tree[c].is_leaf())
        .map(|&c| tree[c].child_code())
        .collect();
    assert_eq!(internal, vec![0]);
    for node in tree.nodes() {
        assert!(node.near_field_list().is_disjoint(node.interaction_list()));
    }
}

#[test]
fn test_short_md_run_conserves_energy() {
    let mut properties = ParticleProperties::new(2.5, true);
    properties.add_type(1.0, 1.0, 1.0);
    let params = ContainerParams::new([0.0; 3], [8.0; 3], 2.5).with_skin(0.3);
    let config = Configuration::new(
        ContainerOption::LinkedCells,
        1.0,
        TraversalOption::C08,
        DataLayoutOption::Soa,
        Newton3Option::Enabled,
    );
    let mut container = ParticleContainer::for_configuration(&config, &params).unwrap();
    for p in jittered_lattice(5, 1.5, 0.05, 2) {
        container.add_particle(p).unwrap();
    }

    let total_energy = |container: &mut ParticleContainer, properties: &ParticleProperties| {
        let mut functor = LennardJones::with_properties(properties.clone()).with_globals();
        // Forces are recomputed into zeroed slots.
        container.for_each_mut(|p| p.force = Vector3::zeros());
        container.iterate_pairwise(&mut functor, &config).unwrap();
        let mut kinetic = 0.0;
        container.for_each(|p| kinetic += 0.5 * p.velocity.norm_squared());
        functor.potential_energy().unwrap() + kinetic
    };

    let start = total_energy(&mut container, &properties);
    let dt = 0.002;
    let mut functor = LennardJones::with_properties(properties.clone());
    for _ in 0..50 {
        position_update(&mut container, &properties, dt).unwrap();
        container.iterate_pairwise(&mut functor, &config).unwrap();
        velocity_update(&mut container, &properties, dt).unwrap();
    }
    let leaving = container.update_container();
    assert!(leaving.is_empty());
    let end = total_energy(&mut container, &properties);
    assert_relative_eq!(end, start, max_relative = 1e-3);
}

#[test]
fn test_particles_survive_transport_between_containers() {
    let params = ContainerParams::new([0.0; 3], [4.0; 3], 1.0);
    let mut source = ParticleContainer::new(ContainerOption::LinkedCells, &params, 1.0, None).unwrap();
    for p in random_particles(50, 4.0, 9) {
        source.add_particle(p).unwrap();
    }
    let mut outgoing = Vec::new();
    source.for_each(|p| outgoing.push(*p));
    let bytes = serialize_particles(&outgoing);
    assert_eq!(bytes.len(), 50 * 120);

    let mut target = ParticleContainer::new(ContainerOption::VerletClusterLists, &params, 1.0, Some(4)).unwrap();
    for p in deserialize_particles(&bytes).unwrap() {
        target.add_particle(p).unwrap();
    }
    let mut incoming = Vec::new();
    target.for_each(|p| incoming.push(*p));
    outgoing.sort_by_key(|p| p.id);
    incoming.sort_by_key(|p| p.id);
    assert_eq!(incoming, outgoing);
}
