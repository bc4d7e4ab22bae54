//! Density-adaptive octree for the far field of a fast multipole solver.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Node ids are
//! assigned breadth first, so a parent always precedes its children.

mod coefficients;
mod node;

pub use coefficients::Coefficients;
pub use node::{NodeId, OctreeNode, child_bounds, child_code_for_point};

use crate::error::OctreeError;
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::ops::Index;
use tracing::{debug, info_span, trace, warn};

/// Subdivision stops here even with an unbounded `max_depth`; beyond it the
/// node edges drop below f64 resolution of the root.
pub const DEPTH_LIMIT: usize = 48;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OctreeParams {
    pub max_particles_per_node: usize,
    #[serde(default)]
    pub min_depth: usize,
    /// `None` subdivides until the capacity holds.
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Expansion order of the multipole and local coefficients.
    #[serde(default)]
    pub order: usize,
}

impl Default for OctreeParams {
    fn default() -> Self {
        Self {
            max_particles_per_node: 8,
            min_depth: 0,
            max_depth: None,
            order: 4,
        }
    }
}

impl OctreeParams {
    pub fn validate(&self) -> Result<(), OctreeError> {
        if self.max_particles_per_node == 0 {
            return Err(OctreeError::InvalidCapacity);
        }
        Ok(())
    }

    fn should_split(&self, depth: usize, count: usize) -> bool {
        if depth >= DEPTH_LIMIT {
            return false;
        }
        depth < self.min_depth
            || (count > self.max_particles_per_node && self.max_depth.is_none_or(|m| depth < m))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OctreeStats {
    pub num_nodes: usize,
    pub num_leaves: usize,
    pub max_depth: usize,
    /// Sum of near-field list lengths over all nodes.
    pub near_field_entries: usize,
    pub interaction_entries: usize,
    /// Particles outside the root box.
    pub skipped_particles: usize,
}

#[derive(Clone, Debug)]
pub struct AdaptiveOctree {
    nodes: Vec<OctreeNode>,
    params: OctreeParams,
    skipped_particles: usize,
}

impl AdaptiveOctree {
    pub const ROOT: NodeId = 0;

    /// Builds the tree over `positions` and all node lists. Particles are
    /// assigned half-open, `min <= p < max`; those outside the box are
    /// skipped.
    pub fn build(
        positions: &[Vector3<f64>],
        box_min: [f64; 3],
        box_max: [f64; 3],
        params: OctreeParams,
    ) -> Result<Self, OctreeError> {
        params.validate()?;
        let valid_box = (0..3).all(|d| box_min[d].is_finite() && box_max[d].is_finite() && box_max[d] > box_min[d]);
        if !valid_box {
            return Err(OctreeError::InvalidBox {
                min: box_min,
                max: box_max,
            });
        }
        let _span = info_span!("AdaptiveOctree::build", n_particles = positions.len()).entered();

        let mut root = OctreeNode::new(
            None,
            0,
            0,
            Vector3::from(box_min),
            Vector3::from(box_max),
            params.order,
        );
        let mut skipped_particles = 0;
        for (i, p) in positions.iter().enumerate() {
            if root.contains(p) {
                root.particles.push(i);
            } else {
                trace!(index = i, position = ?p, "particle outside the octree box");
                skipped_particles += 1;
            }
        }
        root.particle_count = root.particles.len();

        let mut nodes = vec![root];
        let mut queue = VecDeque::from([Self::ROOT]);
        while let Some(id) = queue.pop_front() {
            let node = &mut nodes[id];
            if !params.should_split(node.depth, node.particle_count) {
                if node.depth >= DEPTH_LIMIT && node.particle_count > params.max_particles_per_node {
                    warn!(node = id, count = node.particle_count, "depth limit reached, leaf over capacity");
                }
                continue;
            }
            let particles = std::mem::take(&mut node.particles);
            let (min, max, depth) = (node.min, node.max, node.depth);
            let center = node.center();

            let mut buckets: [Vec<usize>; 8] = Default::default();
            for i in particles {
                buckets[usize::from(child_code_for_point(&center, &positions[i]))].push(i);
            }
            let first = nodes.len();
            for (code, bucket) in buckets.into_iter().enumerate() {
                let (lo, hi) = child_bounds(&min, &max, code as u8);
                let mut child = OctreeNode::new(Some(id), depth + 1, code as u8, lo, hi, params.order);
                child.particle_count = bucket.len();
                child.particles = bucket;
                nodes.push(child);
                queue.push_back(first + code);
            }
            nodes[id].children = Some(std::array::from_fn(|c| first + c));
        }

        let mut tree = Self {
            nodes,
            params,
            skipped_particles,
        };
        tree.build_lists();
        let stats = tree.stats();
        debug!(
            nodes = stats.num_nodes,
            leaves = stats.num_leaves,
            depth = stats.max_depth,
            "octree built"
        );
        Ok(tree)
    }

    /// Neighbour lists first, then near-field and interaction lists, which
    /// read the parents' neighbour lists.
    fn build_lists(&mut self) {
        let neighbours: Vec<BTreeSet<NodeId>> = (0..self.nodes.len())
            .into_par_iter()
            .map(|id| self.neighbours_of(id))
            .collect();
        for (node, list) in self.nodes.iter_mut().zip(neighbours) {
            node.neighbour_list = list;
        }

        let far: Vec<(BTreeSet<NodeId>, BTreeSet<NodeId>)> = (0..self.nodes.len())
            .into_par_iter()
            .map(|id| self.near_and_interaction_of(id))
            .collect();
        for (node, (near, interaction)) in self.nodes.iter_mut().zip(far) {
            node.near_field_list = near;
            node.interaction_list = interaction;
        }
    }

    fn neighbours_of(&self, id: NodeId) -> BTreeSet<NodeId> {
        let node = &self.nodes[id];
        let center = node.center();
        let size = node.size();
        let mut list = BTreeSet::from([id]);
        for dx in -1i32..=1 {
            for dy in -1i32..=1 {
                for dz in -1i32..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let sample_point = center
                        + Vector3::new(
                            f64::from(dx) * size.x,
                            f64::from(dy) * size.y,
                            f64::from(dz) * size.z,
                        );
                    if let Some(n) = self.find_node(&sample_point, node.depth) {
                        list.insert(n);
                    }
                }
            }
        }
        list
    }

    fn near_and_interaction_of(&self, id: NodeId) -> (BTreeSet<NodeId>, BTreeSet<NodeId>) {
        let node = &self.nodes[id];
        let mut near = node.neighbour_list.clone();
        let mut interaction = BTreeSet::new();
        let Some(parent) = node.parent else {
            return (near, interaction);
        };
        let parent_depth = self.nodes[parent].depth;
        for &pn in &self.nodes[parent].neighbour_list {
            let candidate = &self.nodes[pn];
            match candidate.children {
                Some(children) if candidate.depth == parent_depth => {
                    interaction.extend(children.into_iter().filter(|c| !node.neighbour_list.contains(c)));
                }
                _ => {
                    if !node.neighbour_list.contains(&pn) {
                        near.insert(pn);
                    }
                }
            }
        }
        (near, interaction)
    }

    /// Descends from the root towards `position`, stopping at a leaf or at
    /// `max_depth`. `None` outside the root box.
    pub fn find_node(&self, position: &Vector3<f64>, max_depth: usize) -> Option<NodeId> {
        if !self.nodes[Self::ROOT].contains(position) {
            return None;
        }
        let mut id = Self::ROOT;
        loop {
            let node = &self.nodes[id];
            if node.depth >= max_depth {
                return Some(id);
            }
            match node.children {
                Some(children) => id = children[usize::from(child_code_for_point(&node.center(), position))],
                None => return Some(id),
            }
        }
    }

    pub fn find_leaf(&self, position: &Vector3<f64>) -> Option<NodeId> {
        self.find_node(position, usize::MAX)
    }

    pub fn params(&self) -> &OctreeParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    pub fn get(&self, id: NodeId) -> Option<&OctreeNode> {
        self.nodes.get(id)
    }

    /// Mutable access for writing coefficients.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut OctreeNode> {
        self.nodes.get_mut(id)
    }

    pub fn root(&self) -> &OctreeNode {
        &self.nodes[Self::ROOT]
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(id, _)| id)
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.nodes.get(c).and_then(|n| n.parent);
        }
        false
    }

    /// Child codes from the root down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<u8> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(node) = self.nodes.get(current) {
            let Some(parent) = node.parent else { break };
            path.push(node.child_code);
            current = parent;
        }
        path.reverse();
        path
    }

    pub fn clear_coefficients(&mut self) {
        for node in &mut self.nodes {
            node.multipole.clear();
            node.local.clear();
        }
    }

    pub fn stats(&self) -> OctreeStats {
        let mut stats = OctreeStats {
            num_nodes: self.nodes.len(),
            skipped_particles: self.skipped_particles,
            ..OctreeStats::default()
        };
        for node in &self.nodes {
            if node.is_leaf() {
                stats.num_leaves += 1;
            }
            stats.max_depth = stats.max_depth.max(node.depth);
            stats.near_field_entries += node.near_field_list.len();
            stats.interaction_entries += node.interaction_list.len();
        }
        stats
    }
}

impl Index<NodeId> for AdaptiveOctree {
    type Output = OctreeNode;

    fn index(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Complex;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn params(capacity: usize) -> OctreeParams {
        OctreeParams {
            max_particles_per_node: capacity,
            ..OctreeParams::default()
        }
    }

    fn random_positions(n: usize, seed: u64) -> Vec<Vector3<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                // Clustered towards the origin so the tree is irregular.
                let r: f64 = rng.r#gen::<f64>().powi(3);
                Vector3::new(r * rng.r#gen::<f64>(), r * rng.r#gen::<f64>(), rng.r#gen::<f64>() * 0.5 + 0.25 * r)
            })
            .collect()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert_eq!(
            AdaptiveOctree::build(&[], [0.0; 3], [1.0; 3], params(0)).unwrap_err(),
            OctreeError::InvalidCapacity
        );
        assert!(matches!(
            AdaptiveOctree::build(&[], [0.0; 3], [1.0, 0.0, 1.0], params(1)),
            Err(OctreeError::InvalidBox { .. })
        ));
    }

    #[test]
    fn test_empty_tree_is_a_single_leaf() {
        let tree = AdaptiveOctree::build(&[], [0.0; 3], [1.0; 3], params(1)).unwrap();
        assert_eq!(tree.len(), 1);
        let root = tree.root();
        assert!(root.is_leaf());
        assert_eq!(root.neighbour_list(), &BTreeSet::from([0]));
        assert_eq!(root.near_field_list(), &BTreeSet::from([0]));
        assert!(root.interaction_list().is_empty());
    }

    #[test]
    fn test_only_crowded_octant_subdivides() {
        let mut positions = vec![Vector3::new(0.1, 0.1, 0.1), Vector3::new(0.4, 0.4, 0.4)];
        for code in 1..8u8 {
            let (lo, hi) = child_bounds(&Vector3::zeros(), &Vector3::repeat(1.0), code);
            positions.push(0.5 * (lo + hi));
        }
        let tree = AdaptiveOctree::build(&positions, [0.0; 3], [1.0; 3], params(1)).unwrap();
        let stats = tree.stats();
        assert_eq!(stats.num_nodes, 17);
        assert_eq!(stats.num_leaves, 15);
        assert_eq!(stats.max_depth, 2);

        let children = tree.root().children().copied().unwrap();
        assert!(!tree[children[0]].is_leaf());
        assert_eq!(tree[children[0]].particle_count(), 2);
        for &c in &children[1..] {
            assert!(tree[c].is_leaf());
            assert_eq!(tree[c].particle_count(), 1);
        }

        // A depth-2 node sees its siblings as neighbours and the other
        // octants, which are leaves, in its near field.
        let grandchild = tree[children[0]].child(0).unwrap();
        assert_eq!(tree.path(grandchild), vec![0, 0]);
        assert_eq!(tree[grandchild].neighbour_list().len(), 8);
        assert_eq!(tree[grandchild].near_field_list().len(), 15);
        assert!(tree[grandchild].interaction_list().is_empty());
        assert_eq!(tree[children[7]].neighbour_list().len(), 8);
    }

    #[test]
    fn test_uniform_tree_interaction_lists() {
        let p = OctreeParams {
            max_particles_per_node: 1,
            min_depth: 2,
            max_depth: Some(2),
            order: 2,
        };
        let tree = AdaptiveOctree::build(&[], [0.0; 3], [4.0; 3], p).unwrap();
        assert_eq!(tree.len(), 1 + 8 + 64);
        let level2: Vec<NodeId> = (0..tree.len()).filter(|&id| tree[id].depth() == 2).collect();
        assert_eq!(level2.len(), 64);
        for &id in &level2 {
            let node = &tree[id];
            let all: BTreeSet<NodeId> = node.neighbour_list().union(node.interaction_list()).copied().collect();
            // Every parent neighbour is internal, so the two lists tile the level.
            assert_eq!(all.len(), 64);
            assert_eq!(node.near_field_list(), node.neighbour_list());
        }
        let corner = tree.find_node(&Vector3::new(0.5, 0.5, 0.5), 2).unwrap();
        assert_eq!(tree[corner].neighbour_list().len(), 8);
        assert_eq!(tree[corner].interaction_list().len(), 56);
        let inner = tree.find_node(&Vector3::new(1.5, 1.5, 1.5), 2).unwrap();
        assert_eq!(tree[inner].neighbour_list().len(), 27);
        assert_eq!(tree[inner].interaction_list().len(), 37);
    }

    #[test]
    fn test_max_depth_caps_subdivision() {
        let positions = vec![Vector3::new(0.01, 0.01, 0.01); 10];
        let p = OctreeParams {
            max_depth: Some(3),
            ..params(2)
        };
        let tree = AdaptiveOctree::build(&positions, [0.0; 3], [1.0; 3], p).unwrap();
        assert_eq!(tree.stats().max_depth, 3);
        let leaf = tree.find_leaf(&positions[0]).unwrap();
        assert_eq!(tree[leaf].particle_count(), 10);
        assert_eq!(tree[leaf].particles().len(), 10);
    }

    #[test]
    fn test_particles_outside_box_are_skipped() {
        let positions = vec![Vector3::new(0.5, 0.5, 0.5), Vector3::new(1.0, 0.5, 0.5), Vector3::new(-0.1, 0.0, 0.0)];
        let tree = AdaptiveOctree::build(&positions, [0.0; 3], [1.0; 3], params(4)).unwrap();
        assert_eq!(tree.root().particle_count(), 1);
        assert_eq!(tree.stats().skipped_particles, 2);
        assert_eq!(tree.find_leaf(&positions[1]), None);
    }

    #[test]
    fn test_near_field_and_interaction_lists_are_disjoint() {
        let positions = random_positions(400, 11);
        let tree = AdaptiveOctree::build(&positions, [0.0; 3], [1.0; 3], params(4)).unwrap();
        assert!(tree.stats().max_depth >= 3);
        for node in tree.nodes() {
            assert!(node.near_field_list().is_disjoint(node.interaction_list()));
            assert!(node.neighbour_list().is_subset(node.near_field_list()));
        }
    }

    #[test]
    fn test_neighbour_relation_symmetric_up_to_ancestry() {
        let positions = random_positions(300, 5);
        let tree = AdaptiveOctree::build(&positions, [0.0; 3], [1.0; 3], params(3)).unwrap();
        for a in 0..tree.len() {
            for &b in tree[a].neighbour_list() {
                assert!(tree[b].depth() <= tree[a].depth());
                let found = tree[b]
                    .neighbour_list()
                    .iter()
                    .any(|&x| tree.is_ancestor_or_self(x, a));
                assert!(found, "node {a} lists {b} but not the reverse");
            }
        }
    }

    #[test]
    fn test_every_particle_lands_in_one_leaf() {
        let positions = random_positions(250, 3);
        let tree = AdaptiveOctree::build(&positions, [0.0; 3], [1.0; 3], params(5)).unwrap();
        let mut seen = vec![0usize; positions.len()];
        for leaf in tree.leaves() {
            assert!(tree[leaf].particle_count() <= 5);
            for &i in tree[leaf].particles() {
                assert!(tree[leaf].contains(&positions[i]));
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_coefficients_per_node() {
        let mut tree = AdaptiveOctree::build(&[], [0.0; 3], [1.0; 3], OctreeParams { order: 3, ..params(1) }).unwrap();
        let root = tree.get_mut(AdaptiveOctree::ROOT).unwrap();
        root.multipole.set(-2, 3, Complex::new(1.5, -0.5)).unwrap();
        assert_eq!(tree.root().multipole.get(-2, 3), Complex::new(1.5, -0.5));
        assert!(tree.root().local.is_zero());
        tree.clear_coefficients();
        assert!(tree.root().multipole.is_zero());
    }
}
