use super::coefficients::Coefficients;
use nalgebra::Vector3;
use std::collections::BTreeSet;

/// Index into the octree arena.
pub type NodeId = usize;

/// Which half of the parent each axis falls in: bit 0 is x, bit 1 is y,
/// bit 2 is z. A set bit selects the upper half.
#[inline]
pub fn child_code_for_point(center: &Vector3<f64>, p: &Vector3<f64>) -> u8 {
    let mut code = 0u8;
    if p.x >= center.x {
        code |= 1;
    }
    if p.y >= center.y {
        code |= 2;
    }
    if p.z >= center.z {
        code |= 4;
    }
    code
}

/// Corners of child `code` inside the box `[min, max]`.
pub fn child_bounds(min: &Vector3<f64>, max: &Vector3<f64>, code: u8) -> (Vector3<f64>, Vector3<f64>) {
    let center = 0.5 * (min + max);
    let mut lo = *min;
    let mut hi = center;
    for axis in 0..3 {
        if code & (1 << axis) != 0 {
            lo[axis] = center[axis];
            hi[axis] = max[axis];
        }
    }
    (lo, hi)
}

#[derive(Clone, Debug)]
pub struct OctreeNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Option<[NodeId; 8]>,
    pub(crate) depth: usize,
    pub(crate) child_code: u8,
    pub(crate) min: Vector3<f64>,
    pub(crate) max: Vector3<f64>,
    pub(crate) particle_count: usize,
    /// Particle indices, only filled for leaves.
    pub(crate) particles: Vec<usize>,
    pub(crate) neighbour_list: BTreeSet<NodeId>,
    pub(crate) near_field_list: BTreeSet<NodeId>,
    pub(crate) interaction_list: BTreeSet<NodeId>,
    pub multipole: Coefficients,
    pub local: Coefficients,
}

impl OctreeNode {
    pub(crate) fn new(
        parent: Option<NodeId>,
        depth: usize,
        child_code: u8,
        min: Vector3<f64>,
        max: Vector3<f64>,
        order: usize,
    ) -> Self {
        Self {
            parent,
            children: None,
            depth,
            child_code,
            min,
            max,
            particle_count: 0,
            particles: Vec::new(),
            neighbour_list: BTreeSet::new(),
            near_field_list: BTreeSet::new(),
            interaction_list: BTreeSet::new(),
            multipole: Coefficients::new(order),
            local: Coefficients::new(order),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> Option<&[NodeId; 8]> {
        self.children.as_ref()
    }

    pub fn child(&self, code: u8) -> Option<NodeId> {
        self.children.map(|c| c[usize::from(code & 7)])
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Position within the parent; 0 for the root.
    pub fn child_code(&self) -> u8 {
        self.child_code
    }

    pub fn min_corner(&self) -> &Vector3<f64> {
        &self.min
    }

    pub fn max_corner(&self) -> &Vector3<f64> {
        &self.max
    }

    pub fn center(&self) -> Vector3<f64> {
        0.5 * (self.min + self.max)
    }

    /// Edge lengths.
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Half-open containment, `min <= p < max`.
    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        (0..3).all(|d| p[d] >= self.min[d] && p[d] < self.max[d])
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    pub fn particles(&self) -> &[usize] {
        &self.particles
    }

    pub fn neighbour_list(&self) -> &BTreeSet<NodeId> {
        &self.neighbour_list
    }

    pub fn near_field_list(&self) -> &BTreeSet<NodeId> {
        &self.near_field_list
    }

    pub fn interaction_list(&self) -> &BTreeSet<NodeId> {
        &self.interaction_list
    }
}
