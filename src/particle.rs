use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipState {
    /// Placeholder (cluster padding, deleted slot). Never interacts.
    Dummy,
    Owned,
    /// Copy of a particle owned by a neighbouring domain.
    Halo,
}

impl OwnershipState {
    pub const fn to_i64(self) -> i64 {
        match self {
            OwnershipState::Dummy => 0,
            OwnershipState::Owned => 1,
            OwnershipState::Halo => 2,
        }
    }

    pub const fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(OwnershipState::Dummy),
            1 => Some(OwnershipState::Owned),
            2 => Some(OwnershipState::Halo),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub id: u64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub force: Vector3<f64>,
    pub old_force: Vector3<f64>,
    pub type_id: u64,
    pub ownership: OwnershipState,
}

impl Particle {
    pub fn new(id: u64, position: Vector3<f64>, velocity: Vector3<f64>, type_id: u64) -> Self {
        Self {
            id,
            position,
            velocity,
            force: Vector3::zeros(),
            old_force: Vector3::zeros(),
            type_id,
            ownership: OwnershipState::Owned,
        }
    }

    pub fn at(id: u64, position: [f64; 3]) -> Self {
        Self::new(id, Vector3::from(position), Vector3::zeros(), 0)
    }

    pub fn dummy(id: u64, position: Vector3<f64>) -> Self {
        Self {
            ownership: OwnershipState::Dummy,
            ..Self::new(id, position, Vector3::zeros(), 0)
        }
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.ownership == OwnershipState::Owned
    }

    #[inline]
    pub fn is_halo(&self) -> bool {
        self.ownership == OwnershipState::Halo
    }

    #[inline]
    pub fn is_dummy(&self) -> bool {
        self.ownership == OwnershipState::Dummy
    }

    #[inline]
    pub fn add_force(&mut self, f: &Vector3<f64>) {
        self.force += f;
    }

    #[inline]
    pub fn sub_force(&mut self, f: &Vector3<f64>) {
        self.force -= f;
    }

    /// Half-open box test `[min, max)`.
    pub fn in_box(&self, min: &Vector3<f64>, max: &Vector3<f64>) -> bool {
        (0..3).all(|d| self.position[d] >= min[d] && self.position[d] < max[d])
    }
}

/// Particle with orientation, used by the multi-site transport records.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultisiteMolecule {
    pub particle: Particle,
    /// (w, x, y, z)
    pub quaternion: [f64; 4],
    pub angular_velocity: Vector3<f64>,
    pub torque: Vector3<f64>,
}

impl MultisiteMolecule {
    pub fn new(particle: Particle) -> Self {
        Self {
            particle,
            quaternion: [1.0, 0.0, 0.0, 0.0],
            angular_velocity: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }
}
