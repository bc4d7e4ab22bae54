//! Fixed-stride binary particle records for exchanging particles between
//! domain partitions. Little-endian, `repr(C)`, no padding.

use crate::error::TransportError;
use crate::particle::{MultisiteMolecule, OwnershipState, Particle};
use bytemuck::{Pod, Zeroable};
use nalgebra::Vector3;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SingleSiteRecord {
    pub id: u64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub force: [f64; 3],
    pub old_force: [f64; 3],
    pub type_id: u64,
    pub ownership: i64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MultiSiteRecord {
    pub id: u64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub force: [f64; 3],
    pub old_force: [f64; 3],
    pub quaternion: [f64; 4],
    pub angular_velocity: [f64; 3],
    pub torque: [f64; 3],
    pub type_id: u64,
    pub ownership: i64,
}

const _: () = assert!(std::mem::size_of::<SingleSiteRecord>() == 120);
const _: () = assert!(std::mem::size_of::<MultiSiteRecord>() == 200);

fn le_f64(x: f64) -> f64 {
    f64::from_bits(x.to_bits().to_le())
}

fn le3(v: [f64; 3]) -> [f64; 3] {
    v.map(le_f64)
}

/// A particle kind with a wire record.
pub trait WireRecord: Pod {
    type Item;

    const STRIDE: usize = std::mem::size_of::<Self>();

    fn from_item(item: &Self::Item) -> Self;

    fn into_item(self) -> Result<Self::Item, TransportError>;

    /// Byte order swap between native and little-endian; a no-op on
    /// little-endian targets and its own inverse.
    fn to_le(self) -> Self;
}

impl WireRecord for SingleSiteRecord {
    type Item = Particle;

    fn from_item(p: &Particle) -> Self {
        Self {
            id: p.id,
            position: p.position.into(),
            velocity: p.velocity.into(),
            force: p.force.into(),
            old_force: p.old_force.into(),
            type_id: p.type_id,
            ownership: p.ownership.to_i64(),
        }
    }

    fn into_item(self) -> Result<Particle, TransportError> {
        let ownership =
            OwnershipState::from_i64(self.ownership).ok_or(TransportError::InvalidOwnership(self.ownership))?;
        Ok(Particle {
            id: self.id,
            position: Vector3::from(self.position),
            velocity: Vector3::from(self.velocity),
            force: Vector3::from(self.force),
            old_force: Vector3::from(self.old_force),
            type_id: self.type_id,
            ownership,
        })
    }

    fn to_le(self) -> Self {
        Self {
            id: self.id.to_le(),
            position: le3(self.position),
            velocity: le3(self.velocity),
            force: le3(self.force),
            old_force: le3(self.old_force),
            type_id: self.type_id.to_le(),
            ownership: self.ownership.to_le(),
        }
    }
}

impl WireRecord for MultiSiteRecord {
    type Item = MultisiteMolecule;

    fn from_item(m: &MultisiteMolecule) -> Self {
        let base = SingleSiteRecord::from_item(&m.particle);
        Self {
            id: base.id,
            position: base.position,
            velocity: base.velocity,
            force: base.force,
            old_force: base.old_force,
            quaternion: m.quaternion,
            angular_velocity: m.angular_velocity.into(),
            torque: m.torque.into(),
            type_id: base.type_id,
            ownership: base.ownership,
        }
    }

    fn into_item(self) -> Result<MultisiteMolecule, TransportError> {
        let particle = SingleSiteRecord {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            force: self.force,
            old_force: self.old_force,
            type_id: self.type_id,
            ownership: self.ownership,
        }
        .into_item()?;
        Ok(MultisiteMolecule {
            particle,
            quaternion: self.quaternion,
            angular_velocity: Vector3::from(self.angular_velocity),
            torque: Vector3::from(self.torque),
        })
    }

    fn to_le(self) -> Self {
        Self {
            id: self.id.to_le(),
            position: le3(self.position),
            velocity: le3(self.velocity),
            force: le3(self.force),
            old_force: le3(self.old_force),
            quaternion: self.quaternion.map(le_f64),
            angular_velocity: le3(self.angular_velocity),
            torque: le3(self.torque),
            type_id: self.type_id.to_le(),
            ownership: self.ownership.to_le(),
        }
    }
}

pub fn serialize_batch<R: WireRecord>(items: &[R::Item]) -> Vec<u8> {
    let mut out = Vec::with_capacity(items.len() * R::STRIDE);
    for item in items {
        out.extend_from_slice(bytemuck::bytes_of(&R::from_item(item).to_le()));
    }
    out
}

pub fn deserialize_batch<R: WireRecord>(bytes: &[u8]) -> Result<Vec<R::Item>, TransportError> {
    if bytes.len() % R::STRIDE != 0 {
        return Err(TransportError::Misaligned {
            len: bytes.len(),
            stride: R::STRIDE,
        });
    }
    // Aligned buffers are viewed in place; anything else is read record by record.
    if let Ok(records) = bytemuck::try_cast_slice::<u8, R>(bytes) {
        return records.iter().map(|r| r.to_le().into_item()).collect();
    }
    bytes
        .chunks_exact(R::STRIDE)
        .map(|chunk| bytemuck::pod_read_unaligned::<R>(chunk).to_le().into_item())
        .collect()
}

pub fn serialize_particles(particles: &[Particle]) -> Vec<u8> {
    serialize_batch::<SingleSiteRecord>(particles)
}

pub fn deserialize_particles(bytes: &[u8]) -> Result<Vec<Particle>, TransportError> {
    deserialize_batch::<SingleSiteRecord>(bytes)
}

pub fn serialize_molecules(molecules: &[MultisiteMolecule]) -> Vec<u8> {
    serialize_batch::<MultiSiteRecord>(molecules)
}

pub fn deserialize_molecules(bytes: &[u8]) -> Result<Vec<MultisiteMolecule>, TransportError> {
    deserialize_batch::<MultiSiteRecord>(bytes)
}
