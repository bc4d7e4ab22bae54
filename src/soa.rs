//! Structure-of-arrays mirror of a particle cell.

use crate::particle::{OwnershipState, Particle};
use nalgebra::Vector3;
use std::ops::Range;

#[derive(Clone, Debug, Default)]
pub struct SoaBuffer {
    pub id: Vec<u64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub fx: Vec<f64>,
    pub fy: Vec<f64>,
    pub fz: Vec<f64>,
    pub type_id: Vec<u64>,
    pub ownership: Vec<OwnershipState>,
}

/// Positions are shared, forces are exclusive.
pub struct SoaView<'a> {
    pub id: &'a [u64],
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub z: &'a [f64],
    pub fx: &'a mut [f64],
    pub fy: &'a mut [f64],
    pub fz: &'a mut [f64],
    pub type_id: &'a [u64],
    pub ownership: &'a [OwnershipState],
}

/// Throwaway force arrays for one-way interactions with read-only neighbour data.
#[derive(Clone, Debug, Default)]
pub struct ForceScratch {
    fx: Vec<f64>,
    fy: Vec<f64>,
    fz: Vec<f64>,
}

impl ForceScratch {
    fn reset(&mut self, n: usize) {
        for v in [&mut self.fx, &mut self.fy, &mut self.fz] {
            v.clear();
            v.resize(n, 0.0);
        }
    }
}

impl SoaBuffer {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn clear(&mut self) {
        self.id.clear();
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.fx.clear();
        self.fy.clear();
        self.fz.clear();
        self.type_id.clear();
        self.ownership.clear();
    }

    pub fn load(&mut self, particles: &[Particle]) {
        self.clear();
        for p in particles {
            self.id.push(p.id);
            self.x.push(p.position.x);
            self.y.push(p.position.y);
            self.z.push(p.position.z);
            self.fx.push(p.force.x);
            self.fy.push(p.force.y);
            self.fz.push(p.force.z);
            self.type_id.push(p.type_id);
            self.ownership.push(p.ownership);
        }
    }

    /// Writes the accumulated forces back. Lengths must match the last `load`.
    pub fn extract(&self, particles: &mut [Particle]) {
        debug_assert_eq!(particles.len(), self.len());
        for (i, p) in particles.iter_mut().enumerate() {
            p.force = Vector3::new(self.fx[i], self.fy[i], self.fz[i]);
        }
    }

    pub fn view(&mut self) -> SoaView<'_> {
        let n = self.len();
        self.view_range(0..n)
    }

    pub fn view_range(&mut self, r: Range<usize>) -> SoaView<'_> {
        SoaView {
            id: &self.id[r.clone()],
            x: &self.x[r.clone()],
            y: &self.y[r.clone()],
            z: &self.z[r.clone()],
            fx: &mut self.fx[r.clone()],
            fy: &mut self.fy[r.clone()],
            fz: &mut self.fz[r.clone()],
            type_id: &self.type_id[r.clone()],
            ownership: &self.ownership[r],
        }
    }

    /// Two views into disjoint ranges of the same buffer.
    pub fn view_pair(&mut self, a: Range<usize>, b: Range<usize>) -> (SoaView<'_>, SoaView<'_>) {
        let Self {
            id,
            x,
            y,
            z,
            fx,
            fy,
            fz,
            type_id,
            ownership,
        } = self;
        let (fxa, fxb) = split_two_mut(fx, a.clone(), b.clone());
        let (fya, fyb) = split_two_mut(fy, a.clone(), b.clone());
        let (fza, fzb) = split_two_mut(fz, a.clone(), b.clone());
        let va = SoaView {
            id: &id[a.clone()],
            x: &x[a.clone()],
            y: &y[a.clone()],
            z: &z[a.clone()],
            fx: fxa,
            fy: fya,
            fz: fza,
            type_id: &type_id[a.clone()],
            ownership: &ownership[a],
        };
        let vb = SoaView {
            id: &id[b.clone()],
            x: &x[b.clone()],
            y: &y[b.clone()],
            z: &z[b.clone()],
            fx: fxb,
            fy: fyb,
            fz: fzb,
            type_id: &type_id[b.clone()],
            ownership: &ownership[b],
        };
        (va, vb)
    }

    /// Read-only view whose force writes land in `scratch`.
    pub fn view_with_scratch<'a>(
        &'a self,
        r: Range<usize>,
        scratch: &'a mut ForceScratch,
    ) -> SoaView<'a> {
        scratch.reset(r.len());
        SoaView {
            id: &self.id[r.clone()],
            x: &self.x[r.clone()],
            y: &self.y[r.clone()],
            z: &self.z[r.clone()],
            fx: &mut scratch.fx[..],
            fy: &mut scratch.fy[..],
            fz: &mut scratch.fz[..],
            type_id: &self.type_id[r.clone()],
            ownership: &self.ownership[r],
        }
    }
}

fn split_two_mut<T>(s: &mut [T], a: Range<usize>, b: Range<usize>) -> (&mut [T], &mut [T]) {
    if a.start <= b.start {
        assert!(a.end <= b.start, "overlapping ranges {a:?} and {b:?}");
        let (lo, hi) = s.split_at_mut(b.start);
        let b_len = b.len();
        (&mut lo[a], &mut hi[..b_len])
    } else {
        assert!(b.end <= a.start, "overlapping ranges {a:?} and {b:?}");
        let (lo, hi) = s.split_at_mut(a.start);
        let a_len = a.len();
        (&mut hi[..a_len], &mut lo[b])
    }
}

impl SoaView<'_> {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    #[inline]
    pub fn position(&self, i: usize) -> Vector3<f64> {
        Vector3::new(self.x[i], self.y[i], self.z[i])
    }

    #[inline]
    pub fn is_dummy(&self, i: usize) -> bool {
        self.ownership[i] == OwnershipState::Dummy
    }

    #[inline]
    pub fn is_owned(&self, i: usize) -> bool {
        self.ownership[i] == OwnershipState::Owned
    }

    #[inline]
    pub fn add_force(&mut self, i: usize, f: &Vector3<f64>) {
        self.fx[i] += f.x;
        self.fy[i] += f.y;
        self.fz[i] += f.z;
    }

    /// Particle snapshot of entry `i` with a zeroed force.
    pub fn particle(&self, i: usize) -> Particle {
        Particle {
            id: self.id[i],
            position: self.position(i),
            velocity: Vector3::zeros(),
            force: Vector3::zeros(),
            old_force: Vector3::zeros(),
            type_id: self.type_id[i],
            ownership: self.ownership[i],
        }
    }
}
