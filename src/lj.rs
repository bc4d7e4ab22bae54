//! Truncated (optionally shifted) 12-6 Lennard-Jones functor.

use crate::error::FunctorError;
use crate::functor::PairwiseFunctor;
use crate::particle::Particle;
use crate::properties::{MixedParameters, ParticleProperties};
use crate::soa::SoaView;
use nalgebra::Vector3;
use std::sync::{Mutex, PoisonError};
use wide::{CmpGt, CmpLe, f64x4};

#[derive(Clone, Copy, Debug, Default)]
struct GlobalSums {
    upot: f64,
    virial: f64,
}

pub struct LennardJones {
    cutoff: f64,
    cutoff_squared: f64,
    params: MixedParameters,
    properties: Option<ParticleProperties>,
    calculate_globals: bool,
    /// One accumulator per worker thread, indexed by the rayon thread index.
    slots: Vec<Mutex<GlobalSums>>,
    post_processed: bool,
    upot: f64,
    virial: f64,
}

impl LennardJones {
    /// Single particle type.
    pub fn new(cutoff: f64, epsilon: f64, sigma: f64, shifted: bool) -> Self {
        Self::build(cutoff, MixedParameters::new(epsilon, sigma, cutoff, shifted), None)
    }

    /// Parameters per type pair from `properties`.
    pub fn with_properties(properties: ParticleProperties) -> Self {
        let cutoff = properties.cutoff();
        let fallback = properties
            .mixed(0, 0)
            .copied()
            .unwrap_or(MixedParameters::new(1.0, 1.0, cutoff, false));
        Self::build(cutoff, fallback, Some(properties))
    }

    fn build(cutoff: f64, params: MixedParameters, properties: Option<ParticleProperties>) -> Self {
        let threads = rayon::current_num_threads().max(1);
        Self {
            cutoff,
            cutoff_squared: cutoff * cutoff,
            params,
            properties,
            calculate_globals: false,
            slots: (0..threads).map(|_| Mutex::new(GlobalSums::default())).collect(),
            post_processed: false,
            upot: 0.0,
            virial: 0.0,
        }
    }

    pub fn with_globals(mut self) -> Self {
        self.calculate_globals = true;
        self
    }

    pub fn potential_energy(&self) -> Result<f64, FunctorError> {
        self.check_globals()?;
        Ok(self.upot)
    }

    pub fn virial(&self) -> Result<f64, FunctorError> {
        self.check_globals()?;
        Ok(self.virial)
    }

    fn check_globals(&self) -> Result<(), FunctorError> {
        if !self.calculate_globals {
            return Err(FunctorError::GlobalsDisabled);
        }
        if !self.post_processed {
            return Err(FunctorError::NotPostProcessed);
        }
        Ok(())
    }

    #[inline]
    fn mixed(&self, type_i: u64, type_j: u64) -> MixedParameters {
        match &self.properties {
            Some(props) => props.mixed(type_i, type_j).copied().unwrap_or(self.params),
            None => self.params,
        }
    }

    /// Force on `i`, six times the potential, and the virial.
    #[inline]
    fn evaluate(dr: &Vector3<f64>, dr2: f64, p: &MixedParameters) -> (Vector3<f64>, f64, f64) {
        let invdr2 = 1.0 / dr2;
        let lj2 = p.sigma_squared * invdr2;
        let lj6 = lj2 * lj2 * lj2;
        let lj12 = lj6 * lj6;
        let lj12m6 = lj12 - lj6;
        let fac = p.epsilon24 * (lj12 + lj12m6) * invdr2;
        let f = dr * fac;
        debug_assert!(f.iter().all(|c| c.is_finite()), "non-finite force at r^2 = {dr2}");
        (f, p.epsilon24 * lj12m6 + p.shift6, dr.dot(&f))
    }

    #[inline]
    fn weight(owned_i: bool, owned_j: bool, newton3: bool) -> f64 {
        let count = owned_i as u8 + (newton3 && owned_j) as u8;
        if newton3 {
            0.5 * count as f64
        } else {
            count as f64
        }
    }

    fn accumulate(&self, sums: GlobalSums) {
        if !self.calculate_globals || (sums.upot == 0.0 && sums.virial == 0.0) {
            return;
        }
        let idx = rayon::current_thread_index().unwrap_or(0) % self.slots.len();
        let mut slot = self.slots[idx].lock().unwrap_or_else(PoisonError::into_inner);
        slot.upot += sums.upot;
        slot.virial += sums.virial;
    }

    fn soa_pair_scalar(&self, a: &mut SoaView<'_>, b: &mut SoaView<'_>, newton3: bool) -> GlobalSums {
        let mut sums = GlobalSums::default();
        for i in 0..a.len() {
            if a.is_dummy(i) {
                continue;
            }
            let pos_i = a.position(i);
            let mut acc = Vector3::zeros();
            for j in 0..b.len() {
                if b.is_dummy(j) {
                    continue;
                }
                let dr = pos_i - b.position(j);
                let dr2 = dr.norm_squared();
                if dr2 > self.cutoff_squared {
                    continue;
                }
                let (f, upot6, virial) = Self::evaluate(&dr, dr2, &self.mixed(a.type_id[i], b.type_id[j]));
                acc += f;
                if newton3 {
                    b.add_force(j, &(-f));
                }
                if self.calculate_globals {
                    let w = Self::weight(a.is_owned(i), b.is_owned(j), newton3);
                    sums.upot += upot6 * w;
                    sums.virial += virial * w;
                }
            }
            a.add_force(i, &acc);
        }
        sums
    }

    fn soa_pair_simd(&self, a: &mut SoaView<'_>, b: &mut SoaView<'_>, newton3: bool) -> GlobalSums {
        let p = self.params;
        let cutoff_sq = f64x4::from(self.cutoff_squared);
        let eps24 = f64x4::from(p.epsilon24);
        let sigma_sq = f64x4::from(p.sigma_squared);
        let shift6 = f64x4::from(p.shift6);
        let zero = f64x4::ZERO;

        let nb = b.len();
        let chunk_end = nb - nb % 4;
        let mut sums = GlobalSums::default();

        for i in 0..a.len() {
            if a.is_dummy(i) {
                continue;
            }
            let owned_i = a.is_owned(i);
            let xi = f64x4::from(a.x[i]);
            let yi = f64x4::from(a.y[i]);
            let zi = f64x4::from(a.z[i]);
            let (mut fxi, mut fyi, mut fzi) = (zero, zero, zero);

            let mut j = 0;
            while j < chunk_end {
                let alive = f64x4::from([
                    alive_lane(b, j),
                    alive_lane(b, j + 1),
                    alive_lane(b, j + 2),
                    alive_lane(b, j + 3),
                ]);
                let dx = xi - load4(b.x, j);
                let dy = yi - load4(b.y, j);
                let dz = zi - load4(b.z, j);
                let dr2 = dx * dx + dy * dy + dz * dz;
                let mask = dr2.cmp_le(cutoff_sq) & alive.cmp_gt(zero);

                if mask.any() {
                    let invdr2 = f64x4::ONE / dr2;
                    let lj2 = sigma_sq * invdr2;
                    let lj6 = lj2 * lj2 * lj2;
                    let lj12 = lj6 * lj6;
                    let lj12m6 = lj12 - lj6;
                    let fac = mask.blend(eps24 * (lj12 + lj12m6) * invdr2, zero);
                    let fx = dx * fac;
                    let fy = dy * fac;
                    let fz = dz * fac;
                    fxi += fx;
                    fyi += fy;
                    fzi += fz;

                    if newton3 {
                        let (ax, ay, az) = (fx.to_array(), fy.to_array(), fz.to_array());
                        for k in 0..4 {
                            b.fx[j + k] -= ax[k];
                            b.fy[j + k] -= ay[k];
                            b.fz[j + k] -= az[k];
                        }
                    }

                    if self.calculate_globals {
                        let upot = mask.blend(eps24 * lj12m6 + shift6, zero).to_array();
                        let virial = (dx * fx + dy * fy + dz * fz).to_array();
                        for k in 0..4 {
                            let w = Self::weight(owned_i, b.is_owned(j + k), newton3);
                            sums.upot += upot[k] * w;
                            sums.virial += virial[k] * w;
                        }
                    }
                }
                j += 4;
            }

            let mut acc = Vector3::new(hsum(fxi), hsum(fyi), hsum(fzi));

            let pos_i = a.position(i);
            for j in chunk_end..nb {
                if b.is_dummy(j) {
                    continue;
                }
                let dr = pos_i - b.position(j);
                let dr2 = dr.norm_squared();
                if dr2 > self.cutoff_squared {
                    continue;
                }
                let (f, upot6, virial) = Self::evaluate(&dr, dr2, &p);
                acc += f;
                if newton3 {
                    b.add_force(j, &(-f));
                }
                if self.calculate_globals {
                    let w = Self::weight(owned_i, b.is_owned(j), newton3);
                    sums.upot += upot6 * w;
                    sums.virial += virial * w;
                }
            }
            a.add_force(i, &acc);
        }
        sums
    }
}

#[inline]
fn load4(s: &[f64], j: usize) -> f64x4 {
    f64x4::from([s[j], s[j + 1], s[j + 2], s[j + 3]])
}

#[inline]
fn hsum(v: f64x4) -> f64 {
    v.to_array().iter().sum()
}

#[inline]
fn alive_lane(v: &SoaView<'_>, j: usize) -> f64 {
    if v.is_dummy(j) { 0.0 } else { 1.0 }
}

impl PairwiseFunctor for LennardJones {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn aos_pair(&self, i: &mut Particle, j: &mut Particle, newton3: bool) {
        if i.is_dummy() || j.is_dummy() {
            return;
        }
        let dr = i.position - j.position;
        let dr2 = dr.norm_squared();
        if dr2 > self.cutoff_squared {
            return;
        }
        let (f, upot6, virial) = Self::evaluate(&dr, dr2, &self.mixed(i.type_id, j.type_id));
        i.add_force(&f);
        if newton3 {
            j.sub_force(&f);
        }
        if self.calculate_globals {
            let w = Self::weight(i.is_owned(), j.is_owned(), newton3);
            self.accumulate(GlobalSums {
                upot: upot6 * w,
                virial: virial * w,
            });
        }
    }

    fn soa_single(&self, mut soa: SoaView<'_>, newton3: bool) {
        let mut sums = GlobalSums::default();
        let n = soa.len();
        for i in 0..n {
            if soa.is_dummy(i) {
                continue;
            }
            let pos_i = soa.position(i);
            let mut acc = Vector3::zeros();
            for j in (i + 1)..n {
                if soa.is_dummy(j) {
                    continue;
                }
                let dr = pos_i - soa.position(j);
                let dr2 = dr.norm_squared();
                if dr2 > self.cutoff_squared {
                    continue;
                }
                let (f, upot6, virial) =
                    Self::evaluate(&dr, dr2, &self.mixed(soa.type_id[i], soa.type_id[j]));
                acc += f;
                soa.add_force(j, &(-f));
                if self.calculate_globals {
                    // Without newton3 this one evaluation stands in for both ordered pairs.
                    let count = soa.is_owned(i) as u8 + soa.is_owned(j) as u8;
                    let w = (if newton3 { 0.5 } else { 1.0 }) * count as f64;
                    sums.upot += upot6 * w;
                    sums.virial += virial * w;
                }
            }
            soa.add_force(i, &acc);
        }
        self.accumulate(sums);
    }

    fn soa_pair(&self, mut a: SoaView<'_>, mut b: SoaView<'_>, newton3: bool) {
        let sums = if self.properties.is_some() {
            self.soa_pair_scalar(&mut a, &mut b, newton3)
        } else {
            self.soa_pair_simd(&mut a, &mut b, newton3)
        };
        self.accumulate(sums);
    }

    fn init_traversal(&mut self) {
        for slot in &mut self.slots {
            *slot.get_mut().unwrap_or_else(PoisonError::into_inner) = GlobalSums::default();
        }
        self.upot = 0.0;
        self.virial = 0.0;
        self.post_processed = false;
    }

    fn end_traversal(&mut self, newton3: bool) -> Result<(), FunctorError> {
        if self.post_processed {
            return Err(FunctorError::AlreadyPostProcessed);
        }
        if self.calculate_globals {
            let (mut upot, mut virial) = (0.0, 0.0);
            for slot in &mut self.slots {
                let s = slot.get_mut().unwrap_or_else(PoisonError::into_inner);
                upot += s.upot;
                virial += s.virial;
            }
            // Each pair was counted from both sides.
            if !newton3 {
                upot *= 0.5;
                virial *= 0.5;
            }
            self.upot = upot / 6.0;
            self.virial = virial;
        }
        self.post_processed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soa::SoaBuffer;
    use approx::assert_relative_eq;

    fn pair(distance: f64) -> (Particle, Particle) {
        (
            Particle::at(0, [0.0, 0.0, 0.0]),
            Particle::at(1, [distance, 0.0, 0.0]),
        )
    }

    #[test]
    fn test_force_vanishes_at_minimum() {
        let lj = LennardJones::new(3.0, 1.0, 1.0, false);
        let (mut a, mut b) = pair(2f64.powf(1.0 / 6.0));
        lj.aos_pair(&mut a, &mut b, true);
        assert_relative_eq!(a.force.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_newton3_forces_are_opposite() {
        let lj = LennardJones::new(3.0, 1.0, 1.0, false);
        let (mut a, mut b) = pair(1.0);
        lj.aos_pair(&mut a, &mut b, true);
        // At r = sigma the pair repels with 24 eps / sigma.
        assert_relative_eq!(a.force.x, -24.0, epsilon = 1e-12);
        assert_relative_eq!(b.force.x, 24.0, epsilon = 1e-12);

        let (mut c, mut d) = pair(1.0);
        lj.aos_pair(&mut c, &mut d, false);
        assert_relative_eq!(c.force.x, -24.0, epsilon = 1e-12);
        assert_eq!(d.force, Vector3::zeros());
    }

    #[test]
    fn test_cutoff_and_dummies() {
        let lj = LennardJones::new(1.5, 1.0, 1.0, false);
        let (mut a, mut b) = pair(1.6);
        lj.aos_pair(&mut a, &mut b, true);
        assert_eq!(a.force, Vector3::zeros());

        let (mut c, mut d) = pair(1.0);
        d.ownership = crate::particle::OwnershipState::Dummy;
        lj.aos_pair(&mut c, &mut d, true);
        assert_eq!(c.force, Vector3::zeros());
    }

    #[test]
    fn test_globals_state_machine() {
        let mut lj = LennardJones::new(3.0, 1.0, 1.0, false).with_globals();
        assert_eq!(lj.potential_energy(), Err(FunctorError::NotPostProcessed));
        lj.init_traversal();
        let (mut a, mut b) = pair(1.0);
        lj.aos_pair(&mut a, &mut b, true);
        lj.end_traversal(true).unwrap();
        assert_eq!(lj.end_traversal(true), Err(FunctorError::AlreadyPostProcessed));
        // 4 eps ((1/r)^12 - (1/r)^6) = 0 at r = sigma.
        assert_relative_eq!(lj.potential_energy().unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(lj.virial().unwrap(), 24.0, epsilon = 1e-12);

        let plain = LennardJones::new(3.0, 1.0, 1.0, false);
        assert_eq!(plain.virial(), Err(FunctorError::GlobalsDisabled));
    }

    #[test]
    fn test_globals_newton3_equivalence() {
        let positions = [
            [0.0, 0.0, 0.0],
            [1.1, 0.0, 0.0],
            [0.0, 1.2, 0.3],
            [0.9, 0.8, 0.7],
        ];
        let mut energies = Vec::new();
        for newton3 in [true, false] {
            let mut lj = LennardJones::new(2.5, 1.0, 1.0, true).with_globals();
            lj.init_traversal();
            let mut ps: Vec<Particle> = positions
                .iter()
                .enumerate()
                .map(|(i, p)| Particle::at(i as u64, *p))
                .collect();
            for i in 0..ps.len() {
                for j in 0..ps.len() {
                    if i == j || (newton3 && j < i) {
                        continue;
                    }
                    let (mut pi, mut pj) = (ps[i], ps[j]);
                    lj.aos_pair(&mut pi, &mut pj, newton3);
                    ps[i] = pi;
                    if newton3 {
                        ps[j] = pj;
                    }
                }
            }
            lj.end_traversal(newton3).unwrap();
            energies.push((lj.potential_energy().unwrap(), lj.virial().unwrap()));
        }
        assert_relative_eq!(energies[0].0, energies[1].0, epsilon = 1e-10);
        assert_relative_eq!(energies[0].1, energies[1].1, epsilon = 1e-10);
    }

    #[test]
    fn test_simd_matches_scalar() {
        let particles: Vec<Particle> = (0..11)
            .map(|i| {
                let f = i as f64;
                Particle::at(i, [0.37 * f, 1.0 + 0.11 * f, (0.23 * f).sin()])
            })
            .collect();
        let others: Vec<Particle> = (0..9)
            .map(|i| {
                let f = i as f64;
                Particle::at(100 + i, [0.5 + 0.29 * f, 0.2 * f, 0.8])
            })
            .collect();

        let simd = LennardJones::new(2.0, 1.0, 0.6, false);
        let mut props = ParticleProperties::new(2.0, false);
        props.add_type(1.0, 0.6, 1.0);
        let scalar = LennardJones::with_properties(props);

        let mut results = Vec::new();
        for functor in [&simd, &scalar] {
            let mut sa = SoaBuffer::default();
            let mut sb = SoaBuffer::default();
            sa.load(&particles);
            sb.load(&others);
            functor.soa_pair(sa.view(), sb.view(), true);
            results.push((sa, sb));
        }
        for k in 0..particles.len() {
            assert_relative_eq!(results[0].0.fx[k], results[1].0.fx[k], epsilon = 1e-9, max_relative = 1e-9);
            assert_relative_eq!(results[0].0.fy[k], results[1].0.fy[k], epsilon = 1e-9, max_relative = 1e-9);
        }
        for k in 0..others.len() {
            assert_relative_eq!(results[0].1.fz[k], results[1].1.fz[k], epsilon = 1e-9, max_relative = 1e-9);
        }
    }
}
