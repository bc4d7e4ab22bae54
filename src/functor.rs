//! The pairwise interaction contract every traversal drives.

use crate::error::FunctorError;
use crate::particle::Particle;
use crate::soa::SoaView;

/// Force law applied to candidate pairs.
///
/// With `newton3` the functor must update both particles; without it only the
/// first argument. Candidate pairs may lie beyond the cutoff and may include
/// dummies; the functor filters them.
pub trait PairwiseFunctor: Sync {
    fn cutoff(&self) -> f64;

    fn aos_pair(&self, i: &mut Particle, j: &mut Particle, newton3: bool);

    /// All pairs inside one buffer.
    ///
    /// Each unordered pair is evaluated once; without newton3 that one
    /// evaluation stands in for both ordered pairs.
    fn soa_single(&self, mut soa: SoaView<'_>, newton3: bool) {
        let n = soa.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let mut pi = soa.particle(i);
                let mut pj = soa.particle(j);
                if newton3 {
                    self.aos_pair(&mut pi, &mut pj, true);
                } else {
                    self.aos_pair(&mut pi, &mut pj, false);
                    self.aos_pair(&mut pj, &mut pi, false);
                }
                soa.add_force(i, &pi.force);
                soa.add_force(j, &pj.force);
            }
        }
    }

    /// All pairs between `a` and `b`. Without newton3 only `a` is updated.
    fn soa_pair(&self, mut a: SoaView<'_>, mut b: SoaView<'_>, newton3: bool) {
        for i in 0..a.len() {
            for j in 0..b.len() {
                let mut pi = a.particle(i);
                let mut pj = b.particle(j);
                self.aos_pair(&mut pi, &mut pj, newton3);
                a.add_force(i, &pi.force);
                if newton3 {
                    b.add_force(j, &pj.force);
                }
            }
        }
    }

    fn init_traversal(&mut self) {}

    fn end_traversal(&mut self, _newton3: bool) -> Result<(), FunctorError> {
        Ok(())
    }

    fn allows_newton3(&self) -> bool {
        true
    }

    fn allows_non_newton3(&self) -> bool {
        true
    }

    /// Whether traversal timings with this functor should feed the tuner.
    fn is_relevant_for_tuning(&self) -> bool {
        true
    }
}
