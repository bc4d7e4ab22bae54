use super::ContainerParams;
use crate::cell::ParticleCell;
use crate::error::ContainerError;
use crate::functor::PairwiseFunctor;
use crate::options::DataLayoutOption;
use crate::particle::{OwnershipState, Particle};
use crate::traversal::CellFunctor;
use nalgebra::Vector3;

/// Every owned particle against every other particle.
pub struct DirectSum {
    box_min: Vector3<f64>,
    box_max: Vector3<f64>,
    owned: ParticleCell,
    halo: ParticleCell,
}

impl DirectSum {
    pub fn new(params: &ContainerParams) -> Self {
        Self {
            box_min: params.box_min_vec(),
            box_max: params.box_max_vec(),
            owned: ParticleCell::new(),
            halo: ParticleCell::new(),
        }
    }

    pub fn add_particle(&mut self, p: Particle) -> Result<(), ContainerError> {
        if !p.in_box(&self.box_min, &self.box_max) {
            return Err(ContainerError::OutsideBox {
                id: p.id,
                position: p.position.into(),
            });
        }
        self.owned.add(p);
        Ok(())
    }

    pub fn add_halo_particle(&mut self, mut p: Particle) {
        p.ownership = OwnershipState::Halo;
        self.halo.add(p);
    }

    pub fn delete_halo_particles(&mut self) {
        self.halo.clear();
    }

    pub fn for_each(&self, mut f: impl FnMut(&Particle)) {
        self.owned.iter().chain(self.halo.iter()).for_each(|p| f(p));
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut Particle)) {
        self.owned
            .iter_mut()
            .chain(self.halo.iter_mut())
            .for_each(|p| f(p));
    }

    pub fn rebuild(&mut self) {}

    pub fn update_container(&mut self) -> Vec<Particle> {
        self.halo.clear();
        let (min, max) = (self.box_min, self.box_max);
        self.owned.drain_where(|p| !p.in_box(&min, &max))
    }

    pub fn into_particles(self) -> Vec<Particle> {
        let mut all = self.owned.particles;
        all.extend(self.halo.particles);
        all
    }

    pub fn iterate<F: PairwiseFunctor>(&mut self, functor: &F, layout: DataLayoutOption, newton3: bool) {
        let soa = layout == DataLayoutOption::Soa;
        if soa {
            self.owned.load_soa();
            self.halo.load_soa();
        }
        let cf = CellFunctor::new(functor, layout, newton3, true);
        cf.process_cell(&mut self.owned);
        cf.process_cell_pair(&mut self.owned, &mut self.halo);
        if soa {
            self.owned.extract_soa();
            self.halo.extract_soa();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halo_particles_are_marked() {
        let mut ds = DirectSum::new(&ContainerParams::new([0.0; 3], [5.0; 3], 1.0));
        ds.add_particle(Particle::at(0, [1.0, 1.0, 1.0])).unwrap();
        ds.add_halo_particle(Particle::at(1, [-0.5, 1.0, 1.0]));
        let mut halos = 0;
        ds.for_each(|p| halos += p.is_halo() as usize);
        assert_eq!(halos, 1);
        assert!(ds.update_container().is_empty());
        assert_eq!(ds.into_particles().len(), 1);
    }
}
