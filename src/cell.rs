use crate::particle::Particle;
use crate::soa::SoaBuffer;

/// Particles whose positions fell into one region at the last rebuild.
#[derive(Clone, Debug, Default)]
pub struct ParticleCell {
    pub particles: Vec<Particle>,
    pub soa: SoaBuffer,
}

impl ParticleCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, p: Particle) {
        self.particles.push(p);
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.soa.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Particle> {
        self.particles.iter_mut()
    }

    /// Removes every particle matching `pred` and returns them.
    pub fn drain_where(&mut self, mut pred: impl FnMut(&Particle) -> bool) -> Vec<Particle> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.particles.len());
        for p in self.particles.drain(..) {
            if pred(&p) {
                removed.push(p);
            } else {
                kept.push(p);
            }
        }
        self.particles = kept;
        removed
    }

    pub fn sort_by_dim(&mut self, dim: usize) {
        self.particles
            .sort_by(|a, b| a.position[dim].total_cmp(&b.position[dim]));
    }

    pub fn load_soa(&mut self) {
        self.soa.load(&self.particles);
    }

    pub fn extract_soa(&mut self) {
        self.soa.extract(&mut self.particles);
    }
}
