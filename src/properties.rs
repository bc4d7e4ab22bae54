//! Per-type Lennard-Jones parameters with Lorentz-Berthelot mixing.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeProperties {
    pub epsilon: f64,
    pub sigma: f64,
    pub mass: f64,
}

/// Mixed parameters of one type pair, ready for the kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixedParameters {
    pub epsilon24: f64,
    pub sigma_squared: f64,
    pub shift6: f64,
}

impl MixedParameters {
    pub fn new(epsilon: f64, sigma: f64, cutoff: f64, shifted: bool) -> Self {
        let epsilon24 = 24.0 * epsilon;
        let sigma_squared = sigma * sigma;
        let shift6 = if shifted {
            shift6(epsilon24, sigma_squared, cutoff * cutoff)
        } else {
            0.0
        };
        Self {
            epsilon24,
            sigma_squared,
            shift6,
        }
    }
}

/// Six times the negated potential at the cutoff, so the truncated potential is continuous.
pub fn shift6(epsilon24: f64, sigma_squared: f64, cutoff_squared: f64) -> f64 {
    let sigma_div_cutoff_pow2 = sigma_squared / cutoff_squared;
    let sigma_div_cutoff_pow6 = sigma_div_cutoff_pow2 * sigma_div_cutoff_pow2 * sigma_div_cutoff_pow2;
    epsilon24 * (sigma_div_cutoff_pow6 - sigma_div_cutoff_pow6 * sigma_div_cutoff_pow6)
}

#[derive(Clone, Debug, Default)]
pub struct ParticleProperties {
    types: Vec<TypeProperties>,
    mixed: Vec<MixedParameters>,
    cutoff: f64,
    shifted: bool,
}

impl ParticleProperties {
    pub fn new(cutoff: f64, shifted: bool) -> Self {
        Self {
            types: Vec::new(),
            mixed: Vec::new(),
            cutoff,
            shifted,
        }
    }

    /// Registers the next type id and returns it.
    pub fn add_type(&mut self, epsilon: f64, sigma: f64, mass: f64) -> u64 {
        self.types.push(TypeProperties {
            epsilon,
            sigma,
            mass,
        });
        self.recompute_mixing();
        (self.types.len() - 1) as u64
    }

    fn recompute_mixing(&mut self) {
        let n = self.types.len();
        self.mixed = Vec::with_capacity(n * n);
        for a in &self.types {
            for b in &self.types {
                let epsilon = (a.epsilon * b.epsilon).sqrt();
                let sigma = 0.5 * (a.sigma + b.sigma);
                self.mixed
                    .push(MixedParameters::new(epsilon, sigma, self.cutoff, self.shifted));
            }
        }
    }

    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn get(&self, type_id: u64) -> Option<&TypeProperties> {
        self.types.get(type_id as usize)
    }

    pub fn mass(&self, type_id: u64) -> Option<f64> {
        self.get(type_id).map(|t| t.mass)
    }

    pub fn mixed(&self, type_i: u64, type_j: u64) -> Option<&MixedParameters> {
        let n = self.types.len();
        let (i, j) = (type_i as usize, type_j as usize);
        if i >= n || j >= n {
            return None;
        }
        self.mixed.get(i * n + j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mixing_rules() {
        let mut props = ParticleProperties::new(2.5, false);
        let a = props.add_type(1.0, 1.0, 1.0);
        let b = props.add_type(4.0, 2.0, 3.0);

        let ab = props.mixed(a, b).unwrap();
        assert_relative_eq!(ab.epsilon24, 24.0 * 2.0);
        assert_relative_eq!(ab.sigma_squared, 1.5 * 1.5);
        assert_eq!(ab.shift6, 0.0);
        assert_eq!(props.mixed(a, b), props.mixed(b, a));
        assert_eq!(props.mass(b), Some(3.0));
        assert!(props.mixed(a, 5).is_none());
    }

    #[test]
    fn test_shift_makes_potential_vanish_at_cutoff() {
        let cutoff: f64 = 2.0;
        let p = MixedParameters::new(1.0, 1.0, cutoff, true);
        let lj6 = (p.sigma_squared / (cutoff * cutoff)).powi(3);
        let upot6 = p.epsilon24 * (lj6 * lj6 - lj6) + p.shift6;
        assert_relative_eq!(upot6, 0.0, epsilon = 1e-14);
    }
}
