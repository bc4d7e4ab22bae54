//! Störmer–Verlet time discretization on top of a particle container.
//!
//! One step is `position_update`, a force traversal, then `velocity_update`.
//! The position update moves the current force into `old_force` and zeroes
//! `force` so the traversal can accumulate into it.

use crate::containers::ParticleContainer;
use crate::error::IntegrationError;
use crate::particle::Particle;
use crate::properties::ParticleProperties;
use tracing::info_span;

fn check_step(dt: f64) -> Result<(), IntegrationError> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(IntegrationError::InvalidTimeStep(dt))
    }
}

/// Fails on the first owned particle whose type has no mass.
fn check_types(container: &ParticleContainer, properties: &ParticleProperties) -> Result<(), IntegrationError> {
    let mut unknown = None;
    container.for_each(|p| {
        if p.is_owned() && unknown.is_none() && properties.mass(p.type_id).is_none() {
            unknown = Some(p.type_id);
        }
    });
    unknown.map_or(Ok(()), |t| Err(IntegrationError::UnknownType(t)))
}

/// `x += dt v + dt² f / 2m`, then `old_force = force` and `force = 0`.
#[inline]
pub fn drift(p: &mut Particle, mass: f64, dt: f64) {
    p.position += dt * p.velocity + (dt * dt / (2.0 * mass)) * p.force;
    p.old_force = p.force;
    p.force.fill(0.0);
}

/// `v += dt (f + old_f) / 2m`.
#[inline]
pub fn kick(p: &mut Particle, mass: f64, dt: f64) {
    p.velocity += (dt / (2.0 * mass)) * (p.force + p.old_force);
}

/// Advances owned particles. Halo copies are left to their owners.
pub fn position_update(
    container: &mut ParticleContainer,
    properties: &ParticleProperties,
    dt: f64,
) -> Result<(), IntegrationError> {
    check_step(dt)?;
    check_types(container, properties)?;
    let _span = info_span!("position_update", dt).entered();
    container.for_each_mut(|p| {
        if let (true, Some(mass)) = (p.is_owned(), properties.mass(p.type_id)) {
            drift(p, mass, dt);
        }
    });
    Ok(())
}

pub fn velocity_update(
    container: &mut ParticleContainer,
    properties: &ParticleProperties,
    dt: f64,
) -> Result<(), IntegrationError> {
    check_step(dt)?;
    check_types(container, properties)?;
    let _span = info_span!("velocity_update", dt).entered();
    container.for_each_mut(|p| {
        if let (true, Some(mass)) = (p.is_owned(), properties.mass(p.type_id)) {
            kick(p, mass, dt);
        }
    });
    Ok(())
}
