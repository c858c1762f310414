//! Point bodies: nuclei and orbital electrons.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::chemistry::params::SimParams;

/// Stable handle to a body inside a world: owning atom id plus shell and
/// orbital indices, with `-1/-1` marking the nucleus.
///
/// Bonds are stored as pairs of these handles rather than references, so they
/// survive serialization and can be validated after an atom is removed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BodyKey {
    pub atom: i32,
    pub shell: i32,
    pub orbital: i32,
}

impl BodyKey {
    pub fn nucleus(atom: i32) -> Self {
        Self { atom, shell: -1, orbital: -1 }
    }

    pub fn orbital(atom: i32, shell: i32, orbital: i32) -> Self {
        Self { atom, shell, orbital }
    }

    pub fn is_nucleus(&self) -> bool {
        self.shell < 0
    }
}

/// A nucleus or orbital electron: point mass with charge, optional valence
/// capacity, and at most one covalent partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    /// Id of the owning atom
    pub id: i32,
    /// Shell index, -1 for a nucleus
    pub shell: i32,
    /// Orbital index within the shell, -1 for a nucleus
    pub orbital: i32,
    pub mass: f32,
    pub radius: f32,
    pub charge: f32,
    /// Surplus electrons / surplus holes per valence orbital
    pub valence: [f32; 2],
    pub has_valence: bool,
    /// Covalent partner; always mutual when present. Persisted separately as
    /// an explicit bond list, not with the body.
    #[serde(skip)]
    pub covalent: Option<BodyKey>,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Accumulated forces, cleared by every integration step
    #[serde(skip)]
    pub forces: Vec3,
}

impl Default for Body {
    fn default() -> Self {
        Self {
            id: -1,
            shell: -1,
            orbital: -1,
            mass: 0.0,
            radius: 0.0,
            charge: 0.0,
            valence: [0.0, 0.0],
            has_valence: false,
            covalent: None,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            forces: Vec3::ZERO,
        }
    }
}

impl Body {
    pub fn key(&self) -> BodyKey {
        BodyKey { atom: self.id, shell: self.shell, orbital: self.orbital }
    }

    /// One semi-implicit Euler step: fold accumulated forces into velocity,
    /// cap speed at `max_temperature`, advance position, clear forces.
    pub fn step(&mut self, step: f32, params: &SimParams) {
        self.velocity += self.forces / self.mass;
        self.velocity = self.velocity.clamp_length_max(params.max_temperature);
        self.position += self.velocity * step;
        self.forces = Vec3::ZERO;
    }

    /// Symmetric covalent affinity score. Zero when either side lacks
    /// valence; otherwise the mean absolute valence difference plus the
    /// configured floor, so any eligible pair scores strictly above zero.
    pub fn covalent_force(&self, other: &Body, params: &SimParams) -> f32 {
        if !self.has_valence || !other.has_valence {
            return 0.0;
        }
        ((self.valence[0] - other.valence[0]).abs()
            + (self.valence[1] - other.valence[1]).abs())
            / 2.0
            + params.min_covalent_bond_force
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valence_body(valence: [f32; 2]) -> Body {
        Body { valence, has_valence: true, ..Body::default() }
    }

    #[test]
    fn step_integrates_and_clears_forces() {
        let params = SimParams::default();
        let mut body = Body { mass: 2.0, forces: Vec3::new(4.0, 0.0, 0.0), ..Body::default() };
        body.step(0.5, &params);
        assert_eq!(body.velocity, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(body.position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(body.forces, Vec3::ZERO);
    }

    #[test]
    fn step_caps_speed_at_max_temperature() {
        let params = SimParams::default();
        let mut body = Body {
            mass: 1.0,
            forces: Vec3::new(1000.0, 0.0, 0.0),
            ..Body::default()
        };
        body.step(params.update_step, &params);
        assert!((body.velocity.length() - params.max_temperature).abs() < 1e-4);
    }

    #[test]
    fn affinity_is_symmetric() {
        let params = SimParams::default();
        let a = valence_body([1.0, 7.0]);
        let b = valence_body([3.0, 1.0]);
        assert_eq!(a.covalent_force(&b, &params), b.covalent_force(&a, &params));
        assert!(a.covalent_force(&b, &params) > 0.0);
    }

    #[test]
    fn affinity_is_zero_without_valence() {
        let params = SimParams::default();
        let a = valence_body([1.0, 7.0]);
        let nucleus = Body::default();
        assert_eq!(a.covalent_force(&nucleus, &params), 0.0);
        assert_eq!(nucleus.covalent_force(&a, &params), 0.0);
    }

    #[test]
    fn eligible_pairs_score_above_zero_even_when_identical() {
        let params = SimParams::default();
        let a = valence_body([1.0, 1.0]);
        let b = valence_body([1.0, 1.0]);
        assert_eq!(a.covalent_force(&b, &params), params.min_covalent_bond_force);
    }
}
