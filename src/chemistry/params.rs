//! Simulation parameters.
//!
//! Every numeric constant governing the physics lives in [`SimParams`] so a
//! whole world can be reconfigured, serialized, and restored as one record.

use serde::{Deserialize, Serialize};

/// Separations below this are treated as coincident.
pub const TOL: f32 = 1e-6;

/// Flat record of the constants governing forces, sizes, bonding thresholds,
/// and the integration step.
///
/// A world snapshot embeds the parameters it ran with, so loaded worlds are
/// self-describing. Values must not change while a tick is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Minimum magnitude of the random impulse given to a newly placed atom
    pub min_atom_initial_force: f32,
    /// Maximum magnitude of the random impulse given to a newly placed atom
    pub max_atom_initial_force: f32,
    /// Smallest allowed atomic number
    pub min_nucleus_protons: i32,
    /// Largest allowed atomic number (the shell tables cover 1..=20)
    pub max_nucleus_protons: i32,
    /// Mass contributed by each proton
    pub proton_mass: f32,
    /// Mass of a single unpaired orbital electron
    pub electron_mass: f32,
    /// Charge contributed by the nucleus per proton
    pub proton_charge: f32,
    /// Charge of a single unpaired orbital electron
    pub electron_charge: f32,
    /// Width of the Gaussian falloff applied to charge forces
    pub charge_gaussian_spread: f32,
    /// Collision radius of a nucleus body
    pub nucleus_body_radius: f32,
    /// Collision radius of an orbital body
    pub orbital_body_radius: f32,
    /// Neighbor-search radius for all pairwise interactions
    pub max_body_range: f32,
    /// Rest length of the nucleus-orbital spring, scaled by shell index
    pub bond_length: f32,
    /// Nucleus-orbital spring stiffness
    pub bond_stiffness: f32,
    /// Nucleus-orbital spring damping
    pub bond_damper: f32,
    /// Stiffness of the force pushing foreign bodies out of an atom's shells
    pub nuclear_repulsion_stiffness: f32,
    /// Separation below which valence orbitals may bond and above which
    /// existing bonds break
    pub covalent_bonding_range: f32,
    /// Floor added to every covalent affinity score
    pub min_covalent_bond_force: f32,
    /// Multiplier from affinity score to covalent spring stiffness
    pub covalent_bond_stiffness_scale: f32,
    /// Smallest allowed thermal radius
    pub min_thermal_radius: f32,
    /// Largest allowed thermal radius
    pub max_thermal_radius: f32,
    /// Smallest allowed thermal temperature
    pub min_thermal_temperature: f32,
    /// Hard cap on body speed, and the largest allowed thermal temperature
    pub max_temperature: f32,
    /// Integration step size
    pub update_step: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            min_atom_initial_force: 0.1,
            max_atom_initial_force: 1.0,
            min_nucleus_protons: 1,
            max_nucleus_protons: 20,
            proton_mass: 10.0,
            electron_mass: 1.0,
            proton_charge: 1.0,
            electron_charge: -1.0,
            charge_gaussian_spread: 1.0,
            nucleus_body_radius: 0.2,
            orbital_body_radius: 0.1,
            max_body_range: 3.0,
            bond_length: 1.0,
            bond_stiffness: 1.0,
            bond_damper: 0.5,
            nuclear_repulsion_stiffness: 1.0,
            covalent_bonding_range: 0.5,
            min_covalent_bond_force: 0.1,
            covalent_bond_stiffness_scale: 1.0,
            min_thermal_radius: 0.5,
            max_thermal_radius: 5.0,
            min_thermal_temperature: 0.0,
            max_temperature: 10.0,
            update_step: 0.02,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let p = SimParams::default();
        assert!(p.min_nucleus_protons >= 1);
        assert_eq!(p.max_nucleus_protons, 20);
        assert!(p.covalent_bonding_range < p.max_body_range);
        assert!(p.min_thermal_radius <= p.max_thermal_radius);
        assert!(p.min_thermal_temperature <= p.max_temperature);
        assert!(p.update_step > 0.0);
    }

    #[test]
    fn params_round_trip_through_ron() {
        let p = SimParams::default();
        let text = ron::to_string(&p).unwrap();
        let back: SimParams = ron::from_str(&text).unwrap();
        assert_eq!(p, back);
    }
}
