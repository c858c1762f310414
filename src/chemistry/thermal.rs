//! Thermal heat sources.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::chemistry::params::SimParams;

/// Fixed sphere that bodies bounce off, relaxing their speed halfway toward
/// its temperature on each collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thermal {
    pub radius: f32,
    pub position: Vec3,
    pub temperature: f32,
}

impl Thermal {
    pub fn new(params: &SimParams, radius: f32, position: Vec3, temperature: f32) -> Self {
        assert!(
            radius >= params.min_thermal_radius && radius <= params.max_thermal_radius,
            "thermal radius {radius} out of range"
        );
        assert!(
            temperature >= params.min_thermal_temperature
                && temperature <= params.max_temperature,
            "thermal temperature {temperature} out of range"
        );
        Self { radius, position, temperature }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bounds_inclusive() {
        let params = SimParams::default();
        let t = Thermal::new(
            &params,
            params.min_thermal_radius,
            Vec3::ZERO,
            params.max_temperature,
        );
        assert_eq!(t.radius, params.min_thermal_radius);
        assert_eq!(t.temperature, params.max_temperature);
    }

    #[test]
    #[should_panic]
    fn rejects_oversized_radius() {
        let params = SimParams::default();
        Thermal::new(&params, params.max_thermal_radius + 1.0, Vec3::ZERO, 1.0);
    }

    #[test]
    #[should_panic]
    fn rejects_overheated_temperature() {
        let params = SimParams::default();
        Thermal::new(&params, 1.0, Vec3::ZERO, params.max_temperature + 1.0);
    }
}
