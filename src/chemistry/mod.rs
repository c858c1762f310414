//! The chemistry simulation: atoms, forces, bonds, molecules, persistence.

pub mod atom;
pub mod body;
pub mod engine;
pub mod molecule;
pub mod params;
pub mod serialization;
pub mod thermal;

pub use atom::{Atom, Shell};
pub use body::{Body, BodyKey};
pub use engine::Chemistry;
pub use molecule::{Molecule, MoleculeCode, MoleculeStats};
pub use params::SimParams;
pub use serialization::{LoadError, SaveError};
pub use thermal::Thermal;
