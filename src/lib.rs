//! # Covalence: toy-atom chemistry in a vessel
//!
//! Covalence simulates simplified atoms — a charged nucleus orbited by
//! shells of electron bodies — interacting inside a spherical vessel.
//! Orbitals with free valence form covalent bonds when they drift close
//! enough, bonds stretch and snap, and bonded clusters are recognized as
//! molecules by a canonical structural digest.
//!
//! ## Architecture Overview
//!
//! The crate has two subsystems:
//!
//! ### 1. Chemistry ([`chemistry`])
//!
//! - [`chemistry::Chemistry`] - the world: atoms, thermals, spatial index,
//!   RNG, and the eight-phase update
//! - [`chemistry::Atom`] / [`chemistry::Body`] - nuclei and orbital
//!   electrons with shell/valence layout derived from atomic numbers 1..=20
//! - [`chemistry::Molecule`] - connected bond components with a canonical
//!   digest; equal digests mean equal species
//! - [`chemistry::SimParams`] - every physical constant in one serializable
//!   record
//! - [`chemistry::serialization`] - RON snapshots that resume a run exactly,
//!   RNG stream included
//!
//! ### 2. Spatial index ([`spatial`])
//!
//! - [`spatial::Octree`] - bounded octree with lazy subdivision, close-point
//!   clustering, and upward contraction; backs all neighbor queries
//!
//! ## The update loop
//!
//! Each `update()` runs eight ordered phases: bond decay, bond formation,
//! charge forces, nuclear repulsion, springs, integration, containment, and
//! index resync. A world built with more than one worker runs the phases on
//! a dedicated thread pool; work is detected in parallel, then committed
//! serially in deterministic order, so each phase observes the previous one
//! completely.
//!
//! ## Example
//!
//! ```
//! use covalence::chemistry::Chemistry;
//!
//! let mut chem = Chemistry::new(15.0, 42, 1);
//! chem.init(20);
//! for _ in 0..100 {
//!     chem.update();
//! }
//! let stats = chem.molecule_stats();
//! assert!(stats.count >= 1);
//! ```

pub mod chemistry;
pub mod spatial;
