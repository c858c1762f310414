//! Whole-world snapshots.
//!
//! A snapshot carries everything needed to resume a run exactly: parameters,
//! vessel radius, the id factory, the RNG state mid-stream, every atom with
//! full body state, the covalent bond list as stable handle pairs, and the
//! thermals. Snapshots are RON text.

use std::fs;
use std::path::Path;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chemistry::atom::Atom;
use crate::chemistry::body::BodyKey;
use crate::chemistry::engine::Chemistry;
use crate::chemistry::params::SimParams;
use crate::chemistry::thermal::Thermal;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("failed to serialize world: {0}")]
    Serialize(#[from] ron::Error),
    #[error("failed to write snapshot file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read snapshot file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("bond references missing body {0:?}")]
    DanglingBond(BodyKey),
}

#[derive(Serialize, Deserialize)]
struct ChemistrySnapshot {
    params: SimParams,
    vessel_radius: f32,
    random_seed: u64,
    atom_id_factory: i32,
    #[serde(with = "rng_state")]
    rng: ChaCha8Rng,
    atoms: Vec<Atom>,
    /// Covalent bonds, lower-id endpoint first
    bonds: Vec<(BodyKey, BodyKey)>,
    thermals: Vec<Thermal>,
}

/// RON has no 128-bit integers, so the RNG travels as its seed plus the
/// stream word position split into two 64-bit halves.
mod rng_state {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct RngState {
        seed: [u8; 32],
        word_pos: (u64, u64),
    }

    pub fn serialize<S: Serializer>(rng: &ChaCha8Rng, serializer: S) -> Result<S::Ok, S::Error> {
        let pos = rng.get_word_pos();
        RngState {
            seed: rng.get_seed(),
            word_pos: ((pos >> 64) as u64, pos as u64),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ChaCha8Rng, D::Error> {
        let state = RngState::deserialize(deserializer)?;
        let mut rng = ChaCha8Rng::from_seed(state.seed);
        rng.set_word_pos(((state.word_pos.0 as u128) << 64) | u128::from(state.word_pos.1));
        Ok(rng)
    }
}

impl Chemistry {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveError> {
        fs::write(path.as_ref(), self.to_snapshot_string()?)?;
        log::info!(
            "saved world to {}: {} atoms, {} bonds, {} thermals",
            path.as_ref().display(),
            self.atoms.len(),
            self.bond_list().len(),
            self.thermals.len()
        );
        Ok(())
    }

    pub fn to_snapshot_string(&self) -> Result<String, SaveError> {
        let snapshot = ChemistrySnapshot {
            params: self.params.clone(),
            vessel_radius: self.vessel_radius,
            random_seed: self.random_seed,
            atom_id_factory: self.atom_id_factory,
            rng: self.rng.clone(),
            atoms: self.atoms.clone(),
            bonds: self.bond_list(),
            thermals: self.thermals.clone(),
        };
        Ok(ron::ser::to_string_pretty(&snapshot, ron::ser::PrettyConfig::default())?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P, worker_count: usize) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path)?;
        Self::from_snapshot_str(&text, worker_count)
    }

    pub fn from_snapshot_str(text: &str, worker_count: usize) -> Result<Self, LoadError> {
        let snapshot: ChemistrySnapshot = ron::from_str(text)?;
        Self::from_snapshot(snapshot, worker_count)
    }

    fn from_snapshot(snapshot: ChemistrySnapshot, worker_count: usize) -> Result<Self, LoadError> {
        let mut world = Chemistry::new(snapshot.vessel_radius, snapshot.random_seed, worker_count);
        world.params = snapshot.params;
        world.rng = snapshot.rng;
        world.atom_id_factory = snapshot.atom_id_factory;
        world.reset_tracker();
        for mut atom in snapshot.atoms {
            atom.mark = -1;
            atom.generate_color(&world.params);
            world.insert_atom(atom);
        }
        for &(a, b) in &snapshot.bonds {
            for key in [a, b] {
                if world.try_body(key).is_none() {
                    return Err(LoadError::DanglingBond(key));
                }
            }
            world.bond_pair(a, b);
        }
        world.thermals = snapshot.thermals;
        log::info!(
            "loaded world: {} atoms, {} bonds, {} thermals",
            world.atoms.len(),
            snapshot.bonds.len(),
            world.thermals.len()
        );
        Ok(world)
    }

    pub fn import_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LoadError> {
        let text = fs::read_to_string(path)?;
        self.import_from_str(&text)
    }

    /// Merge another serialized world into this one. Imported atoms get
    /// fresh ids; their bonds are remapped through the id assignment, and
    /// their thermals are appended.
    pub fn import_from_str(&mut self, text: &str) -> Result<(), LoadError> {
        let scratch = Chemistry::from_snapshot_str(text, 1)?;
        let bonds = scratch.bond_list();
        let mut id_map = std::collections::HashMap::new();
        let imported = scratch.atoms.len();
        for atom in scratch.atoms {
            let old = atom.id();
            let new = self.add_atom(atom);
            id_map.insert(old, new);
        }
        for (a, b) in bonds {
            let (Some(&na), Some(&nb)) = (id_map.get(&a.atom), id_map.get(&b.atom)) else {
                continue;
            };
            self.bond_pair(BodyKey { atom: na, ..a }, BodyKey { atom: nb, ..b });
        }
        let thermals = scratch.thermals.len();
        for thermal in scratch.thermals {
            self.add_thermal(thermal);
        }
        log::info!("imported {imported} atoms and {thermals} thermals");
        Ok(())
    }

    /// Every covalent bond once, lower-id endpoint first.
    pub fn bond_list(&self) -> Vec<(BodyKey, BodyKey)> {
        let mut bonds = Vec::new();
        for atom in &self.atoms {
            for body in atom.bodies() {
                if let Some(partner) = body.covalent {
                    if body.id < partner.atom {
                        bonds.push((body.key(), partner));
                    }
                }
            }
        }
        bonds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn populated_world() -> Chemistry {
        let mut chem = Chemistry::new(15.0, 42, 1);
        chem.init(6);
        chem.create_thermal(2.0, Vec3::new(5.0, 0.0, 0.0), 3.0);
        for _ in 0..10 {
            chem.update();
        }
        chem
    }

    #[test]
    fn snapshot_round_trip_preserves_state_and_rng_stream() {
        let mut original = populated_world();
        let text = original.to_snapshot_string().unwrap();
        let mut loaded = Chemistry::from_snapshot_str(&text, 1).unwrap();

        assert_eq!(original.params, loaded.params);
        assert_eq!(original.vessel_radius(), loaded.vessel_radius());
        assert_eq!(original.atom_count(), loaded.atom_count());
        assert_eq!(original.bond_list(), loaded.bond_list());
        assert_eq!(original.thermals(), loaded.thermals());
        assert_eq!(loaded.tracked_body_count(), loaded.body_count());
        for (a, b) in original.atoms().iter().zip(loaded.atoms()) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.number, b.number);
            for (x, y) in a.bodies().zip(b.bodies()) {
                assert_eq!(x.position, y.position);
                assert_eq!(x.velocity, y.velocity);
            }
        }

        // the RNG stream resumes exactly: both worlds evolve identically
        for _ in 0..5 {
            original.update();
            loaded.update();
        }
        for (a, b) in original.atoms().iter().zip(loaded.atoms()) {
            for (x, y) in a.bodies().zip(b.bodies()) {
                assert_eq!(x.position, y.position);
                assert_eq!(x.covalent, y.covalent);
            }
        }
    }

    #[test]
    fn snapshot_serializes_a_mid_stream_rng() {
        let chem = populated_world();
        assert!(chem.rng.get_word_pos() > 0);
        let text = chem.to_snapshot_string().unwrap();
        let loaded = Chemistry::from_snapshot_str(&text, 1).unwrap();
        assert_eq!(loaded.rng, chem.rng);
    }

    #[test]
    fn import_remaps_atom_ids_and_bonds() {
        let mut source = Chemistry::new(15.0, 1, 1);
        let x = source.create_atom(1);
        let y = source.create_atom(1);
        source.bond_pair(
            BodyKey::orbital(x, 0, 0),
            BodyKey::orbital(y, 0, 0),
        );
        source.create_thermal(1.0, Vec3::ZERO, 2.0);
        let text = source.to_snapshot_string().unwrap();

        let mut target = Chemistry::new(15.0, 2, 1);
        target.init(4);
        let before = target.atom_count();
        target.import_from_str(&text).unwrap();
        assert_eq!(target.atom_count(), before + 2);
        assert_eq!(target.thermals().len(), 1);
        assert_eq!(target.tracked_body_count(), target.body_count());

        // the imported bond survived the id reassignment and is mutual
        let bonds = target.bond_list();
        let imported: Vec<_> = bonds
            .iter()
            .filter(|(a, _)| a.atom >= before as i32)
            .collect();
        assert_eq!(imported.len(), 1);
        let (a, b) = *imported[0];
        assert_eq!(target.body(a).covalent, Some(b));
        assert_eq!(target.body(b).covalent, Some(a));
    }

    #[test]
    fn dangling_bond_is_a_load_error() {
        let mut source = Chemistry::new(15.0, 3, 1);
        let x = source.create_atom(1);
        let y = source.create_atom(1);
        source.bond_pair(
            BodyKey::orbital(x, 0, 0),
            BodyKey::orbital(y, 0, 0),
        );
        let mut snapshot: ChemistrySnapshot =
            ron::from_str(&source.to_snapshot_string().unwrap()).unwrap();
        snapshot.bonds[0].1.atom = 99;
        let text = ron::to_string(&snapshot).unwrap();
        match Chemistry::from_snapshot_str(&text, 1) {
            Err(LoadError::DanglingBond(key)) => assert_eq!(key.atom, 99),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected a dangling bond error"),
        }
    }
}
