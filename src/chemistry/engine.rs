//! The chemistry world and its tick.
//!
//! [`Chemistry`] owns the atoms, thermals, the spatial index, and the RNG.
//! Each `update()` runs eight ordered phases:
//!
//! 1. break over-extended covalent bonds
//! 2. form new covalent bonds (strongest candidate wins)
//! 3. pairwise Gaussian charge forces
//! 4. nuclear repulsion of foreign bodies inside a shell
//! 5. nucleus-orbital springs and covalent bond springs
//! 6. integration with the hard speed cap
//! 7. vessel containment and thermal collisions
//! 8. spatial index resynchronization
//!
//! Phase effects are fully visible before the next phase starts. The parallel
//! variant keeps that guarantee by collecting each phase's work read-only
//! across the pool, joining, then committing serially in deterministic order;
//! bond commits re-evaluate each candidate against the current bonds so a
//! stronger candidate still displaces a weaker existing bond.

use std::collections::HashMap;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::chemistry::atom::{Atom, BODY_SHIFT_TRIES};
use crate::chemistry::body::{Body, BodyKey};
use crate::chemistry::params::{SimParams, TOL};
use crate::chemistry::thermal::Thermal;
use crate::spatial::octree::{ObjectId, Octree};

/// Tracker bounds extend past the vessel by this factor so contained bodies
/// never leave the index.
const TRACKER_SPAN_SCALE: f32 = 1.5;

pub struct Chemistry {
    pub params: SimParams,
    pub(crate) vessel_radius: f32,
    pub(crate) random_seed: u64,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) atoms: Vec<Atom>,
    /// atom id -> index in `atoms`
    pub(crate) atom_slots: HashMap<i32, usize>,
    pub(crate) atom_id_factory: i32,
    /// Spatial index over every live body, keyed by stable handles
    pub(crate) tracker: Octree<BodyKey>,
    /// One tracker handle per live body
    pub(crate) trackers: Vec<ObjectId>,
    pub(crate) thermals: Vec<Thermal>,
    /// True after an update that formed or broke at least one bond
    pub bond_update: bool,
    pool: Option<rayon::ThreadPool>,
    worker_count: usize,
}

impl Chemistry {
    /// Build an empty world. `worker_count == 1` runs updates inline; larger
    /// counts run the phase work on a dedicated pool of that size.
    pub fn new(vessel_radius: f32, random_seed: u64, worker_count: usize) -> Self {
        assert!(worker_count >= 1, "need at least one worker");
        let params = SimParams::default();
        let tracker = Octree::new(
            Vec3::ZERO,
            vessel_radius * TRACKER_SPAN_SCALE,
            params.bond_length,
        );
        let pool = (worker_count > 1).then(|| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(worker_count)
                .build()
                .unwrap_or_else(|e| panic!("failed to build worker pool: {e}"))
        });
        Self {
            params,
            vessel_radius,
            random_seed,
            rng: ChaCha8Rng::seed_from_u64(random_seed),
            atoms: Vec::new(),
            atom_slots: HashMap::new(),
            atom_id_factory: 0,
            tracker,
            trackers: Vec::new(),
            thermals: Vec::new(),
            bond_update: false,
            pool,
            worker_count,
        }
    }

    /// Reset the world and populate it with `count` atoms whose atomic
    /// numbers are drawn from an organic-leaning mix.
    pub fn init(&mut self, count: usize) {
        self.clear();
        for _ in 0..count {
            let protons = match self.rng.gen_range(0..6) {
                0 | 1 => 1,
                2 | 3 => 4,
                4 => 5,
                _ => 6,
            };
            self.create_atom(protons);
        }
        log::info!(
            "initialized vessel (radius {}) with {} atoms",
            self.vessel_radius,
            count
        );
    }

    fn clear(&mut self) {
        self.atoms.clear();
        self.atom_slots.clear();
        self.thermals.clear();
        self.trackers.clear();
        self.atom_id_factory = 0;
        self.bond_update = false;
        self.rng = ChaCha8Rng::seed_from_u64(self.random_seed);
        self.reset_tracker();
    }

    pub(crate) fn reset_tracker(&mut self) {
        self.tracker = Octree::new(
            Vec3::ZERO,
            self.vessel_radius * TRACKER_SPAN_SCALE,
            self.params.bond_length,
        );
        self.trackers.clear();
    }

    pub fn vessel_radius(&self) -> f32 {
        self.vessel_radius
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn thermals(&self) -> &[Thermal] {
        &self.thermals
    }

    /// Total live bodies (nuclei plus orbitals).
    pub fn body_count(&self) -> usize {
        self.atoms.iter().map(|a| a.body_count()).sum()
    }

    /// Entries in the spatial index; equals [`body_count`](Self::body_count)
    /// between updates.
    pub fn tracked_body_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn get_atom(&self, id: i32) -> Option<&Atom> {
        self.atom_slots.get(&id).map(|&slot| &self.atoms[slot])
    }

    pub fn get_atom_mut(&mut self, id: i32) -> Option<&mut Atom> {
        let slot = *self.atom_slots.get(&id)?;
        Some(&mut self.atoms[slot])
    }

    /// Create an atom with the given proton count, place it at a random
    /// point inside the vessel, and give it a random initial impulse.
    /// Returns the new atom's id.
    pub fn create_atom(&mut self, protons: i32) -> i32 {
        let id = self.atom_id_factory;
        self.atom_id_factory += 1;
        let mut atom = Atom::new(&self.params, id, protons, &mut self.rng);
        let reach = atom.shells.len() as f32 * self.params.bond_length + atom.nucleus.radius;
        let direction = self.random_unit();
        let distance = self.rng.gen_range(0.0..=(self.vessel_radius - reach).max(0.0));
        atom.nucleus.position = direction * distance;
        atom.nucleus.forces = self.random_unit()
            * self
                .rng
                .gen_range(self.params.min_atom_initial_force..=self.params.max_atom_initial_force);
        for shell in &mut atom.shells {
            for orbital in &mut shell.orbitals {
                orbital.position += atom.nucleus.position;
            }
        }
        self.insert_atom(atom);
        id
    }

    /// Adopt an externally built atom, assigning it a fresh id. Positions
    /// are kept as-is and must lie inside the tracker bounds.
    pub fn add_atom(&mut self, mut atom: Atom) -> i32 {
        let id = self.atom_id_factory;
        self.atom_id_factory += 1;
        atom.set_id(id);
        self.insert_atom(atom);
        id
    }

    /// Register an atom that already carries its final id.
    pub(crate) fn insert_atom(&mut self, atom: Atom) {
        let id = atom.id();
        let keys: Vec<BodyKey> = atom.bodies().map(|b| b.key()).collect();
        let positions: Vec<Vec3> = atom.bodies().map(|b| b.position).collect();
        self.atom_slots.insert(id, self.atoms.len());
        self.atoms.push(atom);
        for (key, position) in keys.into_iter().zip(positions) {
            let handle = self
                .tracker
                .insert(position, key)
                .unwrap_or_else(|| panic!("body {key:?} outside tracker bounds"));
            self.trackers.push(handle);
        }
    }

    /// Remove an atom, severing any covalent bonds into it first so no
    /// partner is left holding a dangling handle.
    pub fn remove_atom(&mut self, id: i32) {
        let mut stale: Vec<BodyKey> = Vec::new();
        for atom in &self.atoms {
            if atom.id() == id {
                continue;
            }
            for body in atom.bodies() {
                if body.covalent.map_or(false, |k| k.atom == id) {
                    stale.push(body.key());
                }
            }
        }
        for key in stale {
            self.body_mut(key).covalent = None;
        }
        let mut kept = Vec::with_capacity(self.trackers.len());
        for handle in std::mem::take(&mut self.trackers) {
            if self.tracker.payload(handle).atom == id {
                self.tracker.remove(handle);
            } else {
                kept.push(handle);
            }
        }
        self.trackers = kept;
        if let Some(slot) = self.atom_slots.remove(&id) {
            self.atoms.remove(slot);
            self.rebuild_slots();
        }
    }

    fn rebuild_slots(&mut self) {
        self.atom_slots.clear();
        for (slot, atom) in self.atoms.iter().enumerate() {
            self.atom_slots.insert(atom.id(), slot);
        }
    }

    /// Create a thermal and return its index.
    pub fn create_thermal(&mut self, radius: f32, position: Vec3, temperature: f32) -> usize {
        let thermal = Thermal::new(&self.params, radius, position, temperature);
        self.thermals.push(thermal);
        self.thermals.len() - 1
    }

    pub fn add_thermal(&mut self, thermal: Thermal) {
        self.thermals.push(thermal);
    }

    /// Move a whole atom, keeping the spatial index in sync so neighbor
    /// queries see the new position immediately.
    pub fn set_atom_position(&mut self, id: i32, position: Vec3) {
        if let Some(atom) = self.get_atom_mut(id) {
            atom.set_position(position);
        }
        self.resync_atom_trackers(id);
    }

    pub fn set_atom_velocity(&mut self, id: i32, velocity: Vec3) {
        if let Some(atom) = self.get_atom_mut(id) {
            atom.set_velocity(velocity);
        }
    }

    fn resync_atom_trackers(&mut self, id: i32) {
        for i in 0..self.trackers.len() {
            let handle = self.trackers[i];
            let key = self.tracker.payload(handle);
            if key.atom == id {
                let position = self.body(key).position;
                self.tracker.move_object(handle, position);
            }
        }
    }

    /// Resolve a body handle. Panics when the handle is dangling, which only
    /// happens on an internal invariant violation.
    pub fn body(&self, key: BodyKey) -> &Body {
        self.atoms[self.atom_slots[&key.atom]].body(key)
    }

    pub fn body_mut(&mut self, key: BodyKey) -> &mut Body {
        let slot = self.atom_slots[&key.atom];
        self.atoms[slot].body_mut(key)
    }

    pub(crate) fn try_body(&self, key: BodyKey) -> Option<&Body> {
        let &slot = self.atom_slots.get(&key.atom)?;
        let atom = &self.atoms[slot];
        if key.is_nucleus() {
            return Some(&atom.nucleus);
        }
        atom.shells
            .get(key.shell as usize)?
            .orbitals
            .get(key.orbital as usize)
    }

    pub(crate) fn bond_pair(&mut self, a: BodyKey, b: BodyKey) {
        self.body_mut(a).covalent = Some(b);
        self.body_mut(b).covalent = Some(a);
        log::trace!("bond formed {a:?} <-> {b:?}");
    }

    pub(crate) fn unbond_pair(&mut self, a: BodyKey, b: BodyKey) {
        self.body_mut(a).covalent = None;
        self.body_mut(b).covalent = None;
        log::trace!("bond severed {a:?} x {b:?}");
    }

    /// Advance the world one step. Sets [`bond_update`](Self::bond_update)
    /// when the bond topology changed.
    pub fn update(&mut self) {
        self.bond_update = false;
        if let Some(pool) = self.pool.take() {
            pool.install(|| self.update_parallel());
            self.pool = Some(pool);
        } else {
            self.update_st();
        }
        if self.bond_update {
            log::debug!("bond topology changed this update");
        }
    }

    fn update_st(&mut self) {
        let step = self.params.update_step;
        let range = self.params.max_body_range;
        let mut search: Vec<BodyKey> = Vec::new();

        // 1. Break over-extended bonds (owned by the lower-id side).
        for i in 0..self.trackers.len() {
            let key = self.tracker.payload(self.trackers[i]);
            let body = self.body(key);
            let Some(partner) = body.covalent else { continue };
            if body.id < partner.atom {
                let separation = (self.body(partner).position - body.position).length();
                if separation > self.params.covalent_bonding_range {
                    self.unbond_pair(key, partner);
                    self.bond_update = true;
                }
            }
        }

        // 2. Form bonds: the strongest eligible candidate displaces weaker
        // existing bonds on both sides; equal scores keep what exists.
        for i in 0..self.trackers.len() {
            let key = self.tracker.payload(self.trackers[i]);
            if !self.body(key).has_valence {
                continue;
            }
            let position = self.body(key).position;
            self.tracker.search(position, range, &mut search);
            for j in 0..search.len() {
                let candidate = search[j];
                if !self.should_bond(key, candidate) {
                    continue;
                }
                if let Some(existing) = self.body(key).covalent {
                    self.unbond_pair(key, existing);
                }
                if let Some(existing) = self.body(candidate).covalent {
                    self.unbond_pair(candidate, existing);
                }
                self.bond_pair(key, candidate);
                self.bond_update = true;
            }
        }

        // 3. Charge forces between every interacting pair.
        for i in 0..self.trackers.len() {
            let key = self.tracker.payload(self.trackers[i]);
            let position = self.body(key).position;
            self.tracker.search(position, range, &mut search);
            for j in 0..search.len() {
                let other = search[j];
                if !charge_pair_eligible(key, other, self.body(key).covalent) {
                    continue;
                }
                self.apply_charge_force(key, other);
            }
        }

        // 4. Nuclei push foreign bodies back out of their shells.
        for i in 0..self.atoms.len() {
            let nucleus_key = self.atoms[i].nucleus.key();
            let position = self.atoms[i].nucleus.position;
            self.tracker.search(position, range, &mut search);
            for j in 0..search.len() {
                let other = search[j];
                if other.atom == nucleus_key.atom {
                    continue;
                }
                if self.shell_penetration(i, other) >= 0.0 {
                    continue;
                }
                self.apply_nuclear_repulsion(i, other);
            }
        }

        // 5. Nucleus-orbital springs, then covalent springs (lower-id side).
        for atom in &mut self.atoms {
            atom.update_orbital_bonds(&self.params);
        }
        for i in 0..self.trackers.len() {
            let key = self.tracker.payload(self.trackers[i]);
            let body = self.body(key);
            if let Some(partner) = body.covalent {
                if body.id < partner.atom {
                    self.apply_bond_spring(key, partner);
                }
            }
        }

        // 6. Integrate.
        for atom in &mut self.atoms {
            atom.step(step, &self.params);
        }

        // 7. Contain bodies in the vessel and collide with thermals.
        for atom in &mut self.atoms {
            for body in atom.bodies_mut() {
                contain_body(body, self.vessel_radius, &self.thermals, &self.params);
            }
        }

        // 8. Resynchronize the spatial index.
        for i in 0..self.trackers.len() {
            let handle = self.trackers[i];
            let key = self.tracker.payload(handle);
            let position = self.body(key).position;
            self.tracker.move_object(handle, position);
        }
    }

    fn update_parallel(&mut self) {
        let step = self.params.update_step;
        let range = self.params.max_body_range;

        // 1. Detect over-extended bonds across the pool; sever after the join.
        let stale: Vec<(BodyKey, BodyKey)> = self
            .trackers
            .par_iter()
            .filter_map(|&handle| {
                let key = self.tracker.payload(handle);
                let body = self.body(key);
                let partner = body.covalent?;
                if body.id < partner.atom
                    && (self.body(partner).position - body.position).length()
                        > self.params.covalent_bonding_range
                {
                    Some((key, partner))
                } else {
                    None
                }
            })
            .collect();
        for (a, b) in stale {
            self.unbond_pair(a, b);
            self.bond_update = true;
        }

        // 2. Collect bond candidates read-only; commit serially in sorted
        // order, re-checking each against the bonds formed so far and
        // displacing weaker existing bonds exactly as the serial path does.
        let mut candidates: Vec<(BodyKey, BodyKey)> = self
            .trackers
            .par_iter()
            .flat_map_iter(|&handle| {
                let key = self.tracker.payload(handle);
                let mut found = Vec::new();
                if self.body(key).has_valence {
                    let mut search = Vec::new();
                    self.tracker.search(self.body(key).position, range, &mut search);
                    for candidate in search {
                        if self.should_bond(key, candidate) {
                            found.push((key, candidate));
                        }
                    }
                }
                found.into_iter()
            })
            .collect();
        candidates.sort_unstable();
        for (a, b) in candidates {
            if !self.should_bond(a, b) {
                continue;
            }
            if let Some(existing) = self.body(a).covalent {
                self.unbond_pair(a, existing);
            }
            if let Some(existing) = self.body(b).covalent {
                self.unbond_pair(b, existing);
            }
            self.bond_pair(a, b);
            self.bond_update = true;
        }

        // 3. Detect charge pairs in parallel; apply serially, since the
        // overlap jitter consumes the world RNG.
        let pairs: Vec<(BodyKey, BodyKey)> = self
            .trackers
            .par_iter()
            .flat_map_iter(|&handle| {
                let key = self.tracker.payload(handle);
                let body = self.body(key);
                let mut search = Vec::new();
                self.tracker.search(body.position, range, &mut search);
                let covalent = body.covalent;
                let mut found = Vec::new();
                for other in search {
                    if charge_pair_eligible(key, other, covalent) {
                        found.push((key, other));
                    }
                }
                found.into_iter()
            })
            .collect();
        for (a, b) in pairs {
            self.apply_charge_force(a, b);
        }

        // 4. Same pattern for nuclear repulsion.
        let hits: Vec<(usize, BodyKey)> = (0..self.atoms.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let nucleus = &self.atoms[i].nucleus;
                let mut search = Vec::new();
                self.tracker.search(nucleus.position, range, &mut search);
                let mut found = Vec::new();
                for other in search {
                    if other.atom == nucleus.id {
                        continue;
                    }
                    if self.shell_penetration(i, other) < 0.0 {
                        found.push((i, other));
                    }
                }
                found.into_iter()
            })
            .collect();
        for (i, other) in hits {
            self.apply_nuclear_repulsion(i, other);
        }

        // 5. Springs stay serial: cheap, and each touches two bodies.
        for atom in &mut self.atoms {
            atom.update_orbital_bonds(&self.params);
        }
        for i in 0..self.trackers.len() {
            let key = self.tracker.payload(self.trackers[i]);
            let body = self.body(key);
            if let Some(partner) = body.covalent {
                if body.id < partner.atom {
                    self.apply_bond_spring(key, partner);
                }
            }
        }

        // 6. Integrate each atom independently.
        {
            let params = &self.params;
            self.atoms.par_iter_mut().for_each(|atom| atom.step(step, params));
        }

        // 7. Containment and thermal collisions, also per-atom.
        {
            let params = &self.params;
            let thermals = &self.thermals;
            let vessel_radius = self.vessel_radius;
            self.atoms.par_iter_mut().for_each(|atom| {
                for body in atom.bodies_mut() {
                    contain_body(body, vessel_radius, thermals, params);
                }
            });
        }

        // 8. Gather new positions across the pool; restructure serially.
        let moves: Vec<(ObjectId, Vec3)> = self
            .trackers
            .par_iter()
            .map(|&handle| (handle, self.body(self.tracker.payload(handle)).position))
            .collect();
        for (handle, position) in moves {
            self.tracker.move_object(handle, position);
        }
    }

    /// Bond-formation policy for one directed candidate pair.
    fn should_bond(&self, a: BodyKey, b: BodyKey) -> bool {
        if a.atom == b.atom {
            return false;
        }
        let b1 = self.body(a);
        let b2 = self.body(b);
        if !b1.has_valence || !b2.has_valence {
            return false;
        }
        if (b2.position - b1.position).length() > self.params.covalent_bonding_range {
            return false;
        }
        let force = b1.covalent_force(b2, &self.params);
        if let Some(existing) = b1.covalent {
            if force <= b1.covalent_force(self.body(existing), &self.params) {
                return false;
            }
        }
        if let Some(existing) = b2.covalent {
            if force <= b2.covalent_force(self.body(existing), &self.params) {
                return false;
            }
        }
        true
    }

    /// Gaussian charge force between two bodies, jittering coincident pairs
    /// apart first so the direction is defined.
    fn apply_charge_force(&mut self, a: BodyKey, b: BodyKey) {
        let mut x = self.body(b).position - self.body(a).position;
        let mut d = x.length();
        for _ in 0..BODY_SHIFT_TRIES {
            if d > TOL {
                break;
            }
            let r = self.params.orbital_body_radius * 0.1;
            let ja = self.random_jitter(r);
            let jb = self.random_jitter(r);
            self.body_mut(a).position += ja;
            self.body_mut(b).position += jb;
            x = self.body(b).position - self.body(a).position;
            d = x.length();
        }
        let spread = self.params.charge_gaussian_spread;
        let f = x.normalize_or_zero()
            * (self.body(a).charge * self.body(b).charge)
            * (-(d * d) / (spread * spread)).exp();
        self.body_mut(a).forces -= f;
        self.body_mut(b).forces += f;
    }

    /// Signed penetration of `other` into atom `i`'s outermost shell.
    fn shell_penetration(&self, i: usize, other: BodyKey) -> f32 {
        let atom = &self.atoms[i];
        let reach = self.params.bond_length * (atom.shells.len() as f32 + 1.0);
        (self.body(other).position - atom.nucleus.position).length() - reach
    }

    /// Push a penetrating foreign body out along the separation axis, with
    /// equal recoil on the nucleus. Strength scales with penetration depth
    /// and the nucleus proton count.
    fn apply_nuclear_repulsion(&mut self, i: usize, other: BodyKey) {
        let nucleus_key = self.atoms[i].nucleus.key();
        let protons = self.atoms[i].number;
        let x = self.body(other).position - self.atoms[i].nucleus.position;
        let depth = self.shell_penetration(i, other);
        if depth > 0.0 {
            return;
        }
        let f = -self.params.nuclear_repulsion_stiffness
            * protons as f32
            * depth
            * x.normalize_or_zero();
        self.body_mut(nucleus_key).forces -= f;
        self.body_mut(other).forces += f;
    }

    /// Covalent spring: zero rest length, stiffness proportional to the
    /// pair's affinity score.
    fn apply_bond_spring(&mut self, a: BodyKey, b: BodyKey) {
        let x = self.body(b).position - self.body(a).position;
        let d = x.length();
        if d < TOL {
            return;
        }
        let force = self.body(a).covalent_force(self.body(b), &self.params);
        let f = -force * self.params.covalent_bond_stiffness_scale * d * (x / d);
        self.body_mut(a).forces -= f;
        self.body_mut(b).forces += f;
    }

    fn random_unit(&mut self) -> Vec3 {
        let v = self.random_jitter(1.0);
        if v.length() < TOL {
            Vec3::X
        } else {
            v.normalize()
        }
    }

    fn random_jitter(&mut self, span: f32) -> Vec3 {
        Vec3::new(
            self.rng.gen_range(-span..=span),
            self.rng.gen_range(-span..=span),
            self.rng.gen_range(-span..=span),
        )
    }
}

fn charge_pair_eligible(key: BodyKey, other: BodyKey, covalent: Option<BodyKey>) -> bool {
    if other == key {
        return false;
    }
    // orbitals of the same atom interact only within their own shell
    if other.atom == key.atom && other.shell != key.shell {
        return false;
    }
    covalent != Some(other)
}

/// Hard-clamp runaway bodies back inside the vessel, reflect bodies leaving
/// through the wall, and bounce bodies off thermals while relaxing their
/// speed halfway toward the thermal's temperature.
fn contain_body(body: &mut Body, vessel_radius: f32, thermals: &[Thermal], params: &SimParams) {
    let distance = body.position.length();
    if distance > vessel_radius * 1.25 {
        body.position = body.position.normalize_or_zero() * (vessel_radius - body.radius);
    }
    let predicted = body.position + body.velocity * params.update_step;
    if distance >= vessel_radius - body.radius && distance < predicted.length() {
        if distance > TOL {
            let normal = -body.position.normalize_or_zero();
            body.velocity -= 2.0 * body.velocity.dot(normal) * normal;
        }
        return;
    }
    for thermal in thermals {
        let offset = body.position - thermal.position;
        let separation = offset.length();
        if separation <= thermal.radius + body.radius
            && (predicted - thermal.position).length() < separation
        {
            if separation > TOL {
                let normal = offset / separation;
                body.velocity -= 2.0 * body.velocity.dot(normal) * normal;
                let speed = body.velocity.length();
                let warmed = speed + (thermal.temperature - speed) / 2.0;
                body.velocity = body.velocity.normalize_or_zero() * warmed;
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> Chemistry {
        Chemistry::new(15.0, 42, 1)
    }

    /// Two hydrogens with their valence orbitals placed within bonding range.
    fn bonded_hydrogen_pair(chem: &mut Chemistry) -> (i32, i32) {
        let a = chem.create_atom(1);
        let b = chem.create_atom(1);
        chem.set_atom_position(a, Vec3::ZERO);
        let orbital_a = chem.get_atom(a).unwrap().shells[0].orbitals[0].position;
        let orbital_b_offset = {
            let atom = chem.get_atom(b).unwrap();
            atom.shells[0].orbitals[0].position - atom.nucleus.position
        };
        let target = orbital_a + Vec3::splat(0.05) - orbital_b_offset;
        chem.set_atom_position(b, target);
        chem.update();
        (a, b)
    }

    #[test]
    fn tracker_stays_bijective_with_bodies() {
        let mut chem = world();
        chem.init(10);
        assert_eq!(chem.tracked_body_count(), chem.body_count());
        let extra = chem.create_atom(6);
        assert_eq!(chem.tracked_body_count(), chem.body_count());
        chem.remove_atom(extra);
        assert_eq!(chem.tracked_body_count(), chem.body_count());
        for _ in 0..5 {
            chem.update();
            assert_eq!(chem.tracked_body_count(), chem.body_count());
        }
    }

    #[test]
    fn atoms_bond_when_valence_orbitals_meet() {
        let mut chem = world();
        let (a, b) = bonded_hydrogen_pair(&mut chem);
        assert!(chem.bond_update);
        let orbital_a = &chem.get_atom(a).unwrap().shells[0].orbitals[0];
        let orbital_b = &chem.get_atom(b).unwrap().shells[0].orbitals[0];
        assert_eq!(orbital_a.covalent, Some(orbital_b.key()));
        assert_eq!(orbital_b.covalent, Some(orbital_a.key()));
        let stats = chem.molecule_stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.closed_count, 1);
        assert_eq!(stats.average_size, 2.0);
    }

    #[test]
    fn bonds_are_always_mutual() {
        let mut chem = world();
        chem.init(20);
        for _ in 0..50 {
            chem.update();
            for atom in chem.atoms() {
                for body in atom.bodies() {
                    if let Some(partner) = body.covalent {
                        assert_eq!(chem.body(partner).covalent, Some(body.key()));
                    }
                }
            }
        }
    }

    #[test]
    fn removing_a_bonded_atom_clears_the_partner() {
        let mut chem = world();
        let (a, b) = bonded_hydrogen_pair(&mut chem);
        chem.remove_atom(b);
        assert!(chem.get_atom(b).is_none());
        let orbital_a = &chem.get_atom(a).unwrap().shells[0].orbitals[0];
        assert_eq!(orbital_a.covalent, None);
        assert_eq!(chem.tracked_body_count(), chem.body_count());
        // next update must not trip over the removed atom
        chem.update();
    }

    #[test]
    fn same_seed_same_trajectory() {
        let mut first = world();
        let mut second = world();
        first.init(8);
        second.init(8);
        for _ in 0..15 {
            first.update();
            second.update();
        }
        assert_eq!(first.atom_count(), second.atom_count());
        for (x, y) in first.atoms().iter().zip(second.atoms()) {
            assert_eq!(x.id(), y.id());
            assert_eq!(x.number, y.number);
            for (bx, by) in x.bodies().zip(y.bodies()) {
                assert_eq!(bx.position, by.position);
                assert_eq!(bx.velocity, by.velocity);
                assert_eq!(bx.covalent, by.covalent);
            }
        }
    }

    #[test]
    fn speed_never_exceeds_the_cap() {
        let mut chem = world();
        chem.init(15);
        chem.create_thermal(2.0, Vec3::new(4.0, 0.0, 0.0), chem.params.max_temperature);
        for _ in 0..100 {
            chem.update();
            for atom in chem.atoms() {
                for body in atom.bodies() {
                    assert!(body.velocity.length() <= chem.params.max_temperature + 1e-3);
                }
            }
        }
    }

    #[test]
    fn bodies_stay_near_the_vessel() {
        let mut chem = world();
        chem.init(12);
        for _ in 0..200 {
            chem.update();
        }
        let limit = chem.vessel_radius() * 1.25 + chem.params.max_temperature * chem.params.update_step;
        for atom in chem.atoms() {
            for body in atom.bodies() {
                assert!(body.position.length() <= limit);
            }
        }
    }

    /// A weakly bonded hydrogen pair with a carbon valence orbital parked
    /// within bonding range of one side.
    fn weak_bond_with_stronger_suitor(workers: usize) -> (Chemistry, BodyKey, i32) {
        let mut chem = Chemistry::new(15.0, 42, workers);
        let a = chem.create_atom(1);
        let b = chem.create_atom(1);
        let c = chem.create_atom(6);
        for id in [a, b, c] {
            chem.set_atom_velocity(id, Vec3::ZERO);
        }
        chem.set_atom_position(a, Vec3::ZERO);
        let orbital_a = chem.get_atom(a).unwrap().shells[0].orbitals[0].position;
        let offset_b = {
            let atom = chem.get_atom(b).unwrap();
            atom.shells[0].orbitals[0].position - atom.nucleus.position
        };
        chem.set_atom_position(b, orbital_a + Vec3::splat(0.05) - offset_b);
        chem.bond_pair(BodyKey::orbital(a, 0, 0), BodyKey::orbital(b, 0, 0));
        // carbon pairs its first two orbitals; index 2 is the first with valence
        let offset_c = {
            let atom = chem.get_atom(c).unwrap();
            atom.shells[0].orbitals[2].position - atom.nucleus.position
        };
        chem.set_atom_position(c, orbital_a + Vec3::new(-0.05, 0.05, 0.0) - offset_c);
        (chem, BodyKey::orbital(a, 0, 0), c)
    }

    #[test]
    fn stronger_candidate_displaces_weaker_bond_in_both_modes() {
        for workers in [1, 4] {
            let (mut chem, key, c) = weak_bond_with_stronger_suitor(workers);
            chem.update();
            let partner = chem.body(key).covalent.unwrap();
            assert_eq!(partner.atom, c, "workers = {workers}");
            assert_eq!(chem.body(partner).covalent, Some(key));
        }
    }

    #[test]
    fn parallel_update_preserves_invariants() {
        let mut chem = Chemistry::new(15.0, 42, 4);
        chem.init(20);
        for _ in 0..25 {
            chem.update();
            assert_eq!(chem.tracked_body_count(), chem.body_count());
            for atom in chem.atoms() {
                for body in atom.bodies() {
                    assert!(body.velocity.length() <= chem.params.max_temperature + 1e-3);
                    if let Some(partner) = body.covalent {
                        assert_eq!(chem.body(partner).covalent, Some(body.key()));
                    }
                }
            }
        }
    }

    #[test]
    fn init_uses_the_organic_mix() {
        let mut chem = world();
        chem.init(60);
        assert_eq!(chem.atom_count(), 60);
        for atom in chem.atoms() {
            assert!(matches!(atom.number, 1 | 4 | 5 | 6));
        }
    }
}
