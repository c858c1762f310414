//! Toy atoms: a charged nucleus orbited by shells of electron bodies.
//!
//! The shell layout for atomic numbers 1..=20 follows a simple fill rule:
//! shell 0 offers 4 orbital slots with capacity for 8 electrons, shell 1
//! offers 6 slots with capacity for 12. When a shell holds more electrons
//! than slots, the surplus pairs into the leading slots, which then carry
//! doubled mass and charge and lose their valence. Only unpaired orbitals in
//! a partially filled outer shell can form covalent bonds.

use glam::Vec3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::chemistry::body::{Body, BodyKey};
use crate::chemistry::params::{SimParams, TOL};

/// Relaxation iterations run when an atom is constructed.
const DEPLOYMENT_STEPS: usize = 100;

/// Retries when jittering coincident bodies apart.
pub(crate) const BODY_SHIFT_TRIES: usize = 10;

/// Orbital slots per shell.
const SHELL_SLOTS: [i32; 2] = [4, 6];

/// Electron capacity per shell.
const SHELL_CAPACITY: [i32; 2] = [8, 12];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shell {
    /// Shell index, 0 innermost
    pub number: i32,
    pub orbitals: Vec<Body>,
}

/// Nucleus plus orbital shells. Positions are world-space; a freshly
/// constructed atom sits at the origin with zero velocities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// Atomic number (proton count)
    pub number: i32,
    pub nucleus: Body,
    pub shells: Vec<Shell>,
    /// Deterministic display color derived from the atomic number
    #[serde(skip)]
    pub color: [f32; 4],
    /// Connected-component scratch mark, -1 when unmarked
    #[serde(skip)]
    pub mark: i32,
}

impl Atom {
    /// Build an atom with the shell layout for its atomic number, then relax
    /// the orbitals into a rest geometry around the nucleus.
    pub fn new(params: &SimParams, id: i32, protons: i32, rng: &mut ChaCha8Rng) -> Self {
        assert!(
            protons >= params.min_nucleus_protons && protons <= params.max_nucleus_protons,
            "atomic number {protons} out of range"
        );
        let nucleus = Body {
            id,
            mass: protons as f32 * params.proton_mass,
            radius: params.nucleus_body_radius,
            charge: params.proton_charge,
            ..Body::default()
        };
        let mut atom = Atom {
            number: protons,
            nucleus,
            shells: Vec::new(),
            color: [0.0; 4],
            mark: -1,
        };
        atom.generate_color(params);
        atom.build_shells(params);
        atom.deploy_orbitals(params, rng);
        atom
    }

    pub fn id(&self) -> i32 {
        self.nucleus.id
    }

    /// Surplus electrons (export) and surplus holes (import) per valence
    /// orbital of the outer shell. Full shells bond with nothing.
    pub fn valence_pair(&self) -> [f32; 2] {
        let (shell, outer) = if self.number <= SHELL_CAPACITY[0] {
            (0, self.number)
        } else {
            (1, self.number - SHELL_CAPACITY[0])
        };
        let capacity = SHELL_CAPACITY[shell];
        if outer == capacity {
            return [0.0, 0.0];
        }
        let slots = SHELL_SLOTS[shell];
        // count of unpaired (valence-carrying) orbitals
        let unpaired = if outer <= slots { outer } else { 2 * slots - outer } as f32;
        [outer as f32 / unpaired, (capacity - outer) as f32 / unpaired]
    }

    fn build_shells(&mut self, params: &SimParams) {
        let shell_count = if self.number <= SHELL_CAPACITY[0] { 1 } else { 2 };
        let valence = self.valence_pair();
        for s in 0..shell_count {
            let electrons = if s == 0 {
                self.number.min(SHELL_CAPACITY[0])
            } else {
                self.number - SHELL_CAPACITY[0]
            };
            let slots = SHELL_SLOTS[s as usize];
            let count = electrons.min(slots);
            let paired = (electrons - slots).max(0);
            let mut shell = Shell { number: s, orbitals: Vec::with_capacity(count as usize) };
            for o in 0..count {
                let mut orbital = Body {
                    id: self.nucleus.id,
                    shell: s,
                    orbital: o,
                    radius: params.orbital_body_radius,
                    ..Body::default()
                };
                if o < paired {
                    orbital.mass = params.electron_mass * 2.0;
                    orbital.charge = params.electron_charge * 2.0;
                } else {
                    orbital.mass = params.electron_mass;
                    orbital.charge = params.electron_charge;
                    orbital.valence = valence;
                    orbital.has_valence = valence != [0.0, 0.0];
                }
                shell.orbitals.push(orbital);
            }
            self.shells.push(shell);
        }
    }

    /// Scatter orbitals at their shell radius, then relax the whole atom for
    /// a fixed number of steps: pairwise Gaussian charge forces (with jitter
    /// for coincident pairs), nucleus-orbital springs, integration. Finally
    /// re-base everything on the nucleus so the rest geometry is independent
    /// of where the relaxation drifted.
    fn deploy_orbitals(&mut self, params: &SimParams, rng: &mut ChaCha8Rng) {
        let mut bodies: Vec<Body> = Vec::with_capacity(1 + self.orbital_count());
        bodies.push(self.nucleus.clone());
        for shell in &self.shells {
            let radius = params.bond_length * (shell.number as f32 + 1.0);
            for orbital in &shell.orbitals {
                let mut body = orbital.clone();
                let mut dir = random_span(rng, 1.0);
                while dir.length() < TOL {
                    dir = random_span(rng, 1.0);
                }
                body.position = dir.normalize() * radius;
                bodies.push(body);
            }
        }
        for _ in 0..DEPLOYMENT_STEPS {
            for i in 0..bodies.len() {
                for j in (i + 1)..bodies.len() {
                    if bodies[i].id == bodies[j].id && bodies[i].shell != bodies[j].shell {
                        continue;
                    }
                    let mut x = bodies[j].position - bodies[i].position;
                    let mut d = x.length();
                    for _ in 0..BODY_SHIFT_TRIES {
                        if d > TOL {
                            break;
                        }
                        let r = params.orbital_body_radius * 0.1;
                        bodies[i].position += random_span(rng, r);
                        bodies[j].position += random_span(rng, r);
                        x = bodies[j].position - bodies[i].position;
                        d = x.length();
                    }
                    let spread = params.charge_gaussian_spread;
                    let f = x.normalize_or_zero()
                        * (bodies[i].charge * bodies[j].charge)
                        * (-(d * d) / (spread * spread)).exp();
                    bodies[i].forces -= f;
                    bodies[j].forces += f;
                }
            }
            for k in 1..bodies.len() {
                let (head, tail) = bodies.split_at_mut(k);
                apply_shell_spring(&mut head[0], &mut tail[0], params);
            }
            for body in &mut bodies {
                body.step(params.update_step, params);
            }
        }
        let origin = bodies[0].position;
        let mut idx = 1;
        for shell in &mut self.shells {
            for orbital in &mut shell.orbitals {
                orbital.position = bodies[idx].position - origin;
                orbital.velocity = Vec3::ZERO;
                orbital.forces = Vec3::ZERO;
                idx += 1;
            }
        }
        self.nucleus.position = Vec3::ZERO;
        self.nucleus.velocity = Vec3::ZERO;
        self.nucleus.forces = Vec3::ZERO;
    }

    pub fn orbital_count(&self) -> usize {
        self.shells.iter().map(|s| s.orbitals.len()).sum()
    }

    pub fn body_count(&self) -> usize {
        1 + self.orbital_count()
    }

    pub fn outer_shell(&self) -> Option<&Shell> {
        self.shells.last()
    }

    pub fn body(&self, key: BodyKey) -> &Body {
        if key.is_nucleus() {
            &self.nucleus
        } else {
            &self.shells[key.shell as usize].orbitals[key.orbital as usize]
        }
    }

    pub fn body_mut(&mut self, key: BodyKey) -> &mut Body {
        if key.is_nucleus() {
            &mut self.nucleus
        } else {
            &mut self.shells[key.shell as usize].orbitals[key.orbital as usize]
        }
    }

    /// Nucleus first, then orbitals shell by shell.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        std::iter::once(&self.nucleus)
            .chain(self.shells.iter().flat_map(|s| s.orbitals.iter()))
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        std::iter::once(&mut self.nucleus)
            .chain(self.shells.iter_mut().flat_map(|s| s.orbitals.iter_mut()))
    }

    /// Reassign the atom id on the nucleus and every orbital.
    pub fn set_id(&mut self, id: i32) {
        self.nucleus.id = id;
        for shell in &mut self.shells {
            for orbital in &mut shell.orbitals {
                orbital.id = id;
            }
        }
    }

    /// Move the nucleus, translating every orbital by the same delta.
    pub fn set_position(&mut self, position: Vec3) {
        let delta = position - self.nucleus.position;
        self.nucleus.position = position;
        for shell in &mut self.shells {
            for orbital in &mut shell.orbitals {
                orbital.position += delta;
            }
        }
    }

    /// Overwrite the velocity of the nucleus and every orbital.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.nucleus.velocity = velocity;
        for shell in &mut self.shells {
            for orbital in &mut shell.orbitals {
                orbital.velocity = velocity;
            }
        }
    }

    /// Apply the nucleus-orbital spring to every orbital.
    pub fn update_orbital_bonds(&mut self, params: &SimParams) {
        for shell in &mut self.shells {
            for orbital in &mut shell.orbitals {
                apply_shell_spring(&mut self.nucleus, orbital, params);
            }
        }
    }

    /// Integrate the nucleus and every orbital.
    pub fn step(&mut self, step: f32, params: &SimParams) {
        self.nucleus.step(step, params);
        for shell in &mut self.shells {
            for orbital in &mut shell.orbitals {
                orbital.step(step, params);
            }
        }
    }

    /// Deterministic RGB derived from the atomic number: walk `number` steps
    /// through the color channels, flip signs on a `number % 4` schedule,
    /// mirror negatives above 1, then compress into [0.2, 1.0].
    pub fn generate_color(&mut self, params: &SimParams) {
        let n = self.number;
        let k = (n + 1) % 3;
        let mut j = (n + 1) % 2;
        let mut channel = [0i32; 3];
        for _ in 0..n {
            if j != k {
                channel[j as usize] += 1;
            }
            j = (j + 1) % 3;
        }
        // per-k sign schedule over the two channels the walk touches
        let (a, b) = match k {
            0 => (0, 1),
            1 => (1, 2),
            _ => (2, 0),
        };
        match n % 4 {
            1 => channel[a] = -channel[a],
            2 => channel[b] = -channel[b],
            3 => {
                channel[a] = -channel[a];
                channel[b] = -channel[b];
            }
            _ => {}
        }
        for i in 0..3 {
            let mut c = channel[i] as f32 * 3.0 / params.max_nucleus_protons as f32;
            if c < 0.0 {
                c = 1.0 - c;
            }
            self.color[i] = (c * 0.8 + 0.2).min(1.0);
        }
        self.color[3] = 1.0;
    }
}

/// Nucleus-orbital spring: rest length grows with the shell index, damped
/// along the separation axis.
pub(crate) fn apply_shell_spring(nucleus: &mut Body, orbital: &mut Body, params: &SimParams) {
    let x = orbital.position - nucleus.position;
    let d = x.length() - params.bond_length * (orbital.shell as f32 + 1.0);
    let xn = x.normalize_or_zero();
    let v = orbital.velocity - nucleus.velocity;
    let f = -params.bond_stiffness * d * xn - params.bond_damper * v.dot(xn) * xn;
    nucleus.forces -= f;
    orbital.forces += f;
}

fn random_span(rng: &mut ChaCha8Rng, span: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-span..=span),
        rng.gen_range(-span..=span),
        rng.gen_range(-span..=span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn build(protons: i32) -> Atom {
        let params = SimParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        Atom::new(&params, 0, protons, &mut rng)
    }

    #[test]
    fn hydrogen_has_one_valence_orbital() {
        let atom = build(1);
        assert_eq!(atom.shells.len(), 1);
        assert_eq!(atom.shells[0].orbitals.len(), 1);
        let orbital = &atom.shells[0].orbitals[0];
        assert!(orbital.has_valence);
        assert_eq!(orbital.valence, [1.0, 7.0]);
    }

    #[test]
    fn shell_layout_matches_fill_rule() {
        // (protons, shells, outer orbitals, paired in outer, valence orbitals)
        let cases = [
            (1, 1, 1, 0, 1),
            (4, 1, 4, 0, 4),
            (5, 1, 4, 1, 3),
            (6, 1, 4, 2, 2),
            (8, 1, 4, 4, 0),
            (9, 2, 1, 0, 1),
            (14, 2, 6, 0, 6),
            (18, 2, 6, 4, 2),
            (20, 2, 6, 6, 0),
        ];
        for (protons, shells, outer, paired, valence) in cases {
            let atom = build(protons);
            assert_eq!(atom.shells.len(), shells, "protons {protons}");
            let shell = atom.outer_shell().unwrap();
            assert_eq!(shell.orbitals.len(), outer, "protons {protons}");
            let p = shell.orbitals.iter().filter(|o| !o.has_valence).count();
            let v = shell.orbitals.iter().filter(|o| o.has_valence).count();
            assert_eq!(p, paired, "protons {protons}");
            assert_eq!(v, valence, "protons {protons}");
        }
    }

    #[test]
    fn inner_shell_of_two_shell_atoms_is_full_and_inert() {
        let atom = build(12);
        assert_eq!(atom.shells[0].orbitals.len(), 4);
        for orbital in &atom.shells[0].orbitals {
            assert!(!orbital.has_valence);
            let params = SimParams::default();
            assert_eq!(orbital.mass, params.electron_mass * 2.0);
            assert_eq!(orbital.charge, params.electron_charge * 2.0);
        }
    }

    #[test]
    fn valence_table_spot_checks() {
        assert_eq!(build(5).valence_pair(), [5.0 / 3.0, 1.0]);
        assert_eq!(build(6).valence_pair(), [3.0, 1.0]);
        assert_eq!(build(9).valence_pair(), [1.0, 11.0]);
        assert_eq!(build(18).valence_pair(), [5.0, 1.0]);
        assert_eq!(build(8).valence_pair(), [0.0, 0.0]);
        assert_eq!(build(20).valence_pair(), [0.0, 0.0]);
    }

    #[test]
    fn construction_rests_at_origin_with_zero_velocity() {
        let atom = build(6);
        assert_eq!(atom.nucleus.position, Vec3::ZERO);
        for body in atom.bodies() {
            assert_eq!(body.velocity, Vec3::ZERO);
            assert_eq!(body.forces, Vec3::ZERO);
            assert!(body.position.is_finite());
        }
    }

    #[test]
    fn set_position_translates_orbitals() {
        let mut atom = build(6);
        let offsets: Vec<Vec3> = atom
            .shells
            .iter()
            .flat_map(|s| s.orbitals.iter().map(|o| o.position))
            .collect();
        let target = Vec3::new(3.0, -2.0, 1.0);
        atom.set_position(target);
        assert_eq!(atom.nucleus.position, target);
        let moved: Vec<Vec3> = atom
            .shells
            .iter()
            .flat_map(|s| s.orbitals.iter().map(|o| o.position))
            .collect();
        for (before, after) in offsets.iter().zip(&moved) {
            assert!((*after - *before - target).length() < 1e-5);
        }
    }

    #[test]
    fn set_id_propagates_to_all_bodies() {
        let mut atom = build(10);
        atom.set_id(42);
        for body in atom.bodies() {
            assert_eq!(body.id, 42);
        }
    }

    #[test]
    fn color_is_deterministic_and_in_range() {
        let params = SimParams::default();
        for protons in 1..=20 {
            let a = build(protons);
            let mut b = build(protons);
            b.generate_color(&params);
            assert_eq!(a.color, b.color);
            for c in a.color {
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }
}
