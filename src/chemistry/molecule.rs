//! Molecules: connected components of the covalent bond graph, identified by
//! a canonical structural digest.
//!
//! Two molecules are the same species exactly when their digests match, no
//! matter how their atoms are ordered or which ids they carry. The digest is
//! computed over a rooted tree with a synthetic root above one node per
//! member atom. Subtrees that hash identically when their own atomic number
//! is blinded are ambiguous, so they are expanded one neighbor layer at a
//! time until every ambiguous run is resolved or fully grown; repeated edges
//! to the same neighbor fold into a parent-bond count, and a visited path
//! bounds growth around rings.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::chemistry::body::BodyKey;
use crate::chemistry::engine::Chemistry;

pub const CODE_SIZE: usize = 32;

/// Canonical molecule digest; equal bytes mean equal species.
pub type MoleculeCode = [u8; CODE_SIZE];

pub struct Molecule {
    /// Member atom ids, sorted ascending
    atom_ids: Vec<i32>,
    pub code: MoleculeCode,
}

impl Molecule {
    /// Build the molecule containing `seed_atom` from the world's current
    /// bond graph.
    pub fn new(chemistry: &Chemistry, seed_atom: i32) -> Self {
        let mut atom_ids = collect_component(chemistry, seed_atom);
        atom_ids.sort_unstable();
        let mut members = atom_ids.clone();
        members.sort_by_key(|&id| chemistry.get_atom(id).map_or(0, |a| a.number));
        let mut root = AtomTree::root();
        for &id in &members {
            root.children.push(AtomTree::node(chemistry, id));
        }
        root.generate_code(chemistry, true);
        Molecule { atom_ids, code: root.code }
    }

    pub fn size(&self) -> usize {
        self.atom_ids.len()
    }

    pub fn atom_ids(&self) -> &[i32] {
        &self.atom_ids
    }

    pub fn contains(&self, atom_id: i32) -> bool {
        self.atom_ids.binary_search(&atom_id).is_ok()
    }

    /// A molecule is closed when every valence orbital of every member is
    /// bonded: nothing further can attach.
    pub fn is_closed(&self, chemistry: &Chemistry) -> bool {
        for &id in &self.atom_ids {
            let Some(atom) = chemistry.get_atom(id) else {
                return false;
            };
            let Some(outer) = atom.outer_shell() else {
                continue;
            };
            for orbital in &outer.orbitals {
                if orbital.has_valence && orbital.covalent.is_none() {
                    return false;
                }
            }
        }
        true
    }
}

impl PartialEq for Molecule {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Molecule {}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "molecule[size={} atoms={:?} code=", self.size(), self.atom_ids)?;
        for byte in self.code {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "]")
    }
}

/// Aggregate counts over all molecules in a world.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoleculeStats {
    pub count: usize,
    pub closed_count: usize,
    /// Distinct species by digest
    pub type_count: usize,
    pub closed_type_count: usize,
    pub average_size: f32,
    pub average_closed_size: f32,
}

impl Chemistry {
    /// Partition the atoms into molecules, one per connected component of
    /// the bond graph.
    pub fn generate_molecules(&mut self) -> Vec<Molecule> {
        for atom in &mut self.atoms {
            atom.mark = -1;
        }
        let mut molecules = Vec::new();
        let mut mark = 0;
        for i in 0..self.atoms.len() {
            if self.atoms[i].mark != -1 {
                continue;
            }
            let seed = self.atoms[i].id();
            self.mark_component(seed, mark);
            mark += 1;
            molecules.push(Molecule::new(self, seed));
        }
        molecules
    }

    pub fn molecule_stats(&mut self) -> MoleculeStats {
        let molecules = self.generate_molecules();
        let mut stats = MoleculeStats { count: molecules.len(), ..MoleculeStats::default() };
        let mut types: Vec<MoleculeCode> = Vec::new();
        let mut closed_types: Vec<MoleculeCode> = Vec::new();
        let mut total = 0usize;
        let mut closed_total = 0usize;
        for molecule in &molecules {
            total += molecule.size();
            if !types.contains(&molecule.code) {
                types.push(molecule.code);
            }
            if molecule.is_closed(self) {
                stats.closed_count += 1;
                closed_total += molecule.size();
                if !closed_types.contains(&molecule.code) {
                    closed_types.push(molecule.code);
                }
            }
        }
        stats.type_count = types.len();
        stats.closed_type_count = closed_types.len();
        if stats.count > 0 {
            stats.average_size = total as f32 / stats.count as f32;
        }
        if stats.closed_count > 0 {
            stats.average_closed_size = closed_total as f32 / stats.closed_count as f32;
        }
        stats
    }

    /// Flood-fill a component mark across outer-shell bonds.
    fn mark_component(&mut self, seed: i32, mark: i32) {
        let mut stack = vec![seed];
        while let Some(id) = stack.pop() {
            let Some(&slot) = self.atom_slots.get(&id) else {
                continue;
            };
            if self.atoms[slot].mark != -1 {
                continue;
            }
            self.atoms[slot].mark = mark;
            let Some(outer) = self.atoms[slot].outer_shell() else {
                continue;
            };
            for orbital in &outer.orbitals {
                if let Some(partner) = orbital.covalent {
                    stack.push(partner.atom);
                }
            }
        }
    }
}

/// Atom ids reachable from `seed` over outer-shell bonds.
fn collect_component(chemistry: &Chemistry, seed: i32) -> Vec<i32> {
    let mut ids: Vec<i32> = Vec::new();
    let mut stack = vec![seed];
    while let Some(id) = stack.pop() {
        if ids.contains(&id) {
            continue;
        }
        let Some(atom) = chemistry.get_atom(id) else {
            continue;
        };
        ids.push(id);
        if let Some(outer) = atom.outer_shell() {
            for orbital in &outer.orbitals {
                if let Some(partner) = orbital.covalent {
                    stack.push(partner.atom);
                }
            }
        }
    }
    ids
}

/// One node of the canonicalization tree.
struct AtomTree {
    /// `None` only for the synthetic root
    atom_id: Option<i32>,
    number: i32,
    /// How many bonds connect this node to its parent
    parent_bonds: u8,
    code: MoleculeCode,
    children: Vec<AtomTree>,
    /// True once the node's neighborhood is fully unfolded
    expanded: bool,
}

impl AtomTree {
    fn root() -> Self {
        AtomTree {
            atom_id: None,
            number: 0,
            parent_bonds: 0,
            code: [0; CODE_SIZE],
            children: Vec::new(),
            expanded: false,
        }
    }

    fn node(chemistry: &Chemistry, atom_id: i32) -> Self {
        AtomTree {
            atom_id: Some(atom_id),
            number: chemistry.get_atom(atom_id).map_or(0, |a| a.number),
            parent_bonds: 1,
            code: [0; CODE_SIZE],
            children: Vec::new(),
            expanded: false,
        }
    }

    /// Compute this node's digest bottom-up. The root first runs the
    /// disambiguation loop: children are digested with their own atomic
    /// number blinded, sorted, and any run of equal unexpanded digests is
    /// grown one layer before trying again.
    fn generate_code(&mut self, chemistry: &Chemistry, hash_numbers: bool) {
        if self.atom_id.is_none() {
            loop {
                for child in &mut self.children {
                    child.generate_code(chemistry, false);
                }
                self.children.sort_by(|a, b| a.code.cmp(&b.code));
                let len = self.children.len();
                let mut run = None;
                for i in 0..len.saturating_sub(1) {
                    if !self.children[i].expanded
                        && self.children[i].code == self.children[i + 1].code
                    {
                        run = Some(i);
                        break;
                    }
                }
                let Some(start) = run else { break };
                let code = self.children[start].code;
                let mut end = start + 1;
                while end < len && self.children[end].code == code {
                    end += 1;
                }
                for child in &mut self.children[start..end] {
                    let mut path = Vec::new();
                    child.expand(chemistry, &mut path);
                }
            }
        }
        for child in &mut self.children {
            child.generate_code(chemistry, true);
        }
        self.children.sort_by(|a, b| a.code.cmp(&b.code));
        let mut hasher = Sha256::new();
        if self.atom_id.is_some() {
            if hash_numbers {
                hasher.update([self.number as u8, self.parent_bonds]);
            } else {
                hasher.update([self.parent_bonds]);
            }
        }
        for child in &self.children {
            hasher.update(child.code);
        }
        self.code = hasher.finalize().into();
    }

    /// Unfold one more neighbor layer. A leaf pulls its bonded neighbors in
    /// as children, folding repeated edges into `parent_bonds`; an interior
    /// node pushes the expansion down unless its atom already appears on the
    /// path, which closes a ring.
    fn expand(&mut self, chemistry: &Chemistry, path: &mut Vec<i32>) {
        if self.expanded {
            return;
        }
        self.expanded = true;
        let Some(atom_id) = self.atom_id else {
            return;
        };
        if self.children.is_empty() {
            if let Some(atom) = chemistry.get_atom(atom_id) {
                if let Some(outer) = atom.outer_shell() {
                    for orbital in &outer.orbitals {
                        if let Some(partner) = orbital.covalent {
                            self.adopt(chemistry, partner);
                        }
                    }
                }
            }
            if !self.children.is_empty() {
                self.expanded = false;
            }
        } else {
            if path.contains(&atom_id) {
                return;
            }
            path.push(atom_id);
            for child in &mut self.children {
                let mut branch = path.clone();
                child.expand(chemistry, &mut branch);
                if !child.expanded {
                    self.expanded = false;
                }
            }
        }
    }

    fn adopt(&mut self, chemistry: &Chemistry, partner: BodyKey) {
        if let Some(existing) = self
            .children
            .iter_mut()
            .find(|c| c.atom_id == Some(partner.atom))
        {
            existing.parent_bonds += 1;
        } else {
            self.children.push(AtomTree::node(chemistry, partner.atom));
        }
    }
}
