//! Bounded octree over point objects.
//!
//! The tree subdivides lazily: a node holds objects directly until an insert
//! arrives that is not "close" to what it already holds, at which point the
//! node splits and pushes its objects down into octant children. Two points
//! are close when `(squared_distance * precision) as i32 == 0`, so the
//! `precision` argument sets how tightly points cluster before a split.
//! Removals contract the tree back upward: empty children are dropped and a
//! lone surviving leaf child is folded into its parent.
//!
//! Nodes and tracked objects live in arena vectors and refer to each other by
//! index; callers hold [`ObjectId`] handles. A flat handle list shadows the
//! tree so iteration over everything tracked is a plain slice walk.

use glam::Vec3;

/// Handle to a tracked object. Valid until the object is removed or culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

struct Tracked<T> {
    position: Vec3,
    payload: T,
    /// Node currently holding this object; `None` once the object has fallen
    /// outside the tree bounds.
    node: Option<usize>,
    /// Slot in the flat handle list
    list_slot: usize,
}

struct Node {
    center: Vec3,
    /// Half-extent per axis
    span: f32,
    parent: Option<usize>,
    children: [Option<usize>; 8],
    child_count: u8,
    objects: Vec<ObjectId>,
}

pub struct Octree<T: Copy> {
    center: Vec3,
    span: f32,
    precision: f32,
    root: Option<usize>,
    nodes: Vec<Node>,
    free_nodes: Vec<usize>,
    objects: Vec<Tracked<T>>,
    free_objects: Vec<usize>,
    list: Vec<ObjectId>,
}

impl<T: Copy> Octree<T> {
    pub fn new(center: Vec3, span: f32, precision: f32) -> Self {
        Self {
            center,
            span,
            precision,
            root: None,
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            objects: Vec::new(),
            free_objects: Vec::new(),
            list: Vec::new(),
        }
    }

    /// Number of tracked objects.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Flat list of every tracked object, in no particular order.
    pub fn handles(&self) -> &[ObjectId] {
        &self.list
    }

    pub fn contains(&self, point: Vec3) -> bool {
        Self::box_contains(self.center, self.span, point)
    }

    pub fn position(&self, id: ObjectId) -> Vec3 {
        self.objects[id.0].position
    }

    pub fn payload(&self, id: ObjectId) -> T {
        self.objects[id.0].payload
    }

    /// Track a new object. Fails when the position is outside the bounds.
    pub fn insert(&mut self, position: Vec3, payload: T) -> Option<ObjectId> {
        if !self.contains(position) {
            return None;
        }
        let id = self.alloc_object(position, payload);
        let root = match self.root {
            Some(root) => root,
            None => {
                let root = self.alloc_node(self.center, self.span, None);
                self.root = Some(root);
                root
            }
        };
        self.node_insert(root, id, false);
        self.objects[id.0].list_slot = self.list.len();
        self.list.push(id);
        Some(id)
    }

    /// Stop tracking an object, contracting the tree around the hole.
    pub fn remove(&mut self, id: ObjectId) -> T {
        let payload = self.objects[id.0].payload;
        if let Some(node) = self.objects[id.0].node {
            self.detach(node, id);
            if let Some(parent) = self.nodes[node].parent {
                self.contract(parent);
            }
        }
        self.unlist(id);
        self.free_objects.push(id.0);
        payload
    }

    /// Update an object's position. Staying inside its node is a cheap
    /// overwrite; crossing a node boundary re-inserts from the parent upward.
    /// Returns false when the object left the tree bounds entirely; it stays
    /// in the flat list for [`cull`](Self::cull) to collect.
    pub fn move_object(&mut self, id: ObjectId, position: Vec3) -> bool {
        self.objects[id.0].position = position;
        let Some(node) = self.objects[id.0].node else {
            return false;
        };
        {
            let n = &self.nodes[node];
            if Self::box_contains(n.center, n.span, position) {
                return true;
            }
        }
        self.detach(node, id);
        let parent = self.nodes[node].parent;
        let moved = match parent {
            Some(parent) => self.node_insert(parent, id, true),
            None => false,
        };
        if self.nodes[node].objects.is_empty() {
            if let Some(parent) = self.nodes[node].parent {
                self.contract(parent);
            }
        }
        moved
    }

    /// Collect every object within `radius` of `point` into `out`.
    pub fn search(&self, point: Vec3, radius: f32, out: &mut Vec<T>) {
        out.clear();
        if let Some(root) = self.root {
            self.node_search(root, point, radius, radius * radius, out);
        }
    }

    /// Remove and return every object that has drifted outside the bounds.
    pub fn cull(&mut self) -> Vec<T> {
        let strays: Vec<ObjectId> = self
            .list
            .iter()
            .copied()
            .filter(|&id| !self.contains(self.objects[id.0].position))
            .collect();
        strays.into_iter().map(|id| self.remove(id)).collect()
    }

    fn node_insert(&mut self, node: usize, id: ObjectId, up: bool) -> bool {
        let position = self.objects[id.0].position;
        let (center, span, parent) = {
            let n = &self.nodes[node];
            (n.center, n.span, n.parent)
        };
        if up && !Self::box_contains(center, span, position) {
            return match parent {
                Some(parent) => self.node_insert(parent, id, true),
                None => false,
            };
        }
        let (empty_leaf, close) = {
            let n = &self.nodes[node];
            let empty_leaf = n.objects.is_empty() && n.child_count == 0;
            let close = n
                .objects
                .first()
                .map(|&o| self.is_close(self.objects[o.0].position, position))
                .unwrap_or(false);
            (empty_leaf, close)
        };
        if empty_leaf || close {
            self.attach(node, id);
            return true;
        }
        let oct = Self::octant(center, position);
        match self.nodes[node].children[oct] {
            Some(child) => {
                self.node_insert(child, id, false);
            }
            None => {
                let half = span / 2.0;
                let child = self.alloc_node(center + Self::octant_offset(oct, half), half, Some(node));
                self.nodes[node].children[oct] = Some(child);
                self.nodes[node].child_count += 1;
                self.attach(child, id);
            }
        }
        // the node just split: push any objects it was holding down as well
        let held = std::mem::take(&mut self.nodes[node].objects);
        for o in held {
            self.objects[o.0].node = None;
            self.node_insert(node, o, false);
        }
        true
    }

    fn node_search(&self, node: usize, point: Vec3, radius: f32, r2: f32, out: &mut Vec<T>) {
        let n = &self.nodes[node];
        for &o in &n.objects {
            let tracked = &self.objects[o.0];
            if tracked.position.distance_squared(point) <= r2 {
                out.push(tracked.payload);
            }
        }
        for &child in n.children.iter().flatten() {
            let c = &self.nodes[child];
            if point.x + radius < c.center.x - c.span
                || point.x - radius > c.center.x + c.span
                || point.y + radius < c.center.y - c.span
                || point.y - radius > c.center.y + c.span
                || point.z + radius < c.center.z - c.span
                || point.z - radius > c.center.z + c.span
            {
                continue;
            }
            self.node_search(child, point, radius, r2, out);
        }
    }

    /// Drop empty leaf children. When exactly one non-empty leaf child
    /// survives, fold its objects into this node and keep contracting upward.
    fn contract(&mut self, node: usize) {
        let mut lone_leaf = None;
        for i in 0..8 {
            let Some(child) = self.nodes[node].children[i] else {
                continue;
            };
            if self.nodes[child].child_count > 0 {
                continue;
            }
            if self.nodes[child].objects.is_empty() {
                self.free_node(child);
                self.nodes[node].children[i] = None;
                self.nodes[node].child_count -= 1;
            } else {
                lone_leaf = Some((i, child));
            }
        }
        match self.nodes[node].child_count {
            0 => {
                if let Some(parent) = self.nodes[node].parent {
                    self.contract(parent);
                }
            }
            1 => {
                if let Some((i, child)) = lone_leaf {
                    let pulled = std::mem::take(&mut self.nodes[child].objects);
                    for &o in &pulled {
                        self.objects[o.0].node = Some(node);
                    }
                    self.nodes[node].objects = pulled;
                    self.free_node(child);
                    self.nodes[node].children[i] = None;
                    self.nodes[node].child_count -= 1;
                    if let Some(parent) = self.nodes[node].parent {
                        self.contract(parent);
                    }
                }
            }
            _ => {}
        }
    }

    fn attach(&mut self, node: usize, id: ObjectId) {
        self.nodes[node].objects.push(id);
        self.objects[id.0].node = Some(node);
    }

    fn detach(&mut self, node: usize, id: ObjectId) {
        let objects = &mut self.nodes[node].objects;
        if let Some(i) = objects.iter().position(|&o| o == id) {
            objects.remove(i);
        }
        self.objects[id.0].node = None;
    }

    fn unlist(&mut self, id: ObjectId) {
        let slot = self.objects[id.0].list_slot;
        self.list.swap_remove(slot);
        if let Some(&moved) = self.list.get(slot) {
            self.objects[moved.0].list_slot = slot;
        }
    }

    fn is_close(&self, a: Vec3, b: Vec3) -> bool {
        (a.distance_squared(b) * self.precision) as i32 == 0
    }

    fn box_contains(center: Vec3, span: f32, p: Vec3) -> bool {
        p.x >= center.x - span
            && p.x < center.x + span
            && p.y >= center.y - span
            && p.y < center.y + span
            && p.z >= center.z - span
            && p.z < center.z + span
    }

    fn octant(center: Vec3, p: Vec3) -> usize {
        let mut i = 0;
        if p.z >= center.z {
            i += 4;
        }
        if p.x >= center.x {
            i += 2;
        }
        if p.y >= center.y {
            i += 1;
        }
        i
    }

    fn octant_offset(oct: usize, half: f32) -> Vec3 {
        Vec3::new(
            if oct & 2 != 0 { half } else { -half },
            if oct & 1 != 0 { half } else { -half },
            if oct & 4 != 0 { half } else { -half },
        )
    }

    fn alloc_node(&mut self, center: Vec3, span: f32, parent: Option<usize>) -> usize {
        let node = Node {
            center,
            span,
            parent,
            children: [None; 8],
            child_count: 0,
            objects: Vec::new(),
        };
        match self.free_nodes.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, i: usize) {
        self.free_nodes.push(i);
    }

    fn alloc_object(&mut self, position: Vec3, payload: T) -> ObjectId {
        let tracked = Tracked { position, payload, node: None, list_slot: usize::MAX };
        match self.free_objects.pop() {
            Some(i) => {
                self.objects[i] = tracked;
                ObjectId(i)
            }
            None => {
                self.objects.push(tracked);
                ObjectId(self.objects.len() - 1)
            }
        }
    }
}
