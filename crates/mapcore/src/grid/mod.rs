//! Sparse object grid: slot storage plus a uniform bucket index over the XZ
//! plane.

mod arena;
mod flags;

use std::cmp::Ordering;

use crate::geom::{drawing_order, Int2, Int3, ScreenRect, WorldBox};
use crate::occluder::OccluderId;

pub use arena::SlotArena;
pub use flags::ObjectFlags;

/// Edge length of one bucket node, in world units.
pub const NODE_SIZE: i32 = 24;

/// Occupant of one grid slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef<T> {
    pub payload: T,
    pub bbox: WorldBox,
    pub rect: ScreenRect,
    pub flags: ObjectFlags,
    pub occluder: Option<OccluderId>,
}

impl<T> ObjectDef<T> {
    pub fn new(payload: T, bbox: WorldBox, rect: ScreenRect, flags: ObjectFlags) -> Self {
        Self {
            payload,
            bbox,
            rect,
            flags,
            occluder: None,
        }
    }
}

/// Cached union of its members' boxes, rects and flags. Grows eagerly on
/// insert and stays conservative after removals until `update_nodes`.
#[derive(Debug, Clone, Default)]
struct Node {
    objects: Vec<usize>,
    bbox: Option<WorldBox>,
    rect: Option<ScreenRect>,
    flags: ObjectFlags,
    dirty: bool,
}

impl Node {
    fn include(&mut self, bbox: &WorldBox, rect: &ScreenRect, flags: ObjectFlags) {
        self.bbox = Some(self.bbox.map_or(*bbox, |current| current.union(bbox)));
        self.rect = Some(self.rect.map_or(*rect, |current| current.union(rect)));
        self.flags |= flags;
    }

    fn may_overlap(&self, bbox: &WorldBox, filter: ObjectFlags) -> bool {
        self.flags.matches(filter) && self.bbox.is_some_and(|node_box| node_box.overlaps(bbox))
    }

    fn may_contain_pixel(&self, point: Int2, filter: ObjectFlags) -> bool {
        self.flags.matches(filter) && self.rect.is_some_and(|rect| rect.contains(point))
    }
}

#[derive(Debug, Clone)]
pub struct Grid<T> {
    dimensions: Int2,
    node_counts: Int2,
    nodes: Vec<Node>,
    objects: SlotArena<ObjectDef<T>>,
}

impl<T> Default for Grid<T> {
    fn default() -> Self {
        Self::new(Int2::default())
    }
}

impl<T> Grid<T> {
    /// `dimensions` is the XZ extent in world units; negative values are
    /// treated as zero.
    pub fn new(dimensions: Int2) -> Self {
        let dimensions = Int2::new(dimensions.x.max(0), dimensions.y.max(0));
        let node_counts = Int2::new(
            (dimensions.x + NODE_SIZE - 1) / NODE_SIZE,
            (dimensions.y + NODE_SIZE - 1) / NODE_SIZE,
        );
        let node_total = node_counts.x as usize * node_counts.y as usize;
        Self {
            dimensions,
            node_counts,
            nodes: vec![Node::default(); node_total],
            objects: SlotArena::new(),
        }
    }

    /// Declared XZ size, exactly as passed to [`Grid::new`].
    pub fn dimensions(&self) -> Int2 {
        self.dimensions
    }

    pub fn is_inside(&self, bbox: &WorldBox) -> bool {
        bbox.min.x >= 0
            && bbox.min.z >= 0
            && bbox.max.x <= self.dimensions.x
            && bbox.max.z <= self.dimensions.y
    }

    pub fn is_inside_point(&self, point: Int3) -> bool {
        point.x >= 0 && point.z >= 0 && point.x < self.dimensions.x && point.z < self.dimensions.y
    }

    pub fn find_free_object(&self) -> usize {
        self.objects.find_free()
    }

    /// # Panics
    ///
    /// Panics if `idx` is occupied or the object's box leaves the grid.
    pub fn add_at(&mut self, idx: usize, def: ObjectDef<T>) {
        assert!(
            self.is_inside(&def.bbox),
            "object box {:?} lies outside grid of size {:?}",
            def.bbox,
            self.dimensions
        );
        for node_id in self.node_ids(&def.bbox) {
            let node = &mut self.nodes[node_id];
            node.objects.push(idx);
            node.include(&def.bbox, &def.rect, def.flags);
        }
        self.objects.insert_at(idx, def);
    }

    pub fn add(&mut self, def: ObjectDef<T>) -> usize {
        let idx = self.find_free_object();
        self.add_at(idx, def);
        idx
    }

    /// # Panics
    ///
    /// Panics if `idx` is out of range or already free.
    pub fn remove(&mut self, idx: usize) -> ObjectDef<T> {
        let def = self.objects.remove(idx);
        for node_id in self.node_ids(&def.bbox) {
            let node = &mut self.nodes[node_id];
            node.objects.retain(|member| *member != idx);
            node.dirty = true;
        }
        def
    }

    pub fn get(&self, idx: usize) -> Option<&ObjectDef<T>> {
        self.objects.get(idx)
    }

    /// # Panics
    ///
    /// Panics if `idx` is not occupied.
    pub fn object(&self, idx: usize) -> &ObjectDef<T> {
        match self.objects.get(idx) {
            Some(def) => def,
            None => panic!("grid slot {idx} is not occupied"),
        }
    }

    /// Number of slots, including free ones.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.objects.occupied_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ObjectDef<T>)> {
        self.objects.iter()
    }

    pub fn set_flags(&mut self, idx: usize, flags: ObjectFlags) {
        let bbox = {
            let Some(def) = self.objects.get_mut(idx) else {
                panic!("grid slot {idx} is not occupied");
            };
            if def.flags == flags {
                return;
            }
            def.flags = flags;
            def.bbox
        };
        for node_id in self.node_ids(&bbox) {
            let node = &mut self.nodes[node_id];
            node.flags |= flags;
            node.dirty = true;
        }
    }

    pub fn set_occluder(&mut self, idx: usize, occluder: Option<OccluderId>) {
        match self.objects.get_mut(idx) {
            Some(def) => def.occluder = occluder,
            None => panic!("grid slot {idx} is not occupied"),
        }
    }

    /// Tightens node caches that went stale after removals or flag changes.
    pub fn update_nodes(&mut self) {
        for node in self.nodes.iter_mut().filter(|node| node.dirty) {
            node.bbox = None;
            node.rect = None;
            node.flags = ObjectFlags::empty();
            node.dirty = false;
            for &idx in &node.objects {
                if let Some(def) = self.objects.get(idx) {
                    node.bbox = Some(node.bbox.map_or(def.bbox, |current| current.union(&def.bbox)));
                    node.rect = Some(node.rect.map_or(def.rect, |current| current.union(&def.rect)));
                    node.flags |= def.flags;
                }
            }
        }
    }

    /// Any occupied slot other than `ignored` whose box overlaps `bbox` and
    /// whose flags match `filter`.
    pub fn find_any(&self, bbox: &WorldBox, ignored: Option<usize>, filter: ObjectFlags) -> Option<usize> {
        for node_id in self.node_ids(bbox) {
            let node = &self.nodes[node_id];
            if !node.may_overlap(bbox, filter) {
                continue;
            }
            let found = node.objects.iter().copied().find(|&idx| {
                Some(idx) != ignored
                    && self
                        .objects
                        .get(idx)
                        .is_some_and(|def| def.flags.matches(filter) && def.bbox.overlaps(bbox))
            });
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Every matching overlapping slot, ascending and without repeats.
    pub fn find_all(&self, bbox: &WorldBox, ignored: Option<usize>, filter: ObjectFlags) -> Vec<usize> {
        let mut out = Vec::new();
        for node_id in self.node_ids(bbox) {
            let node = &self.nodes[node_id];
            if !node.may_overlap(bbox, filter) {
                continue;
            }
            out.extend(node.objects.iter().copied().filter(|&idx| {
                Some(idx) != ignored
                    && self
                        .objects
                        .get(idx)
                        .is_some_and(|def| def.flags.matches(filter) && def.bbox.overlaps(bbox))
            }));
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Slots whose screen rect overlaps `view`.
    pub fn find_all_in_rect(&self, view: &ScreenRect, filter: ObjectFlags) -> Vec<usize> {
        let mut out = Vec::new();
        for node in &self.nodes {
            if !node.flags.matches(filter) || !node.rect.is_some_and(|rect| rect.overlaps(view)) {
                continue;
            }
            out.extend(node.objects.iter().copied().filter(|&idx| {
                self.objects
                    .get(idx)
                    .is_some_and(|def| def.flags.matches(filter) && def.rect.overlaps(view))
            }));
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Topmost object under a screen point.
    ///
    /// `test` is the narrow phase and receives the screen point unchanged.
    /// Among all hits the one drawn last wins.
    pub fn pixel_intersect<F>(&self, point: Int2, mut test: F, filter: ObjectFlags) -> Option<usize>
    where
        F: FnMut(&ObjectDef<T>, Int2) -> bool,
    {
        let mut best: Option<(usize, WorldBox)> = None;
        for node in &self.nodes {
            if !node.may_contain_pixel(point, filter) {
                continue;
            }
            for &idx in &node.objects {
                let Some(def) = self.objects.get(idx) else {
                    continue;
                };
                if !def.flags.matches(filter) || !def.rect.contains(point) || !test(def, point) {
                    continue;
                }
                let replaces = match &best {
                    None => true,
                    Some((_, best_box)) => drawing_order(&def.bbox, best_box) == Ordering::Greater,
                };
                if replaces {
                    best = Some((idx, def.bbox));
                }
            }
        }
        best.map(|(idx, _)| idx)
    }

    pub fn swap(&mut self, other: &mut Grid<T>) {
        std::mem::swap(self, other);
    }

    /// Drops every object; dimensions are kept.
    pub fn clear(&mut self) {
        self.objects.clear();
        for node in &mut self.nodes {
            *node = Node::default();
        }
    }

    fn node_ids(&self, bbox: &WorldBox) -> impl Iterator<Item = usize> {
        let counts = self.node_counts;
        let range = if counts.x == 0 || counts.y == 0 {
            None
        } else {
            let to_node = |value: i32, count: i32| (value.div_euclid(NODE_SIZE)).clamp(0, count - 1);
            let last_x = (bbox.max.x - 1).max(bbox.min.x);
            let last_z = (bbox.max.z - 1).max(bbox.min.z);
            Some((
                to_node(bbox.min.x, counts.x)..=to_node(last_x, counts.x),
                to_node(bbox.min.z, counts.y)..=to_node(last_z, counts.y),
            ))
        };
        range.into_iter().flat_map(move |(xs, zs)| {
            zs.flat_map(move |z| xs.clone().map(move |x| (x + z * counts.x) as usize))
        })
    }
}
