//! Occluders: sets of touching objects that are hidden or shown together.
//!
//! The map keeps the occluder link on each grid object; [`OccluderMap`] owns
//! the member lists. Every mutating method takes the grid explicitly so both
//! sides are updated in one call.

use thiserror::Error;

use crate::document::{DocumentError, XmlDocument};
use crate::geom::{Int3, WorldBox};
use crate::grid::{Grid, ObjectFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccluderId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Occluder {
    /// Grid slots of the members, in discovery order.
    pub objects: Vec<usize>,
    pub bbox: WorldBox,
    pub is_visible: bool,
    pub parent: Option<OccluderId>,
}

impl Default for Occluder {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            bbox: WorldBox::default(),
            is_visible: true,
            parent: None,
        }
    }
}

impl Occluder {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Decides which occluders are shown for the current view.
pub trait OcclusionConfig {
    fn is_occluder_visible(&self, id: OccluderId, occluder: &Occluder) -> bool;
}

/// Shows occluders whose lowest point is at or below `max_height`; everything
/// starting above the cutoff is hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightCutoff {
    pub max_height: i32,
}

impl OcclusionConfig for HeightCutoff {
    fn is_occluder_visible(&self, _id: OccluderId, occluder: &Occluder) -> bool {
        occluder.bbox.min.y <= self.max_height
    }
}

#[derive(Debug, Error)]
pub enum OccluderLoadError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("occluder {occluder} references unknown tile id {tile_id}")]
    UnknownMember { occluder: usize, tile_id: i32 },
    #[error("tile id {tile_id} belongs to more than one occluder")]
    DuplicateMember { tile_id: i32 },
    #[error("occluder {occluder} has invalid parent {parent} (occluder count {count})")]
    InvalidParent {
        occluder: usize,
        parent: i32,
        count: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OccluderMap {
    occluders: Vec<Occluder>,
}

impl OccluderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occluder slots, including emptied ones awaiting reuse.
    pub fn len(&self) -> usize {
        self.occluders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occluders.is_empty()
    }

    pub fn get(&self, id: OccluderId) -> Option<&Occluder> {
        self.occluders.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OccluderId, &Occluder)> {
        self.occluders
            .iter()
            .enumerate()
            .map(|(idx, occluder)| (OccluderId(idx), occluder))
    }

    /// Grows an occluder from `representative` over every touching object at
    /// or above the representative's floor level.
    ///
    /// Objects already owned by another occluder stop the fill; that occluder
    /// becomes a child of the new one unless it already has a parent. If the
    /// representative is already a member its occluder is returned unchanged.
    pub fn add_occluder<T>(&mut self, grid: &mut Grid<T>, representative: usize) -> OccluderId {
        let representative_def = grid.object(representative);
        if let Some(existing) = representative_def.occluder {
            return existing;
        }
        let min_height = representative_def.bbox.min.y;

        let id = match self.occluders.iter().position(Occluder::is_empty) {
            Some(idx) => {
                self.occluders[idx] = Occluder::default();
                OccluderId(idx)
            }
            None => {
                self.occluders.push(Occluder::default());
                OccluderId(self.occluders.len() - 1)
            }
        };

        grid.set_occluder(representative, Some(id));
        let mut pending = vec![representative];
        let mut members = Vec::new();
        let mut bbox: Option<WorldBox> = None;

        while let Some(slot) = pending.pop() {
            members.push(slot);
            let object_box = grid.object(slot).bbox;
            bbox = Some(bbox.map_or(object_box, |current| current.union(&object_box)));

            let mut search = object_box.expanded(Int3::new(1, 0, 1), Int3::new(1, 1, 1));
            search.min.y = search.min.y.max(min_height);

            for neighbour in grid.find_all(&search, Some(slot), ObjectFlags::ALL_TYPES) {
                match grid.object(neighbour).occluder {
                    Some(other) => {
                        let adopt = other != id
                            && self.occluders[id.0].parent != Some(other)
                            && self.occluders[other.0].parent.is_none();
                        if adopt {
                            self.occluders[other.0].parent = Some(id);
                        }
                    }
                    None => {
                        grid.set_occluder(neighbour, Some(id));
                        pending.push(neighbour);
                    }
                }
            }
        }

        let occluder = &mut self.occluders[id.0];
        occluder.objects = members;
        occluder.bbox = bbox.unwrap_or_default();
        id
    }

    /// Empties an occluder and unlinks its members. Children are handed to the
    /// removed occluder's parent.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn remove_occluder<T>(&mut self, grid: &mut Grid<T>, id: OccluderId) {
        assert!(
            id.0 < self.occluders.len(),
            "occluder {} out of range (count {})",
            id.0,
            self.occluders.len()
        );
        let grandparent = self.occluders[id.0].parent;
        for occluder in &mut self.occluders {
            if occluder.parent == Some(id) {
                occluder.parent = grandparent;
            }
        }
        self.occluders[id.0] = Occluder::default();

        let linked = grid
            .iter()
            .filter(|(_, def)| def.occluder == Some(id))
            .map(|(slot, _)| slot)
            .collect::<Vec<_>>();
        for slot in linked {
            grid.set_occluder(slot, None);
        }
    }

    /// Drops `slot` from its occluder's member list, if it has one.
    pub fn remove_object<T>(&mut self, grid: &mut Grid<T>, slot: usize) {
        let Some(id) = grid.object(slot).occluder else {
            return;
        };
        grid.set_occluder(slot, None);
        let Some(occluder) = self.occluders.get_mut(id.0) else {
            return;
        };
        if let Some(pos) = occluder.objects.iter().position(|member| *member == slot) {
            occluder.objects.swap_remove(pos);
        }
        self.refresh_bounds(grid, id);
    }

    pub fn clear<T>(&mut self, grid: &mut Grid<T>) {
        let linked = grid
            .iter()
            .filter(|(_, def)| def.occluder.is_some())
            .map(|(slot, _)| slot)
            .collect::<Vec<_>>();
        for slot in linked {
            grid.set_occluder(slot, None);
        }
        self.occluders.clear();
    }

    /// Builds the occluders of a rebuilt grid. `slot_map[old]` is the new slot
    /// of each surviving object; occluders left without members are dropped
    /// and the rest renumbered.
    pub(crate) fn remapped<T>(&self, grid: &mut Grid<T>, slot_map: &[Option<usize>]) -> OccluderMap {
        let mut rebuilt = OccluderMap::new();
        let mut new_ids = vec![None; self.occluders.len()];
        for (idx, occluder) in self.occluders.iter().enumerate() {
            let objects = occluder
                .objects
                .iter()
                .filter_map(|slot| slot_map.get(*slot).copied().flatten())
                .collect::<Vec<_>>();
            if objects.is_empty() {
                continue;
            }
            let id = OccluderId(rebuilt.occluders.len());
            new_ids[idx] = Some(id);
            for slot in &objects {
                grid.set_occluder(*slot, Some(id));
            }
            rebuilt.occluders.push(Occluder {
                objects,
                bbox: WorldBox::default(),
                is_visible: occluder.is_visible,
                parent: occluder.parent,
            });
            rebuilt.refresh_bounds(grid, id);
        }
        for occluder in &mut rebuilt.occluders {
            occluder.parent = occluder
                .parent
                .and_then(|parent| new_ids.get(parent.0).copied().flatten());
        }
        rebuilt
    }

    /// Recomputes an occluder's box from its members' current boxes.
    pub(crate) fn refresh_bounds<T>(&mut self, grid: &Grid<T>, id: OccluderId) {
        let Some(occluder) = self.occluders.get_mut(id.0) else {
            return;
        };
        occluder.bbox = occluder
            .objects
            .iter()
            .filter_map(|member| grid.get(*member).map(|def| def.bbox))
            .reduce(|lhs, rhs| lhs.union(&rhs))
            .unwrap_or_default();
    }

    /// Re-evaluates every non-empty occluder. Returns whether any changed.
    pub fn update_visibility(&mut self, config: &impl OcclusionConfig) -> bool {
        let mut changed = false;
        for (idx, occluder) in self.occluders.iter_mut().enumerate() {
            if occluder.is_empty() {
                continue;
            }
            let visible = config.is_occluder_visible(OccluderId(idx), occluder);
            if visible != occluder.is_visible {
                occluder.is_visible = visible;
                changed = true;
            }
        }
        changed
    }

    /// Writes the `occluders` section.
    ///
    /// `tile_ids` maps grid slots to the ids the tile section assigned. Empty
    /// occluders are skipped and the remaining ones renumbered densely.
    pub fn save_to_xml(&self, tile_ids: &[Option<u32>], doc: &mut XmlDocument) {
        let mut compacted = vec![None; self.occluders.len()];
        let mut next = 0_i32;
        for (idx, occluder) in self.occluders.iter().enumerate() {
            if !occluder.is_empty() {
                compacted[idx] = Some(next);
                next += 1;
            }
        }

        let section = doc.add_child("occluders");
        for occluder in self.occluders.iter().filter(|occluder| !occluder.is_empty()) {
            let parent = occluder
                .parent
                .and_then(|parent| compacted.get(parent.0).copied().flatten())
                .unwrap_or(-1);
            let node = section.add_child("occluder");
            node.set_attr("parent", parent);

            let mut members = occluder
                .objects
                .iter()
                .filter_map(|slot| tile_ids.get(*slot).copied().flatten())
                .collect::<Vec<_>>();
            members.sort_unstable();
            for tile_id in members {
                node.add_child("o").set_text(tile_id);
            }
        }
    }

    /// Rebuilds occluders from the `occluders` section, if present.
    ///
    /// `slots_by_tile_id` resolves the ids written by [`OccluderMap::save_to_xml`]
    /// back to grid slots; `None` marks a placement the map loader skipped.
    /// On error every occluder link is cleared.
    pub fn load_from_xml<T>(
        &mut self,
        grid: &mut Grid<T>,
        doc: &XmlDocument,
        slots_by_tile_id: &[Option<usize>],
    ) -> Result<(), OccluderLoadError> {
        self.clear(grid);
        let result = self.load_sections(grid, doc, slots_by_tile_id);
        if result.is_err() {
            self.clear(grid);
        }
        result
    }

    fn load_sections<T>(
        &mut self,
        grid: &mut Grid<T>,
        doc: &XmlDocument,
        slots_by_tile_id: &[Option<usize>],
    ) -> Result<(), OccluderLoadError> {
        let Some(section) = doc.child("occluders") else {
            return Ok(());
        };

        let mut parents = Vec::new();
        for node in section.children_named("occluder") {
            let id = OccluderId(self.occluders.len());
            parents.push(node.int_attr("parent")?);

            let mut occluder = Occluder::default();
            let mut bbox: Option<WorldBox> = None;
            for member in node.children_named("o") {
                let tile_id = member.text_int()?;
                let resolved = usize::try_from(tile_id)
                    .ok()
                    .and_then(|tile_id| slots_by_tile_id.get(tile_id).copied())
                    .ok_or(OccluderLoadError::UnknownMember {
                        occluder: id.0,
                        tile_id,
                    })?;
                // Placement skipped while loading the tile section.
                let Some(slot) = resolved else {
                    continue;
                };
                let def = grid.object(slot);
                if def.occluder.is_some() {
                    return Err(OccluderLoadError::DuplicateMember { tile_id });
                }
                let member_box = def.bbox;
                bbox = Some(bbox.map_or(member_box, |current| current.union(&member_box)));
                grid.set_occluder(slot, Some(id));
                occluder.objects.push(slot);
            }
            occluder.bbox = bbox.unwrap_or_default();
            self.occluders.push(occluder);
        }

        let count = self.occluders.len();
        for (idx, parent) in parents.into_iter().enumerate() {
            self.occluders[idx].parent = match parent {
                -1 => None,
                value if value >= 0 && (value as usize) < count && value as usize != idx => {
                    Some(OccluderId(value as usize))
                }
                value => {
                    return Err(OccluderLoadError::InvalidParent {
                        occluder: idx,
                        parent: value,
                        count,
                    })
                }
            };
        }
        Ok(())
    }
}
