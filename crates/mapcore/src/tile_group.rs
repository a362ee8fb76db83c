//! Tiles partitioned into groups for auto-tiling.
//!
//! Every entry belongs to exactly one group and group ids are always the
//! dense range `0..group_count()`. A group disappears as soon as its last
//! entry leaves; the last group then takes over the freed id.

use thiserror::Error;
use tracing::info;

use crate::catalogue::{TileCatalogue, TileId};
use crate::document::{line_suffix, DocumentError, XmlDocument, XmlElement};
use crate::geom::Int3;

pub const SIDE_COUNT: usize = 8;

/// Neighbour offset for each side, counter-clockwise starting from +z.
pub const SIDE_OFFSETS: [Int3; SIDE_COUNT] = [
    Int3::new(0, 0, 1),
    Int3::new(1, 0, 1),
    Int3::new(1, 0, 0),
    Int3::new(1, 0, -1),
    Int3::new(0, 0, -1),
    Int3::new(-1, 0, -1),
    Int3::new(-1, 0, 0),
    Int3::new(-1, 0, 1),
];

const SIDE_ATTRIBUTES: [&str; SIDE_COUNT] = [
    "side_surf_0",
    "side_surf_1",
    "side_surf_2",
    "side_surf_3",
    "side_surf_4",
    "side_surf_5",
    "side_surf_6",
    "side_surf_7",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    tile: TileId,
    group_id: usize,
    is_dirty: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Group {
    entry_count: usize,
    side_surf: [Option<i32>; SIDE_COUNT],
}

#[derive(Debug, Error)]
pub enum TileGroupLoadError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("entry references unknown tile '{name}'{}", line_suffix(.line))]
    UnknownTile { name: String, line: Option<usize> },
    #[error("tile '{name}' has more than one entry{}", line_suffix(.line))]
    DuplicateTile { name: String, line: Option<usize> },
    #[error("entry for '{name}' uses group {group_id} but only {group_count} groups exist")]
    GroupOutOfRange {
        name: String,
        group_id: i32,
        group_count: usize,
    },
    #[error("group {group_id} has no entries")]
    EmptyGroup { group_id: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileGroup {
    entries: Vec<Entry>,
    groups: Vec<Group>,
}

impl TileGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `tile` in a group of its own. The caller makes sure the tile
    /// has no entry yet (see [`TileGroup::find_entry`]).
    pub fn add_entry(&mut self, tile: TileId) {
        self.entries.push(Entry {
            tile,
            group_id: self.groups.len(),
            is_dirty: false,
        });
        self.groups.push(Group {
            entry_count: 1,
            ..Group::default()
        });
    }

    pub fn find_entry(&self, tile: TileId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.tile == tile)
    }

    pub fn is_valid_entry_id(&self, entry_id: usize) -> bool {
        entry_id < self.entries.len()
    }

    /// Moves an entry into `group_id`; `group_id == group_count()` opens a
    /// new group for it.
    pub fn set_entry_group(&mut self, entry_id: usize, group_id: usize) {
        self.check_entry(entry_id);
        assert!(
            group_id <= self.groups.len(),
            "group {group_id} out of range (count {})",
            self.groups.len()
        );

        let last_group = self.entries[entry_id].group_id;
        if group_id == last_group {
            return;
        }
        self.entries[entry_id].group_id = group_id;
        if group_id == self.groups.len() {
            self.groups.push(Group::default());
        }
        self.groups[group_id].entry_count += 1;
        self.dec_group_entry_count(last_group);
    }

    /// Swap-removes the entry; the former last entry takes over `entry_id`.
    pub fn remove_entry(&mut self, entry_id: usize) {
        self.check_entry(entry_id);
        let removed = self.entries.swap_remove(entry_id);
        self.dec_group_entry_count(removed.group_id);
    }

    fn dec_group_entry_count(&mut self, group_id: usize) {
        self.check_group(group_id);
        let group = &mut self.groups[group_id];
        group.entry_count -= 1;
        if group.entry_count > 0 {
            return;
        }

        self.groups.swap_remove(group_id);
        let moved_from = self.groups.len();
        for entry in &mut self.entries {
            if entry.group_id == moved_from {
                entry.group_id = group_id;
            }
        }
    }

    pub fn entry_group(&self, entry_id: usize) -> usize {
        self.check_entry(entry_id);
        self.entries[entry_id].group_id
    }

    pub fn entry_tile(&self, entry_id: usize) -> TileId {
        self.check_entry(entry_id);
        self.entries[entry_id].tile
    }

    pub fn is_entry_dirty(&self, entry_id: usize) -> bool {
        self.check_entry(entry_id);
        self.entries[entry_id].is_dirty
    }

    pub fn set_entry_dirty(&mut self, entry_id: usize, is_dirty: bool) {
        self.check_entry(entry_id);
        self.entries[entry_id].is_dirty = is_dirty;
    }

    /// Surface ids are non-negative; `None` clears the side.
    ///
    /// # Panics
    ///
    /// Panics if `group_id` is out of range or `surface` is negative.
    pub fn set_group_surface(&mut self, group_id: usize, side: usize, surface: Option<i32>) {
        self.check_group(group_id);
        if let Some(value) = surface {
            assert!(value >= 0, "surface id {value} must not be negative");
        }
        self.groups[group_id].side_surf[side] = surface;
    }

    pub fn group_surface(&self, group_id: usize, side: usize) -> Option<i32> {
        self.check_group(group_id);
        self.groups[group_id].side_surf[side]
    }

    pub fn group_surfaces(&self, group_id: usize) -> &[Option<i32>; SIDE_COUNT] {
        self.check_group(group_id);
        &self.groups[group_id].side_surf
    }

    /// True when all sides carry the same surface, unset included.
    pub fn is_group_surface_uniform(&self, group_id: usize) -> bool {
        let [first, rest @ ..] = self.group_surfaces(group_id);
        rest.iter().all(|surface| surface == first)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_entry_count(&self, group_id: usize) -> usize {
        self.check_group(group_id);
        self.groups[group_id].entry_count
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.groups.clear();
    }

    /// Appends one `entry` node per entry followed by one `group` node per
    /// group.
    ///
    /// # Panics
    ///
    /// Panics if an entry's tile is missing from `catalogue`.
    pub fn save_to_xml(&self, doc: &mut XmlDocument, catalogue: &TileCatalogue) {
        for entry in &self.entries {
            let Some(tile) = catalogue.tile(entry.tile) else {
                panic!("tile {:?} of a group entry is not in the catalogue", entry.tile);
            };
            doc.add_child("entry")
                .set_attr("tile", &tile.name)
                .set_attr("group_id", entry.group_id)
                .set_attr("is_dirty", u8::from(entry.is_dirty));
        }
        for group in &self.groups {
            let node = doc.add_child("group");
            for (name, surface) in SIDE_ATTRIBUTES.iter().zip(group.side_surf) {
                node.set_attr(name, surface.unwrap_or(-1));
            }
        }
    }

    /// Replaces the contents with the `entry` and `group` nodes of `doc`.
    /// Group entry counts are rebuilt from the entries. On failure the
    /// structure is left empty.
    pub fn load_from_xml(&mut self, doc: &XmlDocument, catalogue: &TileCatalogue) -> Result<(), TileGroupLoadError> {
        self.clear();
        let result = self.load_nodes(doc, catalogue);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn load_nodes(&mut self, doc: &XmlDocument, catalogue: &TileCatalogue) -> Result<(), TileGroupLoadError> {
        let mut raw_entries = Vec::new();
        for node in doc.children_named("entry") {
            let name = node.required_attr("tile")?;
            let tile = catalogue
                .tile_id_by_name(name)
                .ok_or_else(|| TileGroupLoadError::UnknownTile {
                    name: name.to_string(),
                    line: node.line(),
                })?;
            if raw_entries.iter().any(|(_, existing, _, _)| *existing == tile) {
                return Err(TileGroupLoadError::DuplicateTile {
                    name: name.to_string(),
                    line: node.line(),
                });
            }
            let group_id = node.int_attr("group_id")?;
            let is_dirty = node.int_attr("is_dirty")? != 0;
            raw_entries.push((name, tile, group_id, is_dirty));
        }

        for node in doc.children_named("group") {
            let mut group = Group::default();
            for (side, name) in SIDE_ATTRIBUTES.iter().enumerate() {
                group.side_surf[side] = parse_surface(node, name)?;
            }
            self.groups.push(group);
        }

        let group_count = self.groups.len();
        for (name, tile, group_id, is_dirty) in raw_entries {
            let index = usize::try_from(group_id)
                .ok()
                .filter(|index| *index < group_count)
                .ok_or_else(|| TileGroupLoadError::GroupOutOfRange {
                    name: name.to_string(),
                    group_id,
                    group_count,
                })?;
            self.groups[index].entry_count += 1;
            self.entries.push(Entry {
                tile,
                group_id: index,
                is_dirty,
            });
        }

        if let Some(group_id) = self.groups.iter().position(|group| group.entry_count == 0) {
            return Err(TileGroupLoadError::EmptyGroup { group_id });
        }

        info!(
            entry_count = self.entries.len(),
            group_count = self.groups.len(),
            "tile_group_loaded"
        );
        Ok(())
    }

    fn check_entry(&self, entry_id: usize) {
        assert!(
            entry_id < self.entries.len(),
            "entry {entry_id} out of range (count {})",
            self.entries.len()
        );
    }

    fn check_group(&self, group_id: usize) {
        assert!(
            group_id < self.groups.len(),
            "group {group_id} out of range (count {})",
            self.groups.len()
        );
    }
}

fn parse_surface(node: &XmlElement, name: &str) -> Result<Option<i32>, DocumentError> {
    match node.int_attr(name)? {
        -1 => Ok(None),
        value if value >= 0 => Ok(Some(value)),
        value => Err(node.invalid_attr(name, &value.to_string(), "-1 or a surface id")),
    }
}
