//! Placed tiles on an isometric map.

mod persistence;
#[cfg(test)]
mod tests;

use thiserror::Error;
use tracing::info;

use crate::catalogue::{TileCatalogue, TileDef, TileId};
use crate::geom::{world_to_screen, Int2, Int3, ScreenRect, WorldBox};
use crate::grid::{Grid, ObjectDef, ObjectFlags};
use crate::occluder::{OccluderId, OccluderMap, OcclusionConfig};
use crate::{is_valid_map_size, MAX_MAP_DIMENSION};

pub use persistence::{MapFileError, MapLoadError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("slot {slot} holds no tile")]
    NotOccupied { slot: usize },
    #[error("tile at {pos} leaves the map of size {dimensions}")]
    OutOfBounds { pos: Int3, dimensions: Int2 },
    #[error("tile box {bbox:?} overlaps the tile in slot {other}")]
    Overlap { bbox: WorldBox, other: usize },
}

#[derive(Debug, Clone, Default)]
pub struct TileMap {
    grid: Grid<TileId>,
    occluders: OccluderMap,
}

/// `None` when `pos` is too far out for its box or projection to be
/// representable; such a tile can never fit on a map.
fn placement(tile: &TileDef, pos: Int3) -> Option<(WorldBox, ScreenRect)> {
    let limit = -MAX_MAP_DIMENSION..=MAX_MAP_DIMENSION;
    if !(limit.contains(&pos.x) && limit.contains(&pos.y) && limit.contains(&pos.z)) {
        return None;
    }
    let bbox = WorldBox::checked_from_origin_size(pos, tile.bbox_size)?;
    let rect = tile.rect().translated(world_to_screen(pos));
    Some((bbox, rect))
}

fn tile_flags(tile: &TileDef) -> ObjectFlags {
    ObjectFlags::from_tile_kind(tile.kind) | ObjectFlags::VISIBLE
}

impl TileMap {
    pub fn new(dimensions: Int2) -> Self {
        Self {
            grid: Grid::new(dimensions),
            occluders: OccluderMap::new(),
        }
    }

    pub fn dimensions(&self) -> Int2 {
        self.grid.dimensions()
    }

    pub fn grid(&self) -> &Grid<TileId> {
        &self.grid
    }

    pub fn occluder_map(&self) -> &OccluderMap {
        &self.occluders
    }

    /// Slot count, free slots included.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.grid.object_count()
    }

    pub fn get(&self, idx: usize) -> Option<&ObjectDef<TileId>> {
        self.grid.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ObjectDef<TileId>)> {
        self.grid.iter()
    }

    pub fn find_any(&self, bbox: &WorldBox, ignored: Option<usize>, filter: ObjectFlags) -> Option<usize> {
        self.grid.find_any(bbox, ignored, filter)
    }

    pub fn find_all(&self, bbox: &WorldBox, ignored: Option<usize>, filter: ObjectFlags) -> Vec<usize> {
        self.grid.find_all(bbox, ignored, filter)
    }

    pub fn find_all_in_rect(&self, view: &ScreenRect, filter: ObjectFlags) -> Vec<usize> {
        self.grid.find_all_in_rect(view, filter)
    }

    /// Places `tile` with its box origin at `pos`, unless the box leaves the
    /// map or overlaps an existing tile.
    pub fn maybe_add(&mut self, tile: &TileDef, pos: Int3) -> Option<usize> {
        let (bbox, rect) = self.fitting_placement(tile, pos)?;
        if self.grid.find_any(&bbox, None, ObjectFlags::ALL_TYPES).is_some() {
            return None;
        }
        Some(self.grid.add(ObjectDef::new(tile.id, bbox, rect, tile_flags(tile))))
    }

    /// # Panics
    ///
    /// Panics if the placement leaves the map or overlaps another tile.
    pub fn add(&mut self, tile: &TileDef, pos: Int3) -> usize {
        let Some((bbox, rect)) = self.fitting_placement(tile, pos) else {
            panic!(
                "tile '{}' at {pos:?} leaves the map of size {:?}",
                tile.name,
                self.grid.dimensions()
            );
        };
        if let Some(other) = self.grid.find_any(&bbox, None, ObjectFlags::ALL_TYPES) {
            panic!("tile '{}' at {pos:?} overlaps the tile in slot {other}", tile.name);
        }
        self.grid.add(ObjectDef::new(tile.id, bbox, rect, tile_flags(tile)))
    }

    /// # Panics
    ///
    /// Panics if `idx` is out of range or already free.
    pub fn remove(&mut self, idx: usize) {
        if self.grid.get(idx).is_some() {
            self.occluders.remove_object(&mut self.grid, idx);
        }
        self.grid.remove(idx);
    }

    /// Replaces the tile in `idx` in place. The slot index, occluder
    /// membership and visibility survive; a rejected placement changes
    /// nothing.
    pub fn update(&mut self, idx: usize, tile: &TileDef, pos: Int3) -> Result<(), PlacementError> {
        let Some(current) = self.grid.get(idx) else {
            return Err(PlacementError::NotOccupied { slot: idx });
        };
        let occluder = current.occluder;
        let visible = current.flags & ObjectFlags::VISIBLE;

        let (bbox, rect) = self
            .fitting_placement(tile, pos)
            .ok_or(PlacementError::OutOfBounds {
                pos,
                dimensions: self.grid.dimensions(),
            })?;
        if let Some(other) = self.grid.find_any(&bbox, Some(idx), ObjectFlags::ALL_TYPES) {
            return Err(PlacementError::Overlap { bbox, other });
        }

        self.grid.remove(idx);
        let mut def = ObjectDef::new(tile.id, bbox, rect, ObjectFlags::from_tile_kind(tile.kind) | visible);
        def.occluder = occluder;
        self.grid.add_at(idx, def);
        if let Some(occluder) = occluder {
            self.occluders.refresh_bounds(&self.grid, occluder);
        }
        Ok(())
    }

    /// Rebuilds the map at `new_size`, keeping every tile that still fits.
    /// Occluders are rebuilt around the surviving tiles.
    ///
    /// # Panics
    ///
    /// Panics if an edge of `new_size` is outside `1..=MAX_MAP_DIMENSION`.
    pub fn resize(&mut self, new_size: Int2) {
        assert!(
            is_valid_map_size(new_size),
            "map size {new_size} is outside 1..={}",
            MAX_MAP_DIMENSION
        );
        let mut grid = Grid::new(new_size);
        let mut slot_map = vec![None; self.grid.len()];
        for (slot, def) in self.grid.iter() {
            if grid.is_inside(&def.bbox) {
                let mut copy = def.clone();
                copy.occluder = None;
                slot_map[slot] = Some(grid.add(copy));
            }
        }
        let occluders = self.occluders.remapped(&mut grid, &slot_map);

        let dropped = self.grid.object_count() - grid.object_count();
        info!(
            width = new_size.x,
            height = new_size.y,
            kept = grid.object_count(),
            dropped,
            "tile_map_resized"
        );
        self.grid.swap(&mut grid);
        self.occluders = occluders;
    }

    /// Topmost tile whose sprite covers `screen_pos`.
    pub fn pixel_intersect(
        &self,
        catalogue: &TileCatalogue,
        screen_pos: Int2,
        filter: ObjectFlags,
    ) -> Option<usize> {
        self.grid.pixel_intersect(
            screen_pos,
            |def, point| {
                catalogue
                    .tile(def.payload)
                    .is_some_and(|tile| tile.test_pixel(point - world_to_screen(def.bbox.min)))
            },
            filter,
        )
    }

    pub fn add_occluder(&mut self, representative: usize) -> OccluderId {
        self.occluders.add_occluder(&mut self.grid, representative)
    }

    pub fn remove_occluder(&mut self, id: OccluderId) {
        self.occluders.remove_occluder(&mut self.grid, id);
    }

    /// Re-evaluates occluder visibility and mirrors it onto member tiles.
    pub fn update_visibility(&mut self, config: &impl OcclusionConfig) {
        self.occluders.update_visibility(config);

        let changes = self
            .grid
            .iter()
            .filter_map(|(slot, def)| {
                let occluder = self.occluders.get(def.occluder?)?;
                let flags = if occluder.is_visible {
                    def.flags | ObjectFlags::VISIBLE
                } else {
                    def.flags - ObjectFlags::VISIBLE
                };
                (flags != def.flags).then_some((slot, flags))
            })
            .collect::<Vec<_>>();
        for (slot, flags) in changes {
            self.grid.set_flags(slot, flags);
        }
        self.grid.update_nodes();
    }

    /// Box and screen rect of `tile` at `pos`, if it lies inside the map.
    pub(crate) fn fitting_placement(&self, tile: &TileDef, pos: Int3) -> Option<(WorldBox, ScreenRect)> {
        placement(tile, pos).filter(|(bbox, _)| self.grid.is_inside(bbox))
    }

    /// Empties the map and gives it zero size.
    pub fn clear(&mut self) {
        *self = TileMap::default();
    }
}
