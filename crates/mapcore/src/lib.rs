mod atomic_io;
pub mod catalogue;
pub mod document;
pub mod geom;
pub mod grid;
pub mod occluder;
pub mod tile_group;
pub mod tile_map;

/// Largest accepted map edge, in world units.
pub const MAX_MAP_DIMENSION: i32 = 16 * 1024;

/// Both edges within `1..=MAX_MAP_DIMENSION`.
pub fn is_valid_map_size(size: geom::Int2) -> bool {
    let valid = 1..=MAX_MAP_DIMENSION;
    valid.contains(&size.x) && valid.contains(&size.y)
}

pub use catalogue::{load_tile_catalogue, CatalogueError, OpacityMask, TileCatalogue, TileDef, TileId, TileKind};
pub use document::{DocumentError, XmlDocument, XmlElement};
pub use geom::{Int2, Int3, ScreenRect, WorldBox};
pub use grid::{Grid, ObjectDef, ObjectFlags, SlotArena, NODE_SIZE};
pub use occluder::{HeightCutoff, Occluder, OccluderId, OccluderLoadError, OccluderMap, OcclusionConfig};
pub use tile_group::{TileGroup, TileGroupLoadError, SIDE_OFFSETS};
pub use tile_map::{MapFileError, MapLoadError, PlacementError, TileMap};
