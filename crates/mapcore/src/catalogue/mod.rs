mod database;
mod manifest;
mod mask;

pub use database::{TileCatalogue, TileDef, TileId, TileKind};
pub use manifest::{load_tile_catalogue, CatalogueError};
pub use mask::OpacityMask;
