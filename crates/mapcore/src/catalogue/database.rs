use std::collections::HashMap;

use crate::geom::{Int2, Int3, ScreenRect};

use super::mask::OpacityMask;

/// Handle to a tile owned by a [`TileCatalogue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    Floor,
    Wall,
    Object,
    Stairs,
    Roof,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileDef {
    pub id: TileId,
    pub name: String,
    pub kind: TileKind,
    /// Size of the world-space bounding box, in world units.
    pub bbox_size: Int3,
    /// Sprite pixel that lands on the projected bbox origin.
    pub sprite_offset: Int2,
    pub sprite_size: Int2,
    pub mask: Option<OpacityMask>,
}

impl TileDef {
    pub fn new(name: impl Into<String>, kind: TileKind, bbox_size: Int3) -> Self {
        Self {
            id: TileId(0),
            name: name.into(),
            kind,
            bbox_size,
            sprite_offset: Int2::default(),
            sprite_size: Int2::default(),
            mask: None,
        }
    }

    pub fn with_sprite(mut self, offset: Int2, size: Int2) -> Self {
        self.sprite_offset = offset;
        self.sprite_size = size;
        self
    }

    pub fn with_mask(mut self, mask: OpacityMask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Sprite rectangle relative to the projected bbox origin.
    pub fn rect(&self) -> ScreenRect {
        ScreenRect::new(-self.sprite_offset, self.sprite_size - self.sprite_offset)
    }

    /// Tests a point given relative to the projected bbox origin.
    ///
    /// Tiles without a mask are opaque over their whole sprite rectangle.
    pub fn test_pixel(&self, local: Int2) -> bool {
        if !self.rect().contains(local) {
            return false;
        }
        let sprite_pos = local + self.sprite_offset;
        match &self.mask {
            Some(mask) => mask.is_opaque(sprite_pos),
            None => true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TileCatalogue {
    tiles: Vec<TileDef>,
    ids_by_name: HashMap<String, TileId>,
}

impl TileCatalogue {
    /// Assigns ids in the order given. Later definitions with a repeated name
    /// shadow earlier ones in name lookups.
    pub fn from_tile_defs(mut tiles: Vec<TileDef>) -> Self {
        let mut ids_by_name = HashMap::with_capacity(tiles.len());
        for (idx, tile) in tiles.iter_mut().enumerate() {
            let id = TileId(idx as u32);
            tile.id = id;
            ids_by_name.insert(tile.name.clone(), id);
        }
        Self { tiles, ids_by_name }
    }

    pub fn tile_id_by_name(&self, name: &str) -> Option<TileId> {
        self.ids_by_name.get(name).copied()
    }

    pub fn tile(&self, id: TileId) -> Option<&TileDef> {
        self.tiles.get(id.0 as usize)
    }

    pub fn tile_by_name(&self, name: &str) -> Option<&TileDef> {
        self.tile_id_by_name(name).and_then(|id| self.tile(id))
    }

    pub fn tiles(&self) -> &[TileDef] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}
