use bitflags::bitflags;

use crate::catalogue::TileKind;

bitflags! {
    /// Per-object flags. Low bits classify the object, high bits are
    /// functional state such as visibility.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        const ENTITY  = 0x0000_0001;
        const FLOOR   = 0x0001_0000;
        const WALL    = 0x0002_0000;
        const OBJECT  = 0x0004_0000;
        const STAIRS  = 0x0008_0000;
        const ROOF    = 0x0010_0000;
        const UNKNOWN = 0x0020_0000;
        const TILES   = 0x00ff_0000;
        const ALL_TYPES = 0x00ff_ffff;

        const VISIBLE = 0x8000_0000;
        const FUNCTIONAL = 0xff00_0000;
    }
}

impl ObjectFlags {
    /// Every tile type, with no functional requirement.
    pub const ANY_TILE: ObjectFlags = ObjectFlags::TILES;

    /// Visible tiles of any type.
    pub const VISIBLE_TILES: ObjectFlags = ObjectFlags::TILES.union(ObjectFlags::VISIBLE);

    pub fn from_tile_kind(kind: TileKind) -> Self {
        match kind {
            TileKind::Floor => ObjectFlags::FLOOR,
            TileKind::Wall => ObjectFlags::WALL,
            TileKind::Object => ObjectFlags::OBJECT,
            TileKind::Stairs => ObjectFlags::STAIRS,
            TileKind::Roof => ObjectFlags::ROOF,
            TileKind::Unknown => ObjectFlags::UNKNOWN,
        }
    }

    /// An object passes `filter` when it shares a type bit with it and carries
    /// every functional bit the filter requires.
    pub fn matches(self, filter: ObjectFlags) -> bool {
        let required = filter & ObjectFlags::FUNCTIONAL;
        self.intersects(filter & ObjectFlags::ALL_TYPES) && self.contains(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_filter_requires_shared_type_bit() {
        let wall = ObjectFlags::WALL | ObjectFlags::VISIBLE;
        assert!(wall.matches(ObjectFlags::ANY_TILE));
        assert!(wall.matches(ObjectFlags::WALL));
        assert!(!wall.matches(ObjectFlags::FLOOR));
        assert!(!wall.matches(ObjectFlags::ENTITY));
    }

    #[test]
    fn default_flags_are_empty() {
        let flags = ObjectFlags::default();
        assert!(flags.is_empty());
        assert!(!flags.matches(ObjectFlags::ALL_TYPES));
    }

    #[test]
    fn functional_filter_requires_every_bit() {
        let hidden = ObjectFlags::ROOF;
        let shown = ObjectFlags::ROOF | ObjectFlags::VISIBLE;
        assert!(!hidden.matches(ObjectFlags::VISIBLE_TILES));
        assert!(shown.matches(ObjectFlags::VISIBLE_TILES));
        assert!(hidden.matches(ObjectFlags::ANY_TILE));
    }
}
