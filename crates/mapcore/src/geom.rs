use std::fmt;
use std::ops::{Add, Neg, Sub};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Int2 {
    pub x: i32,
    pub y: i32,
}

impl Int2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Space separated, as written in map documents.
impl fmt::Display for Int2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)
    }
}

impl Add for Int2 {
    type Output = Int2;

    fn add(self, rhs: Int2) -> Int2 {
        Int2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Int2 {
    type Output = Int2;

    fn sub(self, rhs: Int2) -> Int2 {
        Int2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Int2 {
    type Output = Int2;

    fn neg(self) -> Int2 {
        Int2::new(-self.x, -self.y)
    }
}

/// World-space integer vector. `y` is height; the map plane is XZ.
///
/// Ordering is lexicographic by (x, y, z), which is the order placements are
/// written in when a map is saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Int3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn checked_add(self, rhs: Int3) -> Option<Int3> {
        Some(Int3::new(
            self.x.checked_add(rhs.x)?,
            self.y.checked_add(rhs.y)?,
            self.z.checked_add(rhs.z)?,
        ))
    }
}

impl fmt::Display for Int3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

impl Add for Int3 {
    type Output = Int3;

    fn add(self, rhs: Int3) -> Int3 {
        Int3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Int3 {
    type Output = Int3;

    fn sub(self, rhs: Int3) -> Int3 {
        Int3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Half-open axis-aligned box in world units: `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WorldBox {
    pub min: Int3,
    pub max: Int3,
}

impl WorldBox {
    pub const fn new(min: Int3, max: Int3) -> Self {
        Self { min, max }
    }

    pub fn from_origin_size(origin: Int3, size: Int3) -> Self {
        Self::new(origin, origin + size)
    }

    /// `None` when `origin + size` overflows.
    pub fn checked_from_origin_size(origin: Int3, size: Int3) -> Option<Self> {
        origin.checked_add(size).map(|max| Self::new(origin, max))
    }

    pub fn size(&self) -> Int3 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y || self.max.z <= self.min.z
    }

    /// Strict overlap: boxes sharing only a face do not overlap.
    pub fn overlaps(&self, other: &WorldBox) -> bool {
        other.min.x < self.max.x
            && self.min.x < other.max.x
            && other.min.y < self.max.y
            && self.min.y < other.max.y
            && other.min.z < self.max.z
            && self.min.z < other.max.z
    }

    pub fn union(&self, other: &WorldBox) -> WorldBox {
        WorldBox::new(
            Int3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            Int3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        )
    }

    pub fn expanded(&self, lower: Int3, upper: Int3) -> WorldBox {
        WorldBox::new(self.min - lower, self.max + upper)
    }
}

/// Half-open screen rectangle in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScreenRect {
    pub min: Int2,
    pub max: Int2,
}

impl ScreenRect {
    pub const fn new(min: Int2, max: Int2) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, point: Int2) -> bool {
        point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
    }

    pub fn overlaps(&self, other: &ScreenRect) -> bool {
        other.min.x < self.max.x
            && self.min.x < other.max.x
            && other.min.y < self.max.y
            && self.min.y < other.max.y
    }

    pub fn union(&self, other: &ScreenRect) -> ScreenRect {
        ScreenRect::new(
            Int2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            Int2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        )
    }

    pub fn translated(&self, offset: Int2) -> ScreenRect {
        ScreenRect::new(self.min + offset, self.max + offset)
    }
}

/// Isometric projection used by tile sprites: one world unit along x or z
/// moves 6px horizontally and 3px vertically, one unit of height moves 7px up.
pub fn world_to_screen(pos: Int3) -> Int2 {
    Int2::new(6 * (pos.x - pos.z), 3 * (pos.x + pos.z) - 7 * pos.y)
}

pub fn world_box_to_screen(bbox: &WorldBox) -> ScreenRect {
    let right = world_to_screen(Int3::new(bbox.max.x, bbox.min.y, bbox.min.z));
    let left = world_to_screen(Int3::new(bbox.min.x, bbox.min.y, bbox.max.z));
    let bottom = world_to_screen(Int3::new(bbox.max.x, bbox.min.y, bbox.max.z));
    let top = world_to_screen(Int3::new(bbox.min.x, bbox.max.y, bbox.min.z));
    ScreenRect::new(Int2::new(left.x, top.y), Int2::new(right.x, bottom.y))
}

/// Back-to-front ordering of two non-overlapping boxes.
///
/// Returns `Ordering::Greater` when `a` has to be drawn after `b`.
pub fn drawing_order(a: &WorldBox, b: &WorldBox) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let separated = |a_min: i32, a_max: i32, b_min: i32, b_max: i32| {
        if a_max <= b_min {
            Ordering::Less
        } else if b_max <= a_min {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    };

    separated(a.min.y, a.max.y, b.min.y, b.max.y)
        .then_with(|| separated(a.min.x, a.max.x, b.min.x, b.max.x))
        .then_with(|| separated(a.min.z, a.max.z, b.min.z, b.max.z))
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::*;

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = WorldBox::from_origin_size(Int3::new(0, 0, 0), Int3::new(2, 1, 2));
        let b = WorldBox::from_origin_size(Int3::new(2, 0, 0), Int3::new(2, 1, 2));
        let c = WorldBox::from_origin_size(Int3::new(1, 0, 1), Int3::new(2, 1, 2));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn projection_matches_isometric_axes() {
        assert_eq!(world_to_screen(Int3::new(1, 0, 0)), Int2::new(6, 3));
        assert_eq!(world_to_screen(Int3::new(0, 0, 1)), Int2::new(-6, 3));
        assert_eq!(world_to_screen(Int3::new(0, 1, 0)), Int2::new(0, -7));
    }

    #[test]
    fn projected_box_encloses_its_corners() {
        let bbox = WorldBox::from_origin_size(Int3::new(2, 0, 3), Int3::new(2, 4, 2));
        let rect = world_box_to_screen(&bbox);
        assert_eq!(rect.min, Int2::new(-18, -13));
        assert_eq!(rect.max, Int2::new(6, 27));
    }

    #[test]
    fn display_uses_document_format() {
        assert_eq!(Int2::new(64, -3).to_string(), "64 -3");
        assert_eq!(Int3::new(1, 2, 3).to_string(), "1 2 3");
    }

    #[test]
    fn checked_box_rejects_overflowing_extent() {
        let size = Int3::new(2, 1, 2);
        assert_eq!(
            WorldBox::checked_from_origin_size(Int3::new(3, 0, 3), size),
            Some(WorldBox::from_origin_size(Int3::new(3, 0, 3), size))
        );
        assert_eq!(WorldBox::checked_from_origin_size(Int3::new(i32::MAX, 0, 0), size), None);
        assert_eq!(WorldBox::checked_from_origin_size(Int3::new(0, 0, i32::MAX - 1), size), None);
    }

    #[test]
    fn higher_box_draws_later() {
        let floor = WorldBox::from_origin_size(Int3::new(0, 0, 0), Int3::new(2, 1, 2));
        let roof = WorldBox::from_origin_size(Int3::new(0, 4, 0), Int3::new(2, 1, 2));
        assert_eq!(drawing_order(&roof, &floor), Ordering::Greater);
        assert_eq!(drawing_order(&floor, &roof), Ordering::Less);
    }
}
