use tempfile::TempDir;

use super::*;
use crate::catalogue::{OpacityMask, TileKind};
use crate::document::{DocumentError, XmlDocument};
use crate::occluder::HeightCutoff;

fn catalogue() -> TileCatalogue {
    // Crate sprite is opaque on its left half only.
    let crate_alpha = (0..13)
        .flat_map(|_| (0..12).map(|x| if x < 6 { 255 } else { 0 }))
        .collect::<Vec<u8>>();
    TileCatalogue::from_tile_defs(vec![
        TileDef::new("floor/grass", TileKind::Floor, Int3::new(2, 1, 2))
            .with_sprite(Int2::new(12, 7), Int2::new(24, 19)),
        TileDef::new("wall/brick", TileKind::Wall, Int3::new(1, 4, 2))
            .with_sprite(Int2::new(12, 28), Int2::new(18, 37)),
        TileDef::new("object/crate", TileKind::Object, Int3::new(1, 1, 1))
            .with_sprite(Int2::new(6, 7), Int2::new(12, 13))
            .with_mask(OpacityMask::from_alpha(12, 13, &crate_alpha).expect("mask")),
    ])
}

fn tile<'a>(catalogue: &'a TileCatalogue, name: &str) -> &'a TileDef {
    catalogue.tile_by_name(name).expect("tile in catalogue")
}

fn placements(map: &TileMap, catalogue: &TileCatalogue) -> Vec<(String, Int3)> {
    let mut out = map
        .iter()
        .map(|(_, def)| {
            let name = catalogue.tile(def.payload).expect("known tile").name.clone();
            (name, def.bbox.min)
        })
        .collect::<Vec<_>>();
    out.sort();
    out
}

fn saved(map: &TileMap, catalogue: &TileCatalogue) -> String {
    let mut doc = XmlDocument::new();
    map.save_to_xml(&mut doc, catalogue);
    doc.to_xml_string()
}

fn load(raw: &str, catalogue: &TileCatalogue) -> (TileMap, Result<(), MapLoadError>) {
    let doc = XmlDocument::parse(raw).expect("parse");
    let mut map = TileMap::new(Int2::new(30, 30));
    map.add(tile(catalogue, "floor/grass"), Int3::new(0, 0, 0));
    let result = map.load_from_xml(&doc, catalogue);
    (map, result)
}

const LAYOUT: [(&str, [i32; 3]); 5] = [
    ("wall/brick", [5, 0, 5]),
    ("floor/grass", [2, 0, 0]),
    ("object/crate", [0, 1, 0]),
    ("floor/grass", [0, 0, 0]),
    ("floor/grass", [0, 0, 2]),
];

fn layout_map(catalogue: &TileCatalogue, reversed: bool) -> TileMap {
    let mut map = TileMap::new(Int2::new(48, 48));
    let mut order = LAYOUT.to_vec();
    if reversed {
        order.reverse();
    }
    for (name, [x, y, z]) in order {
        map.add(tile(catalogue, name), Int3::new(x, y, z));
    }
    map
}

#[test]
fn save_groups_sorted_placements_by_tile_name() {
    let catalogue = catalogue();
    let mut map = TileMap::new(Int2::new(48, 48));
    map.add(tile(&catalogue, "wall/brick"), Int3::new(5, 0, 5));
    map.add(tile(&catalogue, "floor/grass"), Int3::new(2, 0, 0));
    map.add(tile(&catalogue, "floor/grass"), Int3::new(0, 0, 0));

    let expected = "\
<tile_map size=\"48 48\" tile_count=\"3\">
  <tile name=\"floor/grass\">
    <i pos=\"0 0 0\" bbox=\"2 1 2\"/>
    <i pos=\"2 0 0\" bbox=\"2 1 2\"/>
  </tile>
  <tile name=\"wall/brick\">
    <i pos=\"5 0 5\" bbox=\"1 4 2\"/>
  </tile>
</tile_map>
<occluders/>
";
    assert_eq!(saved(&map, &catalogue), expected);
}

#[test]
fn round_trip_reproduces_placements() {
    let catalogue = catalogue();
    let map = layout_map(&catalogue, false);
    let doc = XmlDocument::parse(&saved(&map, &catalogue)).expect("parse");

    let mut loaded = TileMap::default();
    loaded.load_from_xml(&doc, &catalogue).expect("load");
    assert_eq!(loaded.dimensions(), Int2::new(48, 48));
    assert_eq!(placements(&loaded, &catalogue), placements(&map, &catalogue));
}

#[test]
fn saves_are_byte_identical_regardless_of_slot_order() {
    let catalogue = catalogue();
    let forward = layout_map(&catalogue, false);
    let mut backward = layout_map(&catalogue, true);

    let extra = backward.add(tile(&catalogue, "object/crate"), Int3::new(20, 0, 20));
    backward.remove(extra);
    assert_ne!(forward.len(), backward.len());
    assert_eq!(saved(&forward, &catalogue), saved(&backward, &catalogue));
}

#[test]
fn removed_slot_is_reused_before_growing() {
    let catalogue = catalogue();
    let mut map = layout_map(&catalogue, false);
    let slots = map.len();
    map.remove(1);
    assert_eq!(map.len(), slots);
    assert_eq!(map.grid().find_free_object(), 1);

    let reused = map.add(tile(&catalogue, "object/crate"), Int3::new(30, 0, 30));
    assert_eq!(reused, 1);
    assert_eq!(map.len(), slots);
}

#[test]
fn maybe_add_rejects_duplicate_without_mutation() {
    let catalogue = catalogue();
    let grass = tile(&catalogue, "floor/grass");
    let mut map = TileMap::new(Int2::new(10, 10));
    assert_eq!(map.maybe_add(grass, Int3::new(0, 0, 0)), Some(0));
    assert_eq!(map.maybe_add(grass, Int3::new(0, 0, 0)), None);
    assert_eq!(map.maybe_add(grass, Int3::new(1, 0, 1)), None);
    assert_eq!(map.maybe_add(grass, Int3::new(9, 0, 0)), None);
    assert_eq!(map.len(), 1);
    assert_eq!(map.maybe_add(grass, Int3::new(2, 0, 0)), Some(1));
}

#[test]
#[should_panic(expected = "overlaps")]
fn add_panics_on_overlap() {
    let catalogue = catalogue();
    let grass = tile(&catalogue, "floor/grass");
    let mut map = TileMap::new(Int2::new(10, 10));
    map.add(grass, Int3::new(0, 0, 0));
    map.add(grass, Int3::new(0, 0, 0));
}

#[test]
#[should_panic(expected = "leaves the map")]
fn add_panics_outside_map() {
    let catalogue = catalogue();
    let mut map = TileMap::new(Int2::new(10, 10));
    map.add(tile(&catalogue, "floor/grass"), Int3::new(-1, 0, 0));
}

#[test]
fn oversized_map_fails_and_leaves_map_empty() {
    let catalogue = catalogue();
    let (map, result) = load(
        "<tile_map size=\"20000 20000\" tile_count=\"0\"/>",
        &catalogue,
    );
    assert!(matches!(
        result,
        Err(MapLoadError::InvalidSize {
            width: 20000,
            height: 20000
        })
    ));
    assert_eq!(map.len(), 0);
    assert_eq!(map.dimensions(), Int2::new(0, 0));
}

#[test]
fn largest_map_keeps_declared_size() {
    let catalogue = catalogue();
    let (map, result) = load("<tile_map size=\"16384 16384\"/>", &catalogue);
    result.expect("load");
    assert_eq!(map.dimensions(), Int2::new(16384, 16384));
    assert!(saved(&map, &catalogue).starts_with("<tile_map size=\"16384 16384\""));
}

#[test]
fn zero_size_is_rejected() {
    let catalogue = catalogue();
    let (_, result) = load("<tile_map size=\"0 12\"/>", &catalogue);
    assert!(matches!(result, Err(MapLoadError::InvalidSize { .. })));
}

#[test]
fn unknown_tile_aborts_load() {
    let catalogue = catalogue();
    let (map, result) = load(
        "<tile_map size=\"24 24\">\n  <tile name=\"floor/grass\"><i pos=\"0 0 0\"/></tile>\n  <tile name=\"floor/lava\"><i pos=\"4 0 4\"/></tile>\n</tile_map>",
        &catalogue,
    );
    match result {
        Err(MapLoadError::UnknownTile { name, line }) => {
            assert_eq!(name, "floor/lava");
            assert_eq!(line, Some(3));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(map.object_count(), 0);
}

#[test]
fn missing_root_and_bad_position_are_document_errors() {
    let catalogue = catalogue();
    let (_, result) = load("<occluders/>", &catalogue);
    assert!(matches!(
        result,
        Err(MapLoadError::Document(DocumentError::MissingElement { .. }))
    ));

    let (map, result) = load(
        "<tile_map size=\"24 24\"><tile name=\"floor/grass\"><i pos=\"0 zero 0\"/></tile></tile_map>",
        &catalogue,
    );
    assert!(matches!(
        result,
        Err(MapLoadError::Document(DocumentError::InvalidAttribute { .. }))
    ));
    assert_eq!(map.object_count(), 0);
}

#[test]
fn duplicate_placements_are_skipped_on_load() {
    let catalogue = catalogue();
    let (map, result) = load(
        "<tile_map size=\"24 24\" tile_count=\"2\"><tile name=\"floor/grass\"><i pos=\"0 0 0\"/><i pos=\"0 0 0\"/></tile></tile_map>",
        &catalogue,
    );
    result.expect("load");
    assert_eq!(map.object_count(), 1);
}

#[test]
fn placement_outside_declared_size_fails_load() {
    let catalogue = catalogue();
    let (map, result) = load(
        "<tile_map size=\"10 10\"><tile name=\"floor/grass\"><i pos=\"9 0 0\"/></tile></tile_map>",
        &catalogue,
    );
    assert!(matches!(result, Err(MapLoadError::OutOfBounds { .. })));
    assert_eq!(map.len(), 0);
}

#[test]
fn extreme_positions_fail_load_without_overflow() {
    let catalogue = catalogue();
    for pos in ["2147483647 0 0", "0 0 2147483646", "0 2147483647 0", "-2147483648 0 0"] {
        let (map, result) = load(
            &format!("<tile_map size=\"24 24\"><tile name=\"floor/grass\"><i pos=\"{pos}\"/></tile></tile_map>"),
            &catalogue,
        );
        assert!(
            matches!(result, Err(MapLoadError::OutOfBounds { .. })),
            "pos={pos} result={result:?}"
        );
        assert_eq!(map.len(), 0);
    }
}

#[test]
fn extreme_positions_are_rejected_by_maybe_add() {
    let catalogue = catalogue();
    let mut map = TileMap::new(Int2::new(24, 24));
    let grass = tile(&catalogue, "floor/grass");
    assert_eq!(map.maybe_add(grass, Int3::new(i32::MAX, 0, 0)), None);
    assert_eq!(map.maybe_add(grass, Int3::new(0, i32::MIN, 0)), None);
    assert_eq!(map.object_count(), 0);
}

#[test]
fn oversized_tile_count_only_bounds_reservation() {
    let catalogue = catalogue();
    let (map, result) = load(
        "<tile_map size=\"24 24\" tile_count=\"2000000000\"><tile name=\"floor/grass\"><i pos=\"0 0 0\"/></tile></tile_map>",
        &catalogue,
    );
    result.expect("load");
    assert_eq!(map.object_count(), 1);

    let (empty, result) = load("<tile_map size=\"24 24\" tile_count=\"-5\"/>", &catalogue);
    result.expect("load");
    assert_eq!(empty.object_count(), 0);
}

fn walled_room(catalogue: &TileCatalogue) -> (TileMap, [usize; 3]) {
    let wall = tile(catalogue, "wall/brick");
    let mut map = TileMap::new(Int2::new(48, 48));
    let a = map.add(wall, Int3::new(0, 0, 0));
    let b = map.add(wall, Int3::new(0, 0, 2));
    let c = map.add(wall, Int3::new(0, 0, 4));
    map.add(tile(catalogue, "floor/grass"), Int3::new(20, 0, 20));
    (map, [a, b, c])
}

#[test]
fn removing_occluder_member_unlinks_it() {
    let catalogue = catalogue();
    let (mut map, [a, b, c]) = walled_room(&catalogue);
    let id = map.add_occluder(a);
    assert_eq!(map.occluder_map().get(id).map(|occ| occ.objects.len()), Some(3));

    map.remove(b);
    let occluder = map.occluder_map().get(id).expect("occluder");
    assert_eq!(occluder.objects.len(), 2);
    assert!(occluder.objects.contains(&a));
    assert!(occluder.objects.contains(&c));
    assert!(map
        .occluder_map()
        .iter()
        .all(|(_, occ)| !occ.objects.contains(&b)));
}

#[test]
fn occluders_survive_round_trip() {
    let catalogue = catalogue();
    let (mut map, [a, _, _]) = walled_room(&catalogue);
    map.add_occluder(a);
    let text = saved(&map, &catalogue);
    assert!(text.contains("<occluder parent=\"-1\">"));

    let mut loaded = TileMap::default();
    loaded
        .load_from_xml(&XmlDocument::parse(&text).expect("parse"), &catalogue)
        .expect("load");
    assert_eq!(loaded.occluder_map().len(), 1);
    let members = loaded
        .iter()
        .filter(|(_, def)| def.occluder.is_some())
        .map(|(_, def)| def.bbox.min)
        .collect::<Vec<_>>();
    assert_eq!(
        members,
        vec![Int3::new(0, 0, 0), Int3::new(0, 0, 2), Int3::new(0, 0, 4)]
    );
    assert_eq!(saved(&loaded, &catalogue), text);
}

#[test]
fn update_moves_tile_in_place() {
    let catalogue = catalogue();
    let (mut map, [a, b, c]) = walled_room(&catalogue);
    let id = map.add_occluder(a);

    map.update(c, tile(&catalogue, "object/crate"), Int3::new(0, 0, 5))
        .expect("update");
    let def = map.get(c).expect("slot");
    assert_eq!(def.bbox.min, Int3::new(0, 0, 5));
    assert_eq!(def.payload, tile(&catalogue, "object/crate").id);
    assert!(def.flags.contains(ObjectFlags::OBJECT | ObjectFlags::VISIBLE));
    assert_eq!(def.occluder, Some(id));
    assert_eq!(
        map.occluder_map().get(id).map(|occ| occ.bbox.max),
        Some(Int3::new(1, 4, 6))
    );

    let overlap = map.update(c, tile(&catalogue, "wall/brick"), Int3::new(0, 0, 3));
    assert_eq!(
        overlap,
        Err(PlacementError::Overlap {
            bbox: WorldBox::from_origin_size(Int3::new(0, 0, 3), Int3::new(1, 4, 2)),
            other: b,
        })
    );
    assert_eq!(map.get(c).map(|def| def.bbox.min), Some(Int3::new(0, 0, 5)));

    assert_eq!(
        map.update(c, tile(&catalogue, "wall/brick"), Int3::new(0, 0, 47)),
        Err(PlacementError::OutOfBounds {
            pos: Int3::new(0, 0, 47),
            dimensions: Int2::new(48, 48),
        })
    );
    assert!(matches!(
        map.update(c, tile(&catalogue, "wall/brick"), Int3::new(i32::MAX, 0, 0)),
        Err(PlacementError::OutOfBounds { .. })
    ));
    map.remove(b);
    assert_eq!(
        map.update(b, tile(&catalogue, "wall/brick"), Int3::new(10, 0, 10)),
        Err(PlacementError::NotOccupied { slot: b })
    );
}

#[test]
fn resize_drops_tiles_that_no_longer_fit_and_rebuilds_occluders() {
    let catalogue = catalogue();
    let wall = tile(&catalogue, "wall/brick");
    let mut map = TileMap::new(Int2::new(48, 48));
    let far = map.add(wall, Int3::new(30, 0, 30));
    let near = map.add(wall, Int3::new(2, 0, 2));
    let beside = map.add(wall, Int3::new(2, 0, 4));
    map.add_occluder(far);
    let kept_id = map.add_occluder(near);
    assert_eq!(kept_id, OccluderId(1));
    map.remove(beside);

    map.resize(Int2::new(20, 20));
    assert_eq!(map.dimensions(), Int2::new(20, 20));
    assert_eq!(map.object_count(), 1);
    assert_eq!(map.occluder_map().len(), 1);

    let (slot, def) = map.iter().next().expect("survivor");
    assert_eq!(def.bbox.min, Int3::new(2, 0, 2));
    assert_eq!(def.occluder, Some(OccluderId(0)));
    assert_eq!(
        map.occluder_map().get(OccluderId(0)).map(|occ| occ.objects.clone()),
        Some(vec![slot])
    );

    map.resize(Int2::new(60, 60));
    assert_eq!(map.object_count(), 1);
    assert_eq!(map.dimensions(), Int2::new(60, 60));
}

#[test]
fn resized_map_reloads_at_largest_size() {
    let catalogue = catalogue();
    let mut map = layout_map(&catalogue, false);
    map.resize(Int2::new(MAX_MAP_DIMENSION, 8));
    let doc = XmlDocument::parse(&saved(&map, &catalogue)).expect("parse");
    let mut reloaded = TileMap::default();
    reloaded.load_from_xml(&doc, &catalogue).expect("reload");
    assert_eq!(reloaded.dimensions(), Int2::new(MAX_MAP_DIMENSION, 8));
    assert_eq!(placements(&reloaded, &catalogue), placements(&map, &catalogue));
}

#[test]
#[should_panic(expected = "outside 1..=16384")]
fn resize_beyond_largest_size_panics() {
    let mut map = TileMap::new(Int2::new(24, 24));
    map.resize(Int2::new(20000, 8));
}

#[test]
#[should_panic(expected = "outside 1..=16384")]
fn resize_to_negative_size_panics() {
    let mut map = TileMap::new(Int2::new(24, 24));
    map.resize(Int2::new(-4, 8));
}

#[test]
fn pixel_intersect_uses_sprite_masks_and_draw_order() {
    let catalogue = catalogue();
    let mut map = TileMap::new(Int2::new(24, 24));
    let floor = map.add(tile(&catalogue, "floor/grass"), Int3::new(0, 0, 0));
    let crate_slot = map.add(tile(&catalogue, "object/crate"), Int3::new(0, 1, 0));

    assert_eq!(
        map.pixel_intersect(&catalogue, Int2::new(-3, -5), ObjectFlags::ALL_TYPES),
        Some(crate_slot)
    );
    assert_eq!(
        map.pixel_intersect(&catalogue, Int2::new(3, -5), ObjectFlags::ALL_TYPES),
        Some(floor)
    );
    assert_eq!(
        map.pixel_intersect(&catalogue, Int2::new(-3, -5), ObjectFlags::FLOOR),
        Some(floor)
    );
    assert_eq!(
        map.pixel_intersect(&catalogue, Int2::new(100, 100), ObjectFlags::ALL_TYPES),
        None
    );
}

#[test]
fn visibility_follows_occluder_height() {
    let catalogue = catalogue();
    let (mut map, [a, b, _]) = walled_room(&catalogue);
    map.add_occluder(a);
    let everything = WorldBox::from_origin_size(Int3::new(0, 0, 0), Int3::new(10, 10, 10));
    assert!(map.find_any(&everything, None, ObjectFlags::VISIBLE_TILES).is_some());

    map.update_visibility(&HeightCutoff { max_height: -1 });
    assert!(!map.get(b).expect("slot").flags.contains(ObjectFlags::VISIBLE));
    assert_eq!(map.find_any(&everything, None, ObjectFlags::VISIBLE_TILES), None);
    assert!(map.find_any(&everything, None, ObjectFlags::WALL).is_some());

    map.update_visibility(&HeightCutoff { max_height: 0 });
    assert_eq!(map.find_all(&everything, None, ObjectFlags::VISIBLE_TILES).len(), 3);
}

#[test]
fn file_round_trip_writes_atomically() {
    let catalogue = catalogue();
    let temp = TempDir::new().expect("temp");
    let path = temp.path().join("maps").join("level.xml");
    let map = layout_map(&catalogue, false);
    map.save_to_file(&path, &catalogue).expect("save");

    let mut loaded = TileMap::default();
    loaded.load_from_file(&path, &catalogue).expect("load");
    assert_eq!(placements(&loaded, &catalogue), placements(&map, &catalogue));

    let missing = loaded.load_from_file(&temp.path().join("nope.xml"), &catalogue);
    assert!(matches!(missing, Err(MapFileError::Read { .. })));
    assert_eq!(loaded.len(), 0);
}
