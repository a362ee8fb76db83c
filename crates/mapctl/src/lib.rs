use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use mapcore::{
    is_valid_map_size, load_tile_catalogue, Int2, ObjectFlags, TileCatalogue, TileGroup, TileMap,
    XmlDocument, MAX_MAP_DIMENSION,
};
use tracing::info;

pub const CATALOGUE_ENV_VAR: &str = "MAPCTL_CATALOGUE";
pub const DEFAULT_CATALOGUE_PATH: &str = "data/tiles.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonOptions {
    pub catalogue: PathBuf,
    /// Overrides `RUST_LOG` when set.
    pub log_filter: Option<String>,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            catalogue: PathBuf::from(DEFAULT_CATALOGUE_PATH),
            log_filter: None,
        }
    }
}

impl CommonOptions {
    /// Applies the value of [`CATALOGUE_ENV_VAR`], if any. Blank values are
    /// ignored.
    pub fn with_catalogue_env(mut self, value: Option<String>) -> Self {
        if let Some(path) = value.filter(|path| !path.trim().is_empty()) {
            self.catalogue = PathBuf::from(path);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Info { map: PathBuf },
    Resave { map: PathBuf, output: Option<PathBuf> },
    Resize { map: PathBuf, size: Int2, output: Option<PathBuf> },
    Groups { path: PathBuf },
    Pick { map: PathBuf, point: Int2 },
}

pub fn run<W: Write>(kind: CommandKind, opts: &CommonOptions, stdout: &mut W) -> Result<(), String> {
    if let CommandKind::Resize { size, .. } = &kind {
        if !is_valid_map_size(*size) {
            return Err(format!(
                "invalid map size {size} (each edge must be within 1..={})",
                MAX_MAP_DIMENSION
            ));
        }
    }
    let catalogue = load_tile_catalogue(&opts.catalogue).map_err(|error| error.to_string())?;

    match kind {
        CommandKind::Info { map } => {
            let tile_map = load_map(&map, &catalogue)?;
            write_info(stdout, &tile_map, &catalogue)
        }
        CommandKind::Resave { map, output } => {
            let tile_map = load_map(&map, &catalogue)?;
            let target = output.unwrap_or(map);
            save_map(stdout, &tile_map, &catalogue, &target)
        }
        CommandKind::Resize { map, size, output } => {
            let mut tile_map = load_map(&map, &catalogue)?;
            tile_map.resize(size);
            let target = output.unwrap_or(map);
            save_map(stdout, &tile_map, &catalogue, &target)
        }
        CommandKind::Groups { path } => {
            let raw = fs::read_to_string(&path)
                .map_err(|error| format!("failed to read tile groups '{}': {error}", path.display()))?;
            let doc = XmlDocument::parse(&raw)
                .map_err(|error| format!("failed to parse tile groups '{}': {error}", path.display()))?;
            let mut groups = TileGroup::new();
            groups
                .load_from_xml(&doc, &catalogue)
                .map_err(|error| format!("failed to load tile groups '{}': {error}", path.display()))?;
            write_groups(stdout, &groups, &catalogue)
        }
        CommandKind::Pick { map, point } => {
            let tile_map = load_map(&map, &catalogue)?;
            match tile_map.pixel_intersect(&catalogue, point, ObjectFlags::VISIBLE_TILES) {
                Some(slot) => {
                    let def = tile_map
                        .get(slot)
                        .ok_or_else(|| format!("picked slot {slot} is empty"))?;
                    let name = catalogue
                        .tile(def.payload)
                        .map_or("<unknown>", |tile| tile.name.as_str());
                    emit(stdout, &format!("slot {slot} tile {name} pos {}", def.bbox.min))
                }
                None => emit(stdout, "none"),
            }
        }
    }
}

fn load_map(path: &Path, catalogue: &TileCatalogue) -> Result<TileMap, String> {
    let mut tile_map = TileMap::default();
    tile_map
        .load_from_file(path, catalogue)
        .map_err(|error| error.to_string())?;
    Ok(tile_map)
}

fn save_map<W: Write>(
    stdout: &mut W,
    tile_map: &TileMap,
    catalogue: &TileCatalogue,
    target: &Path,
) -> Result<(), String> {
    tile_map
        .save_to_file(target, catalogue)
        .map_err(|error| error.to_string())?;
    info!(path = %target.display(), tile_count = tile_map.object_count(), "map_saved");
    emit(
        stdout,
        &format!("saved {} ({} tiles)", target.display(), tile_map.object_count()),
    )
}

fn write_info<W: Write>(stdout: &mut W, tile_map: &TileMap, catalogue: &TileCatalogue) -> Result<(), String> {
    let occluders = tile_map
        .occluder_map()
        .iter()
        .filter(|(_, occluder)| !occluder.is_empty())
        .count();
    emit(stdout, &format!("size: {}", tile_map.dimensions()))?;
    emit(stdout, &format!("tiles: {}", tile_map.object_count()))?;
    emit(stdout, &format!("occluders: {occluders}"))?;

    let mut per_tile = BTreeMap::<&str, usize>::new();
    for (_, def) in tile_map.iter() {
        let name = catalogue
            .tile(def.payload)
            .map_or("<unknown>", |tile| tile.name.as_str());
        *per_tile.entry(name).or_default() += 1;
    }
    for (name, count) in per_tile {
        emit(stdout, &format!("tile {name}: {count}"))?;
    }
    Ok(())
}

fn write_groups<W: Write>(stdout: &mut W, groups: &TileGroup, catalogue: &TileCatalogue) -> Result<(), String> {
    emit(stdout, &format!("entries: {}", groups.entry_count()))?;
    emit(stdout, &format!("groups: {}", groups.group_count()))?;
    for group_id in 0..groups.group_count() {
        let mut members = (0..groups.entry_count())
            .filter(|entry| groups.entry_group(*entry) == group_id)
            .map(|entry| {
                catalogue
                    .tile(groups.entry_tile(entry))
                    .map_or("<unknown>", |tile| tile.name.as_str())
            })
            .collect::<Vec<_>>();
        members.sort_unstable();
        let uniform = if groups.is_group_surface_uniform(group_id) { "yes" } else { "no" };
        emit(
            stdout,
            &format!("group {group_id}: uniform={uniform} tiles={}", members.join(",")),
        )?;
    }
    Ok(())
}

fn emit<W: Write>(stdout: &mut W, line: &str) -> Result<(), String> {
    writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))
}
