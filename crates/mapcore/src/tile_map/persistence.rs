use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::atomic_io::write_document_atomic;
use crate::catalogue::TileCatalogue;
use crate::document::{line_suffix, DocumentError, XmlDocument};
use crate::geom::{Int2, Int3};
use crate::occluder::OccluderLoadError;
use crate::{is_valid_map_size, MAX_MAP_DIMENSION};

use super::TileMap;

#[derive(Debug, Error)]
pub enum MapLoadError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("map size {width}x{height} is outside 1..={max}", max = MAX_MAP_DIMENSION)]
    InvalidSize { width: i32, height: i32 },
    #[error("unknown tile '{name}'{}", line_suffix(.line))]
    UnknownTile { name: String, line: Option<usize> },
    #[error("tile '{name}' at {pos} leaves the map of size {dimensions}")]
    OutOfBounds {
        name: String,
        pos: Int3,
        dimensions: Int2,
    },
    #[error(transparent)]
    Occluders(#[from] OccluderLoadError),
}

#[derive(Debug, Error)]
pub enum MapFileError {
    #[error("failed to read map {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse map {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
    #[error("failed to load map {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: MapLoadError,
    },
    #[error("failed to write map {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TileMap {
    /// Replaces the map with the `tile_map` and `occluders` sections of `doc`.
    ///
    /// The map is emptied before anything is read and emptied again on
    /// failure. Placements overlapping an earlier one are skipped.
    pub fn load_from_xml(&mut self, doc: &XmlDocument, catalogue: &TileCatalogue) -> Result<(), MapLoadError> {
        self.clear();
        let result = self.load_sections(doc, catalogue);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn load_sections(&mut self, doc: &XmlDocument, catalogue: &TileCatalogue) -> Result<(), MapLoadError> {
        let root = doc.required_child("tile_map")?;
        let [width, height] = root.int2_attr("size")?;
        if !is_valid_map_size(Int2::new(width, height)) {
            return Err(MapLoadError::InvalidSize { width, height });
        }
        let declared_count = match root.attr("tile_count") {
            Some(_) => Some(root.int_attr("tile_count")?),
            None => None,
        };

        *self = TileMap::new(Int2::new(width, height));
        // The declared count is advisory; never reserve more than the
        // document actually holds.
        let placement_count = root
            .children_named("tile")
            .map(|tile_node| tile_node.children_named("i").count())
            .sum::<usize>();
        let reserve = declared_count
            .and_then(|declared| usize::try_from(declared).ok())
            .unwrap_or(0)
            .min(placement_count);
        let mut slots_by_tile_id = Vec::with_capacity(reserve);
        let mut skipped = 0_usize;

        for tile_node in root.children_named("tile") {
            let name = tile_node.required_attr("name")?;
            let tile = catalogue
                .tile_by_name(name)
                .ok_or_else(|| MapLoadError::UnknownTile {
                    name: name.to_string(),
                    line: tile_node.line(),
                })?;

            for instance in tile_node.children_named("i") {
                let [x, y, z] = instance.int3_attr("pos")?;
                let pos = Int3::new(x, y, z);
                if self.fitting_placement(tile, pos).is_none() {
                    return Err(MapLoadError::OutOfBounds {
                        name: name.to_string(),
                        pos,
                        dimensions: self.grid.dimensions(),
                    });
                }
                let slot = self.maybe_add(tile, pos);
                if slot.is_none() {
                    skipped += 1;
                    info!(tile = name, pos = %pos, "tile_map_duplicate_skipped");
                }
                slots_by_tile_id.push(slot);
            }
        }

        if let Some(declared) = declared_count {
            if usize::try_from(declared).ok() != Some(slots_by_tile_id.len()) {
                warn!(
                    declared,
                    actual = slots_by_tile_id.len(),
                    "tile_map_tile_count_mismatch"
                );
            }
        }

        self.occluders
            .load_from_xml(&mut self.grid, doc, &slots_by_tile_id)?;

        info!(
            width,
            height,
            tile_count = self.grid.object_count(),
            skipped,
            occluder_count = self.occluders.len(),
            "tile_map_loaded"
        );
        Ok(())
    }

    /// Appends the `tile_map` and `occluders` sections to `doc`.
    ///
    /// Output depends only on the placed tiles and occluders, never on slot
    /// order.
    ///
    /// # Panics
    ///
    /// Panics if a placed tile is missing from `catalogue`.
    pub fn save_to_xml(&self, doc: &mut XmlDocument, catalogue: &TileCatalogue) {
        let mut placements = self
            .grid
            .iter()
            .map(|(slot, def)| {
                let Some(tile) = catalogue.tile(def.payload) else {
                    panic!("tile {:?} in slot {slot} is not in the catalogue", def.payload);
                };
                (tile.name.as_str(), def.bbox.min, def.bbox.size(), slot)
            })
            .collect::<Vec<_>>();
        placements.sort_by(|lhs, rhs| (lhs.0, lhs.1).cmp(&(rhs.0, rhs.1)));

        let mut tile_ids = vec![None; self.grid.len()];
        let root = doc.add_child("tile_map");
        root.set_attr("size", self.grid.dimensions())
            .set_attr("tile_count", placements.len());

        let mut next_id = 0_u32;
        for run in placements.chunk_by(|lhs, rhs| lhs.0 == rhs.0) {
            let tile_node = root.add_child("tile");
            tile_node.set_attr("name", run[0].0);
            for &(_, pos, size, slot) in run {
                tile_node
                    .add_child("i")
                    .set_attr("pos", pos)
                    .set_attr("bbox", size);
                tile_ids[slot] = Some(next_id);
                next_id += 1;
            }
        }

        self.occluders.save_to_xml(&tile_ids, doc);
    }

    pub fn load_from_file(&mut self, path: &Path, catalogue: &TileCatalogue) -> Result<(), MapFileError> {
        self.clear();
        let raw = fs::read_to_string(path).map_err(|source| MapFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = XmlDocument::parse(&raw).map_err(|source| MapFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_from_xml(&doc, catalogue)
            .map_err(|source| MapFileError::Load {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn save_to_file(&self, path: &Path, catalogue: &TileCatalogue) -> Result<(), MapFileError> {
        let mut doc = XmlDocument::new();
        self.save_to_xml(&mut doc, catalogue);
        write_document_atomic(path, &doc.to_xml_string()).map_err(|source| MapFileError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
