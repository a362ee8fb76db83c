use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::geom::{Int2, Int3};

use super::database::{TileCatalogue, TileDef, TileKind};
use super::mask::load_opacity_mask;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("failed to read tile manifest {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tile manifest {} is invalid at '{json_path}': {message}", .path.display())]
    InvalidManifest {
        path: PathBuf,
        json_path: String,
        message: String,
    },
    #[error("tile '{name}' is declared more than once in {}", .path.display())]
    DuplicateTile { path: PathBuf, name: String },
    #[error("tile '{name}' in {} has invalid {field}: {message}", .path.display())]
    InvalidTile {
        path: PathBuf,
        name: String,
        field: &'static str,
        message: String,
    },
    #[error("tile '{name}' mask {} could not be loaded: {reason}", .mask_path.display())]
    Mask {
        name: String,
        mask_path: PathBuf,
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TileManifest {
    tiles: Vec<TileManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TileManifestEntry {
    name: String,
    #[serde(default = "default_kind")]
    kind: ManifestTileKind,
    bbox: [i32; 3],
    #[serde(default)]
    offset: [i32; 2],
    size: [i32; 2],
    #[serde(default)]
    mask: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ManifestTileKind {
    Floor,
    Wall,
    Object,
    Stairs,
    Roof,
    Unknown,
}

fn default_kind() -> ManifestTileKind {
    ManifestTileKind::Unknown
}

impl From<ManifestTileKind> for TileKind {
    fn from(kind: ManifestTileKind) -> Self {
        match kind {
            ManifestTileKind::Floor => TileKind::Floor,
            ManifestTileKind::Wall => TileKind::Wall,
            ManifestTileKind::Object => TileKind::Object,
            ManifestTileKind::Stairs => TileKind::Stairs,
            ManifestTileKind::Roof => TileKind::Roof,
            ManifestTileKind::Unknown => TileKind::Unknown,
        }
    }
}

/// Loads a JSON tile manifest. Mask paths are resolved against the manifest's
/// directory.
pub fn load_tile_catalogue(path: &Path) -> Result<TileCatalogue, CatalogueError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogueError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let catalogue = parse_tile_catalogue(path, base_dir, &raw)?;
    info!(
        path = %path.display(),
        tile_count = catalogue.len(),
        "tile_catalogue_loaded"
    );
    Ok(catalogue)
}

pub(crate) fn parse_tile_catalogue(
    path: &Path,
    base_dir: &Path,
    raw: &str,
) -> Result<TileCatalogue, CatalogueError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let manifest = serde_path_to_error::deserialize::<_, TileManifest>(&mut deserializer).map_err(
        |error| CatalogueError::InvalidManifest {
            path: path.to_path_buf(),
            json_path: error.path().to_string(),
            message: error.inner().to_string(),
        },
    )?;

    let mut seen = HashSet::<String>::new();
    let mut defs = Vec::<TileDef>::with_capacity(manifest.tiles.len());
    for entry in manifest.tiles {
        if !seen.insert(entry.name.clone()) {
            return Err(CatalogueError::DuplicateTile {
                path: path.to_path_buf(),
                name: entry.name,
            });
        }
        defs.push(tile_def_from_entry(path, base_dir, entry)?);
    }

    Ok(TileCatalogue::from_tile_defs(defs))
}

fn tile_def_from_entry(
    path: &Path,
    base_dir: &Path,
    entry: TileManifestEntry,
) -> Result<TileDef, CatalogueError> {
    let invalid = |field: &'static str, message: String| CatalogueError::InvalidTile {
        path: path.to_path_buf(),
        name: entry.name.clone(),
        field,
        message,
    };

    if entry.name.trim().is_empty() {
        return Err(invalid("name", "must not be empty".to_string()));
    }
    if entry.bbox.iter().any(|value| *value <= 0) {
        return Err(invalid(
            "bbox",
            format!("{:?} must have positive components", entry.bbox),
        ));
    }
    if entry.size.iter().any(|value| *value <= 0) {
        return Err(invalid(
            "size",
            format!("{:?} must have positive components", entry.size),
        ));
    }

    let mut def = TileDef::new(
        entry.name.clone(),
        entry.kind.into(),
        Int3::new(entry.bbox[0], entry.bbox[1], entry.bbox[2]),
    )
    .with_sprite(
        Int2::new(entry.offset[0], entry.offset[1]),
        Int2::new(entry.size[0], entry.size[1]),
    );

    if let Some(mask_rel) = &entry.mask {
        let mask_path = base_dir.join(mask_rel);
        let mask = load_opacity_mask(&mask_path).map_err(|reason| CatalogueError::Mask {
            name: entry.name.clone(),
            mask_path: mask_path.clone(),
            reason,
        })?;
        if mask.width() as i32 != entry.size[0] || mask.height() as i32 != entry.size[1] {
            return Err(CatalogueError::Mask {
                name: entry.name.clone(),
                mask_path,
                reason: format!(
                    "mask is {}x{} but sprite size is {}x{}",
                    mask.width(),
                    mask.height(),
                    entry.size[0],
                    entry.size[1]
                ),
            });
        }
        def = def.with_mask(mask);
    }

    Ok(def)
}
