use std::path::Path;

use image::ImageReader;

use crate::geom::Int2;

/// Per-pixel opacity of a tile sprite, one bool per pixel in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpacityMask {
    width: u32,
    height: u32,
    opaque: Vec<bool>,
}

impl OpacityMask {
    pub fn from_alpha(width: u32, height: u32, alpha: &[u8]) -> Option<Self> {
        if alpha.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            opaque: alpha.iter().map(|value| *value > 0).collect(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_opaque(&self, pos: Int2) -> bool {
        if pos.x < 0 || pos.y < 0 || pos.x as u32 >= self.width || pos.y as u32 >= self.height {
            return false;
        }
        let index = pos.y as usize * self.width as usize + pos.x as usize;
        self.opaque.get(index).copied().unwrap_or(false)
    }
}

pub(crate) fn load_opacity_mask(path: &Path) -> Result<OpacityMask, String> {
    let reader = ImageReader::open(path).map_err(|error| format!("file_open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    let (width, height) = image.dimensions();
    let alpha = image.pixels().map(|pixel| pixel.0[3]).collect::<Vec<_>>();
    OpacityMask::from_alpha(width, height, &alpha)
        .ok_or_else(|| "decode_failed:pixel count mismatch".to_string())
}
