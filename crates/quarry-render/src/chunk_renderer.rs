use crate::colors::{is_air, ColorTable, DECODE_ERROR, UNLOADED};
use image::{Rgb, RgbImage};
use quarry_common::{AnomalyKind, Dimension, RenderReport, CHUNK_SIZE};
use quarry_world::palette::section_for_height;
use quarry_world::{BlockLookup, Chunk, DecodedSection, Heightmap};
use std::fmt;

/// What a chunk raster shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// Grayscale of the surface height in the named heightmap
    Heightmap(String),
    /// Colour of the top block, found through the named heightmap
    Terrain(String),
    /// Colour of the block at a fixed height relative to the lowest section
    Slice(i32),
}

impl RenderMode {
    /// Terrain through `layer`, except the nether, which is cut at `nether_slice` when set
    /// because its ceiling hides everything under a heightmap.
    pub fn for_dimension(dimension: Dimension, layer: &str, nether_slice: Option<i32>) -> RenderMode {
        match (dimension, nether_slice) {
            (Dimension::Nether, Some(y)) => RenderMode::Slice(y),
            _ => RenderMode::Terrain(layer.to_owned()),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Heightmap(layer) => write!(f, "heightmap {}", layer),
            RenderMode::Terrain(layer) => write!(f, "terrain {}", layer),
            RenderMode::Slice(y) => write!(f, "slice at {}", y),
        }
    }
}

pub fn unloaded_chunk() -> RgbImage {
    RgbImage::from_pixel(CHUNK_SIZE, CHUNK_SIZE, Rgb(UNLOADED))
}

/// Renders one 16x16 chunk raster. Decode problems are absorbed into `report`.
pub fn render_chunk(
    chunk: &Chunk,
    mode: &RenderMode,
    colors: &ColorTable,
    report: &mut RenderReport,
) -> RgbImage {
    if !chunk.is_fully_generated() {
        return unloaded_chunk();
    }

    let heights = match mode {
        RenderMode::Heightmap(layer) | RenderMode::Terrain(layer) => {
            match chunk.heightmap(layer) {
                Ok(heightmap) => heightmap,
                Err(err) => {
                    report.record_anomaly(
                        AnomalyKind::MalformedPackedArray,
                        Some((chunk.x, chunk.z)),
                        err.to_string(),
                    );
                    Heightmap::Unknown
                }
            }
        }
        RenderMode::Slice(y) => Heightmap::Decoded(vec![*y; 256]),
    };

    let mut image = unloaded_chunk();
    if let RenderMode::Heightmap(_) = mode {
        for (x, z, pixel) in image.enumerate_pixels_mut() {
            if let Some(height) = heights.height(x as usize, z as usize) {
                let gray = height.clamp(0, 255) as u8;
                *pixel = Rgb([gray, gray, gray]);
            }
        }
        return image;
    }

    // Sections are unpacked the first time a column needs them
    let mut decoded: Vec<Option<DecodedSection>> = vec![None; chunk.sections.len()];
    for (x, z, pixel) in image.enumerate_pixels_mut() {
        let (x, z) = (x as usize, z as usize);
        let height = match heights.height(x, z) {
            Some(height) => height,
            None => continue,
        };
        let (index, local_y) = match section_for_height(&chunk.sections, height, chunk.y_pos) {
            Some(found) => found,
            None => continue,
        };
        if decoded[index].is_none() {
            decoded[index] = chunk.decode_section(index, report);
        }
        let section = match &decoded[index] {
            Some(section) => section,
            None => continue,
        };

        *pixel = match section.block_at(x, local_y, z) {
            BlockLookup::Block(name) if is_air(name) => Rgb(UNLOADED),
            BlockLookup::Block(name) => Rgb(colors.resolve(name, report)),
            BlockLookup::OutOfRange(palette_index) => {
                report.record_anomaly(
                    AnomalyKind::CorruptPalette,
                    Some((chunk.x, chunk.z)),
                    format!(
                        "section {} index {} with {} palette entries",
                        section.y,
                        palette_index,
                        section.palette.len()
                    ),
                );
                Rgb(DECODE_ERROR)
            }
            BlockLookup::Unloaded => Rgb(UNLOADED),
        };
    }
    image
}
