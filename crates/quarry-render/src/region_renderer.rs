use crate::chunk_renderer::{render_chunk, RenderMode};
use crate::colors::{ColorTable, UNLOADED};
use image::{imageops, Rgb, RgbImage};
use quarry_common::{AnomalyKind, RenderReport, CHUNK_SIZE, REGION_CHUNKS, TILE_SIZE};
use quarry_logger::{log, LogSeverity};
use quarry_world::RegionFile;

pub fn unloaded_tile() -> RgbImage {
    RgbImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgb(UNLOADED))
}

/// Renders a whole region into a 512x512 tile. Chunk (x, z) lands at (16x, 16z).
/// Absent chunks stay unloaded; chunks that fail to decode are unloaded and reported.
pub fn render_region(
    region: &RegionFile,
    mode: &RenderMode,
    colors: &ColorTable,
    report: &mut RenderReport,
) -> RgbImage {
    let mut tile = unloaded_tile();
    for z in 0..REGION_CHUNKS as usize {
        for x in 0..REGION_CHUNKS as usize {
            let chunk = match region.chunk(x, z) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => continue,
                Err(err) => {
                    log(
                        format!("Chunk ({}, {}) of {}: {}", x, z, region.key(), err),
                        LogSeverity::Debug,
                    );
                    report.record_anomaly(
                        AnomalyKind::UndecodableChunk,
                        Some(region.absolute_chunk(x, z)),
                        err.to_string(),
                    );
                    continue;
                }
            };
            let raster = render_chunk(&chunk, mode, colors, report);
            imageops::replace(
                &mut tile,
                &raster,
                (x as u32 * CHUNK_SIZE) as i64,
                (z as u32 * CHUNK_SIZE) as i64,
            );
        }
    }
    tile
}
