use crate::region_renderer::unloaded_tile;
use crate::tile_cache::{save_png, TileCache};
use image::{imageops, RgbImage};
use quarry_common::{Dimension, RegionKey, Result, TILE_SIZE};
use quarry_logger::{log, LogSeverity};
use std::path::{Path, PathBuf};

/// Inclusive range of region coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl RegionBounds {
    /// Smallest range covering every key; `None` for no keys
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a RegionKey>) -> Option<RegionBounds> {
        let mut keys = keys.into_iter();
        let first = keys.next()?;
        let mut bounds = RegionBounds {
            min_x: first.x,
            max_x: first.x,
            min_z: first.z,
            max_z: first.z,
        };
        for key in keys {
            bounds.min_x = bounds.min_x.min(key.x);
            bounds.max_x = bounds.max_x.max(key.x);
            bounds.min_z = bounds.min_z.min(key.z);
            bounds.max_z = bounds.max_z.max(key.z);
        }
        Some(bounds)
    }

    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max_z - self.min_z + 1) as u32
    }

    pub fn contains(&self, x: i32, z: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_z..=self.max_z).contains(&z)
    }

    /// Pixel offset of a region's tile inside a composite of these bounds
    pub fn pixel_offset(&self, x: i32, z: i32) -> (u32, u32) {
        (
            (x - self.min_x) as u32 * TILE_SIZE,
            (z - self.min_z) as u32 * TILE_SIZE,
        )
    }

    /// Every key in range, row by row
    pub fn keys(&self, dimension: Dimension) -> Vec<RegionKey> {
        (self.min_z..=self.max_z)
            .flat_map(|z| (self.min_x..=self.max_x).map(move |x| RegionKey::new(dimension, x, z)))
            .collect()
    }
}

/// What part of the world is on screen. `x`/`z` are the world block coordinates of the
/// top-left corner, `width`/`height` the screen size in pixels, `scale` pixels per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub z: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl Viewport {
    /// Viewport of the given pixel size with world point (`x`, `z`) in its centre
    pub fn centred_on(x: f64, z: f64, width: f64, height: f64, scale: f64) -> Viewport {
        Viewport {
            x: x - width / scale / 2.0,
            z: z - height / scale / 2.0,
            width,
            height,
            scale,
        }
    }
}

fn region_of(block: f64) -> i32 {
    (block / TILE_SIZE as f64).floor() as i32
}

/// Regions intersecting the viewport, with one region of margin on every side
pub fn visible_regions(viewport: &Viewport) -> RegionBounds {
    let scale = if viewport.scale > 0.0 { viewport.scale } else { 1.0 };
    RegionBounds {
        min_x: region_of(viewport.x) - 1,
        max_x: region_of(viewport.x + viewport.width / scale) + 1,
        min_z: region_of(viewport.z) - 1,
        max_z: region_of(viewport.z + viewport.height / scale) + 1,
    }
}

/// Assembles cached tiles into composites
#[derive(Debug, Clone)]
pub struct WorldMapComposer<'a> {
    cache: &'a TileCache,
}

impl<'a> WorldMapComposer<'a> {
    pub fn new(cache: &'a TileCache) -> Self {
        Self { cache }
    }

    /// Region files and cached tiles of a dimension together
    fn known_keys(&self, dimension: Dimension) -> Result<Vec<RegionKey>> {
        let mut keys = self.cache.world().region_keys(dimension)?;
        keys.extend(self.cache.tiles(dimension)?);
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Builds one raster of every cached tile in the dimension. Regions without a tile stay
    /// unloaded. `None` when the dimension has no regions at all.
    pub fn compose(&self, dimension: Dimension) -> Result<Option<RgbImage>> {
        let keys = self.known_keys(dimension)?;
        let bounds = match RegionBounds::from_keys(&keys) {
            Some(bounds) => bounds,
            None => return Ok(None),
        };

        let mut composite = RgbImage::new(bounds.width() * TILE_SIZE, bounds.height() * TILE_SIZE);
        let unloaded = unloaded_tile();
        for key in bounds.keys(dimension) {
            let (px, py) = bounds.pixel_offset(key.x, key.z);
            let tile = match self.cache.load(key) {
                Ok(Some(tile)) => tile,
                Ok(None) => unloaded.clone(),
                Err(err) => {
                    log(format!("Skipping tile {}: {}", key, err), LogSeverity::Warning);
                    unloaded.clone()
                }
            };
            imageops::replace(&mut composite, &tile, px as i64, py as i64);
        }
        Ok(Some(composite))
    }

    /// Composes and writes the dimension to `output`, or `_<dimension>.png` in the data
    /// directory. Returns the written path, `None` if there was nothing to compose.
    pub fn export(&self, dimension: Dimension, output: Option<&Path>) -> Result<Option<PathBuf>> {
        let composite = match self.compose(dimension)? {
            Some(composite) => composite,
            None => return Ok(None),
        };
        let path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cache.composite_path(dimension));
        save_png(&composite, &path)?;
        log(
            format!(
                "Exported {}x{} {} map to {}",
                composite.width(),
                composite.height(),
                dimension,
                path.display()
            ),
            LogSeverity::Info,
        );
        Ok(Some(path))
    }

    /// Fresh cached tiles inside the viewport. Never waits on rendering; anything missing
    /// or stale is left out.
    pub fn viewport_tiles(
        &self,
        dimension: Dimension,
        viewport: &Viewport,
    ) -> Vec<(RegionKey, RgbImage)> {
        visible_regions(viewport)
            .keys(dimension)
            .into_iter()
            .filter(|key| self.cache.is_fresh(*key))
            .filter_map(|key| match self.cache.load(key) {
                Ok(Some(tile)) => Some((key, tile)),
                _ => None,
            })
            .collect()
    }
}
