pub mod chunk_renderer;
pub mod colors;
pub mod composer;
pub mod map_item;
pub mod region_renderer;
pub mod tile_cache;

use quarry_common::QuarryError;

pub use chunk_renderer::{render_chunk, RenderMode};
pub use colors::{ColorTable, DECODE_ERROR, UNLOADED};
pub use composer::{visible_regions, RegionBounds, Viewport, WorldMapComposer};
pub use map_item::{render_map_file, MapRender};
pub use region_renderer::render_region;
pub use tile_cache::{part_path, save_png, CacheLookup, Freshness, TileCache};

pub(crate) fn image_error(err: image::ImageError) -> QuarryError {
    QuarryError::ImageError(err.to_string())
}
