pub mod bitfield;
pub mod chunk;
pub mod heightmap;
pub mod level;
pub mod palette;
pub mod portals;
pub mod region;
pub mod world;

pub use bitfield::PackingConvention;
pub use chunk::Chunk;
pub use heightmap::Heightmap;
pub use level::{GameType, LevelInfo, PlayerInfo};
pub use palette::{BlockLookup, DecodedSection, Section};
pub use region::{region_mtime, RegionFile, RegionWriter};
pub use world::{latest_save, list_saves, World};
