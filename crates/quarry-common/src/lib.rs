pub mod config;
pub mod error;
pub mod report;
pub mod types;

pub use config::QuarryConfig;
pub use error::QuarryError;
pub use report::{Anomaly, AnomalyKind, RenderReport};
pub use types::{Dimension, Position, RegionKey, Result, Rgb, CHUNK_SIZE, REGION_CHUNKS, TILE_SIZE};
