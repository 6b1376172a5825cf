use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub type Result<T> = std::result::Result<T, crate::error::QuarryError>;

/// Blocks along one edge of a chunk
pub const CHUNK_SIZE: u32 = 16;
/// Chunks along one edge of a region
pub const REGION_CHUNKS: u32 = 32;
/// Pixels along one edge of a region tile
pub const TILE_SIZE: u32 = CHUNK_SIZE * REGION_CHUNKS;

pub type Rgb = [u8; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Overworld, Dimension::Nether, Dimension::End];

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Overworld => "overworld",
            Dimension::Nether => "nether",
            Dimension::End => "end",
        }
    }

    /// Directory holding this dimension's region files, relative to the world folder
    pub fn region_dir(&self, world: &Path) -> PathBuf {
        match self {
            Dimension::Overworld => world.join("region"),
            Dimension::Nether => world.join("DIM-1").join("region"),
            Dimension::End => world.join("DIM1").join("region"),
        }
    }

    /// Dimension cycled to by the viewer's "change dimension" action
    pub fn next(&self) -> Dimension {
        match self {
            Dimension::Overworld => Dimension::Nether,
            Dimension::Nether => Dimension::End,
            Dimension::End => Dimension::Overworld,
        }
    }

    /// Parses both the save-file identifiers (`minecraft:the_nether`, `-1`) and short names
    pub fn from_identifier(id: &str) -> Option<Dimension> {
        match id.trim_start_matches("minecraft:") {
            "overworld" | "0" => Some(Dimension::Overworld),
            "nether" | "the_nether" | "-1" => Some(Dimension::Nether),
            "end" | "the_end" | "1" => Some(Dimension::End),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = crate::error::QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        Dimension::from_identifier(s).ok_or_else(|| {
            crate::error::QuarryError::UsageError(format!(
                "unknown dimension '{}' (expected overworld, nether or end)",
                s
            ))
        })
    }
}

/// Identifies one region file and the tile rendered from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionKey {
    pub dimension: Dimension,
    pub x: i32,
    pub z: i32,
}

impl RegionKey {
    pub fn new(dimension: Dimension, x: i32, z: i32) -> Self {
        Self { dimension, x, z }
    }

    /// Name of the region file, `r.<x>.<z>.mca`
    pub fn region_file_name(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Name of the cached tile, `<dimension>.<x>.<z>.png`
    pub fn tile_file_name(&self) -> String {
        format!("{}.{}.{}.png", self.dimension, self.x, self.z)
    }

    /// Parses region coordinates out of an `r.<x>.<z>.mca` file name
    pub fn from_region_file_name(dimension: Dimension, file_name: &str) -> Option<RegionKey> {
        let mut parts = file_name.split('.');
        if parts.next()? != "r" {
            return None;
        }
        let x = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        if parts.next()? != "mca" || parts.next().is_some() {
            return None;
        }
        Some(RegionKey::new(dimension, x, z))
    }

    /// Parses a tile file name back into its key
    pub fn from_tile_file_name(file_name: &str) -> Option<RegionKey> {
        let mut parts = file_name.split('.');
        let dimension = Dimension::from_identifier(parts.next()?)?;
        let x = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        if parts.next()? != "png" || parts.next().is_some() {
            return None;
        }
        Some(RegionKey::new(dimension, x, z))
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.dimension, self.x, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
