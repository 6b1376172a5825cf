use quarry_common::{RenderReport, Result, Rgb};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/color_tables.rs"));
}

/// Placeholder for anything that was not (or could not be) drawn
pub const UNLOADED: Rgb = [0, 0, 0];
/// Drawn where a stored palette index points past the palette
pub const DECODE_ERROR: Rgb = [255, 0, 255];
/// Block whose colour stands in for identifiers missing from the table
pub const SENTINEL_BLOCK: &str = "magenta_concrete";
const SENTINEL_FALLBACK: Rgb = [169, 48, 159];

const NAMESPACE: &str = "minecraft:";
const AIR_BLOCKS: [&str; 3] = ["air", "cave_air", "void_air"];

pub fn strip_namespace(identifier: &str) -> &str {
    identifier.strip_prefix(NAMESPACE).unwrap_or(identifier)
}

pub fn is_air(identifier: &str) -> bool {
    AIR_BLOCKS.contains(&strip_namespace(identifier))
}

/// Immutable block and map-item colour lookup. Shared read-only between renders.
#[derive(Debug, Clone)]
pub struct ColorTable {
    blocks: HashMap<String, Rgb>,
    map: HashMap<i32, HashMap<u8, Rgb>>,
}

impl ColorTable {
    /// Tables compiled in from the bundled assets
    pub fn builtin() -> ColorTable {
        let blocks = generated::BLOCK_COLORS
            .iter()
            .map(|(name, rgb)| (name.to_string(), *rgb))
            .collect();
        let mut map: HashMap<i32, HashMap<u8, Rgb>> = HashMap::new();
        for (version, index, rgb) in generated::MAP_COLORS {
            map.entry(*version).or_default().insert(*index, *rgb);
        }
        ColorTable { blocks, map }
    }

    /// Built-in tables with block colours from a JSON object
    /// (`{"stone": [81, 81, 81], ...}`) layered on top
    pub fn from_json_file(path: &Path) -> Result<ColorTable> {
        let overrides: HashMap<String, Rgb> = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(ColorTable::builtin().with_blocks(overrides))
    }

    pub fn with_blocks(mut self, overrides: HashMap<String, Rgb>) -> ColorTable {
        for (name, rgb) in overrides {
            self.blocks.insert(strip_namespace(&name).to_owned(), rgb);
        }
        self
    }

    pub fn block_color(&self, identifier: &str) -> Option<Rgb> {
        self.blocks.get(strip_namespace(identifier)).copied()
    }

    pub fn sentinel(&self) -> Rgb {
        self.block_color(SENTINEL_BLOCK).unwrap_or(SENTINEL_FALLBACK)
    }

    /// Colour for a block. Unknown identifiers get the sentinel and are noted in `report`.
    pub fn resolve(&self, identifier: &str, report: &mut RenderReport) -> Rgb {
        match self.block_color(identifier) {
            Some(rgb) => rgb,
            None => {
                report.record_missing_block(strip_namespace(identifier));
                self.sentinel()
            }
        }
    }

    /// Map-item colour for a byte index, falling back to the version 0 palette
    pub fn map_color(&self, data_version: i32, index: u8) -> Option<Rgb> {
        let palette = self.map.get(&data_version).or_else(|| self.map.get(&0))?;
        palette.get(&index).copied()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        ColorTable::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables() {
        let colors = ColorTable::builtin();
        assert_eq!(colors.block_color("minecraft:stone"), Some([81, 81, 81]));
        assert_eq!(colors.block_color("stone"), Some([81, 81, 81]));
        assert_eq!(colors.sentinel(), [169, 48, 159]);
        assert!(colors.block_color("nether_portal").is_some());
        assert!(colors.block_count() > 80);
    }

    #[test]
    fn test_unknown_block_recorded_once() {
        let colors = ColorTable::builtin();
        let mut report = RenderReport::new();
        for _ in 0..3 {
            assert_eq!(
                colors.resolve("minecraft:frobnium_ore", &mut report),
                colors.sentinel()
            );
        }
        colors.resolve("minecraft:stone", &mut report);
        assert_eq!(report.missing_blocks().len(), 1);
        assert!(report.missing_blocks().contains("frobnium_ore"));
    }

    #[test]
    fn test_map_palette_fallback() {
        let colors = ColorTable::builtin();
        assert_eq!(colors.map_color(0, 4), Some([89, 125, 39]));
        // No table for this version, so version 0 answers
        assert_eq!(colors.map_color(1343, 4), Some([89, 125, 39]));
        assert_eq!(colors.map_color(0, 250), None);
    }

    #[test]
    fn test_air() {
        assert!(is_air("minecraft:air"));
        assert!(is_air("cave_air"));
        assert!(is_air("minecraft:void_air"));
        assert!(!is_air("minecraft:stone"));
    }

    #[test]
    fn test_overrides() {
        let path = std::env::temp_dir().join(format!("quarry-colors-{}.json", std::process::id()));
        fs::write(&path, r#"{"minecraft:stone": [1, 2, 3], "frobnium_ore": [4, 5, 6]}"#).unwrap();
        let colors = ColorTable::from_json_file(&path).unwrap();
        assert_eq!(colors.block_color("stone"), Some([1, 2, 3]));
        assert_eq!(colors.block_color("minecraft:frobnium_ore"), Some([4, 5, 6]));
        assert_eq!(colors.block_color("dirt"), ColorTable::builtin().block_color("dirt"));
        fs::remove_file(&path).unwrap();
    }
}
