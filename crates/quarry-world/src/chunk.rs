use crate::bitfield::PackingConvention;
use crate::heightmap::Heightmap;
use crate::palette::{DecodedSection, Section};
use quarry_common::{QuarryError, RenderReport, Result};
use quarry_nbt::Tag;
use std::collections::HashMap;

const FULL_STATUS: &str = "full";

/// A chunk lifted out of its tag tree. Handles both the flat layout and the
/// older one nested under a `Level` compound.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Absolute chunk coordinates
    pub x: i32,
    pub z: i32,
    pub data_version: i32,
    pub status: String,
    /// Section Y of the lowest section; heightmap values are relative to it
    pub y_pos: i32,
    pub sections: Vec<Section>,
    heightmaps: HashMap<String, Vec<i64>>,
}

impl Chunk {
    /// Reads a chunk tree. `fallback` supplies coordinates for chunks that omit them.
    pub fn from_tag(root: &Tag, fallback: (i32, i32)) -> Result<Chunk> {
        let data_version = optional_i32(root, "DataVersion")?.unwrap_or(0);

        match root.get_opt("Level")? {
            Some(level) => Chunk::from_legacy(level, data_version, fallback),
            None => Chunk::from_flat(root, data_version, fallback),
        }
    }

    fn from_flat(root: &Tag, data_version: i32, fallback: (i32, i32)) -> Result<Chunk> {
        let mut sections = Vec::new();
        if root.contains("sections") {
            for section in root.get_list("sections")? {
                let y = section_y(section)?;
                let (palette, data) = match section.get_opt("block_states")? {
                    Some(states) => (
                        palette_names(states, "palette")?,
                        optional_longs(states, "data")?,
                    ),
                    None => (Vec::new(), None),
                };
                sections.push(Section { y, palette, data });
            }
        }

        Ok(Chunk {
            x: optional_i32(root, "xPos")?.unwrap_or(fallback.0),
            z: optional_i32(root, "zPos")?.unwrap_or(fallback.1),
            data_version,
            status: optional_str(root, "Status")?,
            y_pos: optional_i32(root, "yPos")?.unwrap_or(0),
            sections,
            heightmaps: heightmaps(root)?,
        })
    }

    fn from_legacy(level: &Tag, data_version: i32, fallback: (i32, i32)) -> Result<Chunk> {
        let mut sections = Vec::new();
        if level.contains("Sections") {
            for section in level.get_list("Sections")? {
                sections.push(Section {
                    y: section_y(section)?,
                    palette: palette_names(section, "Palette")?,
                    data: optional_longs(section, "BlockStates")?,
                });
            }
        }

        Ok(Chunk {
            x: optional_i32(level, "xPos")?.unwrap_or(fallback.0),
            z: optional_i32(level, "zPos")?.unwrap_or(fallback.1),
            data_version,
            status: optional_str(level, "Status")?,
            y_pos: 0,
            sections,
            heightmaps: heightmaps(level)?,
        })
    }

    pub fn convention(&self) -> PackingConvention {
        PackingConvention::for_data_version(self.data_version)
    }

    /// Only fully generated chunks are drawn
    pub fn is_fully_generated(&self) -> bool {
        self.status.trim_start_matches("minecraft:") == FULL_STATUS
    }

    pub fn heightmap_names(&self) -> impl Iterator<Item = &str> {
        self.heightmaps.keys().map(String::as_str)
    }

    /// Decodes one heightmap layer with this chunk's packing convention
    pub fn heightmap(&self, layer: &str) -> Result<Heightmap> {
        Heightmap::decode(
            layer,
            self.heightmaps.get(layer).map(Vec::as_slice),
            self.convention(),
        )
    }

    /// Unpacks section `index`; `None` if there is no such section
    pub fn decode_section(&self, index: usize, report: &mut RenderReport) -> Option<DecodedSection> {
        self.sections.get(index).map(|section| {
            DecodedSection::decode(section, self.convention(), (self.x, self.z), report)
        })
    }
}

fn section_y(section: &Tag) -> Result<i32> {
    optional_i32(section, "Y")?.ok_or_else(|| QuarryError::MissingTag("Y".to_owned()))
}

/// Accepts a Byte as well as an Int; tools write coordinates either way
fn optional_i32(tag: &Tag, key: &str) -> Result<Option<i32>> {
    match tag.get_opt(key)? {
        Some(Tag::Byte(v)) => Ok(Some(*v as i32)),
        Some(_) => tag.get_i32(key).map(Some),
        None => Ok(None),
    }
}

fn optional_str(tag: &Tag, key: &str) -> Result<String> {
    match tag.get_opt(key)? {
        Some(_) => Ok(tag.get_str(key)?.to_owned()),
        None => Ok(String::new()),
    }
}

fn optional_longs(tag: &Tag, key: &str) -> Result<Option<Vec<i64>>> {
    match tag.get_opt(key)? {
        Some(_) => Ok(Some(tag.get_long_array(key)?.to_vec())),
        None => Ok(None),
    }
}

fn palette_names(tag: &Tag, key: &str) -> Result<Vec<String>> {
    if !tag.contains(key) {
        return Ok(Vec::new());
    }
    tag.get_list(key)?
        .iter()
        .map(|entry| entry.get_str("Name").map(str::to_owned))
        .collect()
}

fn heightmaps(tag: &Tag) -> Result<HashMap<String, Vec<i64>>> {
    let mut result = HashMap::new();
    if let Some(maps) = tag.get_opt("Heightmaps")? {
        for (name, words) in maps.as_compound()? {
            if let Tag::LongArray(words) = words {
                result.insert(name.clone(), words.clone());
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn stone_section(y: i8) -> Tag {
        Tag::compound(vec![
            ("Y", Tag::Byte(y)),
            (
                "block_states",
                Tag::compound(vec![(
                    "palette",
                    Tag::List(vec![Tag::compound(vec![(
                        "Name",
                        Tag::String("minecraft:stone".to_string()),
                    )])]),
                )]),
            ),
        ])
    }

    fn flat_chunk(status: &str) -> Tag {
        Tag::compound(vec![
            ("DataVersion", Tag::Int(3120)),
            ("Status", Tag::String(status.to_string())),
            ("xPos", Tag::Int(-3)),
            ("zPos", Tag::Int(7)),
            ("yPos", Tag::Int(-4)),
            ("sections", Tag::List(vec![stone_section(-4), stone_section(0)])),
            (
                "Heightmaps",
                Tag::compound(vec![("WORLD_SURFACE", Tag::LongArray(vec![0; 37]))]),
            ),
        ])
    }

    #[test]
    fn test_flat_layout() {
        let chunk = Chunk::from_tag(&flat_chunk("minecraft:full"), (0, 0)).unwrap();
        assert_eq!((chunk.x, chunk.z), (-3, 7));
        assert_eq!(chunk.y_pos, -4);
        assert_eq!(chunk.sections.len(), 2);
        assert_eq!(chunk.sections[1].palette, vec!["minecraft:stone".to_string()]);
        assert!(chunk.sections[1].data.is_none());
        assert!(chunk.is_fully_generated());
        assert_eq!(chunk.convention(), PackingConvention::Bounded);
        assert!(!chunk.heightmap("WORLD_SURFACE").unwrap().is_unknown());
        assert!(chunk.heightmap("OCEAN_FLOOR").unwrap().is_unknown());
    }

    #[test]
    fn test_status_gate() {
        let chunk = Chunk::from_tag(&flat_chunk("full"), (0, 0)).unwrap();
        assert!(chunk.is_fully_generated());
        let chunk = Chunk::from_tag(&flat_chunk("minecraft:noise"), (0, 0)).unwrap();
        assert!(!chunk.is_fully_generated());
    }

    #[test]
    fn test_legacy_layout() {
        let legacy = Tag::compound(vec![
            ("DataVersion", Tag::Int(2230)),
            (
                "Level",
                Tag::compound(vec![
                    ("Status", Tag::String("full".to_string())),
                    (
                        "Sections",
                        Tag::List(vec![
                            Tag::compound(vec![("Y", Tag::Byte(-1))]),
                            Tag::compound(vec![
                                ("Y", Tag::Byte(0)),
                                (
                                    "Palette",
                                    Tag::List(vec![Tag::compound(vec![(
                                        "Name",
                                        Tag::String("minecraft:nether_portal".to_string()),
                                    )])]),
                                ),
                            ]),
                        ]),
                    ),
                    (
                        "Heightmaps",
                        Tag::compound(vec![("MOTION_BLOCKING", Tag::LongArray(vec![0; 36]))]),
                    ),
                ]),
            ),
        ]);
        let chunk = Chunk::from_tag(&legacy, (4, 5)).unwrap();
        assert_eq!((chunk.x, chunk.z), (4, 5));
        assert_eq!(chunk.y_pos, 0);
        assert_eq!(chunk.convention(), PackingConvention::Continuous);
        assert!(chunk.sections[0].palette.is_empty());
        assert!(chunk.sections[1].contains_block("minecraft:nether_portal"));
        assert!(!chunk.heightmap("MOTION_BLOCKING").unwrap().is_unknown());
    }

    #[test]
    fn test_type_mismatch_surfaces() {
        let broken = Tag::compound(vec![("DataVersion", Tag::String("x".to_string()))]);
        assert_matches!(
            Chunk::from_tag(&broken, (0, 0)),
            Err(QuarryError::TypeMismatch { .. })
        );
    }
}
