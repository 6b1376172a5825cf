use crate::bitfield::{unpack, words_needed, PackingConvention};
use quarry_common::{AnomalyKind, QuarryError, RenderReport, Result};

/// Blocks in one 16x16x16 section
pub const SECTION_VOLUME: usize = 4096;
const MIN_INDEX_BITS: u32 = 4;

/// One 16x16x16 slice of a chunk as stored on disk
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub y: i32,
    /// Block identifiers, e.g. `minecraft:stone`
    pub palette: Vec<String>,
    /// Packed palette indices; absent for single-entry palettes
    pub data: Option<Vec<i64>>,
}

impl Section {
    pub fn contains_block(&self, identifier: &str) -> bool {
        self.palette.iter().any(|name| name == identifier)
    }
}

/// Width of one palette index: enough bits for `len - 1`, never below 4
pub fn bits_for_palette(len: usize) -> u32 {
    let needed = if len <= 1 {
        0
    } else {
        usize::BITS - (len - 1).leading_zeros()
    };
    needed.max(MIN_INDEX_BITS)
}

/// Position of (x, y, z) inside a section's index array
pub fn block_index(x: usize, y: usize, z: usize) -> usize {
    y * 256 + z * 16 + x
}

/// Result of resolving one block position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLookup<'a> {
    Block(&'a str),
    /// The stored index points past the end of the palette
    OutOfRange(u64),
    /// Nothing to draw: no qualifying section, or its data was rejected
    Unloaded,
}

#[derive(Debug, Clone, PartialEq)]
enum Blocks {
    Uniform,
    Indexed(Vec<u64>),
    Rejected,
}

/// A section with its index array unpacked once, ready for per-column lookups
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSection {
    pub y: i32,
    pub palette: Vec<String>,
    blocks: Blocks,
}

impl DecodedSection {
    /// Unpacks a section. Problems are recorded against `chunk` and absorbed:
    /// a malformed array leaves the whole section unloaded.
    pub fn decode(
        section: &Section,
        convention: PackingConvention,
        chunk: (i32, i32),
        report: &mut RenderReport,
    ) -> DecodedSection {
        let blocks = match &section.data {
            None => {
                if section.palette.len() > 1 {
                    report.record_anomaly(
                        AnomalyKind::MissingChunkData,
                        Some(chunk),
                        format!(
                            "section {} has {} palette entries but no data",
                            section.y,
                            section.palette.len()
                        ),
                    );
                }
                Blocks::Uniform
            }
            Some(words) => match unpack_indices(section, words, convention) {
                Ok(indices) => Blocks::Indexed(indices),
                Err(err) => {
                    report.record_anomaly(
                        AnomalyKind::MalformedPackedArray,
                        Some(chunk),
                        err.to_string(),
                    );
                    Blocks::Rejected
                }
            },
        };

        DecodedSection {
            y: section.y,
            palette: section.palette.clone(),
            blocks,
        }
    }

    pub fn has_palette(&self) -> bool {
        !self.palette.is_empty()
    }

    pub fn block_at(&self, x: usize, y: usize, z: usize) -> BlockLookup<'_> {
        let index = match &self.blocks {
            Blocks::Uniform => 0,
            Blocks::Indexed(indices) => match indices.get(block_index(x, y, z)) {
                Some(&index) => index,
                None => return BlockLookup::Unloaded,
            },
            Blocks::Rejected => return BlockLookup::Unloaded,
        };
        match self.palette.get(index as usize) {
            Some(name) => BlockLookup::Block(name),
            None if self.palette.is_empty() => BlockLookup::Unloaded,
            None => BlockLookup::OutOfRange(index),
        }
    }
}

fn unpack_indices(section: &Section, words: &[i64], convention: PackingConvention) -> Result<Vec<u64>> {
    let width = bits_for_palette(section.palette.len());
    let expected = words_needed(SECTION_VOLUME, width, convention)?;
    if words.len() != expected {
        return Err(QuarryError::MalformedPackedArray {
            name: format!("section {} block states", section.y),
            expected_words: expected,
            actual_words: words.len(),
        });
    }
    let mut indices = unpack(words, width, convention)?;
    indices.truncate(SECTION_VOLUME);
    Ok(indices)
}

/// Picks the section to sample for relative height `height`: its index in `sections`
/// and the local y inside it.
///
/// The section whose Y equals `height / 16 + y_pos` wins; otherwise the highest section
/// with a non-empty palette is used. `None` when no section qualifies.
pub fn section_for_height(sections: &[Section], height: i32, y_pos: i32) -> Option<(usize, usize)> {
    let target = height.div_euclid(16) + y_pos;
    let local_y = height.rem_euclid(16) as usize;

    sections
        .iter()
        .position(|section| section.y == target)
        .or_else(|| {
            sections
                .iter()
                .enumerate()
                .filter(|(_, section)| !section.palette.is_empty())
                .max_by_key(|(_, section)| section.y)
                .map(|(index, _)| index)
        })
        .map(|index| (index, local_y))
}
