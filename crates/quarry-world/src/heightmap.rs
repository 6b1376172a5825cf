use crate::bitfield::{unpack, words_needed, PackingConvention};
use quarry_common::{QuarryError, Result};

pub const HEIGHTMAP_BITS: u32 = 9;
/// One entry per (x, z) column of a chunk
pub const COLUMNS: usize = 256;

/// Per-column surface heights of one chunk, indexed `z * 16 + x`
#[derive(Debug, Clone, PartialEq)]
pub enum Heightmap {
    /// Height of the top block of each column; -1 for a column of air
    Decoded(Vec<i32>),
    /// The chunk carries no usable array for the requested layer
    Unknown,
}

impl Heightmap {
    /// Decodes a named heightmap array. `None` means the chunk has no such layer.
    pub fn decode(
        name: &str,
        words: Option<&[i64]>,
        convention: PackingConvention,
    ) -> Result<Heightmap> {
        let words = match words {
            Some(words) => words,
            None => return Ok(Heightmap::Unknown),
        };

        let expected = words_needed(COLUMNS, HEIGHTMAP_BITS, convention)?;
        if words.len() != expected {
            return Err(QuarryError::MalformedPackedArray {
                name: name.to_owned(),
                expected_words: expected,
                actual_words: words.len(),
            });
        }

        let heights = unpack(words, HEIGHTMAP_BITS, convention)?
            .into_iter()
            .take(COLUMNS)
            // stored value is one above the top block
            .map(|stored| stored as i32 - 1)
            .collect();
        Ok(Heightmap::Decoded(heights))
    }

    /// Height of column (x, z), or `None` if the heightmap is unknown
    pub fn height(&self, x: usize, z: usize) -> Option<i32> {
        match self {
            Heightmap::Decoded(heights) => heights.get(z * 16 + x).copied(),
            Heightmap::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Heightmap::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfield::pack;
    use assert_matches::assert_matches;

    #[test]
    fn test_all_zero_is_air() {
        for convention in [PackingConvention::Bounded, PackingConvention::Continuous] {
            let words = vec![0i64; words_needed(COLUMNS, 9, convention).unwrap()];
            let heightmap = Heightmap::decode("WORLD_SURFACE", Some(&words), convention).unwrap();
            assert_matches!(heightmap, Heightmap::Decoded(ref h) if h.len() == 256 && h.iter().all(|&v| v == -1));
        }
    }

    #[test]
    fn test_absent_is_unknown() {
        let heightmap = Heightmap::decode("OCEAN_FLOOR", None, PackingConvention::Bounded).unwrap();
        assert!(heightmap.is_unknown());
        assert_eq!(heightmap.height(3, 4), None);
    }

    #[test]
    fn test_wrong_word_count() {
        let words = vec![0i64; 36];
        assert_matches!(
            Heightmap::decode("WORLD_SURFACE", Some(&words), PackingConvention::Bounded),
            Err(QuarryError::MalformedPackedArray { expected_words: 37, actual_words: 36, .. })
        );
        let words = vec![0i64; 37];
        assert_matches!(
            Heightmap::decode("WORLD_SURFACE", Some(&words), PackingConvention::Continuous),
            Err(QuarryError::MalformedPackedArray { expected_words: 36, actual_words: 37, .. })
        );
    }

    #[test]
    fn test_column_order() {
        let stored: Vec<u64> = (0..256).map(|i| (i % 300) as u64 + 1).collect();
        for convention in [PackingConvention::Bounded, PackingConvention::Continuous] {
            let words = pack(&stored, 9, convention).unwrap();
            let heightmap = Heightmap::decode("MOTION_BLOCKING", Some(&words), convention).unwrap();
            assert_eq!(heightmap.height(0, 0), Some(0));
            assert_eq!(heightmap.height(5, 2), Some(37));
            assert_eq!(heightmap.height(15, 15), Some(255));
        }
    }
}
