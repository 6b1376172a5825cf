use quarry_common::{QuarryError, Result};

/// First DataVersion (20w17a) whose packed arrays keep every field inside one word
pub const BOUNDED_PACKING_VERSION: i32 = 2527;

/// How fixed-width fields are laid out over a sequence of 64-bit words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingConvention {
    /// Fields never straddle two words; the high `64 % width` bits of a word are padding
    Bounded,
    /// One little-endian bitstream over all words; fields may straddle two words
    Continuous,
}

impl PackingConvention {
    pub fn for_data_version(data_version: i32) -> PackingConvention {
        if data_version >= BOUNDED_PACKING_VERSION {
            PackingConvention::Bounded
        } else {
            PackingConvention::Continuous
        }
    }

    /// Number of fields carried by `word_count` words
    pub fn field_count(self, word_count: usize, width: u32) -> usize {
        match self {
            PackingConvention::Bounded => (64 / width as usize) * word_count,
            PackingConvention::Continuous => word_count * 64 / width as usize,
        }
    }
}

fn check_width(width: u32) -> Result<()> {
    if width == 0 || width > 64 {
        return Err(QuarryError::InvalidFieldWidth(width));
    }
    Ok(())
}

fn mask(width: u32) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Exact number of words needed to store `count` fields of `width` bits
pub fn words_needed(count: usize, width: u32, convention: PackingConvention) -> Result<usize> {
    check_width(width)?;
    Ok(match convention {
        PackingConvention::Bounded => {
            let per_word = 64 / width as usize;
            (count + per_word - 1) / per_word
        }
        PackingConvention::Continuous => (count * width as usize + 63) / 64,
    })
}

/// Extracts every field stored in `words`. Words are read as raw bit patterns.
pub fn unpack(words: &[i64], width: u32, convention: PackingConvention) -> Result<Vec<u64>> {
    check_width(width)?;
    let field_mask = mask(width);
    let count = convention.field_count(words.len(), width);
    let mut fields = Vec::with_capacity(count);

    match convention {
        PackingConvention::Bounded => {
            let per_word = 64 / width;
            for &word in words {
                let mut bits = word as u64;
                for _ in 0..per_word {
                    fields.push(bits & field_mask);
                    bits = bits.checked_shr(width).unwrap_or(0);
                }
            }
        }
        PackingConvention::Continuous => {
            for index in 0..count {
                let bit = index * width as usize;
                let word = bit / 64;
                let offset = (bit % 64) as u32;
                let mut value = (words[word] as u64) >> offset;
                if offset + width > 64 {
                    value |= (words[word + 1] as u64) << (64 - offset);
                }
                fields.push(value & field_mask);
            }
        }
    }

    Ok(fields)
}

/// Inverse of `unpack`. Values wider than `width` are truncated to it.
pub fn pack(values: &[u64], width: u32, convention: PackingConvention) -> Result<Vec<i64>> {
    let field_mask = mask(width);
    let mut words = vec![0u64; words_needed(values.len(), width, convention)?];

    match convention {
        PackingConvention::Bounded => {
            let per_word = (64 / width) as usize;
            for (index, &value) in values.iter().enumerate() {
                let shift = (index % per_word) as u32 * width;
                words[index / per_word] |= (value & field_mask) << shift;
            }
        }
        PackingConvention::Continuous => {
            for (index, &value) in values.iter().enumerate() {
                let value = value & field_mask;
                let bit = index * width as usize;
                let word = bit / 64;
                let offset = (bit % 64) as u32;
                words[word] |= value << offset;
                if offset + width > 64 {
                    words[word + 1] |= value >> (64 - offset);
                }
            }
        }
    }

    Ok(words.into_iter().map(|word| word as i64).collect())
}
