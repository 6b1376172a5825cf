use crate::tag::{Tag, TagKind};
use byteorder::{BigEndian, ByteOrder};
use quarry_common::{QuarryError, Result};
use std::collections::HashMap;
use std::fmt;

/// Lists and compounds nested deeper than this are rejected
pub const MAX_DEPTH: usize = 512;

/// Smallest encoded payload of one element of `kind`, used to reject
/// length prefixes that cannot fit in what is left of the input
fn min_payload(kind: TagKind) -> usize {
    match kind {
        TagKind::End => 0,
        TagKind::Byte | TagKind::Compound => 1,
        TagKind::Short | TagKind::String => 2,
        TagKind::Int | TagKind::Float => 4,
        TagKind::ByteArray | TagKind::IntArray | TagKind::LongArray => 4,
        TagKind::List => 5,
        TagKind::Long | TagKind::Double => 8,
    }
}

/// Decodes uncompressed NBT from a byte slice
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Decoder {
            bytes,
            pos: 0,
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn error(&self, msg: impl fmt::Display) -> QuarryError {
        QuarryError::NbtError(format!("{} at byte {}", msg, self.pos))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.bytes;
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| self.error(format!("unexpected end of data reading {} bytes", n)))?;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    fn kind(&mut self) -> Result<TagKind> {
        let id = self.u8()?;
        TagKind::from_id(id).ok_or_else(|| self.error(format!("invalid tag type {}", id)))
    }

    fn length(&mut self, element: usize) -> Result<usize> {
        let length = self.i32()?;
        if length < 0 {
            return Err(self.error(format!("negative length {}", length)));
        }
        let length = length as usize;
        if length.saturating_mul(element) > self.remaining() {
            return Err(self.error(format!("length {} runs past the end of the data", length)));
        }
        Ok(length)
    }

    /// Saves use modified UTF-8; anything that is not plain UTF-8 is kept lossy
    fn string(&mut self) -> Result<String> {
        let length = self.u16()? as usize;
        Ok(String::from_utf8_lossy(self.take(length)?).into_owned())
    }

    /// Reads a named tag. `End` comes back with an empty name.
    pub fn named(&mut self) -> Result<(String, Tag)> {
        let kind = self.kind()?;
        if kind == TagKind::End {
            return Ok((String::new(), Tag::End));
        }
        let name = self.string()?;
        let tag = self.payload(kind)?;
        Ok((name, tag))
    }

    /// Reads the root tag, which must be a compound
    pub fn root(&mut self) -> Result<(String, Tag)> {
        let (name, root) = self.named()?;
        if root.kind() != TagKind::Compound {
            return Err(QuarryError::NbtError(format!(
                "root tag is {}, expected Compound",
                root.kind()
            )));
        }
        Ok((name, root))
    }

    fn payload(&mut self, kind: TagKind) -> Result<Tag> {
        Ok(match kind {
            TagKind::End => Tag::End,
            TagKind::Byte => Tag::Byte(self.u8()? as i8),
            TagKind::Short => Tag::Short(self.i16()?),
            TagKind::Int => Tag::Int(self.i32()?),
            TagKind::Long => Tag::Long(self.i64()?),
            TagKind::Float => Tag::Float(BigEndian::read_f32(self.take(4)?)),
            TagKind::Double => Tag::Double(BigEndian::read_f64(self.take(8)?)),
            TagKind::ByteArray => {
                let length = self.length(1)?;
                Tag::ByteArray(self.take(length)?.iter().map(|&b| b as i8).collect())
            }
            TagKind::String => Tag::String(self.string()?),
            TagKind::List => self.nested(Decoder::list)?,
            TagKind::Compound => self.nested(Decoder::compound)?,
            TagKind::IntArray => {
                let length = self.length(4)?;
                let raw = self.take(length * 4)?;
                Tag::IntArray(raw.chunks_exact(4).map(BigEndian::read_i32).collect())
            }
            TagKind::LongArray => {
                let length = self.length(8)?;
                let raw = self.take(length * 8)?;
                Tag::LongArray(raw.chunks_exact(8).map(BigEndian::read_i64).collect())
            }
        })
    }

    fn nested(&mut self, read: fn(&mut Self) -> Result<Tag>) -> Result<Tag> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {}", MAX_DEPTH)));
        }
        self.depth += 1;
        let tag = read(self);
        self.depth -= 1;
        tag
    }

    fn list(&mut self) -> Result<Tag> {
        let kind = self.kind()?;
        let length = self.length(min_payload(kind))?;
        if kind == TagKind::End && length > 0 {
            return Err(self.error(format!("list of {} End tags", length)));
        }
        let mut items = Vec::with_capacity(length);
        for _ in 0..length {
            items.push(self.payload(kind)?);
        }
        Ok(Tag::List(items))
    }

    fn compound(&mut self) -> Result<Tag> {
        let mut entries = HashMap::new();
        loop {
            match self.named()? {
                (_, Tag::End) => break,
                (name, tag) => {
                    entries.insert(name, tag);
                }
            }
        }
        Ok(Tag::Compound(entries))
    }
}
