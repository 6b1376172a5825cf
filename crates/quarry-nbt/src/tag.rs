use quarry_common::{QuarryError, Result};
use std::collections::HashMap;
use std::fmt;

/// Type id of a tag as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagKind {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

const KINDS: [TagKind; 13] = [
    TagKind::End,
    TagKind::Byte,
    TagKind::Short,
    TagKind::Int,
    TagKind::Long,
    TagKind::Float,
    TagKind::Double,
    TagKind::ByteArray,
    TagKind::String,
    TagKind::List,
    TagKind::Compound,
    TagKind::IntArray,
    TagKind::LongArray,
];

impl TagKind {
    pub fn from_id(id: u8) -> Option<TagKind> {
        KINDS.get(id as usize).copied()
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            TagKind::End => "End",
            TagKind::Byte => "Byte",
            TagKind::Short => "Short",
            TagKind::Int => "Int",
            TagKind::Long => "Long",
            TagKind::Float => "Float",
            TagKind::Double => "Double",
            TagKind::ByteArray => "ByteArray",
            TagKind::String => "String",
            TagKind::List => "List",
            TagKind::Compound => "Compound",
            TagKind::IntArray => "IntArray",
            TagKind::LongArray => "LongArray",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<Tag>),
    Compound(HashMap<String, Tag>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

/// Fills in the key of a mismatch raised by one of the `as_*` accessors.
fn at_key(err: QuarryError, key: &str) -> QuarryError {
    match err {
        QuarryError::TypeMismatch {
            expected, found, ..
        } => QuarryError::TypeMismatch {
            key: key.to_owned(),
            expected,
            found,
        },
        other => other,
    }
}

impl Tag {
    pub fn kind(&self) -> TagKind {
        match self {
            Tag::End => TagKind::End,
            Tag::Byte(_) => TagKind::Byte,
            Tag::Short(_) => TagKind::Short,
            Tag::Int(_) => TagKind::Int,
            Tag::Long(_) => TagKind::Long,
            Tag::Float(_) => TagKind::Float,
            Tag::Double(_) => TagKind::Double,
            Tag::ByteArray(_) => TagKind::ByteArray,
            Tag::String(_) => TagKind::String,
            Tag::List(_) => TagKind::List,
            Tag::Compound(_) => TagKind::Compound,
            Tag::IntArray(_) => TagKind::IntArray,
            Tag::LongArray(_) => TagKind::LongArray,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Builds a compound from `(name, tag)` pairs
    pub fn compound<K: Into<String>>(entries: Vec<(K, Tag)>) -> Tag {
        Tag::Compound(
            entries
                .into_iter()
                .map(|(name, tag)| (name.into(), tag))
                .collect(),
        )
    }

    fn mismatch(&self, expected: &'static str) -> QuarryError {
        QuarryError::TypeMismatch {
            key: String::new(),
            expected,
            found: self.type_name(),
        }
    }

    /// Looks up a child of a compound. Fails with `MissingTag` if absent.
    pub fn get(&self, key: &str) -> Result<&Tag> {
        self.get_opt(key)?
            .ok_or_else(|| QuarryError::MissingTag(key.to_owned()))
    }

    /// Like `get`, but an absent key is `Ok(None)`
    pub fn get_opt(&self, key: &str) -> Result<Option<&Tag>> {
        Ok(self.as_compound().map_err(|e| at_key(e, key))?.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self, Tag::Compound(map) if map.contains_key(key))
    }

    pub fn as_compound(&self) -> Result<&HashMap<String, Tag>> {
        match self {
            Tag::Compound(map) => Ok(map),
            other => Err(other.mismatch("Compound")),
        }
    }

    pub fn as_list(&self) -> Result<&[Tag]> {
        match self {
            Tag::List(list) => Ok(list),
            other => Err(other.mismatch("List")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Tag::String(s) => Ok(s),
            other => Err(other.mismatch("String")),
        }
    }

    pub fn as_i8(&self) -> Result<i8> {
        match self {
            Tag::Byte(n) => Ok(*n),
            other => Err(other.mismatch("Byte")),
        }
    }

    pub fn as_i16(&self) -> Result<i16> {
        match self {
            Tag::Short(n) => Ok(*n),
            other => Err(other.mismatch("Short")),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Tag::Int(n) => Ok(*n),
            other => Err(other.mismatch("Int")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Tag::Long(n) => Ok(*n),
            other => Err(other.mismatch("Long")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Tag::Double(n) => Ok(*n),
            other => Err(other.mismatch("Double")),
        }
    }

    pub fn as_long_array(&self) -> Result<&[i64]> {
        match self {
            Tag::LongArray(longs) => Ok(longs),
            other => Err(other.mismatch("LongArray")),
        }
    }

    pub fn as_byte_array(&self) -> Result<&[i8]> {
        match self {
            Tag::ByteArray(bytes) => Ok(bytes),
            other => Err(other.mismatch("ByteArray")),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<&[Tag]> {
        self.get(key)?.as_list().map_err(|e| at_key(e, key))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get(key)?.as_str().map_err(|e| at_key(e, key))
    }

    pub fn get_i8(&self, key: &str) -> Result<i8> {
        self.get(key)?.as_i8().map_err(|e| at_key(e, key))
    }

    pub fn get_i32(&self, key: &str) -> Result<i32> {
        self.get(key)?.as_i32().map_err(|e| at_key(e, key))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.get(key)?.as_i64().map_err(|e| at_key(e, key))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.get(key)?.as_f64().map_err(|e| at_key(e, key))
    }

    pub fn get_long_array(&self, key: &str) -> Result<&[i64]> {
        self.get(key)?.as_long_array().map_err(|e| at_key(e, key))
    }

    pub fn get_byte_array(&self, key: &str) -> Result<&[i8]> {
        self.get(key)?.as_byte_array().map_err(|e| at_key(e, key))
    }
}
