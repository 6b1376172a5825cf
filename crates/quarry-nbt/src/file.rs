use crate::decode::Decoder;
use crate::encode::write_named;
use crate::tag::Tag;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use quarry_common::{QuarryError, Result};
use std::io::{self, Read, Write};
use std::path::Path;

/// How a stored tag payload is compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbtCompression {
    Gzip,
    Zlib,
    None,
}

impl NbtCompression {
    /// Sniffs the compression from the leading bytes
    pub fn detect(bytes: &[u8]) -> NbtCompression {
        match bytes {
            [0x1f, 0x8b, ..] => NbtCompression::Gzip,
            [0x78, ..] => NbtCompression::Zlib,
            _ => NbtCompression::None,
        }
    }

    fn inflate(self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut inflated = Vec::new();
        let read = match self {
            NbtCompression::Gzip => GzDecoder::new(bytes).read_to_end(&mut inflated),
            NbtCompression::Zlib => ZlibDecoder::new(bytes).read_to_end(&mut inflated),
            NbtCompression::None => return Ok(bytes.to_vec()),
        };
        read.map_err(|e| QuarryError::NbtError(format!("corrupt {:?} stream: {}", self, e)))?;
        Ok(inflated)
    }
}

/// A root tag together with its (usually empty) name
#[derive(Debug, Clone, PartialEq)]
pub struct NbtFile {
    pub root: Tag,
    pub name: String,
}

impl NbtFile {
    pub fn new(name: String, root: Tag) -> Self {
        NbtFile { root, name }
    }

    /// Decodes uncompressed bytes. Anything after the root compound is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (name, root) = Decoder::new(bytes).root()?;
        Ok(NbtFile { root, name })
    }

    pub fn from_bytes(bytes: &[u8], compression: NbtCompression) -> Result<Self> {
        match compression {
            NbtCompression::None => Self::decode(bytes),
            compressed => Self::decode(&compressed.inflate(bytes)?),
        }
    }

    /// Reads a whole file, detecting gzip or zlib by magic bytes
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, NbtCompression::detect(&bytes))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_named(writer, &self.name, &self.root)
    }

    pub fn to_bytes(&self, compression: NbtCompression) -> io::Result<Vec<u8>> {
        match compression {
            NbtCompression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                self.write(&mut encoder)?;
                encoder.finish()
            }
            NbtCompression::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                self.write(&mut encoder)?;
                encoder.finish()
            }
            NbtCompression::None => {
                let mut buffer = Vec::new();
                self.write(&mut buffer)?;
                Ok(buffer)
            }
        }
    }
}
