use crate::chunk::Chunk;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use quarry_common::{QuarryError, RegionKey, Result, REGION_CHUNKS};
use quarry_nbt::{NbtCompression, NbtFile, Tag};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const SECTOR_SIZE: usize = 4096;
/// Location table plus timestamp table
const HEADER_SIZE: usize = 2 * SECTOR_SIZE;
const EXTERNAL_FLAG: u8 = 0x80;

const COMPRESSION_GZIP: u8 = 1;
const COMPRESSION_ZLIB: u8 = 2;
const COMPRESSION_NONE: u8 = 3;

fn location_index(x: usize, z: usize) -> usize {
    x + z * REGION_CHUNKS as usize
}

/// Modification time of a region file, the reference point for tile freshness
pub fn region_mtime(path: &Path) -> Result<SystemTime> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => QuarryError::MissingRegion(path.to_path_buf()),
        _ => QuarryError::IoError(e),
    })?;
    Ok(metadata.modified()?)
}

/// An Anvil region file held in memory. Chunks are decoded on demand.
#[derive(Debug)]
pub struct RegionFile {
    key: RegionKey,
    path: PathBuf,
    data: Vec<u8>,
    modified: SystemTime,
}

impl RegionFile {
    pub fn open(path: &Path, key: RegionKey) -> Result<RegionFile> {
        let modified = region_mtime(path)?;
        let data = fs::read(path)?;
        // An empty file is a region nothing was ever saved to
        if !data.is_empty() && data.len() < HEADER_SIZE {
            return Err(QuarryError::MalformedRegion(format!(
                "{}: {} bytes is shorter than the header",
                path.display(),
                data.len()
            )));
        }
        Ok(RegionFile {
            key,
            path: path.to_path_buf(),
            data,
            modified,
        })
    }

    pub fn key(&self) -> RegionKey {
        self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Sector offset and sector count of chunk (x, z), local to the region
    fn location(&self, x: usize, z: usize) -> Option<(usize, usize)> {
        if self.data.is_empty() || x >= REGION_CHUNKS as usize || z >= REGION_CHUNKS as usize {
            return None;
        }
        let entry = &self.data[location_index(x, z) * 4..][..4];
        let offset = BigEndian::read_u24(&entry[..3]) as usize;
        let count = entry[3] as usize;
        if offset == 0 && count == 0 {
            None
        } else {
            Some((offset, count))
        }
    }

    pub fn has_chunk(&self, x: usize, z: usize) -> bool {
        self.location(x, z).is_some()
    }

    /// Local coordinates of every chunk present in the region
    pub fn chunk_positions(&self) -> Vec<(usize, usize)> {
        let mut positions = Vec::new();
        for z in 0..REGION_CHUNKS as usize {
            for x in 0..REGION_CHUNKS as usize {
                if self.has_chunk(x, z) {
                    positions.push((x, z));
                }
            }
        }
        positions
    }

    /// Absolute chunk coordinates of local chunk (x, z)
    pub fn absolute_chunk(&self, x: usize, z: usize) -> (i32, i32) {
        (
            self.key.x * REGION_CHUNKS as i32 + x as i32,
            self.key.z * REGION_CHUNKS as i32 + z as i32,
        )
    }

    /// Decompressed tag tree of local chunk (x, z); `None` if the chunk was never saved
    pub fn chunk_tag(&self, x: usize, z: usize) -> Result<Option<Tag>> {
        let (offset, _) = match self.location(x, z) {
            Some(location) => location,
            None => return Ok(None),
        };

        let start = offset * SECTOR_SIZE;
        if start < HEADER_SIZE || start + 5 > self.data.len() {
            return Err(QuarryError::MalformedRegion(format!(
                "chunk ({}, {}) points at sector {} outside the file",
                x, z, offset
            )));
        }
        let length = BigEndian::read_u32(&self.data[start..start + 4]) as usize;
        let compression = self.data[start + 4];
        if length == 0 || start + 4 + length > self.data.len() {
            return Err(QuarryError::MalformedRegion(format!(
                "chunk ({}, {}) has length {} past the end of the file",
                x, z, length
            )));
        }

        let nbt = if compression & EXTERNAL_FLAG != 0 {
            let (cx, cz) = self.absolute_chunk(x, z);
            let external = self.path.with_file_name(format!("c.{}.{}.mcc", cx, cz));
            let bytes = fs::read(&external)?;
            NbtFile::from_bytes(&bytes, compression_of(compression & !EXTERNAL_FLAG)?)?
        } else {
            let payload = &self.data[start + 5..start + 4 + length];
            NbtFile::from_bytes(payload, compression_of(compression)?)?
        };
        Ok(Some(nbt.root))
    }

    pub fn chunk(&self, x: usize, z: usize) -> Result<Option<Chunk>> {
        match self.chunk_tag(x, z)? {
            Some(tag) => Ok(Some(Chunk::from_tag(&tag, self.absolute_chunk(x, z))?)),
            None => Ok(None),
        }
    }
}

fn compression_of(byte: u8) -> Result<NbtCompression> {
    match byte {
        COMPRESSION_GZIP => Ok(NbtCompression::Gzip),
        COMPRESSION_ZLIB => Ok(NbtCompression::Zlib),
        COMPRESSION_NONE => Ok(NbtCompression::None),
        other => Err(QuarryError::MalformedRegion(format!(
            "unsupported chunk compression {}",
            other
        ))),
    }
}

/// Builds region files. Used to write test worlds.
#[derive(Debug, Default)]
pub struct RegionWriter {
    chunks: Vec<(usize, usize, Vec<u8>)>,
}

impl RegionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `root` zlib-compressed at local chunk (x, z)
    pub fn insert(&mut self, x: usize, z: usize, root: &Tag) -> io::Result<&mut Self> {
        let payload = NbtFile::new(String::new(), root.clone()).to_bytes(NbtCompression::Zlib)?;
        self.chunks.retain(|(cx, cz, _)| (*cx, *cz) != (x, z));
        self.chunks.push((x, z, payload));
        Ok(self)
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut header = vec![0u8; HEADER_SIZE];
        let mut body = Vec::new();
        let mut sector = HEADER_SIZE / SECTOR_SIZE;

        for (x, z, payload) in &self.chunks {
            let mut record = Vec::with_capacity(payload.len() + 5);
            record.write_u32::<BigEndian>(payload.len() as u32 + 1)?;
            record.write_u8(COMPRESSION_ZLIB)?;
            record.write_all(payload)?;
            let sectors = (record.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
            record.resize(sectors * SECTOR_SIZE, 0);

            let entry = &mut header[location_index(*x, *z) * 4..][..4];
            BigEndian::write_u24(&mut entry[..3], sector as u32);
            entry[3] = sectors as u8;
            sector += sectors;
            body.extend(record);
        }

        header.extend(body);
        Ok(header)
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_bytes()?)
    }
}
