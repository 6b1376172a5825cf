#![allow(dead_code)]

use quarry_common::{Dimension, QuarryConfig, RegionKey};
use quarry_nbt::{NbtCompression, NbtFile, Tag};
use quarry_render::TileCache;
use quarry_world::{RegionWriter, World};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// A save folder and a tile data root under the temp directory, removed on drop
pub struct TestWorld {
    pub root: PathBuf,
    pub folder: PathBuf,
    pub data_root: PathBuf,
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

impl TestWorld {
    pub fn new(name: &str) -> TestWorld {
        let root = std::env::temp_dir().join(format!("quarry-it-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let folder = root.join("saves").join(name);
        fs::create_dir_all(folder.join("region")).unwrap();
        write_level(&folder, name);
        TestWorld {
            data_root: root.join("data"),
            root,
            folder,
        }
    }

    pub fn world(&self) -> World {
        World::open(&self.folder).unwrap()
    }

    pub fn config(&self) -> QuarryConfig {
        QuarryConfig {
            saves_dir: self.root.join("saves"),
            data_root: self.data_root.clone(),
            ..QuarryConfig::default()
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config().data_dir_for(&self.folder)
    }

    pub fn cache(&self) -> TileCache {
        TileCache::create(self.world(), &self.data_dir()).unwrap()
    }

    /// Writes a region file with the given chunks and backdates it an hour
    pub fn write_region(&self, key: RegionKey, chunks: &[(usize, usize, Tag)]) -> PathBuf {
        let path = self.world().region_path(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = RegionWriter::new();
        for (x, z, chunk) in chunks {
            writer.insert(*x, *z, chunk).unwrap();
        }
        writer.write(&path).unwrap();
        set_mtime(&path, SystemTime::now() - Duration::from_secs(3600));
        path
    }
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

pub fn overworld(x: i32, z: i32) -> RegionKey {
    RegionKey::new(Dimension::Overworld, x, z)
}

fn write_level(folder: &Path, name: &str) {
    let player = Tag::compound(vec![
        (
            "Pos",
            Tag::List(vec![Tag::Double(8.5), Tag::Double(70.0), Tag::Double(-3.5)]),
        ),
        ("Dimension", Tag::String("minecraft:overworld".to_owned())),
        ("playerGameType", Tag::Int(1)),
    ]);
    let data = Tag::compound(vec![
        ("LevelName", Tag::String(name.to_owned())),
        ("SpawnX", Tag::Int(0)),
        ("SpawnZ", Tag::Int(0)),
        ("LastPlayed", Tag::Long(1_700_000_000_000)),
        ("DataVersion", Tag::Int(3120)),
        ("Player", player),
    ]);
    let level = NbtFile::new(String::new(), Tag::compound(vec![("Data", data)]));
    fs::write(
        folder.join("level.dat"),
        level.to_bytes(NbtCompression::Gzip).unwrap(),
    )
    .unwrap();
}

/// A fully generated chunk whose only section holds `block` everywhere and whose
/// heightmap is all zeroes
pub fn uniform_chunk(block: &str) -> Tag {
    Tag::compound(vec![
        ("DataVersion", Tag::Int(3120)),
        ("Status", Tag::String("minecraft:full".to_owned())),
        ("yPos", Tag::Int(0)),
        (
            "sections",
            Tag::List(vec![Tag::compound(vec![
                ("Y", Tag::Byte(0)),
                (
                    "block_states",
                    Tag::compound(vec![(
                        "palette",
                        Tag::List(vec![Tag::compound(vec![(
                            "Name",
                            Tag::String(block.to_owned()),
                        )])]),
                    )]),
                ),
            ])]),
        ),
        (
            "Heightmaps",
            Tag::compound(vec![("WORLD_SURFACE", Tag::LongArray(vec![0; 37]))]),
        ),
    ])
}
