use crate::world::World;
use quarry_common::{Dimension, RegionKey, Result};
use quarry_logger::{log, LogSeverity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const PORTAL_BLOCK: &str = "minecraft:nether_portal";
pub const PORTALS_FILE: &str = "portals.json";

/// A chunk with at least one portal block, by region and local chunk coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortalLocation {
    pub dimension: Dimension,
    pub region_x: i32,
    pub region_z: i32,
    pub chunk_x: usize,
    pub chunk_z: usize,
}

/// Portal chunks in one region. Chunks that fail to decode are skipped.
pub fn portals_in_region(world: &World, key: RegionKey) -> Result<Vec<PortalLocation>> {
    let region = world.open_region(key)?;
    let mut found = Vec::new();
    for (x, z) in region.chunk_positions() {
        let chunk = match region.chunk(x, z) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => continue,
            Err(err) => {
                log(
                    format!("Skipping chunk ({}, {}) of {}: {}", x, z, key, err),
                    LogSeverity::Debug,
                );
                continue;
            }
        };
        if chunk.sections.iter().any(|section| section.contains_block(PORTAL_BLOCK)) {
            found.push(PortalLocation {
                dimension: key.dimension,
                region_x: key.x,
                region_z: key.z,
                chunk_x: x,
                chunk_z: z,
            });
        }
    }
    Ok(found)
}

/// Scans the overworld and the nether. `progress` receives (done, total) after each region.
pub fn find_portals(
    world: &World,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<Vec<PortalLocation>> {
    let mut keys = world.region_keys(Dimension::Overworld)?;
    keys.extend(world.region_keys(Dimension::Nether)?);

    let mut portals = Vec::new();
    for (index, key) in keys.iter().enumerate() {
        match portals_in_region(world, *key) {
            Ok(found) => portals.extend(found),
            Err(err) => log(format!("Skipping region {}: {}", key, err), LogSeverity::Warning),
        }
        progress(index + 1, keys.len());
    }
    Ok(portals)
}

pub fn write_portals(path: &Path, portals: &[PortalLocation]) -> Result<()> {
    fs::write(path, serde_json::to_string(portals)?)?;
    Ok(())
}

pub fn read_portals(path: &Path) -> Result<Vec<PortalLocation>> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionWriter;
    use quarry_nbt::Tag;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quarry-portals-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn chunk_with(block: &str) -> Tag {
        Tag::compound(vec![
            ("DataVersion", Tag::Int(3120)),
            ("Status", Tag::String("full".to_string())),
            (
                "sections",
                Tag::List(vec![Tag::compound(vec![
                    ("Y", Tag::Byte(4)),
                    (
                        "block_states",
                        Tag::compound(vec![(
                            "palette",
                            Tag::List(vec![Tag::compound(vec![(
                                "Name",
                                Tag::String(block.to_string()),
                            )])]),
                        )]),
                    ),
                ])]),
            ),
        ])
    }

    #[test]
    fn test_find_portals() {
        let folder = scratch_dir("find");
        let world = World::open(&folder).unwrap();

        let overworld = Dimension::Overworld.region_dir(&folder);
        fs::create_dir_all(&overworld).unwrap();
        let mut writer = RegionWriter::new();
        writer.insert(3, 4, &chunk_with(PORTAL_BLOCK)).unwrap();
        writer.insert(5, 5, &chunk_with("minecraft:stone")).unwrap();
        writer.write(&overworld.join("r.-1.0.mca")).unwrap();

        let nether = Dimension::Nether.region_dir(&folder);
        fs::create_dir_all(&nether).unwrap();
        fs::write(nether.join("r.0.0.mca"), vec![1u8; 10]).unwrap();

        let mut calls = Vec::new();
        let portals = find_portals(&world, &mut |done, total| calls.push((done, total))).unwrap();
        assert_eq!(
            portals,
            vec![PortalLocation {
                dimension: Dimension::Overworld,
                region_x: -1,
                region_z: 0,
                chunk_x: 3,
                chunk_z: 4,
            }]
        );
        assert_eq!(calls, vec![(1, 2), (2, 2)]);

        let path = folder.join(PORTALS_FILE);
        write_portals(&path, &portals).unwrap();
        assert_eq!(read_portals(&path).unwrap(), portals);
        fs::remove_dir_all(&folder).unwrap();
    }
}
