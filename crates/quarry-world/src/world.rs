use crate::level::{LevelInfo, LEVEL_FILE};
use crate::region::RegionFile;
use quarry_common::{Dimension, QuarryError, RegionKey, Result};
use quarry_logger::{log, LogSeverity};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A save folder on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    folder: PathBuf,
}

impl World {
    pub fn open(folder: &Path) -> Result<World> {
        if !folder.is_dir() {
            return Err(QuarryError::WorldNotFound(folder.to_path_buf()));
        }
        Ok(World {
            folder: folder.to_path_buf(),
        })
    }

    /// Resolves a path, or a save name under `saves_dir`. `None` picks the most
    /// recently played save.
    pub fn resolve(saves_dir: &Path, world: Option<&str>) -> Result<World> {
        let world = match world {
            Some(world) => world,
            None => return latest_save(saves_dir),
        };
        let as_path = Path::new(world);
        if as_path.is_dir() {
            return World::open(as_path);
        }
        let named = saves_dir.join(world);
        if !named.join(LEVEL_FILE).is_file() {
            return Err(QuarryError::WorldNotFound(named));
        }
        World::open(&named)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Folder name, which also names the world's data directory
    pub fn name(&self) -> String {
        self.folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn level_info(&self) -> Result<LevelInfo> {
        LevelInfo::load(&self.folder)
    }

    pub fn region_path(&self, key: RegionKey) -> PathBuf {
        key.dimension
            .region_dir(&self.folder)
            .join(key.region_file_name())
    }

    /// Every region file of a dimension, sorted. A dimension that was never
    /// visited has no region folder and yields nothing.
    pub fn region_keys(&self, dimension: Dimension) -> Result<Vec<RegionKey>> {
        let dir = dimension.region_dir(&self.folder);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            match RegionKey::from_region_file_name(dimension, &file_name.to_string_lossy()) {
                Some(key) => keys.push(key),
                None => log(
                    format!("Ignoring {} in {}", file_name.to_string_lossy(), dir.display()),
                    LogSeverity::Debug,
                ),
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn open_region(&self, key: RegionKey) -> Result<RegionFile> {
        RegionFile::open(&self.region_path(key), key)
    }
}

/// Folders under `saves_dir` that contain a level.dat
pub fn list_saves(saves_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(saves_dir)
        .map_err(|_| QuarryError::WorldNotFound(saves_dir.to_path_buf()))?;
    let mut saves: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.join(LEVEL_FILE).is_file())
        .collect();
    saves.sort();
    Ok(saves)
}

/// The save with the newest `LastPlayed`. Saves whose level.dat cannot be read are skipped.
pub fn latest_save(saves_dir: &Path) -> Result<World> {
    let mut latest: Option<(i64, PathBuf)> = None;
    for folder in list_saves(saves_dir)? {
        match LevelInfo::load(&folder) {
            Ok(info) => {
                if latest.as_ref().map_or(true, |(played, _)| info.last_played > *played) {
                    latest = Some((info.last_played, folder));
                }
            }
            Err(err) => log(
                format!("Skipping save {}: {}", folder.display(), err),
                LogSeverity::Warning,
            ),
        }
    }
    match latest {
        Some((_, folder)) => World::open(&folder),
        None => Err(QuarryError::WorldNotFound(saves_dir.to_path_buf())),
    }
}
