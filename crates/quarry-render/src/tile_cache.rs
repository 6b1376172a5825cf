use crate::image_error;
use image::{ImageFormat, RgbImage};
use quarry_common::{Dimension, QuarryError, RegionKey, Result};
use quarry_logger::{log, LogSeverity};
use quarry_world::World;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const WRITE_CHECK_FILE: &str = ".quarry-write-check";

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(RgbImage),
    /// A tile exists but is not newer than its region file
    Stale,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Absent,
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Writes a PNG next to `path` and renames it into place
pub fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    let staging = staging_name(path);
    image
        .save_with_format(&staging, ImageFormat::Png)
        .map_err(image_error)?;
    fs::rename(&staging, path)?;
    Ok(())
}

/// Temp file beside `path` owned by process `pid`
pub fn part_path(path: &Path, pid: u32) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".part-{}", pid));
    path.with_file_name(name)
}

fn staging_name(path: &Path) -> PathBuf {
    part_path(path, std::process::id())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Rendered region tiles of one world, validated against region file mtimes.
///
/// There is no locking between writers. Callers de-duplicate keys before rendering;
/// two writers racing on one key leave whichever tile was renamed last.
#[derive(Debug, Clone)]
pub struct TileCache {
    world: World,
    data_dir: PathBuf,
}

impl TileCache {
    /// Opens the cache, creating `data_dir` and checking it can be written
    pub fn create(world: World, data_dir: &Path) -> Result<TileCache> {
        let unwritable = |e: io::Error| QuarryError::CacheDirUnwritable(data_dir.to_path_buf(), e);
        fs::create_dir_all(data_dir).map_err(unwritable)?;
        let check = data_dir.join(WRITE_CHECK_FILE);
        fs::write(&check, b"").map_err(unwritable)?;
        fs::remove_file(&check).map_err(unwritable)?;

        Ok(TileCache {
            world,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn tile_path(&self, key: RegionKey) -> PathBuf {
        self.data_dir.join(key.tile_file_name())
    }

    /// Where the full-dimension composite is exported
    pub fn composite_path(&self, dimension: Dimension) -> PathBuf {
        self.data_dir.join(format!("_{}.png", dimension))
    }

    /// Where a worker writes the tile for `key` before it is committed
    pub fn staging_path(&self, key: RegionKey) -> PathBuf {
        staging_name(&self.tile_path(key))
    }

    pub fn freshness(&self, key: RegionKey) -> Freshness {
        let tile = match modified(&self.tile_path(key)) {
            Some(tile) => tile,
            None => return Freshness::Absent,
        };
        match modified(&self.world.region_path(key)) {
            Some(region) if tile > region => Freshness::Fresh,
            _ => Freshness::Stale,
        }
    }

    /// The tile exists and is strictly newer than its region file
    pub fn is_fresh(&self, key: RegionKey) -> bool {
        self.freshness(key) == Freshness::Fresh
    }

    pub fn get(&self, key: RegionKey) -> Result<CacheLookup> {
        match self.freshness(key) {
            Freshness::Absent => Ok(CacheLookup::Absent),
            Freshness::Stale => Ok(CacheLookup::Stale),
            Freshness::Fresh => match image::open(self.tile_path(key)) {
                Ok(tile) => Ok(CacheLookup::Hit(tile.to_rgb8())),
                Err(err) => {
                    // Unreadable tiles are rendered again
                    log(
                        format!("Cached tile for {} is unreadable: {}", key, err),
                        LogSeverity::Warning,
                    );
                    Ok(CacheLookup::Stale)
                }
            },
        }
    }

    /// Reads a cached tile regardless of freshness
    pub fn load(&self, key: RegionKey) -> Result<Option<RgbImage>> {
        let path = self.tile_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let tile = image::open(&path).map_err(image_error)?;
        Ok(Some(tile.to_rgb8()))
    }

    pub fn put(&self, key: RegionKey, tile: &RgbImage) -> Result<()> {
        save_png(tile, &self.tile_path(key))
    }

    /// Moves a worker-written tile into place
    pub fn commit_staged(&self, key: RegionKey, staged: &Path) -> Result<()> {
        if !staged.is_file() {
            return Err(QuarryError::WorkerError(format!(
                "no tile was written to {} for {}",
                staged.display(),
                key
            )));
        }
        fs::rename(staged, self.tile_path(key))?;
        Ok(())
    }

    /// Removes the staging file of `key` together with any temp file a worker left
    /// beside it. The committed tile is not touched.
    pub fn discard_staged(&self, key: RegionKey) -> Result<()> {
        let staging = self.staging_path(key);
        remove_if_present(&staging)?;
        let prefix = match staging.file_name() {
            Some(name) => format!("{}.part-", name.to_string_lossy()),
            None => return Ok(()),
        };
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                remove_if_present(&entry.path())?;
            }
        }
        Ok(())
    }

    /// Keys of every cached tile of a dimension, fresh or not
    pub fn tiles(&self, dimension: Dimension) -> Result<Vec<RegionKey>> {
        let mut keys: Vec<RegionKey> = fs::read_dir(&self.data_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| RegionKey::from_tile_file_name(&entry.file_name().to_string_lossy()))
            .filter(|key| key.dimension == dimension)
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::Rgb;
    use std::fs::File;
    use std::time::Duration;

    struct Fixture {
        root: PathBuf,
        cache: TileCache,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn fixture(name: &str) -> Fixture {
        let root = std::env::temp_dir().join(format!("quarry-cache-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let world_dir = root.join("world");
        fs::create_dir_all(world_dir.join("region")).unwrap();
        let world = World::open(&world_dir).unwrap();
        let cache = TileCache::create(world, &root.join("data")).unwrap();
        Fixture { root, cache }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
    }

    fn write_region(fixture: &Fixture, key: RegionKey, age: Duration) {
        let path = fixture.cache.world().region_path(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"").unwrap();
        set_mtime(&path, SystemTime::now() - age);
    }

    #[test]
    fn test_put_then_hit() {
        let fixture = fixture("hit");
        let key = RegionKey::new(Dimension::Overworld, 0, 0);
        write_region(&fixture, key, Duration::from_secs(3600));
        assert_matches!(fixture.cache.get(key).unwrap(), CacheLookup::Absent);

        let tile = RgbImage::from_pixel(512, 512, Rgb([1, 2, 3]));
        fixture.cache.put(key, &tile).unwrap();
        assert!(fixture.cache.is_fresh(key));
        assert_matches!(fixture.cache.get(key).unwrap(), CacheLookup::Hit(ref hit) if *hit == tile);
    }

    #[test]
    fn test_region_newer_than_tile_is_stale() {
        let fixture = fixture("stale");
        let key = RegionKey::new(Dimension::Overworld, 1, -2);
        write_region(&fixture, key, Duration::from_secs(60));
        let tile = RgbImage::new(512, 512);
        fixture.cache.put(key, &tile).unwrap();
        set_mtime(&fixture.cache.tile_path(key), SystemTime::now() - Duration::from_secs(3600));

        assert_eq!(fixture.cache.freshness(key), Freshness::Stale);
        assert_matches!(fixture.cache.get(key).unwrap(), CacheLookup::Stale);
    }

    #[test]
    fn test_discard_staged_leaves_no_temp_files() {
        let fixture = fixture("discard");
        let key = RegionKey::new(Dimension::Overworld, 0, 0);
        let other = RegionKey::new(Dimension::Overworld, 1, 0);
        fixture.cache.put(key, &RgbImage::new(512, 512)).unwrap();
        let staging = fixture.cache.staging_path(key);
        fs::write(&staging, b"partial").unwrap();
        fs::write(part_path(&staging, 4242), b"partial").unwrap();
        fs::write(fixture.cache.staging_path(other), b"partial").unwrap();

        fixture.cache.discard_staged(key).unwrap();
        fixture.cache.discard_staged(key).unwrap();

        let names: Vec<String> = fs::read_dir(fixture.cache.data_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".part-"))
            .collect();
        assert_eq!(names, vec![format!("overworld.1.0.png.part-{}", std::process::id())]);
        assert!(fixture.cache.tile_path(key).is_file());
    }

    #[test]
    fn test_equal_mtime_is_stale() {
        let fixture = fixture("equal");
        let key = RegionKey::new(Dimension::Overworld, 0, 0);
        let stamp = SystemTime::now() - Duration::from_secs(100);
        write_region(&fixture, key, Duration::from_secs(0));
        fixture.cache.put(key, &RgbImage::new(512, 512)).unwrap();
        set_mtime(&fixture.cache.world().region_path(key), stamp);
        set_mtime(&fixture.cache.tile_path(key), stamp);
        assert!(!fixture.cache.is_fresh(key));
    }

    #[test]
    fn test_commit_staged_and_listing() {
        let fixture = fixture("commit");
        let key = RegionKey::new(Dimension::Nether, -1, 3);
        write_region(&fixture, key, Duration::from_secs(3600));

        let staged = fixture.cache.staging_path(key);
        assert_matches!(
            fixture.cache.commit_staged(key, &staged),
            Err(QuarryError::WorkerError(_))
        );
        RgbImage::new(512, 512).save_with_format(&staged, ImageFormat::Png).unwrap();
        fixture.cache.commit_staged(key, &staged).unwrap();
        assert!(!staged.exists());
        assert!(fixture.cache.is_fresh(key));

        fs::write(fixture.cache.data_dir().join("_nether.png"), b"").unwrap();
        fs::write(fixture.cache.data_dir().join("portals.json"), b"[]").unwrap();
        assert_eq!(fixture.cache.tiles(Dimension::Nether).unwrap(), vec![key]);
        assert!(fixture.cache.tiles(Dimension::End).unwrap().is_empty());
    }

    #[test]
    fn test_unwritable_data_dir() {
        let fixture = fixture("unwritable");
        // A regular file where the directory should be
        let blocker = fixture.root.join("blocker");
        fs::write(&blocker, b"").unwrap();
        assert_matches!(
            TileCache::create(fixture.cache.world().clone(), &blocker.join("data")),
            Err(QuarryError::CacheDirUnwritable(..))
        );
    }
}
