use crate::progress::{Progress, SharedProgress};
use crate::runner::JobRunner;
use crate::scheduler::{BatchReport, RenderScheduler, RenderSettings, TileSink};
use image::RgbImage;
use quarry_common::{Dimension, QuarryError, RegionKey, Result};
use quarry_logger::{log, LogSeverity};
use quarry_render::{visible_regions, TileCache, Viewport};
use quarry_world::LevelInfo;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Sprite {
    Pending,
    /// A background decode holding this ticket is in flight
    Decoding(u64),
    Ready(Arc<RgbImage>),
    /// Skipped until the tile is written again
    Unreadable,
}

/// Tiles of one dimension known to be in the cache. Sprites are decoded off the
/// draw path the first time they are asked for and dropped again when their tile
/// is re-rendered.
#[derive(Debug, Clone)]
pub struct TileIndex {
    dimension: Dimension,
    sprites: HashMap<RegionKey, Sprite>,
    next_ticket: u64,
}

impl TileIndex {
    pub fn empty(dimension: Dimension) -> Self {
        Self {
            dimension,
            sprites: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Every cached tile of `dimension`, none of them decoded yet
    pub fn load(cache: &TileCache, dimension: Dimension) -> Result<Self> {
        let mut index = Self::empty(dimension);
        for key in cache.tiles(dimension)? {
            index.sprites.insert(key, Sprite::Pending);
        }
        Ok(index)
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn contains(&self, key: RegionKey) -> bool {
        self.sprites.contains_key(&key)
    }

    pub fn is_decoded(&self, key: RegionKey) -> bool {
        matches!(self.sprites.get(&key), Some(Sprite::Ready(_)))
    }

    /// Marks a tile as (re)written; its sprite is decoded again on next use
    pub fn invalidate(&mut self, key: RegionKey) {
        if key.dimension == self.dimension {
            self.sprites.insert(key, Sprite::Pending);
        }
    }

    /// Splits `keys` into decoded sprites and tickets for the sprites that still
    /// need a decode. Keys not in the index are dropped.
    fn claim(&mut self, keys: Vec<RegionKey>) -> (Vec<(RegionKey, Arc<RgbImage>)>, Vec<(RegionKey, u64)>) {
        let mut ready = Vec::new();
        let mut claimed = Vec::new();
        for key in keys {
            match self.sprites.get_mut(&key) {
                Some(Sprite::Ready(sprite)) => ready.push((key, sprite.clone())),
                Some(state @ Sprite::Pending) => {
                    let ticket = self.next_ticket;
                    self.next_ticket += 1;
                    *state = Sprite::Decoding(ticket);
                    claimed.push((key, ticket));
                }
                _ => {}
            }
        }
        (ready, claimed)
    }

    /// Stores the outcome of the decode holding `ticket`. Ignored when the tile was
    /// invalidated or claimed again since.
    fn finish(&mut self, key: RegionKey, ticket: u64, decoded: Result<Option<RgbImage>>) {
        match self.sprites.get(&key) {
            Some(Sprite::Decoding(current)) if *current == ticket => {}
            _ => return,
        }
        match decoded {
            Ok(Some(tile)) => {
                self.sprites.insert(key, Sprite::Ready(Arc::new(tile)));
            }
            Ok(None) => {
                self.sprites.remove(&key);
            }
            Err(err) => {
                log(format!("Cannot load tile {}: {}", key, err), LogSeverity::Warning);
                self.sprites.insert(key, Sprite::Unreadable);
            }
        }
    }
}

fn read(index: &RwLock<TileIndex>) -> RwLockReadGuard<'_, TileIndex> {
    match index.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write(index: &RwLock<TileIndex>) -> RwLockWriteGuard<'_, TileIndex> {
    match index.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct IndexSink(Arc<RwLock<TileIndex>>);

impl TileSink for IndexSink {
    fn tile_committed(&self, key: RegionKey) {
        write(&self.0).invalidate(key);
    }
}

/// Viewport of the given pixel size centred on the first player, or on spawn
pub fn initial_viewport(info: &LevelInfo, width: f64, height: f64, scale: f64) -> (Dimension, Viewport) {
    let (dimension, x, z) = info.initial_target();
    (dimension, Viewport::centred_on(x, z, width, height, scale))
}

/// What a viewer holds on to: one coordinating render task at a time, the tile index it
/// draws from, and the cancellation token that ends both.
pub struct Session {
    scheduler: Arc<RenderScheduler>,
    index: Arc<RwLock<TileIndex>>,
    progress: SharedProgress,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<BatchReport>>>,
}

impl Session {
    pub fn new(
        cache: Arc<TileCache>,
        runner: Arc<dyn JobRunner>,
        settings: RenderSettings,
        dimension: Dimension,
    ) -> Result<Session> {
        let index = Arc::new(RwLock::new(TileIndex::load(&cache, dimension)?));
        let progress = SharedProgress::new();
        let cancel = CancellationToken::new();
        let scheduler = RenderScheduler::new(cache, runner, settings)
            .with_progress(Arc::new(progress.clone()))
            .with_sink(Arc::new(IndexSink(index.clone())))
            .with_cancel_token(cancel.clone());

        Ok(Session {
            scheduler: Arc::new(scheduler),
            index,
            progress,
            cancel,
            task: None,
        })
    }

    pub fn dimension(&self) -> Dimension {
        read(&self.index).dimension()
    }

    /// Token that stops this session's rendering; cancelling it is what `shutdown` starts with
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress.snapshot()
    }

    pub fn is_rendering(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Starts rendering the stale regions of the current dimension unless a batch is
    /// already running. Returns whether a batch was started.
    pub fn refresh(&mut self) -> bool {
        if self.is_rendering() || self.cancel.is_cancelled() {
            return false;
        }
        let scheduler = self.scheduler.clone();
        let dimension = self.dimension();
        self.progress.clear();
        self.task = Some(tokio::spawn(async move {
            scheduler.render_dimension(dimension, false).await
        }));
        true
    }

    /// Waits for the running batch, if any, and returns its report
    pub async fn wait(&mut self) -> Result<Option<BatchReport>> {
        let task = match self.task.take() {
            Some(task) => task,
            None => return Ok(None),
        };
        match task.await {
            Ok(report) => report.map(Some),
            Err(err) => Err(QuarryError::WorkerError(format!(
                "render coordinator stopped: {}",
                err
            ))),
        }
    }

    /// Decoded tiles inside the viewport. Never waits on rendering or decoding: tiles
    /// that are not cached are skipped, and tiles seen for the first time are decoded
    /// on the blocking pool and show up in a later frame.
    pub fn visible_tiles(&self, viewport: &Viewport) -> Vec<(RegionKey, Arc<RgbImage>)> {
        let bounds = visible_regions(viewport);
        let (ready, claimed) = {
            let mut index = write(&self.index);
            let keys = bounds.keys(index.dimension());
            index.claim(keys)
        };
        if claimed.is_empty() {
            return ready;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                log(format!("Cannot decode tiles: {}", err), LogSeverity::Warning);
                let mut index = write(&self.index);
                for (key, _) in claimed {
                    index.invalidate(key);
                }
                return ready;
            }
        };
        for (key, ticket) in claimed {
            let cache = self.scheduler.cache().clone();
            let index = self.index.clone();
            runtime.spawn_blocking(move || {
                let decoded = cache.load(key);
                write(&index).finish(key, ticket, decoded);
            });
        }
        ready
    }

    /// Swaps the tile index to another dimension. A batch already running finishes
    /// for the dimension it started with.
    pub fn set_dimension(&mut self, dimension: Dimension) -> Result<()> {
        let mut index = TileIndex::load(self.scheduler.cache(), dimension)?;
        let mut current = write(&self.index);
        // Decodes still in flight must not match a ticket of the new index
        index.next_ticket = current.next_ticket;
        *current = index;
        drop(current);
        log(format!("Showing {}", dimension), LogSeverity::Info);
        Ok(())
    }

    /// Cancels rendering, kills running workers and waits for the coordinator. No tile
    /// is written to the cache after this returns.
    pub async fn shutdown(&mut self) -> Result<Option<BatchReport>> {
        self.cancel.cancel();
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobState, RenderJob};
    use futures::future::BoxFuture;
    use quarry_common::RenderReport;
    use quarry_render::save_png;
    use quarry_world::World;
    use std::fs::{self, File};
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    /// Renders a flat colour per region after `delay`, honouring cancellation
    struct SlowRunner {
        delay: Duration,
    }

    impl JobRunner for SlowRunner {
        fn run(&self, job: RenderJob, cancel: CancellationToken) -> BoxFuture<'static, Result<RenderReport>> {
            let delay = self.delay;
            Box::pin(async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err(QuarryError::WorkerError("killed".to_owned())),
                    _ = tokio::time::sleep(delay) => {
                        let shade = (job.key.x * 10) as u8;
                        save_png(&RgbImage::from_pixel(512, 512, image::Rgb([shade, 0, 0])), &job.output)?;
                        Ok(RenderReport::new())
                    }
                }
            })
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    struct Fixture {
        root: PathBuf,
        cache: Arc<TileCache>,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn fixture(name: &str) -> Fixture {
        let root = std::env::temp_dir().join(format!("quarry-session-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        for dir in [root.join("world").join("region"), root.join("world").join("DIM1").join("region")] {
            fs::create_dir_all(&dir).unwrap();
            for x in 0..3 {
                let path = dir.join(format!("r.{}.0.mca", x));
                fs::write(&path, b"").unwrap();
                File::options()
                    .write(true)
                    .open(&path)
                    .unwrap()
                    .set_modified(SystemTime::now() - Duration::from_secs(3600))
                    .unwrap();
            }
        }
        let world = World::open(&root.join("world")).unwrap();
        let cache = Arc::new(TileCache::create(world, &root.join("data")).unwrap());
        Fixture { root, cache }
    }

    fn settings() -> RenderSettings {
        RenderSettings {
            workers: 2,
            ..RenderSettings::default()
        }
    }

    fn viewport() -> Viewport {
        Viewport {
            x: 0.0,
            z: 0.0,
            width: 1024.0,
            height: 512.0,
            scale: 1.0,
        }
    }

    /// Polls until `expected` sprites are decoded
    async fn decoded_tiles(session: &Session, expected: usize) -> Vec<(RegionKey, Arc<RgbImage>)> {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let tiles = session.visible_tiles(&viewport());
                if tiles.len() >= expected {
                    return tiles;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sprites should decode in the background")
    }

    #[test]
    fn test_superseded_decode_is_dropped() {
        let key = RegionKey::new(Dimension::Overworld, 0, 0);
        let mut index = TileIndex::empty(Dimension::Overworld);
        index.invalidate(key);

        let (ready, claimed) = index.claim(vec![key, RegionKey::new(Dimension::Overworld, 5, 5)]);
        assert!(ready.is_empty());
        assert_eq!(claimed.len(), 1);
        let first = claimed[0].1;
        // Already in flight
        assert!(index.claim(vec![key]).1.is_empty());

        // Re-rendered while the first decode runs
        index.invalidate(key);
        let second = index.claim(vec![key]).1[0].1;
        index.finish(key, first, Ok(Some(RgbImage::new(1, 1))));
        assert!(!index.is_decoded(key));
        index.finish(key, second, Ok(Some(RgbImage::new(2, 2))));
        assert!(index.is_decoded(key));
        let (ready, _) = index.claim(vec![key]);
        assert_eq!(ready[0].1.width(), 2);

        index.invalidate(key);
        let third = index.claim(vec![key]).1[0].1;
        index.finish(key, third, Ok(None));
        assert!(!index.contains(key));
    }

    #[tokio::test]
    async fn test_visible_tiles_never_decode_inline() {
        let fixture = fixture("decode");
        let tile = RgbImage::from_pixel(512, 512, image::Rgb([9, 9, 9]));
        fixture.cache.put(RegionKey::new(Dimension::Overworld, 1, 0), &tile).unwrap();
        let runner = Arc::new(SlowRunner {
            delay: Duration::from_millis(10),
        });
        let session = Session::new(fixture.cache.clone(), runner, settings(), Dimension::Overworld).unwrap();

        // The first frame only schedules the decode
        assert!(session.visible_tiles(&viewport()).is_empty());
        let tiles = decoded_tiles(&session, 1).await;
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].1.get_pixel(0, 0).0, [9, 9, 9]);
    }

    #[tokio::test]
    async fn test_refresh_renders_and_fills_index() {
        let fixture = fixture("refresh");
        let runner = Arc::new(SlowRunner {
            delay: Duration::from_millis(10),
        });
        let mut session =
            Session::new(fixture.cache.clone(), runner, settings(), Dimension::Overworld).unwrap();
        assert!(session.visible_tiles(&viewport()).is_empty());

        assert!(session.refresh());
        assert!(!session.refresh());
        let batch = session.wait().await.unwrap().unwrap();
        assert_eq!(batch.done(), 3);

        let tiles = decoded_tiles(&session, 3).await;
        assert_eq!(tiles.len(), 3);
        let (key, sprite) = tiles.iter().find(|(key, _)| key.x == 2).unwrap();
        assert_eq!(key.dimension, Dimension::Overworld);
        assert_eq!(sprite.get_pixel(0, 0).0, [20, 0, 0]);
        assert_eq!(session.progress().unwrap().completed, 3);

        // Nothing is stale any more
        assert!(session.refresh());
        assert_eq!(session.wait().await.unwrap().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_set_dimension_swaps_index() {
        let fixture = fixture("dimension");
        fixture
            .cache
            .put(RegionKey::new(Dimension::End, 1, 0), &RgbImage::new(512, 512))
            .unwrap();
        let runner = Arc::new(SlowRunner {
            delay: Duration::from_millis(10),
        });
        let mut session =
            Session::new(fixture.cache.clone(), runner, settings(), Dimension::Overworld).unwrap();
        assert!(session.visible_tiles(&viewport()).is_empty());

        tokio_test::assert_ok!(session.set_dimension(Dimension::End));
        assert_eq!(session.dimension(), Dimension::End);
        let tiles = decoded_tiles(&session, 1).await;
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].0, RegionKey::new(Dimension::End, 1, 0));
    }

    #[tokio::test]
    async fn test_shutdown_stops_cache_writes() {
        let fixture = fixture("shutdown");
        let runner = Arc::new(SlowRunner {
            delay: Duration::from_secs(30),
        });
        let mut session =
            Session::new(fixture.cache.clone(), runner, settings(), Dimension::Overworld).unwrap();
        assert!(session.refresh());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let batch = tokio::time::timeout(Duration::from_secs(10), session.shutdown())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(batch.cancelled(), 3);
        assert!(batch.jobs.iter().all(|(_, state)| state == JobState::Cancelled));
        assert!(fixture.cache.tiles(Dimension::Overworld).unwrap().is_empty());
        assert!(!session.refresh());
    }
}
