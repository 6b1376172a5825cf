use crate::job::{JobState, JobTable, RenderJob};
use crate::progress::{NoProgress, ProgressReporter};
use crate::runner::JobRunner;
use quarry_common::{Dimension, QuarryConfig, QuarryError, RegionKey, RenderReport, Result};
use quarry_logger::{log, LogSeverity};
use quarry_render::{RenderMode, TileCache};
use quarry_world::region_mtime;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const CHECK_LABEL: &str = "Checking regions...";
pub const RENDER_LABEL: &str = "Rendering regions...";

/// Told about every tile the coordinator commits to the cache
pub trait TileSink: Send + Sync {
    fn tile_committed(&self, key: RegionKey);
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub workers: usize,
    pub layer: String,
    pub nether_slice: Option<i32>,
    /// Grayscale heights instead of block colours
    pub heightmap: bool,
    pub colors: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings::from_config(&QuarryConfig::default())
    }
}

impl RenderSettings {
    pub fn from_config(config: &QuarryConfig) -> Self {
        Self {
            workers: config.workers,
            layer: config.layer.clone(),
            nether_slice: config.nether_slice,
            heightmap: false,
            colors: config.colors.clone(),
        }
    }

    pub fn mode_for(&self, dimension: Dimension) -> RenderMode {
        if self.heightmap {
            RenderMode::Heightmap(self.layer.clone())
        } else {
            RenderMode::for_dimension(dimension, &self.layer, self.nether_slice)
        }
    }
}

/// Outcome of one batch. Render diagnostics are merged over every successful job.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub jobs: JobTable,
    pub failures: Vec<(RegionKey, String)>,
    pub report: RenderReport,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn done(&self) -> usize {
        self.jobs.count(JobState::Done)
    }

    pub fn failed(&self) -> usize {
        self.jobs.count(JobState::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.jobs.count(JobState::Cancelled)
    }

    pub fn is_success(&self) -> bool {
        self.done() == self.total()
    }
}

enum JobOutcome {
    Cancelled,
    Finished(Result<RenderReport>),
}

fn lock(table: &Mutex<JobTable>) -> MutexGuard<'_, JobTable> {
    match table.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Decides which regions need rendering and drives bounded, cancellable batches of
/// render jobs. Only the coordinating future writes to the tile cache.
pub struct RenderScheduler {
    cache: Arc<TileCache>,
    runner: Arc<dyn JobRunner>,
    settings: RenderSettings,
    progress: Arc<dyn ProgressReporter>,
    sink: Option<Arc<dyn TileSink>>,
    cancel: CancellationToken,
}

impl RenderScheduler {
    pub fn new(cache: Arc<TileCache>, runner: Arc<dyn JobRunner>, settings: RenderSettings) -> Self {
        Self {
            cache,
            runner,
            settings,
            progress: Arc::new(NoProgress),
            sink: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TileSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Regions of `dimension` whose tile is missing or older than the region file,
    /// or every region when `force` is set. Regions that vanish while checking are skipped.
    pub fn stale_keys(&self, dimension: Dimension, force: bool) -> Result<Vec<RegionKey>> {
        let world = self.cache.world();
        let keys = world.region_keys(dimension)?;
        let total = keys.len();
        let mut stale = Vec::new();

        for (index, key) in keys.into_iter().enumerate() {
            match region_mtime(&world.region_path(key)) {
                Ok(_) => {
                    if force || !self.cache.is_fresh(key) {
                        stale.push(key);
                    }
                }
                Err(err @ QuarryError::MissingRegion(_)) => {
                    log(format!("Skipping {}: {}", key, err), LogSeverity::Warning)
                }
                Err(err) => log(format!("Cannot check {}: {}", key, err), LogSeverity::Error),
            }
            self.progress.report(CHECK_LABEL, index + 1, total);
        }

        log(
            format!("{} of {} {} regions need rendering", stale.len(), total, dimension),
            LogSeverity::Info,
        );
        Ok(stale)
    }

    fn job_for(&self, key: RegionKey) -> RenderJob {
        RenderJob {
            key,
            world: self.cache.world().folder().to_path_buf(),
            output: self.cache.staging_path(key),
            mode: self.settings.mode_for(key.dimension),
            colors: self.settings.colors.clone(),
        }
    }

    fn discard_staged(&self, key: RegionKey) {
        if let Err(err) = self.cache.discard_staged(key) {
            log(
                format!("Cannot clean up staged tile for {}: {}", key, err),
                LogSeverity::Warning,
            );
        }
    }

    /// Renders `keys`, at most `workers` at a time, and commits finished tiles.
    /// Duplicate keys are rendered once.
    pub async fn run_batch(&self, mut keys: Vec<RegionKey>) -> BatchReport {
        keys.sort();
        keys.dedup();
        let total = keys.len();
        let table = Arc::new(Mutex::new(JobTable::new(&keys)));
        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();

        if total > 0 {
            log(
                format!(
                    "Rendering {} regions with {} {} workers",
                    total,
                    self.settings.workers.max(1),
                    self.runner.name()
                ),
                LogSeverity::Info,
            );
        }

        for key in keys {
            let job = self.job_for(key);
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();
            let cancel = self.cancel.clone();
            let table = table.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let _permit = match permit {
                    Some(permit) if !cancel.is_cancelled() => permit,
                    _ => return (key, JobOutcome::Cancelled),
                };

                lock(&table).transition(key, JobState::Running);
                let result = runner.run(job, cancel.clone()).await;
                if result.is_err() && cancel.is_cancelled() {
                    return (key, JobOutcome::Cancelled);
                }
                (key, JobOutcome::Finished(result))
            });
        }

        let mut failures = Vec::new();
        let mut report = RenderReport::new();
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = match joined {
                Ok(finished) => finished,
                Err(err) => {
                    log(format!("Render task lost: {}", err), LogSeverity::Error);
                    continue;
                }
            };

            let result = match outcome {
                JobOutcome::Cancelled => {
                    self.discard_staged(key);
                    lock(&table).transition(key, JobState::Cancelled);
                    continue;
                }
                JobOutcome::Finished(result) => result,
            };

            let committed = result.and_then(|job_report| {
                self.cache.commit_staged(key, &self.cache.staging_path(key))?;
                Ok(job_report)
            });
            match committed {
                Ok(job_report) => {
                    lock(&table).transition(key, JobState::Done);
                    report.merge(job_report);
                    if let Some(sink) = &self.sink {
                        sink.tile_committed(key);
                    }
                }
                Err(err) => {
                    log(format!("Failed to render {}: {}", key, err), LogSeverity::Warning);
                    self.discard_staged(key);
                    lock(&table).transition(key, JobState::Failed);
                    failures.push((key, err.to_string()));
                }
            }
            completed += 1;
            self.progress.report(RENDER_LABEL, completed, total);
        }

        let mut jobs = lock(&table).clone();
        for key in jobs.unfinished() {
            if self.cancel.is_cancelled() {
                jobs.transition(key, JobState::Cancelled);
            } else {
                jobs.transition(key, JobState::Failed);
                failures.push((key, "render task lost".to_owned()));
            }
        }

        BatchReport {
            jobs,
            failures,
            report,
        }
    }

    /// Checks a dimension and renders whatever is stale
    pub async fn render_dimension(&self, dimension: Dimension, force: bool) -> Result<BatchReport> {
        let keys = self.stale_keys(dimension, force)?;
        Ok(self.run_batch(keys).await)
    }
}
