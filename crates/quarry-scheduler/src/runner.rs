use crate::job::RenderJob;
use futures::future::BoxFuture;
use quarry_common::{QuarryError, RenderReport, Result};
use quarry_logger::{log, LogSeverity};
use quarry_render::{part_path, render_region, save_png, ColorTable, RenderMode};
use quarry_world::World;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

pub const MISSING_BLOCK_PREFIX: &str = "Missing block: ";
pub const ANOMALIES_PREFIX: &str = "Anomalies: ";

/// Renders one job into its output file and returns what the render noticed.
///
/// Implementations must stop promptly once `cancel` fires. The returned error is
/// then discarded and the job is counted as cancelled.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: RenderJob, cancel: CancellationToken) -> BoxFuture<'static, Result<RenderReport>>;

    fn name(&self) -> &'static str;
}

/// Renders a region and writes its tile to `job.output`. This is the whole worker.
pub fn render_job(job: &RenderJob, colors: &ColorTable) -> Result<RenderReport> {
    let world = World::open(&job.world)?;
    let region = world.open_region(job.key)?;
    let mut report = RenderReport::new();
    let tile = render_region(&region, &job.mode, colors, &mut report);
    save_png(&tile, &job.output)?;
    Ok(report)
}

/// Prints a worker's report the way `ProcessRunner` reads it back
pub fn write_worker_report<W: Write>(report: &RenderReport, out: &mut W) -> io::Result<()> {
    for block in report.missing_blocks() {
        writeln!(out, "{}{}", MISSING_BLOCK_PREFIX, block)?;
    }
    writeln!(out, "{}{}", ANOMALIES_PREFIX, report.anomaly_count())?;
    out.flush()
}

/// Folds one line of worker output into `report`. Returns false for lines that are
/// not part of the report.
pub fn parse_worker_line(line: &str, report: &mut RenderReport) -> bool {
    let line = line.trim_end();
    if let Some(block) = line.strip_prefix(MISSING_BLOCK_PREFIX) {
        report.record_missing_block(block.trim());
        return true;
    }
    if let Some(count) = line.strip_prefix(ANOMALIES_PREFIX) {
        if let Ok(count) = count.trim().parse::<usize>() {
            report.add_remote_anomalies(count);
            return true;
        }
    }
    false
}

/// Command line flags that select `mode` in `render-region`
pub fn mode_args(mode: &RenderMode) -> Vec<String> {
    match mode {
        RenderMode::Heightmap(layer) => vec!["--heightmap".into(), "--layer".into(), layer.clone()],
        RenderMode::Terrain(layer) => vec!["--layer".into(), layer.clone()],
        RenderMode::Slice(y) => vec!["--slice".into(), y.to_string()],
    }
}

/// Runs each job in a child `quarry render-region` process, so a crash while decoding
/// a corrupt region only loses that region
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    exe: PathBuf,
    leading_args: Vec<String>,
}

impl ProcessRunner {
    pub fn new(exe: PathBuf) -> Self {
        Self {
            exe,
            leading_args: Vec::new(),
        }
    }

    /// Runs workers with the binary of this process
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Arguments placed before the subcommand, such as `--log-level`
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn command_args(&self, job: &RenderJob) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push("render-region".into());
        args.push(job.world.display().to_string());
        args.push("--region".into());
        args.push(format!("{},{}", job.key.x, job.key.z));
        args.push("--dimension".into());
        args.push(job.key.dimension.to_string());
        args.push("--output".into());
        args.push(job.output.display().to_string());
        args.extend(mode_args(&job.mode));
        if let Some(colors) = &job.colors {
            args.push("--colors".into());
            args.push(colors.display().to_string());
        }
        args
    }
}

async fn read_report(
    child: &mut Child,
    stdout: ChildStdout,
    report: &mut RenderReport,
) -> io::Result<ExitStatus> {
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        if !parse_worker_line(&line, report) {
            log(format!("Worker: {}", line), LogSeverity::Debug);
        }
    }
    child.wait().await
}

impl JobRunner for ProcessRunner {
    fn run(&self, job: RenderJob, cancel: CancellationToken) -> BoxFuture<'static, Result<RenderReport>> {
        let mut command = Command::new(&self.exe);
        command
            .args(self.command_args(&job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let key = job.key;
        let output = job.output;

        Box::pin(async move {
            let mut child = command.spawn().map_err(|e| {
                QuarryError::WorkerError(format!("could not start worker for {}: {}", key, e))
            })?;
            let pid = child.id();
            let stdout = child.stdout.take().ok_or_else(|| {
                QuarryError::WorkerError(format!("worker for {} has no stdout", key))
            })?;

            let mut report = RenderReport::new();
            let status = tokio::select! {
                _ = cancel.cancelled() => None,
                status = read_report(&mut child, stdout, &mut report) => Some(status),
            };
            let status = match status {
                Some(Ok(status)) if status.success() => return Ok(report),
                Some(status) => status,
                None => {
                    let _ = child.kill().await;
                    discard_output(&output, pid, true);
                    return Err(QuarryError::WorkerError(format!("worker for {} was killed", key)));
                }
            };

            discard_output(&output, pid, false);
            let status = status?;
            Err(QuarryError::WorkerError(format!(
                "worker for {} exited with {}",
                key, status
            )))
        })
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Removes the temp file a dead worker was writing, and its output too when the
/// worker was killed part way
fn discard_output(output: &Path, pid: Option<u32>, killed: bool) {
    let mut leftovers: Vec<PathBuf> = pid.map(|pid| part_path(output, pid)).into_iter().collect();
    if killed {
        leftovers.push(output.to_path_buf());
    }
    for path in leftovers {
        match std::fs::remove_file(&path) {
            Ok(()) => log(format!("Removed {}", path.display()), LogSeverity::Debug),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log(
                format!("Cannot remove {}: {}", path.display(), e),
                LogSeverity::Warning,
            ),
        }
    }
}

type RenderFn = dyn Fn(&RenderJob) -> Result<RenderReport> + Send + Sync;

/// Renders on tokio's blocking pool inside this process. A panicking render fails its
/// job; anything worse than a panic, such as memory corruption, takes the process down.
#[derive(Clone)]
pub struct InProcessRunner {
    render: Arc<RenderFn>,
}

impl InProcessRunner {
    pub fn new(colors: Arc<ColorTable>) -> Self {
        Self::with_renderer(move |job: &RenderJob| render_job(job, &colors))
    }

    pub fn with_renderer<F>(render: F) -> Self
    where
        F: Fn(&RenderJob) -> Result<RenderReport> + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(render),
        }
    }
}

impl JobRunner for InProcessRunner {
    fn run(&self, job: RenderJob, cancel: CancellationToken) -> BoxFuture<'static, Result<RenderReport>> {
        let render = self.render.clone();
        Box::pin(async move {
            let key = job.key;
            if cancel.is_cancelled() {
                return Err(QuarryError::WorkerError(format!("render of {} cancelled", key)));
            }
            // A blocking task cannot be interrupted; cancellation only stops new jobs
            match tokio::task::spawn_blocking(move || render(&job)).await {
                Ok(result) => result,
                Err(err) if err.is_panic() => Err(QuarryError::WorkerError(format!(
                    "render of {} panicked",
                    key
                ))),
                Err(err) => Err(QuarryError::WorkerError(format!("render of {}: {}", key, err))),
            }
        })
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}
