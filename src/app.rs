use crate::cli::{Cli, Command, GlobalArgs, USAGE};
use quarry_common::{Dimension, QuarryConfig, QuarryError, RegionKey, Result};
use quarry_logger::{log, set_min_severity, LogSeverity};
use quarry_render::{render_map_file, save_png, ColorTable, RenderMode, TileCache, WorldMapComposer};
use quarry_scheduler::runner::{render_job, write_worker_report};
use quarry_scheduler::{
    BatchReport, InProcessRunner, JobRunner, LogProgress, ProcessRunner, RenderJob,
    RenderScheduler, RenderSettings, Session,
};
use quarry_world::portals::{find_portals, write_portals, PORTALS_FILE};
use quarry_world::World;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs the command line and returns the process exit code
pub async fn run(args: Vec<String>) -> i32 {
    let cli = match Cli::parse(args) {
        Ok(cli) => cli,
        Err(err) => {
            if let QuarryError::UsageError(msg) = &err {
                if !msg.is_empty() {
                    eprintln!("{}", msg);
                }
            }
            eprintln!("{}", USAGE);
            return 2;
        }
    };

    match execute(cli).await {
        Ok(()) => 0,
        Err(err) if err.is_fatal() => {
            log(err.to_string(), LogSeverity::Fatal);
            1
        }
        Err(err) => {
            log(err.to_string(), LogSeverity::Error);
            1
        }
    }
}

/// Config file (or defaults) with the global flags applied; also sets the log threshold
pub fn load_config(global: &GlobalArgs) -> Result<QuarryConfig> {
    let mut config = QuarryConfig::load(global.config.as_deref())?;
    if let Some(root) = &global.data_root {
        config.data_root = root.clone();
    }
    if let Some(level) = &global.log_level {
        config.log_level = level.clone();
    }
    let severity: LogSeverity = config.log_level.parse().map_err(QuarryError::ConfigError)?;
    set_min_severity(severity);
    config.validate()?;
    Ok(config)
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli.global)?;
    match cli.command {
        Command::Render {
            world,
            dimension,
            force,
            jobs,
            in_process,
            export,
            tiles_only,
        } => {
            let world = open_world(&config, world.as_deref())?;
            let dimension = dimension.unwrap_or_else(|| default_dimension(&world));
            let cache = Arc::new(open_cache(&config, world)?);
            let mut settings = RenderSettings::from_config(&config);
            if let Some(jobs) = jobs {
                settings.workers = jobs;
            }

            let scheduler = RenderScheduler::new(cache.clone(), runner(&config, in_process)?, settings)
                .with_progress(Arc::new(LogProgress::new(10)));
            cancel_on_ctrl_c(scheduler.cancel_token().clone());
            let batch = scheduler.render_dimension(dimension, force).await?;
            print_batch(&batch)?;
            if scheduler.cancel_token().is_cancelled() {
                return Err(QuarryError::WorkerError("rendering was interrupted".to_owned()));
            }

            if !tiles_only {
                export_composite(&cache, dimension, export.as_deref())?;
            }
            Ok(())
        }
        Command::RenderRegion {
            world,
            region,
            dimension,
            output,
            heightmap,
            layer,
            slice,
            colors,
        } => {
            let world = open_world(&config, world.as_deref())?;
            let key = RegionKey::new(dimension, region.0, region.1);
            let layer = layer.unwrap_or_else(|| config.layer.clone());
            let mode = match (heightmap, slice) {
                (true, _) => RenderMode::Heightmap(layer),
                (false, Some(y)) => RenderMode::Slice(y),
                (false, None) => RenderMode::Terrain(layer),
            };
            let colors = color_table(colors.or_else(|| config.colors.clone()).as_deref())?;
            let output = match output {
                Some(output) => output,
                None => open_cache(&config, world.clone())?.tile_path(key),
            };

            let job = RenderJob {
                key,
                world: world.folder().to_path_buf(),
                output,
                mode,
                colors: None,
            };
            log(format!("Rendering {} ({})", key, job.mode), LogSeverity::Debug);
            let report = render_job(&job, &colors)?;
            write_worker_report(&report, &mut io::stdout().lock())?;
            Ok(())
        }
        Command::Compose {
            world,
            dimension,
            output,
        } => {
            let world = open_world(&config, world.as_deref())?;
            let dimension = dimension.unwrap_or_else(|| default_dimension(&world));
            let cache = open_cache(&config, world)?;
            export_composite(&cache, dimension, output.as_deref())
        }
        Command::Watch {
            world,
            dimension,
            interval,
        } => watch(&config, world.as_deref(), dimension, interval).await,
        Command::Map { input, output } => {
            let colors = color_table(config.colors.as_deref())?;
            let rendered = render_map_file(&input, &colors)?;
            save_png(&rendered.image, &output)?;
            log(format!("Saved {}", output.display()), LogSeverity::Info);
            Ok(())
        }
        Command::Info { world } => {
            let world = open_world(&config, world.as_deref())?;
            print_info(&config, &world)
        }
        Command::Portals { world } => {
            let world = open_world(&config, world.as_deref())?;
            let cache = open_cache(&config, world)?;
            let portals = find_portals(cache.world(), &mut |done, total| {
                if done % 10 == 0 || done == total {
                    log(format!("Scanning regions {}/{}", done, total), LogSeverity::Info);
                }
            })?;
            let path = cache.data_dir().join(PORTALS_FILE);
            write_portals(&path, &portals)?;
            println!("{} portal chunks written to {}", portals.len(), path.display());
            Ok(())
        }
    }
}

fn open_world(config: &QuarryConfig, world: Option<&str>) -> Result<World> {
    let world = World::resolve(&config.saves_dir, world)?;
    log(format!("Using world {}", world.folder().display()), LogSeverity::Debug);
    Ok(world)
}

fn open_cache(config: &QuarryConfig, world: World) -> Result<TileCache> {
    let data_dir = config.data_dir_for(world.folder());
    TileCache::create(world, &data_dir)
}

/// Where the first player is, else the overworld
fn default_dimension(world: &World) -> Dimension {
    match world.level_info() {
        Ok(info) => info.initial_target().0,
        Err(err) => {
            log(format!("No level info, using the overworld: {}", err), LogSeverity::Debug);
            Dimension::Overworld
        }
    }
}

fn color_table(path: Option<&Path>) -> Result<ColorTable> {
    match path {
        Some(path) => ColorTable::from_json_file(path),
        None => Ok(ColorTable::builtin()),
    }
}

fn runner(config: &QuarryConfig, in_process: bool) -> Result<Arc<dyn JobRunner>> {
    if in_process {
        let colors = color_table(config.colors.as_deref())?;
        return Ok(Arc::new(InProcessRunner::new(Arc::new(colors))));
    }
    let runner = match &config.worker_exe {
        Some(exe) => ProcessRunner::new(exe.clone()),
        None => ProcessRunner::current_exe()?,
    };
    Ok(Arc::new(runner.with_leading_args(vec![
        "--log-level".to_owned(),
        config.log_level.clone(),
    ])))
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    log("Interrupted, stopping workers".to_owned(), LogSeverity::Warning);
                    cancel.cancel();
                }
            }
            _ = cancel.cancelled() => {}
        }
    });
}

/// Missing blocks go to stdout once per batch; everything else is logged
fn print_batch(batch: &BatchReport) -> Result<()> {
    if batch.total() == 0 {
        log("Every tile is up to date".to_owned(), LogSeverity::Info);
        return Ok(());
    }
    write_worker_report(&batch.report, &mut io::stdout().lock())?;
    for anomaly in batch.report.anomalies() {
        log(anomaly.to_string(), LogSeverity::Debug);
    }
    for (key, reason) in &batch.failures {
        log(format!("{} failed: {}", key, reason), LogSeverity::Warning);
    }
    log(
        format!(
            "Rendered {} of {} regions ({} failed, {} cancelled)",
            batch.done(),
            batch.total(),
            batch.failed(),
            batch.cancelled()
        ),
        LogSeverity::Info,
    );
    Ok(())
}

fn export_composite(cache: &TileCache, dimension: Dimension, output: Option<&Path>) -> Result<()> {
    match WorldMapComposer::new(cache).export(dimension, output)? {
        Some(path) => println!("{}", path.display()),
        None => log(format!("No {} regions to compose", dimension), LogSeverity::Warning),
    }
    Ok(())
}

async fn watch(
    config: &QuarryConfig,
    world: Option<&str>,
    dimension: Option<Dimension>,
    interval: u64,
) -> Result<()> {
    let world = open_world(config, world)?;
    let dimension = dimension.unwrap_or_else(|| default_dimension(&world));
    let cache = Arc::new(open_cache(config, world)?);
    let mut session = Session::new(
        cache,
        runner(config, false)?,
        RenderSettings::from_config(config),
        dimension,
    )?;
    let cancel = session.cancel_token();
    cancel_on_ctrl_c(cancel.clone());

    log(
        format!("Watching {} every {}s, Ctrl-C to stop", dimension, interval),
        LogSeverity::Info,
    );
    loop {
        session.refresh();
        if let Some(batch) = session.wait().await? {
            if batch.total() > 0 {
                print_batch(&batch)?;
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }
    session.shutdown().await?;
    Ok(())
}

fn print_info(config: &QuarryConfig, world: &World) -> Result<()> {
    let info = world.level_info()?;
    let data_dir: PathBuf = config.data_dir_for(world.folder());
    let mut out = io::stdout().lock();
    writeln!(out, "Name:        {}", info.name)?;
    writeln!(out, "Folder:      {}", info.folder.display())?;
    writeln!(out, "Last played: {}", info.last_played_display())?;
    if let Some(version) = info.data_version {
        writeln!(out, "DataVersion: {}", version)?;
    }
    if let Some(game_type) = info.game_type {
        writeln!(out, "Game type:   {}", game_type)?;
    }
    writeln!(out, "Spawn:       {}, {}", info.spawn_x, info.spawn_z)?;
    for player in &info.players {
        writeln!(
            out,
            "Player {}: {:.1}, {:.1}, {:.1} in the {}",
            player.id, player.position.x, player.position.y, player.position.z, player.dimension
        )?;
    }
    for dimension in Dimension::ALL {
        writeln!(
            out,
            "{:<12} {} regions",
            format!("{}:", dimension),
            world.region_keys(dimension)?.len()
        )?;
    }
    writeln!(out, "Tiles:       {}", data_dir.display())?;
    Ok(())
}
