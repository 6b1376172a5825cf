mod common;

use assert_matches::assert_matches;
use common::*;
use quarry::{execute, Cli};
use quarry_common::{Dimension, QuarryError, RenderReport};
use quarry_render::{CacheLookup, ColorTable, TileCache, UNLOADED};
use quarry_scheduler::runner::render_job;
use quarry_scheduler::{
    InProcessRunner, JobRunner, JobState, ProcessRunner, RenderJob, RenderScheduler,
    RenderSettings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_test::assert_ok;

fn cli(args: &[&str]) -> Cli {
    Cli::parse(args.iter().map(|a| a.to_string())).unwrap()
}

fn scheduler(world: &TestWorld, runner: Arc<dyn JobRunner>, workers: usize) -> RenderScheduler {
    let settings = RenderSettings {
        workers,
        ..RenderSettings::from_config(&world.config())
    };
    RenderScheduler::new(Arc::new(world.cache()), runner, settings)
}

fn in_process() -> Arc<dyn JobRunner> {
    Arc::new(InProcessRunner::new(Arc::new(ColorTable::builtin())))
}

#[tokio::test]
async fn test_single_stone_chunk_end_to_end() {
    let world = TestWorld::new("stone");
    world.write_region(overworld(0, 0), &[(0, 0, uniform_chunk("minecraft:stone"))]);

    let data_root = world.data_root.display().to_string();
    let folder = world.folder.display().to_string();
    assert_ok!(execute(cli(&["--data-root", &data_root, "render", &folder, "--in-process"])).await);

    let cache = world.cache();
    let tile = match cache.get(overworld(0, 0)).unwrap() {
        CacheLookup::Hit(tile) => tile,
        other => panic!("expected a fresh tile, got {:?}", other),
    };
    let stone = ColorTable::builtin().block_color("stone").unwrap();
    assert_eq!(tile.dimensions(), (512, 512));
    for (x, z, pixel) in tile.enumerate_pixels() {
        let expected = if x < 16 && z < 16 { stone } else { UNLOADED };
        assert_eq!(pixel.0, expected, "pixel ({}, {})", x, z);
    }
    assert!(cache.composite_path(Dimension::Overworld).is_file());
}

#[tokio::test]
async fn test_batch_reports_union_of_missing_blocks() {
    let world = TestWorld::new("union");
    let keys: Vec<_> = (0..5).map(|x| overworld(x, 0)).collect();
    for key in &keys {
        world.write_region(
            *key,
            &[
                (0, 0, uniform_chunk(&format!("minecraft:frobnium_{}", key.x))),
                (1, 0, uniform_chunk("minecraft:zinc_ore")),
            ],
        );
    }

    let scheduler = scheduler(&world, in_process(), 2);
    let mut requested = keys.clone();
    requested.extend(keys.iter().take(2).copied());
    let batch = scheduler.run_batch(requested).await;

    assert_eq!(batch.total(), 5);
    assert_eq!(batch.done(), 5);
    let mut expected = RenderReport::new();
    for x in 0..5 {
        expected.record_missing_block(&format!("frobnium_{}", x));
    }
    expected.record_missing_block("zinc_ore");
    assert_eq!(batch.report.missing_blocks(), expected.missing_blocks());
    for key in &keys {
        assert!(scheduler.cache().is_fresh(*key));
    }
}

#[tokio::test]
async fn test_cancelled_batch_writes_nothing() {
    let world = TestWorld::new("cancelled");
    for x in 0..3 {
        world.write_region(overworld(x, 0), &[(0, 0, uniform_chunk("minecraft:stone"))]);
    }
    let scheduler = scheduler(&world, in_process(), 3);
    scheduler.cancel_token().cancel();

    let keys = scheduler.stale_keys(Dimension::Overworld, false).unwrap();
    let batch = scheduler.run_batch(keys).await;
    assert_eq!(batch.cancelled(), 3);
    assert!(scheduler.cache().tiles(Dimension::Overworld).unwrap().is_empty());
}

#[tokio::test]
async fn test_panicking_job_fails_alone() {
    let world = TestWorld::new("panic");
    for x in 0..3 {
        world.write_region(overworld(x, 0), &[(0, 0, uniform_chunk("minecraft:dirt"))]);
    }
    let colors = ColorTable::builtin();
    let runner = InProcessRunner::with_renderer(move |job: &RenderJob| {
        if job.key.x == 1 {
            panic!("region decoder crashed");
        }
        render_job(job, &colors)
    });
    let scheduler = scheduler(&world, Arc::new(runner), 2);

    let batch = scheduler.render_dimension(Dimension::Overworld, false).await.unwrap();
    assert_eq!(batch.done(), 2);
    assert_eq!(batch.failed(), 1);
    assert_eq!(batch.jobs.state(overworld(1, 0)), Some(JobState::Failed));
    assert!(!scheduler.cache().tile_path(overworld(1, 0)).exists());
    assert_eq!(
        scheduler.stale_keys(Dimension::Overworld, false).unwrap(),
        vec![overworld(1, 0)]
    );
}

#[tokio::test]
async fn test_edited_region_makes_tile_stale() {
    let world = TestWorld::new("edited");
    let region = world.write_region(overworld(-1, 2), &[(5, 5, uniform_chunk("minecraft:sand"))]);
    let scheduler = scheduler(&world, in_process(), 1);
    scheduler.render_dimension(Dimension::Overworld, false).await.unwrap();

    let cache: &TileCache = scheduler.cache();
    assert_matches!(cache.get(overworld(-1, 2)).unwrap(), CacheLookup::Hit(_));
    assert!(scheduler.stale_keys(Dimension::Overworld, false).unwrap().is_empty());

    set_mtime(&region, SystemTime::now() + Duration::from_secs(60));
    assert_matches!(cache.get(overworld(-1, 2)).unwrap(), CacheLookup::Stale);
    assert_eq!(
        scheduler.stale_keys(Dimension::Overworld, false).unwrap(),
        vec![overworld(-1, 2)]
    );
}

#[tokio::test]
async fn test_out_of_process_workers() {
    let world = TestWorld::new("process");
    world.write_region(overworld(0, 0), &[(0, 0, uniform_chunk("minecraft:mystery_block"))]);
    world.write_region(overworld(1, 0), &[(0, 0, uniform_chunk("minecraft:stone"))]);

    let runner = ProcessRunner::new(PathBuf::from(env!("CARGO_BIN_EXE_quarry")))
        .with_leading_args(vec!["--log-level".to_owned(), "error".to_owned()]);
    let scheduler = scheduler(&world, Arc::new(runner), 2);
    let batch = scheduler.render_dimension(Dimension::Overworld, false).await.unwrap();

    assert!(batch.is_success(), "failures: {:?}", batch.failures);
    assert!(batch.report.missing_blocks().contains("mystery_block"));
    let tile = match scheduler.cache().get(overworld(1, 0)).unwrap() {
        CacheLookup::Hit(tile) => tile,
        other => panic!("expected a fresh tile, got {:?}", other),
    };
    assert_eq!(
        tile.get_pixel(0, 0).0,
        ColorTable::builtin().block_color("stone").unwrap()
    );
}

#[tokio::test]
async fn test_missing_world_is_fatal() {
    let world = TestWorld::new("missing");
    let gone = world.root.join("nowhere").display().to_string();
    let err = execute(cli(&["info", &gone])).await.unwrap_err();
    assert_matches!(err, QuarryError::WorldNotFound(_));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_info_and_portals_commands() {
    let world = TestWorld::new("portals");
    world.write_region(
        overworld(0, 0),
        &[(3, 4, uniform_chunk("minecraft:nether_portal"))],
    );
    let data_root = world.data_root.display().to_string();
    let folder = world.folder.display().to_string();

    assert_ok!(execute(cli(&["info", &folder])).await);
    assert_ok!(execute(cli(&["--data-root", &data_root, "portals", &folder])).await);

    let portals =
        quarry_world::portals::read_portals(&world.data_dir().join("portals.json")).unwrap();
    assert_eq!(portals.len(), 1);
    assert_eq!((portals[0].chunk_x, portals[0].chunk_z), (3, 4));
}
