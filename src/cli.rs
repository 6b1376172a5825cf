use quarry_common::{Dimension, QuarryError, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

pub const USAGE: &str = "\
usage: quarry [--config FILE] [--data-root DIR] [--log-level LEVEL] <command>

commands:
  render [WORLD] [--dimension D] [--force] [--jobs N] [--in-process] [--export FILE] [--tiles-only]
  render-region [WORLD] --region X,Z [--dimension D] [--output FILE] [--heightmap]
                [--layer NAME] [--slice Y] [--colors FILE]
  compose [WORLD] [--dimension D] [--output FILE]
  watch [WORLD] [--dimension D] [--interval SECS]
  map FILE OUTPUT
  info [WORLD]
  portals [WORLD]

WORLD is a folder or the name of a save; without it the most recently played save is used.";

/// Seconds between passes of `watch` when no interval is given
pub const DEFAULT_WATCH_INTERVAL: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub data_root: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Render {
        world: Option<String>,
        dimension: Option<Dimension>,
        force: bool,
        jobs: Option<usize>,
        in_process: bool,
        export: Option<PathBuf>,
        tiles_only: bool,
    },
    /// Renders a single region; what `render` spawns for every stale region
    RenderRegion {
        world: Option<String>,
        region: (i32, i32),
        dimension: Dimension,
        output: Option<PathBuf>,
        heightmap: bool,
        layer: Option<String>,
        slice: Option<i32>,
        colors: Option<PathBuf>,
    },
    Compose {
        world: Option<String>,
        dimension: Option<Dimension>,
        output: Option<PathBuf>,
    },
    Watch {
        world: Option<String>,
        dimension: Option<Dimension>,
        interval: u64,
    },
    Map {
        input: PathBuf,
        output: PathBuf,
    },
    Info {
        world: Option<String>,
    },
    Portals {
        world: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub global: GlobalArgs,
    pub command: Command,
}

fn usage(msg: impl Into<String>) -> QuarryError {
    QuarryError::UsageError(msg.into())
}

/// Flags and positionals of one command
#[derive(Debug, Default)]
struct Parsed {
    positionals: Vec<String>,
    values: HashMap<String, String>,
    switches: HashSet<String>,
}

impl Parsed {
    fn parse(
        args: &mut dyn Iterator<Item = String>,
        value_flags: &[&str],
        switch_flags: &[&str],
    ) -> Result<Parsed> {
        let mut parsed = Parsed::default();
        while let Some(arg) = args.next() {
            if value_flags.contains(&arg.as_str()) {
                let value = args
                    .next()
                    .ok_or_else(|| usage(format!("{} needs a value", arg)))?;
                parsed.values.insert(arg, value);
            } else if switch_flags.contains(&arg.as_str()) {
                parsed.switches.insert(arg);
            } else if arg.starts_with("--") {
                return Err(usage(format!("unknown option {}", arg)));
            } else {
                parsed.positionals.push(arg);
            }
        }
        Ok(parsed)
    }

    fn world(&mut self) -> Result<Option<String>> {
        match self.positionals.len() {
            0 => Ok(None),
            1 => Ok(self.positionals.pop()),
            _ => Err(usage(format!("unexpected argument {}", self.positionals[1]))),
        }
    }

    fn switch(&self, flag: &str) -> bool {
        self.switches.contains(flag)
    }

    fn path(&self, flag: &str) -> Option<PathBuf> {
        self.values.get(flag).map(PathBuf::from)
    }

    fn value<T: std::str::FromStr>(&self, flag: &str) -> Result<Option<T>> {
        match self.values.get(flag) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| usage(format!("invalid value '{}' for {}", raw, flag))),
            None => Ok(None),
        }
    }

    fn dimension(&self) -> Result<Option<Dimension>> {
        self.values
            .get("--dimension")
            .map(|raw| raw.parse::<Dimension>())
            .transpose()
    }
}

/// Parses `X,Z`
pub fn parse_region(raw: &str) -> Result<(i32, i32)> {
    let (x, z) = raw
        .split_once(',')
        .ok_or_else(|| usage(format!("region '{}' is not X,Z", raw)))?;
    let coordinate = |v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|_| usage(format!("region '{}' is not X,Z", raw)))
    };
    Ok((coordinate(x)?, coordinate(z)?))
}

impl Cli {
    /// Parses the arguments after the program name
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Cli> {
        let mut args = args.into_iter();
        let mut global = GlobalArgs::default();

        let name = loop {
            let arg = args.next().ok_or_else(|| usage("no command given"))?;
            match arg.as_str() {
                "--config" | "--data-root" | "--log-level" => {
                    let value = args
                        .next()
                        .ok_or_else(|| usage(format!("{} needs a value", arg)))?;
                    match arg.as_str() {
                        "--config" => global.config = Some(PathBuf::from(value)),
                        "--data-root" => global.data_root = Some(PathBuf::from(value)),
                        _ => global.log_level = Some(value),
                    }
                }
                "-h" | "--help" | "help" => return Err(usage("")),
                _ if arg.starts_with("--") => return Err(usage(format!("unknown option {}", arg))),
                _ => break arg,
            }
        };

        let command = match name.as_str() {
            "render" => {
                let mut p = Parsed::parse(
                    &mut args,
                    &["--dimension", "--jobs", "--export"],
                    &["--force", "--in-process", "--tiles-only"],
                )?;
                let jobs: Option<usize> = p.value("--jobs")?;
                if jobs == Some(0) {
                    return Err(usage("--jobs must be at least 1"));
                }
                Command::Render {
                    world: p.world()?,
                    dimension: p.dimension()?,
                    force: p.switch("--force"),
                    jobs,
                    in_process: p.switch("--in-process"),
                    export: p.path("--export"),
                    tiles_only: p.switch("--tiles-only"),
                }
            }
            "render-region" => {
                let mut p = Parsed::parse(
                    &mut args,
                    &["--region", "--dimension", "--output", "--layer", "--slice", "--colors"],
                    &["--heightmap"],
                )?;
                let region = p
                    .values
                    .get("--region")
                    .ok_or_else(|| usage("render-region needs --region X,Z"))?;
                Command::RenderRegion {
                    region: parse_region(region)?,
                    dimension: p.dimension()?.unwrap_or(Dimension::Overworld),
                    output: p.path("--output"),
                    heightmap: p.switch("--heightmap"),
                    layer: p.values.get("--layer").cloned(),
                    slice: p.value("--slice")?,
                    colors: p.path("--colors"),
                    world: p.world()?,
                }
            }
            "compose" => {
                let mut p = Parsed::parse(&mut args, &["--dimension", "--output"], &[])?;
                Command::Compose {
                    world: p.world()?,
                    dimension: p.dimension()?,
                    output: p.path("--output"),
                }
            }
            "watch" => {
                let mut p = Parsed::parse(&mut args, &["--dimension", "--interval"], &[])?;
                Command::Watch {
                    world: p.world()?,
                    dimension: p.dimension()?,
                    interval: p.value("--interval")?.unwrap_or(DEFAULT_WATCH_INTERVAL),
                }
            }
            "map" => {
                let p = Parsed::parse(&mut args, &[], &[])?;
                match <[String; 2]>::try_from(p.positionals) {
                    Ok([input, output]) => Command::Map {
                        input: PathBuf::from(input),
                        output: PathBuf::from(output),
                    },
                    Err(_) => return Err(usage("map needs FILE and OUTPUT")),
                }
            }
            "info" => Command::Info {
                world: Parsed::parse(&mut args, &[], &[])?.world()?,
            },
            "portals" => Command::Portals {
                world: Parsed::parse(&mut args, &[], &[])?.world()?,
            },
            other => return Err(usage(format!("unknown command '{}'", other))),
        };

        Ok(Cli { global, command })
    }
}
