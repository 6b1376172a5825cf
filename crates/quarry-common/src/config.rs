use crate::error::QuarryError;
use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default file name looked up in the working directory when no `--config` is given
pub const CONFIG_FILE_NAME: &str = "quarry.json";

/// Runtime configuration. Every field has a default so a partial file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Folder containing one sub-folder per save
    pub saves_dir: PathBuf,
    /// Tiles for world `w` go to `<data_root>/w`
    pub data_root: PathBuf,
    /// Concurrent render jobs
    pub workers: usize,
    pub log_level: String,
    /// Heightmap used for terrain tiles
    pub layer: String,
    /// Fixed height used for nether tiles, where the surface heightmap is the bedrock roof
    pub nether_slice: Option<i32>,
    /// Binary spawned for out-of-process region renders; defaults to the running executable
    pub worker_exe: Option<PathBuf>,
    /// JSON colour table replacing the built-in one
    pub colors: Option<PathBuf>,
}

impl Default for QuarryConfig {
    fn default() -> Self {
        Self {
            saves_dir: default_saves_dir(),
            data_root: PathBuf::from("data"),
            workers: 3,
            log_level: "info".to_owned(),
            layer: "WORLD_SURFACE".to_owned(),
            nether_slice: Some(31),
            worker_exe: None,
            colors: None,
        }
    }
}

impl QuarryConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            QuarryError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: QuarryConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else `quarry.json` in the working directory if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new(CONFIG_FILE_NAME);
                if local.is_file() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(QuarryError::ConfigError(
                "workers must be at least 1".to_owned(),
            ));
        }
        if self.layer.is_empty() {
            return Err(QuarryError::ConfigError("layer must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Tile directory for one world, named after the world folder
    pub fn data_dir_for(&self, world: &Path) -> PathBuf {
        let name = world
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "world".into());
        self.data_root.join(name)
    }
}

fn default_saves_dir() -> PathBuf {
    #[cfg(target_family = "windows")]
    let base = std::env::var_os("APPDATA");
    #[cfg(not(target_family = "windows"))]
    let base = std::env::var_os("HOME");

    base.map(PathBuf::from)
        .unwrap_or_default()
        .join(".minecraft")
        .join("saves")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = QuarryConfig::from_json(r#"{ "workers": 5, "layer": "OCEAN_FLOOR" }"#).unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.layer, "OCEAN_FLOOR");
        assert_eq!(config.data_root, PathBuf::from("data"));
        assert_eq!(config.nether_slice, Some(31));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert_matches!(
            QuarryConfig::from_json(r#"{ "workers": 0 }"#),
            Err(QuarryError::ConfigError(_))
        );
    }

    #[test]
    fn test_bad_json_is_config_error() {
        assert_matches!(
            QuarryConfig::from_json("{ workers: "),
            Err(QuarryError::ConfigError(_))
        );
    }

    #[test]
    fn test_data_dir_named_after_world() {
        let config = QuarryConfig {
            data_root: PathBuf::from("/tmp/tiles"),
            ..QuarryConfig::default()
        };
        assert_eq!(
            config.data_dir_for(Path::new("/saves/My World")),
            PathBuf::from("/tmp/tiles/My World")
        );
    }
}
