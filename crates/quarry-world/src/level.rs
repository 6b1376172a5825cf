use quarry_common::{Dimension, Position, QuarryError, Result};
use quarry_logger::{log, LogSeverity};
use quarry_nbt::{NbtFile, Tag};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const LEVEL_FILE: &str = "level.dat";
pub const PLAYER_DATA_DIR: &str = "playerdata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameType {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameType {
    pub fn from_id(id: i32) -> Option<GameType> {
        match id {
            0 => Some(GameType::Survival),
            1 => Some(GameType::Creative),
            2 => Some(GameType::Adventure),
            3 => Some(GameType::Spectator),
            _ => None,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerInfo {
    /// Player file stem, or `host` for the single-player entry in level.dat
    pub id: String,
    pub position: Position,
    pub dimension: Dimension,
}

impl PlayerInfo {
    fn from_tag(id: String, player: &Tag) -> Result<PlayerInfo> {
        let pos = player.get_list("Pos")?;
        if pos.len() != 3 {
            return Err(QuarryError::NbtError(format!(
                "player {} has {} position components",
                id,
                pos.len()
            )));
        }
        let position = Position {
            x: pos[0].as_f64()?,
            y: pos[1].as_f64()?,
            z: pos[2].as_f64()?,
        };

        // A namespaced string since 1.16, a numeric id before
        let dimension = match player.get_opt("Dimension")? {
            Some(Tag::String(name)) => Dimension::from_identifier(name),
            Some(Tag::Int(id)) => Dimension::from_identifier(&id.to_string()),
            _ => None,
        }
        .unwrap_or(Dimension::Overworld);

        Ok(PlayerInfo {
            id,
            position,
            dimension,
        })
    }
}

/// Metadata read from a save's level.dat and player files
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelInfo {
    pub folder: PathBuf,
    pub name: String,
    pub spawn_x: i32,
    pub spawn_z: i32,
    /// Milliseconds since the epoch
    pub last_played: i64,
    pub data_version: Option<i32>,
    pub game_type: Option<GameType>,
    pub players: Vec<PlayerInfo>,
}

impl LevelInfo {
    pub fn load(folder: &Path) -> Result<LevelInfo> {
        let level_path = folder.join(LEVEL_FILE);
        if !level_path.is_file() {
            return Err(QuarryError::WorldNotFound(folder.to_path_buf()));
        }
        let level = NbtFile::open(&level_path)?;
        let data = level.root.get("Data")?;

        let host = data.get_opt("Player")?;
        let game_type = match host {
            Some(player) if player.contains("playerGameType") => {
                GameType::from_id(player.get_i32("playerGameType")?)
            }
            _ => None,
        };

        let mut players = Vec::new();
        if let Some(player) = host {
            match PlayerInfo::from_tag("host".to_owned(), player) {
                Ok(info) => players.push(info),
                Err(err) => log(
                    format!("Skipping host player in {}: {}", level_path.display(), err),
                    LogSeverity::Warning,
                ),
            }
        }
        players.extend(read_player_files(&folder.join(PLAYER_DATA_DIR)));

        Ok(LevelInfo {
            folder: folder.to_path_buf(),
            name: data.get_str("LevelName")?.to_owned(),
            spawn_x: data.get_i32("SpawnX")?,
            spawn_z: data.get_i32("SpawnZ")?,
            last_played: data.get_i64("LastPlayed")?,
            data_version: match data.get_opt("DataVersion")? {
                Some(_) => Some(data.get_i32("DataVersion")?),
                None => None,
            },
            game_type,
            players,
        })
    }

    /// Dimension and block position a viewer should open on: the first player, else spawn
    pub fn initial_target(&self) -> (Dimension, f64, f64) {
        match self.players.first() {
            Some(player) => (player.dimension, player.position.x, player.position.z),
            None => (
                Dimension::Overworld,
                self.spawn_x as f64,
                self.spawn_z as f64,
            ),
        }
    }

    pub fn last_played_display(&self) -> String {
        quarry_logger::systime::format_timestamp(self.last_played / 1000)
    }
}

/// Reads `playerdata/*.dat`. Unreadable files are logged and skipped.
fn read_player_files(dir: &Path) -> Vec<PlayerInfo> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map_or(false, |ext| ext == "dat"))
        .collect();
    paths.sort();

    let mut players = Vec::new();
    for path in paths {
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        match NbtFile::open(&path).and_then(|file| PlayerInfo::from_tag(id, &file.root)) {
            Ok(player) => players.push(player),
            Err(err) => log(
                format!("Skipping player file {}: {}", path.display(), err),
                LogSeverity::Warning,
            ),
        }
    }
    players
}
