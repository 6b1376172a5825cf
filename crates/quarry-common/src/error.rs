use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum QuarryError {
    IoError(io::Error),
    /// Raw tag bytes could not be decoded
    NbtError(String),
    /// A tag was present but held a different variant than the caller asked for
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    MissingTag(String),
    InvalidFieldWidth(u32),
    /// Word count of a packed array does not fit its field width and length
    MalformedPackedArray {
        name: String,
        expected_words: usize,
        actual_words: usize,
    },
    MalformedRegion(String),
    MissingRegion(PathBuf),
    WorldNotFound(PathBuf),
    CacheDirUnwritable(PathBuf, io::Error),
    ImageError(String),
    ConfigError(String),
    WorkerError(String),
    UsageError(String),
}

impl QuarryError {
    /// Conditions that abort the whole operation instead of being absorbed per chunk
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QuarryError::WorldNotFound(_)
                | QuarryError::CacheDirUnwritable(..)
                | QuarryError::ConfigError(_)
                | QuarryError::UsageError(_)
        )
    }
}

impl fmt::Display for QuarryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarryError::IoError(err) => write!(f, "IO error: {}", err),
            QuarryError::NbtError(msg) => write!(f, "NBT error: {}", msg),
            QuarryError::TypeMismatch {
                key,
                expected,
                found,
            } => write!(
                f,
                "Type mismatch for tag '{}': expected {}, found {}",
                key, expected, found
            ),
            QuarryError::MissingTag(key) => write!(f, "Missing tag: {}", key),
            QuarryError::InvalidFieldWidth(width) => {
                write!(f, "Invalid field width {} (must be 1-64)", width)
            }
            QuarryError::MalformedPackedArray {
                name,
                expected_words,
                actual_words,
            } => write!(
                f,
                "Malformed packed array '{}': expected {} words, found {}",
                name, expected_words, actual_words
            ),
            QuarryError::MalformedRegion(msg) => write!(f, "Malformed region file: {}", msg),
            QuarryError::MissingRegion(path) => {
                write!(f, "Region file missing: {}", path.display())
            }
            QuarryError::WorldNotFound(path) => {
                write!(f, "World directory not found: {}", path.display())
            }
            QuarryError::CacheDirUnwritable(path, err) => write!(
                f,
                "Tile cache directory {} is not writable: {}",
                path.display(),
                err
            ),
            QuarryError::ImageError(msg) => write!(f, "Image error: {}", msg),
            QuarryError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            QuarryError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            QuarryError::UsageError(msg) => write!(f, "Usage error: {}", msg),
        }
    }
}

impl Error for QuarryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            QuarryError::IoError(err) => Some(err),
            QuarryError::CacheDirUnwritable(_, err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for QuarryError {
    fn from(err: io::Error) -> Self {
        QuarryError::IoError(err)
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::ConfigError(err.to_string())
    }
}
