//! Named Binary Tag decoding and encoding, as used by level.dat and chunk payloads.

pub mod decode;
pub mod encode;
pub mod file;
pub mod tag;

pub use decode::{Decoder, MAX_DEPTH};
pub use encode::{write_named, write_payload};
pub use file::{NbtCompression, NbtFile};
pub use tag::{Tag, TagKind};
