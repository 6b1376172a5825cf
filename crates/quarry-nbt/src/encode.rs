use crate::tag::{Tag, TagKind};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let length = u16::try_from(value.len())
        .map_err(|_| invalid_input(format!("string of {} bytes is too long", value.len())))?;
    writer.write_u16::<BigEndian>(length)?;
    writer.write_all(value.as_bytes())
}

fn write_length<W: Write>(writer: &mut W, length: usize) -> io::Result<()> {
    let length = i32::try_from(length)
        .map_err(|_| invalid_input(format!("{} elements do not fit a length prefix", length)))?;
    writer.write_i32::<BigEndian>(length)
}

/// Writes `tag` with its type id and name
pub fn write_named<W: Write>(writer: &mut W, name: &str, tag: &Tag) -> io::Result<()> {
    writer.write_u8(tag.kind().id())?;
    if tag.kind() != TagKind::End {
        write_string(writer, name)?;
    }
    write_payload(writer, tag)
}

pub fn write_payload<W: Write>(writer: &mut W, tag: &Tag) -> io::Result<()> {
    match tag {
        Tag::End => Ok(()),
        Tag::Byte(v) => writer.write_i8(*v),
        Tag::Short(v) => writer.write_i16::<BigEndian>(*v),
        Tag::Int(v) => writer.write_i32::<BigEndian>(*v),
        Tag::Long(v) => writer.write_i64::<BigEndian>(*v),
        Tag::Float(v) => writer.write_f32::<BigEndian>(*v),
        Tag::Double(v) => writer.write_f64::<BigEndian>(*v),
        Tag::ByteArray(bytes) => {
            write_length(writer, bytes.len())?;
            let raw: Vec<u8> = bytes.iter().map(|&b| b as u8).collect();
            writer.write_all(&raw)
        }
        Tag::String(value) => write_string(writer, value),
        Tag::List(items) => {
            let kind = items.first().map_or(TagKind::End, Tag::kind);
            if let Some(odd) = items.iter().find(|item| item.kind() != kind) {
                return Err(invalid_input(format!(
                    "list of {} holds a {}",
                    kind,
                    odd.kind()
                )));
            }
            writer.write_u8(kind.id())?;
            write_length(writer, items.len())?;
            items.iter().try_for_each(|item| write_payload(writer, item))
        }
        Tag::Compound(entries) => {
            // Key order, so equal compounds encode to equal bytes
            let mut names: Vec<&String> = entries.keys().collect();
            names.sort();
            for name in names {
                write_named(writer, name, &entries[name])?;
            }
            writer.write_u8(TagKind::End.id())
        }
        Tag::IntArray(ints) => {
            write_length(writer, ints.len())?;
            ints.iter().try_for_each(|&n| writer.write_i32::<BigEndian>(n))
        }
        Tag::LongArray(longs) => {
            write_length(writer, longs.len())?;
            longs.iter().try_for_each(|&n| writer.write_i64::<BigEndian>(n))
        }
    }
}
