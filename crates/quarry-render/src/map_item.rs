use crate::colors::ColorTable;
use image::{Rgb, RgbImage};
use quarry_common::{QuarryError, Result};
use quarry_logger::{log, LogSeverity};
use quarry_nbt::{NbtFile, Tag};
use std::collections::BTreeSet;
use std::path::Path;

/// Edge length of a map item in pixels
pub const MAP_SIZE: u32 = 128;

/// A rendered map item and the colour indices the palette had no entry for
#[derive(Debug, Clone, PartialEq)]
pub struct MapRender {
    pub data_version: i32,
    pub image: RgbImage,
    pub missing_indices: BTreeSet<u8>,
}

/// Renders the tree of a `map_<n>.dat` file. Indices missing from the map palette are
/// drawn as the gray level of the index itself.
pub fn render_map_tag(root: &Tag, colors: &ColorTable) -> Result<MapRender> {
    let data_version = match root.get_opt("DataVersion")? {
        Some(version) => version.as_i32()?,
        None => 0,
    };
    let indices = root.get("data")?.get_byte_array("colors")?;
    let expected = (MAP_SIZE * MAP_SIZE) as usize;
    if indices.len() != expected {
        return Err(QuarryError::NbtError(format!(
            "map colors hold {} entries, expected {}",
            indices.len(),
            expected
        )));
    }

    let mut missing_indices = BTreeSet::new();
    let image = RgbImage::from_fn(MAP_SIZE, MAP_SIZE, |x, z| {
        let index = indices[(z * MAP_SIZE + x) as usize] as u8;
        match colors.map_color(data_version, index) {
            Some(rgb) => Rgb(rgb),
            None => {
                missing_indices.insert(index);
                Rgb([index, index, index])
            }
        }
    });

    Ok(MapRender {
        data_version,
        image,
        missing_indices,
    })
}

pub fn render_map_file(path: &Path, colors: &ColorTable) -> Result<MapRender> {
    let file = NbtFile::open(path)?;
    let rendered = render_map_tag(&file.root, colors)?;
    log(
        format!("Map {} has version {}", path.display(), rendered.data_version),
        LogSeverity::Debug,
    );
    if !rendered.missing_indices.is_empty() {
        let listed: Vec<String> = rendered.missing_indices.iter().map(u8::to_string).collect();
        log(
            format!("Missing map colour indices: {}", listed.join(", ")),
            LogSeverity::Warning,
        );
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use quarry_nbt::NbtCompression;
    use std::fs;

    fn map_tag(colors: Vec<i8>) -> Tag {
        Tag::compound(vec![
            ("DataVersion", Tag::Int(1343)),
            (
                "data",
                Tag::compound(vec![
                    ("scale", Tag::Byte(0)),
                    ("colors", Tag::ByteArray(colors)),
                ]),
            ),
        ])
    }

    #[test]
    fn test_render_map() {
        let table = ColorTable::builtin();
        let mut indices = vec![4i8; 128 * 128];
        indices[1] = -6; // 250, not in the palette
        indices[2] = -6;
        let rendered = render_map_tag(&map_tag(indices), &table).unwrap();

        assert_eq!(rendered.data_version, 1343);
        assert_eq!(rendered.image.get_pixel(0, 0).0, [89, 125, 39]);
        assert_eq!(rendered.image.get_pixel(1, 0).0, [250, 250, 250]);
        assert_eq!(rendered.missing_indices.len(), 1);
        assert!(rendered.missing_indices.contains(&250));
    }

    #[test]
    fn test_wrong_size_rejected() {
        let table = ColorTable::builtin();
        assert_matches!(
            render_map_tag(&map_tag(vec![0; 10]), &table),
            Err(QuarryError::NbtError(_))
        );
    }

    #[test]
    fn test_render_map_file() {
        let path = std::env::temp_dir().join(format!("quarry-map_0-{}.dat", std::process::id()));
        let file = NbtFile::new(String::new(), map_tag(vec![0; 128 * 128]));
        fs::write(&path, file.to_bytes(NbtCompression::Gzip).unwrap()).unwrap();

        let rendered = render_map_file(&path, &ColorTable::builtin()).unwrap();
        assert_eq!(rendered.image.dimensions(), (128, 128));
        fs::remove_file(&path).unwrap();
    }
}
