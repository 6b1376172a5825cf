use std::collections::BTreeMap;
use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const BLOCK_COLORS: &str = "assets/block_colors.json";
const MAP_COLORS: &str = "assets/map_colors.json";

fn main() {
    println!("cargo:rerun-if-changed={}", BLOCK_COLORS);
    println!("cargo:rerun-if-changed={}", MAP_COLORS);

    let blocks_json = fs::read_to_string(BLOCK_COLORS).expect("Failed to read block_colors.json");
    let blocks: BTreeMap<String, [u8; 3]> =
        serde_json::from_str(&blocks_json).expect("Failed to parse block_colors.json");

    let map_json = fs::read_to_string(MAP_COLORS).expect("Failed to read map_colors.json");
    // data version -> byte index -> colour; JSON keys are strings
    let map: BTreeMap<String, BTreeMap<String, [u8; 3]>> =
        serde_json::from_str(&map_json).expect("Failed to parse map_colors.json");

    let out_dir = env::var_os("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("color_tables.rs");
    let mut out_file = File::create(&dest_path).expect("Failed to create color_tables.rs");

    writeln!(&mut out_file, "pub static BLOCK_COLORS: &[(&str, [u8; 3])] = &[").unwrap();
    for (name, [r, g, b]) in &blocks {
        writeln!(&mut out_file, "    ({:?}, [{}, {}, {}]),", name, r, g, b).unwrap();
    }
    writeln!(&mut out_file, "];").unwrap();

    writeln!(&mut out_file, "pub static MAP_COLORS: &[(i32, u8, [u8; 3])] = &[").unwrap();
    for (version, indices) in &map {
        let version: i32 = version.parse().expect("data version keys must be integers");
        for (index, [r, g, b]) in indices {
            let index: u8 = index.parse().expect("map colour indices must be 0-255");
            writeln!(
                &mut out_file,
                "    ({}, {}, [{}, {}, {}]),",
                version, index, r, g, b
            )
            .unwrap();
        }
    }
    writeln!(&mut out_file, "];").unwrap();
}
