#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use abotyper::{Panel, Region};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("ABOTYPER_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set ABOTYPER_UPDATE_SNAPSHOTS=1 to regenerate.\n\
             Expected:\n{}\nActual:\n{}",
            path, expected, actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

pub const DEPTH: usize = 60;

/// Length of the synthetic exon sequences.
pub fn region_length(region: Region) -> u32 {
    match region {
        Region::Exon6 => 80,
        Region::Exon7 => 700,
    }
}

/// `count` reads matching the reference followed by `count` reads carrying
/// `symbol` (a base, or `*` for a deletion).
pub fn het(symbol: char) -> String {
    let half = DEPTH / 2;
    format!("{}{}", ".".repeat(half), symbol.to_string().repeat(half))
}

/// `DEPTH` reads all carrying `symbol`.
pub fn hom(symbol: char) -> String {
    symbol.to_string().repeat(DEPTH)
}

/// Pileup text for one region: every position covered by `DEPTH` reference
/// reads except the `(site name, read bases)` overrides. Panel positions carry
/// the panel's reference base, everything else `A`.
pub fn region_pileup(panel: &Panel, region: Region, overrides: &[(&str, String)]) -> String {
    let region_panel = panel.region(region).expect("region in panel");
    let contig = format!("ABO_{}", region.label());
    let mut out = String::new();
    for position in 1..=region_length(region) {
        let site = region_panel.site_at(position);
        let reference = site.map_or('A', |site| site.reference.as_char());
        let bases = site
            .and_then(|site| overrides.iter().find(|(name, _)| *name == site.name))
            .map_or_else(|| ".".repeat(DEPTH), |(_, bases)| bases.clone());
        let qualities = "I".repeat(bases.len());
        out.push_str(&format!(
            "{contig}\t{position}\t{reference}\t{}\t{bases}\t{qualities}\n",
            bases.len()
        ));
    }
    out
}

/// Write a region pileup into `<input>/<sample>/<region>/<sample>.<region>.pileup`.
pub fn write_unit(input: &Path, sample: &str, region: Region, pileup: &str) -> PathBuf {
    let dir = input.join(sample).join(region.label());
    fs::create_dir_all(&dir).expect("create unit directory");
    let path = dir.join(format!("{sample}.{}.pileup", region.label()));
    fs::write(&path, pileup).expect("write pileup");
    path
}
