mod common;

use std::fs;
use std::path::Path;

use abotyper::aggregate::RunManifest;
use abotyper::caller::{read_call_file, read_call_run_id};
use abotyper::layout::{self, UnitPaths};
use abotyper::pipeline::{discover_units, run_pipeline, RunOutcome};
use abotyper::{CallStatus, Composite, Panel, Region, ResultAggregator, TypingConfig};

use common::{assert_snapshot, het, hom, region_pileup, write_unit};

/// Exon 6 and exon 7 read evidence for one sample; `None` leaves the exon 7
/// input out.
struct Sample {
    id: &'static str,
    exon6: Vec<(&'static str, String)>,
    exon7: Option<Vec<(&'static str, String)>>,
}

/// AO1, BO1, O1O1, O1O2 and O1O3 carriers, an O1O1/B pair no genotype
/// explains, and a sample without any exon 7 input.
fn samples() -> Vec<Sample> {
    let o1_carrier = || vec![("c.261", het('*'))];
    let o1_homozygous = || vec![("c.261", hom('*'))];
    let b_carrier = || vec![("c.796", het('A')), ("c.803", het('C'))];
    vec![
        Sample {
            id: "S01_barcode01",
            exon6: o1_carrier(),
            exon7: Some(vec![]),
        },
        Sample {
            id: "S02_barcode02",
            exon6: o1_carrier(),
            exon7: Some(b_carrier()),
        },
        Sample {
            id: "S03_barcode03",
            exon6: o1_homozygous(),
            exon7: Some(vec![]),
        },
        Sample {
            id: "S04_barcode04",
            exon6: o1_carrier(),
            exon7: Some(vec![("c.802", het('A'))]),
        },
        Sample {
            id: "S05_barcode05",
            exon6: o1_carrier(),
            exon7: Some(vec![("c.805", het('G'))]),
        },
        Sample {
            id: "S06_barcode06",
            exon6: o1_homozygous(),
            exon7: Some(b_carrier()),
        },
        Sample {
            id: "S07",
            exon6: vec![],
            exon7: None,
        },
    ]
}

fn build_input(panel: &Panel, input: &Path) {
    for sample in samples() {
        let exon6 = region_pileup(panel, Region::Exon6, &sample.exon6);
        write_unit(input, sample.id, Region::Exon6, &exon6);
        if let Some(overrides) = &sample.exon7 {
            let exon7 = region_pileup(panel, Region::Exon7, overrides);
            write_unit(input, sample.id, Region::Exon7, &exon7);
        }
    }
}

fn run(panel: &Panel, input: &Path, out: &Path, threads: Option<usize>) -> RunOutcome {
    run_pipeline(panel, &TypingConfig::default(), input, out, threads).unwrap()
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn full_run_produces_consolidated_report() {
    let panel = Panel::builtin().unwrap();
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    build_input(&panel, input.path());

    let outcome = run(&panel, input.path(), out.path(), Some(2));
    assert_eq!(outcome.units, 14);
    assert_eq!(outcome.failed_units, 1);

    let results = outcome.report.results();
    let ids: Vec<&str> = results.iter().map(|r| r.sample_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "S01_barcode01",
            "S02_barcode02",
            "S03_barcode03",
            "S04_barcode04",
            "S05_barcode05",
            "S06_barcode06",
            "S07",
        ]
    );
    assert_eq!(results[0].barcode.as_deref(), Some("01"));

    let joint: Vec<(String, Option<&str>)> = results
        .iter()
        .map(|r| (r.composite.to_string(), r.genotype()))
        .collect();
    assert_eq!(joint[0], ("A".to_string(), Some("AO1")));
    assert_eq!(joint[1], ("B".to_string(), Some("BO1")));
    assert_eq!(joint[2], ("O".to_string(), Some("O1O1")));
    assert_eq!(joint[3], ("O".to_string(), Some("O1O2")));
    assert_eq!(joint[4], ("O".to_string(), Some("O1O3")));

    // Exon 7 cannot tell O1 from A, so the O1O1 sample reads x/x there.
    assert_eq!(results[2].exon7.as_ref().unwrap().genotype(), Some("x/x"));

    assert_eq!(results[5].composite, Composite::Discordant);
    assert_eq!(results[5].exon6.as_ref().unwrap().genotype(), Some("O1/O1"));
    assert_eq!(results[5].exon7.as_ref().unwrap().genotype(), Some("B/x"));

    assert_eq!(results[6].composite, Composite::Failed);
    assert_eq!(results[6].exon7.as_ref().unwrap().status(), CallStatus::Failed);

    let manifest = RunManifest::read(&out.path().join(layout::MANIFEST_FILE)).unwrap();
    assert_eq!(manifest.units.len(), 14);
    assert_eq!(manifest.panel_fingerprint, panel.fingerprint());

    assert_snapshot("abo_result.tsv", &read(&outcome.outputs.results_tsv));
    assert!(outcome.outputs.workbook.is_file());
    let export = read(&outcome.outputs.export_csv);
    assert!(export.lines().any(|line| line.starts_with("S04_barcode04,O1,O2,O,O,")));
    assert!(read(&outcome.outputs.run_log).contains("anomaly\tS07/exon7: unit failed"));
}

#[test]
fn unit_outputs_are_written_per_region() {
    let panel = Panel::builtin().unwrap();
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    build_input(&panel, input.path());
    run(&panel, input.path(), out.path(), Some(1));

    let paths = UnitPaths::new(out.path(), "S01_barcode01", Region::Exon6);
    let frequencies = read(&paths.frequency_table());
    assert_eq!(frequencies.lines().count(), 81);
    let sites = read(&paths.site_table());
    assert_eq!(sites.lines().count(), 5);
    let polymorphisms = read(&paths.polymorphism_log());
    assert!(polymorphisms.lines().nth(1).unwrap().contains("\t22\t"));

    let call = read_call_file(&paths.call_file()).unwrap();
    assert_eq!(call.genotype(), Some("O1/x"));
    assert_eq!(call.supporting_sites(), ["c.261".to_string()]);
    let log = read(&paths.decision_log());
    assert!(log.contains("coverage derived from pileup records"));
    assert!(log.contains("rule O1/x: matched"));
    assert!(log.contains("result: genotype O1/x phenotype A|B|O"));
}

#[test]
fn call_files_carry_the_manifest_run_id() {
    let panel = Panel::builtin().unwrap();
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    build_input(&panel, input.path());
    run(&panel, input.path(), out.path(), None);

    let manifest = RunManifest::read(&out.path().join(layout::MANIFEST_FILE)).unwrap();
    assert!(manifest.run_id.is_some());
    for unit in &manifest.units {
        let path = UnitPaths::new(out.path(), &unit.sample_id, unit.region).call_file();
        assert_eq!(read_call_run_id(&path), manifest.run_id, "{unit}");
    }

    // A later manifest over the same directory sees none of these files.
    let later = RunManifest::new(panel.version(), panel.fingerprint(), ["S01_barcode01"]);
    let report = ResultAggregator::new(out.path())
        .with_manifest(later)
        .with_panel(panel.clone())
        .collect()
        .unwrap();
    assert_eq!(report.results()[0].composite, Composite::Incomplete);
    assert_eq!(
        report
            .anomalies()
            .iter()
            .filter(|note| note.contains("call file from another run"))
            .count(),
        2
    );
}

#[test]
fn reruns_are_byte_identical() {
    let panel = Panel::builtin().unwrap();
    let input = tempfile::tempdir().unwrap();
    build_input(&panel, input.path());

    let digests = |out: &Path| -> Vec<String> {
        let outcome = run(&panel, input.path(), out, None);
        [
            &outcome.outputs.results_tsv,
            &outcome.outputs.export_csv,
            &outcome.outputs.summary_json,
            &outcome.outputs.run_log,
        ]
        .iter()
        .map(|path| blake3::hash(&fs::read(path).unwrap()).to_hex().to_string())
        .collect()
    };

    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    assert_eq!(digests(first.path()), digests(second.path()));
    // Same output root twice: the second run overwrites in place.
    assert_eq!(digests(first.path()), digests(first.path()));
}

#[test]
fn missing_exon7_call_leaves_sample_incomplete() {
    let panel = Panel::builtin().unwrap();
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    build_input(&panel, input.path());
    run(&panel, input.path(), out.path(), None);

    let call_file = UnitPaths::new(out.path(), "S01_barcode01", Region::Exon7).call_file();
    fs::remove_file(call_file).unwrap();
    fs::remove_file(out.path().join(layout::MANIFEST_FILE)).unwrap();
    let report = ResultAggregator::new(out.path()).with_panel(panel).collect().unwrap();
    let s01 = &report.results()[0];
    assert_eq!(s01.composite, Composite::Incomplete);
    assert!(s01.exon7.is_none());
    assert!(report
        .anomalies()
        .contains(&"S01_barcode01/exon7: call file missing".to_string()));
    assert!(report.anomalies()[0].contains("completeness not checked"));

    let table = abotyper::aggregate::render_results_tsv(&report).unwrap();
    let row = table.lines().nth(1).unwrap();
    assert_eq!(
        row,
        "S01_barcode01\t01\tresolved\tO1/x\tA|B|O\t\t\t\t\t\t\
         incomplete\t\tnormal\t60\tincomplete:exon7"
    );
}

#[test]
fn discovery_ignores_loose_files() {
    let panel = Panel::builtin().unwrap();
    let input = tempfile::tempdir().unwrap();
    build_input(&panel, input.path());
    fs::write(input.path().join("samplesheet.csv"), "id\n").unwrap();
    let units = discover_units(input.path()).unwrap();
    assert_eq!(units.len(), 14);
}
