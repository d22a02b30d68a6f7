//! Cohort aggregation: reduce per-unit call files into one report.
//!
//! The aggregator never runs concurrently with the units it reads. In the
//! `run` pipeline it is invoked after every unit has joined; standalone it
//! goes through a [`CompletionBarrier`] first when a manifest is found.
//!
//! Each region only sees part of the ABO alleles, so a sample's genotype is
//! the panel combination its two region labels form together.

mod manifest;
mod report;
mod workbook;

pub use manifest::{CompletionBarrier, RunManifest, UnitKey};
pub use report::{render_export_csv, render_results_tsv, render_run_log, render_summary_json};
pub use workbook::render_workbook;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::caller::{read_call_file, CallOutcome, CallStatus, PhenotypeCall};
use crate::genomics::{write_atomically, Region};
use crate::layout::{self, UnitPaths};
use crate::panel::Panel;

/// Errors that stop aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no sample directories with call files under {0}")]
    EmptyRun(PathBuf),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run is incomplete, missing units: {}", format_units(.missing))]
    IncompleteRun { missing: Vec<UnitKey> },
    #[error("sample '{0}' appears more than once")]
    DuplicateSample(String),
    #[error("invalid run manifest: {0}")]
    Manifest(String),
    #[error("failed to serialise report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write table: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to build workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),
}

fn format_units(units: &[UnitKey]) -> String {
    units.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Sample-level conclusion after reconciling both regions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Composite {
    Phenotype(String),
    Discordant,
    Ambiguous,
    InsufficientCoverage,
    Failed,
    Incomplete,
}

impl Composite {
    pub fn label(&self) -> &str {
        match self {
            Composite::Phenotype(phenotype) => phenotype,
            Composite::Discordant => "discordant",
            Composite::Ambiguous => "ambiguous",
            Composite::InsufficientCoverage => "insufficient_coverage",
            Composite::Failed => "failed",
            Composite::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sample-level conclusion and the genotype it rests on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joint {
    pub composite: Composite,
    /// Joint genotype when the composite is a phenotype.
    pub genotype: Option<String>,
}

impl Joint {
    fn unresolved(composite: Composite) -> Self {
        Self {
            composite,
            genotype: None,
        }
    }
}

/// Combine the two region calls.
///
/// Both resolved: with a panel combination table, the pair of region labels
/// is looked up and gives the joint genotype and its phenotype; a pair the
/// table does not list is `Discordant`. Without a table, equal phenotypes
/// give that phenotype and different ones give `Discordant`. Otherwise the
/// worst status wins, in the order incomplete, failed, insufficient
/// coverage, ambiguous.
pub fn compose(
    panel: Option<&Panel>,
    exon6: Option<&PhenotypeCall>,
    exon7: Option<&PhenotypeCall>,
) -> Joint {
    let (Some(exon6), Some(exon7)) = (exon6, exon7) else {
        return Joint::unresolved(Composite::Incomplete);
    };
    if let (Some(g6), Some(g7)) = (exon6.genotype(), exon7.genotype()) {
        return match panel.filter(|panel| !panel.combinations().is_empty()) {
            Some(panel) => join_labels(panel, g6, g7),
            None => join_phenotypes(exon6, exon7),
        };
    }
    let statuses = [exon6.status(), exon7.status()];
    Joint::unresolved(if statuses.contains(&CallStatus::Failed) {
        Composite::Failed
    } else if statuses.contains(&CallStatus::InsufficientCoverage) {
        Composite::InsufficientCoverage
    } else {
        Composite::Ambiguous
    })
}

fn join_labels(panel: &Panel, exon6: &str, exon7: &str) -> Joint {
    let joined = panel.combine(exon6, exon7).and_then(|combination| {
        let phenotype = panel.phenotype(&combination.genotype)?;
        Some((combination.genotype.clone(), phenotype.to_string()))
    });
    match joined {
        Some((genotype, phenotype)) => Joint {
            composite: Composite::Phenotype(phenotype),
            genotype: Some(genotype),
        },
        None => Joint::unresolved(Composite::Discordant),
    }
}

fn join_phenotypes(exon6: &PhenotypeCall, exon7: &PhenotypeCall) -> Joint {
    let (Some(p6), Some(p7)) = (exon6.phenotype(), exon7.phenotype()) else {
        return Joint::unresolved(Composite::Discordant);
    };
    if p6 != p7 {
        return Joint::unresolved(Composite::Discordant);
    }
    let (g6, g7) = (exon6.genotype().unwrap_or(""), exon7.genotype().unwrap_or(""));
    Joint {
        composite: Composite::Phenotype(p6.to_string()),
        genotype: Some(if g6 == g7 { g6.to_string() } else { format!("{g6}/{g7}") }),
    }
}

/// Read-depth reliability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    VeryLow,
    Low,
    Normal,
    Robust,
    Unknown,
}

impl Reliability {
    /// Tier for the smallest non-zero supporting-site depth.
    pub fn from_min_depth(depth: Option<u32>) -> Self {
        match depth {
            None => Reliability::Unknown,
            Some(d) if d <= 20 => Reliability::VeryLow,
            Some(d) if d <= 40 => Reliability::Low,
            Some(d) if d >= 500 => Reliability::Robust,
            Some(_) => Reliability::Normal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Reliability::VeryLow => "very_low",
            Reliability::Low => "low",
            Reliability::Normal => "normal",
            Reliability::Robust => "robust",
            Reliability::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Barcode number from a `<name>_barcode<NN>` sample id.
pub fn parse_barcode(sample_id: &str) -> Option<String> {
    let (_, tail) = sample_id.rsplit_once('_')?;
    let digits = tail.strip_prefix("barcode")?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits.to_string())
    } else {
        None
    }
}

/// One row of the consolidated report.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub sample_id: String,
    pub barcode: Option<String>,
    pub exon6: Option<PhenotypeCall>,
    pub exon7: Option<PhenotypeCall>,
    pub composite: Composite,
    genotype: Option<String>,
    pub reliability: Reliability,
    pub min_depth: Option<u32>,
    pub flags: Vec<String>,
}

impl SampleResult {
    /// Reconcile a sample's region calls, joining their labels through the
    /// combination table of `panel` when one is given.
    pub fn new(
        panel: Option<&Panel>,
        sample_id: impl Into<String>,
        exon6: Option<PhenotypeCall>,
        exon7: Option<PhenotypeCall>,
    ) -> Self {
        let sample_id = sample_id.into();
        let Joint { composite, genotype } = compose(panel, exon6.as_ref(), exon7.as_ref());
        let min_depth = [exon6.as_ref(), exon7.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(PhenotypeCall::min_supporting_depth)
            .min();

        let mut flags = Vec::new();
        for (region, call) in [(Region::Exon6, &exon6), (Region::Exon7, &exon7)] {
            match call {
                Some(call) => {
                    flags.extend(call.flags().iter().map(|flag| format!("{region}:{flag}")))
                }
                None => flags.push(format!("incomplete:{region}")),
            }
        }
        if composite == Composite::Discordant {
            flags.push("discordant".to_string());
        }

        Self {
            barcode: parse_barcode(&sample_id),
            sample_id,
            exon6,
            exon7,
            composite,
            genotype,
            reliability: Reliability::from_min_depth(min_depth),
            min_depth,
            flags,
        }
    }

    pub fn call(&self, region: Region) -> Option<&PhenotypeCall> {
        match region {
            Region::Exon6 => self.exon6.as_ref(),
            Region::Exon7 => self.exon7.as_ref(),
        }
    }

    /// Joint genotype when the composite is a phenotype.
    pub fn genotype(&self) -> Option<&str> {
        self.genotype.as_deref()
    }

    /// Mean evidence depth over the supporting sites of both regions.
    pub fn mean_depth(&self) -> Option<f64> {
        let means: Vec<f64> = [self.exon6.as_ref(), self.exon7.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(PhenotypeCall::mean_supporting_depth)
            .collect();
        if means.is_empty() {
            None
        } else {
            Some(means.iter().sum::<f64>() / means.len() as f64)
        }
    }
}

/// Consolidated report: unique samples in discovery order plus every
/// non-fatal anomaly met while collecting them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateReport {
    pub panel_version: String,
    pub panel_fingerprint: String,
    results: Vec<SampleResult>,
    anomalies: Vec<String>,
}

impl AggregateReport {
    pub fn push(&mut self, result: SampleResult) -> Result<(), AggregateError> {
        if self.results.iter().any(|existing| existing.sample_id == result.sample_id) {
            return Err(AggregateError::DuplicateSample(result.sample_id));
        }
        self.results.push(result);
        Ok(())
    }

    pub fn note(&mut self, anomaly: impl Into<String>) {
        let anomaly = anomaly.into();
        warn!("{anomaly}");
        self.anomalies.push(anomaly);
    }

    pub fn results(&self) -> &[SampleResult] {
        &self.results
    }

    pub fn anomalies(&self) -> &[String] {
        &self.anomalies
    }
}

/// Files written by [`ResultAggregator::write`].
#[derive(Debug, Clone)]
pub struct AggregateOutputs {
    pub results_tsv: PathBuf,
    pub workbook: PathBuf,
    pub export_csv: PathBuf,
    pub summary_json: PathBuf,
    pub run_log: PathBuf,
}

/// Collects call files under a run root into an [`AggregateReport`].
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    root: PathBuf,
    manifest: Option<RunManifest>,
    panel: Option<Panel>,
}

impl ResultAggregator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: None,
            panel: None,
        }
    }

    /// Take sample order from `manifest` instead of directory listing, and
    /// only accept call files stamped with its run id.
    pub fn with_manifest(mut self, manifest: RunManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Join region labels through the combination table of `panel`.
    pub fn with_panel(mut self, panel: Panel) -> Self {
        self.panel = Some(panel);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sample directories under the root, sorted by name. Hidden entries
    /// are ignored.
    pub fn discover_samples(&self) -> Result<Vec<String>, AggregateError> {
        let io_err = |source| AggregateError::Io {
            path: self.root.clone(),
            source,
        };
        let mut samples = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            samples.push(name);
        }
        samples.sort();
        Ok(samples)
    }

    /// Read every sample's call files.
    pub fn collect(&self) -> Result<AggregateReport, AggregateError> {
        let mut report = AggregateReport::default();
        let samples: Vec<String> = match &self.manifest {
            Some(manifest) => {
                report.panel_version = manifest.panel_version.clone();
                report.panel_fingerprint = manifest.panel_fingerprint.clone();
                manifest.sample_ids().into_iter().map(str::to_string).collect()
            }
            None => {
                report.note(format!(
                    "no {} under {}: samples taken from the directory listing, \
                     completeness not checked",
                    layout::MANIFEST_FILE,
                    self.root.display()
                ));
                self.discover_samples()?
            }
        };

        for sample_id in samples {
            let mut calls = [None, None];
            for (slot, region) in calls.iter_mut().zip(Region::ALL) {
                *slot = self.load_call(&sample_id, region, &mut report);
            }
            let [exon6, exon7] = calls;
            if self.manifest.is_none() && exon6.is_none() && exon7.is_none() {
                report.note(format!("{sample_id}: no call files, directory skipped"));
                continue;
            }
            for call in exon6.iter().chain(exon7.iter()) {
                if report.panel_fingerprint.is_empty() {
                    report.panel_version = call.panel_version().to_string();
                    report.panel_fingerprint = call.panel_fingerprint().to_string();
                } else if call.panel_fingerprint() != report.panel_fingerprint {
                    report.note(format!(
                        "{sample_id}/{}: panel fingerprint {} differs from run panel {}",
                        call.region(),
                        call.panel_fingerprint(),
                        report.panel_fingerprint
                    ));
                }
            }
            report.push(SampleResult::new(self.panel.as_ref(), sample_id, exon6, exon7))?;
        }
        if let Some(panel) = &self.panel {
            if !report.panel_fingerprint.is_empty()
                && panel.fingerprint() != report.panel_fingerprint
            {
                report.note(format!(
                    "calls were made with panel {}, combined with panel {}",
                    report.panel_fingerprint,
                    panel.fingerprint()
                ));
            }
        }

        if report.results().is_empty() {
            return Err(AggregateError::EmptyRun(self.root.clone()));
        }
        info!(
            samples = report.results().len(),
            anomalies = report.anomalies().len(),
            "collected call files"
        );
        Ok(report)
    }

    fn load_call(
        &self,
        sample_id: &str,
        region: Region,
        report: &mut AggregateReport,
    ) -> Option<PhenotypeCall> {
        let path = UnitPaths::new(&self.root, sample_id, region).call_file();
        if !path.is_file() {
            report.note(format!("{sample_id}/{region}: call file missing"));
            return None;
        }
        match read_call_file(&path) {
            Ok(call) if !self.manifest.as_ref().map_or(true, |m| m.accepts(call.run_id())) => {
                report.note(format!(
                    "{sample_id}/{region}: call file from another run ({}), ignored",
                    call.run_id().unwrap_or("no run id")
                ));
                None
            }
            Ok(call) if call.sample_id() != sample_id || call.region() != region => {
                report.note(format!(
                    "{sample_id}/{region}: call file belongs to {}/{}",
                    call.sample_id(),
                    call.region()
                ));
                Some(PhenotypeCall::failed(
                    sample_id,
                    region,
                    "call file identity mismatch",
                    call.panel_version(),
                    call.panel_fingerprint(),
                ))
            }
            Ok(call) => {
                if let CallOutcome::Failed { reason } = call.outcome() {
                    report.note(format!("{sample_id}/{region}: unit failed: {reason}"));
                }
                Some(call)
            }
            Err(err) => {
                report.note(format!("{sample_id}/{region}: unreadable call file: {err}"));
                Some(PhenotypeCall::failed(
                    sample_id,
                    region,
                    format!("unreadable call file: {err}"),
                    "",
                    "",
                ))
            }
        }
    }

    /// Write every report file into `out_dir`.
    pub fn write(
        &self,
        report: &AggregateReport,
        out_dir: &Path,
    ) -> Result<AggregateOutputs, AggregateError> {
        let outputs = AggregateOutputs {
            results_tsv: out_dir.join(layout::RESULTS_TSV),
            workbook: out_dir.join(layout::RESULTS_XLSX),
            export_csv: out_dir.join(layout::EXPORT_CSV),
            summary_json: out_dir.join(layout::SUMMARY_JSON),
            run_log: out_dir.join(layout::RUN_LOG),
        };
        let put = |path: &Path, bytes: &[u8]| {
            write_atomically(path, bytes).map_err(|source| AggregateError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        put(&outputs.results_tsv, render_results_tsv(report)?.as_bytes())?;
        put(&outputs.export_csv, render_export_csv(report)?.as_bytes())?;
        put(&outputs.summary_json, render_summary_json(report)?.as_bytes())?;
        put(&outputs.run_log, render_run_log(report).as_bytes())?;
        put(&outputs.workbook, &render_workbook(report)?)?;
        info!(
            out = %out_dir.display(),
            samples = report.results().len(),
            "wrote aggregate report"
        );
        Ok(outputs)
    }

    /// Collect and write in one step.
    pub fn run(
        &self,
        out_dir: &Path,
    ) -> Result<(AggregateReport, AggregateOutputs), AggregateError> {
        let report = self.collect()?;
        let outputs = self.write(&report, out_dir)?;
        Ok((report, outputs))
    }
}

/// Composite labels with their sample counts, sorted by label.
pub(crate) fn composite_counts(report: &AggregateReport) -> Vec<(String, usize)> {
    let labels: BTreeSet<String> = report
        .results()
        .iter()
        .map(|result| result.composite.label().to_string())
        .collect();
    labels
        .into_iter()
        .map(|label| {
            let count = report
                .results()
                .iter()
                .filter(|result| result.composite.label() == label)
                .count();
            (label, count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::write_call_file;

    fn resolved(sample: &str, region: Region, genotype: &str, phenotype: &str) -> PhenotypeCall {
        PhenotypeCall {
            sample_id: sample.to_string(),
            region,
            outcome: CallOutcome::Resolved {
                genotype: genotype.to_string(),
                phenotype: phenotype.to_string(),
            },
            flags: Vec::new(),
            supporting_sites: Vec::new(),
            site_calls: Vec::new(),
            coverage: None,
            decision_log: Vec::new(),
            panel_version: "v".into(),
            panel_fingerprint: "f".into(),
            run_id: None,
        }
    }

    fn with_outcome(sample: &str, region: Region, outcome: CallOutcome) -> PhenotypeCall {
        PhenotypeCall {
            outcome,
            ..resolved(sample, region, "", "")
        }
    }

    /// Composite and joint genotype of two resolved labels under the
    /// built-in combination table.
    fn joint(exon6: &str, exon7: &str) -> (String, Option<String>) {
        let panel = Panel::builtin().unwrap();
        let call = |region: Region, label: &str| {
            let phenotype = panel.region(region).unwrap().phenotype(label).unwrap();
            resolved("s", region, label, phenotype)
        };
        let (e6, e7) = (call(Region::Exon6, exon6), call(Region::Exon7, exon7));
        let result = SampleResult::new(Some(&panel), "s", Some(e6), Some(e7));
        (result.composite.to_string(), result.genotype().map(str::to_string))
    }

    #[test]
    fn concordant_regions_give_phenotype() {
        let e6 = resolved("s", Region::Exon6, "AO1", "A");
        let e7 = resolved("s", Region::Exon7, "AO1", "A");
        let joined = compose(None, Some(&e6), Some(&e7));
        assert_eq!(joined.composite, Composite::Phenotype("A".into()));
        assert_eq!(joined.genotype.as_deref(), Some("AO1"));
    }

    #[test]
    fn differing_phenotypes_are_discordant() {
        let e6 = resolved("s", Region::Exon6, "AO1", "A");
        let e7 = resolved("s", Region::Exon7, "BO1", "B");
        let result = SampleResult::new(None, "s", Some(e6), Some(e7));
        assert_eq!(result.composite, Composite::Discordant);
        assert_eq!(result.genotype(), None);
        assert_eq!(result.exon6.as_ref().unwrap().genotype(), Some("AO1"));
        assert_eq!(result.exon7.as_ref().unwrap().genotype(), Some("BO1"));
        assert!(result.flags.contains(&"discordant".to_string()));
    }

    #[test]
    fn region_labels_join_through_the_combination_table() {
        let expect = |genotype: &str, phenotype: &str| {
            (phenotype.to_string(), Some(genotype.to_string()))
        };
        assert_eq!(joint("O1/O1", "x/x"), expect("O1O1", "O"));
        assert_eq!(joint("O1/x", "x/x"), expect("AO1", "A"));
        assert_eq!(joint("O1/x", "B/x"), expect("BO1", "B"));
        assert_eq!(joint("O1/x", "O2/x"), expect("O1O2", "O"));
        assert_eq!(joint("O1/x", "O3/x"), expect("O1O3", "O"));
        assert_eq!(joint("x/x", "B/x"), expect("AB", "AB"));
        assert_eq!(joint("x/x", "x/x"), expect("AA", "A"));
        assert_eq!(joint("x/x", "B/O2"), expect("BO2", "B"));
    }

    #[test]
    fn pairs_outside_the_combination_table_are_discordant() {
        // Two O1 alleles leave no room for a B allele.
        assert_eq!(joint("O1/O1", "B/x"), ("discordant".to_string(), None));
        assert_eq!(joint("O1/x", "B/B"), ("discordant".to_string(), None));
        assert_eq!(joint("O1/O1", "O2/x"), ("discordant".to_string(), None));
    }

    #[test]
    fn precedence_of_unresolved_states() {
        let e6 = resolved("s", Region::Exon6, "AA", "A");
        let failed = with_outcome("s", Region::Exon7, CallOutcome::Failed { reason: "x".into() });
        let low = with_outcome("s", Region::Exon6, CallOutcome::InsufficientCoverage);
        let ambiguous =
            with_outcome("s", Region::Exon7, CallOutcome::Ambiguous { candidates: vec![] });
        let composite = |a, b| compose(None, a, b).composite;

        assert_eq!(composite(Some(&e6), None), Composite::Incomplete);
        assert_eq!(composite(Some(&low), Some(&failed)), Composite::Failed);
        assert_eq!(composite(Some(&low), Some(&ambiguous)), Composite::InsufficientCoverage);
        assert_eq!(composite(Some(&e6), Some(&ambiguous)), Composite::Ambiguous);
    }

    #[test]
    fn missing_region_is_flagged_incomplete() {
        let e6 = resolved("s", Region::Exon6, "O1/x", "A|B|O");
        let result = SampleResult::new(None, "s", Some(e6), None);
        assert_eq!(result.composite, Composite::Incomplete);
        assert!(result.exon7.is_none());
        assert_eq!(result.flags, vec!["incomplete:exon7".to_string()]);
    }

    #[test]
    fn reliability_tiers() {
        assert_eq!(Reliability::from_min_depth(None), Reliability::Unknown);
        assert_eq!(Reliability::from_min_depth(Some(20)), Reliability::VeryLow);
        assert_eq!(Reliability::from_min_depth(Some(21)), Reliability::Low);
        assert_eq!(Reliability::from_min_depth(Some(40)), Reliability::Low);
        assert_eq!(Reliability::from_min_depth(Some(41)), Reliability::Normal);
        assert_eq!(Reliability::from_min_depth(Some(500)), Reliability::Robust);
    }

    #[test]
    fn barcodes_come_from_the_sample_suffix() {
        assert_eq!(parse_barcode("IMM-24-1_barcode07"), Some("07".into()));
        assert_eq!(parse_barcode("IMM_barcodeX"), None);
        assert_eq!(parse_barcode("sample"), None);
    }

    #[test]
    fn duplicate_samples_are_rejected() {
        let mut report = AggregateReport::default();
        report.push(SampleResult::new(None, "s", None, None)).unwrap();
        assert!(matches!(
            report.push(SampleResult::new(None, "s", None, None)),
            Err(AggregateError::DuplicateSample(_))
        ));
    }

    #[test]
    fn collection_without_a_manifest_is_noted() {
        let dir = tempfile::tempdir().unwrap();
        for region in Region::ALL {
            let call = resolved("S01", region, "x/x", "A|O");
            write_call_file(&UnitPaths::new(dir.path(), "S01", region).call_file(), &call).unwrap();
        }
        let report = ResultAggregator::new(dir.path()).collect().unwrap();
        assert!(report.anomalies()[0].contains("completeness not checked"));
    }

    #[test]
    fn stale_call_files_are_ignored_under_a_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = RunManifest::new("v", "f", ["S01"]).with_run_id("run-2");
        let current = resolved("S01", Region::Exon6, "x/x", "A|AB|B|O").with_run_id("run-2");
        let stale = resolved("S01", Region::Exon7, "B/x", "AB|B").with_run_id("run-1");
        for call in [&current, &stale] {
            let path = UnitPaths::new(dir.path(), "S01", call.region()).call_file();
            write_call_file(&path, call).unwrap();
        }
        let report = ResultAggregator::new(dir.path())
            .with_manifest(manifest)
            .with_panel(Panel::builtin().unwrap())
            .collect()
            .unwrap();
        let result = &report.results()[0];
        assert_eq!(result.composite, Composite::Incomplete);
        assert!(result.exon7.is_none());
        assert!(report
            .anomalies()
            .iter()
            .any(|note| note == "S01/exon7: call file from another run (run-1), ignored"));
    }
}
