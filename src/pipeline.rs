//! End-to-end orchestration of `(sample, region)` units.
//!
//! Input layout is `<input>/<sample>/<region>/` holding one pileup (any file
//! whose name contains `pileup`, plain or gzipped) and optionally one
//! `samtools coverage` table (name contains `coverage`). Every sample directory
//! yields one unit per region; a region without a pileup still produces a
//! `failed` call so the run manifest can complete.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::{AggregateOutputs, AggregateReport, ResultAggregator, RunManifest};
use crate::caller::{write_call_file, CallStatus, GenotypeCaller, PhenotypeCall};
use crate::config::TypingConfig;
use crate::genomics::{
    read_site_table, write_atomically, write_frequency_table, write_polymorphism_log,
    write_site_table, CoverageSummary, DiagnosticSiteExtractor, ParsedPileup, PileupParser, Region,
    SiteExtraction,
};
use crate::layout::{self, UnitPaths};
use crate::panel::{Panel, RegionPanel};
use crate::TypingError;

/// Inputs located for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInputs {
    pub sample_id: String,
    pub region: Region,
    pub pileup: Option<PathBuf>,
    pub coverage: Option<PathBuf>,
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> TypingError + '_ {
    move |source| TypingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Sorted, non-hidden entries of `dir` matching `keep`.
fn sorted_entries(
    dir: &Path,
    keep: impl Fn(&fs::FileType) -> bool,
) -> Result<Vec<(String, PathBuf)>, TypingError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        let file_type = entry.file_type().map_err(io_error(dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !keep(&file_type) {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Locate every unit below `input_dir`, samples sorted by name and regions in
/// panel order.
pub fn discover_units(input_dir: &Path) -> Result<Vec<UnitInputs>, TypingError> {
    let mut units = Vec::new();
    for (sample_id, sample_dir) in sorted_entries(input_dir, fs::FileType::is_dir)? {
        for region in Region::ALL {
            let region_dir = sample_dir.join(region.label());
            let (pileup, coverage) = if region_dir.is_dir() {
                let files = sorted_entries(&region_dir, fs::FileType::is_file)?;
                let find = |needle: &str| {
                    files
                        .iter()
                        .find(|(name, _)| name.to_ascii_lowercase().contains(needle))
                        .map(|(_, path)| path.clone())
                };
                (find("pileup"), find("coverage"))
            } else {
                (None, None)
            };
            debug!(sample = %sample_id, %region, ?pileup, ?coverage, "discovered unit");
            units.push(UnitInputs {
                sample_id: sample_id.clone(),
                region,
                pileup,
                coverage,
            });
        }
    }
    if units.is_empty() {
        return Err(TypingError::NoUnits(input_dir.to_path_buf()));
    }
    Ok(units)
}

/// Discover units and build the manifest that lists them.
pub fn plan_run(
    panel: &Panel,
    input_dir: &Path,
) -> Result<(Vec<UnitInputs>, RunManifest), TypingError> {
    let units = discover_units(input_dir)?;
    let mut samples: Vec<&str> = units.iter().map(|unit| unit.sample_id.as_str()).collect();
    samples.dedup();
    let manifest = RunManifest::new(panel.version(), panel.fingerprint(), samples);
    Ok((units, manifest))
}

/// A parsed pileup together with the sites extracted from it.
#[derive(Debug, Clone)]
pub struct Quantification {
    pub parsed: ParsedPileup,
    pub extraction: SiteExtraction,
}

/// Parse a pileup and extract one region's diagnostic sites.
pub fn quantify(
    pileup: &Path,
    panel: &RegionPanel,
    config: &TypingConfig,
) -> Result<Quantification, TypingError> {
    let parsed = PileupParser::new()
        .with_depth_divergence_tolerance(config.depth_divergence_tolerance)
        .parse_path(pileup)?;
    let extraction = DiagnosticSiteExtractor::new(panel)
        .with_noise_threshold(config.noise_threshold)
        .extract(&parsed.records);
    info!(
        pileup = %pileup.display(),
        region = %panel.region,
        records = parsed.records.len(),
        skipped = parsed.skipped.len(),
        divergences = parsed.divergences.len(),
        polymorphisms = extraction.polymorphisms.len(),
        "quantified pileup"
    );
    Ok(Quantification { parsed, extraction })
}

/// Write the frequency table, site table and polymorphism log of a unit.
pub fn write_quantification(
    quantification: &Quantification,
    paths: &UnitPaths,
) -> Result<(), TypingError> {
    let mut frequencies = Vec::new();
    write_frequency_table(&mut frequencies, &quantification.parsed.records)?;
    let mut sites = Vec::new();
    write_site_table(&mut sites, &quantification.extraction.sites)?;
    let mut polymorphisms = Vec::new();
    write_polymorphism_log(&mut polymorphisms, &quantification.extraction.polymorphisms)?;

    for (path, bytes) in [
        (paths.frequency_table(), frequencies),
        (paths.site_table(), sites),
        (paths.polymorphism_log(), polymorphisms),
    ] {
        write_atomically(&path, &bytes).map_err(io_error(&path))?;
    }
    Ok(())
}

/// Parse-stage anomalies worth keeping next to the decision log.
fn parse_notes(parsed: &ParsedPileup) -> Vec<String> {
    let mut notes: Vec<String> = parsed
        .skipped
        .iter()
        .map(|skipped| {
            format!("pileup line {} skipped: {}", skipped.line_number, skipped.reason)
        })
        .collect();
    notes.extend(
        parsed
            .divergences
            .iter()
            .map(|divergence| format!("depth divergence: {divergence}")),
    );
    if parsed.unmapped_symbols > 0 {
        notes.push(format!("unmapped pileup symbols: {}", parsed.unmapped_symbols));
    }
    notes
}

/// Call a genotype from a site table and a coverage table on disk.
///
/// `region` falls back to the region recorded in the site table.
pub fn call_from_tables(
    panel: &Panel,
    config: &TypingConfig,
    sample_id: &str,
    region: Option<Region>,
    sites_path: &Path,
    coverage_path: &Path,
) -> Result<PhenotypeCall, TypingError> {
    let file = fs::File::open(sites_path).map_err(io_error(sites_path))?;
    let sites = read_site_table(file)?;
    let region = region
        .or_else(|| sites.first().map(|site| site.region))
        .ok_or_else(|| {
            TypingError::InvalidInput(format!(
                "{} has no sites and no region was given",
                sites_path.display()
            ))
        })?;
    let coverage = CoverageSummary::from_path(region, coverage_path)?;
    Ok(GenotypeCaller::new(panel, config.clone()).call(sample_id, region, &sites, &coverage)?)
}

/// Write a unit's call file and its decision log.
pub fn write_call_outputs(
    call: &PhenotypeCall,
    notes: &[String],
    paths: &UnitPaths,
) -> Result<(), TypingError> {
    let mut log = String::new();
    for line in notes.iter().chain(call.decision_log()) {
        log.push_str(line);
        log.push('\n');
    }
    let decision_log = paths.decision_log();
    write_atomically(&decision_log, log.as_bytes()).map_err(io_error(&decision_log))?;
    // Last, so a present call file means the unit is complete.
    write_call_file(&paths.call_file(), call)?;
    Ok(())
}

/// Runs single units against one panel and threshold set.
#[derive(Debug, Clone)]
pub struct UnitRunner<'a> {
    panel: &'a Panel,
    config: TypingConfig,
    out_root: PathBuf,
    run_id: Option<String>,
}

impl<'a> UnitRunner<'a> {
    pub fn new(panel: &'a Panel, config: TypingConfig, out_root: impl Into<PathBuf>) -> Self {
        Self {
            panel,
            config,
            out_root: out_root.into(),
            run_id: None,
        }
    }

    /// Stamp every call file with the id of the run it belongs to.
    pub fn with_run_id(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id;
        self
    }

    /// Run one unit and persist its outputs.
    ///
    /// Non-fatal errors become a `failed` call; only fatal ones are returned.
    pub fn run_unit(&self, unit: &UnitInputs) -> Result<PhenotypeCall, TypingError> {
        let paths = UnitPaths::new(&self.out_root, &unit.sample_id, unit.region);
        let mut notes = Vec::new();
        let call = match self.call_unit(unit, &paths, &mut notes) {
            Ok(call) => call,
            Err(err) if !err.is_fatal() => {
                warn!(sample = %unit.sample_id, region = %unit.region, "unit failed: {err}");
                PhenotypeCall::failed(
                    &unit.sample_id,
                    unit.region,
                    err.to_string(),
                    self.panel.version(),
                    self.panel.fingerprint(),
                )
            }
            Err(err) => return Err(err),
        };
        let call = match &self.run_id {
            Some(run_id) => call.with_run_id(run_id.as_str()),
            None => call,
        };
        write_call_outputs(&call, &notes, &paths)?;
        Ok(call)
    }

    fn call_unit(
        &self,
        unit: &UnitInputs,
        paths: &UnitPaths,
        notes: &mut Vec<String>,
    ) -> Result<PhenotypeCall, TypingError> {
        let pileup = unit.pileup.as_deref().ok_or_else(|| {
            TypingError::InvalidInput(format!("no pileup for {}/{}", unit.sample_id, unit.region))
        })?;
        let region_panel = self.panel.region(unit.region)?;
        let quantification = quantify(pileup, region_panel, &self.config)?;
        notes.extend(parse_notes(&quantification.parsed));
        write_quantification(&quantification, paths)?;

        let coverage = match &unit.coverage {
            Some(path) => CoverageSummary::from_path(unit.region, path)?,
            None => {
                notes.push("coverage derived from pileup records".to_string());
                CoverageSummary::from_records(unit.region, &quantification.parsed.records, 1)
            }
        };
        let caller = GenotypeCaller::new(self.panel, self.config.clone());
        let sites = &quantification.extraction.sites;
        Ok(caller.call(&unit.sample_id, unit.region, sites, &coverage)?)
    }
}

/// Outcome of a full `run`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub units: usize,
    pub failed_units: usize,
    pub report: AggregateReport,
    pub outputs: AggregateOutputs,
}

/// Run every unit under `input_dir` in parallel, then aggregate.
///
/// The manifest is written before any unit starts; aggregation only begins
/// once every unit has joined and the completed count matches it.
pub fn run_pipeline(
    panel: &Panel,
    config: &TypingConfig,
    input_dir: &Path,
    out_dir: &Path,
    threads: Option<usize>,
) -> Result<RunOutcome, TypingError> {
    let (units, manifest) = plan_run(panel, input_dir)?;
    manifest.write(&out_dir.join(layout::MANIFEST_FILE))?;

    let runner =
        UnitRunner::new(panel, config.clone(), out_dir).with_run_id(manifest.run_id.clone());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or(0))
        .build()?;
    info!(units = units.len(), threads = pool.current_num_threads(), "dispatching units");
    let results: Vec<Result<PhenotypeCall, TypingError>> =
        pool.install(|| units.par_iter().map(|unit| runner.run_unit(unit)).collect());

    let mut completed = 0;
    let mut failed_units = 0;
    for (unit, result) in units.iter().zip(results) {
        match result {
            Ok(call) => {
                completed += 1;
                if call.status() == CallStatus::Failed {
                    failed_units += 1;
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                let (sample, region) = (&unit.sample_id, unit.region);
                warn!(%sample, %region, "unit did not complete: {err}")
            }
        }
    }
    if completed != manifest.units.len() {
        return Err(TypingError::UnitCountMismatch {
            completed,
            expected: manifest.units.len(),
        });
    }

    let (report, outputs) = ResultAggregator::new(out_dir)
        .with_manifest(manifest)
        .with_panel(panel.clone())
        .run(out_dir)?;
    info!(
        units = completed,
        failed = failed_units,
        samples = report.results().len(),
        "run complete"
    );
    Ok(RunOutcome {
        units: completed,
        failed_units,
        report,
        outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn discovers_both_regions_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("S02/exon6/S02.exon6.pileup.gz"));
        touch(&dir.path().join("S02/exon6/S02.exon6.coverage.tsv"));
        touch(&dir.path().join("S01/exon7/reads.pileup"));
        fs::create_dir_all(dir.path().join(".hidden/exon6")).unwrap();

        let units = discover_units(dir.path()).unwrap();
        let keys: Vec<(&str, Region)> =
            units.iter().map(|u| (u.sample_id.as_str(), u.region)).collect();
        assert_eq!(
            keys,
            vec![
                ("S01", Region::Exon6),
                ("S01", Region::Exon7),
                ("S02", Region::Exon6),
                ("S02", Region::Exon7),
            ]
        );
        assert!(units[0].pileup.is_none());
        assert!(units[1].pileup.is_some());
        assert!(units[2].coverage.is_some());
        assert!(units[3].pileup.is_none());
    }

    #[test]
    fn empty_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_units(dir.path()).unwrap_err();
        assert!(matches!(err, TypingError::NoUnits(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_pileup_yields_failed_call_file() {
        let out = tempfile::tempdir().unwrap();
        let panel = Panel::builtin().unwrap();
        let runner = UnitRunner::new(&panel, TypingConfig::default(), out.path())
            .with_run_id(Some("run-7".to_string()));
        let unit = UnitInputs {
            sample_id: "S01".into(),
            region: Region::Exon6,
            pileup: None,
            coverage: None,
        };
        let call = runner.run_unit(&unit).unwrap();
        assert_eq!(call.status(), CallStatus::Failed);
        assert_eq!(call.run_id(), Some("run-7"));
        let path = UnitPaths::new(out.path(), "S01", Region::Exon6).call_file();
        assert_eq!(crate::caller::read_call_run_id(&path).as_deref(), Some("run-7"));
    }
}
