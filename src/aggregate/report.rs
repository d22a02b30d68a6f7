use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{composite_counts, AggregateError, AggregateReport, SampleResult};
use crate::caller::{CallOutcome, PhenotypeCall};
use crate::genomics::Region;

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, AggregateError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| AggregateError::Csv(csv::Error::from(err.into_error())))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Default, Serialize)]
struct RegionColumns {
    status: String,
    genotype: String,
    phenotype: String,
    flags: String,
}

impl RegionColumns {
    fn from_call(call: Option<&PhenotypeCall>) -> Self {
        match call {
            None => Self::default(),
            Some(call) => Self {
                status: call.status().label().to_string(),
                genotype: call
                    .genotype()
                    .map(str::to_string)
                    .unwrap_or_else(|| call.candidates().join("|")),
                phenotype: call.phenotype().unwrap_or("").to_string(),
                flags: join(call.flags()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ResultRow {
    sample_id: String,
    barcode: String,
    exon6_status: String,
    exon6_genotype: String,
    exon6_phenotype: String,
    exon6_flags: String,
    exon7_status: String,
    exon7_genotype: String,
    exon7_phenotype: String,
    exon7_flags: String,
    composite_phenotype: String,
    genotype: String,
    reliability: String,
    min_depth: String,
    flags: String,
}

impl From<&SampleResult> for ResultRow {
    fn from(result: &SampleResult) -> Self {
        let e6 = RegionColumns::from_call(result.call(Region::Exon6));
        let e7 = RegionColumns::from_call(result.call(Region::Exon7));
        Self {
            sample_id: result.sample_id.clone(),
            barcode: result.barcode.clone().unwrap_or_default(),
            exon6_status: e6.status,
            exon6_genotype: e6.genotype,
            exon6_phenotype: e6.phenotype,
            exon6_flags: e6.flags,
            exon7_status: e7.status,
            exon7_genotype: e7.genotype,
            exon7_phenotype: e7.phenotype,
            exon7_flags: e7.flags,
            composite_phenotype: result.composite.label().to_string(),
            genotype: result.genotype().unwrap_or_default().to_string(),
            reliability: result.reliability.label().to_string(),
            min_depth: result.min_depth.map(|d| d.to_string()).unwrap_or_default(),
            flags: join(&result.flags),
        }
    }
}

/// `ABO_result.tsv`: one row per sample. Unavailable region calls leave
/// their columns blank.
pub fn render_results_tsv(report: &AggregateReport) -> Result<String, AggregateError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
    for result in report.results() {
        writer.serialize(ResultRow::from(result))?;
    }
    finish(writer)
}

/// Split a genotype such as `AO1` or `O1vO1v` into its two alleles.
pub(crate) fn split_genotype(genotype: &str) -> Option<(String, String)> {
    let starts: Vec<usize> = genotype
        .char_indices()
        .filter(|(_, c)| c.is_ascii_uppercase())
        .map(|(idx, _)| idx)
        .collect();
    if starts.len() != 2 || starts[0] != 0 {
        return None;
    }
    let (first, second) = genotype.split_at(starts[1]);
    Some((first.to_string(), second.to_string()))
}

#[derive(Debug, Serialize)]
struct ExportRow {
    #[serde(rename = "Sample ID")]
    sample_id: String,
    #[serde(rename = "ABO Geno Type1")]
    geno_type1: String,
    #[serde(rename = "ABO Geno Type2")]
    geno_type2: String,
    #[serde(rename = "ABO Pheno Type")]
    phenotype: String,
    #[serde(rename = "Blood Type")]
    blood_type: String,
    #[serde(rename = "#Reads")]
    reads: String,
}

/// `final_export.csv`: LIS-style summary.
pub fn render_export_csv(report: &AggregateReport) -> Result<String, AggregateError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for result in report.results() {
        let (geno_type1, geno_type2) = result
            .genotype()
            .and_then(split_genotype)
            .unwrap_or_default();
        let phenotype = result.composite.label().to_string();
        writer.serialize(ExportRow {
            sample_id: result.sample_id.clone(),
            geno_type1,
            geno_type2,
            blood_type: phenotype.clone(),
            phenotype,
            reads: result.mean_depth().map(|d| format!("{d:.1}")).unwrap_or_default(),
        })?;
    }
    finish(writer)
}

#[derive(Debug, Serialize)]
struct RegionSummary<'a> {
    status: &'a str,
    genotype: Option<&'a str>,
    phenotype: Option<&'a str>,
    candidates: &'a [String],
    flags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SampleSummary<'a> {
    sample_id: &'a str,
    barcode: Option<&'a str>,
    composite: &'a str,
    genotype: Option<&'a str>,
    reliability: &'a str,
    min_depth: Option<u32>,
    exon6: Option<RegionSummary<'a>>,
    exon7: Option<RegionSummary<'a>>,
    flags: &'a [String],
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    panel_version: &'a str,
    panel_fingerprint: &'a str,
    samples: usize,
    composites: BTreeMap<String, usize>,
    anomalies: &'a [String],
    results: Vec<SampleSummary<'a>>,
}

fn region_summary(call: Option<&PhenotypeCall>) -> Option<RegionSummary<'_>> {
    call.map(|call| RegionSummary {
        status: call.status().label(),
        genotype: call.genotype(),
        phenotype: call.phenotype(),
        candidates: call.candidates(),
        flags: call.flags().iter().map(ToString::to_string).collect(),
    })
}

/// `summary.json`.
pub fn render_summary_json(report: &AggregateReport) -> Result<String, AggregateError> {
    let summary = RunSummary {
        panel_version: &report.panel_version,
        panel_fingerprint: &report.panel_fingerprint,
        samples: report.results().len(),
        composites: composite_counts(report).into_iter().collect(),
        anomalies: report.anomalies(),
        results: report
            .results()
            .iter()
            .map(|result| SampleSummary {
                sample_id: &result.sample_id,
                barcode: result.barcode.as_deref(),
                composite: result.composite.label(),
                genotype: result.genotype(),
                reliability: result.reliability.label(),
                min_depth: result.min_depth,
                exon6: region_summary(result.call(Region::Exon6)),
                exon7: region_summary(result.call(Region::Exon7)),
                flags: &result.flags,
            })
            .collect(),
    };
    let mut json = serde_json::to_string_pretty(&summary)?;
    json.push('\n');
    Ok(json)
}

/// `run.log`: every anomaly and every flagged sample, in report order.
pub fn render_run_log(report: &AggregateReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "panel\t{}\t{}\n",
        report.panel_version, report.panel_fingerprint
    ));
    out.push_str(&format!("samples\t{}\n", report.results().len()));
    for anomaly in report.anomalies() {
        out.push_str(&format!("anomaly\t{anomaly}\n"));
    }
    for result in report.results() {
        for flag in &result.flags {
            out.push_str(&format!("flag\t{}\t{flag}\n", result.sample_id));
        }
        let calls = [result.call(Region::Exon6), result.call(Region::Exon7)];
        for call in calls.into_iter().flatten() {
            if let CallOutcome::Failed { reason } = call.outcome() {
                out.push_str(&format!(
                    "failure\t{}\t{}\t{reason}\n",
                    result.sample_id,
                    call.region()
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genotypes_split_at_allele_boundaries() {
        assert_eq!(split_genotype("AO1"), Some(("A".into(), "O1".into())));
        assert_eq!(split_genotype("O1O3"), Some(("O1".into(), "O3".into())));
        assert_eq!(split_genotype("A1O1"), Some(("A1".into(), "O1".into())));
        assert_eq!(split_genotype("O1vO1v"), Some(("O1v".into(), "O1v".into())));
        assert_eq!(split_genotype("BB"), Some(("B".into(), "B".into())));
        assert_eq!(split_genotype("O1/x"), None);
        assert_eq!(split_genotype("AAB"), None);
    }

    #[test]
    fn empty_report_renders_headerless_tables() {
        let report = AggregateReport::default();
        assert_eq!(render_results_tsv(&report).unwrap(), "");
        assert!(render_summary_json(&report).unwrap().contains("\"samples\": 0"));
        assert_eq!(render_run_log(&report), "panel\t\t\nsamples\t0\n");
    }
}
