//! Persisted form of a [`PhenotypeCall`]: `##key<TAB>value` header lines
//! followed by a tab-separated per-site table.
//!
//! ```text
//! ##abotyper-call	1
//! ##sample_id	S01_barcode01
//! ##region	exon6
//! ##status	resolved
//! ...
//! site	position	class	variant_fraction	reference_fraction	depth	reason
//! c.261	22	heterozygous	0.5000	0.5000	40	vaf 0.5000 >= dominant 0.50, ...
//! ```

use std::fmt::Write as _;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caller::{CallFlag, CallOutcome, CallStatus, PhenotypeCall, SiteCall, SiteClass};
use crate::genomics::{write_atomically, CoverageSummary, Region};

const MAGIC: &str = "abotyper-call";
const FORMAT_VERSION: &str = "1";

/// Errors reading or writing call files.
#[derive(Debug, Error)]
pub enum CallFileError {
    #[error("call file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("call file site table is invalid: {0}")]
    Csv(#[from] csv::Error),
    #[error("not a call file (missing ##{MAGIC} header)")]
    NotACallFile,
    #[error("call file lacks the '{0}' header")]
    MissingHeader(&'static str),
    #[error("call file header '{key}' has invalid value '{value}'")]
    InvalidHeader { key: String, value: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct CallSiteRow {
    site: String,
    position: u32,
    class: String,
    variant_fraction: String,
    reference_fraction: String,
    depth: u32,
    reason: String,
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// Render a call in call-file form.
pub fn render_call_file(call: &PhenotypeCall) -> Result<String, CallFileError> {
    let mut out = String::new();
    let mut header = |key: &str, value: &str| {
        let _ = writeln!(out, "##{key}\t{value}");
    };
    header(MAGIC, FORMAT_VERSION);
    header("sample_id", call.sample_id());
    header("region", call.region().label());
    header("status", call.status().label());
    header("genotype", call.genotype().unwrap_or(""));
    header("phenotype", call.phenotype().unwrap_or(""));
    header("candidates", &call.candidates().join(","));
    if let CallOutcome::Failed { reason } = call.outcome() {
        header("reason", reason);
    }
    header("flags", &join(call.flags()));
    header("supporting_sites", &call.supporting_sites().join(","));
    if let Some(coverage) = call.coverage() {
        header("mean_depth", &coverage.mean_depth.to_string());
        header("breadth", &coverage.breadth.to_string());
        header(
            "num_reads",
            &coverage.num_reads.map(|n| n.to_string()).unwrap_or_default(),
        );
    }
    header("panel_version", call.panel_version());
    header("panel_fingerprint", call.panel_fingerprint());
    if let Some(run_id) = call.run_id() {
        header("run_id", run_id);
    }
    for line in call.decision_log() {
        header("log", line);
    }

    let mut table = csv::WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
    for site in call.site_calls() {
        table.serialize(CallSiteRow {
            site: site.site_name.clone(),
            position: site.position,
            class: site.class.label().to_string(),
            variant_fraction: format!("{:.4}", site.variant_fraction),
            reference_fraction: format!("{:.4}", site.reference_fraction),
            depth: site.depth,
            reason: site.reason.clone(),
        })?;
    }
    if call.site_calls().is_empty() {
        table.write_record([
            "site",
            "position",
            "class",
            "variant_fraction",
            "reference_fraction",
            "depth",
            "reason",
        ])?;
    }
    let bytes = table.into_inner().map_err(|err| err.into_error())?;
    out.push_str(&String::from_utf8_lossy(&bytes));
    Ok(out)
}

/// Write a call file atomically.
pub fn write_call_file(path: &Path, call: &PhenotypeCall) -> Result<(), CallFileError> {
    let text = render_call_file(call)?;
    write_atomically(path, text.as_bytes())?;
    Ok(())
}

/// Read a call file.
pub fn read_call_file(path: &Path) -> Result<PhenotypeCall, CallFileError> {
    let file = std::fs::File::open(path)?;
    parse_call_file(BufReader::new(file))
}

/// Run id recorded in a call file's header, without parsing the rest.
///
/// `None` when the file cannot be read, is not a call file, or was written
/// outside a run.
pub fn read_call_run_id(path: &Path) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let mut lines = BufReader::new(file).lines();
    let first = lines.next()?.ok()?;
    if !first.starts_with(&format!("##{MAGIC}\t")) {
        return None;
    }
    for line in lines {
        let line = line.ok()?;
        let rest = line.strip_prefix("##")?;
        if let Some(run_id) = rest.strip_prefix("run_id\t") {
            return Some(run_id.trim_end_matches('\r').to_string());
        }
    }
    None
}

fn invalid(key: &str, value: &str) -> CallFileError {
    CallFileError::InvalidHeader {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn parse_call_file<R: BufRead>(reader: R) -> Result<PhenotypeCall, CallFileError> {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut table = String::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("##") {
            let (key, value) = rest.split_once('\t').unwrap_or((rest, ""));
            headers.push((key.to_string(), value.to_string()));
        } else if !line.is_empty() {
            table.push_str(line);
            table.push('\n');
        }
    }

    if headers.first().map(|(key, _)| key.as_str()) != Some(MAGIC) {
        return Err(CallFileError::NotACallFile);
    }
    let get = |key: &'static str| {
        headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    let require = |key: &'static str| get(key).ok_or(CallFileError::MissingHeader(key));

    let sample_id = require("sample_id")?.to_string();
    let region_raw = require("region")?;
    let region: Region = region_raw.parse().map_err(|_| invalid("region", region_raw))?;
    let status_raw = require("status")?;
    let status: CallStatus = status_raw.parse().map_err(|_| invalid("status", status_raw))?;

    let outcome = match status {
        CallStatus::Resolved => {
            let genotype = require("genotype")?;
            let phenotype = require("phenotype")?;
            if genotype.is_empty() || phenotype.is_empty() {
                return Err(invalid("genotype", genotype));
            }
            CallOutcome::Resolved {
                genotype: genotype.to_string(),
                phenotype: phenotype.to_string(),
            }
        }
        CallStatus::Ambiguous => CallOutcome::Ambiguous {
            candidates: split_list(get("candidates").unwrap_or("")),
        },
        CallStatus::InsufficientCoverage => CallOutcome::InsufficientCoverage,
        CallStatus::Failed => CallOutcome::Failed {
            reason: get("reason").unwrap_or("").to_string(),
        },
    };

    let flags = split_list(get("flags").unwrap_or(""))
        .into_iter()
        .map(|flag| flag.parse::<CallFlag>().map_err(|_| invalid("flags", &flag)))
        .collect::<Result<Vec<_>, _>>()?;

    let coverage = match (get("mean_depth"), get("breadth")) {
        (Some(depth), Some(breadth)) => Some(CoverageSummary {
            region,
            mean_depth: depth.parse().map_err(|_| invalid("mean_depth", depth))?,
            breadth: breadth.parse().map_err(|_| invalid("breadth", breadth))?,
            num_reads: match get("num_reads").unwrap_or("") {
                "" => None,
                raw => Some(raw.parse().map_err(|_| invalid("num_reads", raw))?),
            },
        }),
        _ => None,
    };

    let mut site_calls = Vec::new();
    if !table.is_empty() {
        let mut rows = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(table.as_bytes());
        for row in rows.deserialize::<CallSiteRow>() {
            let row = row?;
            let class: SiteClass = row.class.parse().map_err(|_| invalid("class", &row.class))?;
            site_calls.push(SiteCall {
                variant_fraction: row
                    .variant_fraction
                    .parse()
                    .map_err(|_| invalid("variant_fraction", &row.variant_fraction))?,
                reference_fraction: row
                    .reference_fraction
                    .parse()
                    .map_err(|_| invalid("reference_fraction", &row.reference_fraction))?,
                site_name: row.site,
                position: row.position,
                class,
                depth: row.depth,
                reason: row.reason,
            });
        }
    }

    Ok(PhenotypeCall {
        sample_id,
        region,
        outcome,
        flags,
        supporting_sites: split_list(get("supporting_sites").unwrap_or("")),
        site_calls,
        coverage,
        decision_log: headers
            .iter()
            .filter(|(key, _)| key == "log")
            .map(|(_, value)| value.clone())
            .collect(),
        panel_version: get("panel_version").unwrap_or("").to_string(),
        panel_fingerprint: get("panel_fingerprint").unwrap_or("").to_string(),
        run_id: get("run_id").map(str::to_string),
    })
}
