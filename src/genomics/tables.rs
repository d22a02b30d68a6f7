//! Tab-separated per-unit tables: nucleotide frequencies, diagnostic sites
//! and the polymorphism log.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::genomics::pileup::ratio;
use crate::genomics::statistics::PolymorphismEntry;
use crate::genomics::{Allele, Base, DiagnosticSite, PositionRecord, Region};

/// Errors reading or writing a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("table I/O failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("table I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid site table row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

fn fixed(value: f64) -> String {
    format!("{value:.4}")
}

fn tsv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer)
}

#[derive(Debug, Serialize)]
struct FrequencyRow<'a> {
    contig: &'a str,
    position: u32,
    ref_base: char,
    depth: u32,
    reported_depth: u32,
    #[serde(rename = "A")]
    a: u32,
    #[serde(rename = "C")]
    c: u32,
    #[serde(rename = "G")]
    g: u32,
    #[serde(rename = "T")]
    t: u32,
    ins: u32,
    del: u32,
    match_fraction: String,
    mismatch_fraction: String,
}

/// Write the per-position nucleotide frequency table.
pub fn write_frequency_table<W: Write>(
    writer: W,
    records: &[PositionRecord],
) -> Result<(), TableError> {
    let mut out = tsv_writer(writer);
    for record in records {
        let matching = record.reference().map_or(0, |base| record.count(base));
        out.serialize(FrequencyRow {
            contig: &record.contig,
            position: record.position,
            ref_base: char::from(record.reference_base),
            depth: record.depth,
            reported_depth: record.reported_depth,
            a: record.counts[0],
            c: record.counts[1],
            g: record.counts[2],
            t: record.counts[3],
            ins: record.insertion_count,
            del: record.deletion_count,
            match_fraction: fixed(ratio(matching, record.depth)),
            mismatch_fraction: fixed(ratio(record.depth - matching, record.depth)),
        })?;
    }
    if records.is_empty() {
        out.write_record([
            "contig",
            "position",
            "ref_base",
            "depth",
            "reported_depth",
            "A",
            "C",
            "G",
            "T",
            "ins",
            "del",
            "match_fraction",
            "mismatch_fraction",
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// One row of the diagnostic-site table. Fractions are informational; the
/// counts are what gets read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteTableRow {
    pub region: Region,
    pub site: String,
    pub contig: String,
    pub position: u32,
    pub reference: Base,
    pub variant: Allele,
    pub depth: u32,
    pub reported_depth: u32,
    pub accounted_depth: u32,
    #[serde(rename = "A")]
    pub a: u32,
    #[serde(rename = "C")]
    pub c: u32,
    #[serde(rename = "G")]
    pub g: u32,
    #[serde(rename = "T")]
    pub t: u32,
    pub del: u32,
    pub ins: u32,
    pub variant_fraction: String,
    pub reference_fraction: String,
    pub reference_mismatch: bool,
}

impl From<&DiagnosticSite> for SiteTableRow {
    fn from(site: &DiagnosticSite) -> Self {
        Self {
            region: site.region,
            site: site.site_name.clone(),
            contig: site.contig.clone(),
            position: site.position,
            reference: site.reference_allele,
            variant: site.variant_allele,
            depth: site.depth,
            reported_depth: site.reported_depth,
            accounted_depth: site.accounted_depth,
            a: site.counts[0],
            c: site.counts[1],
            g: site.counts[2],
            t: site.counts[3],
            del: site.deletion_count,
            ins: site.insertion_count,
            variant_fraction: fixed(site.variant_fraction()),
            reference_fraction: fixed(site.reference_fraction()),
            reference_mismatch: site.reference_mismatch,
        }
    }
}

impl SiteTableRow {
    fn into_site(self) -> DiagnosticSite {
        let counts = [self.a, self.c, self.g, self.t];
        DiagnosticSite {
            contig: self.contig,
            position: self.position,
            region: self.region,
            site_name: self.site,
            reference_allele: self.reference,
            variant_allele: self.variant,
            depth: counts.iter().sum(),
            counts,
            deletion_count: self.del,
            insertion_count: self.ins,
            reported_depth: self.reported_depth,
            accounted_depth: self.accounted_depth,
            reference_mismatch: self.reference_mismatch,
        }
    }
}

/// Write diagnostic sites in the given order.
pub fn write_site_table<W: Write>(writer: W, sites: &[DiagnosticSite]) -> Result<(), TableError> {
    let mut out = tsv_writer(writer);
    for site in sites {
        out.serialize(SiteTableRow::from(site))?;
    }
    out.flush()?;
    Ok(())
}

/// Read a diagnostic-site table written by [`write_site_table`].
///
/// The depth column must agree with the base counts.
pub fn read_site_table<R: Read>(reader: R) -> Result<Vec<DiagnosticSite>, TableError> {
    let mut input = csv::ReaderBuilder::new().delimiter(b'\t').from_reader(reader);
    let mut sites = Vec::new();
    for (idx, row) in input.deserialize::<SiteTableRow>().enumerate() {
        let row = row?;
        let declared = row.depth;
        let site = row.into_site();
        if site.depth != declared {
            return Err(TableError::InvalidRow {
                row: idx + 1,
                reason: format!("depth {declared} does not match base counts ({})", site.depth),
            });
        }
        sites.push(site);
    }
    Ok(sites)
}

#[derive(Debug, Serialize)]
struct PolymorphismRow<'a> {
    contig: &'a str,
    position: u32,
    ref_base: char,
    depth: u32,
    dominant_allele: String,
    dominant_fraction: String,
    #[serde(rename = "A")]
    a: String,
    #[serde(rename = "C")]
    c: String,
    #[serde(rename = "G")]
    g: String,
    #[serde(rename = "T")]
    t: String,
    del: String,
    ins: String,
}

/// Write the polymorphism log.
pub fn write_polymorphism_log<W: Write>(
    writer: W,
    entries: &[PolymorphismEntry],
) -> Result<(), TableError> {
    let mut out = tsv_writer(writer);
    for entry in entries {
        out.serialize(PolymorphismRow {
            contig: &entry.contig,
            position: entry.position,
            ref_base: entry.reference_base,
            depth: entry.depth,
            dominant_allele: entry.dominant.allele.to_string(),
            dominant_fraction: fixed(entry.dominant.fraction),
            a: fixed(entry.fractions[0]),
            c: fixed(entry.fractions[1]),
            g: fixed(entry.fractions[2]),
            t: fixed(entry.fractions[3]),
            del: fixed(entry.deletion_fraction),
            ins: fixed(entry.insertion_fraction),
        })?;
    }
    if entries.is_empty() {
        out.write_record([
            "contig",
            "position",
            "ref_base",
            "depth",
            "dominant_allele",
            "dominant_fraction",
            "A",
            "C",
            "G",
            "T",
            "del",
            "ins",
        ])?;
    }
    out.flush()?;
    Ok(())
}
