use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::genomics::io::open_text_reader;
use crate::genomics::{PositionRecord, Region};

/// Region-level coverage, as produced by `samtools coverage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Region the summary describes.
    pub region: Region,
    /// Mean depth over the region.
    pub mean_depth: f64,
    /// Percent of region positions covered.
    pub breadth: f64,
    /// Reads overlapping the region, when known.
    pub num_reads: Option<u64>,
}

/// Errors reading a coverage table.
#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("failed to read coverage table: {0}")]
    Io(#[from] std::io::Error),
    #[error("coverage table has no header line")]
    MissingHeader,
    #[error("coverage table header lacks a '{0}' column")]
    MissingColumn(&'static str),
    #[error("coverage table has no data row")]
    MissingRow,
    #[error("invalid value '{value}' in coverage column '{column}'")]
    InvalidValue { column: &'static str, value: String },
}

impl CoverageSummary {
    /// Read the first data row of a `samtools coverage` table.
    pub fn from_path(region: Region, path: &Path) -> Result<Self, CoverageError> {
        let reader = open_text_reader(path)?;
        Self::from_reader(region, reader)
    }

    /// Parse a `samtools coverage` table. Columns are located by header
    /// name, ignoring case and a leading `#`.
    pub fn from_reader<R: BufRead>(region: Region, reader: R) -> Result<Self, CoverageError> {
        let mut lines = reader.lines();
        let header = loop {
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(CoverageError::MissingHeader),
            }
        };
        let columns: Vec<String> = header
            .trim_end_matches('\r')
            .split('\t')
            .map(|name| name.trim().trim_start_matches('#').to_ascii_lowercase())
            .collect();
        let locate = |name: &'static str| {
            columns
                .iter()
                .position(|column| column == name)
                .ok_or(CoverageError::MissingColumn(name))
        };
        let breadth_col = locate("coverage")?;
        let depth_col = locate("meandepth")?;
        let reads_col = columns.iter().position(|column| column == "numreads");

        let row = loop {
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() && !line.starts_with('#') {
                        break line;
                    }
                }
                None => return Err(CoverageError::MissingRow),
            }
        };
        let fields: Vec<&str> = row.trim_end_matches('\r').split('\t').collect();
        let parse_f64 = |index: usize, column: &'static str| -> Result<f64, CoverageError> {
            let raw = column_value(&fields, index, column)?;
            raw.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| CoverageError::InvalidValue {
                    column,
                    value: raw.to_string(),
                })
        };

        let breadth = parse_f64(breadth_col, "coverage")?;
        let mean_depth = parse_f64(depth_col, "meandepth")?;
        let num_reads = match reads_col {
            Some(index) => {
                let raw = column_value(&fields, index, "numreads")?;
                Some(raw.parse::<u64>().map_err(|_| CoverageError::InvalidValue {
                    column: "numreads",
                    value: raw.to_string(),
                })?)
            }
            None => None,
        };

        Ok(Self {
            region,
            mean_depth,
            breadth,
            num_reads,
        })
    }

    /// Derive coverage from pileup records when no coverage table exists.
    /// Breadth is the percent of records with at least `min_depth` usable
    /// reads.
    pub fn from_records(region: Region, records: &[PositionRecord], min_depth: u32) -> Self {
        if records.is_empty() {
            return Self {
                region,
                mean_depth: 0.0,
                breadth: 0.0,
                num_reads: None,
            };
        }
        let total: u64 = records.iter().map(|record| u64::from(record.depth)).sum();
        let covered = records
            .iter()
            .filter(|record| record.depth >= min_depth.max(1))
            .count();
        let count = records.len() as f64;
        Self {
            region,
            mean_depth: total as f64 / count,
            breadth: covered as f64 * 100.0 / count,
            num_reads: None,
        }
    }

    /// Whether both depth and breadth meet the given minimums.
    pub fn passes(&self, min_mean_depth: f64, min_breadth: f64) -> bool {
        self.breadth >= min_breadth && self.mean_depth >= min_mean_depth
    }
}

fn column_value<'a>(
    fields: &[&'a str],
    index: usize,
    column: &'static str,
) -> Result<&'a str, CoverageError> {
    fields
        .get(index)
        .map(|value| value.trim())
        .ok_or(CoverageError::InvalidValue {
            column,
            value: String::new(),
        })
}
