use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::genomics::io::open_text_reader;
use crate::genomics::{Allele, Base, NUM_BASES};

/// Minimum number of tab-separated fields on a pileup line.
const MIN_FIELDS: usize = 6;

/// Nucleotide tally for one reference position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    /// Reference contig name.
    pub contig: Arc<str>,
    /// Reference coordinate (1-based).
    pub position: u32,
    /// Uppercase reference base as reported by the pileup.
    pub reference_base: u8,
    /// Per-base observation counts [A, C, G, T].
    pub counts: [u32; NUM_BASES],
    /// Usable depth: the sum of `counts`.
    pub depth: u32,
    /// Reads carrying an insertion after this base.
    pub insertion_count: u32,
    /// Deletion placeholders (`*`, `#`): reads whose deletion spans this base.
    pub deletion_count: u32,
    /// Reads whose deletion starts after this base (`-<n><seq>`).
    pub deletion_start_count: u32,
    /// Reads reporting an ambiguous base.
    pub ambiguous_count: u32,
    /// Reads spanning this base without a base call (deletions, reference skips).
    pub placeholder_count: u32,
    /// Depth column as written by the upstream tool.
    pub reported_depth: u32,
}

impl PositionRecord {
    pub(crate) fn new(
        contig: Arc<str>,
        position: u32,
        reference_base: u8,
        reported_depth: u32,
    ) -> Self {
        Self {
            contig,
            position,
            reference_base: reference_base.to_ascii_uppercase(),
            counts: [0; NUM_BASES],
            depth: 0,
            insertion_count: 0,
            deletion_count: 0,
            deletion_start_count: 0,
            ambiguous_count: 0,
            placeholder_count: 0,
            reported_depth,
        }
    }

    pub(crate) fn observe(&mut self, base: Base) {
        self.counts[base.index()] += 1;
        self.depth += 1;
    }

    /// Reference base, if it is one of A/C/G/T.
    pub fn reference(&self) -> Option<Base> {
        Base::from_ascii(self.reference_base)
    }

    /// Observations of `base`.
    pub fn count(&self, base: Base) -> u32 {
        self.counts[base.index()]
    }

    /// Fraction of usable depth supporting `base` (0 when depth is 0).
    pub fn fraction(&self, base: Base) -> f64 {
        ratio(self.count(base), self.depth)
    }

    /// Fractions for [A, C, G, T].
    pub fn fractions(&self) -> [f64; NUM_BASES] {
        Base::ALL.map(|base| self.fraction(base))
    }

    /// Deletions over all reads that either called a base or carried a deletion.
    pub fn deletion_fraction(&self) -> f64 {
        ratio(self.deletion_count, self.depth + self.deletion_count)
    }

    /// Insertions over usable depth, capped at 1.
    pub fn insertion_fraction(&self) -> f64 {
        ratio(self.insertion_count, self.depth).min(1.0)
    }

    /// Fraction supporting an arbitrary allele.
    pub fn allele_fraction(&self, allele: Allele) -> f64 {
        match allele {
            Allele::Base(base) => self.fraction(base),
            Allele::Deletion => self.deletion_fraction(),
            Allele::Insertion => self.insertion_fraction(),
        }
    }

    /// Reads accounted for by the tally, comparable with `reported_depth`.
    pub fn accounted_depth(&self) -> u32 {
        self.depth + self.ambiguous_count + self.placeholder_count
    }
}

pub(crate) fn ratio(count: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(count) / f64::from(total)
    }
}

/// Line that was skipped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the input stream.
    pub line_number: usize,
    /// Why the line was rejected.
    pub reason: LineError,
}

/// Reasons a pileup line is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// Too few tab-separated fields.
    #[error("expected at least {MIN_FIELDS} fields, found {0}")]
    FieldCount(usize),
    /// Position column is not a positive integer.
    #[error("invalid position '{0}'")]
    InvalidPosition(String),
    /// Depth column is not a non-negative integer.
    #[error("invalid depth '{0}'")]
    InvalidDepth(String),
    /// Reference base column is empty.
    #[error("missing reference base")]
    MissingReference,
    /// Position does not increase within its contig.
    #[error("position {position} on {contig} does not follow {previous}")]
    OutOfOrder {
        /// Contig of the offending line.
        contig: String,
        /// Position of the offending line.
        position: u32,
        /// Last accepted position on the same contig.
        previous: u32,
    },
}

/// Disagreement between the reported depth column and the recomputed tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthDivergence {
    /// Contig of the position.
    pub contig: Arc<str>,
    /// Position (1-based).
    pub position: u32,
    /// Depth column value.
    pub reported: u32,
    /// Reads accounted for by the tally.
    pub accounted: u32,
}

impl fmt::Display for DepthDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} reported depth {} but {} reads accounted for",
            self.contig, self.position, self.reported, self.accounted
        )
    }
}

/// Result of parsing one pileup stream.
#[derive(Debug, Clone, Default)]
pub struct ParsedPileup {
    /// One record per accepted line, in input order.
    pub records: Vec<PositionRecord>,
    /// Rejected lines with reasons.
    pub skipped: Vec<SkippedLine>,
    /// Positions whose reported depth diverged from the tally.
    pub divergences: Vec<DepthDivergence>,
    /// Symbols in `read_bases` with no defined meaning.
    pub unmapped_symbols: u64,
}

/// Errors that abort parsing of a whole stream.
#[derive(Debug, Error)]
pub enum PileupError {
    /// Underlying reader failed.
    #[error("failed to read pileup: {0}")]
    Io(#[from] std::io::Error),
    /// Every non-blank line was rejected.
    #[error(
        "malformed pileup: all {lines} lines were unparsable (line {first_line}: {first_reason})"
    )]
    Malformed {
        /// Number of non-blank lines seen.
        lines: usize,
        /// First rejected line.
        first_line: usize,
        /// Reason for the first rejection.
        first_reason: LineError,
    },
}

/// Converts samtools-style pileup text into [`PositionRecord`]s.
#[derive(Debug, Clone)]
pub struct PileupParser {
    depth_divergence_tolerance: f64,
}

impl Default for PileupParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PileupParser {
    /// Create a parser with a 10% depth divergence tolerance.
    pub fn new() -> Self {
        Self {
            depth_divergence_tolerance: 0.10,
        }
    }

    /// Set the relative difference between reported and recomputed depth
    /// beyond which a position is recorded as divergent.
    pub fn with_depth_divergence_tolerance(mut self, tolerance: f64) -> Self {
        self.depth_divergence_tolerance = tolerance.max(0.0);
        self
    }

    /// Parse a plain or gzip-compressed pileup file.
    pub fn parse_path(&self, path: &Path) -> Result<ParsedPileup, PileupError> {
        let reader = open_text_reader(path)?;
        let parsed = self.parse_reader(reader)?;
        info!(
            path = %path.display(),
            records = parsed.records.len(),
            skipped = parsed.skipped.len(),
            divergent = parsed.divergences.len(),
            "parsed pileup"
        );
        Ok(parsed)
    }

    /// Parse a pileup stream.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<ParsedPileup, PileupError> {
        let mut parsed = ParsedPileup::default();
        let mut last_position: HashMap<Arc<str>, u32> = HashMap::new();
        let mut current_contig: Option<Arc<str>> = None;
        let mut non_blank = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            non_blank += 1;

            let outcome =
                self.parse_line(&line, &mut current_contig)
                    .and_then(|(record, unmapped)| match last_position.get(&record.contig) {
                        Some(&previous) if record.position <= previous => {
                            Err(LineError::OutOfOrder {
                                contig: record.contig.to_string(),
                                position: record.position,
                                previous,
                            })
                        }
                        _ => Ok((record, unmapped)),
                    });

            match outcome {
                Ok((record, unmapped)) => {
                    last_position.insert(Arc::clone(&record.contig), record.position);
                    parsed.unmapped_symbols += unmapped;
                    if let Some(divergence) = self.check_depth(&record) {
                        warn!("depth divergence at {divergence}");
                        parsed.divergences.push(divergence);
                    }
                    parsed.records.push(record);
                }
                Err(reason) => {
                    warn!(line = line_number, "skipping pileup line: {reason}");
                    parsed.skipped.push(SkippedLine { line_number, reason });
                }
            }
        }

        if parsed.records.is_empty() {
            if let Some(first) = parsed.skipped.first() {
                return Err(PileupError::Malformed {
                    lines: non_blank,
                    first_line: first.line_number,
                    first_reason: first.reason.clone(),
                });
            }
        }

        if parsed.unmapped_symbols > 0 {
            debug!(count = parsed.unmapped_symbols, "ignored unmapped pileup symbols");
        }

        Ok(parsed)
    }

    fn parse_line(
        &self,
        line: &str,
        current_contig: &mut Option<Arc<str>>,
    ) -> Result<(PositionRecord, u64), LineError> {
        let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
        if fields.len() < MIN_FIELDS {
            return Err(LineError::FieldCount(fields.len()));
        }

        let position: u32 = fields[1]
            .trim()
            .parse()
            .ok()
            .filter(|&pos| pos > 0)
            .ok_or_else(|| LineError::InvalidPosition(fields[1].to_string()))?;
        let reported_depth: u32 = fields[3]
            .trim()
            .parse()
            .map_err(|_| LineError::InvalidDepth(fields[3].to_string()))?;
        let reference_base = *fields[2]
            .trim()
            .as_bytes()
            .first()
            .ok_or(LineError::MissingReference)?;

        let contig = match current_contig {
            Some(existing) if existing.as_ref() == fields[0] => Arc::clone(existing),
            _ => {
                let fresh: Arc<str> = Arc::from(fields[0]);
                *current_contig = Some(Arc::clone(&fresh));
                fresh
            }
        };

        let mut record = PositionRecord::new(contig, position, reference_base, reported_depth);
        let read_bases = fields[4].as_bytes();
        let zero_coverage = reported_depth == 0 && (read_bases.is_empty() || read_bases == b"*");
        let unmapped = if zero_coverage {
            0
        } else {
            tally_read_bases(read_bases, &mut record)
        };

        Ok((record, unmapped))
    }

    fn check_depth(&self, record: &PositionRecord) -> Option<DepthDivergence> {
        let accounted = record.accounted_depth();
        let reported = record.reported_depth;
        if depth_diverges(reported, accounted, self.depth_divergence_tolerance) {
            Some(DepthDivergence {
                contig: Arc::clone(&record.contig),
                position: record.position,
                reported,
                accounted,
            })
        } else {
            None
        }
    }
}

/// Whether `accounted` differs from `reported` by more than `tolerance` of
/// the reported depth.
pub(crate) fn depth_diverges(reported: u32, accounted: u32, tolerance: f64) -> bool {
    f64::from(reported.abs_diff(accounted)) > tolerance * f64::from(reported)
}

/// Tally the `read_bases` column into `record`, returning the number of
/// symbols that carry no defined meaning.
pub(crate) fn tally_read_bases(read_bases: &[u8], record: &mut PositionRecord) -> u64 {
    let reference = record.reference();
    let mut unmapped = 0u64;
    let mut i = 0usize;

    while i < read_bases.len() {
        match read_bases[i] {
            // Read start: the following byte is a mapping quality.
            b'^' => {
                i = i.saturating_add(2);
                continue;
            }
            b'$' => {}
            b'.' | b',' => match reference {
                Some(base) => record.observe(base),
                None => record.ambiguous_count += 1,
            },
            symbol @ (b'+' | b'-') => {
                let (length, digits) = indel_length(&read_bases[i + 1..]);
                // The deleted bases arrive as `*` on the following positions.
                if symbol == b'+' {
                    record.insertion_count += 1;
                } else {
                    record.deletion_start_count += 1;
                }
                i = i.saturating_add(1 + digits).saturating_add(length);
                continue;
            }
            b'*' | b'#' => {
                record.deletion_count += 1;
                record.placeholder_count += 1;
            }
            b'>' | b'<' => record.placeholder_count += 1,
            b'N' | b'n' => record.ambiguous_count += 1,
            other => match Base::from_ascii(other) {
                Some(base) => record.observe(base),
                None => unmapped += 1,
            },
        }
        i += 1;
    }

    unmapped
}

fn indel_length(bytes: &[u8]) -> (usize, usize) {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    let length = bytes[..digits].iter().fold(0usize, |acc, &d| {
        acc.saturating_mul(10).saturating_add(usize::from(d - b'0'))
    });
    (length, digits)
}
