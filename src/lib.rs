//! # abotyper
//!
//! ABO blood-group genotyping from per-exon pileups.
//!
//! ## Pipeline
//!
//! 1. **Quantify**: [`genomics::PileupParser`] turns samtools-style pileup text
//!    into per-position nucleotide tallies.
//! 2. **Extract**: [`genomics::DiagnosticSiteExtractor`] picks the panel's
//!    diagnostic SNPs out of those tallies.
//! 3. **Call**: [`caller::GenotypeCaller`] gates on coverage, classifies each
//!    site and matches the panel's rule table.
//! 4. **Aggregate**: [`aggregate::ResultAggregator`] reconciles exon 6 and
//!    exon 7 calls into one row per sample.
//!
//! ## Usage Example
//!
//! ```ignore
//! use abotyper::{pipeline, Panel, TypingConfig};
//!
//! let panel = Panel::builtin()?;
//! let config = TypingConfig::default().with_overrides(panel.thresholds());
//! let (input, out) = ("runs/in".as_ref(), "runs/out".as_ref());
//! let outcome = pipeline::run_pipeline(&panel, &config, input, out, None)?;
//! println!("{} samples", outcome.report.results().len());
//! ```

#![warn(missing_debug_implementations)]

pub mod aggregate; // Cohort reduction and report files
pub mod caller; // Coverage gate, site classification, rule matching
pub mod config; // Thresholds
pub mod genomics; // Pileup parsing and diagnostic sites
pub mod layout; // Run directory layout
pub mod panel; // Diagnostic SNP panel and rule table
pub mod pipeline; // Per-unit runner and parallel driver

pub use aggregate::{
    AggregateError, AggregateReport, Composite, Reliability, ResultAggregator, SampleResult,
};
pub use caller::{CallOutcome, CallStatus, CallerError, GenotypeCaller, PhenotypeCall};
pub use config::{ConfigError, ThresholdOverrides, TypingConfig};
pub use genomics::{DiagnosticSite, DiagnosticSiteExtractor, PileupParser, PositionRecord, Region};
pub use panel::{Panel, PanelError};

use std::path::PathBuf;

use thiserror::Error;

use caller::CallFileError;
use genomics::{CoverageError, PileupError, TableError};

/// Any error raised while typing a run.
#[derive(Debug, Error)]
pub enum TypingError {
    /// Pileup could not be read or was entirely unparsable.
    #[error(transparent)]
    Pileup(#[from] PileupError),
    /// Panel missing, malformed or inconsistent with the reference.
    #[error(transparent)]
    Panel(#[from] PanelError),
    /// Genotype calling failed.
    #[error(transparent)]
    Caller(#[from] CallerError),
    /// Aggregation failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    /// Call file could not be read or written.
    #[error(transparent)]
    CallFile(#[from] CallFileError),
    /// Frequency, site or polymorphism table failed.
    #[error(transparent)]
    Table(#[from] TableError),
    /// Coverage table unreadable.
    #[error(transparent)]
    Coverage(#[from] CoverageError),
    /// Thresholds are inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Filesystem error outside a more specific component.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Unit inputs are unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Input directory holds no sample directories.
    #[error("no sample directories under {0}")]
    NoUnits(PathBuf),
    /// Fewer units finished than the manifest lists.
    #[error("{completed} of {expected} units completed")]
    UnitCountMismatch {
        /// Units with a call file.
        completed: usize,
        /// Units in the manifest.
        expected: usize,
    },
    /// Worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl TypingError {
    /// Whether the error aborts the whole run rather than a single unit.
    pub fn is_fatal(&self) -> bool {
        match self {
            TypingError::Pileup(_)
            | TypingError::CallFile(_)
            | TypingError::Table(_)
            | TypingError::Coverage(_)
            | TypingError::Io { .. }
            | TypingError::InvalidInput(_) => false,
            TypingError::Caller(err) => !matches!(err, CallerError::RegionMismatch { .. }),
            TypingError::Panel(_)
            | TypingError::Aggregate(_)
            | TypingError::Config(_)
            | TypingError::NoUnits(_)
            | TypingError::UnitCountMismatch { .. }
            | TypingError::ThreadPool(_) => true,
        }
    }
}
