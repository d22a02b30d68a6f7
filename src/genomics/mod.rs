//! Genomics primitives: pileup parsing, per-position allele statistics,
//! diagnostic-site extraction and the per-unit tables built from them.
//!
//! Everything in this module works on one region's pileup at a time and
//! knows nothing about genotypes; interpretation lives in [`crate::caller`].

mod coverage;
mod io;
mod pileup;
mod sites;
mod statistics;
mod tables;
mod types;

pub use coverage::{CoverageError, CoverageSummary};
pub use io::{open_text_reader, validate_reference_bases, write_atomically, ReferenceMismatch};
pub use pileup::{
    DepthDivergence, LineError, ParsedPileup, PileupError, PileupParser, PositionRecord,
    SkippedLine,
};
pub use sites::{DiagnosticSite, DiagnosticSiteExtractor, SiteExtraction};
pub use statistics::{dominant_non_reference, polymorphism_log, DominantAllele, PolymorphismEntry};
pub use tables::{
    read_site_table, write_frequency_table, write_polymorphism_log, write_site_table, SiteTableRow,
    TableError,
};
pub use types::{Allele, Base, Region, NUM_BASES};
