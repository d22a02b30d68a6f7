//! On-disk layout of a run directory.
//!
//! ```text
//! <out>/
//!   run_manifest.json
//!   <sample>/<region>/<sample>.<region>.frequencies.tsv
//!                     <sample>.<region>.sites.tsv
//!                     <sample>.<region>.polymorphisms.tsv
//!                     <sample>.<region>.decisions.log
//!                     <sample>.<region>.call.tsv
//!   ABO_result.tsv, ABO_result.xlsx, final_export.csv, summary.json, run.log
//! ```

use std::path::{Path, PathBuf};

use crate::genomics::Region;

pub const MANIFEST_FILE: &str = "run_manifest.json";
pub const RESULTS_TSV: &str = "ABO_result.tsv";
pub const RESULTS_XLSX: &str = "ABO_result.xlsx";
pub const EXPORT_CSV: &str = "final_export.csv";
pub const SUMMARY_JSON: &str = "summary.json";
pub const RUN_LOG: &str = "run.log";

const CALL_SUFFIX: &str = "call.tsv";

/// Paths for one `(sample, region)` unit below an output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPaths {
    dir: PathBuf,
    stem: String,
}

impl UnitPaths {
    pub fn new(root: &Path, sample_id: &str, region: Region) -> Self {
        Self {
            dir: root.join(sample_id).join(region.label()),
            stem: format!("{sample_id}.{}", region.label()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{suffix}", self.stem))
    }

    pub fn frequency_table(&self) -> PathBuf {
        self.file("frequencies.tsv")
    }

    pub fn site_table(&self) -> PathBuf {
        self.file("sites.tsv")
    }

    pub fn polymorphism_log(&self) -> PathBuf {
        self.file("polymorphisms.tsv")
    }

    pub fn decision_log(&self) -> PathBuf {
        self.file("decisions.log")
    }

    pub fn call_file(&self) -> PathBuf {
        self.file(CALL_SUFFIX)
    }
}
