use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::caller::{CallerError, SiteCall};
use crate::genomics::{CoverageSummary, Region};

/// Stages a call passes through. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStage {
    Pending,
    CoverageChecked,
    SitesClassified,
    GenotypeResolved,
    PhenotypeEmitted,
    AmbiguousEmitted,
    InsufficientCoverageEmitted,
}

impl CallStage {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: CallStage) -> bool {
        use CallStage::*;
        matches!(
            (self, next),
            (Pending, CoverageChecked)
                | (CoverageChecked, SitesClassified)
                | (CoverageChecked, InsufficientCoverageEmitted)
                | (SitesClassified, GenotypeResolved)
                | (GenotypeResolved, PhenotypeEmitted)
                | (GenotypeResolved, AmbiguousEmitted)
        )
    }

    /// Whether the stage ends the call.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStage::PhenotypeEmitted
                | CallStage::AmbiguousEmitted
                | CallStage::InsufficientCoverageEmitted
        )
    }

    /// Label used in decision logs.
    pub fn label(self) -> &'static str {
        match self {
            CallStage::Pending => "pending",
            CallStage::CoverageChecked => "coverage_checked",
            CallStage::SitesClassified => "sites_classified",
            CallStage::GenotypeResolved => "genotype_resolved",
            CallStage::PhenotypeEmitted => "phenotype_emitted",
            CallStage::AmbiguousEmitted => "ambiguous_emitted",
            CallStage::InsufficientCoverageEmitted => "insufficient_coverage_emitted",
        }
    }
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tracks the stage of one call and records each transition.
#[derive(Debug)]
pub(crate) struct StageTracker {
    stage: CallStage,
    log: Vec<String>,
}

impl StageTracker {
    pub(crate) fn new() -> Self {
        Self {
            stage: CallStage::Pending,
            log: Vec::new(),
        }
    }

    pub(crate) fn advance(&mut self, next: CallStage) -> Result<(), CallerError> {
        if !self.stage.can_advance_to(next) {
            return Err(CallerError::IllegalTransition {
                from: self.stage,
                to: next,
            });
        }
        self.log.push(format!("stage: {} -> {}", self.stage, next));
        self.stage = next;
        Ok(())
    }

    pub(crate) fn note(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    pub(crate) fn stage(&self) -> CallStage {
        self.stage
    }

    pub(crate) fn into_log(self) -> Vec<String> {
        self.log
    }
}

/// Coarse result of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Resolved,
    Ambiguous,
    InsufficientCoverage,
    Failed,
}

impl CallStatus {
    pub fn label(self) -> &'static str {
        match self {
            CallStatus::Resolved => "resolved",
            CallStatus::Ambiguous => "ambiguous",
            CallStatus::InsufficientCoverage => "insufficient_coverage",
            CallStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolved" => Ok(CallStatus::Resolved),
            "ambiguous" => Ok(CallStatus::Ambiguous),
            "insufficient_coverage" => Ok(CallStatus::InsufficientCoverage),
            "failed" => Ok(CallStatus::Failed),
            other => Err(format!("unknown call status '{other}'")),
        }
    }
}

/// What a call concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Resolved { genotype: String, phenotype: String },
    Ambiguous { candidates: Vec<String> },
    InsufficientCoverage,
    Failed { reason: String },
}

impl CallOutcome {
    pub fn status(&self) -> CallStatus {
        match self {
            CallOutcome::Resolved { .. } => CallStatus::Resolved,
            CallOutcome::Ambiguous { .. } => CallStatus::Ambiguous,
            CallOutcome::InsufficientCoverage => CallStatus::InsufficientCoverage,
            CallOutcome::Failed { .. } => CallStatus::Failed,
        }
    }
}

/// Recoverable condition attached to a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallFlag {
    InsufficientCoverage,
    MissingSite(String),
    UncalledSite(String),
    ReferenceMismatch(String),
    Ambiguous,
    DepthDivergence(String),
    Failed,
}

impl fmt::Display for CallFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFlag::InsufficientCoverage => f.write_str("insufficient_coverage"),
            CallFlag::MissingSite(site) => write!(f, "missing_site:{site}"),
            CallFlag::UncalledSite(site) => write!(f, "uncalled_site:{site}"),
            CallFlag::ReferenceMismatch(site) => write!(f, "reference_mismatch:{site}"),
            CallFlag::Ambiguous => f.write_str("ambiguous"),
            CallFlag::DepthDivergence(site) => write!(f, "depth_divergence:{site}"),
            CallFlag::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for CallFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, site) = match s.split_once(':') {
            Some((kind, site)) => (kind, Some(site.to_string())),
            None => (s, None),
        };
        match (kind, site) {
            ("insufficient_coverage", None) => Ok(CallFlag::InsufficientCoverage),
            ("ambiguous", None) => Ok(CallFlag::Ambiguous),
            ("failed", None) => Ok(CallFlag::Failed),
            ("missing_site", Some(site)) => Ok(CallFlag::MissingSite(site)),
            ("uncalled_site", Some(site)) => Ok(CallFlag::UncalledSite(site)),
            ("reference_mismatch", Some(site)) => Ok(CallFlag::ReferenceMismatch(site)),
            ("depth_divergence", Some(site)) => Ok(CallFlag::DepthDivergence(site)),
            _ => Err(format!("unknown call flag '{s}'")),
        }
    }
}

/// Genotype/phenotype call for one sample and region.
///
/// Built once by [`GenotypeCaller`](crate::caller::GenotypeCaller) or read
/// back from a call file; there are no mutating accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeCall {
    pub(crate) sample_id: String,
    pub(crate) region: Region,
    pub(crate) outcome: CallOutcome,
    pub(crate) flags: Vec<CallFlag>,
    pub(crate) supporting_sites: Vec<String>,
    pub(crate) site_calls: Vec<SiteCall>,
    pub(crate) coverage: Option<CoverageSummary>,
    pub(crate) decision_log: Vec<String>,
    pub(crate) panel_version: String,
    pub(crate) panel_fingerprint: String,
    pub(crate) run_id: Option<String>,
}

impl PhenotypeCall {
    /// Call recording an isolated unit failure.
    pub fn failed(
        sample_id: impl Into<String>,
        region: Region,
        reason: impl Into<String>,
        panel_version: impl Into<String>,
        panel_fingerprint: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        Self {
            sample_id: sample_id.into(),
            region,
            decision_log: vec![format!("failed: {reason}")],
            outcome: CallOutcome::Failed { reason },
            flags: vec![CallFlag::Failed],
            supporting_sites: Vec::new(),
            site_calls: Vec::new(),
            coverage: None,
            panel_version: panel_version.into(),
            panel_fingerprint: panel_fingerprint.into(),
            run_id: None,
        }
    }

    /// Stamp the call with the run that produced it.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn outcome(&self) -> &CallOutcome {
        &self.outcome
    }

    pub fn status(&self) -> CallStatus {
        self.outcome.status()
    }

    /// Genotype label when resolved.
    pub fn genotype(&self) -> Option<&str> {
        match &self.outcome {
            CallOutcome::Resolved { genotype, .. } => Some(genotype),
            _ => None,
        }
    }

    /// Phenotype label when resolved.
    pub fn phenotype(&self) -> Option<&str> {
        match &self.outcome {
            CallOutcome::Resolved { phenotype, .. } => Some(phenotype),
            _ => None,
        }
    }

    /// Candidate genotypes of an ambiguous call.
    pub fn candidates(&self) -> &[String] {
        match &self.outcome {
            CallOutcome::Ambiguous { candidates } => candidates,
            _ => &[],
        }
    }

    pub fn flags(&self) -> &[CallFlag] {
        &self.flags
    }

    /// Sites that took part in rule matching, in panel order.
    pub fn supporting_sites(&self) -> &[String] {
        &self.supporting_sites
    }

    pub fn site_calls(&self) -> &[SiteCall] {
        &self.site_calls
    }

    pub fn coverage(&self) -> Option<&CoverageSummary> {
        self.coverage.as_ref()
    }

    /// Every decision in evaluation order.
    pub fn decision_log(&self) -> &[String] {
        &self.decision_log
    }

    pub fn panel_version(&self) -> &str {
        &self.panel_version
    }

    pub fn panel_fingerprint(&self) -> &str {
        &self.panel_fingerprint
    }

    /// Run the call was produced by, when it was produced inside a run.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Smallest non-zero evidence depth among the supporting sites.
    pub fn min_supporting_depth(&self) -> Option<u32> {
        self.site_calls
            .iter()
            .filter(|call| self.supporting_sites.contains(&call.site_name))
            .map(|call| call.depth)
            .filter(|&depth| depth > 0)
            .min()
    }

    /// Mean evidence depth over the supporting sites.
    pub fn mean_supporting_depth(&self) -> Option<f64> {
        let depths: Vec<u32> = self
            .site_calls
            .iter()
            .filter(|call| self.supporting_sites.contains(&call.site_name))
            .map(|call| call.depth)
            .collect();
        if depths.is_empty() {
            None
        } else {
            Some(depths.iter().map(|&d| f64::from(d)).sum::<f64>() / depths.len() as f64)
        }
    }
}
