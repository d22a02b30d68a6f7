use std::collections::HashMap;

use tracing::{debug, warn};

use crate::genomics::pileup::{depth_diverges, ratio};
use crate::genomics::statistics::{polymorphism_log, PolymorphismEntry};
use crate::genomics::{Allele, Base, PositionRecord, Region, NUM_BASES};
use crate::panel::{PanelSite, RegionPanel};

/// Observed evidence at one panel site.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticSite {
    /// Contig the evidence came from.
    pub contig: String,
    /// Position (1-based).
    pub position: u32,
    /// Region the site belongs to.
    pub region: Region,
    /// Panel site name.
    pub site_name: String,
    /// Panel reference allele.
    pub reference_allele: Base,
    /// Panel variant allele.
    pub variant_allele: Allele,
    /// Per-base counts [A, C, G, T].
    pub counts: [u32; NUM_BASES],
    /// Usable depth (sum of `counts`).
    pub depth: u32,
    /// Deletion events.
    pub deletion_count: u32,
    /// Insertion events.
    pub insertion_count: u32,
    /// Depth column from the pileup.
    pub reported_depth: u32,
    /// Reads the tally accounted for, comparable with `reported_depth`.
    pub accounted_depth: u32,
    /// Pileup reference base disagrees with the panel.
    pub reference_mismatch: bool,
}

impl DiagnosticSite {
    fn from_record(region: Region, site: &PanelSite, record: &PositionRecord) -> Self {
        let reference_mismatch = record.reference() != Some(site.reference);
        Self {
            contig: record.contig.to_string(),
            position: site.position,
            region,
            site_name: site.name.clone(),
            reference_allele: site.reference,
            variant_allele: site.variant,
            counts: record.counts,
            depth: record.depth,
            deletion_count: record.deletion_count,
            insertion_count: record.insertion_count,
            reported_depth: record.reported_depth,
            accounted_depth: record.accounted_depth(),
            reference_mismatch,
        }
    }

    /// Zero-evidence site for a panel position the pileup never reached.
    pub fn absent(region: Region, contig: &str, site: &PanelSite) -> Self {
        Self {
            contig: contig.to_string(),
            position: site.position,
            region,
            site_name: site.name.clone(),
            reference_allele: site.reference,
            variant_allele: site.variant,
            counts: [0; NUM_BASES],
            depth: 0,
            deletion_count: 0,
            insertion_count: 0,
            reported_depth: 0,
            accounted_depth: 0,
            reference_mismatch: false,
        }
    }

    /// Identity key.
    pub fn key(&self) -> (Region, u32) {
        (self.region, self.position)
    }

    /// Fraction of usable depth supporting `base`.
    pub fn fraction(&self, base: Base) -> f64 {
        ratio(self.counts[base.index()], self.depth)
    }

    /// Fractions for [A, C, G, T].
    pub fn fractions(&self) -> [f64; NUM_BASES] {
        Base::ALL.map(|base| self.fraction(base))
    }

    /// Deletions over reads that called a base or carried a deletion.
    pub fn deletion_fraction(&self) -> f64 {
        ratio(self.deletion_count, self.depth + self.deletion_count)
    }

    /// Insertions over usable depth, capped at 1.
    pub fn insertion_fraction(&self) -> f64 {
        ratio(self.insertion_count, self.depth).min(1.0)
    }

    /// Fraction supporting the panel variant allele.
    pub fn variant_fraction(&self) -> f64 {
        match self.variant_allele {
            Allele::Base(base) => self.fraction(base),
            Allele::Deletion => self.deletion_fraction(),
            Allele::Insertion => self.insertion_fraction(),
        }
    }

    /// Fraction supporting the reference allele, on the same denominator as
    /// [`variant_fraction`](Self::variant_fraction).
    pub fn reference_fraction(&self) -> f64 {
        let reference = self.counts[self.reference_allele.index()];
        match self.variant_allele {
            Allele::Base(_) => ratio(reference, self.depth),
            Allele::Deletion => ratio(reference, self.depth + self.deletion_count),
            Allele::Insertion => 1.0 - self.insertion_fraction(),
        }
    }

    /// Reads informative for this site: deletion events count as evidence
    /// at deletion sites.
    pub fn evidence_depth(&self) -> u32 {
        match self.variant_allele {
            Allele::Deletion => self.depth + self.deletion_count,
            _ => self.depth,
        }
    }

    /// Whether the accounted reads differ from the reported depth by more
    /// than `tolerance` of the reported depth.
    pub fn depth_diverges(&self, tolerance: f64) -> bool {
        depth_diverges(self.reported_depth, self.accounted_depth, tolerance)
    }

    /// No reads reached this site.
    pub fn is_absent(&self) -> bool {
        self.evidence_depth() == 0 && self.insertion_count == 0
    }
}

/// Output of [`DiagnosticSiteExtractor::extract`].
#[derive(Debug, Clone, Default)]
pub struct SiteExtraction {
    /// One site per panel entry, in panel order.
    pub sites: Vec<DiagnosticSite>,
    /// Positions above the noise floor, in stream order.
    pub polymorphisms: Vec<PolymorphismEntry>,
}

/// Picks the panel's diagnostic sites out of a region's pileup records.
#[derive(Debug, Clone)]
pub struct DiagnosticSiteExtractor<'a> {
    panel: &'a RegionPanel,
    noise_threshold: f64,
}

impl<'a> DiagnosticSiteExtractor<'a> {
    /// Extractor for one region with the default 10% noise floor.
    pub fn new(panel: &'a RegionPanel) -> Self {
        Self {
            panel,
            noise_threshold: 0.10,
        }
    }

    /// Set the polymorphism log noise floor.
    pub fn with_noise_threshold(mut self, noise_threshold: f64) -> Self {
        self.noise_threshold = noise_threshold;
        self
    }

    /// Emit one [`DiagnosticSite`] per panel site and the polymorphism log.
    pub fn extract(&self, records: &[PositionRecord]) -> SiteExtraction {
        let region = self.panel.region;
        let mut contig = self.panel.contig.as_deref();
        if let Some(expected) = contig {
            let found = records.first().map(|record| record.contig.to_string());
            if found.is_some() && records.iter().all(|record| record.contig.as_ref() != expected) {
                warn!(
                    %region,
                    expected,
                    found = found.as_deref().unwrap_or_default(),
                    "no pileup records on the panel contig, using all records"
                );
                contig = None;
            }
        }
        let mut by_position: HashMap<u32, &PositionRecord> = HashMap::new();
        for record in records {
            if contig.map_or(true, |contig| contig == record.contig.as_ref()) {
                by_position.entry(record.position).or_insert(record);
            }
        }

        let fallback_contig = contig
            .map(str::to_string)
            .or_else(|| records.first().map(|record| record.contig.to_string()))
            .unwrap_or_else(|| region.label().to_string());

        let sites: Vec<DiagnosticSite> = self
            .panel
            .sites
            .iter()
            .map(|site| match by_position.get(&site.position) {
                Some(record) => {
                    let extracted = DiagnosticSite::from_record(region, site, record);
                    if extracted.reference_mismatch {
                        warn!(
                            %region,
                            site = %site.name,
                            panel = %site.reference,
                            pileup = %char::from(record.reference_base),
                            "pileup reference base disagrees with panel"
                        );
                    }
                    extracted
                }
                None => {
                    debug!(
                        %region,
                        site = %site.name,
                        position = site.position,
                        "panel site absent from pileup"
                    );
                    DiagnosticSite::absent(region, &fallback_contig, site)
                }
            })
            .collect();

        let polymorphisms = polymorphism_log(records, self.noise_threshold);
        SiteExtraction { sites, polymorphisms }
    }
}
