//! Coverage-gated genotype calling over diagnostic sites.
//!
//! A call moves through a fixed sequence of stages (see [`CallStage`]):
//! the coverage gate, per-site classification, rule matching against the
//! panel, and the region label → phenotype lookup. Every step is appended to the
//! call's decision log so the result can be audited from the call file alone.

mod call;
mod callfile;
mod classify;

pub use call::{CallFlag, CallOutcome, CallStage, CallStatus, PhenotypeCall};
pub use callfile::{
    read_call_file, read_call_run_id, render_call_file, write_call_file, CallFileError,
};
pub use classify::{classify_site, SiteCall, SiteClass};

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::TypingConfig;
use crate::genomics::{CoverageSummary, DiagnosticSite, Region};
use crate::panel::{Panel, PanelError, RegionPanel, SitePattern};
use call::StageTracker;

/// Errors raised while calling a genotype.
#[derive(Debug, Error)]
pub enum CallerError {
    /// A matched rule names a label with no phenotype. Aborts the run.
    #[error("genotype '{genotype}' matched in {region} has no phenotype mapping")]
    UnmappedGenotype { genotype: String, region: Region },
    #[error("illegal call stage transition {from} -> {to}")]
    IllegalTransition { from: CallStage, to: CallStage },
    #[error(transparent)]
    Panel(#[from] PanelError),
    #[error("site {site} belongs to {found}, expected {expected}")]
    RegionMismatch {
        site: String,
        expected: Region,
        found: Region,
    },
}

/// Calls genotypes for one panel under one set of thresholds.
#[derive(Debug, Clone)]
pub struct GenotypeCaller<'a> {
    panel: &'a Panel,
    config: TypingConfig,
}

impl<'a> GenotypeCaller<'a> {
    pub fn new(panel: &'a Panel, config: TypingConfig) -> Self {
        Self { panel, config }
    }

    pub fn config(&self) -> &TypingConfig {
        &self.config
    }

    /// Call the genotype of `sample_id` in `region`.
    ///
    /// `sites` normally come from the site extractor; panel sites missing
    /// from the slice are treated as absent and flagged.
    pub fn call(
        &self,
        sample_id: &str,
        region: Region,
        sites: &[DiagnosticSite],
        coverage: &CoverageSummary,
    ) -> Result<PhenotypeCall, CallerError> {
        let region_panel = self.panel.region(region)?;
        if let Some(stray) = sites.iter().find(|site| site.region != region) {
            return Err(CallerError::RegionMismatch {
                site: stray.site_name.clone(),
                expected: region,
                found: stray.region,
            });
        }

        let mut tracker = StageTracker::new();
        let mut flags = BTreeSet::new();
        tracker.note(format!("sample {sample_id} region {region}"));

        // Coverage gate.
        let passes = coverage.passes(self.config.min_mean_depth, self.config.min_breadth);
        let depth_cmp = if coverage.mean_depth >= self.config.min_mean_depth { ">=" } else { "<" };
        let breadth_cmp = if coverage.breadth >= self.config.min_breadth { ">=" } else { "<" };
        tracker.note(format!(
            "coverage: mean_depth {:.2} {depth_cmp} min_mean_depth {:.2}, \
             breadth {:.2} {breadth_cmp} min_breadth {:.2}",
            coverage.mean_depth,
            self.config.min_mean_depth,
            coverage.breadth,
            self.config.min_breadth,
        ));
        tracker.advance(CallStage::CoverageChecked)?;

        if !passes {
            flags.insert(CallFlag::InsufficientCoverage);
            tracker.advance(CallStage::InsufficientCoverageEmitted)?;
            tracker.note("result: insufficient_coverage");
            info!(sample = sample_id, %region, "insufficient coverage");
            return Ok(self.finish(
                sample_id,
                region,
                CallOutcome::InsufficientCoverage,
                flags,
                Vec::new(),
                Vec::new(),
                coverage,
                tracker,
            ));
        }

        // Per-site classification, panel order.
        let mut site_calls = Vec::with_capacity(region_panel.sites.len());
        for panel_site in &region_panel.sites {
            let site = match sites.iter().find(|site| site.position == panel_site.position) {
                Some(site) => site.clone(),
                None => {
                    flags.insert(CallFlag::MissingSite(panel_site.name.clone()));
                    DiagnosticSite::absent(region, region.label(), panel_site)
                }
            };
            if site.is_absent() {
                flags.insert(CallFlag::MissingSite(site.site_name.clone()));
            }
            if site.reference_mismatch {
                flags.insert(CallFlag::ReferenceMismatch(site.site_name.clone()));
            }
            if site.depth_diverges(self.config.depth_divergence_tolerance) {
                flags.insert(CallFlag::DepthDivergence(site.site_name.clone()));
            }
            let site_call = classify_site(&site, &self.config);
            if site_call.class == SiteClass::Uncalled {
                flags.insert(CallFlag::UncalledSite(site_call.site_name.clone()));
            }
            tracker.note(format!(
                "site {} pos {}: {} ({})",
                site_call.site_name, site_call.position, site_call.class, site_call.reason
            ));
            site_calls.push(site_call);
        }
        tracker.advance(CallStage::SitesClassified)?;

        // Rule matching.
        let matched = match_rules(region_panel, &site_calls, &mut tracker);
        let genotypes: Vec<String> = matched
            .iter()
            .map(|&rule| region_panel.rules[rule].genotype.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let supporting_sites = supporting_sites(region_panel, &matched);
        tracker.advance(CallStage::GenotypeResolved)?;

        let outcome = if genotypes.len() == 1 {
            let genotype = genotypes[0].clone();
            let phenotype = region_panel
                .phenotype(&genotype)
                .ok_or_else(|| CallerError::UnmappedGenotype {
                    genotype: genotype.clone(),
                    region,
                })?
                .to_string();
            tracker.advance(CallStage::PhenotypeEmitted)?;
            tracker.note(format!("result: genotype {genotype} phenotype {phenotype}"));
            CallOutcome::Resolved { genotype, phenotype }
        } else {
            flags.insert(CallFlag::Ambiguous);
            tracker.advance(CallStage::AmbiguousEmitted)?;
            if genotypes.is_empty() {
                tracker.note("result: ambiguous (no rule matched)");
            } else {
                tracker.note(format!("result: ambiguous (candidates {})", genotypes.join(",")));
            }
            CallOutcome::Ambiguous { candidates: genotypes }
        };

        info!(sample = sample_id, %region, outcome = ?outcome, "called genotype");
        Ok(self.finish(
            sample_id,
            region,
            outcome,
            flags,
            supporting_sites,
            site_calls,
            coverage,
            tracker,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        sample_id: &str,
        region: Region,
        outcome: CallOutcome,
        flags: BTreeSet<CallFlag>,
        supporting_sites: Vec<String>,
        site_calls: Vec<SiteCall>,
        coverage: &CoverageSummary,
        tracker: StageTracker,
    ) -> PhenotypeCall {
        PhenotypeCall {
            sample_id: sample_id.to_string(),
            region,
            outcome,
            flags: flags.into_iter().collect(),
            supporting_sites,
            site_calls,
            coverage: Some(coverage.clone()),
            decision_log: tracker.into_log(),
            panel_version: self.panel.version().to_string(),
            panel_fingerprint: self.panel.fingerprint().to_string(),
            run_id: None,
        }
    }
}

/// Indices of every rule whose patterns all match.
fn match_rules(
    panel: &RegionPanel,
    site_calls: &[SiteCall],
    tracker: &mut StageTracker,
) -> Vec<usize> {
    let mut matched = Vec::new();
    for (index, rule) in panel.rules.iter().enumerate() {
        let failure = rule.patterns.iter().find(|(site, pattern)| {
            site_calls
                .iter()
                .find(|call| &call.site_name == site)
                .map_or(true, |call| !pattern.matches(call.class))
        });
        match failure {
            None => {
                tracker.note(format!("rule {}: matched", rule.genotype));
                matched.push(index);
            }
            Some((site, pattern)) => {
                debug!(genotype = %rule.genotype, site = %site, "rule rejected");
                let genotype = &rule.genotype;
                tracker.note(format!("rule {genotype}: rejected at {site} (needs {pattern})"));
            }
        }
    }
    matched
}

/// Sites named with a non-`any` pattern by any matched rule, in panel order.
fn supporting_sites(panel: &RegionPanel, matched: &[usize]) -> Vec<String> {
    panel
        .sites
        .iter()
        .filter(|site| {
            matched.iter().any(|&rule| {
                panel.rules[rule].pattern_for(&site.name) != SitePattern::Any
            })
        })
        .map(|site| site.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{Allele, NUM_BASES};

    fn coverage(region: Region, mean_depth: f64, breadth: f64) -> CoverageSummary {
        CoverageSummary {
            region,
            mean_depth,
            breadth,
            num_reads: Some(100),
        }
    }

    /// Build sites for a region with `variant_reads` of 40 reads carrying
    /// the variant at the listed sites and all-reference elsewhere.
    fn sites(
        panel: &Panel,
        region: Region,
        variant_reads: &[(&str, u32)],
    ) -> Vec<DiagnosticSite> {
        panel
            .region(region)
            .unwrap()
            .sites
            .iter()
            .map(|ps| {
                let alt = variant_reads
                    .iter()
                    .find(|(name, _)| *name == ps.name)
                    .map_or(0, |&(_, n)| n);
                let mut site = DiagnosticSite::absent(region, "ABO", ps);
                let mut counts = [0u32; NUM_BASES];
                counts[ps.reference.index()] = 40 - alt;
                match ps.variant {
                    Allele::Base(base) => counts[base.index()] += alt,
                    Allele::Deletion => site.deletion_count = alt,
                    Allele::Insertion => site.insertion_count = alt,
                }
                site.counts = counts;
                site.depth = counts.iter().sum();
                site.reported_depth = site.depth + site.deletion_count;
                site.accounted_depth = site.reported_depth;
                site
            })
            .collect()
    }

    #[test]
    fn calls_o1_carrier_in_exon6() {
        let panel = Panel::builtin().unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        let call = caller
            .call(
                "s1",
                Region::Exon6,
                &sites(&panel, Region::Exon6, &[("c.261", 20)]),
                &coverage(Region::Exon6, 40.0, 100.0),
            )
            .unwrap();
        assert_eq!(call.genotype(), Some("O1/x"));
        assert_eq!(call.phenotype(), Some("A|B|O"));
        assert_eq!(call.supporting_sites(), &["c.261".to_string()]);
        assert!(call.flags().is_empty());
        let log = call.decision_log();
        assert!(log.iter().any(|line| line == "rule O1/x: matched"));
        assert_eq!(log.last().unwrap(), "result: genotype O1/x phenotype A|B|O");
    }

    #[test]
    fn exon7_reports_only_the_alleles_it_can_see() {
        let panel = Panel::builtin().unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        let cov = coverage(Region::Exon7, 40.0, 100.0);
        let b_o2 = sites(&panel, Region::Exon7, &[("c.796", 20), ("c.803", 20), ("c.802", 20)]);
        let call = caller.call("s2", Region::Exon7, &b_o2, &cov).unwrap();
        assert_eq!(call.genotype(), Some("B/O2"));
        assert_eq!(call.phenotype(), Some("B"));

        // A and O1 are identical across exon 7.
        let reference = sites(&panel, Region::Exon7, &[]);
        let call = caller.call("s2", Region::Exon7, &reference, &cov).unwrap();
        assert_eq!(call.genotype(), Some("x/x"));
        assert_eq!(call.phenotype(), Some("A|O"));
    }

    #[test]
    fn low_coverage_stops_before_classification() {
        let panel = Panel::builtin().unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        let call = caller
            .call(
                "s3",
                Region::Exon6,
                &sites(&panel, Region::Exon6, &[]),
                &coverage(Region::Exon6, 12.0, 100.0),
            )
            .unwrap();
        assert_eq!(call.status(), CallStatus::InsufficientCoverage);
        assert!(call.site_calls().is_empty());
        assert_eq!(call.flags(), &[CallFlag::InsufficientCoverage]);
        assert!(call
            .decision_log()
            .iter()
            .any(|line| line.contains("mean_depth 12.00 < min_mean_depth 20.00")));
    }

    #[test]
    fn unseen_combination_is_ambiguous() {
        let panel = Panel::builtin().unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        // c.802 and c.805 homozygous variant together match no rule.
        let call = caller
            .call(
                "s4",
                Region::Exon7,
                &sites(&panel, Region::Exon7, &[("c.802", 40), ("c.805", 40)]),
                &coverage(Region::Exon7, 40.0, 100.0),
            )
            .unwrap();
        assert_eq!(call.status(), CallStatus::Ambiguous);
        assert!(call.candidates().is_empty());
        assert!(call.flags().contains(&CallFlag::Ambiguous));
    }

    #[test]
    fn missing_sites_are_flagged_and_uncalled() {
        let panel = Panel::builtin().unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        let mut exon6 = sites(&panel, Region::Exon6, &[]);
        exon6.retain(|site| site.site_name != "c.261");
        let call = caller
            .call("s5", Region::Exon6, &exon6, &coverage(Region::Exon6, 40.0, 100.0))
            .unwrap();
        assert!(call.flags().contains(&CallFlag::MissingSite("c.261".into())));
        assert!(call.flags().contains(&CallFlag::UncalledSite("c.261".into())));
        assert_eq!(call.status(), CallStatus::Ambiguous);
    }

    #[test]
    fn overlapping_rules_with_different_genotypes_are_ambiguous() {
        let text = r#"
version = "overlap"
[phenotypes]
X1 = "A"
X2 = "B"
[regions.exon6]
sites = [{ name = "s", position = 1, reference = "A", variant = "G" }]
rules = [
    { genotype = "X1", sites = { s = "het" } },
    { genotype = "X2", sites = { s = "het_dominant" } },
]
[regions.exon7]
sites = [{ name = "t", position = 1, reference = "C", variant = "T" }]
rules = [{ genotype = "X1", sites = { t = "ref" } }]
"#;
        let panel = Panel::from_toml_str(text).unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        let site_panel = panel.region(Region::Exon6).unwrap().sites[0].clone();
        let mut site = DiagnosticSite::absent(Region::Exon6, "ABO", &site_panel);
        site.counts = [20, 0, 20, 0];
        site.depth = 40;
        let call = caller
            .call("s6", Region::Exon6, &[site], &coverage(Region::Exon6, 40.0, 100.0))
            .unwrap();
        assert_eq!(call.candidates(), &["X1".to_string(), "X2".to_string()]);
    }

    #[test]
    fn rejects_sites_from_another_region() {
        let panel = Panel::builtin().unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        let exon7 = sites(&panel, Region::Exon7, &[]);
        let err = caller
            .call("s7", Region::Exon6, &exon7, &coverage(Region::Exon6, 40.0, 100.0))
            .unwrap_err();
        assert!(matches!(err, CallerError::RegionMismatch { .. }));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let panel = Panel::builtin().unwrap();
        let caller = GenotypeCaller::new(&panel, TypingConfig::default());
        let input = sites(&panel, Region::Exon6, &[("c.261", 40)]);
        let cov = coverage(Region::Exon6, 5.0, 10.0);
        let first = caller.call("s8", Region::Exon6, &input, &cov).unwrap();
        let second = caller.call("s8", Region::Exon6, &input, &cov).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status(), CallStatus::InsufficientCoverage);
    }
}
