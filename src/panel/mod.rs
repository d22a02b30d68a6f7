//! Diagnostic panel: SNP sites, per-region rules, the combination table that
//! joins both regions into one genotype, and the genotype → phenotype table.
//! Loaded from TOML and validated once.
//!
//! A panel is plain data. Everything the caller and the aggregator later rely
//! on (every rule site exists in its region, every rule label and joint
//! genotype has a phenotype, every combination names labels its regions can
//! produce) is checked here so that a loaded [`Panel`] can be used without
//! further validation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ThresholdOverrides;
use crate::genomics::{validate_reference_bases, Allele, Base, Region};

const BUILTIN_PANEL: &str = include_str!("../../data/abo_panel.toml");

/// Expected state of one site in a genotype rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitePattern {
    /// Homozygous reference.
    Ref,
    /// Any heterozygous class (light or dominant).
    Het,
    /// Variant present below the dominant cutoff.
    HetLight,
    /// Variant dominant with the reference still present.
    HetDominant,
    /// Homozygous variant.
    Alt,
    /// Not enough depth to classify.
    Uncalled,
    /// Matches every class.
    Any,
}

impl SitePattern {
    /// Label used in panel files and decision logs.
    pub fn label(self) -> &'static str {
        match self {
            SitePattern::Ref => "ref",
            SitePattern::Het => "het",
            SitePattern::HetLight => "het_light",
            SitePattern::HetDominant => "het_dominant",
            SitePattern::Alt => "alt",
            SitePattern::Uncalled => "uncalled",
            SitePattern::Any => "any",
        }
    }
}

impl fmt::Display for SitePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One diagnostic SNP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelSite {
    /// Site name, conventionally the coding coordinate (`c.261`).
    pub name: String,
    /// 1-based position on the region's reference sequence.
    pub position: u32,
    /// Reference allele.
    pub reference: Base,
    /// Diagnostic variant allele.
    pub variant: Allele,
    /// Free-text annotation.
    #[serde(default)]
    pub note: Option<String>,
}

/// Site patterns implying one genotype.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeRule {
    /// Genotype label.
    pub genotype: String,
    /// Patterns in panel site order; unlisted sites are [`SitePattern::Any`].
    pub patterns: Vec<(String, SitePattern)>,
}

impl GenotypeRule {
    /// Pattern required for `site`.
    pub fn pattern_for(&self, site: &str) -> SitePattern {
        self.patterns
            .iter()
            .find(|(name, _)| name == site)
            .map_or(SitePattern::Any, |&(_, pattern)| pattern)
    }
}

/// Sites and rules for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPanel {
    /// Region.
    pub region: Region,
    /// Reference contig of the region: selects pileup records and names the
    /// sequence checked against a reference FASTA.
    pub contig: Option<String>,
    /// Sites in panel order.
    pub sites: Vec<PanelSite>,
    /// Rules in panel order.
    pub rules: Vec<GenotypeRule>,
    /// Phenotype (or `|`-separated phenotypes) each rule label is compatible with.
    pub phenotypes: BTreeMap<String, String>,
}

impl RegionPanel {
    /// Phenotype text for a rule label of this region.
    pub fn phenotype(&self, label: &str) -> Option<&str> {
        self.phenotypes.get(label).map(String::as_str)
    }

    /// Site with the given name.
    pub fn site(&self, name: &str) -> Option<&PanelSite> {
        self.sites.iter().find(|site| site.name == name)
    }

    /// Site at the given position.
    pub fn site_at(&self, position: u32) -> Option<&PanelSite> {
        self.sites.iter().find(|site| site.position == position)
    }
}

/// Errors loading or validating a panel.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("failed to read panel: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid panel TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown region '{0}' in panel")]
    UnknownRegion(String),
    #[error("panel defines no {0} region")]
    MissingRegion(Region),
    #[error("{0} region has no sites or no rules")]
    EmptyRegion(Region),
    #[error("{region}: position {position} is used by more than one site")]
    DuplicateSitePosition { region: Region, position: u32 },
    #[error("{region}: site name '{name}' is used more than once")]
    DuplicateSiteName { region: Region, name: String },
    #[error("{region}: site {site} has identical reference and variant alleles")]
    ReferenceEqualsVariant { region: Region, site: String },
    #[error("{region}: rule for {genotype} names unknown site '{site}'")]
    UnknownRuleSite {
        region: Region,
        genotype: String,
        site: String,
    },
    #[error("genotype '{0}' has no phenotype in the panel")]
    UnmappedGenotype(String),
    #[error("combination for {genotype} names {label}, which no {region} rule produces")]
    UnknownCombinationLabel {
        region: Region,
        label: String,
        genotype: String,
    },
    #[error("combination {exon6} + {exon7} is listed more than once")]
    DuplicateCombination { exon6: String, exon7: String },
    #[error("{genotype} ({phenotype}) is not compatible with {region} label {label}")]
    IncompatibleCombination {
        genotype: String,
        phenotype: String,
        region: Region,
        label: String,
    },
    #[error("{0} region has no contig to look up in the reference FASTA")]
    MissingContig(Region),
    #[error("{region}: reference FASTA disagrees at {}", format_mismatches(.mismatches))]
    ReferenceMismatch {
        region: Region,
        mismatches: Vec<crate::genomics::ReferenceMismatch>,
    },
    #[error("failed to read reference FASTA: {0}")]
    Reference(String),
}

fn format_mismatches(mismatches: &[crate::genomics::ReferenceMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| {
            format!("{} (pos {}: panel {}, fasta {})", m.site, m.position, m.expected, m.found)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Exon 6 and exon 7 rule labels that together imply one genotype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Combination {
    /// Exon 6 rule label.
    pub exon6: String,
    /// Exon 7 rule label.
    pub exon7: String,
    /// Joint genotype.
    pub genotype: String,
}

impl Combination {
    /// Label of `region` in this combination.
    pub fn label(&self, region: Region) -> &str {
        match region {
            Region::Exon6 => &self.exon6,
            Region::Exon7 => &self.exon7,
        }
    }
}

/// Individual phenotypes in a `|`-separated phenotype text.
pub fn phenotype_options(text: &str) -> impl Iterator<Item = &str> {
    text.split('|').map(str::trim).filter(|option| !option.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PanelFile {
    version: String,
    #[serde(default)]
    thresholds: ThresholdOverrides,
    phenotypes: BTreeMap<String, String>,
    #[serde(default)]
    combinations: Vec<Combination>,
    regions: BTreeMap<String, RegionFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionFile {
    #[serde(default)]
    contig: Option<String>,
    sites: Vec<PanelSite>,
    #[serde(default)]
    rules: Vec<RuleFile>,
    #[serde(default)]
    phenotypes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    genotype: String,
    sites: BTreeMap<String, SitePattern>,
}

/// A validated, fingerprinted panel.
#[derive(Debug, Clone)]
pub struct Panel {
    version: String,
    fingerprint: String,
    thresholds: ThresholdOverrides,
    phenotypes: BTreeMap<String, String>,
    combinations: Vec<Combination>,
    regions: BTreeMap<Region, RegionPanel>,
}

impl Panel {
    /// The panel embedded in the binary.
    pub fn builtin() -> Result<Self, PanelError> {
        Self::from_toml_str(BUILTIN_PANEL)
    }

    /// Load a panel file.
    pub fn from_path(path: &Path) -> Result<Self, PanelError> {
        let text = read_to_string(path)?;
        let panel = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            version = %panel.version,
            fingerprint = %panel.fingerprint,
            "loaded panel"
        );
        Ok(panel)
    }

    /// Parse and validate panel TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, PanelError> {
        let file: PanelFile = toml::from_str(text)?;
        let fingerprint = blake3::hash(text.as_bytes()).to_hex().to_string();

        let mut regions = BTreeMap::new();
        for (key, raw) in file.regions {
            let region: Region = key.parse().map_err(|_| PanelError::UnknownRegion(key.clone()))?;
            let region_panel = build_region(region, raw, &file.phenotypes)?;
            regions.insert(region, region_panel);
        }
        for region in Region::ALL {
            if !regions.contains_key(&region) {
                return Err(PanelError::MissingRegion(region));
            }
        }
        validate_combinations(&file.combinations, &regions, &file.phenotypes)?;

        Ok(Self {
            version: file.version,
            fingerprint,
            thresholds: file.thresholds,
            phenotypes: file.phenotypes,
            combinations: file.combinations,
            regions,
        })
    }

    /// Panel version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// BLAKE3 hex digest of the panel text.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Threshold overrides declared by the panel.
    pub fn thresholds(&self) -> &ThresholdOverrides {
        &self.thresholds
    }

    /// Sites and rules for `region`.
    pub fn region(&self, region: Region) -> Result<&RegionPanel, PanelError> {
        self.regions.get(&region).ok_or(PanelError::MissingRegion(region))
    }

    /// Phenotype for a genotype label.
    pub fn phenotype(&self, genotype: &str) -> Option<&str> {
        self.phenotypes.get(genotype).map(String::as_str)
    }

    /// Combination table in panel order. Empty when each region decides the
    /// genotype on its own.
    pub fn combinations(&self) -> &[Combination] {
        &self.combinations
    }

    /// Combination joining an exon 6 and an exon 7 label.
    pub fn combine(&self, exon6: &str, exon7: &str) -> Option<&Combination> {
        self.combinations
            .iter()
            .find(|combination| combination.exon6 == exon6 && combination.exon7 == exon7)
    }

    /// Check every region's reference alleles against an indexed FASTA.
    ///
    /// Every region must name its contig; a region that cannot be looked up
    /// is an error rather than a silent pass.
    pub fn validate_reference(&self, fasta: &Path) -> Result<(), PanelError> {
        for panel in self.regions.values() {
            let contig = panel
                .contig
                .as_deref()
                .ok_or(PanelError::MissingContig(panel.region))?;
            let sites = panel
                .sites
                .iter()
                .map(|site| (site.name.as_str(), site.position, site.reference));
            let mismatches = validate_reference_bases(fasta, contig, sites)
                .map_err(|err| PanelError::Reference(err.to_string()))?;
            debug!(
                region = %panel.region,
                contig,
                sites = panel.sites.len(),
                "checked reference alleles"
            );
            if !mismatches.is_empty() {
                return Err(PanelError::ReferenceMismatch {
                    region: panel.region,
                    mismatches,
                });
            }
        }
        info!(fasta = %fasta.display(), "panel reference alleles match FASTA");
        Ok(())
    }
}

fn build_region(
    region: Region,
    raw: RegionFile,
    phenotypes: &BTreeMap<String, String>,
) -> Result<RegionPanel, PanelError> {
    if raw.sites.is_empty() || raw.rules.is_empty() {
        return Err(PanelError::EmptyRegion(region));
    }

    let mut positions = HashSet::new();
    let mut names = HashSet::new();
    for site in &raw.sites {
        if !positions.insert(site.position) {
            return Err(PanelError::DuplicateSitePosition {
                region,
                position: site.position,
            });
        }
        if !names.insert(site.name.as_str()) {
            return Err(PanelError::DuplicateSiteName {
                region,
                name: site.name.clone(),
            });
        }
        if site.variant == Allele::Base(site.reference) {
            return Err(PanelError::ReferenceEqualsVariant {
                region,
                site: site.name.clone(),
            });
        }
    }

    let mut rules = Vec::with_capacity(raw.rules.len());
    let mut labels = BTreeMap::new();
    for rule in raw.rules {
        if let Some(unknown) = rule.sites.keys().find(|name| !names.contains(name.as_str())) {
            return Err(PanelError::UnknownRuleSite {
                region,
                genotype: rule.genotype,
                site: unknown.clone(),
            });
        }
        let phenotype = raw
            .phenotypes
            .get(&rule.genotype)
            .or_else(|| phenotypes.get(&rule.genotype))
            .ok_or_else(|| PanelError::UnmappedGenotype(rule.genotype.clone()))?;
        labels.insert(rule.genotype.clone(), phenotype.clone());
        let patterns = raw
            .sites
            .iter()
            .filter_map(|site| {
                rule.sites
                    .get(&site.name)
                    .map(|&pattern| (site.name.clone(), pattern))
            })
            .collect();
        rules.push(GenotypeRule {
            genotype: rule.genotype,
            patterns,
        });
    }

    Ok(RegionPanel {
        region,
        contig: raw.contig,
        sites: raw.sites,
        rules,
        phenotypes: labels,
    })
}

fn validate_combinations(
    combinations: &[Combination],
    regions: &BTreeMap<Region, RegionPanel>,
    phenotypes: &BTreeMap<String, String>,
) -> Result<(), PanelError> {
    let mut seen = HashSet::new();
    for combination in combinations {
        let phenotype = phenotypes
            .get(&combination.genotype)
            .ok_or_else(|| PanelError::UnmappedGenotype(combination.genotype.clone()))?;
        for (&region, panel) in regions {
            let label = combination.label(region);
            let options = panel
                .phenotype(label)
                .ok_or_else(|| PanelError::UnknownCombinationLabel {
                    region,
                    label: label.to_string(),
                    genotype: combination.genotype.clone(),
                })?;
            if !phenotype_options(options).any(|option| option == phenotype) {
                return Err(PanelError::IncompatibleCombination {
                    genotype: combination.genotype.clone(),
                    phenotype: phenotype.clone(),
                    region,
                    label: label.to_string(),
                });
            }
        }
        if !seen.insert((combination.exon6.as_str(), combination.exon7.as_str())) {
            return Err(PanelError::DuplicateCombination {
                exon6: combination.exon6.clone(),
                exon7: combination.exon7.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version = "test-1"

[phenotypes]
AA = "A"
BB = "B"

[regions.exon6]
sites = [{ name = "s1", position = 10, reference = "A", variant = "G" }]
rules = [{ genotype = "AA", sites = { s1 = "ref" } }]

[regions.exon7]
contig = "ABO_exon7"
sites = [
    { name = "t1", position = 5, reference = "C", variant = "del" },
    { name = "t2", position = 9, reference = "G", variant = "A" },
]
rules = [{ genotype = "BB", sites = { t2 = "alt", t1 = "ref" } }]
"#;

    #[test]
    fn builtin_panel_loads() {
        let panel = Panel::builtin().unwrap();
        let exon6 = panel.region(Region::Exon6).unwrap();
        let exon7 = panel.region(Region::Exon7).unwrap();
        assert_eq!(exon6.sites.len(), 4);
        assert_eq!(exon7.sites.len(), 12);
        assert_eq!(exon6.contig.as_deref(), Some("ABO_exon6"));
        assert_eq!(exon7.contig.as_deref(), Some("ABO_exon7"));
        assert_eq!(panel.phenotype("AO1"), Some("A"));
        assert_eq!(exon6.phenotype("O1/x"), Some("A|B|O"));
        assert_eq!(exon7.phenotype("B/O2"), Some("B"));
        assert_eq!(panel.combinations().len(), 15);
        assert_eq!(panel.fingerprint().len(), 64);
        assert_eq!(panel.thresholds().present_cutoff, Some(0.20));
    }

    #[test]
    fn builtin_combinations_join_both_exons() {
        let panel = Panel::builtin().unwrap();
        let genotype = |exon6: &str, exon7: &str| {
            panel.combine(exon6, exon7).map(|c| c.genotype.as_str())
        };
        assert_eq!(genotype("O1/O1", "x/x"), Some("O1O1"));
        assert_eq!(genotype("O1/x", "x/x"), Some("AO1"));
        assert_eq!(genotype("O1/x", "B/x"), Some("BO1"));
        assert_eq!(genotype("x/x", "B/x"), Some("AB"));
        assert_eq!(genotype("O1/x", "O2/x"), Some("O1O2"));
        assert_eq!(genotype("O1/x", "O3/x"), Some("O1O3"));
        assert_eq!(genotype("O1/O1", "B/x"), None);
        assert_eq!(genotype("O1/x", "B/B"), None);
    }

    #[test]
    fn rule_patterns_follow_site_order() {
        let panel = Panel::from_toml_str(MINIMAL).unwrap();
        let exon7 = panel.region(Region::Exon7).unwrap();
        let names: Vec<&str> = exon7.rules[0].patterns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["t1", "t2"]);
        assert_eq!(exon7.rules[0].pattern_for("t2"), SitePattern::Alt);
        assert_eq!(exon7.contig.as_deref(), Some("ABO_exon7"));
        assert_eq!(exon7.site_at(5).map(|s| s.variant), Some(Allele::Deletion));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Panel::from_toml_str(MINIMAL).unwrap();
        let b = Panel::from_toml_str(&MINIMAL.replace("test-1", "test-2")).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn rejects_unmapped_genotype() {
        let text = MINIMAL.replace("BB = \"B\"\n", "");
        assert!(matches!(
            Panel::from_toml_str(&text),
            Err(PanelError::UnmappedGenotype(g)) if g == "BB"
        ));
    }

    #[test]
    fn rejects_unknown_rule_site() {
        let text = MINIMAL.replace("t2 = \"alt\"", "t3 = \"alt\"");
        assert!(matches!(Panel::from_toml_str(&text), Err(PanelError::UnknownRuleSite { .. })));
    }

    #[test]
    fn rejects_duplicate_positions() {
        let text = MINIMAL.replace("position = 9", "position = 5");
        assert!(matches!(
            Panel::from_toml_str(&text),
            Err(PanelError::DuplicateSitePosition { position: 5, .. })
        ));
    }

    #[test]
    fn rejects_missing_region() {
        let cut = MINIMAL.find("[regions.exon7]").unwrap();
        assert!(matches!(
            Panel::from_toml_str(&MINIMAL[..cut]),
            Err(PanelError::MissingRegion(Region::Exon7))
        ));
    }

    #[test]
    fn rejects_unknown_region() {
        let text = MINIMAL.replace("[regions.exon6]", "[regions.exon5]");
        assert!(matches!(Panel::from_toml_str(&text), Err(PanelError::UnknownRegion(_))));
    }

    const JOINT: &str = r#"
version = "joint-1"

[phenotypes]
AA = "A"
AO = "A"
OO = "O"

[[combinations]]
exon6 = "x/x"
exon7 = "x/x"
genotype = "AA"

[[combinations]]
exon6 = "O/x"
exon7 = "x/x"
genotype = "AO"

[regions.exon6]
contig = "ABO_exon6"
sites = [{ name = "s1", position = 10, reference = "A", variant = "G" }]
rules = [
    { genotype = "x/x", sites = { s1 = "ref" } },
    { genotype = "O/x", sites = { s1 = "het" } },
]
phenotypes = { "x/x" = "A|O", "O/x" = "A|O" }

[regions.exon7]
contig = "ABO_exon7"
sites = [{ name = "t1", position = 5, reference = "C", variant = "T" }]
rules = [{ genotype = "x/x", sites = { t1 = "ref" } }]
phenotypes = { "x/x" = "A|O" }
"#;

    #[test]
    fn region_labels_take_region_phenotypes() {
        let panel = Panel::from_toml_str(JOINT).unwrap();
        assert_eq!(panel.region(Region::Exon6).unwrap().phenotype("O/x"), Some("A|O"));
        assert_eq!(panel.phenotype("O/x"), None);
        assert_eq!(panel.combine("O/x", "x/x").map(|c| c.genotype.as_str()), Some("AO"));
        assert_eq!(phenotype_options("A| AB |B").collect::<Vec<_>>(), vec!["A", "AB", "B"]);
    }

    #[test]
    fn rejects_combination_with_unknown_label() {
        let text = JOINT.replace("exon6 = \"O/x\"", "exon6 = \"O/O\"");
        assert!(matches!(
            Panel::from_toml_str(&text),
            Err(PanelError::UnknownCombinationLabel { region: Region::Exon6, label, .. })
                if label == "O/O"
        ));
    }

    #[test]
    fn rejects_duplicate_combination() {
        let text = JOINT.replace("exon6 = \"O/x\"", "exon6 = \"x/x\"");
        assert!(matches!(
            Panel::from_toml_str(&text),
            Err(PanelError::DuplicateCombination { .. })
        ));
    }

    #[test]
    fn rejects_combination_incompatible_with_a_region() {
        let text = JOINT.replace("genotype = \"AO\"", "genotype = \"OO\"").replace(
            "phenotypes = { \"x/x\" = \"A|O\", \"O/x\" = \"A|O\" }",
            "phenotypes = { \"x/x\" = \"A|O\", \"O/x\" = \"A\" }",
        );
        assert!(matches!(
            Panel::from_toml_str(&text),
            Err(PanelError::IncompatibleCombination { region: Region::Exon6, .. })
        ));
    }

    #[test]
    fn rejects_combination_with_unmapped_genotype() {
        let text = JOINT.replace("genotype = \"AO\"", "genotype = \"AX\"");
        assert!(matches!(
            Panel::from_toml_str(&text),
            Err(PanelError::UnmappedGenotype(g)) if g == "AX"
        ));
    }

    /// Write a FASTA with one unwrapped line per region, plus its `.fai`.
    fn write_reference(
        dir: &Path,
        panel: &Panel,
        edit: impl Fn(Region, &mut Vec<u8>),
    ) -> std::path::PathBuf {
        let fasta = dir.join("abo.fa");
        let mut text = Vec::new();
        let mut index = String::new();
        for (region, length) in [(Region::Exon6, 80usize), (Region::Exon7, 700)] {
            let region_panel = panel.region(region).unwrap();
            let contig = region_panel.contig.as_deref().unwrap();
            let mut sequence = vec![b'A'; length];
            for site in &region_panel.sites {
                sequence[site.position as usize - 1] = site.reference.as_char() as u8;
            }
            edit(region, &mut sequence);
            text.extend_from_slice(format!(">{contig}\n").as_bytes());
            let offset = text.len();
            let width = length + 1;
            index.push_str(&format!("{contig}\t{length}\t{offset}\t{length}\t{width}\n"));
            text.extend_from_slice(&sequence);
            text.push(b'\n');
        }
        std::fs::write(&fasta, text).unwrap();
        std::fs::write(dir.join("abo.fa.fai"), index).unwrap();
        fasta
    }

    #[test]
    fn reference_fasta_matches_builtin_alleles() {
        let dir = tempfile::tempdir().unwrap();
        let panel = Panel::builtin().unwrap();
        let fasta = write_reference(dir.path(), &panel, |_, _| {});
        panel.validate_reference(&fasta).unwrap();
    }

    #[test]
    fn reference_fasta_mismatch_names_the_site() {
        let dir = tempfile::tempdir().unwrap();
        let panel = Panel::builtin().unwrap();
        let fasta = write_reference(dir.path(), &panel, |region, sequence| {
            if region == Region::Exon6 {
                sequence[57] = b'G';
            }
        });
        match panel.validate_reference(&fasta) {
            Err(PanelError::ReferenceMismatch { region, mismatches }) => {
                assert_eq!(region, Region::Exon6);
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].site, "c.297");
                assert_eq!(mismatches[0].found, "G");
            }
            other => panic!("expected a reference mismatch, got {other:?}"),
        }
    }

    #[test]
    fn reference_check_requires_region_contigs() {
        let dir = tempfile::tempdir().unwrap();
        let panel = Panel::from_toml_str(MINIMAL).unwrap();
        let fasta = dir.path().join("abo.fa");
        std::fs::write(&fasta, ">ABO_exon7\nCCCCCCCCCC\n").unwrap();
        std::fs::write(dir.path().join("abo.fa.fai"), "ABO_exon7\t10\t11\t10\t11\n").unwrap();
        assert!(matches!(
            panel.validate_reference(&fasta),
            Err(PanelError::MissingContig(Region::Exon6))
        ));
    }
}
